//! Chartpack - Chart Export Pipeline
//!
//! Turns an ordered list of charts into one archive of annotated images:
//! 1. Render each chart off-screen to a PNG frame
//! 2. Stack the frame above a panel with the title and analysis text
//! 3. Name the image `NN_Title.png` and add it to the archive
//! 4. Deliver the archive once every item has succeeded

pub mod archive;
pub mod color;
pub mod compose;
pub mod config;
pub mod error;
pub mod hashing;
pub mod host;
pub mod items;
pub mod naming;
pub mod pipeline;
pub mod plot;
pub mod render;
pub mod telemetry;
pub mod text;

pub use archive::{read_entry, read_entry_names, ZipArchiveBuilder};
pub use color::Rgba;
pub use compose::{compose_export_image, ComposedImage};
pub use config::{ExportConfig, PanelConfig};
pub use error::{ExportError, ExportResult};
pub use hashing::{canonical_json, compute_job_hash, sha256_hex};
pub use host::{Delivered, DirectoryHost, ExportHost, MemoryHost, OffscreenMount};
pub use items::{ChartExportItem, ChartOption};
pub use naming::{entry_name, sanitize_file_name};
pub use pipeline::{ArchiveEntry, ExportGate, ExportPipeline, ExportReport};
pub use plot::PlotRenderer;
pub use render::{ChartInstance, ChartRenderer, SurfaceSpec};
pub use text::{resolve_text_engine, wrap_text_lines, FixedAdvanceText, FontText, TextEngine};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
