//! Export Pipeline - Single Entry Point
//!
//! Items are rendered, composed and archived strictly in input order. The
//! first failure aborts the run; nothing is delivered and the off-screen
//! mount is released either way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::archive::ZipArchiveBuilder;
use crate::compose::{compose_export_image, ComposedImage};
use crate::config::ExportConfig;
use crate::error::{ExportError, ExportResult};
use crate::hashing::{compute_job_hash, sha256_hex};
use crate::host::{validate_archive_name, ExportHost, OffscreenMount};
use crate::items::ChartExportItem;
use crate::naming::entry_name;
use crate::render::{ChartInstance, ChartRenderer, SurfaceSpec};
use crate::text::TextEngine;
use crate::ENGINE_VERSION;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub id: String,
    pub archive_name: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub engine_version: String,
    pub renderer: String,
    pub job_hash: String,
    pub archive_bytes: usize,
    pub archive_hash: String,
    pub entries: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub ordinal: usize,
    pub filename: String,
    pub size: [u32; 2],
    pub bytes: usize,
    pub hash: String,
    pub lines_drawn: usize,
    pub lines_dropped: usize,
}

/// "Export in progress" flag. At most one ticket exists at a time.
#[derive(Debug, Default)]
pub struct ExportGate {
    busy: AtomicBool,
}

impl ExportGate {
    pub fn try_begin(&self) -> ExportResult<ExportTicket<'_>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(ExportError::ExportInProgress);
        }
        Ok(ExportTicket { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Clears the gate when dropped.
pub struct ExportTicket<'a> {
    gate: &'a ExportGate,
}

impl Drop for ExportTicket<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

/// The export pipeline - single entry point for chart archive exports
pub struct ExportPipeline {
    config: ExportConfig,
    renderer: Box<dyn ChartRenderer>,
    text: Box<dyn TextEngine>,
    gate: ExportGate,
}

impl ExportPipeline {
    pub fn new(
        config: ExportConfig,
        renderer: Box<dyn ChartRenderer>,
        text: Box<dyn TextEngine>,
    ) -> ExportResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            renderer,
            text,
            gate: ExportGate::default(),
        })
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn is_exporting(&self) -> bool {
        self.gate.is_busy()
    }

    fn surface(&self) -> SurfaceSpec {
        SurfaceSpec {
            width: self.config.canvas.width,
            height: self.config.canvas.height,
        }
    }

    /// Renders every item, packs the composed images into one archive and
    /// hands it to `host` under `archive_name`.
    pub fn export_as_archive(
        &self,
        items: &[ChartExportItem],
        archive_name: &str,
        host: &dyn ExportHost,
    ) -> ExportResult<ExportReport> {
        let _ticket = self.gate.try_begin()?;
        host.check_support()?;
        validate_archive_name(archive_name)?;
        let archive_name = archive_name.trim();

        let span = info_span!("export", archive = archive_name, items = items.len());
        let _enter = span.enter();

        let job_hash = compute_job_hash(archive_name, &items, &self.config, ENGINE_VERSION)?;
        let mut archive = ZipArchiveBuilder::new(self.config.archive.compression);

        let entries = {
            let _mount = OffscreenMount::attach(host, self.surface())?;
            let mut entries = Vec::with_capacity(items.len());

            for (index, item) in items.iter().enumerate() {
                let chart_png = self.render_chart(item)?;
                let composed = compose_export_image(
                    &chart_png,
                    &item.title,
                    &item.analysis_text,
                    &self.config.panel,
                    self.text.as_ref(),
                )?;

                let filename = entry_name(index, &item.title);
                archive.insert(&filename, &composed.png)?;
                debug!(
                    ordinal = index + 1,
                    file = %filename,
                    width = composed.width,
                    height = composed.height,
                    dropped_lines = composed.lines_dropped,
                    "chart composed"
                );
                entries.push(archive_entry(index, filename, &composed));
            }
            entries
        };

        let bytes = archive.finish()?;
        let delivered = host.deliver(archive_name, &bytes)?;
        info!(entries = entries.len(), bytes = bytes.len(), location = %delivered.location, "export finished");

        Ok(ExportReport {
            id: Uuid::new_v4().to_string(),
            archive_name: archive_name.to_string(),
            location: delivered.location,
            created_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            renderer: self.renderer.name().to_string(),
            job_hash,
            archive_bytes: bytes.len(),
            archive_hash: sha256_hex(&bytes),
            entries,
        })
    }

    /// Renders one chart to PNG. The instance is disposed before returning,
    /// whether or not rendering succeeded.
    fn render_chart(&self, item: &ChartExportItem) -> ExportResult<Vec<u8>> {
        let mut chart = self.renderer.init(self.surface())?;
        let rendered = self.drive_chart(chart.as_mut(), item);

        match (rendered, chart.dispose()) {
            (Ok(png), Ok(())) => Ok(png),
            (Ok(_), Err(dispose_err)) => Err(dispose_err),
            (Err(render_err), Err(dispose_err)) => {
                warn!(error = %dispose_err, "chart dispose failed after a rendering error");
                Err(render_err)
            }
            (Err(render_err), Ok(())) => Err(render_err),
        }
    }

    fn drive_chart(&self, chart: &mut dyn ChartInstance, item: &ChartExportItem) -> ExportResult<Vec<u8>> {
        let canvas = &self.config.canvas;
        chart.set_option(&item.option, true)?;
        chart.resize()?;
        chart.wait_until_settled(self.config.settle_delay());
        let png = chart.to_png(canvas.pixel_ratio, canvas.background)?;
        if png.is_empty() {
            return Err(ExportError::ChartRendering(format!(
                "renderer produced no image for '{}'",
                item.title
            )));
        }
        Ok(png)
    }
}

fn archive_entry(index: usize, filename: String, composed: &ComposedImage) -> ArchiveEntry {
    ArchiveEntry {
        ordinal: index + 1,
        filename,
        size: [composed.width, composed.height],
        bytes: composed.png.len(),
        hash: sha256_hex(&composed.png),
        lines_drawn: composed.lines_drawn,
        lines_dropped: composed.lines_dropped,
    }
}
