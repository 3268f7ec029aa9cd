//! Rendering collaborator contract.
//!
//! The export pipeline never interprets a [`ChartOption`]. It hands the
//! option to a chart instance bound to an off-screen surface and receives a
//! PNG-encoded frame back.

use std::time::Duration;

use crate::color::Rgba;
use crate::error::ExportResult;
use crate::items::ChartOption;

/// Logical size of the off-screen drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSpec {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSpec {
    /// Pixel dimensions of a frame rasterized at `pixel_ratio`.
    pub fn scaled(&self, pixel_ratio: f32) -> (u32, u32) {
        let w = (self.width as f32 * pixel_ratio).round() as u32;
        let h = (self.height as f32 * pixel_ratio).round() as u32;
        (w, h)
    }
}

/// Factory for chart instances.
pub trait ChartRenderer {
    fn name(&self) -> &'static str;

    fn init(&self, surface: SurfaceSpec) -> ExportResult<Box<dyn ChartInstance>>;
}

/// A live chart bound to one surface. Must be disposed before the next one
/// is created.
pub trait ChartInstance {
    /// Applies `option`. `not_merge` replaces the previous option entirely.
    fn set_option(&mut self, option: &ChartOption, not_merge: bool) -> ExportResult<()>;

    /// Forces a synchronous layout pass.
    fn resize(&mut self) -> ExportResult<()>;

    /// Blocks until the chart has finished laying out. Instances without a
    /// completion signal fall back to waiting `delay`.
    fn wait_until_settled(&mut self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    /// Rasterizes the current frame to PNG over an opaque `background`.
    fn to_png(&mut self, pixel_ratio: f32, background: Rgba) -> ExportResult<Vec<u8>>;

    fn dispose(self: Box<Self>) -> ExportResult<()>;
}
