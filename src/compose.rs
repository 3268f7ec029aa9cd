//! Compositing - chart raster above an annotated text panel

use tiny_skia::{PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, Transform};

use crate::config::PanelConfig;
use crate::error::{ExportError, ExportResult};
use crate::text::{wrap_text_lines, FontWeight, TextEngine, TextStyle};

/// Largest canvas area we attempt to allocate (16384 x 16384).
pub const MAX_CANVAS_PIXELS: u64 = 16384 * 16384;

/// Whether a `width` x `height` raster stays within [`MAX_CANVAS_PIXELS`].
pub fn fits_canvas(width: u32, height: u32) -> bool {
    width as u64 * height as u64 <= MAX_CANVAS_PIXELS
}

#[derive(Debug, Clone)]
pub struct ComposedImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
    pub lines_drawn: usize,
    pub lines_dropped: usize,
}

/// Stacks the decoded chart above a panel holding `title`, the panel
/// heading and the wrapped `analysis_text`, and encodes the result as PNG.
///
/// Wrapped lines beyond [`PanelConfig::line_capacity`] are dropped.
pub fn compose_export_image(
    chart_png: &[u8],
    title: &str,
    analysis_text: &str,
    panel: &PanelConfig,
    text: &dyn TextEngine,
) -> ExportResult<ComposedImage> {
    let chart = Pixmap::decode_png(chart_png)
        .map_err(|e| ExportError::ImageDecode(e.to_string()))?;

    let width = chart.width();
    let chart_height = chart.height();
    let height = chart_height.checked_add(panel.height).ok_or_else(|| {
        ExportError::CanvasUnavailable(format!(
            "canvas height overflows: {} + {}",
            chart_height, panel.height
        ))
    })?;
    let mut canvas = allocate_canvas(width, height)?;

    let colors = &panel.colors;
    canvas.fill(colors.canvas.to_skia());
    canvas.draw_pixmap(0, 0, chart.as_ref(), &PixmapPaint::default(), Transform::identity(), None);

    let top = chart_height as f32;
    if let Some(area) = Rect::from_xywh(0.0, top, width as f32, panel.height as f32) {
        canvas.fill_rect(area, &colors.panel.paint(), Transform::identity(), None);
    }

    let mut pb = PathBuilder::new();
    pb.move_to(0.0, top);
    pb.line_to(width as f32, top);
    if let Some(separator) = pb.finish() {
        let stroke = Stroke { width: panel.separator_width, ..Stroke::default() };
        canvas.stroke_path(&separator, &colors.separator.paint(), &stroke, Transform::identity(), None);
    }

    let title_style = TextStyle { size: panel.title_size, weight: FontWeight::Bold, color: colors.title };
    text.draw(&mut canvas, title, panel.padding_x, top + panel.padding_y + panel.title_offset, &title_style);

    let heading_style = TextStyle { size: panel.heading_size, weight: FontWeight::Bold, color: colors.heading };
    text.draw(
        &mut canvas,
        &panel.heading_text,
        panel.padding_x,
        top + panel.padding_y + panel.heading_offset,
        &heading_style,
    );

    let body_style = TextStyle { size: panel.body_size, weight: FontWeight::Regular, color: colors.body };
    let max_width = width as f32 - panel.padding_x * 2.0;
    let lines = wrap_text_lines(analysis_text, max_width, |line| text.measure(line, &body_style));

    let capacity = panel.line_capacity();
    let body_top = top + panel.padding_y + panel.body_offset;
    for (index, line) in lines.iter().take(capacity).enumerate() {
        let baseline = body_top + index as f32 * panel.line_height;
        text.draw(&mut canvas, line, panel.padding_x, baseline, &body_style);
    }
    let lines_drawn = lines.len().min(capacity);

    let png = canvas
        .encode_png()
        .map_err(|e| ExportError::BlobEncoding(format!("composed image: {}", e)))?;
    if png.is_empty() {
        return Err(ExportError::BlobEncoding("composed image is empty".to_string()));
    }

    Ok(ComposedImage {
        width,
        height,
        png,
        lines_drawn,
        lines_dropped: lines.len() - lines_drawn,
    })
}

fn allocate_canvas(width: u32, height: u32) -> ExportResult<Pixmap> {
    if !fits_canvas(width, height) {
        return Err(ExportError::CanvasUnavailable(format!(
            "{}x{} exceeds the maximum canvas area",
            width, height
        )));
    }
    Pixmap::new(width, height).ok_or_else(|| {
        ExportError::CanvasUnavailable(format!("cannot allocate {}x{} canvas", width, height))
    })
}
