//! Built-in CPU chart backend.
//!
//! Understands a small ECharts-like option subset: `color`, `grid`,
//! `xAxis.data` and `series` entries of type `line`, `bar` and `pie`.
//! Everything else in the option is ignored. Marks only; axis labels and
//! legends are not drawn.

use serde_json::Value;
use std::time::Duration;
use tiny_skia::{FillRule, PathBuilder, Pixmap, Rect, Stroke, Transform};
use tracing::debug;

use crate::color::Rgba;
use crate::compose::fits_canvas;
use crate::error::{ExportError, ExportResult};
use crate::items::ChartOption;
use crate::render::{ChartInstance, ChartRenderer, SurfaceSpec};

/// ECharts' default series palette.
pub const DEFAULT_PALETTE: [Rgba; 9] = [
    Rgba::rgb(0x54, 0x70, 0xc6),
    Rgba::rgb(0x91, 0xcc, 0x75),
    Rgba::rgb(0xfa, 0xc8, 0x58),
    Rgba::rgb(0xee, 0x66, 0x66),
    Rgba::rgb(0x73, 0xc0, 0xde),
    Rgba::rgb(0x3b, 0xa2, 0x72),
    Rgba::rgb(0xfc, 0x84, 0x52),
    Rgba::rgb(0x9a, 0x60, 0xb4),
    Rgba::rgb(0xea, 0x7c, 0xcc),
];

const AXIS_COLOR: Rgba = Rgba::rgb(0x2b, 0x4a, 0x7b);
const SPLIT_LINE_COLOR: Rgba = Rgba::rgba(90, 130, 190, 51);
const SPLIT_LINES: usize = 5;
const PIE_STEPS_PER_TURN: f32 = 256.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct PlotRenderer;

impl ChartRenderer for PlotRenderer {
    fn name(&self) -> &'static str {
        "plot"
    }

    fn init(&self, surface: SurfaceSpec) -> ExportResult<Box<dyn ChartInstance>> {
        if surface.width == 0 || surface.height == 0 {
            return Err(ExportError::ChartRendering(format!(
                "surface size must be > 0, got {}x{}",
                surface.width, surface.height
            )));
        }
        Ok(Box::new(PlotInstance {
            surface,
            option: ChartOption::new(),
            layout: None,
        }))
    }
}

struct PlotInstance {
    surface: SurfaceSpec,
    option: ChartOption,
    layout: Option<PlotLayout>,
}

impl ChartInstance for PlotInstance {
    fn set_option(&mut self, option: &ChartOption, not_merge: bool) -> ExportResult<()> {
        if not_merge {
            self.option = option.clone();
        } else {
            for (key, value) in option {
                self.option.insert(key.clone(), value.clone());
            }
        }
        self.layout = None;
        Ok(())
    }

    fn resize(&mut self) -> ExportResult<()> {
        self.layout = Some(PlotLayout::from_option(&self.option, self.surface)?);
        Ok(())
    }

    // Drawing happens inside `to_png`; there is nothing to wait for.
    fn wait_until_settled(&mut self, _delay: Duration) {}

    fn to_png(&mut self, pixel_ratio: f32, background: Rgba) -> ExportResult<Vec<u8>> {
        if self.layout.is_none() {
            self.resize()?;
        }
        let layout = match &self.layout {
            Some(layout) => layout,
            None => return Err(ExportError::ChartRendering("layout pass did not run".into())),
        };

        let (width, height) = self.surface.scaled(pixel_ratio);
        if !fits_canvas(width, height) {
            return Err(ExportError::ChartRendering(format!(
                "{}x{} frame exceeds the maximum canvas area",
                width, height
            )));
        }
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            ExportError::ChartRendering(format!("cannot allocate {}x{} frame", width, height))
        })?;
        pixmap.fill(background.to_skia());

        layout.draw(&mut pixmap, pixel_ratio);

        pixmap
            .encode_png()
            .map_err(|e| ExportError::ChartRendering(format!("PNG encoding failed: {}", e)))
    }

    fn dispose(self: Box<Self>) -> ExportResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Grid {
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
}

#[derive(Debug)]
enum SeriesMarks {
    Line(Vec<Option<f64>>),
    Bar(Vec<Option<f64>>),
    Pie(Vec<(f64, Option<Rgba>)>),
}

#[derive(Debug)]
struct Series {
    marks: SeriesMarks,
    color: Rgba,
}

#[derive(Debug)]
struct PlotLayout {
    surface: SurfaceSpec,
    grid: Grid,
    categories: usize,
    palette: Vec<Rgba>,
    series: Vec<Series>,
}

impl PlotLayout {
    fn from_option(option: &ChartOption, surface: SurfaceSpec) -> ExportResult<Self> {
        let palette = match option.get("color") {
            Some(Value::Array(colors)) => {
                let parsed: Vec<Rgba> = colors.iter().filter_map(parse_color).collect();
                if parsed.is_empty() { DEFAULT_PALETTE.to_vec() } else { parsed }
            }
            Some(Value::String(single)) => match single.parse::<Rgba>() {
                Ok(color) => vec![color],
                Err(_) => DEFAULT_PALETTE.to_vec(),
            },
            _ => DEFAULT_PALETTE.to_vec(),
        };

        let raw_series: Vec<&Value> = match option.get("series") {
            None | Some(Value::Null) => vec![],
            Some(Value::Array(list)) => list.iter().collect(),
            Some(obj @ Value::Object(_)) => vec![obj],
            Some(other) => {
                return Err(ExportError::ChartRendering(format!(
                    "series must be an array or object, got {}",
                    json_kind(other)
                )))
            }
        };

        let mut series = vec![];
        for (index, raw) in raw_series.into_iter().enumerate() {
            let kind = raw.get("type").and_then(Value::as_str).unwrap_or("line");
            let data: &[Value] = raw.get("data").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
            let color = series_color(raw).unwrap_or(palette[index % palette.len()]);

            let marks = match kind {
                "line" => SeriesMarks::Line(data.iter().map(data_value).collect()),
                "bar" => SeriesMarks::Bar(data.iter().map(data_value).collect()),
                "pie" => SeriesMarks::Pie(
                    data.iter()
                        .filter_map(|d| Some((data_value(d)?, item_color(d))))
                        .collect(),
                ),
                other => {
                    debug!(series_type = other, "skipping unsupported series type");
                    continue;
                }
            };
            series.push(Series { marks, color });
        }

        let axis_len = option
            .get("xAxis")
            .and_then(|axis| match axis {
                Value::Array(axes) => axes.first(),
                other => Some(other),
            })
            .and_then(|axis| axis.get("data"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let series_len = series
            .iter()
            .map(|s| match &s.marks {
                SeriesMarks::Line(v) | SeriesMarks::Bar(v) => v.len(),
                SeriesMarks::Pie(_) => 0,
            })
            .max()
            .unwrap_or(0);

        Ok(Self {
            surface,
            grid: parse_grid(option.get("grid")),
            categories: axis_len.max(series_len),
            palette,
            series,
        })
    }

    fn draw(&self, pixmap: &mut Pixmap, scale: f32) {
        let cartesian: Vec<&Series> = self
            .series
            .iter()
            .filter(|s| !matches!(s.marks, SeriesMarks::Pie(_)))
            .collect();

        if !cartesian.is_empty() {
            self.draw_cartesian(pixmap, scale, &cartesian);
        }
        for s in &self.series {
            if let SeriesMarks::Pie(slices) = &s.marks {
                self.draw_pie(pixmap, scale, slices);
            }
        }
    }

    fn plot_rect(&self, scale: f32) -> Option<Rect> {
        let w = self.surface.width as f32;
        let h = self.surface.height as f32;
        Rect::from_ltrb(
            self.grid.left * scale,
            self.grid.top * scale,
            (w - self.grid.right) * scale,
            (h - self.grid.bottom) * scale,
        )
    }

    fn draw_cartesian(&self, pixmap: &mut Pixmap, scale: f32, series: &[&Series]) {
        let Some(area) = self.plot_rect(scale) else {
            debug!("grid leaves no room for the plot area");
            return;
        };
        if self.categories == 0 {
            return;
        }

        let values = series.iter().flat_map(|s| match &s.marks {
            SeriesMarks::Line(v) | SeriesMarks::Bar(v) => v.iter().flatten().copied().collect::<Vec<f64>>(),
            SeriesMarks::Pie(_) => vec![],
        });
        let (mut lo, mut hi) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if hi > 0.0 { hi *= 1.05; }
        if lo < 0.0 { lo *= 1.05; }
        if (hi - lo).abs() < f64::EPSILON {
            hi = lo + 1.0;
        }
        let y_of = |v: f64| area.bottom() - ((v - lo) / (hi - lo)) as f32 * area.height();

        let thin = Stroke { width: scale.max(1.0), ..Stroke::default() };
        for i in 0..=SPLIT_LINES {
            let y = area.top() + area.height() * i as f32 / SPLIT_LINES as f32;
            stroke_segment(pixmap, (area.left(), y), (area.right(), y), SPLIT_LINE_COLOR, &thin);
        }
        let zero = y_of(0.0);
        stroke_segment(pixmap, (area.left(), zero), (area.right(), zero), AXIS_COLOR, &thin);

        let band = area.width() / self.categories as f32;
        let bars: Vec<&Series> = series
            .iter()
            .copied()
            .filter(|s| matches!(s.marks, SeriesMarks::Bar(_)))
            .collect();
        let bar_width = band * 0.6 / bars.len().max(1) as f32;

        for (slot, s) in bars.iter().enumerate() {
            let SeriesMarks::Bar(data) = &s.marks else { continue };
            let paint = s.color.paint();
            for (i, v) in data.iter().enumerate() {
                let Some(v) = v else { continue };
                let x = area.left() + band * i as f32 + band * 0.2 + bar_width * slot as f32;
                let y = y_of(*v);
                let (top, bottom) = if y < zero { (y, zero) } else { (zero, y) };
                if let Some(rect) = Rect::from_ltrb(x, top, x + bar_width, bottom) {
                    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                }
            }
        }

        let line_stroke = Stroke { width: 2.0 * scale, ..Stroke::default() };
        for s in series {
            let SeriesMarks::Line(data) = &s.marks else { continue };
            let paint = s.color.paint();
            let mut pb = PathBuilder::new();
            let mut pen_down = false;
            for (i, v) in data.iter().enumerate() {
                let Some(v) = v else {
                    pen_down = false;
                    continue;
                };
                let x = area.left() + band * (i as f32 + 0.5);
                let y = y_of(*v);
                if pen_down {
                    pb.line_to(x, y);
                } else {
                    pb.move_to(x, y);
                    pen_down = true;
                }
                if let Some(dot) = PathBuilder::from_circle(x, y, 3.0 * scale) {
                    pixmap.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
                }
            }
            if let Some(path) = pb.finish() {
                pixmap.stroke_path(&path, &paint, &line_stroke, Transform::identity(), None);
            }
        }
    }

    fn draw_pie(&self, pixmap: &mut Pixmap, scale: f32, slices: &[(f64, Option<Rgba>)]) {
        let total: f64 = slices.iter().map(|(v, _)| v.max(0.0)).sum();
        if total <= 0.0 {
            return;
        }
        let w = self.surface.width as f32 * scale;
        let h = self.surface.height as f32 * scale;
        let (cx, cy) = (w / 2.0, h / 2.0);
        let radius = w.min(h) * 0.35;

        let mut start = -std::f32::consts::FRAC_PI_2;
        for (index, (value, color)) in slices.iter().enumerate() {
            if *value <= 0.0 {
                continue;
            }
            let sweep = (*value / total) as f32 * std::f32::consts::TAU;
            let steps = ((sweep / std::f32::consts::TAU) * PIE_STEPS_PER_TURN).ceil().max(2.0) as usize;

            let mut pb = PathBuilder::new();
            pb.move_to(cx, cy);
            for step in 0..=steps {
                let angle = start + sweep * step as f32 / steps as f32;
                pb.line_to(cx + radius * angle.cos(), cy + radius * angle.sin());
            }
            pb.close();

            let color = color.unwrap_or(self.palette[index % self.palette.len()]);
            if let Some(path) = pb.finish() {
                pixmap.fill_path(&path, &color.paint(), FillRule::Winding, Transform::identity(), None);
            }
            start += sweep;
        }
    }
}

fn stroke_segment(pixmap: &mut Pixmap, from: (f32, f32), to: (f32, f32), color: Rgba, stroke: &Stroke) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);
    if let Some(path) = pb.finish() {
        pixmap.stroke_path(&path, &color.paint(), stroke, Transform::identity(), None);
    }
}

fn parse_grid(grid: Option<&Value>) -> Grid {
    let side = |name: &str, fallback: f32| {
        grid.and_then(|g| g.get(name))
            .and_then(Value::as_f64)
            .map_or(fallback, |v| v as f32)
    };
    Grid {
        left: side("left", 60.0),
        right: side("right", 40.0),
        top: side("top", 60.0),
        bottom: side("bottom", 60.0),
    }
}

fn parse_color(value: &Value) -> Option<Rgba> {
    value.as_str()?.parse().ok()
}

fn series_color(series: &Value) -> Option<Rgba> {
    ["itemStyle", "lineStyle"]
        .iter()
        .find_map(|style| series.get(style)?.get("color").and_then(parse_color))
}

fn item_color(item: &Value) -> Option<Rgba> {
    item.get("itemStyle")?.get("color").and_then(parse_color)
}

/// Numeric value of one data entry: a number, the last element of an
/// `[x, y]` pair, or the `value` field of an object.
fn data_value(entry: &Value) -> Option<f64> {
    match entry {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(pair) => pair.last().and_then(data_value),
        Value::Object(obj) => obj.get("value").and_then(data_value),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BG: Rgba = Rgba::rgb(0x06, 0x1c, 0x38);

    fn render(option: Value) -> Pixmap {
        let renderer = PlotRenderer;
        let mut chart = renderer.init(SurfaceSpec { width: 200, height: 100 }).unwrap();
        chart.set_option(option.as_object().unwrap(), true).unwrap();
        chart.resize().unwrap();
        let png = chart.to_png(1.0, BG).unwrap();
        chart.dispose().unwrap();
        Pixmap::decode_png(&png).unwrap()
    }

    fn rgb_at(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8) {
        let p = pixmap.pixel(x, y).unwrap().demultiply();
        (p.red(), p.green(), p.blue())
    }

    #[test]
    fn test_bar_fills_its_band() {
        let pixmap = render(json!({
            "grid": {"left": 10, "right": 10, "top": 10, "bottom": 10},
            "xAxis": {"type": "category", "data": ["2024"]},
            "series": [{"type": "bar", "data": [10]}]
        }));

        assert_eq!((pixmap.width(), pixmap.height()), (200, 100));
        assert_eq!(rgb_at(&pixmap, 2, 2), (BG.r, BG.g, BG.b));
        let bar = DEFAULT_PALETTE[0];
        assert_eq!(rgb_at(&pixmap, 100, 60), (bar.r, bar.g, bar.b));
    }

    #[test]
    fn test_palette_and_item_style_override() {
        let pixmap = render(json!({
            "grid": {"left": 10, "right": 10, "top": 10, "bottom": 10},
            "color": ["#5f95ff"],
            "series": [{"type": "bar", "data": [{"value": 3}], "itemStyle": {"color": "#ff0000"}}]
        }));
        assert_eq!(rgb_at(&pixmap, 100, 60), (255, 0, 0));
    }

    #[test]
    fn test_pie_starts_at_twelve_o_clock_clockwise() {
        let pixmap = render(json!({
            "series": [{"type": "pie", "data": [
                {"name": "a", "value": 1},
                {"name": "b", "value": 1}
            ]}]
        }));
        let (a, b) = (DEFAULT_PALETTE[0], DEFAULT_PALETTE[1]);
        // radius = 35px around (100, 50)
        assert_eq!(rgb_at(&pixmap, 115, 50), (a.r, a.g, a.b));
        assert_eq!(rgb_at(&pixmap, 85, 50), (b.r, b.g, b.b));
    }

    #[test]
    fn test_line_series_leaves_marks() {
        let pixmap = render(json!({
            "grid": {"left": 10, "right": 10, "top": 10, "bottom": 10},
            "series": [{"type": "line", "data": [1, null, 3, 2]}]
        }));
        let marked = pixmap
            .pixels()
            .iter()
            .filter(|p| {
                let c = p.demultiply();
                (c.red(), c.green(), c.blue()) != (BG.r, BG.g, BG.b)
            })
            .count();
        assert!(marked > 0);
    }

    #[test]
    fn test_scalar_series_is_a_rendering_error() {
        let renderer = PlotRenderer;
        let mut chart = renderer.init(SurfaceSpec { width: 20, height: 20 }).unwrap();
        chart
            .set_option(json!({"series": 5}).as_object().unwrap(), true)
            .unwrap();
        let err = chart.resize().unwrap_err();
        assert!(matches!(err, ExportError::ChartRendering(_)));
    }

    #[test]
    fn test_merge_keeps_previous_keys() {
        let renderer = PlotRenderer;
        let mut chart = renderer.init(SurfaceSpec { width: 40, height: 40 }).unwrap();
        chart
            .set_option(json!({"series": 5}).as_object().unwrap(), true)
            .unwrap();
        chart
            .set_option(json!({"color": ["#000000"]}).as_object().unwrap(), false)
            .unwrap();
        assert!(chart.resize().is_err());

        chart
            .set_option(json!({"color": ["#000000"]}).as_object().unwrap(), true)
            .unwrap();
        assert!(chart.resize().is_ok());
    }

    #[test]
    fn test_oversized_frame_is_a_rendering_error() {
        let mut chart = PlotRenderer.init(SurfaceSpec { width: 1400, height: 760 }).unwrap();
        chart
            .set_option(json!({"series": [{"type": "bar", "data": [1]}]}).as_object().unwrap(), true)
            .unwrap();
        let err = chart.to_png(200.0, BG).unwrap_err();
        assert!(matches!(err, ExportError::ChartRendering(_)));
        chart.dispose().unwrap();
    }

    #[test]
    fn test_zero_surface_rejected() {
        assert!(PlotRenderer.init(SurfaceSpec { width: 0, height: 10 }).is_err());
    }

    #[test]
    fn test_data_value_shapes() {
        assert_eq!(data_value(&json!(2.5)), Some(2.5));
        assert_eq!(data_value(&json!(["2024-01", 7])), Some(7.0));
        assert_eq!(data_value(&json!({"value": 4})), Some(4.0));
        assert_eq!(data_value(&json!(null)), None);
    }
}
