//! Text measurement, wrapping and drawing for the analysis panel.

use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use std::fs;
use std::path::Path;
use tiny_skia::{Pixmap, Rect, Transform};
use tracing::{debug, warn};

use crate::color::Rgba;
use crate::config::FontConfig;
use crate::error::{ExportError, ExportResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub weight: FontWeight,
    pub color: Rgba,
}

/// Measures and draws single lines of text.
pub trait TextEngine {
    fn name(&self) -> &'static str;

    /// Advance width of `text` in pixels.
    fn measure(&self, text: &str, style: &TextStyle) -> f32;

    /// Draws `text` with its left edge at `x` and its baseline at `baseline`.
    fn draw(&self, canvas: &mut Pixmap, text: &str, x: f32, baseline: f32, style: &TextStyle);
}

/// Greedy character wrapping.
///
/// Paragraphs are separated by one or more newlines; blank paragraphs are
/// dropped. A character is appended to the current line unless the measured
/// candidate exceeds `max_width`, in which case the current line is emitted
/// first. A line always holds at least one character.
pub fn wrap_text_lines<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = vec![];

    let paragraphs = text
        .split('\n')
        .map(|p| p.strip_suffix('\r').unwrap_or(p))
        .filter(|p| !p.trim().is_empty());

    for paragraph in paragraphs {
        let mut current = String::new();
        for c in paragraph.chars() {
            let mut candidate = current.clone();
            candidate.push(c);
            if !current.is_empty() && measure(&candidate) > max_width {
                lines.push(std::mem::take(&mut current));
                current.push(c);
            } else {
                current = candidate;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// Deterministic text engine with fixed advances: 0.6 em for narrow
/// characters and 1 em for wide (CJK, full-width) characters. Each visible
/// character is drawn as a solid cell sitting on the baseline.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedAdvanceText;

impl FixedAdvanceText {
    pub fn advance(c: char, size: f32) -> f32 {
        if is_wide(c) { size } else { size * 0.6 }
    }
}

fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x20000..=0x3FFFD)
}

impl TextEngine for FixedAdvanceText {
    fn name(&self) -> &'static str {
        "fixed-advance"
    }

    fn measure(&self, text: &str, style: &TextStyle) -> f32 {
        text.chars().map(|c| Self::advance(c, style.size)).sum()
    }

    fn draw(&self, canvas: &mut Pixmap, text: &str, x: f32, baseline: f32, style: &TextStyle) {
        let paint = style.color.paint();
        let mut caret = x;
        for c in text.chars() {
            let advance = Self::advance(c, style.size);
            if !c.is_whitespace() {
                let cell = Rect::from_ltrb(
                    caret + advance * 0.1,
                    baseline - style.size * 0.7,
                    caret + advance * 0.9,
                    baseline,
                );
                if let Some(cell) = cell {
                    canvas.fill_rect(cell, &paint, Transform::identity(), None);
                }
            }
            caret += advance;
        }
    }
}

/// Outline fonts rasterized with `ab_glyph`.
pub struct FontText {
    regular: FontVec,
    bold: Option<FontVec>,
}

impl FontText {
    pub fn from_files(regular: &Path, bold: Option<&Path>) -> ExportResult<Self> {
        let regular = read_font(regular)?;
        let bold = bold.map(read_font).transpose()?;
        Ok(Self { regular, bold })
    }

    /// Looks up the first matching family in the system font database,
    /// falling back to the generic sans-serif family.
    pub fn from_system(families: &[String]) -> Option<Self> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        if db.len() == 0 {
            return None;
        }

        let mut wanted: Vec<fontdb::Family<'_>> =
            families.iter().map(|f| fontdb::Family::Name(f.as_str())).collect();
        wanted.push(fontdb::Family::SansSerif);

        let load = |weight: u16| -> Option<FontVec> {
            let query = fontdb::Query {
                families: &wanted,
                weight: fontdb::Weight(weight),
                ..fontdb::Query::default()
            };
            let id = db.query(&query)?;
            db.with_face_data(id, |data, index| {
                FontVec::try_from_vec_and_index(data.to_vec(), index).ok()
            })
            .flatten()
        };

        let regular = load(400)?;
        let bold = load(600);
        Some(Self { regular, bold })
    }

    fn face(&self, weight: FontWeight) -> &FontVec {
        match (weight, &self.bold) {
            (FontWeight::Bold, Some(bold)) => bold,
            _ => &self.regular,
        }
    }
}

fn read_font(path: &Path) -> ExportResult<FontVec> {
    let data = fs::read(path).map_err(|e| {
        ExportError::Configuration(format!("Failed to read font {}: {}", path.display(), e))
    })?;
    FontVec::try_from_vec(data).map_err(|e| {
        ExportError::Configuration(format!("Invalid font {}: {}", path.display(), e))
    })
}

impl TextEngine for FontText {
    fn name(&self) -> &'static str {
        "outline-font"
    }

    fn measure(&self, text: &str, style: &TextStyle) -> f32 {
        let font = self.face(style.weight).as_scaled(PxScale::from(style.size));
        let mut width = 0.0;
        let mut previous = None;
        for c in text.chars() {
            let id = font.glyph_id(c);
            if let Some(prev) = previous {
                width += font.kern(prev, id);
            }
            width += font.h_advance(id);
            previous = Some(id);
        }
        width
    }

    fn draw(&self, canvas: &mut Pixmap, text: &str, x: f32, baseline: f32, style: &TextStyle) {
        let face = self.face(style.weight);
        let scale = PxScale::from(style.size);
        let font = face.as_scaled(scale);

        let mut caret = x;
        let mut previous = None;
        for c in text.chars() {
            let id = font.glyph_id(c);
            if let Some(prev) = previous {
                caret += font.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(scale, point(caret, baseline));
            caret += font.h_advance(id);
            previous = Some(id);

            if let Some(outlined) = face.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                let (left, top) = (bounds.min.x as i32, bounds.min.y as i32);
                outlined.draw(|gx, gy, coverage| {
                    blend_coverage(canvas, left + gx as i32, top + gy as i32, style.color, coverage);
                });
            }
        }
    }
}

/// Source-over blend of `color` scaled by `coverage` into one pixel.
pub(crate) fn blend_coverage(canvas: &mut Pixmap, x: i32, y: i32, color: Rgba, coverage: f32) {
    if x < 0 || y < 0 || x as u32 >= canvas.width() || y as u32 >= canvas.height() {
        return;
    }
    let alpha = color.a as f32 / 255.0 * coverage.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }

    let idx = ((y as u32 * canvas.width() + x as u32) * 4) as usize;
    let data = canvas.data_mut();
    let keep = 1.0 - alpha;
    for (offset, channel) in [color.r, color.g, color.b].into_iter().enumerate() {
        let dst = data[idx + offset] as f32;
        data[idx + offset] = (channel as f32 * alpha + dst * keep).round().min(255.0) as u8;
    }
    let dst_alpha = data[idx + 3] as f32;
    data[idx + 3] = (255.0 * alpha + dst_alpha * keep).round().min(255.0) as u8;
}

/// Picks the text engine described by `config`.
///
/// Explicit font paths must load. Without them the system font database is
/// searched, and fixed-advance cells are used when nothing matches.
pub fn resolve_text_engine(config: &FontConfig) -> ExportResult<Box<dyn TextEngine>> {
    if config.fixed_advance {
        return Ok(Box::new(FixedAdvanceText));
    }

    if let Some(regular) = &config.regular_path {
        let engine = FontText::from_files(regular, config.bold_path.as_deref())?;
        debug!(font = %regular.display(), "loaded configured font");
        return Ok(Box::new(engine));
    }

    match FontText::from_system(&config.families) {
        Some(engine) => Ok(Box::new(engine)),
        None => {
            warn!("no usable system font found, drawing text as fixed-advance cells");
            Ok(Box::new(FixedAdvanceText))
        }
    }
}
