//! Export Configuration - Canvas, Panel, Fonts, Archive

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::color::Rgba;
use crate::compose::fits_canvas;
use crate::error::{ExportError, ExportResult};
use crate::render::SurfaceSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub fonts: FontConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

fn default_settle_delay_ms() -> u64 { 80 }

/// Off-screen chart surface. Logical size, rasterized at `pixel_ratio`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasConfig {
    #[serde(default = "default_canvas_width")]
    pub width: u32,
    #[serde(default = "default_canvas_height")]
    pub height: u32,
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f32,
    #[serde(default = "default_chart_background")]
    pub background: Rgba,
}

fn default_canvas_width() -> u32 { 1400 }
fn default_canvas_height() -> u32 { 760 }
fn default_pixel_ratio() -> f32 { 2.0 }
fn default_chart_background() -> Rgba { Rgba::rgb(0x06, 0x1c, 0x38) }

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_width(),
            height: default_canvas_height(),
            pixel_ratio: default_pixel_ratio(),
            background: default_chart_background(),
        }
    }
}

/// Text panel stacked under each chart. All measures are in output pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelConfig {
    #[serde(default = "default_panel_height")]
    pub height: u32,
    #[serde(default = "default_padding_x")]
    pub padding_x: f32,
    #[serde(default = "default_padding_y")]
    pub padding_y: f32,
    #[serde(default = "default_title_offset")]
    pub title_offset: f32,
    #[serde(default = "default_heading_offset")]
    pub heading_offset: f32,
    #[serde(default = "default_body_offset")]
    pub body_offset: f32,
    #[serde(default = "default_line_height")]
    pub line_height: f32,
    /// Vertical space taken by the title block when computing line capacity.
    #[serde(default = "default_reserved_height")]
    pub reserved_height: f32,
    #[serde(default = "default_title_size")]
    pub title_size: f32,
    #[serde(default = "default_heading_size")]
    pub heading_size: f32,
    #[serde(default = "default_body_size")]
    pub body_size: f32,
    #[serde(default = "default_heading_text")]
    pub heading_text: String,
    #[serde(default = "default_separator_width")]
    pub separator_width: f32,
    #[serde(default)]
    pub colors: PanelColors,
}

fn default_panel_height() -> u32 { 360 }
fn default_padding_x() -> f32 { 36.0 }
fn default_padding_y() -> f32 { 28.0 }
fn default_title_offset() -> f32 { 10.0 }
fn default_heading_offset() -> f32 { 70.0 }
fn default_body_offset() -> f32 { 118.0 }
fn default_line_height() -> f32 { 42.0 }
fn default_reserved_height() -> f32 { 140.0 }
fn default_title_size() -> f32 { 40.0 }
fn default_heading_size() -> f32 { 30.0 }
fn default_body_size() -> f32 { 26.0 }
fn default_heading_text() -> String { "Data Analysis".to_string() }
fn default_separator_width() -> f32 { 2.0 }

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            height: default_panel_height(),
            padding_x: default_padding_x(),
            padding_y: default_padding_y(),
            title_offset: default_title_offset(),
            heading_offset: default_heading_offset(),
            body_offset: default_body_offset(),
            line_height: default_line_height(),
            reserved_height: default_reserved_height(),
            title_size: default_title_size(),
            heading_size: default_heading_size(),
            body_size: default_body_size(),
            heading_text: default_heading_text(),
            separator_width: default_separator_width(),
            colors: PanelColors::default(),
        }
    }
}

impl PanelConfig {
    /// Number of wrapped analysis lines that fit under the title block.
    pub fn line_capacity(&self) -> usize {
        if self.line_height <= 0.0 {
            return 0;
        }
        let room = self.height as f32 - self.reserved_height;
        if room <= 0.0 {
            return 0;
        }
        (room / self.line_height).floor() as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelColors {
    #[serde(default = "default_canvas_fill")]
    pub canvas: Rgba,
    #[serde(default = "default_panel_fill")]
    pub panel: Rgba,
    #[serde(default = "default_separator")]
    pub separator: Rgba,
    #[serde(default = "default_title_color")]
    pub title: Rgba,
    #[serde(default = "default_heading_color")]
    pub heading: Rgba,
    #[serde(default = "default_body_color")]
    pub body: Rgba,
}

fn default_canvas_fill() -> Rgba { Rgba::rgb(0x06, 0x1a, 0x35) }
fn default_panel_fill() -> Rgba { Rgba::with_alpha(8, 29, 57, 0.98) }
fn default_separator() -> Rgba { Rgba::with_alpha(94, 160, 255, 0.45) }
fn default_title_color() -> Rgba { Rgba::rgb(0xd9, 0xec, 0xff) }
fn default_heading_color() -> Rgba { Rgba::rgb(0x99, 0xc5, 0xff) }
fn default_body_color() -> Rgba { Rgba::rgb(0xd4, 0xe8, 0xff) }

impl Default for PanelColors {
    fn default() -> Self {
        Self {
            canvas: default_canvas_fill(),
            panel: default_panel_fill(),
            separator: default_separator(),
            title: default_title_color(),
            heading: default_heading_color(),
            body: default_body_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontConfig {
    /// Family names tried in order against the system font database.
    #[serde(default = "default_families")]
    pub families: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold_path: Option<PathBuf>,
    /// Skip font discovery and use fixed-advance glyph cells.
    #[serde(default)]
    pub fixed_advance: bool,
}

fn default_families() -> Vec<String> {
    vec![
        "Microsoft YaHei".to_string(),
        "PingFang SC".to_string(),
        "Noto Sans CJK SC".to_string(),
    ]
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            families: default_families(),
            regular_path: None,
            bold_path: None,
            fixed_advance: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveConfig {
    #[serde(default)]
    pub compression: Compression,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflate,
    Stored,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            canvas: CanvasConfig::default(),
            panel: PanelConfig::default(),
            fonts: FontConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl ExportConfig {
    /// Loads a configuration file. `.toml` files are parsed as TOML,
    /// anything else as JSON.
    pub fn load(path: &Path) -> ExportResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ExportError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: ExportConfig = if path.extension().map_or(false, |e| e == "toml") {
            toml::from_str(&content)
                .map_err(|e| ExportError::Configuration(format!("Failed to parse TOML: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| ExportError::Configuration(format!("Failed to parse JSON: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ExportResult<()> {
        let mut problems = vec![];

        if self.canvas.width == 0 || self.canvas.height == 0 {
            problems.push(format!(
                "canvas size must be > 0, got {}x{}",
                self.canvas.width, self.canvas.height
            ));
        }
        if !(self.canvas.pixel_ratio.is_finite() && self.canvas.pixel_ratio > 0.0) {
            problems.push(format!("pixelRatio must be > 0, got {}", self.canvas.pixel_ratio));
        }
        if problems.is_empty() {
            let surface = SurfaceSpec { width: self.canvas.width, height: self.canvas.height };
            let (w, h) = surface.scaled(self.canvas.pixel_ratio);
            let composed = h.checked_add(self.panel.height);
            if !fits_canvas(w, h) || !composed.map_or(false, |total| fits_canvas(w, total)) {
                problems.push(format!(
                    "{}x{} canvas at pixelRatio {} plus a {}px panel exceeds the maximum canvas area",
                    self.canvas.width, self.canvas.height, self.canvas.pixel_ratio, self.panel.height
                ));
            }
        }
        if self.panel.line_height <= 0.0 {
            problems.push("panel lineHeight must be > 0".to_string());
        }
        for (name, size) in [
            ("titleSize", self.panel.title_size),
            ("headingSize", self.panel.heading_size),
            ("bodySize", self.panel.body_size),
        ] {
            if !(size.is_finite() && size > 0.0) {
                problems.push(format!("panel {} must be > 0", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ExportError::Configuration(problems.join("; ")))
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn to_toml(&self) -> ExportResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ExportError::Configuration(format!("Failed to render TOML: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_dashboard_layout() {
        let config = ExportConfig::default();
        assert_eq!(config.canvas.width, 1400);
        assert_eq!(config.canvas.height, 760);
        assert_eq!(config.canvas.pixel_ratio, 2.0);
        assert_eq!(config.panel.height, 360);
        assert_eq!(config.settle_delay(), Duration::from_millis(80));
        assert_eq!(config.panel.line_capacity(), 5);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ExportConfig = toml::from_str(
            r##"
            settleDelayMs = 0

            [canvas]
            width = 320
            background = "#000000"

            [panel]
            headingText = "Analysis"
            "##,
        )
        .unwrap();

        assert_eq!(config.settle_delay_ms, 0);
        assert_eq!(config.canvas.width, 320);
        assert_eq!(config.canvas.height, 760);
        assert_eq!(config.canvas.background, Rgba::rgb(0, 0, 0));
        assert_eq!(config.panel.heading_text, "Analysis");
        assert_eq!(config.panel.line_height, 42.0);
    }

    #[test]
    fn test_validate_rejects_zero_canvas() {
        let mut config = ExportConfig::default();
        config.canvas.width = 0;
        config.canvas.pixel_ratio = 0.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("canvas size"));
        assert!(err.contains("pixelRatio"));
    }

    #[test]
    fn test_validate_rejects_frames_beyond_canvas_limit() {
        let mut config = ExportConfig::default();
        config.canvas.pixel_ratio = 200.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("maximum canvas area"));

        let mut config = ExportConfig::default();
        config.canvas.width = 16384;
        config.canvas.height = 16384;
        config.canvas.pixel_ratio = 1.0;
        assert!(config.validate().is_err(), "frame fits but frame plus panel does not");

        let mut config = ExportConfig::default();
        config.panel.height = u32::MAX;
        assert!(config.validate().is_err());

        assert!(ExportConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = ExportConfig::default().to_toml().unwrap();
        let parsed: ExportConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.panel.colors.panel, Rgba::with_alpha(8, 29, 57, 0.98));
        assert_eq!(parsed.archive.compression, Compression::Deflate);
    }

    #[test]
    fn test_load_json_and_toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("export.json");
        fs::write(&json_path, r#"{"canvas": {"width": 200, "height": 100}}"#).unwrap();
        let config = ExportConfig::load(&json_path).unwrap();
        assert_eq!(config.canvas.height, 100);

        let toml_path = dir.path().join("export.toml");
        fs::write(&toml_path, "[canvas]\npixelRatio = 0.0\n").unwrap();
        assert!(matches!(
            ExportConfig::load(&toml_path),
            Err(ExportError::Configuration(_))
        ));
    }
}
