//! Export items - the ordered input of an export run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::{ExportError, ExportResult};

/// Declarative chart configuration. Only the renderer interprets it.
pub type ChartOption = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartExportItem {
    /// Caller-side correlation key, ignored by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub title: String,
    pub option: ChartOption,
    #[serde(default)]
    pub analysis_text: String,
}

impl ChartExportItem {
    pub fn new(title: impl Into<String>, option: ChartOption, analysis_text: impl Into<String>) -> Self {
        Self {
            key: None,
            title: title.into(),
            option,
            analysis_text: analysis_text.into(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Reads a JSON array of items.
pub fn load_items(path: &Path) -> ExportResult<Vec<ChartExportItem>> {
    let content = fs::read_to_string(path)?;
    parse_items(&content)
}

pub fn parse_items(json: &str) -> ExportResult<Vec<ChartExportItem>> {
    let value: Value = serde_json::from_str(json)?;
    if !value.is_array() {
        return Err(ExportError::Configuration(
            "export items must be a JSON array".to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}
