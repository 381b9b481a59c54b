use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use b4w_bake_core::BakeConfig;
use b4w_export::ExportConfig;

/// Options for every subcommand, read from an optional JSON file. Missing
/// sections and fields keep their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub bake: BakeConfig,
    pub export: ExportConfig,
}

impl ToolConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}
