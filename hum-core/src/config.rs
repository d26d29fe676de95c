//! Configuration for a transcription session

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::quantize::QuantizationGrid;
use crate::segmenter::SegmenterConfig;
use crate::stabilizer::StabilizerConfig;

/// All tunables of the pipeline.
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Rolling-history pitch lock
    pub stabilizer: StabilizerConfig,

    /// Note segmentation hysteresis
    pub segmenter: SegmenterConfig,

    /// Tempo grid used for quantization and notation
    pub grid: QuantizationGrid,

    /// Snap notes to the grid (default: true)
    pub quantize: bool,

    /// Replace the grid tempo with an estimate when capture finishes (default: true)
    pub auto_tempo: bool,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            stabilizer: StabilizerConfig::default(),
            segmenter: SegmenterConfig::default(),
            grid: QuantizationGrid::default(),
            quantize: true,
            auto_tempo: true,
        }
    }
}

impl TranscriberConfig {
    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Writes this config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }
}
