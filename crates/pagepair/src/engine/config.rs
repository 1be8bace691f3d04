use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PairError, Result};
use crate::oracle::AlignerConfig;
use crate::preprocess::IngestOptions;

/// Number of consecutive originals, from the front, tried per overlay.
pub const DEFAULT_SEARCH_RANGE: usize = 10;
/// Per-image feature cap handed to the oracle.
pub const DEFAULT_FEATURE_BUDGET: usize = 10_000;

/// Top-level pairing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Originals examined per overlay, counted from the buffer front.
    pub search_range: usize,
    /// Feature budget forwarded to the oracle.
    pub feature_budget: usize,
    /// Normalization of original pages.
    pub original: IngestOptions,
    /// Normalization of overlay pages.
    pub overlay: IngestOptions,
    /// Default oracle tuning.
    pub aligner: AlignerConfig,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            search_range: DEFAULT_SEARCH_RANGE,
            feature_budget: DEFAULT_FEATURE_BUDGET,
            original: IngestOptions::default(),
            overlay: IngestOptions::default(),
            aligner: AlignerConfig::default(),
        }
    }
}

impl PairingConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config_err = |message: String| PairError::Config {
            path: path.to_path_buf(),
            message,
        };
        let data = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| config_err(e.to_string()))
    }
}
