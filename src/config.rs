//! Scoring configuration
//!
//! Weights, calibration and the missing-field policy can be overridden from a
//! JSON document; every field falls back to its default when omitted.

use crate::error::ComputeError;
use crate::normalizer::Calibration;
use crate::scoring::WeightVector;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Device identifier used when none is configured
pub const DEFAULT_DEVICE_ID: &str = "prototype_device";

/// Default interval over which device samples are averaged (seconds)
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 10;

/// Longest accepted averaging interval (one day)
pub const MAX_SAMPLE_INTERVAL_SECS: u64 = 86_400;

/// What to do when a reading lacks a channel or carries a non-numeric value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Substitute zero and flag the reading
    #[default]
    Zero,
    /// Refuse to score the reading
    Reject,
}

/// Complete configuration for scoring and ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: WeightVector,
    pub calibration: Calibration,
    pub missing_fields: MissingFieldPolicy,
    pub device_id: String,
    pub sample_interval_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: WeightVector::default(),
            calibration: Calibration::default(),
            missing_fields: MissingFieldPolicy::default(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
        }
    }
}

impl ScoringConfig {
    /// Parse and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: ScoringConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ComputeError::ParseError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        self.weights.validate()?;
        self.calibration.validate()?;
        if self.device_id.trim().is_empty() {
            return Err(ComputeError::ParseError(
                "device_id must not be empty".to_string(),
            ));
        }
        if self.sample_interval_secs == 0 {
            return Err(ComputeError::ParseError(
                "sample_interval_secs must be positive".to_string(),
            ));
        }
        if self.sample_interval_secs > MAX_SAMPLE_INTERVAL_SECS {
            return Err(ComputeError::ParseError(format!(
                "sample_interval_secs must be at most {MAX_SAMPLE_INTERVAL_SECS}, got {}",
                self.sample_interval_secs
            )));
        }
        Ok(())
    }
}
