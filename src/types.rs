//! Core types for the Sleepwatch pipeline
//!
//! This module defines the records that flow through each stage: the device
//! reading with its optional channels, the resolved scoring input, sub-scores,
//! quality flags and the outward-facing scored representation.

use crate::error::ComputeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the six channels that contribute to the sleep quality score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Factor {
    HeartRate,
    Motion,
    Temp,
    Humid,
    Sound,
    Light,
}

impl Factor {
    /// All factors in weight-vector order
    pub const ALL: [Factor; 6] = [
        Factor::HeartRate,
        Factor::Motion,
        Factor::Temp,
        Factor::Humid,
        Factor::Sound,
        Factor::Light,
    ];

    /// Wire name of the factor
    pub fn as_str(&self) -> &'static str {
        match self {
            Factor::HeartRate => "heartRate",
            Factor::Motion => "motion",
            Factor::Temp => "temp",
            Factor::Humid => "humid",
            Factor::Sound => "sound",
            Factor::Light => "light",
        }
    }

    fn snake_name(&self) -> &'static str {
        match self {
            Factor::HeartRate => "heart_rate",
            Factor::Motion => "motion",
            Factor::Temp => "temp",
            Factor::Humid => "humid",
            Factor::Sound => "sound",
            Factor::Light => "light",
        }
    }
}

/// Motion channel as reported by the device.
///
/// Older firmware sends a boolean "motion detected" flag, newer firmware a
/// continuous 0-1 intensity (the share of the sampling window with movement).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Motion {
    Detected(bool),
    Fraction(f64),
}

impl Motion {
    /// Motion as a 0-1 fraction; a detected flag becomes 1, otherwise 0
    pub fn fraction(&self) -> f64 {
        match self {
            Motion::Detected(true) => 1.0,
            Motion::Detected(false) => 0.0,
            Motion::Fraction(value) => *value,
        }
    }
}

/// A single reading from the bedside device.
///
/// Every channel is optional; how absent channels are resolved is decided by
/// the scorer's [`crate::config::MissingFieldPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// Heart rate (beats per minute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    /// Motion flag or intensity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<Motion>,
    /// Relative humidity (percent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humid: Option<f64>,
    /// Room temperature (celsius)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    /// Sound level (decibels)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<f64>,
    /// Brightness points (0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    /// Lamp relay status
    #[serde(default, rename = "light", skip_serializing_if = "Option::is_none")]
    pub lamp_on: Option<bool>,
    /// When the device took the reading, if it reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

/// Fully resolved input to the aggregator; every channel is present
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringInput {
    pub heart_rate: f64,
    /// Motion fraction (0-1)
    pub motion: f64,
    pub temp: f64,
    pub humid: f64,
    pub sound: f64,
    pub light: f64,
}

/// Per-factor comfort sub-scores (each 0-100)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub heart_rate: f64,
    pub motion: f64,
    pub temp: f64,
    pub humid: f64,
    pub sound: f64,
    pub light: f64,
}

impl SubScores {
    /// Every factor at the same sub-score
    pub fn uniform(value: f64) -> Self {
        Self {
            heart_rate: value,
            motion: value,
            temp: value,
            humid: value,
            sound: value,
            light: value,
        }
    }

    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::HeartRate => self.heart_rate,
            Factor::Motion => self.motion,
            Factor::Temp => self.temp,
            Factor::Humid => self.humid,
            Factor::Sound => self.sound,
            Factor::Light => self.light,
        }
    }
}

/// Quality flag attached to a scored reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityFlag {
    /// The channel was missing or non-numeric and was replaced by its default
    Defaulted(Factor),
    /// Heart rate indicated no sensor contact; the score was forced to zero
    NoSignal,
}

impl QualityFlag {
    /// Stable snake_case label used in outward payloads
    pub fn label(&self) -> String {
        match self {
            QualityFlag::Defaulted(factor) => format!("defaulted_{}", factor.snake_name()),
            QualityFlag::NoSignal => "no_signal".to_string(),
        }
    }
}

/// Kind of record published by the device, one per topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measurement {
    Sensor,
    Posture,
    Setting,
}

impl Measurement {
    pub const ALL: [Measurement; 3] = [
        Measurement::Sensor,
        Measurement::Posture,
        Measurement::Setting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Measurement::Sensor => "sensor",
            Measurement::Posture => "posture",
            Measurement::Setting => "setting",
        }
    }

    /// Measurement for a topic name
    pub fn from_topic(topic: &str) -> Result<Self, ComputeError> {
        match topic.trim() {
            "sensor" => Ok(Measurement::Sensor),
            "posture" => Ok(Measurement::Posture),
            "setting" => Ok(Measurement::Setting),
            other => Err(ComputeError::UnknownMeasurement(other.to_string())),
        }
    }
}

/// Sleep pose label reported by the camera pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureReading {
    pub posture: String,
}

/// Lamp on/off schedule pushed to the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightSchedule {
    #[serde(default)]
    pub light_on_hour: u32,
    #[serde(default)]
    pub light_on_min: u32,
    #[serde(default)]
    pub light_off_hour: u32,
    #[serde(default)]
    pub light_off_min: u32,
}

/// Partial schedule update as submitted by the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePatch {
    #[serde(default)]
    pub light_on_hour: Option<u32>,
    #[serde(default)]
    pub light_on_min: Option<u32>,
    #[serde(default)]
    pub light_off_hour: Option<u32>,
    #[serde(default)]
    pub light_off_min: Option<u32>,
}

/// Outward representation of a sensor reading with its score attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredReading {
    #[serde(flatten)]
    pub reading: SensorReading,
    /// Sleep quality score (0-100, two decimals)
    pub data_point: f64,
    /// Storage timestamp of the reading
    pub current_time: DateTime<Utc>,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}
