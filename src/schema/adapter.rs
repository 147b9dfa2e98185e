//! Adapter for converting device payloads into typed records
//!
//! Handles batch decoding (JSON arrays and NDJSON), per-topic payload decoding
//! and averaging raw device samples into one reading per interval.

use crate::error::ComputeError;
use crate::schema::raw_reading::{RawReading, ValidationError};
use crate::types::{LightSchedule, Measurement, Motion, PostureReading, SensorReading};
use chrono::{DateTime, Duration, Utc};

/// Adapter for converting device payloads into readings
pub struct ReadingAdapter;

impl ReadingAdapter {
    /// Parse a JSON string containing an array of readings
    pub fn parse_array(json: &str) -> Result<Vec<RawReading>, ComputeError> {
        let readings: Vec<RawReading> = serde_json::from_str(json)?;
        Ok(readings)
    }

    /// Parse NDJSON (newline-delimited JSON) containing readings
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawReading>, ComputeError> {
        let mut readings = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawReading>(trimmed) {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(readings)
    }

    /// Decode a single sensor payload
    pub fn parse_reading(json: &str) -> Result<SensorReading, ComputeError> {
        let raw: RawReading = serde_json::from_str(json)?;
        let (reading, issues) = raw.to_reading();
        if !issues.is_empty() {
            log::debug!(
                "reading decoded with {} unusable field(s): {}",
                issues.len(),
                issues
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }
        Ok(reading)
    }

    /// Convert raw readings to typed readings, dropping issue details
    pub fn to_readings(raw: &[RawReading]) -> Vec<SensorReading> {
        raw.iter().map(|r| r.to_reading().0).collect()
    }

    /// Validate a batch of readings, returning only those with issues
    pub fn validate_readings(raw: &[RawReading]) -> Vec<ValidationResult> {
        raw.iter()
            .enumerate()
            .map(|(idx, reading)| ValidationResult {
                index: idx,
                issues: reading.to_reading().1,
            })
            .filter(|r| !r.issues.is_empty())
            .collect()
    }

    /// Decode a payload published on a device topic
    pub fn decode_payload(
        measurement: Measurement,
        json: &str,
    ) -> Result<DecodedPayload, ComputeError> {
        match measurement {
            Measurement::Sensor => Ok(DecodedPayload::Sensor(Self::parse_reading(json)?)),
            Measurement::Posture => {
                let posture: PostureReading = serde_json::from_str(json)?;
                Ok(DecodedPayload::Posture(posture))
            }
            Measurement::Setting => {
                let schedule: LightSchedule = serde_json::from_str(json)?;
                schedule.validate()?;
                Ok(DecodedPayload::Setting(schedule))
            }
        }
    }
}

/// Typed payload for one of the device topics
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Sensor(SensorReading),
    Posture(PostureReading),
    Setting(LightSchedule),
}

/// Validation outcome for one reading in a batch
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub issues: Vec<ValidationError>,
}

/// Averages device samples into one reading per interval.
///
/// The first sample is emitted on its own; after that, samples accumulate until
/// the interval since the last emission has elapsed, at which point the mean of
/// each channel is emitted and the window is cleared.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    interval: Duration,
    last_emit: Option<DateTime<Utc>>,
    heart_rate: Vec<f64>,
    motion: Vec<f64>,
    humid: Vec<f64>,
    temp: Vec<f64>,
    sound: Vec<f64>,
    brightness: Vec<f64>,
    lamp_on: Option<bool>,
}

impl SampleWindow {
    /// Create a window; intervals that do not fit a time span are rejected
    pub fn new(interval_secs: u64) -> Result<Self, ComputeError> {
        let interval = i64::try_from(interval_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                ComputeError::ParseError(format!(
                    "sample interval of {interval_secs} s is out of range"
                ))
            })?;
        Ok(Self {
            interval,
            last_emit: None,
            heart_rate: Vec::new(),
            motion: Vec::new(),
            humid: Vec::new(),
            temp: Vec::new(),
            sound: Vec::new(),
            brightness: Vec::new(),
            lamp_on: None,
        })
    }

    /// Number of samples collected since the last emission
    pub fn len(&self) -> usize {
        [
            self.heart_rate.len(),
            self.motion.len(),
            self.humid.len(),
            self.temp.len(),
            self.sound.len(),
            self.brightness.len(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a sample; returns the averaged reading when the interval has elapsed
    pub fn push(&mut self, sample: &SensorReading, at: DateTime<Utc>) -> Option<SensorReading> {
        push_finite(&mut self.heart_rate, sample.heart_rate);
        push_finite(&mut self.motion, sample.motion.map(|m| m.fraction()));
        push_finite(&mut self.humid, sample.humid);
        push_finite(&mut self.temp, sample.temp);
        push_finite(&mut self.sound, sample.sound);
        push_finite(&mut self.brightness, sample.brightness);
        if sample.lamp_on.is_some() {
            self.lamp_on = sample.lamp_on;
        }

        let due = match self.last_emit {
            None => true,
            Some(last) => at - last >= self.interval,
        };
        if due {
            self.flush(at)
        } else {
            None
        }
    }

    /// Emit whatever has accumulated, if anything
    pub fn flush(&mut self, at: DateTime<Utc>) -> Option<SensorReading> {
        if self.is_empty() && self.lamp_on.is_none() {
            return None;
        }

        let reading = SensorReading {
            heart_rate: mean(&self.heart_rate),
            motion: mean(&self.motion).map(Motion::Fraction),
            humid: mean(&self.humid),
            temp: mean(&self.temp),
            sound: mean(&self.sound),
            brightness: mean(&self.brightness),
            lamp_on: self.lamp_on,
            observed_at: Some(at),
        };

        log::debug!("sample window emitted {} sample(s)", self.len());

        self.heart_rate.clear();
        self.motion.clear();
        self.humid.clear();
        self.temp.clear();
        self.sound.clear();
        self.brightness.clear();
        self.lamp_on = None;
        self.last_emit = Some(at);

        Some(reading)
    }
}

fn push_finite(values: &mut Vec<f64>, value: Option<f64>) {
    if let Some(v) = value.filter(|v| v.is_finite()) {
        values.push(v);
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
