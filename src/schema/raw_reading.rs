//! Device reading wire format
//!
//! Firmware revisions disagree on field types: heart rate may arrive as a
//! number or a numeric string, motion as a boolean flag or a fraction, and
//! `light` as either a brightness value or the lamp relay status. `RawReading`
//! accepts any JSON value per channel and coerces it into a typed
//! [`SensorReading`], reporting every field it could not use.

use crate::types::{Factor, Motion, SensorReading};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timestamp layout used by the device gateway
pub const GATEWAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Permissive wire record; every channel may be any JSON value or absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humid: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<Value>,
    /// Observation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<Value>,
    /// Time column of time-series exports; used only when `currentTime` is absent
    #[serde(default, rename = "_time", skip_serializing_if = "Option::is_none")]
    pub export_time: Option<Value>,
}

/// A field that could not be used as-is
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing field: {0}")]
    Missing(String),

    #[error("Non-numeric value for {field}: {value}")]
    NonNumeric { field: String, value: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl RawReading {
    /// Coerce into a typed reading, collecting issues for unusable fields
    pub fn to_reading(&self) -> (SensorReading, Vec<ValidationError>) {
        let mut issues = Vec::new();

        let heart_rate = numeric_field(
            Factor::HeartRate.as_str(),
            self.heart_rate.as_ref(),
            &mut issues,
        );
        let motion = motion_field(self.motion.as_ref(), &mut issues);
        let humid = numeric_field(Factor::Humid.as_str(), self.humid.as_ref(), &mut issues);
        let temp = numeric_field(Factor::Temp.as_str(), self.temp.as_ref(), &mut issues);
        let sound = numeric_field(Factor::Sound.as_str(), self.sound.as_ref(), &mut issues);
        let (brightness, lamp_on) =
            light_fields(self.brightness.as_ref(), self.light.as_ref(), &mut issues);

        let timestamp = match &self.current_time {
            None | Some(Value::Null) => self.export_time.as_ref(),
            Some(value) => Some(value),
        };
        let observed_at = match timestamp {
            None | Some(Value::Null) => None,
            Some(value) => match parse_timestamp(value) {
                Some(ts) => Some(ts),
                None => {
                    issues.push(ValidationError::InvalidTimestamp(value.to_string()));
                    None
                }
            },
        };

        let reading = SensorReading {
            heart_rate,
            motion,
            humid,
            temp,
            sound,
            brightness,
            lamp_on,
            observed_at,
        };

        (reading, issues)
    }
}

/// Coerce a wire value to a finite number.
///
/// Numbers pass through, booleans become 1/0 and numeric strings are parsed.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn numeric_field(
    name: &str,
    value: Option<&Value>,
    issues: &mut Vec<ValidationError>,
) -> Option<f64> {
    match value {
        None | Some(Value::Null) => {
            issues.push(ValidationError::Missing(name.to_string()));
            None
        }
        Some(v) => {
            let number = coerce_number(v);
            if number.is_none() {
                issues.push(ValidationError::NonNumeric {
                    field: name.to_string(),
                    value: v.to_string(),
                });
            }
            number
        }
    }
}

fn motion_field(value: Option<&Value>, issues: &mut Vec<ValidationError>) -> Option<Motion> {
    match value {
        Some(Value::Bool(detected)) => Some(Motion::Detected(*detected)),
        other => numeric_field(Factor::Motion.as_str(), other, issues).map(Motion::Fraction),
    }
}

fn light_fields(
    brightness: Option<&Value>,
    light: Option<&Value>,
    issues: &mut Vec<ValidationError>,
) -> (Option<f64>, Option<bool>) {
    let lamp_on = match light {
        Some(Value::Bool(on)) => Some(*on),
        _ => None,
    };

    let present = |v: Option<&Value>| !matches!(v, None | Some(Value::Null));
    let source = if present(brightness) {
        brightness
    } else if lamp_on.is_none() {
        light
    } else {
        None
    };

    (numeric_field(Factor::Light.as_str(), source, issues), lamp_on)
}

/// Parse an RFC 3339 string, a gateway `YYYY-MM-DD HH:MM:SS` string (UTC) or
/// epoch milliseconds
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, GATEWAY_TIME_FORMAT)
                        .ok()
                        .map(|naive| Utc.from_utc_datetime(&naive))
                })
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}
