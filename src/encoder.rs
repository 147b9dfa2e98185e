//! Outward encoding
//!
//! This module turns stored points into the JSON records handed to the
//! dashboard. The storage timestamp is exposed only as `currentTime`, and
//! sensor points always carry a `dataPoint` score.

use crate::error::ComputeError;
use crate::scoring::SleepQualityScorer;
use crate::store::{Point, PointFields, StoredSensor};
use crate::types::ScoredReading;
use serde::Serialize;
use serde_json::Value;

/// Key under which the storage timestamp is exposed
pub const CURRENT_TIME_KEY: &str = "currentTime";

/// Encoder for outward point representations
#[derive(Debug, Clone, Default)]
pub struct RecordEncoder {
    scorer: SleepQualityScorer,
}

impl RecordEncoder {
    /// Create an encoder that scores unscored sensor points with `scorer`
    pub fn new(scorer: SleepQualityScorer) -> Self {
        Self { scorer }
    }

    /// Encode a point into its outward JSON value
    pub fn encode(&self, point: &Point) -> Result<Value, ComputeError> {
        match &point.fields {
            PointFields::Sensor(sensor) => {
                let scored = self.scored_reading(point, sensor)?;
                serde_json::to_value(scored).map_err(ComputeError::JsonError)
            }
            PointFields::Posture(posture) => with_current_time(posture, point),
            PointFields::Setting(schedule) => with_current_time(schedule, point),
        }
    }

    /// Encode a batch of points, preserving order
    pub fn encode_all(&self, points: &[Point]) -> Result<Vec<Value>, ComputeError> {
        points.iter().map(|p| self.encode(p)).collect()
    }

    /// Encode to a JSON string
    pub fn encode_to_json(&self, point: &Point) -> Result<String, ComputeError> {
        let value = self.encode(point)?;
        serde_json::to_string(&value).map_err(ComputeError::JsonError)
    }

    fn scored_reading(
        &self,
        point: &Point,
        sensor: &StoredSensor,
    ) -> Result<ScoredReading, ComputeError> {
        let (data_point, flags) = match sensor.data_point {
            Some(score) => (score, Vec::new()),
            None => {
                let assessment = self.scorer.score(&sensor.reading)?;
                let flags = assessment.flag_labels();
                (assessment.score, flags)
            }
        };

        Ok(ScoredReading {
            reading: sensor.reading.clone(),
            data_point,
            current_time: point.time,
            device_id: point.device_id.clone(),
            flags,
        })
    }
}

fn with_current_time<T: Serialize>(fields: &T, point: &Point) -> Result<Value, ComputeError> {
    let mut value = serde_json::to_value(fields)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert(
                CURRENT_TIME_KEY.to_string(),
                serde_json::to_value(point.time)?,
            );
            Ok(value)
        }
        None => Err(ComputeError::ParseError(format!(
            "{} fields did not encode as an object",
            point.measurement().as_str()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingFieldPolicy;
    use crate::normalizer::Calibration;
    use crate::scoring::WeightVector;
    use crate::types::{LightSchedule, Motion, PostureReading, SensorReading};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap()
    }

    fn golden_reading() -> SensorReading {
        SensorReading {
            heart_rate: Some(55.0),
            motion: Some(Motion::Fraction(0.1)),
            humid: Some(45.0),
            temp: Some(25.0),
            sound: Some(25.0),
            brightness: Some(20.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_sensor_scored_at_read_time() {
        let point = Point::new(
            "prototype_device",
            time(),
            PointFields::Sensor(StoredSensor {
                reading: golden_reading(),
                data_point: None,
            }),
        );

        let value = RecordEncoder::default().encode(&point).unwrap();
        assert_eq!(value["dataPoint"], 98.0);
        assert_eq!(value["currentTime"], "2024-03-01T23:00:00Z");
        assert_eq!(value["deviceId"], "prototype_device");
        assert_eq!(value["heartRate"], 55.0);
        assert!(value.get("time").is_none());
    }

    #[test]
    fn test_sensor_keeps_stored_score() {
        let point = Point::new(
            "prototype_device",
            time(),
            PointFields::Sensor(StoredSensor {
                reading: golden_reading(),
                data_point: Some(71.5),
            }),
        );

        let value = RecordEncoder::default().encode(&point).unwrap();
        assert_eq!(value["dataPoint"], 71.5);
    }

    #[test]
    fn test_read_time_flags_are_reported() {
        let point = Point::new(
            "prototype_device",
            time(),
            PointFields::Sensor(StoredSensor {
                reading: SensorReading {
                    humid: None,
                    ..golden_reading()
                },
                data_point: None,
            }),
        );

        let value = RecordEncoder::default().encode(&point).unwrap();
        assert_eq!(value["flags"], serde_json::json!(["defaulted_humid"]));
    }

    #[test]
    fn test_reject_policy_surfaces_error() {
        let scorer = SleepQualityScorer::new(
            WeightVector::default(),
            Calibration::default(),
            MissingFieldPolicy::Reject,
        );
        let point = Point::new(
            "prototype_device",
            time(),
            PointFields::Sensor(StoredSensor {
                reading: SensorReading::default(),
                data_point: None,
            }),
        );

        assert!(matches!(
            RecordEncoder::new(scorer).encode(&point),
            Err(ComputeError::MissingField(_))
        ));
    }

    #[test]
    fn test_posture_and_setting_fields() {
        let encoder = RecordEncoder::default();

        let posture = Point::new(
            "prototype_device",
            time(),
            PointFields::Posture(PostureReading {
                posture: "Back".to_string(),
            }),
        );
        assert_eq!(
            encoder.encode(&posture).unwrap(),
            serde_json::json!({"posture": "Back", "currentTime": "2024-03-01T23:00:00Z"})
        );

        let setting = Point::new(
            "prototype_device",
            time(),
            PointFields::Setting(LightSchedule {
                light_on_hour: 6,
                light_on_min: 30,
                light_off_hour: 22,
                light_off_min: 0,
            }),
        );
        assert_eq!(
            encoder.encode(&setting).unwrap(),
            serde_json::json!({
                "lightOnHour": 6,
                "lightOnMin": 30,
                "lightOffHour": 22,
                "lightOffMin": 0,
                "currentTime": "2024-03-01T23:00:00Z"
            })
        );
    }
}
