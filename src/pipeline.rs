//! Pipeline orchestration
//!
//! This module provides the public API for Sleepwatch. It ties decoding,
//! scoring, storage, outward encoding and the control channel together.

use crate::config::ScoringConfig;
use crate::control::{ControlChannel, SETTING_TOPIC};
use crate::encoder::RecordEncoder;
use crate::error::ComputeError;
use crate::schema::{DecodedPayload, ReadingAdapter};
use crate::scoring::SleepQualityScorer;
use crate::store::{Point, PointFields, ReadingStore, StoredSensor};
use crate::types::{LightSchedule, Measurement, SchedulePatch, ScoredReading};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Length of the window returned by [`SleepProcessor::last_day`]
pub const LAST_DAY_HOURS: i64 = 24;

/// Score a single reading with the default configuration.
///
/// # Arguments
/// * `json` - One device reading as JSON
///
/// # Returns
/// The outward JSON record: the reading fields plus `dataPoint`,
/// `currentTime` (the reading's own timestamp, or now) and `deviceId`.
///
/// # Example
/// ```ignore
/// let scored = score_reading_json(r#"{"heartRate": 55, "motion": 0.1}"#)?;
/// ```
pub fn score_reading_json(json: &str) -> Result<String, ComputeError> {
    let config = ScoringConfig::default();
    let scorer = SleepQualityScorer::from_config(&config);
    let reading = ReadingAdapter::parse_reading(json)?;
    let assessment = scorer.score(&reading)?;

    let scored = ScoredReading {
        current_time: reading.observed_at.unwrap_or_else(Utc::now),
        data_point: assessment.score,
        device_id: config.device_id,
        flags: assessment.flag_labels(),
        reading,
    };
    serde_json::to_string(&scored).map_err(ComputeError::JsonError)
}

/// Stateful processor for one device.
///
/// Owns the scorer, the point store and the control channel; all three are
/// passed in at construction.
pub struct SleepProcessor<S: ReadingStore, C: ControlChannel> {
    config: ScoringConfig,
    scorer: SleepQualityScorer,
    encoder: RecordEncoder,
    store: S,
    channel: C,
}

impl<S: ReadingStore, C: ControlChannel> SleepProcessor<S, C> {
    /// Create a processor after validating the configuration
    pub fn new(config: ScoringConfig, store: S, channel: C) -> Result<Self, ComputeError> {
        config.validate()?;
        let scorer = SleepQualityScorer::from_config(&config);
        Ok(Self {
            encoder: RecordEncoder::new(scorer.clone()),
            scorer,
            config,
            store,
            channel,
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn scorer(&self) -> &SleepQualityScorer {
        &self.scorer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Give back the store and channel
    pub fn into_parts(self) -> (S, C) {
        (self.store, self.channel)
    }

    /// Decode and persist a payload received on `topic`.
    ///
    /// Sensor readings are scored before they are written; the score is stored
    /// alongside the reading.
    pub fn ingest(
        &mut self,
        topic: &str,
        payload: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Point, ComputeError> {
        let measurement = Measurement::from_topic(topic)?;
        let fields = match ReadingAdapter::decode_payload(measurement, payload)? {
            DecodedPayload::Sensor(reading) => {
                let assessment = self.scorer.score(&reading)?;
                PointFields::Sensor(StoredSensor {
                    reading,
                    data_point: Some(assessment.score),
                })
            }
            DecodedPayload::Posture(posture) => PointFields::Posture(posture),
            DecodedPayload::Setting(schedule) => PointFields::Setting(schedule),
        };

        let point = Point::new(&self.config.device_id, received_at, fields);
        self.store.write_point(point.clone())?;
        log::debug!(
            "stored {} point {} for {}",
            measurement.as_str(),
            point.id,
            point.device_id
        );
        Ok(point)
    }

    /// Most recent record of a measurement, in outward form
    pub fn latest(&self, measurement: Measurement) -> Result<Option<Value>, ComputeError> {
        self.store
            .last_point(measurement, &self.config.device_id)?
            .map(|point| self.encoder.encode(&point))
            .transpose()
    }

    /// Records of a measurement from the 24 hours before `now`, oldest first
    pub fn last_day(
        &self,
        measurement: Measurement,
        now: DateTime<Utc>,
    ) -> Result<Vec<Value>, ComputeError> {
        let since = now - Duration::hours(LAST_DAY_HOURS);
        let points = self
            .store
            .points_since(measurement, &self.config.device_id, since)?;
        self.encoder.encode_all(&points)
    }

    /// Currently stored lamp schedule, if any
    pub fn current_schedule(&self) -> Result<Option<LightSchedule>, ComputeError> {
        let point = self
            .store
            .last_point(Measurement::Setting, &self.config.device_id)?;
        Ok(point.and_then(|p| match p.fields {
            PointFields::Setting(schedule) => Some(schedule),
            _ => None,
        }))
    }

    /// Merge a schedule edit with the stored schedule, persist it and push it
    /// to the device. A failed publish removes the stored point again.
    pub fn update_schedule(
        &mut self,
        patch: &SchedulePatch,
        now: DateTime<Utc>,
    ) -> Result<LightSchedule, ComputeError> {
        let current = self.current_schedule()?;
        let merged = LightSchedule::merge(current.as_ref(), patch);
        merged.validate()?;

        let payload = serde_json::to_string(&merged)?;
        let point = Point::new(&self.config.device_id, now, PointFields::Setting(merged));
        let point_id = point.id;
        self.store.write_point(point)?;

        // the stored schedule must match what the device received
        if let Err(e) = self.channel.publish(SETTING_TOPIC, &payload) {
            log::warn!("schedule publish failed, rolling back stored point: {e}");
            self.store.remove_point(point_id)?;
            return Err(e);
        }

        let (on, off) = merged.formatted();
        log::info!(
            "published lamp schedule on {on} off {off} to {}",
            self.config.device_id
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingFieldPolicy;
    use crate::control::Outbox;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const GOLDEN: &str = r#"{"heartRate": 55, "motion": 0.1, "humid": 45,
        "temp": 25, "sound": 25, "brightness": 20, "light": false}"#;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn processor() -> SleepProcessor<MemoryStore, Outbox> {
        SleepProcessor::new(ScoringConfig::default(), MemoryStore::new(), Outbox::new()).unwrap()
    }

    #[test]
    fn test_score_reading_json() {
        let json = score_reading_json(
            r#"{"heartRate": 55, "motion": 0.1, "humid": 45, "temp": 25,
                "sound": 25, "brightness": 20, "currentTime": "2024-03-01 23:00:00"}"#,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["dataPoint"], 98.0);
        assert_eq!(value["currentTime"], "2024-03-01T23:00:00Z");
        assert_eq!(value["deviceId"], "prototype_device");
        assert!(value.get("flags").is_none());
    }

    #[test]
    fn test_score_reading_json_no_signal() {
        let json = score_reading_json(r#"{"heartRate": "0", "motion": false}"#).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["dataPoint"], 0.0);
        let flags = value["flags"].as_array().unwrap();
        assert!(flags.contains(&Value::from("no_signal")));
    }

    #[test]
    fn test_score_reading_json_invalid() {
        assert!(matches!(
            score_reading_json("not json"),
            Err(ComputeError::JsonError(_))
        ));
    }

    #[test]
    fn test_ingest_scores_and_stores_sensor() {
        let mut processor = processor();
        let point = processor.ingest("sensor", GOLDEN, t(0)).unwrap();

        match &point.fields {
            PointFields::Sensor(sensor) => assert_eq!(sensor.data_point, Some(98.0)),
            other => panic!("expected sensor fields, got {other:?}"),
        }
        assert_eq!(processor.store().len(), 1);

        let latest = processor.latest(Measurement::Sensor).unwrap().unwrap();
        assert_eq!(latest["dataPoint"], 98.0);
        assert_eq!(latest["currentTime"], "2024-03-01T23:00:00Z");
        assert_eq!(latest["light"], false);
    }

    #[test]
    fn test_ingest_posture_and_unknown_topic() {
        let mut processor = processor();
        processor
            .ingest("posture", r#"{"posture": "Right side"}"#, t(0))
            .unwrap();

        let latest = processor.latest(Measurement::Posture).unwrap().unwrap();
        assert_eq!(latest["posture"], "Right side");
        assert!(processor.latest(Measurement::Setting).unwrap().is_none());

        assert!(matches!(
            processor.ingest("camera", "{}", t(1)),
            Err(ComputeError::UnknownMeasurement(_))
        ));
    }

    #[test]
    fn test_reject_policy_does_not_store() {
        let config = ScoringConfig {
            missing_fields: MissingFieldPolicy::Reject,
            ..Default::default()
        };
        let mut processor =
            SleepProcessor::new(config, MemoryStore::new(), Outbox::new()).unwrap();

        let result = processor.ingest("sensor", r#"{"heartRate": 55}"#, t(0));
        assert!(matches!(result, Err(ComputeError::MissingField(_))));
        assert!(processor.store().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ScoringConfig::default();
        config.weights.light = 0.5;
        assert!(matches!(
            SleepProcessor::new(config, MemoryStore::new(), Outbox::new()),
            Err(ComputeError::InvalidWeights(_))
        ));
    }

    #[test]
    fn test_last_day_window() {
        let mut processor = processor();
        processor.ingest("sensor", GOLDEN, t(0)).unwrap();
        processor.ingest("sensor", GOLDEN, t(60 * 20)).unwrap();
        processor
            .ingest("sensor", r#"{"heartRate": 20}"#, t(60 * 26))
            .unwrap();

        let now = t(60 * 26);
        let records = processor.last_day(Measurement::Sensor, now).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["currentTime"], "2024-03-02T19:00:00Z");
        assert_eq!(records[1]["dataPoint"], 0.0);
    }

    #[test]
    fn test_update_schedule_merges_and_publishes() {
        let mut processor = processor();
        processor
            .ingest(
                "setting",
                r#"{"lightOnHour": 6, "lightOnMin": 30, "lightOffHour": 22, "lightOffMin": 15}"#,
                t(0),
            )
            .unwrap();

        let patch = SchedulePatch {
            light_off_hour: Some(23),
            light_on_min: Some(0),
            ..Default::default()
        };
        let merged = processor.update_schedule(&patch, t(5)).unwrap();
        assert_eq!(
            merged,
            LightSchedule {
                light_on_hour: 6,
                light_on_min: 0,
                light_off_hour: 23,
                light_off_min: 15,
            }
        );

        let sent = processor.channel_mut().drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "setting");
        let payload: LightSchedule = serde_json::from_str(&sent[0].payload).unwrap();
        assert_eq!(payload, merged);

        assert_eq!(processor.current_schedule().unwrap(), Some(merged));
    }

    struct OfflineStore;

    impl ReadingStore for OfflineStore {
        fn write_point(&mut self, _point: Point) -> Result<(), ComputeError> {
            Err(ComputeError::Storage("connection refused".to_string()))
        }

        fn remove_point(&mut self, _id: uuid::Uuid) -> Result<bool, ComputeError> {
            Ok(false)
        }

        fn last_point(
            &self,
            _measurement: Measurement,
            _device_id: &str,
        ) -> Result<Option<Point>, ComputeError> {
            Ok(None)
        }

        fn points_since(
            &self,
            _measurement: Measurement,
            _device_id: &str,
            _since: DateTime<Utc>,
        ) -> Result<Vec<Point>, ComputeError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_storage_failure_is_surfaced_and_not_published() {
        let mut processor =
            SleepProcessor::new(ScoringConfig::default(), OfflineStore, Outbox::new()).unwrap();

        assert!(matches!(
            processor.ingest("sensor", GOLDEN, t(0)),
            Err(ComputeError::Storage(_))
        ));

        let patch = SchedulePatch {
            light_on_hour: Some(7),
            ..Default::default()
        };
        assert!(processor.update_schedule(&patch, t(1)).is_err());
        assert!(processor.channel_mut().messages().is_empty());
    }

    struct DisconnectedChannel;

    impl ControlChannel for DisconnectedChannel {
        fn publish(&mut self, _topic: &str, _payload: &str) -> Result<(), ComputeError> {
            Err(ComputeError::Publish("broker disconnected".to_string()))
        }
    }

    #[test]
    fn test_failed_publish_keeps_previous_schedule() {
        let mut processor = SleepProcessor::new(
            ScoringConfig::default(),
            MemoryStore::new(),
            DisconnectedChannel,
        )
        .unwrap();
        processor
            .ingest("setting", r#"{"lightOnHour": 6, "lightOffHour": 22}"#, t(0))
            .unwrap();

        let patch = SchedulePatch {
            light_on_hour: Some(7),
            ..Default::default()
        };
        assert!(matches!(
            processor.update_schedule(&patch, t(5)),
            Err(ComputeError::Publish(_))
        ));

        let schedule = processor.current_schedule().unwrap().unwrap();
        assert_eq!(schedule.light_on_hour, 6);
        let latest = processor.latest(Measurement::Setting).unwrap().unwrap();
        assert_eq!(latest["lightOnHour"], 6);
        assert_eq!(processor.store().len(), 1);
    }

    #[test]
    fn test_update_schedule_rejects_invalid_time() {
        let mut processor = processor();
        let patch = SchedulePatch {
            light_on_hour: Some(24),
            ..Default::default()
        };
        assert!(matches!(
            processor.update_schedule(&patch, t(0)),
            Err(ComputeError::InvalidSchedule(_))
        ));

        let (store, outbox) = processor.into_parts();
        assert!(store.is_empty());
        assert!(outbox.messages().is_empty());
    }
}
