//! Time-series point storage
//!
//! Readings are persisted as points tagged with a measurement and a device id.
//! Storage sits behind the [`ReadingStore`] trait so the processor receives an
//! explicitly constructed store rather than reaching for a process-wide client.

use crate::error::ComputeError;
use crate::types::{LightSchedule, Measurement, PostureReading, SensorReading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sensor fields as persisted, with the score computed at ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSensor {
    #[serde(flatten)]
    pub reading: SensorReading,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_point: Option<f64>,
}

/// Field set of a point, by measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "measurement", content = "values", rename_all = "lowercase")]
pub enum PointFields {
    Sensor(StoredSensor),
    Posture(PostureReading),
    Setting(LightSchedule),
}

impl PointFields {
    pub fn measurement(&self) -> Measurement {
        match self {
            PointFields::Sensor(_) => Measurement::Sensor,
            PointFields::Posture(_) => Measurement::Posture,
            PointFields::Setting(_) => Measurement::Setting,
        }
    }
}

/// A persisted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: Uuid,
    pub device_id: String,
    pub time: DateTime<Utc>,
    pub fields: PointFields,
}

impl Point {
    pub fn new(device_id: &str, time: DateTime<Utc>, fields: PointFields) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.to_string(),
            time,
            fields,
        }
    }

    pub fn measurement(&self) -> Measurement {
        self.fields.measurement()
    }
}

/// Storage backend for device points
pub trait ReadingStore {
    /// Persist a point
    fn write_point(&mut self, point: Point) -> Result<(), ComputeError>;

    /// Delete a point by id; returns whether it was present
    fn remove_point(&mut self, id: Uuid) -> Result<bool, ComputeError>;

    /// Most recent point of a measurement for a device
    fn last_point(
        &self,
        measurement: Measurement,
        device_id: &str,
    ) -> Result<Option<Point>, ComputeError>;

    /// Points of a measurement for a device at or after `since`, oldest first
    fn points_since(
        &self,
        measurement: Measurement,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Point>, ComputeError>;
}

/// In-process point store with JSON snapshots
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    points: Vec<Point>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drop every point older than `cutoff`; returns how many were removed
    pub fn retain_since(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.points.len();
        self.points.retain(|p| p.time >= cutoff);
        before - self.points.len()
    }

    /// Load store from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let mut store: MemoryStore = serde_json::from_str(json)?;
        store.points.sort_by_key(|p| p.time);
        Ok(store)
    }

    /// Serialize store to JSON
    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string(self).map_err(ComputeError::JsonError)
    }

    fn matching<'a>(
        &'a self,
        measurement: Measurement,
        device_id: &'a str,
    ) -> impl Iterator<Item = &'a Point> + 'a {
        self.points
            .iter()
            .filter(move |p| p.measurement() == measurement && p.device_id == device_id)
    }
}

impl ReadingStore for MemoryStore {
    fn write_point(&mut self, point: Point) -> Result<(), ComputeError> {
        // keep points ordered by time; equal timestamps keep arrival order
        let idx = self.points.partition_point(|p| p.time <= point.time);
        self.points.insert(idx, point);
        Ok(())
    }

    fn remove_point(&mut self, id: Uuid) -> Result<bool, ComputeError> {
        match self.points.iter().position(|p| p.id == id) {
            Some(idx) => {
                self.points.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn last_point(
        &self,
        measurement: Measurement,
        device_id: &str,
    ) -> Result<Option<Point>, ComputeError> {
        Ok(self.matching(measurement, device_id).last().cloned())
    }

    fn points_since(
        &self,
        measurement: Measurement,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Point>, ComputeError> {
        Ok(self
            .matching(measurement, device_id)
            .filter(|p| p.time >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Motion;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    const DEVICE: &str = "prototype_device";

    fn t(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn sensor_point(time: DateTime<Utc>, heart_rate: f64) -> Point {
        Point::new(
            DEVICE,
            time,
            PointFields::Sensor(StoredSensor {
                reading: SensorReading {
                    heart_rate: Some(heart_rate),
                    motion: Some(Motion::Detected(false)),
                    ..Default::default()
                },
                data_point: Some(80.0),
            }),
        )
    }

    fn posture_point(time: DateTime<Utc>) -> Point {
        Point::new(
            DEVICE,
            time,
            PointFields::Posture(PostureReading {
                posture: "Back".to_string(),
            }),
        )
    }

    #[test]
    fn test_last_point_by_measurement() {
        let mut store = MemoryStore::new();
        store.write_point(sensor_point(t(1), 50.0)).unwrap();
        store.write_point(sensor_point(t(3), 55.0)).unwrap();
        store.write_point(posture_point(t(4))).unwrap();

        let last = store.last_point(Measurement::Sensor, DEVICE).unwrap().unwrap();
        assert_eq!(last.time, t(3));
        assert!(store
            .last_point(Measurement::Setting, DEVICE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_out_of_order_writes_are_sorted() {
        let mut store = MemoryStore::new();
        store.write_point(sensor_point(t(5), 60.0)).unwrap();
        store.write_point(sensor_point(t(2), 50.0)).unwrap();

        let last = store.last_point(Measurement::Sensor, DEVICE).unwrap().unwrap();
        assert_eq!(last.time, t(5));

        let all = store.points_since(Measurement::Sensor, DEVICE, t(0)).unwrap();
        let times: Vec<_> = all.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![t(2), t(5)]);
    }

    #[test]
    fn test_points_since_filters_device_and_time() {
        let mut store = MemoryStore::new();
        store.write_point(sensor_point(t(1), 50.0)).unwrap();
        store.write_point(sensor_point(t(10), 52.0)).unwrap();
        let mut other = sensor_point(t(11), 70.0);
        other.device_id = "other_device".to_string();
        store.write_point(other).unwrap();

        let points = store.points_since(Measurement::Sensor, DEVICE, t(5)).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].time, t(10));
    }

    #[test]
    fn test_remove_point() {
        let mut store = MemoryStore::new();
        let first = sensor_point(t(1), 50.0);
        let first_id = first.id;
        store.write_point(first).unwrap();
        store.write_point(sensor_point(t(2), 52.0)).unwrap();

        assert!(store.remove_point(first_id).unwrap());
        assert!(!store.remove_point(first_id).unwrap());
        assert_eq!(store.len(), 1);
        let last = store.last_point(Measurement::Sensor, DEVICE).unwrap().unwrap();
        assert_eq!(last.time, t(2));
    }

    #[test]
    fn test_retention() {
        let mut store = MemoryStore::new();
        store.write_point(sensor_point(t(1), 50.0)).unwrap();
        store.write_point(sensor_point(t(30), 52.0)).unwrap();
        assert_eq!(store.retain_since(t(6)), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_json_snapshot() {
        let mut store = MemoryStore::new();
        store.write_point(sensor_point(t(1), 50.0)).unwrap();
        store.write_point(posture_point(t(2))).unwrap();

        let json = store.to_json().unwrap();
        assert!(json.contains("\"measurement\":\"sensor\""));
        assert!(json.contains("\"dataPoint\":80.0"));

        let restored = MemoryStore::from_json(&json).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.last_point(Measurement::Posture, DEVICE).unwrap(),
            store.last_point(Measurement::Posture, DEVICE).unwrap()
        );
    }
}
