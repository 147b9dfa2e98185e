//! Sleepwatch - Sleep quality scoring for bedside sensor devices
//!
//! Sleepwatch turns raw readings from a bedside device (heart rate, motion,
//! room temperature, humidity, sound and light) into a single 0-100 sleep
//! quality score through a deterministic pipeline: wire decoding → per-factor
//! normalization → weighted aggregation → storage and outward encoding.
//!
//! ## Modules
//!
//! - **Scoring core**: `normalizer` comfort curves and the `scoring` aggregator
//! - **Ingestion**: `schema` payload decoding and sample averaging
//! - **Services**: `store` for points, `control` for schedule publishing,
//!   orchestrated by `pipeline`

pub mod config;
pub mod control;
pub mod encoder;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod schema;
pub mod scoring;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{MissingFieldPolicy, ScoringConfig};
pub use control::{ControlChannel, Outbox};
pub use encoder::RecordEncoder;
pub use error::ComputeError;
pub use normalizer::Calibration;
pub use pipeline::{score_reading_json, SleepProcessor};
pub use scoring::{aggregate, Assessment, SleepQualityScorer, WeightVector};
pub use store::{MemoryStore, Point, ReadingStore};
pub use types::{Measurement, Motion, ScoredReading, ScoringInput, SensorReading};

// Schema exports
pub use schema::{RawReading, ReadingAdapter, SampleWindow};

/// Library version reported by the CLI and FFI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported in diagnostics
pub const PRODUCER_NAME: &str = "sleepwatch";
