//! Sleep quality aggregation
//!
//! This module combines the six per-factor sub-scores into a single weighted
//! score, applies the no-signal override and rounds to two decimals.

use crate::config::{MissingFieldPolicy, ScoringConfig};
use crate::error::ComputeError;
use crate::normalizer::Calibration;
use crate::types::{Factor, QualityFlag, ScoringInput, SensorReading, SubScores};
use serde::{Deserialize, Serialize};

/// Heart rate at or below this value means the sensor has no contact
pub const NO_SIGNAL_HEART_RATE_BPM: f64 = 30.0;

/// Allowed drift of the weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Importance of each factor in the final score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeightVector {
    pub heart_rate: f64,
    pub motion: f64,
    pub temp: f64,
    pub humid: f64,
    pub sound: f64,
    pub light: f64,
}

impl Default for WeightVector {
    fn default() -> Self {
        Self {
            heart_rate: 0.20,
            motion: 0.20,
            temp: 0.15,
            humid: 0.10,
            sound: 0.20,
            light: 0.15,
        }
    }
}

impl WeightVector {
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

    pub fn sum(&self) -> f64 {
        Factor::ALL.iter().map(|f| self.get(*f)).sum()
    }

    /// Check that every weight is finite and non-negative and that they sum to 1
    pub fn validate(&self) -> Result<(), ComputeError> {
        for factor in Factor::ALL {
            let weight = self.get(factor);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ComputeError::InvalidWeights(format!(
                    "{} weight must be a non-negative number, got {weight}",
                    factor.as_str()
                )));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ComputeError::InvalidWeights(format!(
                "weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Weighted sum of sub-scores, unrounded
pub fn weighted_sum(sub_scores: &SubScores, weights: &WeightVector) -> f64 {
    Factor::ALL
        .iter()
        .map(|f| sub_scores.get(*f) * weights.get(*f))
        .sum()
}

/// Round to two decimals, halves away from zero
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score a resolved reading with the default calibration
pub fn aggregate(input: &ScoringInput, weights: &WeightVector) -> f64 {
    aggregate_with(input, weights, &Calibration::default())
}

/// Score a resolved reading with an explicit calibration
pub fn aggregate_with(
    input: &ScoringInput,
    weights: &WeightVector,
    calibration: &Calibration,
) -> f64 {
    let sub_scores = calibration.sub_scores(input);
    finalize(input, &sub_scores, weights)
}

fn finalize(input: &ScoringInput, sub_scores: &SubScores, weights: &WeightVector) -> f64 {
    if is_no_signal(input.heart_rate) {
        return 0.0;
    }
    round2(weighted_sum(sub_scores, weights))
}

fn is_no_signal(heart_rate: f64) -> bool {
    heart_rate <= NO_SIGNAL_HEART_RATE_BPM
}

/// Result of scoring one reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub score: f64,
    pub sub_scores: SubScores,
    #[serde(serialize_with = "serialize_flags")]
    pub flags: Vec<QualityFlag>,
}

impl Assessment {
    pub fn flag_labels(&self) -> Vec<String> {
        self.flags.iter().map(QualityFlag::label).collect()
    }
}

fn serialize_flags<S>(flags: &[QualityFlag], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(flags.iter().map(QualityFlag::label))
}

/// Scorer holding weights, calibration and the missing-field policy
#[derive(Debug, Clone, Default)]
pub struct SleepQualityScorer {
    weights: WeightVector,
    calibration: Calibration,
    missing_fields: MissingFieldPolicy,
}

impl SleepQualityScorer {
    pub fn new(
        weights: WeightVector,
        calibration: Calibration,
        missing_fields: MissingFieldPolicy,
    ) -> Self {
        if (weights.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            log::warn!(
                "weight vector sums to {}; scores may leave the 0-100 range",
                weights.sum()
            );
        }
        Self {
            weights,
            calibration,
            missing_fields,
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(config.weights, config.calibration, config.missing_fields)
    }

    pub fn weights(&self) -> &WeightVector {
        &self.weights
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn missing_fields(&self) -> MissingFieldPolicy {
        self.missing_fields
    }

    /// Resolve a device reading into a complete scoring input.
    ///
    /// Missing or non-finite channels are either defaulted to zero (and flagged)
    /// or rejected, depending on the policy.
    pub fn resolve(
        &self,
        reading: &SensorReading,
    ) -> Result<(ScoringInput, Vec<QualityFlag>), ComputeError> {
        let mut flags = Vec::new();
        let mut field = |factor: Factor, value: Option<f64>| -> Result<f64, ComputeError> {
            match value.filter(|v| v.is_finite()) {
                Some(v) => Ok(v),
                None => match self.missing_fields {
                    MissingFieldPolicy::Zero => {
                        flags.push(QualityFlag::Defaulted(factor));
                        Ok(0.0)
                    }
                    MissingFieldPolicy::Reject => {
                        Err(ComputeError::MissingField(factor.as_str().to_string()))
                    }
                },
            }
        };

        let input = ScoringInput {
            heart_rate: field(Factor::HeartRate, reading.heart_rate)?,
            motion: field(Factor::Motion, reading.motion.map(|m| m.fraction()))?,
            temp: field(Factor::Temp, reading.temp)?,
            humid: field(Factor::Humid, reading.humid)?,
            sound: field(Factor::Sound, reading.sound)?,
            light: field(Factor::Light, reading.brightness)?,
        };

        if !flags.is_empty() {
            let names: Vec<String> = flags.iter().map(QualityFlag::label).collect();
            log::warn!("scoring reading with defaulted fields: {}", names.join(", "));
        }

        Ok((input, flags))
    }

    /// Score a device reading
    pub fn score(&self, reading: &SensorReading) -> Result<Assessment, ComputeError> {
        let (input, mut flags) = self.resolve(reading)?;
        let sub_scores = self.calibration.sub_scores(&input);
        let score = finalize(&input, &sub_scores, &self.weights);

        if is_no_signal(input.heart_rate) {
            flags.push(QualityFlag::NoSignal);
        }

        log::debug!(
            "scored reading hr={} motion={} temp={} humid={} sound={} light={} -> {}",
            input.heart_rate,
            input.motion,
            input.temp,
            input.humid,
            input.sound,
            input.light,
            score
        );

        Ok(Assessment {
            score,
            sub_scores,
            flags,
        })
    }
}
