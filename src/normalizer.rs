//! Per-factor normalization
//!
//! This module maps raw physical measurements onto a common 0-100 comfort scale,
//! where 100 is ideal and 0 is worst-case-or-beyond.
//! - Plateau curves for heart rate, temperature and humidity
//! - One-sided threshold curves for sound and light
//! - Inverted motion fraction
//!
//! Every curve clamps its output to [0, 100]; NaN input propagates as NaN.

use crate::error::ComputeError;
use crate::types::{ScoringInput, SubScores};
use serde::{Deserialize, Serialize};

/// Comfort plateau with linear fall-offs on both sides
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateauCurve {
    /// Value at which the rising edge reaches 0
    pub min_low: f64,
    /// Start of the ideal range
    pub ideal_low: f64,
    /// End of the ideal range
    pub ideal_high: f64,
    /// Value at which the falling edge reaches 0
    pub max_high: f64,
}

impl PlateauCurve {
    pub const fn new(min_low: f64, ideal_low: f64, ideal_high: f64, max_high: f64) -> Self {
        Self {
            min_low,
            ideal_low,
            ideal_high,
            max_high,
        }
    }

    /// Sub-score for a raw value
    pub fn score(&self, value: f64) -> f64 {
        if value >= self.ideal_low && value <= self.ideal_high {
            return 100.0;
        }
        if value < self.ideal_low {
            return clamp_score(100.0 * (value - self.min_low) / (self.ideal_low - self.min_low));
        }
        clamp_score(100.0 * (self.max_high - value) / (self.max_high - self.ideal_high))
    }

    fn validate(&self, name: &str) -> Result<(), ComputeError> {
        let points = [self.min_low, self.ideal_low, self.ideal_high, self.max_high];
        if points.iter().any(|p| !p.is_finite()) {
            return Err(ComputeError::InvalidCalibration(format!(
                "{name}: breakpoints must be finite"
            )));
        }
        if !(self.min_low < self.ideal_low
            && self.ideal_low <= self.ideal_high
            && self.ideal_high < self.max_high)
        {
            return Err(ComputeError::InvalidCalibration(format!(
                "{name}: expected min_low < ideal_low <= ideal_high < max_high, got {points:?}"
            )));
        }
        Ok(())
    }
}

/// One-sided curve: 100 at or below `good`, 0 at or above `bad`, linear between
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCurve {
    pub good: f64,
    pub bad: f64,
}

impl ThresholdCurve {
    pub const fn new(good: f64, bad: f64) -> Self {
        Self { good, bad }
    }

    /// Sub-score for a raw value
    pub fn score(&self, value: f64) -> f64 {
        if value <= self.good {
            return 100.0;
        }
        if value >= self.bad {
            return 0.0;
        }
        clamp_score(100.0 * (self.bad - value) / (self.bad - self.good))
    }

    fn validate(&self, name: &str) -> Result<(), ComputeError> {
        if !self.good.is_finite() || !self.bad.is_finite() || self.good >= self.bad {
            return Err(ComputeError::InvalidCalibration(format!(
                "{name}: expected finite good < bad, got good={} bad={}",
                self.good, self.bad
            )));
        }
        Ok(())
    }
}

/// Heart rate: 0 at 40 bpm, ideal 45-60 bpm, 0 at 100 bpm
pub const HEART_RATE_CURVE: PlateauCurve = PlateauCurve::new(40.0, 45.0, 60.0, 100.0);

/// Temperature: 0 at 20 °C, ideal 24-28 °C, 0 at 32 °C
pub const TEMPERATURE_CURVE: PlateauCurve = PlateauCurve::new(20.0, 24.0, 28.0, 32.0);

/// Humidity: 0 at 25 %RH, ideal 40-60 %RH, 0 at 75 %RH
pub const HUMIDITY_CURVE: PlateauCurve = PlateauCurve::new(25.0, 40.0, 60.0, 75.0);

/// Sound: full marks up to 30 dB, zero from 70 dB
pub const SOUND_CURVE: ThresholdCurve = ThresholdCurve::new(30.0, 70.0);

/// Light: full marks up to 30 brightness points, zero from 60
pub const LIGHT_CURVE: ThresholdCurve = ThresholdCurve::new(30.0, 60.0);

/// Curve set used to normalize a reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub heart_rate: PlateauCurve,
    pub temp: PlateauCurve,
    pub humid: PlateauCurve,
    pub sound: ThresholdCurve,
    pub light: ThresholdCurve,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            heart_rate: HEART_RATE_CURVE,
            temp: TEMPERATURE_CURVE,
            humid: HUMIDITY_CURVE,
            sound: SOUND_CURVE,
            light: LIGHT_CURVE,
        }
    }
}

impl Calibration {
    /// Earlier firmware calibration: heart rate falls to 0 at 90 bpm and
    /// temperature rises from 0 at 22 °C
    pub fn legacy() -> Self {
        Self {
            heart_rate: PlateauCurve::new(40.0, 45.0, 60.0, 90.0),
            temp: PlateauCurve::new(22.0, 24.0, 28.0, 32.0),
            ..Self::default()
        }
    }

    /// Check that every curve has ordered, finite breakpoints
    pub fn validate(&self) -> Result<(), ComputeError> {
        self.heart_rate.validate("heart_rate")?;
        self.temp.validate("temp")?;
        self.humid.validate("humid")?;
        self.sound.validate("sound")?;
        self.light.validate("light")?;
        Ok(())
    }

    /// Normalize every channel of a resolved reading
    pub fn sub_scores(&self, input: &ScoringInput) -> SubScores {
        SubScores {
            heart_rate: self.heart_rate.score(input.heart_rate),
            motion: motion_score(input.motion),
            temp: self.temp.score(input.temp),
            humid: self.humid.score(input.humid),
            sound: self.sound.score(input.sound),
            light: self.light.score(input.light),
        }
    }
}

pub fn heart_rate_score(bpm: f64) -> f64 {
    HEART_RATE_CURVE.score(bpm)
}

pub fn temperature_score(celsius: f64) -> f64 {
    TEMPERATURE_CURVE.score(celsius)
}

pub fn humidity_score(relative_humidity: f64) -> f64 {
    HUMIDITY_CURVE.score(relative_humidity)
}

pub fn sound_score(decibels: f64) -> f64 {
    SOUND_CURVE.score(decibels)
}

pub fn light_score(brightness: f64) -> f64 {
    LIGHT_CURVE.score(brightness)
}

/// Less motion is better sleep: 100 at no motion, 0 at constant motion
pub fn motion_score(fraction: f64) -> f64 {
    clamp_score((1.0 - fraction) * 100.0)
}

fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAR_VALUES: [f64; 9] = [-1e9, -500.0, -1.0, 0.0, 1.0, 150.0, 1_000.0, 1e6, 1e12];

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_plateau_breakpoints() {
        for curve in [HEART_RATE_CURVE, TEMPERATURE_CURVE, HUMIDITY_CURVE] {
            assert_eq!(curve.score(curve.ideal_low), 100.0);
            assert_eq!(curve.score(curve.ideal_high), 100.0);
            assert_eq!(curve.score(curve.min_low), 0.0);
            assert_eq!(curve.score(curve.max_high), 0.0);
        }
    }

    #[test]
    fn test_plateau_ramps() {
        // halfway up the rising edge: 42.5 bpm
        assert_close(heart_rate_score(42.5), 50.0);
        // 80 bpm on the 60..100 falling edge
        assert_close(heart_rate_score(80.0), 50.0);
        assert_close(temperature_score(22.0), 50.0);
        assert_close(temperature_score(30.0), 50.0);
        assert_close(humidity_score(32.5), 50.0);
        assert_close(humidity_score(67.5), 50.0);
    }

    #[test]
    fn test_plateau_monotonic_edges() {
        for curve in [HEART_RATE_CURVE, TEMPERATURE_CURVE, HUMIDITY_CURVE] {
            let steps = 200;
            let mut previous = curve.score(curve.min_low);
            for i in 1..=steps {
                let value =
                    curve.min_low + (curve.ideal_low - curve.min_low) * i as f64 / steps as f64;
                let score = curve.score(value);
                assert!(score >= previous, "rising edge decreased at {value}");
                previous = score;
            }

            let mut previous = curve.score(curve.ideal_high);
            for i in 1..=steps {
                let value = curve.ideal_high
                    + (curve.max_high - curve.ideal_high) * i as f64 / steps as f64;
                let score = curve.score(value);
                assert!(score <= previous, "falling edge increased at {value}");
                previous = score;
            }
        }
    }

    #[test]
    fn test_threshold_curves() {
        assert_eq!(sound_score(30.0), 100.0);
        assert_eq!(sound_score(70.0), 0.0);
        assert_close(sound_score(50.0), 50.0);
        assert_eq!(sound_score(10.0), 100.0);

        assert_eq!(light_score(30.0), 100.0);
        assert_eq!(light_score(60.0), 0.0);
        assert_close(light_score(45.0), 50.0);
        assert_eq!(light_score(95.0), 0.0);
    }

    #[test]
    fn test_threshold_monotonic() {
        for curve in [SOUND_CURVE, LIGHT_CURVE] {
            let mut previous = curve.score(curve.good);
            for i in 1..=100 {
                let value = curve.good + (curve.bad - curve.good) * i as f64 / 100.0;
                let score = curve.score(value);
                assert!(score <= previous);
                previous = score;
            }
        }
    }

    #[test]
    fn test_motion_inversion() {
        assert_eq!(motion_score(0.0), 100.0);
        assert_eq!(motion_score(1.0), 0.0);
        assert_close(motion_score(0.25), 75.0);
        assert_close(motion_score(0.6), 40.0);
    }

    #[test]
    fn test_outputs_clamped_for_far_inputs() {
        let scorers: [fn(f64) -> f64; 6] = [
            heart_rate_score,
            temperature_score,
            humidity_score,
            sound_score,
            light_score,
            motion_score,
        ];
        for scorer in scorers {
            for value in FAR_VALUES {
                let score = scorer(value);
                assert!((0.0..=100.0).contains(&score), "{value} scored {score}");
            }
        }
    }

    #[test]
    fn test_nan_propagates() {
        assert!(heart_rate_score(f64::NAN).is_nan());
        assert!(motion_score(f64::NAN).is_nan());
    }

    #[test]
    fn test_legacy_calibration_differs() {
        let legacy = Calibration::legacy();
        // 80 bpm is halfway down the 60..100 edge but two thirds down 60..90
        assert_close(legacy.heart_rate.score(80.0), 100.0 / 3.0);
        assert_close(legacy.temp.score(23.0), 50.0);
        assert!(legacy.validate().is_ok());
    }

    #[test]
    fn test_calibration_validation() {
        assert!(Calibration::default().validate().is_ok());

        let mut inverted = Calibration::default();
        inverted.humid = PlateauCurve::new(60.0, 40.0, 50.0, 75.0);
        assert!(matches!(
            inverted.validate(),
            Err(ComputeError::InvalidCalibration(_))
        ));

        let mut flat = Calibration::default();
        flat.sound = ThresholdCurve::new(50.0, 50.0);
        assert!(flat.validate().is_err());

        let mut nan = Calibration::default();
        nan.temp.max_high = f64::NAN;
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_sub_scores_for_comfortable_room() {
        let input = ScoringInput {
            heart_rate: 50.0,
            motion: 0.0,
            temp: 26.0,
            humid: 50.0,
            sound: 20.0,
            light: 10.0,
        };
        let subs = Calibration::default().sub_scores(&input);
        assert_eq!(subs, SubScores::uniform(100.0));
    }
}
