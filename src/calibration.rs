use crate::constants::*;
use crate::error::ConfigError;
use crate::types::Direction;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pulse widths and timing for one physical servo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoCalibration {
    pub channel: u32,
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
    pub neutral_pulse_us: u32,
    /// Measured per unit; differs between builds.
    pub seconds_per_60_degrees: f64,
}

impl ServoCalibration {
    /// Standard pulse widths on the default channel.
    pub fn with_seconds_per_60(seconds_per_60_degrees: f64) -> Self {
        ServoCalibration {
            channel: DEFAULT_CHANNEL,
            min_pulse_us: DEFAULT_MIN_PULSE_US,
            max_pulse_us: DEFAULT_MAX_PULSE_US,
            neutral_pulse_us: DEFAULT_NEUTRAL_PULSE_US,
            seconds_per_60_degrees,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let range = PULSE_WIDTH_FLOOR_US..=PULSE_WIDTH_CEIL_US;
        for (name, value) in [
            ("min_pulse_us", self.min_pulse_us),
            ("max_pulse_us", self.max_pulse_us),
            ("neutral_pulse_us", self.neutral_pulse_us),
        ] {
            if !range.contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} = {} outside {}..={}us",
                    name, value, PULSE_WIDTH_FLOOR_US, PULSE_WIDTH_CEIL_US
                )));
            }
        }

        let ordered = self.min_pulse_us < self.neutral_pulse_us
            && self.neutral_pulse_us < self.max_pulse_us;
        if !ordered {
            return Err(ConfigError::Invalid(format!(
                "pulse widths must satisfy min < neutral < max, got {} / {} / {}",
                self.min_pulse_us, self.neutral_pulse_us, self.max_pulse_us
            )));
        }

        let rate = self.seconds_per_60_degrees;
        if !rate.is_finite() || rate <= 0.0 || rate > MAX_SECONDS_PER_60_DEGREES {
            return Err(ConfigError::Invalid(format!(
                "seconds_per_60_degrees must be in (0, {}], got {}",
                MAX_SECONDS_PER_60_DEGREES, rate
            )));
        }

        Ok(())
    }

    /// Time to turn `delta` degrees in either direction.
    pub fn duration_for(&self, delta: i32) -> Duration {
        let degrees = delta.unsigned_abs() as f64;
        Duration::from_secs_f64(degrees * self.seconds_per_60_degrees / 60.0)
    }

    pub fn pulse_for(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Clockwise => self.max_pulse_us,
            Direction::CounterClockwise => self.min_pulse_us,
        }
    }

    /// Averages timed test runs of `(degrees, seconds)` into a seconds-per-60° constant.
    ///
    /// Samples with a non-positive angle or time are ignored. Returns `None`
    /// when nothing usable remains.
    pub fn fit_seconds_per_60(samples: &[(f64, f64)]) -> Option<f64> {
        let rates: Vec<f64> = samples
            .iter()
            .filter(|(degrees, seconds)| *degrees > 0.0 && *seconds > 0.0)
            .map(|(degrees, seconds)| seconds / degrees * 60.0)
            .collect();

        if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum::<f64>() / rates.len() as f64)
        }
    }
}
