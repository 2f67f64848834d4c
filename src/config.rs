//! Runtime configuration.
//!
//! Settings come from an optional TOML file and are overridden by command
//! line flags. Only the seconds-per-60° constant has no default: it is
//! measured per servo and must always be supplied.

use crate::calibration::ServoCalibration;
use crate::constants::*;
use crate::error::ConfigError;
use crate::types::Angle;
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

/// `[servo]` table. Every field is optional so the CLI can fill gaps.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServoSettings {
    pub channel: Option<u32>,
    pub min_pulse_us: Option<u32>,
    pub max_pulse_us: Option<u32>,
    pub neutral_pulse_us: Option<u32>,
    pub seconds_per_60_degrees: Option<f64>,
    pub initial_angle: Option<i32>,
}

impl ServoSettings {
    /// Fields set in `overrides` win.
    pub fn merged(self, overrides: ServoSettings) -> ServoSettings {
        ServoSettings {
            channel: overrides.channel.or(self.channel),
            min_pulse_us: overrides.min_pulse_us.or(self.min_pulse_us),
            max_pulse_us: overrides.max_pulse_us.or(self.max_pulse_us),
            neutral_pulse_us: overrides.neutral_pulse_us.or(self.neutral_pulse_us),
            seconds_per_60_degrees: overrides
                .seconds_per_60_degrees
                .or(self.seconds_per_60_degrees),
            initial_angle: overrides.initial_angle.or(self.initial_angle),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PigpioSettings {
    pub address: Option<String>,
}

/// `[ble]` table for the notification-driven command source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BleConfig {
    pub peripheral_name: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub scan_timeout_secs: u64,
}

impl Default for BleConfig {
    fn default() -> Self {
        BleConfig {
            peripheral_name: DEFAULT_PERIPHERAL_NAME.to_string(),
            service_uuid: SERVICE_UUID,
            characteristic_uuid: CHARACTERISTIC_UUID,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
        }
    }
}

/// On-disk layout.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub servo: ServoSettings,
    #[serde(default)]
    pub pigpio: PigpioSettings,
    #[serde(default)]
    pub ble: BleConfig,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Fully resolved and validated settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub calibration: ServoCalibration,
    pub initial_angle: Angle,
    pub pigpio_address: String,
    pub ble: BleConfig,
}

impl Config {
    pub fn resolve(
        file: ConfigFile,
        servo_overrides: ServoSettings,
        pigpio_address: Option<String>,
    ) -> Result<Self, ConfigError> {
        let servo = file.servo.merged(servo_overrides);
        let seconds_per_60_degrees = servo
            .seconds_per_60_degrees
            .ok_or(ConfigError::Missing("seconds_per_60_degrees"))?;

        let calibration = ServoCalibration {
            channel: servo.channel.unwrap_or(DEFAULT_CHANNEL),
            min_pulse_us: servo.min_pulse_us.unwrap_or(DEFAULT_MIN_PULSE_US),
            max_pulse_us: servo.max_pulse_us.unwrap_or(DEFAULT_MAX_PULSE_US),
            neutral_pulse_us: servo.neutral_pulse_us.unwrap_or(DEFAULT_NEUTRAL_PULSE_US),
            seconds_per_60_degrees,
        };
        calibration.validate()?;

        Ok(Config {
            calibration,
            initial_angle: Angle::new(servo.initial_angle.unwrap_or(0)),
            pigpio_address: pigpio_address
                .or(file.pigpio.address)
                .unwrap_or_else(|| DEFAULT_PIGPIO_ADDRESS.to_string()),
            ble: file.ble,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [servo]
        channel = 18
        seconds_per_60_degrees = 0.119
        initial_angle = 190

        [pigpio]
        address = "10.0.0.2:8888"

        [ble]
        peripheral_name = "turret"
    "#;

    #[test]
    fn parses_file_and_fills_defaults() {
        let file = ConfigFile::parse(SAMPLE).unwrap();
        let config = Config::resolve(file, ServoSettings::default(), None).unwrap();
        assert_eq!(config.calibration.channel, 18);
        assert_eq!(config.calibration.min_pulse_us, 1000);
        assert_eq!(config.calibration.neutral_pulse_us, 1500);
        assert_eq!(config.calibration.seconds_per_60_degrees, 0.119);
        assert_eq!(config.initial_angle, Angle::new(-170));
        assert_eq!(config.pigpio_address, "10.0.0.2:8888");
        assert_eq!(config.ble.peripheral_name, "turret");
        assert_eq!(config.ble.service_uuid, SERVICE_UUID);
    }

    #[test]
    fn command_line_overrides_file() {
        let file = ConfigFile::parse(SAMPLE).unwrap();
        let overrides = ServoSettings {
            seconds_per_60_degrees: Some(0.124),
            min_pulse_us: Some(1100),
            ..Default::default()
        };
        let config = Config::resolve(file, overrides, Some("127.0.0.1:9999".into())).unwrap();
        assert_eq!(config.calibration.seconds_per_60_degrees, 0.124);
        assert_eq!(config.calibration.min_pulse_us, 1100);
        assert_eq!(config.calibration.channel, 18);
        assert_eq!(config.pigpio_address, "127.0.0.1:9999");
    }

    #[test]
    fn timing_constant_is_required() {
        let err =
            Config::resolve(ConfigFile::default(), ServoSettings::default(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("seconds_per_60_degrees")));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = ConfigFile::parse("").unwrap();
        let overrides = ServoSettings {
            seconds_per_60_degrees: Some(0.124),
            ..Default::default()
        };
        let config = Config::resolve(file, overrides, None).unwrap();
        assert_eq!(config.pigpio_address, DEFAULT_PIGPIO_ADDRESS);
        assert_eq!(config.initial_angle, Angle::new(0));
        assert_eq!(config.ble, BleConfig::default());
    }

    #[test]
    fn rejects_unknown_keys_and_bad_pulses() {
        assert!(matches!(
            ConfigFile::parse("[servo]\nspeed = 3\n"),
            Err(ConfigError::Parse(_))
        ));

        let file =
            ConfigFile::parse("[servo]\nseconds_per_60_degrees = 0.1\nneutral_pulse_us = 900\n")
                .unwrap();
        assert!(matches!(
            Config::resolve(file, ServoSettings::default(), None),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_absurd_timing_constant() {
        let file = ConfigFile::parse("[servo]\nseconds_per_60_degrees = 1e300\n").unwrap();
        assert!(matches!(
            Config::resolve(file, ServoSettings::default(), None),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let path = std::env::temp_dir().join("rotation-controller-missing.toml");
        match ConfigFile::load(&path) {
            Err(ConfigError::Read { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected {:?}", other),
        }
    }
}
