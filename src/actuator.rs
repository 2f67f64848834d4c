use crate::calibration::ServoCalibration;
use crate::driver::PulseDriver;
use crate::error::{ActuatorError, DriverError};
use crate::types::Rotation;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Times open-loop motion of a continuous-rotation servo.
pub struct RotationActuator<D> {
    driver: D,
    calibration: ServoCalibration,
}

impl<D: PulseDriver> RotationActuator<D> {
    pub fn new(driver: D, calibration: ServoCalibration) -> Self {
        RotationActuator { driver, calibration }
    }

    pub fn calibration(&self) -> &ServoCalibration {
        &self.calibration
    }

    /// Drives the servo for the rotation's duration, then returns it to neutral.
    ///
    /// Blocks the calling thread for the whole motion. The neutral pulse is
    /// always attempted, including for a zero rotation and after a failed
    /// drive pulse.
    pub fn rotate(&mut self, rotation: Rotation) -> Result<Duration, ActuatorError> {
        if rotation.is_noop() {
            self.stop().map_err(ActuatorError::Stop)?;
            return Ok(Duration::ZERO);
        }

        let duration = self.calibration.duration_for(rotation.delta);
        let pulse_us = self.calibration.pulse_for(rotation.direction);
        debug!(
            delta = rotation.delta,
            direction = %rotation.direction,
            pulse_us,
            ?duration,
            "driving servo"
        );

        if let Err(e) = self.driver.set_pulse_width(self.calibration.channel, pulse_us) {
            let _ = self.stop();
            return Err(ActuatorError::Drive(e));
        }
        thread::sleep(duration);
        self.stop().map_err(ActuatorError::Stop)?;

        info!(
            delta = rotation.delta,
            direction = %rotation.direction,
            ?duration,
            "rotation complete"
        );
        Ok(duration)
    }

    /// Sends the neutral pulse.
    pub fn stop(&mut self) -> Result<(), DriverError> {
        self.driver
            .set_pulse_width(self.calibration.channel, self.calibration.neutral_pulse_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimulatedDriver;
    use crate::types::Direction;
    use std::time::Instant;

    fn calibration() -> ServoCalibration {
        // 1ms per degree keeps tests quick but measurable
        ServoCalibration::with_seconds_per_60(0.06)
    }

    #[test]
    fn clockwise_uses_max_pulse_then_neutral() {
        let driver = SimulatedDriver::new();
        let log = driver.log();
        let mut actuator = RotationActuator::new(driver, calibration());

        let start = Instant::now();
        let duration = actuator
            .rotate(Rotation { delta: 50, direction: Direction::Clockwise })
            .unwrap();
        assert_eq!(duration, calibration().duration_for(50));
        assert!((duration.as_secs_f64() - 0.05).abs() < 1e-6);
        assert!(start.elapsed() >= duration);

        let events = log.events();
        assert_eq!(log.pulse_widths(), vec![2000, 1500]);
        assert!(events[1].at.duration_since(events[0].at) >= duration);
        assert!(events.iter().all(|e| e.channel == 17));
    }

    #[test]
    fn counter_clockwise_uses_min_pulse() {
        let driver = SimulatedDriver::new();
        let log = driver.log();
        let mut actuator = RotationActuator::new(driver, calibration());
        actuator
            .rotate(Rotation { delta: -10, direction: Direction::CounterClockwise })
            .unwrap();
        assert_eq!(log.pulse_widths(), vec![1000, 1500]);
    }

    #[test]
    fn zero_rotation_only_stops() {
        let driver = SimulatedDriver::new();
        let log = driver.log();
        let mut actuator = RotationActuator::new(driver, calibration());
        let duration = actuator
            .rotate(Rotation { delta: 0, direction: Direction::CounterClockwise })
            .unwrap();
        assert_eq!(duration, Duration::ZERO);
        assert_eq!(log.pulse_widths(), vec![1500]);
    }

    #[test]
    fn failed_drive_still_returns_to_neutral() {
        let driver = SimulatedDriver::failing_on(2000);
        let log = driver.log();
        let mut actuator = RotationActuator::new(driver, calibration());
        let err = actuator
            .rotate(Rotation { delta: 90, direction: Direction::Clockwise })
            .unwrap_err();
        assert!(!err.motion_issued());
        assert_eq!(log.pulse_widths(), vec![1500]);
    }

    #[test]
    fn failed_stop_reports_issued_motion() {
        let driver = SimulatedDriver::failing_on(1500);
        let log = driver.log();
        let mut actuator = RotationActuator::new(driver, calibration());
        let err = actuator
            .rotate(Rotation { delta: 5, direction: Direction::Clockwise })
            .unwrap_err();
        assert!(err.motion_issued());
        assert_eq!(log.pulse_widths(), vec![2000]);
    }
}
