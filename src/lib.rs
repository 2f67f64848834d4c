mod constants;
mod types;
mod tracker;
mod calibration;
mod actuator;
mod controller;
mod dispatcher;

pub mod config;
pub mod driver;
pub mod error;
pub mod source;
#[cfg(feature = "ble")]
pub mod ble;

pub use actuator::RotationActuator;
pub use calibration::ServoCalibration;
pub use controller::{MoveOutcome, RotationWorker, ServoController, SharedController};
pub use dispatcher::{parse_target, Dispatcher};
pub use tracker::{compute_delta, AngleTracker};
pub use types::{Angle, Direction, Rotation, RotationCommand};

// Re-export commonly used items
pub use constants::{CHARACTERISTIC_UUID, DEFAULT_PIGPIO_ADDRESS, SERVICE_UUID};
