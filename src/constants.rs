use uuid::Uuid;

pub const DEFAULT_PIGPIO_ADDRESS: &str = "127.0.0.1:8888";

// pigpiod socket command codes
pub const PI_CMD_SERVO: u32 = 8;
pub const PI_CMD_HWVER: u32 = 17;

// pigpio accepts 0 (off) or 500..=2500us for servo pulses
pub const PULSE_WIDTH_FLOOR_US: u32 = 500;
pub const PULSE_WIDTH_CEIL_US: u32 = 2500;

// A servo slower than a minute per 60° is a misconfiguration
pub const MAX_SECONDS_PER_60_DEGREES: f64 = 60.0;

// Pulse defaults for a standard continuous-rotation hobby servo
pub const DEFAULT_CHANNEL: u32 = 17;
pub const DEFAULT_MIN_PULSE_US: u32 = 1000;
pub const DEFAULT_MAX_PULSE_US: u32 = 2000;
pub const DEFAULT_NEUTRAL_PULSE_US: u32 = 1500;

// Angle domain
pub const FULL_TURN: i32 = 360;
pub const HALF_TURN: i32 = 180;

// Command characteristic of the angle receiver service
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef0);
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef1);
pub const DEFAULT_PERIPHERAL_NAME: &str = "raspberrypi";
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 5;

/// Line that asks a line-oriented source for the last stored value.
pub const READ_QUERY_LINE: &str = "?";
