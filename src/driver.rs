//! Pulse-width drivers.
//!
//! All drivers are blocking; they are only ever called from the rotation
//! worker's blocking pool.

use crate::constants::*;
use crate::error::DriverError;
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const IO_TIMEOUT: Duration = Duration::from_secs(1);

/// Something that can hold a servo pulse width on an output channel.
pub trait PulseDriver: Send {
    fn set_pulse_width(&mut self, channel: u32, pulse_us: u32) -> Result<(), DriverError>;
}

impl<D: PulseDriver + ?Sized> PulseDriver for Box<D> {
    fn set_pulse_width(&mut self, channel: u32, pulse_us: u32) -> Result<(), DriverError> {
        (**self).set_pulse_width(channel, pulse_us)
    }
}

/// Client for the pigpio daemon's socket interface.
///
/// Requests and replies are four little-endian u32 words: `cmd, p1, p2, p3`.
/// The reply echoes the command and carries a signed result in the last word.
pub struct PigpioDriver {
    stream: TcpStream,
    hardware_revision: u32,
}

impl PigpioDriver {
    /// Connects and checks the daemon answers. Failure here is fatal for the caller.
    pub fn connect(address: &str) -> Result<Self, DriverError> {
        let unavailable = |source: std::io::Error| DriverError::Unavailable {
            address: address.to_string(),
            source,
        };

        let socket_addr = address
            .to_socket_addrs()
            .map_err(unavailable)?
            .next()
            .ok_or_else(|| unavailable(std::io::ErrorKind::AddrNotAvailable.into()))?;

        let stream =
            TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT).map_err(unavailable)?;
        stream.set_nodelay(true).map_err(unavailable)?;
        stream.set_read_timeout(Some(IO_TIMEOUT)).map_err(unavailable)?;
        stream.set_write_timeout(Some(IO_TIMEOUT)).map_err(unavailable)?;

        let mut driver = PigpioDriver {
            stream,
            hardware_revision: 0,
        };
        let revision = driver.command(PI_CMD_HWVER, 0, 0)?;
        driver.hardware_revision = revision as u32;
        info!(address, revision = %format!("{:#x}", revision), "connected to pigpio daemon");
        Ok(driver)
    }

    pub fn hardware_revision(&self) -> u32 {
        self.hardware_revision
    }

    fn command(&mut self, cmd: u32, p1: u32, p2: u32) -> Result<i32, DriverError> {
        self.stream.write_all(&encode_request(cmd, p1, p2))?;
        let mut reply = [0u8; 16];
        self.stream.read_exact(&mut reply)?;
        decode_reply(cmd, &reply)
    }
}

impl PulseDriver for PigpioDriver {
    fn set_pulse_width(&mut self, channel: u32, pulse_us: u32) -> Result<(), DriverError> {
        debug!(channel, pulse_us, "pigpio servo pulse");
        self.command(PI_CMD_SERVO, channel, pulse_us)?;
        Ok(())
    }
}

pub(crate) fn encode_request(cmd: u32, p1: u32, p2: u32) -> [u8; 16] {
    let mut request = [0u8; 16];
    request[0..4].copy_from_slice(&cmd.to_le_bytes());
    request[4..8].copy_from_slice(&p1.to_le_bytes());
    request[8..12].copy_from_slice(&p2.to_le_bytes());
    // p3 is the extension length; none of our commands carry one
    request
}

pub(crate) fn decode_reply(cmd: u32, reply: &[u8; 16]) -> Result<i32, DriverError> {
    let echoed = u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]);
    let status = i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]]);
    if echoed != cmd {
        return Err(DriverError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("reply for command {} while waiting on {}", echoed, cmd),
        )));
    }
    if status < 0 {
        return Err(DriverError::Command { command: cmd, status });
    }
    Ok(status)
}

/// One pulse recorded by [`SimulatedDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseEvent {
    pub channel: u32,
    pub pulse_us: u32,
    pub at: Instant,
}

/// Shared view of everything a [`SimulatedDriver`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct PulseLog(Arc<Mutex<Vec<PulseEvent>>>);

impl PulseLog {
    pub fn events(&self) -> Vec<PulseEvent> {
        self.0.lock().clone()
    }

    pub fn pulse_widths(&self) -> Vec<u32> {
        self.0.lock().iter().map(|e| e.pulse_us).collect()
    }

    fn push(&self, event: PulseEvent) {
        self.0.lock().push(event);
    }
}

/// In-memory driver for dry runs and tests.
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    log: PulseLog,
    fail_on_pulse: Option<u32>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        SimulatedDriver::default()
    }

    /// Rejects every request for `pulse_us` without recording it.
    pub fn failing_on(pulse_us: u32) -> Self {
        SimulatedDriver {
            log: PulseLog::default(),
            fail_on_pulse: Some(pulse_us),
        }
    }

    pub fn log(&self) -> PulseLog {
        self.log.clone()
    }
}

impl PulseDriver for SimulatedDriver {
    fn set_pulse_width(&mut self, channel: u32, pulse_us: u32) -> Result<(), DriverError> {
        if self.fail_on_pulse == Some(pulse_us) {
            return Err(DriverError::Simulated { pulse_us });
        }
        debug!(channel, pulse_us, "simulated servo pulse");
        self.log.push(PulseEvent {
            channel,
            pulse_us,
            at: Instant::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn reply(cmd: u32, status: i32) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&cmd.to_le_bytes());
        buf[12..16].copy_from_slice(&status.to_le_bytes());
        buf
    }

    #[test]
    fn request_layout() {
        let req = encode_request(PI_CMD_SERVO, 17, 1500);
        assert_eq!(&req[0..4], &[8, 0, 0, 0]);
        assert_eq!(&req[4..8], &[17, 0, 0, 0]);
        assert_eq!(&req[8..12], &1500u32.to_le_bytes());
        assert_eq!(&req[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn negative_status_is_an_error() {
        assert_eq!(decode_reply(PI_CMD_SERVO, &reply(PI_CMD_SERVO, 0)).unwrap(), 0);
        match decode_reply(PI_CMD_SERVO, &reply(PI_CMD_SERVO, -7)) {
            Err(DriverError::Command { command, status }) => {
                assert_eq!(command, PI_CMD_SERVO);
                assert_eq!(status, -7);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(decode_reply(PI_CMD_SERVO, &reply(PI_CMD_HWVER, 0)).is_err());
    }

    #[test]
    fn talks_to_a_pigpio_daemon() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let daemon = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 16];
            while conn.read_exact(&mut buf).is_ok() {
                let cmd = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
                let p2 = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
                seen.push((cmd, p2));
                let status = if cmd == PI_CMD_HWVER { 0xa02082 } else { 0 };
                conn.write_all(&reply(cmd, status)).unwrap();
            }
            seen
        });

        let mut driver = PigpioDriver::connect(&address).unwrap();
        assert_eq!(driver.hardware_revision(), 0xa02082);
        driver.set_pulse_width(17, 2000).unwrap();
        driver.set_pulse_width(17, 1500).unwrap();
        drop(driver);

        let seen = daemon.join().unwrap();
        assert_eq!(seen, vec![(PI_CMD_HWVER, 0), (PI_CMD_SERVO, 2000), (PI_CMD_SERVO, 1500)]);
    }

    #[test]
    fn unreachable_daemon_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        match PigpioDriver::connect(&address) {
            Err(DriverError::Unavailable { address: a, .. }) => assert_eq!(a, address),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("connected to a closed port"),
        }
    }

    #[test]
    fn simulated_driver_records_and_injects_faults() {
        let mut driver = SimulatedDriver::failing_on(2000);
        let log = driver.log();
        driver.set_pulse_width(17, 1500).unwrap();
        assert!(matches!(
            driver.set_pulse_width(17, 2000),
            Err(DriverError::Simulated { pulse_us: 2000 })
        ));
        assert_eq!(log.pulse_widths(), vec![1500]);
        assert_eq!(log.events()[0].channel, 17);
    }
}
