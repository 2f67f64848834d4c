//! Inbound command handling.
//!
//! The dispatcher validates and stores each command on the communication
//! context, then hands the rotation to the [`RotationWorker`] without waiting
//! for it. Parsing and storage run in one critical section, so commands keep
//! their arrival order even when several sources share a dispatcher.

use crate::controller::{RotationWorker, SharedController};
use crate::driver::PulseDriver;
use crate::error::{CommandError, SourceError};
use crate::source::{CommandSource, InboundEvent, LineSource};
use crate::types::{Angle, RotationCommand};
use parking_lot::Mutex;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Parses a command payload: UTF-8 text holding a signed decimal integer of
/// any length, surrounding whitespace allowed.
pub fn parse_target(raw: &[u8]) -> Result<Angle, CommandError> {
    let text = std::str::from_utf8(raw).map_err(|_| CommandError::NotUtf8 {
        raw: raw.to_vec(),
    })?;
    let trimmed = text.trim();
    Angle::parse_decimal(trimmed).ok_or_else(|| CommandError::NotInteger {
        text: trimmed.to_string(),
    })
}

#[derive(Debug, Default)]
struct Stored {
    last_value: Vec<u8>,
    sequence: u64,
}

pub struct Dispatcher {
    stored: Mutex<Stored>,
    slot: watch::Sender<Option<RotationCommand>>,
    processed: watch::Receiver<u64>,
}

impl Dispatcher {
    /// Creates a dispatcher and the worker that executes its rotations.
    /// Must be called inside a tokio runtime.
    pub fn start<D: PulseDriver + 'static>(
        controller: SharedController<D>,
    ) -> (Self, RotationWorker) {
        let (slot, commands) = watch::channel(None);
        let (processed_tx, processed) = watch::channel(0);
        let worker = RotationWorker::spawn(controller, commands, processed_tx);
        let dispatcher = Dispatcher {
            stored: Mutex::new(Stored::default()),
            slot,
            processed,
        };
        (dispatcher, worker)
    }

    /// Handles a write. Returns as soon as the rotation is queued.
    ///
    /// Invalid payloads are logged and leave the stored value untouched.
    pub fn handle_write(&self, raw: &[u8]) -> Result<RotationCommand, CommandError> {
        let received_at = Instant::now();
        let mut stored = self.stored.lock();

        let target = match parse_target(raw) {
            Ok(target) => target,
            Err(e) => {
                warn!("rejected command: {}", e);
                return Err(e);
            }
        };

        stored.last_value = raw.to_vec();
        stored.sequence += 1;
        let command = RotationCommand {
            target,
            received_at,
            sequence: stored.sequence,
        };

        info!(sequence = command.sequence, target = target.degrees(), "received target angle");
        debug!(raw = ?raw, "raw command bytes");

        // Replaces a queued command the worker has not started yet
        self.slot.send_replace(Some(command));
        Ok(command)
    }

    /// The last accepted payload, byte for byte.
    pub fn handle_read(&self) -> Vec<u8> {
        debug!("read request received");
        self.stored.lock().last_value.clone()
    }

    /// Number of accepted commands so far.
    pub fn accepted(&self) -> u64 {
        self.stored.lock().sequence
    }

    /// Resolves once the worker has finished the newest accepted command.
    pub async fn settled(&self) {
        let target = self.accepted();
        let mut processed = self.processed.clone();
        // An error means the worker is gone; nothing left to wait for.
        let _ = processed.wait_for(|done| *done >= target).await;
    }

    /// Services one source until it runs dry.
    pub async fn serve<S: CommandSource>(&self, source: &mut S) -> Result<(), SourceError> {
        while let Some(event) = source.next_event().await? {
            match event {
                InboundEvent::Write(raw) => {
                    // Rejections are already reported; the sender gets no fault.
                    let _ = self.handle_write(&raw);
                }
                InboundEvent::Read => {
                    let value = self.handle_read();
                    source.reply(&value).await?;
                }
            }
        }
        Ok(())
    }

    /// Accepts line-oriented clients one at a time, forever.
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<(), SourceError> {
        loop {
            info!(address = ?listener.local_addr().ok(), "waiting for connection");
            let (stream, peer) = listener.accept().await?;
            info!(%peer, "accepted connection");

            let mut source = LineSource::from_tcp(stream);
            match self.serve(&mut source).await {
                Ok(()) => info!(%peer, "connection closed"),
                Err(e) => warn!(%peer, "connection dropped: {}", e),
            }
        }
    }
}
