use crate::{
    actuator::RotationActuator,
    calibration::ServoCalibration,
    driver::PulseDriver,
    error::{ActuatorError, DriverError, ServoError},
    tracker::AngleTracker,
    types::{Angle, Rotation, RotationCommand},
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// What a completed move did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub from: Angle,
    pub to: Angle,
    pub rotation: Rotation,
    pub duration: Duration,
}

/// The servo's tracked angle and its actuator, moved and committed together.
pub struct ServoController<D> {
    tracker: AngleTracker,
    actuator: RotationActuator<D>,
    angle: watch::Sender<Angle>,
}

pub type SharedController<D> = Arc<Mutex<ServoController<D>>>;

impl<D: PulseDriver> ServoController<D> {
    pub fn new(driver: D, calibration: ServoCalibration, initial: Angle) -> Self {
        let (angle, _) = watch::channel(initial);
        ServoController {
            tracker: AngleTracker::new(initial),
            actuator: RotationActuator::new(driver, calibration),
            angle,
        }
    }

    pub fn into_shared(self) -> SharedController<D> {
        Arc::new(Mutex::new(self))
    }

    pub fn current_angle(&self) -> Angle {
        self.tracker.current()
    }

    /// Observes committed angles without taking the controller lock.
    pub fn subscribe(&self) -> watch::Receiver<Angle> {
        self.angle.subscribe()
    }

    pub fn calibration(&self) -> &ServoCalibration {
        self.actuator.calibration()
    }

    /// Turns the shortest way to `target` and commits it. Blocks for the motion.
    ///
    /// If the drive pulse fails nothing is committed. If only the neutral
    /// pulse fails the motion happened, so the target is committed before the
    /// error is returned.
    pub fn move_to(&mut self, target: Angle) -> Result<MoveOutcome, ActuatorError> {
        let from = self.tracker.current();
        let rotation = self.tracker.plan(target);

        match self.actuator.rotate(rotation) {
            Ok(duration) => {
                self.commit(target);
                Ok(MoveOutcome {
                    from,
                    to: target,
                    rotation,
                    duration,
                })
            }
            Err(e) => {
                if e.motion_issued() {
                    self.commit(target);
                }
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) -> Result<(), DriverError> {
        self.actuator.stop()
    }

    fn commit(&mut self, target: Angle) {
        self.tracker.commit(target);
        self.angle.send_replace(target);
    }
}

/// Executes rotation commands one at a time off the communication context.
///
/// Commands come through a single-slot, latest-wins queue: a command that
/// arrives while a rotation is running replaces any not-yet-started one. The
/// running motion is never interrupted.
pub struct RotationWorker {
    handle: JoinHandle<()>,
}

impl RotationWorker {
    /// Spawns the worker on the current tokio runtime. It publishes the
    /// sequence number of every command it finishes, successful or not.
    pub fn spawn<D: PulseDriver + 'static>(
        controller: SharedController<D>,
        commands: watch::Receiver<Option<RotationCommand>>,
        processed: watch::Sender<u64>,
    ) -> Self {
        let handle = tokio::spawn(run_worker(controller, commands, processed));
        RotationWorker { handle }
    }

    /// Waits for the worker to finish after its command slot has closed.
    pub async fn join(self) -> Result<(), ServoError> {
        self.handle.await?;
        Ok(())
    }
}

async fn run_worker<D: PulseDriver + 'static>(
    controller: SharedController<D>,
    mut commands: watch::Receiver<Option<RotationCommand>>,
    processed: watch::Sender<u64>,
) {
    while commands.changed().await.is_ok() {
        let latest = *commands.borrow_and_update();
        let Some(command) = latest else {
            continue;
        };

        let shared = Arc::clone(&controller);
        let job = tokio::task::spawn_blocking(move || shared.lock().move_to(command.target));

        match job.await {
            Ok(Ok(outcome)) => info!(
                sequence = command.sequence,
                from = outcome.from.degrees(),
                to = outcome.to.degrees(),
                delta = outcome.rotation.delta,
                latency = ?command.received_at.elapsed(),
                "servo at target"
            ),
            Ok(Err(e)) => error!(
                sequence = command.sequence,
                target = command.target.degrees(),
                committed = e.motion_issued(),
                "rotation failed: {}",
                e
            ),
            Err(e) => error!(
                sequence = command.sequence,
                target = command.target.degrees(),
                "rotation job aborted: {}",
                e
            ),
        }
        processed.send_replace(command.sequence);
    }

    let shared = Arc::clone(&controller);
    match tokio::task::spawn_blocking(move || shared.lock().stop()).await {
        Ok(Ok(())) => info!("command slot closed, servo parked at neutral"),
        Ok(Err(e)) => warn!("failed to park servo: {}", e),
        Err(e) => warn!("park job aborted: {}", e),
    }
}
