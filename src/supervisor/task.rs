use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{guarded_tick, Admission, Feature, FeatureStatus, Supervised, Supervisor, TickError};
use crate::console::Notice;
use crate::error::Result;

/// Operator commands a periodic unit accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Enable,
    Disable,
    Rearm,
    Status,
}

pub struct ControlRequest {
    pub command: ControlCommand,
    pub reply: oneshot::Sender<Result<FeatureStatus>>,
}

/// Handle for sending control commands to a running unit.
#[derive(Clone)]
pub struct ControlHandle {
    feature: Feature,
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    pub fn new(feature: Feature, tx: mpsc::Sender<ControlRequest>) -> Self {
        Self { feature, tx }
    }

    /// Sends `command` and waits for the unit's answer. Refusals
    /// (`ControlLocked`, `RearmNotAllowed`) come back as the error.
    pub async fn request(&self, command: ControlCommand) -> anyhow::Result<FeatureStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlRequest { command, reply })
            .await
            .map_err(|_| anyhow::anyhow!("{} task is not running", self.feature))?;
        let status = rx
            .await
            .map_err(|_| anyhow::anyhow!("{} task dropped the request", self.feature))??;
        Ok(status)
    }
}

/// Where a unit's tick output goes.
pub trait Publish<T>: Send + 'static {
    /// Returns false once nobody listens anymore.
    fn publish(&self, value: T) -> bool;
}

impl<T: Send + 'static> Publish<T> for mpsc::UnboundedSender<T> {
    fn publish(&self, value: T) -> bool {
        self.send(value).is_ok()
    }
}

impl<T: Send + Sync + 'static> Publish<T> for watch::Sender<T> {
    fn publish(&self, value: T) -> bool {
        self.send_replace(value);
        true
    }
}

/// A supervised unit driven by its own timer.
///
/// The task owns the unit and its supervisor. Ticks never overlap; a
/// tick that comes due while the previous one is still running is
/// skipped, as are ticks during a cooldown.
pub struct SupervisedTask<U: Supervised, P> {
    unit: U,
    supervisor: Supervisor,
    period: Duration,
    publisher: P,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<U, P> SupervisedTask<U, P>
where
    U: Supervised,
    P: Publish<U::Output>,
{
    pub fn new(
        unit: U,
        supervisor: Supervisor,
        period: Duration,
        publisher: P,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        Self {
            unit,
            supervisor,
            period,
            publisher,
            notices,
        }
    }

    pub fn spawn(self) -> (ControlHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = ControlHandle::new(self.supervisor.feature(), tx);
        (handle, tokio::spawn(self.run(rx)))
    }

    /// Runs until the control channel closes or the output has no
    /// listener left.
    pub async fn run(mut self, mut control_rx: mpsc::Receiver<ControlRequest>) {
        let feature = self.supervisor.feature();
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("{feature} loop started, every {:?}", self.period);

        loop {
            tokio::select! {
                now = ticker.tick() => {
                    if !self.on_tick(now) {
                        debug!("{feature} output closed");
                        break;
                    }
                }
                request = control_rx.recv() => match request {
                    Some(request) => self.on_control(request),
                    None => break,
                },
            }
        }
        info!("{feature} loop stopped");
    }

    fn on_tick(&mut self, now: Instant) -> bool {
        let feature = self.supervisor.feature();
        match self.supervisor.admit(now) {
            Admission::Skip => return true,
            Admission::Resumed => {
                let _ = self.notices.send(Notice::Resumed(feature));
            }
            Admission::Run => {}
        }

        let unit = &mut self.unit;
        match run_blocking(|| guarded_tick(unit, now)) {
            Ok(output) => {
                self.supervisor.record_success();
                self.publisher.publish(output)
            }
            Err(TickError { message, salvaged }) => {
                let listening = salvaged.map_or(true, |output| self.publisher.publish(output));
                let resume_in = self.supervisor.record_fault(now, &message);
                let _ = self.notices.send(Notice::Maintenance {
                    feature,
                    message,
                    resume_in,
                });
                listening
            }
        }
    }

    fn on_control(&mut self, request: ControlRequest) {
        let result = match request.command {
            ControlCommand::Enable => self.supervisor.set_enabled(true),
            ControlCommand::Disable => self.supervisor.set_enabled(false),
            ControlCommand::Rearm => self.supervisor.rearm(),
            ControlCommand::Status => Ok(()),
        }
        .map(|()| self.supervisor.status(Instant::now()));
        let _ = request.reply.send(result);
    }
}

/// Ticks refresh system tables synchronously. On a multi-threaded
/// runtime the worker hands its other tasks off while one runs.
fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}
