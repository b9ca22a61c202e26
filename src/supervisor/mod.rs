//! Fault containment for periodic units.
//!
//! Each independently scheduled unit (the probe loop, the dashboard
//! sampler) gets its own [`Supervisor`]. A tick that fails or panics
//! suspends that unit only; it resumes by itself once the cooldown has
//! elapsed. The first fault also locks the unit's operator control
//! (enable/disable) for the rest of the session, unless the breaker
//! policy allows an explicit re-arm.

pub mod backoff;
pub mod task;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{BreakerPolicy, CooldownMode, SupervisorConfig};
use crate::error::{RemediationError, Result};
use backoff::Backoff;

pub use task::{ControlCommand, ControlHandle, SupervisedTask};

/// Operator-facing features, each with its own fault domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// The probe loop proposing remediations
    Architecture,
    /// Live gauges sampling
    Dashboard,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feature::Architecture => "architecture",
            Feature::Dashboard => "dashboard",
        })
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "architecture" | "arch" | "probe" => Ok(Feature::Architecture),
            "dashboard" | "dash" => Ok(Feature::Dashboard),
            other => Err(format!("Unknown feature: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    Suspended { resume_at: Instant },
}

/// Decision for one due tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Run,
    /// The cooldown just elapsed; run and tell the operator
    Resumed,
    Skip,
}

/// A unit of periodic work that can be supervised.
pub trait Supervised: Send + 'static {
    type Output: Send + 'static;

    fn tick(&mut self, now: Instant) -> std::result::Result<Self::Output, TickError<Self::Output>>;
}

/// A failed tick. `salvaged` carries whatever the healthy part of the
/// tick produced, so it can still be published.
#[derive(Debug)]
pub struct TickError<T> {
    pub message: String,
    pub salvaged: Option<T>,
}

impl<T> From<anyhow::Error> for TickError<T> {
    fn from(e: anyhow::Error) -> Self {
        TickError {
            message: format!("{e:#}"),
            salvaged: None,
        }
    }
}

/// Runs one tick inside a fault boundary: panics become tick errors.
pub fn guarded_tick<U: Supervised>(
    unit: &mut U,
    now: Instant,
) -> std::result::Result<U::Output, TickError<U::Output>> {
    match panic::catch_unwind(AssertUnwindSafe(|| unit.tick(now))) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(TickError {
                message: format!("panicked: {message}"),
                salvaged: None,
            })
        }
    }
}

/// Point-in-time view of a supervised feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStatus {
    pub feature: Feature,
    pub enabled: bool,
    /// false once the control is locked by a fault
    pub operable: bool,
    pub state: SupervisorState,
    pub resume_in: Option<Duration>,
    pub faults: u32,
    pub last_fault: Option<String>,
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.feature)?;
        match (self.enabled, self.resume_in) {
            (false, _) => write!(f, "disabled")?,
            (true, Some(left)) => write!(f, "in maintenance, resumes in {}s", left.as_secs())?,
            (true, None) => write!(f, "running")?,
        }
        if !self.operable {
            write!(f, " (control locked)")?;
        }
        if let Some(ref last) = self.last_fault {
            write!(f, ", {} fault(s), last: {last}", self.faults)?;
        }
        Ok(())
    }
}

pub struct Supervisor {
    feature: Feature,
    state: SupervisorState,
    backoff: Backoff,
    breaker: BreakerPolicy,
    enabled: bool,
    operable: bool,
    faults: u32,
    last_fault: Option<String>,
}

impl Supervisor {
    pub fn new(feature: Feature, backoff: Backoff, breaker: BreakerPolicy, enabled: bool) -> Self {
        Self {
            feature,
            state: SupervisorState::Running,
            backoff,
            breaker,
            enabled,
            operable: true,
            faults: 0,
            last_fault: None,
        }
    }

    pub fn from_config(feature: Feature, config: &SupervisorConfig, enabled: bool) -> Self {
        let initial = Duration::from_secs(config.cooldown_secs);
        let backoff = match config.cooldown {
            CooldownMode::Fixed => Backoff::fixed(initial),
            CooldownMode::Exponential => Backoff::new(
                initial,
                Duration::from_secs(config.max_cooldown_secs),
                config.multiplier,
            ),
        };
        Self::new(feature, backoff, config.breaker, enabled)
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    /// Decides whether a tick due at `now` runs. A suspended supervisor
    /// whose deadline has passed goes back to `Running` here,
    /// unconditionally.
    pub fn admit(&mut self, now: Instant) -> Admission {
        if !self.enabled {
            return Admission::Skip;
        }
        match self.state {
            SupervisorState::Running => Admission::Run,
            SupervisorState::Suspended { resume_at } if now >= resume_at => {
                self.state = SupervisorState::Running;
                info!("{} resumed after cooldown", self.feature);
                Admission::Resumed
            }
            SupervisorState::Suspended { .. } => Admission::Skip,
        }
    }

    pub fn record_success(&mut self) {
        self.backoff.reset();
    }

    /// Suspends the unit and locks its control. Returns the cooldown.
    pub fn record_fault(&mut self, now: Instant, message: &str) -> Duration {
        let cooldown = self.backoff.next_delay();
        self.state = SupervisorState::Suspended {
            resume_at: now + cooldown,
        };
        self.faults += 1;
        self.last_fault = Some(message.to_string());
        self.operable = false;
        error!("[{} ERROR] {message}", self.feature);
        warn!(
            "{} in maintenance, retrying in {}s",
            self.feature,
            cooldown.as_secs()
        );
        cooldown
    }

    /// Operator enable/disable. Refused once the control is locked.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if !self.operable {
            return Err(RemediationError::ControlLocked(self.feature));
        }
        self.enabled = enabled;
        info!("{} {}", self.feature, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Unlocks the control and clears any suspension, when the breaker
    /// policy allows it.
    pub fn rearm(&mut self) -> Result<()> {
        match self.breaker {
            BreakerPolicy::OneShot => Err(RemediationError::RearmNotAllowed(self.feature)),
            BreakerPolicy::ManualRearm => {
                self.operable = true;
                self.state = SupervisorState::Running;
                self.backoff.reset();
                info!("{} re-armed by operator", self.feature);
                Ok(())
            }
        }
    }

    pub fn status(&self, now: Instant) -> FeatureStatus {
        let resume_in = match self.state {
            SupervisorState::Running => None,
            SupervisorState::Suspended { resume_at } => {
                Some(resume_at.saturating_duration_since(now))
            }
        };
        FeatureStatus {
            feature: self.feature,
            enabled: self.enabled,
            operable: self.operable,
            state: self.state,
            resume_in,
            faults: self.faults,
            last_fault: self.last_fault.clone(),
        }
    }
}
