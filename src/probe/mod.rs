//! Resource probe loop.
//!
//! Every tick samples the host, updates the metric history and runs each
//! trigger rule. Rules only propose: the resulting actions go to the
//! approval queue and nothing is executed from here.

pub mod dashboard;
pub mod history;
pub mod metrics;
pub mod rules;

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::actions::{ActionKind, RemediationAction, Synthesizer};
use crate::config::ProbeConfig;
use crate::supervisor::{Supervised, TickError};
use history::MetricHistory;
use metrics::{MetricSource, NetRate};
use rules::{RuleContext, TriggerRule};

/// Output of one probe tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub actions: Vec<RemediationAction>,
    /// Snapshot after this tick
    pub history: MetricHistory,
}

/// State carried across ticks.
#[derive(Debug)]
pub struct ProbeState {
    /// Last firing of each periodic rule; only ever moves forward
    pub last_fired: HashMap<ActionKind, Instant>,
    pub history: MetricHistory,
    net: NetRate,
    started: Instant,
}

impl ProbeState {
    pub fn new(history_len: usize, started: Instant) -> Self {
        Self {
            last_fired: HashMap::new(),
            history: MetricHistory::new(history_len),
            net: NetRate::default(),
            started,
        }
    }
}

pub struct ProbeLoop {
    source: Box<dyn MetricSource>,
    synth: Synthesizer,
    rules: Vec<TriggerRule>,
    state: ProbeState,
}

impl ProbeLoop {
    pub fn new(
        source: Box<dyn MetricSource>,
        synth: Synthesizer,
        rules: Vec<TriggerRule>,
        state: ProbeState,
    ) -> Self {
        Self {
            source,
            synth,
            rules,
            state,
        }
    }

    pub fn from_config(
        config: &ProbeConfig,
        source: Box<dyn MetricSource>,
        synth: Synthesizer,
        started: Instant,
    ) -> Self {
        let rules = TriggerRule::from_config(config);
        debug!(
            "Probe rules: {}",
            rules.iter().map(|r| r.name()).collect::<Vec<_>>().join(", ")
        );
        Self::new(
            source,
            synth,
            rules,
            ProbeState::new(config.history_len, started),
        )
    }

    fn sample_history(&mut self, now: Instant) -> anyhow::Result<()> {
        let sample = self.source.system()?;
        let (sent, recv) = self.state.net.update(now, sample.net);
        self.state.history.record(
            sample.cpu_percent,
            sample.memory_percent,
            sample.disk_percent,
            sent,
            recv,
        );
        Ok(())
    }
}

impl Supervised for ProbeLoop {
    type Output = ProbeReport;

    fn tick(&mut self, now: Instant) -> Result<ProbeReport, TickError<ProbeReport>> {
        let mut failures = Vec::new();

        if let Err(e) = self.sample_history(now) {
            failures.push(format!("metrics: {e:#}"));
        }

        let processes = if self.rules.iter().any(TriggerRule::needs_processes) {
            self.source.processes().map_err(|e| format!("{e:#}"))
        } else {
            Ok(Vec::new())
        };

        let mut actions = Vec::new();
        for rule in &self.rules {
            let mut ctx = RuleContext {
                now,
                started: self.state.started,
                processes: &processes,
                synth: &self.synth,
                last_fired: &mut self.state.last_fired,
            };
            match rule.evaluate(&mut ctx) {
                Ok(mut proposed) => actions.append(&mut proposed),
                Err(e) => {
                    warn!("Rule {} failed: {e:#}", rule.name());
                    failures.push(format!("{}: {e:#}", rule.name()));
                }
            }
        }

        if !actions.is_empty() {
            debug!("Probe proposed {} action(s)", actions.len());
        }
        let report = ProbeReport {
            actions,
            history: self.state.history.clone(),
        };
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(TickError {
                message: failures.join("; "),
                salvaged: Some(report),
            })
        }
    }
}
