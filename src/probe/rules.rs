use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::time::Instant;

use super::metrics::ProcessSample;
use crate::actions::{ActionKind, ActionParams, RemediationAction, Synthesizer};
use crate::config::ProbeConfig;

/// A predicate over current metrics (or elapsed time) that proposes
/// remediations when it holds.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerRule {
    /// Every process named `process` above `threshold_percent` CPU
    ProcessCpu { process: String, threshold_percent: f64 },
    /// Every named process whose resident memory exceeds `threshold_mb`
    ProcessMemory { threshold_mb: f64 },
    /// `kind` at most once per `every`, regardless of metrics
    Periodic {
        kind: ActionKind,
        every: Duration,
        path: PathBuf,
    },
}

/// What a rule may look at during one tick.
pub(crate) struct RuleContext<'a> {
    pub now: Instant,
    /// Anchor for periodic rules that never fired
    pub started: Instant,
    pub processes: &'a std::result::Result<Vec<ProcessSample>, String>,
    pub synth: &'a Synthesizer,
    pub last_fired: &'a mut HashMap<ActionKind, Instant>,
}

impl TriggerRule {
    /// Rules described by the `[probe]` config section.
    pub fn from_config(config: &ProbeConfig) -> Vec<TriggerRule> {
        let mut rules: Vec<TriggerRule> = config
            .cpu_targets
            .iter()
            .map(|target| TriggerRule::ProcessCpu {
                process: target.process.clone(),
                threshold_percent: target.threshold_percent,
            })
            .collect();
        rules.push(TriggerRule::ProcessMemory {
            threshold_mb: config.memory_threshold_mb,
        });
        rules.push(TriggerRule::Periodic {
            kind: ActionKind::CleanupTemp,
            every: Duration::from_secs(config.temp_cleanup_secs),
            path: config.temp_path(),
        });
        rules.push(TriggerRule::Periodic {
            kind: ActionKind::CleanupRecycleBin,
            every: Duration::from_secs(config.recycle_cleanup_secs),
            path: config.trash_path(),
        });
        rules
    }

    pub fn name(&self) -> String {
        match self {
            TriggerRule::ProcessCpu { process, .. } => format!("cpu({process})"),
            TriggerRule::ProcessMemory { .. } => "memory".to_string(),
            TriggerRule::Periodic { kind, .. } => kind.to_string(),
        }
    }

    pub fn needs_processes(&self) -> bool {
        !matches!(self, TriggerRule::Periodic { .. })
    }

    pub(crate) fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<Vec<RemediationAction>> {
        match self {
            TriggerRule::ProcessCpu {
                process,
                threshold_percent,
            } => {
                let processes = sampled(ctx.processes)?;
                processes
                    .iter()
                    .filter(|p| p.name == *process && p.cpu_percent > *threshold_percent)
                    .map(|p| {
                        let params = ActionParams::new()
                            .text("process", process.as_str())
                            .number("threshold", *threshold_percent)
                            .number("pid", f64::from(p.pid));
                        ctx.synth
                            .synthesize(ActionKind::HighCpu, params)
                            .map_err(anyhow::Error::from)
                    })
                    .collect()
            }
            TriggerRule::ProcessMemory { threshold_mb } => {
                let processes = sampled(ctx.processes)?;
                processes
                    .iter()
                    .filter(|p| !p.name.is_empty() && p.memory_mb() > *threshold_mb)
                    .map(|p| {
                        let params = ActionParams::new()
                            .text("process", p.name.as_str())
                            .number("threshold_mb", *threshold_mb);
                        ctx.synth
                            .synthesize(ActionKind::HighMemory, params)
                            .map_err(anyhow::Error::from)
                    })
                    .collect()
            }
            TriggerRule::Periodic { kind, every, path } => {
                let last = ctx.last_fired.get(kind).copied().unwrap_or(ctx.started);
                match ctx.now.checked_duration_since(last) {
                    Some(elapsed) if elapsed >= *every => {
                        let action = ctx
                            .synth
                            .synthesize(*kind, ActionParams::new().path("path", path))?;
                        ctx.last_fired.insert(*kind, ctx.now);
                        Ok(vec![action])
                    }
                    _ => Ok(Vec::new()),
                }
            }
        }
    }
}

fn sampled(
    processes: &std::result::Result<Vec<ProcessSample>, String>,
) -> Result<&[ProcessSample]> {
    processes
        .as_deref()
        .map_err(|e| anyhow!("process list unavailable: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Catalog;
    use crate::probe::metrics::scripted::process;

    struct Fixture {
        synth: Synthesizer,
        started: Instant,
        last_fired: HashMap<ActionKind, Instant>,
        processes: std::result::Result<Vec<ProcessSample>, String>,
    }

    impl Fixture {
        fn new(processes: Vec<ProcessSample>) -> Self {
            Self {
                synth: Synthesizer::default(),
                started: Instant::now(),
                last_fired: HashMap::new(),
                processes: Ok(processes),
            }
        }

        fn eval(&mut self, rule: &TriggerRule, at: Duration) -> Result<Vec<RemediationAction>> {
            let mut ctx = RuleContext {
                now: self.started + at,
                started: self.started,
                processes: &self.processes,
                synth: &self.synth,
                last_fired: &mut self.last_fired,
            };
            rule.evaluate(&mut ctx)
        }
    }

    #[test]
    fn test_cpu_rule_one_action_per_matching_process() {
        let mut fx = Fixture::new(vec![
            process(1, "chrome", 95.0, 100),
            process(2, "chrome", 85.0, 100),
            process(3, "chrome", 10.0, 100),
            process(4, "firefox", 99.0, 100),
        ]);
        let rule = TriggerRule::ProcessCpu {
            process: "chrome".into(),
            threshold_percent: 80.0,
        };
        let actions = fx.eval(&rule, Duration::ZERO).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| a.kind == ActionKind::HighCpu));
        assert_eq!(actions[0].description, "Kill chrome (CPU>80%)");
        // Each action targets the sampled pid, not every process of that name
        assert!(actions[0].source.contains("pid=1\n"));
        assert!(actions[1].source.contains("pid=2\n"));
    }

    #[test]
    fn test_cpu_rule_threshold_is_strict() {
        let mut fx = Fixture::new(vec![process(1, "chrome", 80.0, 100)]);
        let rule = TriggerRule::ProcessCpu {
            process: "chrome".into(),
            threshold_percent: 80.0,
        };
        assert!(fx.eval(&rule, Duration::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_memory_rule_any_name() {
        let mut fx = Fixture::new(vec![
            process(1, "leak.exe", 1.0, 600),
            process(2, "db", 1.0, 2048),
            process(3, "small", 1.0, 20),
            process(4, "", 1.0, 4096),
        ]);
        let rule = TriggerRule::ProcessMemory { threshold_mb: 500.0 };
        let actions = fx.eval(&rule, Duration::ZERO).unwrap();
        let descriptions: Vec<_> = actions.iter().map(|a| a.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec!["Kill leak.exe (Mem>500MB)", "Kill db (Mem>500MB)"]
        );
    }

    #[test]
    fn test_process_rules_fail_without_process_list() {
        let mut fx = Fixture::new(vec![]);
        fx.processes = Err("permission denied".into());
        let rule = TriggerRule::ProcessMemory { threshold_mb: 500.0 };
        let err = fx.eval(&rule, Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_periodic_rule_waits_one_interval() {
        let mut fx = Fixture::new(vec![]);
        let rule = TriggerRule::Periodic {
            kind: ActionKind::CleanupTemp,
            every: Duration::from_secs(60),
            path: "/tmp".into(),
        };
        assert!(fx.eval(&rule, Duration::from_secs(5)).unwrap().is_empty());
        assert!(fx.eval(&rule, Duration::from_secs(55)).unwrap().is_empty());
        let fired = fx.eval(&rule, Duration::from_secs(60)).unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].description, "Cleanup Temp Folder");
        assert_eq!(
            fx.last_fired[&ActionKind::CleanupTemp],
            fx.started + Duration::from_secs(60)
        );
        assert!(fx.eval(&rule, Duration::from_secs(65)).unwrap().is_empty());
    }

    #[test]
    fn test_periodic_rule_ignores_time_going_backwards() {
        let mut fx = Fixture::new(vec![]);
        let rule = TriggerRule::Periodic {
            kind: ActionKind::CleanupRecycleBin,
            every: Duration::from_secs(300),
            path: "/trash".into(),
        };
        fx.eval(&rule, Duration::from_secs(600)).unwrap();
        let fired_at = fx.last_fired[&ActionKind::CleanupRecycleBin];
        assert!(fx.eval(&rule, Duration::from_secs(100)).unwrap().is_empty());
        assert_eq!(fx.last_fired[&ActionKind::CleanupRecycleBin], fired_at);
    }

    #[test]
    fn test_periodic_rule_synthesis_error_propagates() {
        let mut fx = Fixture::new(vec![]);
        fx.synth = Synthesizer::new(Catalog::with_kinds(&[ActionKind::HighCpu]));
        let rule = TriggerRule::Periodic {
            kind: ActionKind::CleanupTemp,
            every: Duration::from_secs(1),
            path: "/tmp".into(),
        };
        assert!(fx.eval(&rule, Duration::from_secs(2)).is_err());
        // Nothing recorded for a firing that produced no action
        assert!(fx.last_fired.is_empty());
    }

    #[test]
    fn test_names() {
        let rule = TriggerRule::ProcessCpu {
            process: "chrome".into(),
            threshold_percent: 80.0,
        };
        assert_eq!(rule.name(), "cpu(chrome)");
        assert!(rule.needs_processes());
        let periodic = TriggerRule::Periodic {
            kind: ActionKind::CleanupTemp,
            every: Duration::from_secs(60),
            path: "/tmp".into(),
        };
        assert_eq!(periodic.name(), "cleanup_temp");
        assert!(!periodic.needs_processes());
    }
}
