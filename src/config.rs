use serde::Deserialize;
use std::path::PathBuf;

use anyhow::{bail, Context};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub probe: ProbeConfig,
    pub dashboard: DashboardConfig,
    pub supervisor: SupervisorConfig,
    pub executor: ExecutorConfig,
}

/// `[probe]`: the remediation loop ("architecture" on the console)
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,
    pub tick_secs: u64,
    /// Samples kept per metric
    pub history_len: usize,
    /// Each entry yields one CPU rule
    pub cpu_targets: Vec<CpuTarget>,
    /// Any named process above this resident size is proposed for killing
    pub memory_threshold_mb: f64,
    pub temp_cleanup_secs: u64,
    /// Directory emptied by the temp cleanup (default: the system temp dir)
    pub temp_dir: Option<String>,
    pub recycle_cleanup_secs: u64,
    /// freedesktop.org trash directory
    pub trash_dir: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CpuTarget {
    pub process: String,
    #[serde(default = "default_cpu_threshold")]
    pub threshold_percent: f64,
}

/// `[dashboard]`: live gauges
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub sample_secs: u64,
    /// Disk usage is reported for the mount holding this path
    pub disk_path: String,
}

/// `[supervisor]`: fault containment, shared by every periodic unit
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SupervisorConfig {
    pub cooldown: CooldownMode,
    pub cooldown_secs: u64,
    /// Only used by the exponential cooldown
    pub max_cooldown_secs: u64,
    pub multiplier: u32,
    pub breaker: BreakerPolicy,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CooldownMode {
    Fixed,
    /// Grows after each consecutive fault, reset by a healthy tick
    Exponential,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPolicy {
    /// The first fault locks the feature's control until restart
    OneShot,
    /// `/rearm <feature>` unlocks it
    ManualRearm,
}

/// `[executor]`: script sandbox
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Where script files are written and kept. Defaults to
    /// `$XDG_STATE_HOME/ara-agent/scripts` (`~/.local/state` when unset).
    /// Must lie outside the directories the cleanup actions empty.
    pub work_dir: Option<String>,
    pub interpreter: String,
    /// Wall-clock limit for `/run`
    pub run_timeout_secs: u64,
}

fn default_cpu_threshold() -> f64 {
    80.0
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: 5,
            history_len: 60,
            cpu_targets: vec![CpuTarget {
                process: "chrome".to_string(),
                threshold_percent: default_cpu_threshold(),
            }],
            memory_threshold_mb: 500.0,
            temp_cleanup_secs: 60,
            temp_dir: None,
            recycle_cleanup_secs: 300,
            trash_dir: "~/.local/share/Trash".to_string(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_secs: 1,
            disk_path: "~".to_string(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cooldown: CooldownMode::Fixed,
            cooldown_secs: 60,
            max_cooldown_secs: 960,
            multiplier: 2,
            breaker: BreakerPolicy::OneShot,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            interpreter: "/bin/sh".to_string(),
            run_timeout_secs: 10,
        }
    }
}

/// Expands a leading `~` to the home directory.
fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl ProbeConfig {
    pub fn temp_path(&self) -> PathBuf {
        match &self.temp_dir {
            Some(dir) => expand_path(dir),
            None => std::env::temp_dir(),
        }
    }

    pub fn trash_path(&self) -> PathBuf {
        expand_path(&self.trash_dir)
    }
}

impl DashboardConfig {
    pub fn disk_path(&self) -> PathBuf {
        expand_path(&self.disk_path)
    }
}

impl ExecutorConfig {
    pub fn work_path(&self) -> PathBuf {
        match &self.work_dir {
            Some(dir) => expand_path(dir),
            None => {
                let state = std::env::var_os("XDG_STATE_HOME")
                    .filter(|dir| !dir.is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| expand_path("~/.local/state"));
                state.join("ara-agent").join("scripts")
            }
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {path}"))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {path}"))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${HOME}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let intervals = [
            ("probe.tick_secs", self.probe.tick_secs),
            ("probe.temp_cleanup_secs", self.probe.temp_cleanup_secs),
            ("probe.recycle_cleanup_secs", self.probe.recycle_cleanup_secs),
            ("dashboard.sample_secs", self.dashboard.sample_secs),
            ("executor.run_timeout_secs", self.executor.run_timeout_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        for target in &self.probe.cpu_targets {
            if target.process.trim().is_empty() {
                bail!("probe.cpu_targets entries need a process name");
            }
        }
        if self.executor.interpreter.trim().is_empty() {
            bail!("executor.interpreter must not be empty");
        }
        let work = self.executor.work_path();
        let swept = [
            ("probe.temp_dir", self.probe.temp_path()),
            ("probe.trash_dir", self.probe.trash_path()),
        ];
        for (name, dir) in swept {
            if work.starts_with(&dir) {
                bail!(
                    "executor.work_dir {} is inside {name} {}, which the cleanup actions empty",
                    work.display(),
                    dir.display()
                );
            }
        }
        Ok(())
    }
}
