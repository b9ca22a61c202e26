//! Metric sources.
//!
//! The probe loop and the dashboard only see the [`MetricSource`] trait:
//! point-in-time, synchronous reads. [`SysinfoSource`] is the host
//! implementation.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use sysinfo::{Disks, Networks, ProcessesToUpdate, System};
use tokio::time::Instant;

/// One running process as seen by a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    /// Resident memory
    pub memory_bytes: u64,
}

impl ProcessSample {
    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / 1024.0 / 1024.0
    }
}

/// Cumulative network byte counters, summed over interfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

impl NetCounters {
    /// KB/s sent and received since `prev`. Counter resets yield zero.
    pub fn rate_since(&self, prev: &NetCounters, elapsed_secs: f64) -> (f64, f64) {
        if elapsed_secs <= 0.0 {
            return (0.0, 0.0);
        }
        let sent = self.bytes_sent.saturating_sub(prev.bytes_sent) as f64 / 1024.0;
        let recv = self.bytes_recv.saturating_sub(prev.bytes_recv) as f64 / 1024.0;
        (sent / elapsed_secs, recv / elapsed_secs)
    }
}

/// Host-wide gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub net: NetCounters,
}

/// Tracks network counters between samples and turns them into rates.
#[derive(Debug, Default)]
pub struct NetRate {
    prev: Option<(Instant, NetCounters)>,
}

impl NetRate {
    /// KB/s since the previous call; zero on the first call.
    pub fn update(&mut self, now: Instant, counters: NetCounters) -> (f64, f64) {
        let rate = match self.prev {
            Some((at, prev)) => match now.checked_duration_since(at) {
                Some(elapsed) => counters.rate_since(&prev, elapsed.as_secs_f64()),
                None => (0.0, 0.0),
            },
            None => (0.0, 0.0),
        };
        self.prev = Some((now, counters));
        rate
    }
}

pub trait MetricSource: Send {
    fn system(&mut self) -> Result<SystemSample>;

    fn processes(&mut self) -> Result<Vec<ProcessSample>>;
}

/// [`MetricSource`] backed by `sysinfo`.
///
/// Keeps one `System` between calls: CPU percentages are computed from
/// the difference between two refreshes, so the first reading is zero.
pub struct SysinfoSource {
    system: System,
    disk_path: PathBuf,
}

impl SysinfoSource {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        Self {
            system: System::new(),
            disk_path: disk_path.into(),
        }
    }
}

impl MetricSource for SysinfoSource {
    fn system(&mut self) -> Result<SystemSample> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total == 0 {
            return Err(anyhow!("Total memory reported as zero"));
        }
        let memory_percent = self.system.used_memory() as f64 / total as f64 * 100.0;

        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<(PathBuf, u64, u64)> = disks
            .list()
            .iter()
            .map(|d| (d.mount_point().to_path_buf(), d.total_space(), d.available_space()))
            .collect();
        let disk_percent = disk_usage_for(&mounts, &self.disk_path)
            .ok_or_else(|| anyhow!("No mounted disk for {}", self.disk_path.display()))?;

        let networks = Networks::new_with_refreshed_list();
        let net = networks
            .list()
            .values()
            .fold(NetCounters::default(), |acc, data| NetCounters {
                bytes_sent: acc.bytes_sent + data.total_transmitted(),
                bytes_recv: acc.bytes_recv + data.total_received(),
            });

        Ok(SystemSample {
            cpu_percent: self.system.global_cpu_usage() as f64,
            memory_percent,
            disk_percent,
            net,
        })
    }

    fn processes(&mut self) -> Result<Vec<ProcessSample>> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        Ok(self
            .system
            .processes()
            .values()
            .map(|p| ProcessSample {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                cpu_percent: p.cpu_usage() as f64,
                memory_bytes: p.memory(),
            })
            .collect())
    }
}

/// Usage percent of the mount holding `path` (longest mount-point prefix).
fn disk_usage_for(mounts: &[(PathBuf, u64, u64)], path: &Path) -> Option<f64> {
    mounts
        .iter()
        .filter(|(mount, total, _)| *total > 0 && path.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())
        .map(|(_, total, available)| {
            (total.saturating_sub(*available)) as f64 / *total as f64 * 100.0
        })
}
