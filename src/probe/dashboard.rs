use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use super::metrics::{MetricSource, NetRate};
use crate::supervisor::{Supervised, TickError};

/// Live gauges shown on demand by the console.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gauges {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub sent_kbps: f64,
    pub recv_kbps: f64,
    pub uptime: Duration,
}

impl fmt::Display for Gauges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.uptime.as_secs();
        write!(
            f,
            "CPU {:.1}% | Memory {:.1}% | Disk {:.1}% | Net sent {:.1} KB/s, recv {:.1} KB/s | Uptime {:02}:{:02}:{:02}",
            self.cpu_percent,
            self.memory_percent,
            self.disk_percent,
            self.sent_kbps,
            self.recv_kbps,
            secs / 3600,
            secs % 3600 / 60,
            secs % 60
        )
    }
}

/// The sampler behind the gauges. Runs on its own cadence, under its own
/// supervisor, so a broken sensor here never stops the probe loop.
pub struct Dashboard {
    source: Box<dyn MetricSource>,
    net: NetRate,
    started: Instant,
}

impl Dashboard {
    pub fn new(source: Box<dyn MetricSource>, started: Instant) -> Self {
        Self {
            source,
            net: NetRate::default(),
            started,
        }
    }
}

impl Supervised for Dashboard {
    type Output = Gauges;

    fn tick(&mut self, now: Instant) -> Result<Gauges, TickError<Gauges>> {
        let sample = self.source.system()?;
        let (sent_kbps, recv_kbps) = self.net.update(now, sample.net);
        Ok(Gauges {
            cpu_percent: sample.cpu_percent,
            memory_percent: sample.memory_percent,
            disk_percent: sample.disk_percent,
            sent_kbps,
            recv_kbps,
            uptime: now.saturating_duration_since(self.started),
        })
    }
}
