use std::collections::VecDeque;
use std::fmt;

/// Default number of samples kept per metric.
pub const HISTORY_LEN: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
    NetSent,
    NetRecv,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Cpu,
        Metric::Memory,
        Metric::Disk,
        Metric::NetSent,
        Metric::NetRecv,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Cpu => "CPU (%)",
            Metric::Memory => "Memory (%)",
            Metric::Disk => "Disk (%)",
            Metric::NetSent => "Net sent (KB/s)",
            Metric::NetRecv => "Net recv (KB/s)",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Fixed-length ring buffer, oldest sample first.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Series {
    /// A full buffer of zeros, so charts always have `capacity` points.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: std::iter::repeat(0.0).take(capacity).collect(),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn last(&self) -> f64 {
        self.values.back().copied().unwrap_or_default()
    }

    pub fn min(&self) -> f64 {
        self.values().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn mean(&self) -> f64 {
        self.values().sum::<f64>() / self.values.len() as f64
    }
}

/// Recent samples of every presented metric. Presentation only: no
/// trigger rule reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricHistory {
    series: [Series; 5],
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            series: std::array::from_fn(|_| Series::new(capacity)),
        }
    }

    pub fn record(&mut self, cpu: f64, memory: f64, disk: f64, sent_kbps: f64, recv_kbps: f64) {
        for (metric, value) in Metric::ALL.into_iter().zip([cpu, memory, disk, sent_kbps, recv_kbps]) {
            self.series[metric.index()].push(value);
        }
    }

    pub fn series(&self, metric: Metric) -> &Series {
        &self.series[metric.index()]
    }
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::new(HISTORY_LEN)
    }
}

impl fmt::Display for MetricHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for metric in Metric::ALL {
            let s = self.series(metric);
            writeln!(
                f,
                "{:<16} last {:>7.1}  min {:>7.1}  avg {:>7.1}  max {:>7.1}",
                metric.label(),
                s.last(),
                s.min(),
                s.mean(),
                s.max()
            )?;
        }
        Ok(())
    }
}
