//! Host sampler
//!
//! Reads memory and CPU figures with `sysinfo` and turns them into gauges,
//! plus a `PollCount` counter that grows by one per sample.

use sysinfo::System;
use tracing::trace;

use crate::metric::Metric;

pub const POLL_COUNT: &str = "PollCount";

pub struct Collector {
    system: System,
}

impl Collector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();
        Self { system }
    }

    /// Take one sample of the host
    pub fn sample(&mut self) -> Vec<Metric> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let cpus = self.system.cpus();
        let cpu_total = cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum::<f64>();
        let cpu_avg = if cpus.is_empty() {
            0.0
        } else {
            cpu_total / cpus.len() as f64
        };

        let mut gauges = vec![
            ("TotalMemory".to_string(), self.system.total_memory() as f64),
            ("UsedMemory".to_string(), self.system.used_memory() as f64),
            ("FreeMemory".to_string(), self.system.free_memory() as f64),
            ("TotalSwap".to_string(), self.system.total_swap() as f64),
            ("UsedSwap".to_string(), self.system.used_swap() as f64),
            ("CPUutilizationAvg".to_string(), cpu_avg),
        ];
        gauges.extend(
            cpus.iter()
                .enumerate()
                .map(|(i, cpu)| (format!("CPUutilization{}", i + 1), cpu.cpu_usage() as f64)),
        );

        let mut metrics: Vec<Metric> = gauges
            .into_iter()
            .filter_map(|(id, value)| Metric::gauge(id, value).ok())
            .collect();
        metrics.extend(Metric::counter(POLL_COUNT, 1));

        trace!("sampled {} metrics", metrics.len());
        metrics
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}
