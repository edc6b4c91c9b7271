//! Host metrics sampling and the poll loop
//!
//! Each metric group (CPU, memory, network, disk) is read by a [`Sampler`].
//! Samplers hide where the numbers come from (`/proc` files or the `sysinfo`
//! crate) and hand back raw named values; the [`PollScheduler`] turns them
//! into metric records once per interval.

mod cpu;
mod disk;
mod r#loop;
mod meminfo;
mod memory;
mod network;


pub use cpu::{CpuSampler, CpuTimes, CpuUsage, DEFAULT_PROC_STAT_PATH};
pub use disk::{DiskCounters, DiskSampler};
pub use meminfo::{parse_meminfo, MemInfoAccumulator, MemInfoReader, DEFAULT_MEMINFO_PATH};
pub use memory::MemorySampler;
pub use network::{interface_included, InterfaceCounters, NetworkSampler, DEFAULT_INTERFACE_FILTERS};
pub use r#loop::{
    cycle_remainder, CycleReport, DeliveryOutcome, PollConfig, PollScheduler,
    PollSchedulerBuilder,
};

use crate::error::SamplerError;
use std::collections::BTreeMap;
use std::fmt;

pub use async_trait::async_trait;

/// Metric group a sampler is responsible for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricGroup {
    Cpu,
    Memory,
    Network,
    Disk,
}

impl MetricGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricGroup::Cpu => "cpu",
            MetricGroup::Memory => "memory",
            MetricGroup::Network => "network",
            MetricGroup::Disk => "disk",
        }
    }
}

impl fmt::Display for MetricGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw value produced by a sampler, before identity and prefix are applied
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: &'static str,
    pub value: f64,
    /// Device or interface attributes; empty for host-wide metrics
    pub attributes: BTreeMap<String, String>,
}

impl Sample {
    pub fn new(name: &'static str, value: f64) -> Self {
        Self {
            name,
            value,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: &BTreeMap<String, String>) -> Self {
        self.attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Trait for a source of one metric group
///
/// Samplers own any previous-snapshot state they need for delta computation,
/// so `sample` takes `&mut self`.
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Metric group this sampler produces
    fn group(&self) -> MetricGroup;

    /// Take a baseline snapshot before the first real sample
    async fn prime(&mut self) -> Result<(), SamplerError> {
        Ok(())
    }

    /// Sample the group once
    async fn sample(&mut self) -> Result<Vec<Sample>, SamplerError>;
}

/// The production sampler set, in cycle order: CPU, memory, network, disk
pub fn default_samplers() -> Vec<Box<dyn Sampler>> {
    vec![
        Box::new(CpuSampler::new()),
        Box::new(MemorySampler::new()),
        Box::new(NetworkSampler::new()),
        Box::new(DiskSampler::new()),
    ]
}
