//! Memory and swap gauges

use super::{async_trait, MemInfoReader, MetricGroup, Sample, Sampler};
use crate::error::{MemInfoError, SamplerError};
use crate::models::{percent_of, MemorySnapshot};
use std::path::PathBuf;
use tracing::warn;

/// Sampler for host memory, backed by [`MemInfoReader`]
#[derive(Debug, Clone, Default)]
pub struct MemorySampler {
    reader: MemInfoReader,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from a custom meminfo path (for testing)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            reader: MemInfoReader::new(path),
        }
    }

    /// Read a snapshot, degrading to zeros when the source is missing
    pub async fn snapshot(&self) -> Result<MemorySnapshot, SamplerError> {
        match self.reader.read().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e @ MemInfoError::SourceUnavailable { .. }) => {
                warn!(error = %e, "Memory statistics unavailable, reporting zeros");
                Ok(MemorySnapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Gauges for one snapshot
    ///
    /// `MemoryFreeBytes` reports available memory, not `MemFree`.
    pub fn samples_from(snapshot: &MemorySnapshot) -> Vec<Sample> {
        vec![
            Sample::new("MemoryTotalBytes", snapshot.total as f64),
            Sample::new("MemoryFreeBytes", snapshot.available as f64),
            Sample::new("MemoryUsedBytes", snapshot.used as f64),
            Sample::new("MemoryFreePercent", snapshot.available_percent()),
            Sample::new("MemoryUsedPercent", snapshot.used_percent()),
            Sample::new("MemoryCachedBytes", snapshot.cached as f64),
            Sample::new("SwapTotalBytes", snapshot.swap_total as f64),
            Sample::new("SwapFreeBytes", snapshot.swap_free as f64),
            Sample::new("SwapUsedBytes", snapshot.swap_used as f64),
        ]
    }
}

#[async_trait]
impl Sampler for MemorySampler {
    fn group(&self) -> MetricGroup {
        MetricGroup::Memory
    }

    async fn sample(&mut self) -> Result<Vec<Sample>, SamplerError> {
        let snapshot = self.snapshot().await?;
        Ok(Self::samples_from(&snapshot))
    }
}
