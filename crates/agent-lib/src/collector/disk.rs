//! Per-device disk space and I/O throughput

use super::{async_trait, MetricGroup, Sample, Sampler};
use crate::error::SamplerError;
use crate::models::percent_of;
use std::collections::BTreeMap;
use std::time::Instant;
use sysinfo::Disks;

/// Space figures and I/O deltas for one mounted device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskCounters {
    pub device: String,
    pub mount_point: String,
    pub file_system: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
    /// Bytes read since the previous refresh
    pub read_bytes: u64,
    /// Bytes written since the previous refresh
    pub written_bytes: u64,
}

impl DiskCounters {
    pub fn samples(&self, elapsed_secs: f64) -> Vec<Sample> {
        let rate = |delta: u64| {
            if elapsed_secs > 0.0 {
                delta as f64 / elapsed_secs
            } else {
                0.0
            }
        };
        let used = self.total_bytes.saturating_sub(self.available_bytes);

        let mut attributes = BTreeMap::new();
        attributes.insert("device".to_string(), self.device.clone());
        attributes.insert("mountPoint".to_string(), self.mount_point.clone());
        attributes.insert("fileSystemType".to_string(), self.file_system.clone());

        vec![
            Sample::new("UsedBytes", used as f64),
            Sample::new("UsedPercent", percent_of(used, self.total_bytes)),
            Sample::new("FreeBytes", self.available_bytes as f64),
            Sample::new(
                "FreePercent",
                percent_of(self.available_bytes, self.total_bytes),
            ),
            Sample::new("TotalBytes", self.total_bytes as f64),
            Sample::new("ReadBytesPerSec", rate(self.read_bytes)),
            Sample::new("WriteBytesPerSec", rate(self.written_bytes)),
            Sample::new(
                "ReadWriteBytesPerSecond",
                rate(self.read_bytes.saturating_add(self.written_bytes)),
            ),
        ]
        .into_iter()
        .map(|s| s.with_attributes(&attributes))
        .collect()
    }
}

/// Disk sampler backed by `sysinfo::Disks`
pub struct DiskSampler {
    disks: Disks,
    last_refresh: Instant,
}

impl Default for DiskSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskSampler {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
            last_refresh: Instant::now(),
        }
    }
}

#[async_trait]
impl Sampler for DiskSampler {
    fn group(&self) -> MetricGroup {
        MetricGroup::Disk
    }

    async fn sample(&mut self) -> Result<Vec<Sample>, SamplerError> {
        self.disks.refresh(true);
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.last_refresh).as_secs_f64();
        self.last_refresh = now;

        let mut devices: Vec<DiskCounters> = self
            .disks
            .iter()
            .filter(|disk| disk.total_space() > 0)
            .map(|disk| {
                let usage = disk.usage();
                DiskCounters {
                    device: disk.name().to_string_lossy().to_string(),
                    mount_point: disk.mount_point().to_string_lossy().to_string(),
                    file_system: disk.file_system().to_string_lossy().to_string(),
                    total_bytes: disk.total_space(),
                    available_bytes: disk.available_space(),
                    read_bytes: usage.read_bytes,
                    written_bytes: usage.written_bytes,
                }
            })
            .collect();
        devices.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));

        Ok(devices
            .iter()
            .flat_map(|d| d.samples(elapsed_secs))
            .collect())
    }
}
