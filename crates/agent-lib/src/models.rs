//! Core data models for the metrics agent

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric type understood by the ingestion API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
}

/// Host identity stamped on every metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub workload: String,
    pub service: String,
    pub hostname: String,
}

impl Identity {
    pub fn new(
        workload: impl Into<String>,
        service: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            workload: workload.into(),
            service: service.into(),
            hostname: hostname.into(),
        }
    }
}

/// Metric attributes: fixed identity fields plus per-device extensions
///
/// Serialized as one flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub workload: String,
    pub service: String,
    pub hostname: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Attributes {
    /// Look up any attribute, identity fields included
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "workload" => Some(&self.workload),
            "service" => Some(&self.service),
            "hostname" => Some(&self.hostname),
            _ => self.extra.get(key).map(String::as_str),
        }
    }
}

impl From<&Identity> for Attributes {
    fn from(identity: &Identity) -> Self {
        Self {
            workload: identity.workload.clone(),
            service: identity.service.clone(),
            hostname: identity.hostname.clone(),
            extra: BTreeMap::new(),
        }
    }
}

/// A single normalized metric, one per (metric, sample time) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub value: f64,
    /// Unix seconds
    pub timestamp: i64,
    pub attributes: Attributes,
}

/// All metric records produced during one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBatch {
    records: Vec<MetricRecord>,
}

impl MetricBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MetricRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricRecord> {
        self.records.iter()
    }
}

impl Extend<MetricRecord> for MetricBatch {
    fn extend<I: IntoIterator<Item = MetricRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

impl FromIterator<MetricRecord> for MetricBatch {
    fn from_iter<I: IntoIterator<Item = MetricRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Wire envelope posted to the ingestion API (wrapped in a one-element array)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub metrics: Vec<MetricRecord>,
}

/// Host memory statistics, all values in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    pub buffers: u64,
    pub cached: u64,
    pub shared: u64,
    pub slab: u64,
    pub reclaimable: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub swap_used: u64,
}

impl MemorySnapshot {
    /// Share of total memory that is available, 0 when total is unknown
    pub fn available_percent(&self) -> f64 {
        percent_of(self.available, self.total)
    }

    pub fn used_percent(&self) -> f64 {
        percent_of(self.used, self.total)
    }
}

pub(crate) fn percent_of(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
