//! Metric record construction

use crate::collector::Sample;
use crate::models::{Attributes, Identity, MetricKind, MetricRecord};
use std::collections::BTreeMap;

/// Joins the metric prefix and the metric name
pub const NAME_SEPARATOR: &str = ".";

/// Build one gauge record
///
/// `extra` attributes are merged over the identity attributes; when a key
/// collides with `workload`, `service` or `hostname` the extra value wins.
pub fn build_metric(
    prefix: &str,
    name: &str,
    value: f64,
    timestamp: i64,
    base: &Identity,
    extra: Option<&BTreeMap<String, String>>,
) -> MetricRecord {
    let name = if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", prefix, NAME_SEPARATOR, name)
    };

    let mut attributes = Attributes::from(base);
    for (key, value) in extra.into_iter().flatten() {
        match key.as_str() {
            "workload" => attributes.workload = value.clone(),
            "service" => attributes.service = value.clone(),
            "hostname" => attributes.hostname = value.clone(),
            _ => {
                attributes.extra.insert(key.clone(), value.clone());
            }
        }
    }

    MetricRecord {
        name,
        kind: MetricKind::Gauge,
        value,
        timestamp,
        attributes,
    }
}

/// Holds the static prefix and identity for a running agent
#[derive(Debug, Clone)]
pub struct MetricBuilder {
    prefix: String,
    identity: Identity,
}

impl MetricBuilder {
    pub fn new(prefix: impl Into<String>, identity: Identity) -> Self {
        Self {
            prefix: prefix.into(),
            identity,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn build(
        &self,
        name: &str,
        value: f64,
        timestamp: i64,
        extra: Option<&BTreeMap<String, String>>,
    ) -> MetricRecord {
        build_metric(&self.prefix, name, value, timestamp, &self.identity, extra)
    }

    /// Record for a raw sampler value
    pub fn from_sample(&self, sample: &Sample, timestamp: i64) -> MetricRecord {
        let extra = (!sample.attributes.is_empty()).then_some(&sample.attributes);
        self.build(sample.name, sample.value, timestamp, extra)
    }
}
