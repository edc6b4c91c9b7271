//! Per-interface network throughput and error rates
//!
//! Counters come from `sysinfo`, which reports bytes and errors accumulated
//! since its previous refresh. Rates divide those deltas by the wall time
//! between refreshes.

use super::{async_trait, MetricGroup, Sample, Sampler};
use crate::error::SamplerError;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Instant;
use sysinfo::Networks;
use tokio::fs;

const DEFAULT_SYSFS_NET: &str = "/sys/class/net";

/// Interface name prefixes skipped by default (loopback and virtual bridges)
pub const DEFAULT_INTERFACE_FILTERS: &[&str] =
    &["dummy", "lxcbr", "virbr", "veth", "lo", "cni", "docker"];

/// Counter deltas and identity for one interface
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceCounters {
    pub name: String,
    pub received_bytes: u64,
    pub transmitted_bytes: u64,
    pub receive_errors: u64,
    pub transmit_errors: u64,
    pub hardware_address: Option<String>,
    pub ipv4_address: Option<String>,
    pub ipv6_address: Option<String>,
    pub state: Option<String>,
}

impl InterfaceCounters {
    /// Rate gauges for this interface over `elapsed_secs`
    pub fn samples(&self, elapsed_secs: f64) -> Vec<Sample> {
        let rate = |delta: u64| {
            if elapsed_secs > 0.0 {
                delta as f64 / elapsed_secs
            } else {
                0.0
            }
        };

        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert("interfaceName".to_string(), self.name.clone());
        let optional = [
            ("hardwareAddress", &self.hardware_address),
            ("ipV4Address", &self.ipv4_address),
            ("ipV6Address", &self.ipv6_address),
            ("state", &self.state),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                attributes.insert(key.to_string(), value.clone());
            }
        }

        vec![
            Sample::new("ReceiveBytesPerSec", rate(self.received_bytes)),
            Sample::new("ReceiveErrorsPerSec", rate(self.receive_errors)),
            Sample::new("TransmitBytesPerSec", rate(self.transmitted_bytes)),
            Sample::new("TransmitErrorsPerSec", rate(self.transmit_errors)),
        ]
        .into_iter()
        .map(|s| s.with_attributes(&attributes))
        .collect()
    }
}

/// Whether an interface should be reported under the given prefix filters
pub fn interface_included(name: &str, filters: &[String]) -> bool {
    !filters.iter().any(|prefix| name.starts_with(prefix.as_str()))
}

/// Network sampler backed by `sysinfo::Networks`
pub struct NetworkSampler {
    networks: Networks,
    last_refresh: Instant,
    filters: Vec<String>,
    sysfs_net: PathBuf,
}

impl Default for NetworkSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSampler {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            last_refresh: Instant::now(),
            filters: DEFAULT_INTERFACE_FILTERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sysfs_net: PathBuf::from(DEFAULT_SYSFS_NET),
        }
    }

    /// Replace the interface name prefix filters
    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    /// Operational state from sysfs, if the platform exposes it
    async fn operstate(&self, interface: &str) -> Option<String> {
        fs::read_to_string(self.sysfs_net.join(interface).join("operstate"))
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl Sampler for NetworkSampler {
    fn group(&self) -> MetricGroup {
        MetricGroup::Network
    }

    async fn sample(&mut self) -> Result<Vec<Sample>, SamplerError> {
        self.networks.refresh(true);
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.last_refresh).as_secs_f64();
        self.last_refresh = now;

        let mut interfaces: Vec<InterfaceCounters> = self
            .networks
            .iter()
            .filter(|(name, _)| interface_included(name, &self.filters))
            .map(|(name, data)| {
                let mac = data.mac_address();
                let first_addr = |v4: bool| {
                    data.ip_networks()
                        .iter()
                        .map(|n| n.addr)
                        .find(|addr| matches!(addr, IpAddr::V4(_)) == v4)
                        .map(|addr| addr.to_string())
                };
                InterfaceCounters {
                    name: name.to_string(),
                    received_bytes: data.received(),
                    transmitted_bytes: data.transmitted(),
                    receive_errors: data.errors_on_received(),
                    transmit_errors: data.errors_on_transmitted(),
                    hardware_address: (!mac.is_unspecified()).then(|| mac.to_string()),
                    ipv4_address: first_addr(true),
                    ipv6_address: first_addr(false),
                    state: None,
                }
            })
            .collect();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));

        let mut samples = Vec::with_capacity(interfaces.len() * 4);
        for mut interface in interfaces {
            interface.state = self.operstate(&interface.name).await;
            samples.extend(interface.samples(elapsed_secs));
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth0() -> InterfaceCounters {
        InterfaceCounters {
            name: "eth0".to_string(),
            received_bytes: 10_000,
            transmitted_bytes: 5_000,
            receive_errors: 4,
            transmit_errors: 0,
            hardware_address: Some("02:42:ac:11:00:02".to_string()),
            ipv4_address: Some("172.17.0.2".to_string()),
            ipv6_address: None,
            state: Some("up".to_string()),
        }
    }

    #[test]
    fn test_rates_over_elapsed_time() {
        let samples = eth0().samples(10.0);

        let rx = samples.iter().find(|s| s.name == "ReceiveBytesPerSec").unwrap();
        assert_eq!(rx.value, 1_000.0);
        let rx_err = samples.iter().find(|s| s.name == "ReceiveErrorsPerSec").unwrap();
        assert_eq!(rx_err.value, 0.4);
        let tx = samples.iter().find(|s| s.name == "TransmitBytesPerSec").unwrap();
        assert_eq!(tx.value, 500.0);
    }

    #[test]
    fn test_interface_attributes() {
        let samples = eth0().samples(1.0);
        assert_eq!(samples.len(), 4);

        for sample in &samples {
            assert_eq!(sample.attributes["interfaceName"], "eth0");
            assert_eq!(sample.attributes["ipV4Address"], "172.17.0.2");
            assert_eq!(sample.attributes["state"], "up");
            assert!(!sample.attributes.contains_key("ipV6Address"));
        }
    }

    #[test]
    fn test_zero_elapsed_time_gives_zero_rates() {
        let samples = eth0().samples(0.0);
        assert!(samples.iter().all(|s| s.value == 0.0));
    }

    #[test]
    fn test_interface_filters() {
        let filters: Vec<String> = DEFAULT_INTERFACE_FILTERS
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert!(interface_included("eth0", &filters));
        assert!(interface_included("ens5", &filters));
        assert!(!interface_included("lo", &filters));
        assert!(!interface_included("veth12ab", &filters));
        assert!(!interface_included("docker0", &filters));
        assert!(interface_included("lo", &[]));
    }
}
