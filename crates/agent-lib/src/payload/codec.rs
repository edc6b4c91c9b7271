//! JSON + gzip encoding of metric batches
//!
//! The ingestion API takes an array of payload objects; the agent always
//! sends exactly one: `[{"metrics": [...]}]`.

use crate::error::EncodeError;
use crate::models::{MetricBatch, MetricRecord};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::io::Write;

/// Marker sent in the `Content-Encoding` header
pub const CONTENT_ENCODING: &str = "gzip";

#[derive(Serialize)]
struct PayloadRef<'a> {
    metrics: &'a [MetricRecord],
}

/// Serializes and compresses metric batches
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    level: Compression,
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl PayloadCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific gzip level (0-9)
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    /// Encode a batch as a gzip-compressed JSON array of one payload
    ///
    /// Non-finite values are rejected up front since serde_json would
    /// silently turn them into `null`.
    pub fn encode(&self, batch: &MetricBatch) -> Result<Vec<u8>, EncodeError> {
        if let Some(bad) = batch.iter().find(|r| !r.value.is_finite()) {
            return Err(EncodeError::NonFiniteValue {
                name: bad.name.clone(),
                value: bad.value,
            });
        }

        let json = serde_json::to_vec(&[PayloadRef {
            metrics: batch.records(),
        }])?;

        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), self.level);
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Identity, Payload};
    use crate::payload::MetricBuilder;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn decode(bytes: &[u8]) -> Vec<Payload> {
        let mut json = String::new();
        GzDecoder::new(bytes).read_to_string(&mut json).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    fn batch() -> MetricBatch {
        let builder = MetricBuilder::new("container", Identity::new("wl", "svc", "host-1"));
        let mut batch = MetricBatch::new();
        batch.push(builder.build("CpuPercent", 12.5, 1_700_000_000, None));
        batch.push(builder.build("MemoryUsedBytes", 4096.0, 1_700_000_000, None));
        let mut extra = std::collections::BTreeMap::new();
        extra.insert("interfaceName".to_string(), "eth0".to_string());
        batch.push(builder.build("ReceiveBytesPerSec", 0.25, 1_700_000_000, Some(&extra)));
        batch
    }

    #[test]
    fn test_encoded_payload_round_trips() {
        let batch = batch();
        let encoded = PayloadCodec::new().encode(&batch).unwrap();

        let payloads = decode(&encoded);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].metrics.as_slice(), batch.records());
    }

    #[test]
    fn test_wire_shape() {
        let encoded = PayloadCodec::new().encode(&batch()).unwrap();
        let mut json = String::new();
        GzDecoder::new(encoded.as_slice())
            .read_to_string(&mut json)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let first = &value[0]["metrics"][0];
        assert_eq!(first["name"], "container.CpuPercent");
        assert_eq!(first["type"], "gauge");
        assert_eq!(first["value"], 12.5);
        assert_eq!(first["timestamp"], 1_700_000_000i64);
        assert_eq!(first["attributes"]["workload"], "wl");
        assert_eq!(first["attributes"]["service"], "svc");
        assert_eq!(first["attributes"]["hostname"], "host-1");

        let third = &value[0]["metrics"][2];
        assert_eq!(third["attributes"]["interfaceName"], "eth0");
    }

    #[test]
    fn test_empty_batch_still_encodes() {
        let encoded = PayloadCodec::new().encode(&MetricBatch::new()).unwrap();
        assert!(!encoded.is_empty());
        assert!(decode(&encoded)[0].metrics.is_empty());
    }

    #[test]
    fn test_non_finite_value_is_rejected() {
        let builder = MetricBuilder::new("p", Identity::new("w", "s", "h"));
        let mut batch = batch();
        batch.push(builder.build("CpuPercent", f64::NAN, 0, None));

        match PayloadCodec::new().encode(&batch) {
            Err(EncodeError::NonFiniteValue { name, .. }) => assert_eq!(name, "p.CpuPercent"),
            other => panic!("expected NonFiniteValue, got {other:?}"),
        }
    }

    #[test]
    fn test_compression_level_is_clamped() {
        let encoded = PayloadCodec::with_level(42).encode(&batch()).unwrap();
        assert_eq!(decode(&encoded)[0].metrics.len(), 3);
    }
}
