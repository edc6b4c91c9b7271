//! Observability infrastructure for the agent itself
//!
//! Provides:
//! - Prometheus metrics (cycle duration, sampler errors, delivery outcomes, payload size)
//! - Structured JSON logging with tracing

use crate::error::{DeliveryError, EncodeError, SamplerError};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info, warn};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles: IntCounter,
    sampler_errors: IntCounterVec,
    encode_failures: IntCounter,
    delivery_attempts: IntCounter,
    deliveries: IntCounter,
    delivery_failures: IntCounter,
    batch_records: IntGauge,
    payload_size_bytes: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "infra_lite_cycle_duration_seconds",
                "Time spent sampling, encoding and delivering one cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles: register_int_counter!(
                "infra_lite_cycles_total",
                "Total number of completed poll cycles"
            )
            .expect("Failed to register cycles_total"),

            sampler_errors: register_int_counter_vec!(
                "infra_lite_sampler_errors_total",
                "Total number of failed sampler invocations",
                &["group"]
            )
            .expect("Failed to register sampler_errors_total"),

            encode_failures: register_int_counter!(
                "infra_lite_encode_failures_total",
                "Total number of batches that could not be encoded"
            )
            .expect("Failed to register encode_failures_total"),

            delivery_attempts: register_int_counter!(
                "infra_lite_delivery_attempts_total",
                "Total number of HTTP requests sent to the ingestion endpoint"
            )
            .expect("Failed to register delivery_attempts_total"),

            deliveries: register_int_counter!(
                "infra_lite_deliveries_total",
                "Total number of payloads accepted by the ingestion endpoint"
            )
            .expect("Failed to register deliveries_total"),

            delivery_failures: register_int_counter!(
                "infra_lite_delivery_failures_total",
                "Total number of payloads dropped after exhausting retries"
            )
            .expect("Failed to register delivery_failures_total"),

            batch_records: register_int_gauge!(
                "infra_lite_batch_records",
                "Number of metric records in the last batch"
            )
            .expect("Failed to register batch_records"),

            payload_size_bytes: register_int_gauge!(
                "infra_lite_payload_size_bytes",
                "Compressed size of the last encoded payload"
            )
            .expect("Failed to register payload_size_bytes"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    /// Record one finished cycle
    pub fn observe_cycle(&self, elapsed: Duration) {
        self.inner()
            .cycle_duration_seconds
            .observe(elapsed.as_secs_f64());
        self.inner().cycles.inc();
    }

    pub fn inc_sampler_errors(&self, group: &str) {
        self.inner()
            .sampler_errors
            .with_label_values(&[group])
            .inc();
    }

    pub fn inc_encode_failures(&self) {
        self.inner().encode_failures.inc();
    }

    pub fn add_delivery_attempts(&self, attempts: u32) {
        self.inner().delivery_attempts.inc_by(u64::from(attempts));
    }

    pub fn inc_deliveries(&self) {
        self.inner().deliveries.inc();
    }

    pub fn inc_delivery_failures(&self) {
        self.inner().delivery_failures.inc();
    }

    /// Update size of the last batch and its encoded payload
    pub fn set_batch_size(&self, records: usize, payload_bytes: usize) {
        self.inner().batch_records.set(records as i64);
        self.inner().payload_size_bytes.set(payload_bytes as i64);
    }
}

/// Structured logger for agent events
///
/// Every event carries the reporting hostname so log lines from a fleet
/// can be told apart after aggregation.
#[derive(Clone)]
pub struct StructuredLogger {
    hostname: String,
}

impl StructuredLogger {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, service: &str, workload: &str, interval: Duration) {
        info!(
            event = "agent_started",
            hostname = %self.hostname,
            agent_version = %version,
            service = %service,
            workload = %workload,
            poll_interval_secs = interval.as_secs_f64(),
            "Infrastructure agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            hostname = %self.hostname,
            reason = %reason,
            "Infrastructure agent shutting down"
        );
    }

    pub fn log_sampler_error(&self, group: &str, err: &SamplerError) {
        warn!(
            event = "sampler_failed",
            hostname = %self.hostname,
            group = %group,
            error = %err,
            "Sampler failed, omitting its metrics from this cycle"
        );
    }

    pub fn log_encode_error(&self, records: usize, err: &EncodeError) {
        error!(
            event = "encode_failed",
            hostname = %self.hostname,
            records = records,
            error = %err,
            "Failed to encode metric batch, skipping delivery"
        );
    }

    /// Log a payload accepted by the endpoint
    pub fn log_delivery(&self, status: u16, attempts: u32, body: &[u8]) {
        info!(
            event = "delivery_succeeded",
            hostname = %self.hostname,
            status = status,
            attempts = attempts,
            response = %String::from_utf8_lossy(body),
            "Metrics delivered"
        );
    }

    /// Log a payload dropped after all retries
    pub fn log_delivery_failure(&self, err: &DeliveryError) {
        error!(
            event = "delivery_failed",
            hostname = %self.hostname,
            status = ?err.status(),
            attempts = err.attempts(),
            response = %String::from_utf8_lossy(err.body()),
            error = %err,
            "Failed to deliver metrics, dropping payload"
        );
    }

    /// Log the outcome of one poll cycle
    pub fn log_cycle(&self, records: usize, failed_samplers: usize, elapsed: Duration) {
        info!(
            event = "cycle_complete",
            hostname = %self.hostname,
            records = records,
            failed_samplers = failed_samplers,
            elapsed_ms = elapsed.as_millis() as u64,
            "Poll cycle complete"
        );
    }
}
