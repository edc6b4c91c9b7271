//! Poll loop
//!
//! Runs one sample -> build -> encode -> deliver cycle per interval. Cycles
//! never overlap: the loop sleeps whatever is left of the interval after a
//! cycle and starts the next one straight away when a cycle overruns.

use super::{MetricGroup, Sampler};
use crate::health::{Component, ComponentStatus, HealthRegistry};
use crate::models::MetricBatch;
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::payload::{MetricBuilder, PayloadCodec};
use crate::sync::DeliveryClient;
use anyhow::Result;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between cycle starts (default: 30 seconds)
    pub interval: Duration,
    /// Pause between priming the samplers and the first cycle (default: 1 second)
    pub priming_pause: Duration,
    /// Consecutive failed deliveries before delivery is reported unhealthy (default: 3)
    pub unhealthy_after: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            priming_pause: Duration::from_secs(1),
            unhealthy_after: 3,
        }
    }
}

/// Time left to sleep after a cycle, or `None` when the cycle used it all
pub fn cycle_remainder(interval: Duration, elapsed: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// What happened to the batch at the end of a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Nothing was sent: the batch was empty or failed to encode
    #[default]
    NotAttempted,
    Delivered { status: u16, attempts: u32 },
    Failed { status: Option<u16>, attempts: u32 },
}

/// Summary of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Unix timestamp (seconds) stamped on every record
    pub timestamp: i64,
    pub records: usize,
    pub failed_groups: Vec<MetricGroup>,
    /// Compressed payload size, when encoding succeeded
    pub payload_bytes: Option<usize>,
    pub delivery: DeliveryOutcome,
    pub elapsed: Duration,
}

/// Periodically samples the host and ships the batch
pub struct PollScheduler {
    samplers: Vec<Box<dyn Sampler>>,
    builder: MetricBuilder,
    codec: PayloadCodec,
    delivery: DeliveryClient,
    config: PollConfig,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl PollScheduler {
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            samplers = self.samplers.len(),
            "Starting poll loop"
        );

        let unprimed = self.prime().await;
        if let Some(health) = &self.health {
            self.report_group_health(health, "priming failed", &unprimed).await;
            health.mark_polling().await;
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutting down poll loop before first cycle");
                return;
            }
            _ = sleep(self.config.priming_pause) => {}
        }

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let start = Instant::now();
            let report = self.run_cycle().await;
            let elapsed = start.elapsed();

            match cycle_remainder(self.config.interval, elapsed) {
                Some(remainder) => {
                    debug!(
                        sleep_ms = remainder.as_millis() as u64,
                        records = report.records,
                        "Sleeping until next cycle"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(remainder) => {}
                    }
                }
                None => {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        interval_ms = self.config.interval.as_millis() as u64,
                        "Cycle overran the poll interval, starting next cycle immediately"
                    );
                }
            }
        }

        info!("Shutting down poll loop");
    }

    /// Take baseline snapshots for samplers that compute deltas
    ///
    /// Returns the groups that could not be primed; they get another chance
    /// on their first sample.
    pub async fn prime(&mut self) -> Vec<MetricGroup> {
        let mut failed = Vec::new();
        for sampler in self.samplers.iter_mut() {
            let group = sampler.group();
            if let Err(e) = sampler.prime().await {
                warn!(group = %group, error = %e, "Failed to prime sampler");
                failed.push(group);
            }
        }
        failed
    }

    /// Run one cycle; errors are logged and counted, never returned
    pub async fn run_cycle(&mut self) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport {
            timestamp: chrono::Utc::now().timestamp(),
            ..CycleReport::default()
        };

        let mut batch = MetricBatch::new();
        for sampler in self.samplers.iter_mut() {
            let group = sampler.group();
            match sampler.sample().await {
                Ok(samples) => batch.extend(
                    samples
                        .iter()
                        .map(|s| self.builder.from_sample(s, report.timestamp)),
                ),
                Err(e) => {
                    self.logger.log_sampler_error(group.as_str(), &e);
                    self.metrics.inc_sampler_errors(group.as_str());
                    report.failed_groups.push(group);
                }
            }
        }
        report.records = batch.len();
        if let Some(health) = &self.health {
            self.report_group_health(health, "samplers failed", &report.failed_groups).await;
        }

        if batch.is_empty() {
            warn!("No metrics collected this cycle, skipping delivery");
        } else {
            match self.codec.encode(&batch) {
                Ok(payload) if payload.is_empty() => {
                    warn!("Encoder produced an empty payload, skipping delivery");
                }
                Ok(payload) => {
                    report.payload_bytes = Some(payload.len());
                    self.metrics.set_batch_size(batch.len(), payload.len());
                    report.delivery = self.deliver(&payload).await;
                }
                Err(e) => {
                    self.logger.log_encode_error(batch.len(), &e);
                    self.metrics.inc_encode_failures();
                }
            }
        }

        report.elapsed = start.elapsed();
        self.metrics.observe_cycle(report.elapsed);
        self.logger
            .log_cycle(report.records, report.failed_groups.len(), report.elapsed);
        report
    }

    async fn deliver(&self, payload: &[u8]) -> DeliveryOutcome {
        match self.delivery.post(payload).await {
            Ok(delivered) => {
                self.metrics.add_delivery_attempts(delivered.attempts);
                self.metrics.inc_deliveries();
                self.logger
                    .log_delivery(delivered.status, delivered.attempts, &delivered.body);
                if let Some(health) = &self.health {
                    health.record_success(Component::Delivery).await;
                }
                DeliveryOutcome::Delivered {
                    status: delivered.status,
                    attempts: delivered.attempts,
                }
            }
            Err(e) => {
                self.metrics.add_delivery_attempts(e.attempts());
                self.metrics.inc_delivery_failures();
                self.logger.log_delivery_failure(&e);
                if let Some(health) = &self.health {
                    let status = health
                        .record_failure(
                            Component::Delivery,
                            e.to_string(),
                            self.config.unhealthy_after,
                        )
                        .await;
                    if status == ComponentStatus::Unhealthy {
                        warn!(
                            failures = self.config.unhealthy_after,
                            "Delivery keeps failing, reporting unhealthy"
                        );
                    }
                }
                DeliveryOutcome::Failed {
                    status: e.status(),
                    attempts: e.attempts(),
                }
            }
        }
    }

    /// Healthy when no group failed, unhealthy when all of them did
    async fn report_group_health(
        &self,
        health: &HealthRegistry,
        what: &str,
        failed: &[MetricGroup],
    ) {
        if failed.is_empty() {
            health.record_success(Component::Samplers).await;
            return;
        }

        let groups: Vec<&str> = failed.iter().map(|g| g.as_str()).collect();
        let message = format!("{}: {}", what, groups.join(", "));
        if failed.len() >= self.samplers.len() {
            health.record_failure(Component::Samplers, message, 1).await;
        } else {
            health.record_degraded(Component::Samplers, message).await;
        }
    }
}

/// Builder for the poll loop
pub struct PollSchedulerBuilder {
    samplers: Vec<Box<dyn Sampler>>,
    builder: Option<MetricBuilder>,
    codec: PayloadCodec,
    delivery: Option<DeliveryClient>,
    config: PollConfig,
    metrics: Option<AgentMetrics>,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl PollSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            samplers: Vec::new(),
            builder: None,
            codec: PayloadCodec::default(),
            delivery: None,
            config: PollConfig::default(),
            metrics: None,
            logger: None,
            health: None,
        }
    }

    /// Append a sampler; samplers run in the order they were added
    pub fn sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.samplers.push(sampler);
        self
    }

    pub fn samplers(mut self, samplers: Vec<Box<dyn Sampler>>) -> Self {
        self.samplers.extend(samplers);
        self
    }

    pub fn metric_builder(mut self, builder: MetricBuilder) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn delivery(mut self, client: DeliveryClient) -> Self {
        self.delivery = Some(client);
        self
    }

    /// Set the poll interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn priming_pause(mut self, pause: Duration) -> Self {
        self.config.priming_pause = pause;
        self
    }

    /// Consecutive failed deliveries before delivery is reported unhealthy
    pub fn unhealthy_after(mut self, failures: u32) -> Self {
        self.config.unhealthy_after = failures;
        self
    }

    pub fn metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the poll loop
    pub fn build(self) -> Result<PollScheduler> {
        let builder = self
            .builder
            .ok_or_else(|| anyhow::anyhow!("Metric builder is required"))?;
        let delivery = self
            .delivery
            .ok_or_else(|| anyhow::anyhow!("Delivery client is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Poll interval must be positive");
        }

        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new(builder.identity().hostname.clone()));

        Ok(PollScheduler {
            samplers: self.samplers,
            builder,
            codec: self.codec,
            delivery,
            config: self.config,
            metrics: self.metrics.unwrap_or_default(),
            logger,
            health: self.health,
        })
    }
}

impl Default for PollSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
