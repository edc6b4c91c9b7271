//! infra-lite - lightweight host metrics agent
//!
//! Samples CPU, memory, network and disk statistics on a fixed interval
//! and ships them to the New Relic Metric API as gzip-compressed JSON.

use agent_lib::{
    api::{self, AppState},
    collector::{default_samplers, PollSchedulerBuilder},
    health::HealthRegistry,
    observability::{AgentMetrics, StructuredLogger},
    payload::MetricBuilder,
    sync::DeliveryClientBuilder,
    Identity,
};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use sysinfo::System;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::{AgentConfig, LogTarget};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config = AgentConfig::load()?;
    init_tracing(&config)?;

    let hostname = System::host_name().context("Failed to resolve hostname")?;
    info!(
        service = %config.service,
        workload = %config.workload,
        hostname = %hostname,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        endpoint = %config.endpoint,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&hostname);
    logger.log_startup(
        AGENT_VERSION,
        &config.service,
        &config.workload,
        config.poll_interval,
    );

    let delivery = DeliveryClientBuilder::new()
        .endpoint(config.endpoint.as_str())
        .license_key(&config.license_key)
        .request_timeout(config.request_timeout)
        .build()?;

    let scheduler = PollSchedulerBuilder::new()
        .samplers(default_samplers())
        .metric_builder(MetricBuilder::new(
            &config.metric_prefix,
            Identity::new(&config.workload, &config.service, &hostname),
        ))
        .delivery(delivery)
        .interval(config.poll_interval)
        .metrics(metrics.clone())
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    let shutdown = CancellationToken::new();

    // Health and metrics server, only when a port is configured
    let api_handle = config.api_port.map(|port| {
        let state = Arc::new(AppState::new(health_registry.clone(), metrics.clone()));
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state, token).await {
                error!(error = %e, "API server failed");
            }
        })
    });

    let poll_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let reason = shutdown_signal().await?;
    logger.log_shutdown(reason);
    shutdown.cancel();

    if let Err(e) = poll_handle.await {
        error!(error = %e, "Poll loop task failed");
    }
    if let Some(handle) = api_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "API server task failed");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// JSON logs to the configured file (append) or stdout
fn init_tracing(config: &AgentConfig) -> Result<()> {
    let default_level = if config.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match &config.log_target {
        LogTarget::Stdout => registry.with(fmt::layer().json()).init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(fmt::layer().json().with_writer(Mutex::new(file)))
                .init();
        }
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM and name the one that arrived
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for SIGINT")?;
                Ok("SIGINT received")
            }
            _ = terminate.recv() => Ok("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for SIGINT")?;
        Ok("SIGINT received")
    }
}
