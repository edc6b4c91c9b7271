//! Liveness and readiness state of the poll loop
//!
//! The scheduler reports the outcome of every cycle here; the API layer
//! turns the resulting snapshot into `/healthz` and `/readyz` answers.
//!
//! A component is degraded after a partial or isolated failure and unhealthy
//! once it has stopped doing its job: every sampler failing in one cycle, or
//! delivery failing for several cycles in a row.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stage of the poll loop that reports health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Samplers,
    Delivery,
}

impl Component {
    pub const ALL: [Component; 2] = [Component::Samplers, Component::Delivery];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Samplers => "samplers",
            Component::Delivery => "delivery",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from best to worst, so the overall status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failures reported since the last success
    pub consecutive_failures: u32,
    /// Unix seconds of the last report
    pub updated_at: i64,
}

impl ComponentHealth {
    fn new() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    fn set(&mut self, status: ComponentStatus, message: Option<String>) {
        self.status = status;
        self.message = message;
        self.updated_at = chrono::Utc::now().timestamp();
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct HealthState {
    components: BTreeMap<Component, ComponentHealth>,
    polling: bool,
}

impl HealthState {
    fn overall(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }

    fn entry(&mut self, component: Component) -> &mut ComponentHealth {
        self.components
            .entry(component)
            .or_insert_with(ComponentHealth::new)
    }
}

/// Shared health state; clones observe the same components
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy; the loop is not yet polling
    pub fn new() -> Self {
        let components = Component::ALL
            .iter()
            .map(|c| (*c, ComponentHealth::new()))
            .collect();
        Self {
            state: Arc::new(RwLock::new(HealthState {
                components,
                polling: false,
            })),
        }
    }

    /// The component did its job; clears any failure streak
    pub async fn record_success(&self, component: Component) {
        let mut state = self.state.write().await;
        let health = state.entry(component);
        health.consecutive_failures = 0;
        health.set(ComponentStatus::Healthy, None);
    }

    /// The component partly failed but still produced something
    pub async fn record_degraded(&self, component: Component, message: impl Into<String>) {
        let mut state = self.state.write().await;
        let health = state.entry(component);
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.set(ComponentStatus::Degraded, Some(message.into()));
    }

    /// The component failed outright
    ///
    /// It turns unhealthy once `unhealthy_after` failures have been reported
    /// in a row and stays degraded before that. Returns the new status.
    pub async fn record_failure(
        &self,
        component: Component,
        message: impl Into<String>,
        unhealthy_after: u32,
    ) -> ComponentStatus {
        let mut state = self.state.write().await;
        let health = state.entry(component);
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);

        let status = if health.consecutive_failures >= unhealthy_after.max(1) {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        health.set(status, Some(message.into()));
        status
    }

    /// Called once priming is over and the first cycle is about to run
    pub async fn mark_polling(&self) {
        self.state.write().await.polling = true;
    }

    pub async fn status(&self, component: Component) -> ComponentStatus {
        self.state
            .read()
            .await
            .components
            .get(&component)
            .map(|c| c.status)
            .unwrap_or(ComponentStatus::Healthy)
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.overall(),
            components: state.components.clone(),
        }
    }

    /// Ready while polling and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        if !state.polling {
            return ReadinessResponse {
                ready: false,
                reason: Some("Poll loop has not started".to_string()),
            };
        }

        let unhealthy = state
            .components
            .iter()
            .find(|(_, h)| h.status == ComponentStatus::Unhealthy);
        match unhealthy {
            Some((component, health)) => ReadinessResponse {
                ready: false,
                reason: Some(match &health.message {
                    Some(message) => format!("{} unhealthy: {}", component, message),
                    None => format!("{} unhealthy", component),
                }),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}
