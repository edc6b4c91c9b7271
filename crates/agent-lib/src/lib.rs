//! Agent library for host infrastructure metrics
//!
//! This crate provides the core functionality for:
//! - Sampling CPU, memory, network and disk statistics
//! - Building and gzip-encoding metric payloads
//! - Delivering payloads with bounded retries
//! - Health checks and observability

pub mod api;
pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod payload;
pub mod sync;

pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
