//! Delivery of metric payloads to the ingestion API
//!
//! This module provides:
//! - HTTP client with a pluggable transport
//! - Bounded retry policy with optional backoff

mod client;
mod retry;


pub use client::{
    delivery_headers, is_success, Delivered, DeliveryClient, DeliveryClientBuilder,
    DeliveryConfig, HttpResponse, HttpTransport, Transport, API_KEY_HEADER,
    DEFAULT_METRIC_API_URL,
};
pub use retry::{Backoff, RetryPolicy};
