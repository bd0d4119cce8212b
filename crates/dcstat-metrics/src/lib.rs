//! dcstat-metrics: pull-based metrics over the probe registry.
//!
//! Nothing is stored here. Every scrape takes a fresh registry snapshot
//! and projects it into per-endpoint samples.
//!
//! # Architecture
//!
//! ```text
//! MetricsCollector
//!   └── collect() ← Registry::snapshot()
//!         └── EndpointSample { seconds since last success, latency, up }
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{EndpointSample, MetricsCollector};
pub use prometheus::render_prometheus;
