//! Projection of registry snapshots into numeric samples.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use dcstat_core::EndpointId;
use dcstat_probe::{Registry, Snapshot};

/// One endpoint's numbers at collection time.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSample {
    pub id: EndpointId,
    /// `f64::INFINITY` for an endpoint that never answered.
    pub seconds_since_last_success: f64,
    /// Round trip of the last successful probe.
    pub latency_seconds: Option<f64>,
    pub up: bool,
}

/// Computes samples from the registry on every call.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    down_after: Duration,
}

impl MetricsCollector {
    /// `down_after` is the age past which an endpoint counts as down.
    pub fn new(registry: Arc<Registry>, down_after: Duration) -> Self {
        Self {
            registry,
            down_after,
        }
    }

    /// Samples for every started endpoint, sorted by id.
    pub fn collect(&self) -> Vec<EndpointSample> {
        let samples = samples(&self.registry.snapshot(), self.down_after);
        trace!(endpoints = samples.len(), "metrics collected");
        samples
    }
}

/// Project a snapshot, measuring every age against `snapshot.taken_at`.
pub fn samples(snapshot: &Snapshot, down_after: Duration) -> Vec<EndpointSample> {
    let now = snapshot.taken_at;
    snapshot
        .iter()
        .map(|status| EndpointSample {
            id: status.id,
            seconds_since_last_success: status
                .since_last_success(now)
                .map_or(f64::INFINITY, |age| age.as_secs_f64()),
            latency_seconds: status.latency.map(|l| l.as_secs_f64()),
            up: status.is_up(now, down_after),
        })
        .collect()
}
