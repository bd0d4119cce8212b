//! dcstat-api: HTTP surface over the probe registry.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Plain-text status page, one line per endpoint |
//! | GET | `/api/v1/status` | Snapshot as JSON |
//! | GET | `/status` | Liveness, always 200 |
//! | GET | `/metrics` | Prometheus exposition (see [`metrics_router`]) |

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use dcstat_metrics::MetricsCollector;
use dcstat_probe::Registry;

/// Shared state for API handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub registry: Arc<Registry>,
    pub metrics: MetricsCollector,
    /// Age past which an endpoint is shown as down.
    pub down_after: Duration,
}

impl ApiState {
    pub fn new(registry: Arc<Registry>, down_after: Duration) -> Self {
        Self {
            metrics: MetricsCollector::new(registry.clone(), down_after),
            registry,
            down_after,
        }
    }
}

/// Build the public router (status page + JSON + liveness).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(handlers::status_json))
        .with_state(state.clone());

    Router::new()
        .route("/", get(handlers::status_page))
        .route("/status", get(handlers::liveness))
        .nest("/api/v1", api_routes)
        .with_state(state)
}

/// Router serving only `/metrics`; merge it into [`build_router`] to expose
/// metrics on the public listener.
pub fn metrics_router(state: ApiState) -> Router {
    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
