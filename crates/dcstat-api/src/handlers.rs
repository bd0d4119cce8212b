//! HTTP handlers.
//!
//! Every handler takes a fresh registry snapshot; nothing is cached
//! between requests.

use std::fmt::Write;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use dcstat_probe::{EndpointStatus, Snapshot};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// One endpoint in `/api/v1/status`.
#[derive(Debug, Serialize, PartialEq)]
pub struct StatusEntry {
    pub id: i32,
    pub address: String,
    pub connected_address: Option<String>,
    pub up: bool,
    /// `null` when the endpoint never answered.
    pub seconds_since_last_success: Option<f64>,
    pub latency_ms: Option<u64>,
}

impl StatusEntry {
    fn from_status(status: &EndpointStatus, snapshot: &Snapshot, down_after: Duration) -> Self {
        Self {
            id: status.id,
            address: status.address.to_string(),
            connected_address: status.current_address.as_ref().map(ToString::to_string),
            up: status.is_up(snapshot.taken_at, down_after),
            seconds_since_last_success: status
                .since_last_success(snapshot.taken_at)
                .map(|age| age.as_secs_f64()),
            latency_ms: status.latency.map(|l| l.as_millis() as u64),
        }
    }
}

/// GET /
pub async fn status_page(State(state): State<ApiState>) -> impl IntoResponse {
    let body = render_status_page(&state.registry.snapshot(), state.down_after);
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        body,
    )
}

/// GET /api/v1/status
pub async fn status_json(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let entries: Vec<StatusEntry> = snapshot
        .iter()
        .map(|status| StatusEntry::from_status(status, &snapshot, state.down_after))
        .collect();
    ApiResponse::ok(entries)
}

/// GET /status
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = dcstat_metrics::render_prometheus(&state.metrics.collect());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Render the plain-text status page.
///
/// ```text
/// DC 01: UP (lag     12ms) 10.0.0.1:443
/// DC 02: DOWN (     42s ago) 10.0.0.2:443
/// DC 03: DOWN (long time ago) 10.0.0.3:443
/// ```
pub fn render_status_page(snapshot: &Snapshot, down_after: Duration) -> String {
    if snapshot.is_empty() {
        return "No stats available\n".to_string();
    }

    let now = snapshot.taken_at;
    let mut out = String::new();
    for status in snapshot.iter() {
        if status.is_up(now, down_after) {
            let lag = status
                .latency
                .map_or_else(|| "-".to_string(), |l| format!("{}ms", l.as_millis()));
            let _ = writeln!(out, "DC {:02}: UP (lag {:>8}) {}", status.id, lag, status.address);
        } else {
            let ago = status
                .since_last_success(now)
                .map_or_else(|| "long time".to_string(), format_age);
            let _ = writeln!(out, "DC {:02}: DOWN ({:>8} ago) {}", status.id, ago, status.address);
        }
    }
    out
}

/// `42s`, `1m30s`, `2h5m0s`.
fn format_age(age: Duration) -> String {
    let secs = age.as_secs() + u64::from(age.subsec_millis() >= 500);
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m{s}s"),
        _ => format!("{h}h{m}m{s}s"),
    }
}
