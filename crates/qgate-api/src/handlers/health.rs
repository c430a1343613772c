//! Gateway health and metrics handlers
//!
//! These endpoints are served by the gateway itself and never proxied.
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub name: String,
}

/// Liveness probe
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
    })
}

/// Readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub keys_loaded: bool,
    pub key_count: usize,
}

/// Readiness probe - ready once a non-empty key set is published
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let key_count = state.key_count();
    let ready = state.is_ready();

    let response = ReadinessResponse {
        ready,
        checks: ReadinessChecks {
            keys_loaded: key_count > 0,
            key_count,
        },
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// JSON metrics response
#[derive(Serialize)]
pub struct MetricsResponse {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub denied_requests: u64,
    pub requests_per_second: f64,
    pub key_count: usize,
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();
    let rps = if uptime > 0 {
        total_requests as f64 / uptime as f64
    } else {
        0.0
    };

    Json(MetricsResponse {
        uptime_seconds: uptime,
        total_requests,
        allowed_requests: state.get_allowed_count(),
        denied_requests: state.get_denied_count(),
        requests_per_second: rps,
        key_count: state.key_count(),
    })
}
