//! Route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::authorize_middleware;
use crate::handlers::health;
use crate::proxy::proxy_handler;
use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use std::sync::Arc;

/// Gateway-local routes (no authorization, never proxied)
pub fn gateway_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/gateway/health", get(health::health_check))
        .route("/gateway/ready", get(health::readiness_check))
        .route("/gateway/metrics", get(health::metrics))
}

/// All routes: gateway endpoints, then everything else authorized and
/// forwarded upstream
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // The authorization layer only wraps what exists when it is applied,
    // so gateway routes must be merged afterwards.
    let body_limit = state.config.server.max_body_size;

    Router::new()
        .fallback(proxy_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(state, authorize_middleware))
        .merge(gateway_routes())
}
