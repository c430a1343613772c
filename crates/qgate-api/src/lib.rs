//! qgate API - authorization gateway for Qdrant-compatible vector databases
//!
//! Every request outside `/gateway/*` is classified, authorized against the
//! configured API keys and, if allowed, forwarded unchanged upstream.

pub mod auth;
pub mod classify;
pub mod error;
pub mod handlers;
pub mod proxy;
pub mod routes;
pub mod state;

use axum::Router;
use state::AppState;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the gateway router
pub fn create_router(state: Arc<AppState>) -> Router {
    routes::api_routes(state.clone())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
