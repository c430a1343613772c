/// Authorization middleware for proxied routes
///
/// Classifies the request, asks the evaluator for a decision and either
/// rejects the request or lets it continue to the proxy handler with the
/// matched key attached as a request extension.
use super::extract::{extract_api_key, request_origin};
use crate::classify::classify;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use qgate_core::{AccessRequest, KeyIdentity};
use std::sync::Arc;
use tracing::debug;

/// Key that passed authorization, available to handlers via
/// `Extension<AuthorizedKey>`
#[derive(Debug, Clone)]
pub struct AuthorizedKey(pub KeyIdentity);

/// Build the evaluator input for an HTTP request
pub fn access_request(request: &Request) -> AccessRequest {
    let classification = classify(request.method(), request.uri().path());

    AccessRequest {
        key: extract_api_key(request.headers()),
        operation: classification.operation,
        collection: classification.collection,
        origin: request_origin(request.headers()),
    }
}

/// Authorization middleware
///
/// # Usage
///
/// ```ignore
/// use axum::{Router, middleware};
/// use qgate_api::auth::authorize_middleware;
///
/// let app = Router::new()
///     .fallback(proxy_handler)
///     .layer(middleware::from_fn_with_state(state.clone(), authorize_middleware))
///     .with_state(state);
/// ```
pub async fn authorize_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    state.increment_requests();

    let access = access_request(&request);
    let verdict = state.evaluator.authorize(&access);
    state.record_decision(verdict.decision);

    if let Some(reason) = verdict.decision.deny_reason() {
        return Err(AppError::Denied(reason));
    }

    if let Some(key) = verdict.key {
        debug!(
            key_id = %key.key_id,
            key_name = ?key.name,
            method = %request.method(),
            path = %request.uri().path(),
            "Request authorized"
        );
        request.extensions_mut().insert(AuthorizedKey(key));
    }

    Ok(next.run(request).await)
}
