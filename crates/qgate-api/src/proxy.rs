//! Reverse proxy to the upstream vector database
//!
//! Only requests that passed authorization reach this handler. The
//! request is forwarded as received: method, path, query, body and
//! end-to-end headers.
//!
//! Author: hephaex@gmail.com

use crate::auth::API_KEY_HEADER;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forward an authorized request upstream and relay the response
///
/// The body limit comes from `DefaultBodyLimit` set in `routes::api_routes`.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let body = body.map_err(|rejection| body_error(rejection, state.config.server.max_body_size))?;

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = upstream_url(&state.config.upstream.url, path_and_query);

    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    if let Some(upstream_key) = &state.config.upstream.api_key {
        let value = HeaderValue::from_str(upstream_key)
            .map_err(|_| AppError::Internal("Upstream API key is not a valid header value".into()))?;
        headers.remove(header::AUTHORIZATION);
        headers.insert(API_KEY_HEADER, value);
    }

    debug!(method = %method, url = %url, "Forwarding request upstream");

    let upstream = state
        .upstream
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            warn!(url = %url, error = %e, "Upstream request failed");
            AppError::from(e)
        })?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;

    Ok(response)
}

fn body_error(rejection: BytesRejection, limit: usize) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(limit)
    } else {
        AppError::BadRequest(format!("Failed to read request body: {}", rejection.body_text()))
    }
}

/// Join the configured base URL and the request path
pub fn upstream_url(base: &str, path_and_query: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path_and_query)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
