//! API-key authorization for proxied requests
//!
//! - Credential and client metadata extraction from headers
//! - Middleware that runs the evaluator before the proxy handler

pub mod extract;
pub mod middleware;

pub use extract::{extract_api_key, extract_ip_address, extract_user_agent, API_KEY_HEADER};
pub use middleware::{access_request, authorize_middleware, AuthorizedKey};
