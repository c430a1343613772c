//! Credential and client metadata extraction from request headers
//!
//! Author: hephaex@gmail.com

use axum::http::{header, HeaderMap};
use qgate_core::RequestOrigin;

/// Header used by Qdrant clients to send the API key
pub const API_KEY_HEADER: &str = "api-key";

/// Extract the presented API key.
///
/// Checks the `api-key` header first, then `Authorization: Bearer <key>`.
/// Values that are not valid UTF-8 count as absent.
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(API_KEY_HEADER) {
        if let Ok(key) = value.to_str() {
            return Some(key.trim().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|key| key.trim().to_string())
}

/// Extract client IP address
///
/// Checks X-Forwarded-For, then X-Real-IP.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    // First entry of X-Forwarded-For is the client
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|xff| xff.to_str().ok())
        .and_then(|xff| xff.split(',').next())
    {
        return Some(first_ip.trim().to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|ip| ip.to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

/// Audit context for a request
pub fn request_origin(headers: &HeaderMap) -> RequestOrigin {
    RequestOrigin {
        ip_address: extract_ip_address(headers),
        user_agent: extract_user_agent(headers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "my-secure-admin-key-123".parse().unwrap());

        assert_eq!(
            extract_api_key(&headers),
            Some("my-secure-admin-key-123".to_string())
        );
    }

    #[test]
    fn test_bearer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer ro-key".parse().unwrap());

        assert_eq!(extract_api_key(&headers), Some("ro-key".to_string()));
    }

    #[test]
    fn test_api_key_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "from-header".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer from-bearer".parse().unwrap());

        assert_eq!(extract_api_key(&headers), Some("from-header".to_string()));
    }

    #[test]
    fn test_non_bearer_authorization_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());

        assert_eq!(extract_api_key(&headers), None);
    }

    #[test]
    fn test_non_utf8_key_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );

        assert_eq!(extract_api_key(&headers), None);
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.7".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_request_origin_empty() {
        let origin = request_origin(&HeaderMap::new());
        assert_eq!(origin, RequestOrigin::default());
    }
}
