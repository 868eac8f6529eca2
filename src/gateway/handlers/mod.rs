// Handlers module - API endpoint handlers
// Thin marshalling layer over the core components

pub mod address;
pub mod coordinate;
pub mod health;
pub mod stats;

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;

use crate::gateway::error::GatewayError;
use crate::gateway::rate_limit::RateLimitDecision;

/// Stable identifier for the calling client: first hop of
/// `X-Forwarded-For`, then `X-Real-IP`, then a fixed fallback. The service
/// is expected to sit behind a load balancer that sets these.
pub(crate) fn client_identifier(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    "unknown".to_string()
}

/// Turn a denied admission into the taxonomy error carrying the headers.
pub(crate) fn admission_denied(decision: &RateLimitDecision) -> GatewayError {
    GatewayError::RateLimit {
        message: "rate limit exceeded, try again later".to_string(),
        limit: decision.limit,
        reset: decision.reset,
        retry_after_secs: decision.retry_after.unwrap_or(1),
    }
}

/// Attach `X-RateLimit-*` headers from an allowed decision.
pub(crate) fn apply_rate_limit_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset.to_string()) {
        headers.insert("X-RateLimit-Reset", v);
    }
}

/// `Cache-Control: public, max-age=N` for cacheable responses.
pub(crate) fn apply_cache_control(response: &mut Response, max_age_secs: u64) {
    if let Ok(v) = HeaderValue::from_str(&format!("public, max-age={}", max_age_secs)) {
        response.headers_mut().insert(header::CACHE_CONTROL, v);
    }
}

/// `Cache-Control: no-cache` for responses that are not cached.
pub(crate) fn apply_no_cache(response: &mut Response) {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_identifier_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.1.2.3, 172.16.0.1".parse().unwrap());
        headers.insert("x-real-ip", "192.168.0.9".parse().unwrap());
        assert_eq!(client_identifier(&headers), "10.1.2.3");
    }

    #[test]
    fn test_client_identifier_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "192.168.0.9".parse().unwrap());
        assert_eq!(client_identifier(&headers), "192.168.0.9");
        assert_eq!(client_identifier(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_admission_denied_carries_decision() {
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset: 1_700_000_100,
            limit: 100,
            retry_after: Some(36),
        };
        let err = admission_denied(&decision);
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(err.retry_after(), Some(36));
    }
}
