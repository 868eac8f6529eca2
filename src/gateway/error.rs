//! Gateway error taxonomy.
//!
//! A closed set of tagged variants, each carrying a stable code, an HTTP
//! status and a retryable flag. Internal boundaries pass `GatewayError`
//! through `Result`; conversion to the JSON envelope happens only at the
//! axum edge ([`IntoResponse`]).

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::modules::config;

#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Missing/invalid credential at admission
    Auth { message: String },
    /// Missing or expired provider key
    ApiKey { message: String },
    /// Principal may not access the resource
    Authorization { message: String },
    /// Query/body failed schema check
    Validation {
        message: String,
        details: Option<Value>,
    },
    /// Structured payload shape mismatch
    SchemaValidation {
        message: String,
        details: Option<Value>,
    },
    /// Resource missing
    NotFound { message: String },
    /// Bucket exhausted (local) or upstream 429
    RateLimit {
        message: String,
        limit: u64,
        reset: i64,
        retry_after_secs: u64,
    },
    /// Upstream returned an error status or a malformed body
    ExternalApi {
        message: String,
        details: Option<Value>,
    },
    /// Upstream deadline exceeded
    Timeout { message: String },
    /// Dependent component down
    ServiceUnavailable { message: String },
    /// Unclassified failure
    Internal {
        message: String,
        details: Option<Value>,
    },
    /// Invalid point or unknown coordinate system
    Coordinate {
        message: String,
        details: Option<Value>,
    },
    /// Cache operation failed internally
    Cache { message: String },
    /// Startup invariant violated
    Configuration { message: String },
}

impl GatewayError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    pub fn api_key(message: impl Into<String>) -> Self {
        Self::ApiKey { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), details: None }
    }

    pub fn validation_with(message: impl Into<String>, details: Value) -> Self {
        Self::Validation { message: message.into(), details: Some(details) }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalApi { message: message.into(), details: None }
    }

    pub fn external_with(message: impl Into<String>, details: Value) -> Self {
        Self::ExternalApi { message: message.into(), details: Some(details) }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout { message: message.into() }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), details: None }
    }

    pub fn coordinate(message: impl Into<String>) -> Self {
        Self::Coordinate { message: message.into(), details: None }
    }

    pub fn coordinate_with(message: impl Into<String>, details: Value) -> Self {
        Self::Coordinate { message: message.into(), details: Some(details) }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache { message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Stable code for automated handling.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "AUTH_ERROR",
            Self::ApiKey { .. } => "API_KEY_ERROR",
            Self::Authorization { .. } => "AUTHORIZATION_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::RateLimit { .. } => "RATE_LIMIT_EXCEEDED",
            Self::ExternalApi { .. } => "EXTERNAL_API_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
            Self::Coordinate { .. } => "COORDINATE_ERROR",
            Self::Cache { .. } => "CACHE_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth { .. } | Self::ApiKey { .. } => StatusCode::UNAUTHORIZED,
            Self::Authorization { .. } => StatusCode::FORBIDDEN,
            Self::Validation { .. }
            | Self::SchemaValidation { .. }
            | Self::Coordinate { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ExternalApi { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } | Self::Cache { .. } | Self::Configuration { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. }
                | Self::ExternalApi { .. }
                | Self::Timeout { .. }
                | Self::ServiceUnavailable { .. }
        )
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Auth { message }
            | Self::ApiKey { message }
            | Self::Authorization { message }
            | Self::Validation { message, .. }
            | Self::SchemaValidation { message, .. }
            | Self::NotFound { message }
            | Self::RateLimit { message, .. }
            | Self::ExternalApi { message, .. }
            | Self::Timeout { message }
            | Self::ServiceUnavailable { message }
            | Self::Internal { message, .. }
            | Self::Coordinate { message, .. }
            | Self::Cache { message }
            | Self::Configuration { message } => message,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Validation { details, .. }
            | Self::SchemaValidation { details, .. }
            | Self::ExternalApi { details, .. }
            | Self::Internal { details, .. }
            | Self::Coordinate { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Seconds the caller should wait before retrying, present only for
    /// denied admissions.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Wire representation. In production, unclassified failures are
    /// reduced to a generic phrase with no details.
    pub fn to_error_info(&self, production: bool) -> ErrorInfo {
        let mask = production && matches!(self, Self::Internal { .. });
        ErrorInfo {
            code: self.code().to_string(),
            message: if mask {
                "An internal error occurred".to_string()
            } else {
                self.message().to_string()
            },
            details: if mask { None } else { self.details().cloned() },
            retryable: Some(self.retryable()),
        }
    }

    /// Classify a transport-level failure from the upstream client.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout("upstream request timed out")
        } else if err.is_connect() {
            Self::external(format!("upstream connection failed: {}", err))
        } else if err.is_decode() || err.is_body() {
            Self::external(format!("upstream body unreadable: {}", err))
        } else {
            Self::external(format!("upstream request failed: {}", err))
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for GatewayError {}

/// Error body carried inside the response envelope.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = crate::gateway::envelope::ApiEnvelope::<Value>::failure(
            self.to_error_info(config::is_production()),
        );

        let mut response = (status, Json(envelope)).into_response();
        if let Self::RateLimit { limit, reset, retry_after_secs, .. } = &self {
            let headers = response.headers_mut();
            // a zero limit means the denial came from upstream, where the
            // budget is unknown; only Retry-After is meaningful then
            if *limit > 0 {
                if let Ok(v) = limit.to_string().parse() {
                    headers.insert("X-RateLimit-Limit", v);
                }
                if let Ok(v) = "0".parse() {
                    headers.insert("X-RateLimit-Remaining", v);
                }
                if let Ok(v) = reset.to_string().parse() {
                    headers.insert("X-RateLimit-Reset", v);
                }
            }
            if let Ok(v) = retry_after_secs.to_string().parse() {
                headers.insert(header::RETRY_AFTER, v);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_codes_and_statuses() {
        let cases: Vec<(GatewayError, &str, StatusCode, bool)> = vec![
            (GatewayError::auth("x"), "AUTH_ERROR", StatusCode::UNAUTHORIZED, false),
            (GatewayError::api_key("x"), "API_KEY_ERROR", StatusCode::UNAUTHORIZED, false),
            (GatewayError::validation("x"), "VALIDATION_ERROR", StatusCode::BAD_REQUEST, false),
            (GatewayError::not_found("x"), "NOT_FOUND", StatusCode::NOT_FOUND, false),
            (
                GatewayError::RateLimit {
                    message: "x".into(),
                    limit: 100,
                    reset: 0,
                    retry_after_secs: 36,
                },
                "RATE_LIMIT_EXCEEDED",
                StatusCode::TOO_MANY_REQUESTS,
                true,
            ),
            (GatewayError::external("x"), "EXTERNAL_API_ERROR", StatusCode::BAD_GATEWAY, true),
            (GatewayError::timeout("x"), "TIMEOUT_ERROR", StatusCode::GATEWAY_TIMEOUT, true),
            (
                GatewayError::service_unavailable("x"),
                "SERVICE_UNAVAILABLE",
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (GatewayError::internal("x"), "INTERNAL_SERVER_ERROR", StatusCode::INTERNAL_SERVER_ERROR, false),
            (GatewayError::coordinate("x"), "COORDINATE_ERROR", StatusCode::BAD_REQUEST, false),
            (GatewayError::cache("x"), "CACHE_ERROR", StatusCode::INTERNAL_SERVER_ERROR, false),
            (GatewayError::configuration("x"), "CONFIGURATION_ERROR", StatusCode::INTERNAL_SERVER_ERROR, false),
        ];

        for (err, code, status, retryable) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status(), status);
            assert_eq!(err.retryable(), retryable, "retryable mismatch for {}", code);
        }
    }

    #[test]
    fn test_production_masks_internal_details() {
        let err = GatewayError::Internal {
            message: "db handle poisoned".into(),
            details: Some(serde_json::json!({"lock": "cache"})),
        };
        let masked = err.to_error_info(true);
        assert_eq!(masked.message, "An internal error occurred");
        assert!(masked.details.is_none());

        let unmasked = err.to_error_info(false);
        assert_eq!(unmasked.message, "db handle poisoned");
        assert!(unmasked.details.is_some());
    }

    #[test]
    fn test_production_keeps_client_errors() {
        let err = GatewayError::validation("x must be a number");
        let info = err.to_error_info(true);
        assert_eq!(info.message, "x must be a number");
    }

    #[test]
    fn test_retry_after_only_on_rate_limit() {
        let limited = GatewayError::RateLimit {
            message: "x".into(),
            limit: 100,
            reset: 0,
            retry_after_secs: 36,
        };
        assert_eq!(limited.retry_after(), Some(36));
        assert_eq!(GatewayError::timeout("x").retry_after(), None);
    }
}
