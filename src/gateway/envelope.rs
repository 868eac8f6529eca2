//! Uniform JSON response container.
//!
//! Every endpoint emits an `ApiEnvelope`: exactly one of `data` / `error`
//! is non-null and `success` agrees with `data`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::gateway::error::ErrorInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorInfo>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
}

impl Metadata {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            cached: None,
            processing_time: None,
        }
    }
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: Metadata::now(),
        }
    }

    pub fn success_with(data: T, cached: bool, processing_time_ms: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: Metadata {
                timestamp: Utc::now().to_rfc3339(),
                cached: Some(cached),
                processing_time: Some(processing_time_ms),
            },
        }
    }

    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata: Metadata::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_shape() {
        let env = ApiEnvelope::success_with(serde_json::json!({"n": 1}), false, 3);
        assert!(env.success);
        assert!(env.data.is_some());
        assert!(env.error.is_none());
        assert_eq!(env.metadata.cached, Some(false));
        assert_eq!(env.metadata.processing_time, Some(3));
    }

    #[test]
    fn test_failure_shape() {
        let env = ApiEnvelope::<serde_json::Value>::failure(ErrorInfo {
            code: "NOT_FOUND".into(),
            message: "missing".into(),
            details: None,
            retryable: Some(false),
        });
        assert!(!env.success);
        assert!(env.data.is_none());
        let error = env.error.expect("error body");
        assert_eq!(error.code, "NOT_FOUND");
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let env = ApiEnvelope::success_with(1u32, true, 12);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["metadata"]["cached"], true);
        assert_eq!(json["metadata"]["processingTime"], 12);
        // absent fields are omitted, not null
        let plain = serde_json::to_value(ApiEnvelope::success(1u32)).unwrap();
        assert!(plain["metadata"].get("cached").is_none());
    }
}
