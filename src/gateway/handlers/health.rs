//! Health probe endpoint.
//!
//! Aggregates component status: down wins over degraded wins over healthy.
//! The degraded thresholds are policy numbers, not invariants.

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::gateway::envelope::ApiEnvelope;
use crate::gateway::server::AppState;

/// Policy thresholds for the degraded bands.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Cache memory percentage above which the cache is degraded.
    pub memory_pct: f64,
    /// Block rate above which the limiter is degraded.
    pub block_rate_pct: f64,
    /// Success rate below which the upstream client is degraded.
    pub success_rate_pct: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            memory_pct: 90.0,
            block_rate_pct: 50.0,
            success_rate_pct: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Down,
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    pub detailed: Option<String>,
}

pub async fn health(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> Response {
    let thresholds = state.thresholds;

    let key_stats = state.keys.stats();
    let keys_status = if key_stats.active_keys == 0 {
        ComponentStatus::Down
    } else if key_stats.expiring_soon > 0 {
        ComponentStatus::Degraded
    } else {
        ComponentStatus::Healthy
    };

    let limiter_stats = state.limiter.stats();
    let limiter_status = if limiter_stats.block_rate > thresholds.block_rate_pct {
        ComponentStatus::Degraded
    } else {
        ComponentStatus::Healthy
    };

    let memory = state.cache.memory_usage();
    let cache_status = if memory.percentage > thresholds.memory_pct {
        ComponentStatus::Degraded
    } else {
        ComponentStatus::Healthy
    };

    let client_stats = state.upstream.stats();
    let client_status = if client_stats.total_requests > 0
        && client_stats.success_rate < thresholds.success_rate_pct
    {
        ComponentStatus::Degraded
    } else {
        ComponentStatus::Healthy
    };

    let components = [keys_status, limiter_status, cache_status, client_status];
    let overall = overall_status(&components);

    let detailed = matches!(query.detailed.as_deref(), Some("true"));
    let data = if detailed {
        json!({
            "status": overall,
            "components": {
                "apiKeys": { "status": keys_status, "stats": key_stats },
                "rateLimiter": { "status": limiter_status, "stats": limiter_stats },
                "cache": { "status": cache_status, "memory": memory, "stats": state.cache.stats() },
                "upstream": { "status": client_status, "stats": client_stats },
            },
        })
    } else {
        json!({
            "status": overall,
            "components": {
                "apiKeys": keys_status,
                "rateLimiter": limiter_status,
                "cache": cache_status,
                "upstream": client_status,
            },
        })
    };

    let status_code = if overall == ComponentStatus::Down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let mut response = (status_code, Json(ApiEnvelope::success(data))).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    response
}

fn overall_status(components: &[ComponentStatus]) -> ComponentStatus {
    if components.iter().any(|s| *s == ComponentStatus::Down) {
        ComponentStatus::Down
    } else if components.iter().any(|s| *s == ComponentStatus::Degraded) {
        ComponentStatus::Degraded
    } else {
        ComponentStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_down_wins() {
        assert_eq!(
            overall_status(&[
                ComponentStatus::Healthy,
                ComponentStatus::Degraded,
                ComponentStatus::Down
            ]),
            ComponentStatus::Down
        );
    }

    #[test]
    fn test_overall_degraded_over_healthy() {
        assert_eq!(
            overall_status(&[ComponentStatus::Healthy, ComponentStatus::Degraded]),
            ComponentStatus::Degraded
        );
        assert_eq!(
            overall_status(&[ComponentStatus::Healthy, ComponentStatus::Healthy]),
            ComponentStatus::Healthy
        );
    }

    #[test]
    fn test_default_thresholds() {
        let t = HealthThresholds::default();
        assert_eq!(t.memory_pct, 90.0);
        assert_eq!(t.block_rate_pct, 50.0);
        assert_eq!(t.success_rate_pct, 70.0);
    }
}
