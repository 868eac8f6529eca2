//! Read-only statistics snapshot across the core components.

use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::gateway::envelope::ApiEnvelope;
use crate::gateway::server::AppState;

pub async fn snapshot(State(state): State<AppState>) -> Response {
    let data = json!({
        "apiKeys": state.keys.stats(),
        "cache": state.cache.detailed_stats(),
        "rateLimiter": state.limiter.stats(),
        "upstream": state.upstream.stats(),
    });

    let mut response = Json(ApiEnvelope::success(data)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    response
}
