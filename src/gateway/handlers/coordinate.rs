//! Coordinate transform endpoints.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::gateway::cache::CacheType;
use crate::gateway::coord::{Point, PointInput, SystemCode};
use crate::gateway::envelope::ApiEnvelope;
use crate::gateway::error::GatewayError;
use crate::gateway::handlers::{
    admission_denied, apply_cache_control, apply_no_cache, apply_rate_limit_headers,
    client_identifier,
};
use crate::gateway::rate_limit::Tier;
use crate::gateway::server::AppState;

const MAX_BATCH_POINTS: usize = 100;

/// Query string of `GET /api/coordinate/transform`. Numbers arrive as raw
/// strings so a bad value maps to the validation taxonomy instead of a
/// framework rejection.
#[derive(Debug, Deserialize)]
pub struct TransformQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

fn parse_system(raw: &str) -> Result<SystemCode, GatewayError> {
    SystemCode::parse(raw).ok_or_else(|| {
        GatewayError::coordinate_with(
            format!("unknown coordinate system: {}", raw),
            json!({ "supported": SystemCode::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>() }),
        )
    })
}

fn parse_number(name: &str, raw: Option<String>) -> Result<f64, GatewayError> {
    let raw = raw.ok_or_else(|| GatewayError::validation(format!("{} is required", name)))?;
    raw.parse::<f64>()
        .map_err(|_| GatewayError::validation(format!("{} must be a number, got {:?}", name, raw)))
}

/// GET transform: anonymous tier, cached under the `coordinate` type.
pub async fn transform_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TransformQuery>,
) -> Result<Response, GatewayError> {
    let started = std::time::Instant::now();

    let identifier = client_identifier(&headers);
    let decision = state.limiter.check_limit(&identifier, Tier::Anonymous);
    if !decision.allowed {
        return Err(admission_denied(&decision));
    }

    let from = parse_system(
        query
            .from
            .as_deref()
            .ok_or_else(|| GatewayError::validation("from is required"))?,
    )?;
    let to = match query.to.as_deref() {
        Some(raw) => parse_system(raw)?,
        None => SystemCode::Wgs84,
    };
    let x = parse_number("x", query.x)?;
    let y = parse_number("y", query.y)?;
    let point = Point { x, y };

    let cache_key = format!("{}:{}:{}:{}", from, to, x, y);
    let lookup = state.cache.get(CacheType::Coordinate, &cache_key);
    if let (true, Some(data)) = (lookup.hit, lookup.value) {
        let envelope =
            ApiEnvelope::success_with(data, true, started.elapsed().as_millis() as u64);
        let mut response = Json(envelope).into_response();
        apply_cache_control(&mut response, CacheType::Coordinate.ttl().as_secs());
        apply_rate_limit_headers(&mut response, &decision);
        return Ok(response);
    }

    let transformed = state.engine.transform(point, from, to)?;
    let data = json!({
        "from": from,
        "to": to,
        "original": point,
        "transformed": transformed,
    });
    state
        .cache
        .set(CacheType::Coordinate, &cache_key, data.clone(), None);

    let envelope = ApiEnvelope::success_with(data, false, started.elapsed().as_millis() as u64);
    let mut response = Json(envelope).into_response();
    apply_cache_control(&mut response, CacheType::Coordinate.ttl().as_secs());
    apply_rate_limit_headers(&mut response, &decision);
    Ok(response)
}

/// Body of `POST /api/coordinate/transform`.
#[derive(Debug, Deserialize)]
pub struct TransformBatchRequest {
    pub from: String,
    pub to: Option<String>,
    pub points: Vec<PointInput>,
}

/// POST transform: authenticated tier, 1–100 points per call. The body is
/// parsed by hand so shape mismatches surface as taxonomy errors.
pub async fn transform_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let started = std::time::Instant::now();

    let identifier = client_identifier(&headers);
    let decision = state.limiter.check_limit(&identifier, Tier::Authenticated);
    if !decision.allowed {
        return Err(admission_denied(&decision));
    }

    let request: TransformBatchRequest = serde_json::from_slice(&body).map_err(|e| {
        GatewayError::SchemaValidation {
            message: format!("request body does not match the transform schema: {}", e),
            details: None,
        }
    })?;

    if request.points.is_empty() || request.points.len() > MAX_BATCH_POINTS {
        return Err(GatewayError::validation(format!(
            "points must contain between 1 and {} items, got {}",
            MAX_BATCH_POINTS,
            request.points.len()
        )));
    }

    let from = parse_system(&request.from)?;
    let to = match request.to.as_deref() {
        Some(raw) => parse_system(raw)?,
        None => SystemCode::Wgs84,
    };

    let points: Vec<Point> = request.points.into_iter().map(Point::from).collect();
    let transformed = state.engine.transform_batch(&points, from, to)?;

    let data = json!({
        "from": from,
        "to": to,
        "count": transformed.len(),
        "transformed": transformed,
    });
    let envelope = ApiEnvelope::success_with(data, false, started.elapsed().as_millis() as u64);
    let mut response = Json(envelope).into_response();
    apply_no_cache(&mut response);
    apply_rate_limit_headers(&mut response, &decision);
    Ok(response)
}

/// GET the supported system codes.
pub async fn supported_systems(State(state): State<AppState>) -> Response {
    let data = json!({ "systems": state.engine.supported_systems() });
    let mut response = Json(ApiEnvelope::success(data)).into_response();
    apply_cache_control(&mut response, CacheType::Static.ttl().as_secs());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_system() {
        assert!(parse_system("WGS84").is_ok());
        let err = parse_system("EPSG:4326").unwrap_err();
        assert_eq!(err.code(), "COORDINATE_ERROR");
        assert!(err.details().unwrap()["supported"].is_array());
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        assert_eq!(parse_number("x", Some("126.978".into())).unwrap(), 126.978);
        let err = parse_number("x", Some("abc".into())).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let err = parse_number("y", None).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_batch_request_accepts_both_point_forms() {
        let raw = r#"{
            "from": "GRS80_CENTRAL",
            "to": "WGS84",
            "points": [{"x": 200000, "y": 600000}, {"longitude": 127.0, "latitude": 37.5}]
        }"#;
        let request: TransformBatchRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.points.len(), 2);
        let points: Vec<Point> = request.points.into_iter().map(Point::from).collect();
        assert_eq!(points[1], Point { x: 127.0, y: 37.5 });
    }
}
