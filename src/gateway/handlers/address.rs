//! Address search endpoint.
//!
//! Proxies the portal's road-address search, normalizes the dynamic
//! upstream payload into typed records at this boundary, and optionally
//! converts entrance coordinates into a requested system.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::gateway::cache::CacheType;
use crate::gateway::coord::{CoordEngine, Point, SystemCode};
use crate::gateway::envelope::ApiEnvelope;
use crate::gateway::error::GatewayError;
use crate::gateway::handlers::{
    admission_denied, apply_cache_control, apply_rate_limit_headers, client_identifier,
};
use crate::gateway::rate_limit::Tier;
use crate::gateway::server::AppState;

const ADDRESS_ENDPOINT: &str = "/addrlink/addrLinkApi";
/// Entrance coordinates from the portal arrive in the unified grid.
const PORTAL_COORD_SYSTEM: SystemCode = SystemCode::UtmK;

const MIN_KEYWORD_CHARS: usize = 2;
const MAX_ROWS: u64 = 100;
const DEFAULT_ROWS: u64 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressQuery {
    pub keyword: Option<String>,
    pub page_no: Option<String>,
    pub num_of_rows: Option<String>,
    pub convert_coordinate: Option<String>,
    pub target_system: Option<String>,
}

// Upstream wire shapes; everything beyond these fields is ignored.

#[derive(Debug, Deserialize)]
struct UpstreamAddressBody {
    results: UpstreamAddressResults,
}

#[derive(Debug, Deserialize)]
struct UpstreamAddressResults {
    common: UpstreamAddressCommon,
    #[serde(default)]
    juso: Option<Vec<UpstreamAddressItem>>,
}

#[derive(Debug, Deserialize)]
struct UpstreamAddressCommon {
    #[serde(rename = "errorCode")]
    error_code: String,
    #[serde(rename = "errorMessage", default)]
    error_message: String,
    #[serde(rename = "totalCount", default)]
    total_count: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamAddressItem {
    #[serde(rename = "roadAddr", default)]
    road_addr: String,
    #[serde(rename = "jibunAddr", default)]
    jibun_addr: String,
    #[serde(rename = "zipNo", default)]
    zip_no: String,
    #[serde(rename = "bdNm", default)]
    building_name: String,
    #[serde(rename = "entX", default)]
    ent_x: Option<String>,
    #[serde(rename = "entY", default)]
    ent_y: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddressResult {
    road_address: String,
    jibun_address: String,
    zip_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    building_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coordinate_system: Option<SystemCode>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    current_page: u64,
    per_page: u64,
    total_count: u64,
    total_pages: u64,
}

pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AddressQuery>,
) -> Result<Response, GatewayError> {
    let started = std::time::Instant::now();

    let identifier = client_identifier(&headers);
    let decision = state.limiter.check_limit(&identifier, Tier::Anonymous);
    if !decision.allowed {
        return Err(admission_denied(&decision));
    }

    let keyword = query
        .keyword
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if keyword.chars().count() < MIN_KEYWORD_CHARS {
        return Err(GatewayError::validation(format!(
            "keyword must be at least {} characters",
            MIN_KEYWORD_CHARS
        )));
    }

    let page_no = parse_bounded("pageNo", query.page_no.as_deref(), 1, u64::MAX, 1)?;
    let num_of_rows = parse_bounded("numOfRows", query.num_of_rows.as_deref(), 1, MAX_ROWS, DEFAULT_ROWS)?;

    let convert = matches!(query.convert_coordinate.as_deref(), Some("true") | Some("1"));
    let target_system = match query.target_system.as_deref() {
        Some(raw) => SystemCode::parse(raw).ok_or_else(|| {
            GatewayError::validation(format!("unknown target system: {}", raw))
        })?,
        None => SystemCode::Wgs84,
    };

    let params = vec![
        ("keyword".to_string(), keyword.clone()),
        ("currentPage".to_string(), page_no.to_string()),
        ("countPerPage".to_string(), num_of_rows.to_string()),
        ("resultType".to_string(), "json".to_string()),
    ];

    let upstream_envelope = state
        .upstream
        .get_cached(CacheType::Address, ADDRESS_ENDPOINT, &params)
        .await?;
    let cached = upstream_envelope.metadata.cached.unwrap_or(false);
    let payload = upstream_envelope
        .data
        .ok_or_else(|| GatewayError::external("upstream returned an empty payload"))?;

    let body: UpstreamAddressBody = serde_json::from_value(payload).map_err(|e| {
        GatewayError::external(format!("upstream address payload had an unexpected shape: {}", e))
    })?;

    if body.results.common.error_code != "0" {
        return Err(GatewayError::external_with(
            format!("portal rejected the search: {}", body.results.common.error_message),
            json!({ "portalCode": body.results.common.error_code }),
        ));
    }

    let total_count: u64 = body.results.common.total_count.parse().unwrap_or(0);
    let items = body.results.juso.unwrap_or_default();
    let results = build_results(
        items,
        convert.then_some(target_system),
        &state.engine,
    );

    let data = json!({
        "keyword": keyword,
        "results": results,
        "pagination": Pagination {
            current_page: page_no,
            per_page: num_of_rows,
            total_count,
            total_pages: total_count.div_ceil(num_of_rows),
        },
    });

    let envelope =
        ApiEnvelope::success_with(data, cached, started.elapsed().as_millis() as u64);
    let mut response = Json(envelope).into_response();
    apply_cache_control(&mut response, CacheType::Address.ttl().as_secs());
    apply_rate_limit_headers(&mut response, &decision);
    Ok(response)
}

fn parse_bounded(
    name: &str,
    raw: Option<&str>,
    min: u64,
    max: u64,
    default: u64,
) -> Result<u64, GatewayError> {
    let Some(raw) = raw else { return Ok(default) };
    let value: u64 = raw.parse().map_err(|_| {
        GatewayError::validation(format!("{} must be a positive integer, got {:?}", name, raw))
    })?;
    if value < min || value > max {
        return Err(GatewayError::validation(format!(
            "{} must be between {} and {}",
            name, min, max
        )));
    }
    Ok(value)
}

/// Normalize upstream items; when a target system is given, convert the
/// entrance coordinates. Unconvertible coordinates are passed through in
/// the portal frame rather than dropped.
fn build_results(
    items: Vec<UpstreamAddressItem>,
    convert_to: Option<SystemCode>,
    engine: &CoordEngine,
) -> Vec<AddressResult> {
    items
        .into_iter()
        .map(|item| {
            let portal_point = match (item.ent_x.as_deref(), item.ent_y.as_deref()) {
                (Some(x), Some(y)) => match (x.parse::<f64>(), y.parse::<f64>()) {
                    (Ok(x), Ok(y)) => Some(Point { x, y }),
                    _ => None,
                },
                _ => None,
            };

            let (point, system) = match (portal_point, convert_to) {
                (Some(point), Some(target)) => {
                    match engine.transform(point, PORTAL_COORD_SYSTEM, target) {
                        Ok(converted) => (Some(converted), Some(target)),
                        Err(e) => {
                            tracing::warn!(
                                "coordinate conversion failed for {}: {}",
                                item.road_addr,
                                e
                            );
                            (Some(point), Some(PORTAL_COORD_SYSTEM))
                        }
                    }
                }
                (Some(point), None) => (Some(point), Some(PORTAL_COORD_SYSTEM)),
                (None, _) => (None, None),
            };

            AddressResult {
                road_address: item.road_addr,
                jibun_address: item.jibun_addr,
                zip_code: item.zip_no,
                building_name: item.building_name,
                x: point.map(|p| p.x),
                y: point.map(|p| p.y),
                coordinate_system: system,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_items() -> Vec<UpstreamAddressItem> {
        serde_json::from_value(json!([
            {
                "roadAddr": "서울특별시 중구 세종대로 110",
                "jibunAddr": "서울특별시 중구 태평로1가 31",
                "zipNo": "04524",
                "bdNm": "서울특별시청",
                "entX": "953901.17",
                "entY": "1952032.08"
            },
            {
                "roadAddr": "서울특별시 중구 을지로 12",
                "jibunAddr": "서울특별시 중구 을지로1가 1",
                "zipNo": "04527"
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_parse_bounded() {
        assert_eq!(parse_bounded("pageNo", None, 1, u64::MAX, 1).unwrap(), 1);
        assert_eq!(parse_bounded("numOfRows", Some("50"), 1, 100, 10).unwrap(), 50);
        assert!(parse_bounded("numOfRows", Some("101"), 1, 100, 10).is_err());
        assert!(parse_bounded("pageNo", Some("0"), 1, u64::MAX, 1).is_err());
        assert!(parse_bounded("pageNo", Some("abc"), 1, u64::MAX, 1).is_err());
    }

    #[test]
    fn test_build_results_passthrough() {
        let engine = CoordEngine::new(true);
        let results = build_results(sample_items(), None, &engine);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].coordinate_system, Some(PORTAL_COORD_SYSTEM));
        assert!((results[0].x.unwrap() - 953_901.17).abs() < 1e-9);
        assert!(results[1].x.is_none());
        assert!(results[1].coordinate_system.is_none());
    }

    #[test]
    fn test_build_results_converts_to_wgs84() {
        let engine = CoordEngine::new(true);
        let results = build_results(sample_items(), Some(SystemCode::Wgs84), &engine);
        assert_eq!(results[0].coordinate_system, Some(SystemCode::Wgs84));
        // City Hall entrance back to familiar lon/lat
        assert!((results[0].x.unwrap() - 126.978).abs() < 0.001);
        assert!((results[0].y.unwrap() - 37.5665).abs() < 0.001);
    }

    #[test]
    fn test_upstream_shape_parses() {
        let raw = json!({
            "results": {
                "common": {"errorCode": "0", "errorMessage": "정상", "totalCount": "2"},
                "juso": [{"roadAddr": "a", "jibunAddr": "b", "zipNo": "c"}]
            }
        });
        let body: UpstreamAddressBody = serde_json::from_value(raw).unwrap();
        assert_eq!(body.results.common.total_count, "2");
        assert_eq!(body.results.juso.unwrap().len(), 1);
    }

    #[test]
    fn test_pagination_total_pages() {
        assert_eq!(25u64.div_ceil(10), 3);
        assert_eq!(0u64.div_ceil(10), 0);
    }
}
