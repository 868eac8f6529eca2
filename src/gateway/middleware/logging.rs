//! Request logging middleware.
//!
//! Tags every request with an id, records method, path, status and
//! latency. Query strings are not logged here; anything containing a
//! credential is masked at the call sites that build it.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

pub async fn request_logging(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = std::time::Instant::now();

    let mut response = next.run(request).await;

    tracing::info!(
        "{} {} -> {} ({} ms) [{}]",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis(),
        request_id
    );

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
