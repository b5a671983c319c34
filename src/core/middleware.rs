//! HTTP middleware for request IDs and request metrics.

use crate::core::logging::{generate_request_id, REQUEST_ID, REQUEST_ID_HEADER};
use crate::core::metrics::get_metrics;
use axum::{
    body::Body,
    extract::Request,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Longest inbound request ID that is honored as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Assign a request ID and run the rest of the stack inside its scope.
///
/// An inbound `x-request-id` header is reused when present and sane,
/// otherwise a fresh UUID is generated. The ID is echoed on the response.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_owned)
        .unwrap_or_else(generate_request_id);

    let mut response = REQUEST_ID.scope(request_id.clone(), next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Give successful `OPTIONS` responses a `{"ok": true}` body.
///
/// Must sit outside the CORS layer, which answers `OPTIONS` itself with an
/// empty body.
pub async fn options_ok_middleware(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Response::from_parts(parts, Body::from(r#"{"ok":true}"#))
}

/// Middleware for tracking request metrics.
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    /// Track metrics for incoming requests.
    ///
    /// This middleware:
    /// - Increments active request counter
    /// - Measures request duration
    /// - Records request count by status code
    pub async fn track_metrics(request: Request, next: Next) -> Response {
        let endpoint = request.uri().path().to_string();
        let method = request.method().to_string();

        // Skip metrics endpoint itself to avoid recursion
        if endpoint == "/metrics" {
            return next.run(request).await;
        }

        let metrics = get_metrics();
        metrics
            .active_requests
            .with_label_values(&[&endpoint])
            .inc();

        let start = Instant::now();
        let response = next.run(request).await;
        let duration = start.elapsed().as_secs_f64();
        let status_code = response.status().as_u16().to_string();

        metrics
            .request_count
            .with_label_values(&[&method, &endpoint, &status_code])
            .inc();
        metrics
            .request_duration
            .with_label_values(&[&method, &endpoint])
            .observe(duration);
        metrics
            .active_requests
            .with_label_values(&[&endpoint])
            .dec();

        tracing::debug!(
            method = %method,
            endpoint = %endpoint,
            status = %status_code,
            duration_ms = (duration * 1000.0) as u64,
            "Request completed"
        );

        response
    }
}
