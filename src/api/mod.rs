//! API layer for the inference relay.
//!
//! This module contains the HTTP handlers, request/response models and the
//! router that wires them together with the middleware stack.

pub mod handlers;
pub mod models;

// Re-export commonly used types
pub use handlers::{
    build_http_client, chat, generate_image, health, metrics_handler, modify_image, root,
    AppState,
};
pub use models::{
    ChatRequest, ChatResponse, GenerateImageRequest, GenerateImageResponse, HealthResponse,
    ModifyImageRequest, ModifyImageResponse, ServiceInfo,
};

use crate::core::{options_ok_middleware, request_id_middleware, MetricsMiddleware};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Largest accepted request body (uploads included).
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Build the application router.
///
/// `OPTIONS` on any route is answered by the CORS layer and given a
/// `{"ok": true}` body.
pub fn router(state: Arc<AppState>) -> Router {
    let relay_routes = Router::new()
        .route("/chat", post(chat))
        .route("/generate_image", post(generate_image))
        .route("/image", post(generate_image))
        .route("/modify_image", post(modify_image))
        .route("/image_modify", post(modify_image))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .with_state(state.clone());

    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .merge(relay_routes);

    if let Some(store) = state.relay.artifacts() {
        let files = ServeDir::new(store.dir());
        app = if store.url_prefix().is_empty() {
            app.fallback_service(files)
        } else {
            app.nest_service(store.url_prefix(), files)
        };
    }

    app.layer(CorsLayer::very_permissive())
        .layer(axum::middleware::from_fn(options_ok_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}
