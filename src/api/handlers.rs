//! HTTP request handlers for the relay API.
//!
//! Each relay handler decodes its body into an [`OutboundRequest`], hands it
//! to the [`RelayHandler`] and maps the result onto the route's response
//! shape. Failures become `{"error": ..., "details": ...}` via [`AppError`].

use crate::api::models::*;
use crate::core::config::AppConfig;
use crate::core::logging::get_request_id;
use crate::core::{AppError, Result};
use crate::services::artifacts::ArtifactStore;
use crate::services::provider::ProviderRegistry;
use crate::services::relay::{ImageRef, OutboundRequest, RelayHandler};
use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub relay: RelayHandler,
}

impl AppState {
    pub fn new(config: AppConfig, relay: RelayHandler) -> Self {
        Self { config, relay }
    }

    /// Build the HTTP client, provider chains and artifact store from `config`.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let client = build_http_client(&config)?;
        let registry = ProviderRegistry::from_config(&config);
        let artifacts = ArtifactStore::from_config(&config.artifacts);
        let relay = RelayHandler::new(client, registry, artifacts);
        Ok(Self::new(config, relay))
    }
}

/// Create the shared HTTP client with connection pooling.
///
/// Per-request timeouts are set on each provider call.
pub fn build_http_client(config: &AppConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(!config.verify_ssl)
        .pool_max_idle_per_host(20)
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .build()?;
    Ok(client)
}

/// Decode a JSON body. An empty body counts as `{}` so that missing fields
/// surface as validation failures.
fn parse_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(request_id = %get_request_id(), error = %e, "Rejected malformed JSON body");
        AppError::BadRequest(format!("invalid JSON body: {}", e))
    })
}

/// Liveness probe with service information.
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        status: "inference relay running".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: ["/chat", "/generate_image", "/modify_image"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    })
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// `POST /chat`
pub async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<ChatResponse>> {
    let request: ChatRequest = parse_json(&body)?;
    let output = state.relay.handle(request.into()).await?;
    Ok(Json(output.into()))
}

/// `POST /generate_image`, `POST /image`
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<GenerateImageResponse>> {
    let request: GenerateImageRequest = parse_json(&body)?;
    let output = state.relay.handle(request.into()).await?;
    Ok(Json(output.into()))
}

/// `POST /modify_image`, `POST /image_modify`
///
/// Accepts either a multipart upload (`file` or `image`, plus `prompt` or
/// `instruction`) or a JSON body with `image_url` and `instruction`.
pub async fn modify_image(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ModifyImageResponse>> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false);

    let outbound = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?;
        read_modify_form(multipart).await?
    } else {
        let body = Bytes::from_request(request, &())
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read body: {}", e)))?;
        parse_json::<ModifyImageRequest>(&body)?.into()
    };

    let output = state.relay.handle(outbound).await?;
    Ok(Json(output.into()))
}

/// Collect the image and instruction from a multipart form.
async fn read_modify_form(mut multipart: Multipart) -> Result<OutboundRequest> {
    let mut upload: Option<ImageRef> = None;
    let mut image_url: Option<String> = None;
    let mut instruction = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" | "image" => {
                let content_type = field.content_type().map(str::to_owned);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read image: {}", e)))?;
                upload = Some(ImageRef::Bytes { data, content_type });
            }
            "prompt" | "instruction" => {
                instruction = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read {}: {}", name, e)))?;
            }
            "image_url" => {
                let url = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read {}: {}", name, e)))?;
                image_url = Some(url);
            }
            _ => {}
        }
    }

    tracing::debug!(
        request_id = %get_request_id(),
        has_upload = upload.is_some(),
        has_image_url = image_url.is_some(),
        "Parsed modify_image form"
    );

    // An empty file input still sends a zero-byte part.
    let image = match (upload, image_url) {
        (Some(ImageRef::Bytes { data, .. }), Some(url)) if data.is_empty() => ImageRef::Url(url),
        (Some(upload), _) => upload,
        (None, Some(url)) => ImageRef::Url(url),
        (None, None) => ImageRef::Bytes {
            data: Bytes::new(),
            content_type: None,
        },
    };
    Ok(OutboundRequest::modify_image(image, instruction))
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}
