//! API request and response models.
//!
//! Inbound bodies keep every field optional so that a missing field is
//! reported as a validation failure (`missing field: <name>`) rather than a
//! deserialization error.

use crate::services::relay::{ImageRef, OutboundRequest, RelayOutput};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// `POST /chat` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

impl From<ChatRequest> for OutboundRequest {
    fn from(body: ChatRequest) -> Self {
        OutboundRequest::chat(body.message.unwrap_or_default())
    }
}

/// `POST /generate_image` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateImageRequest {
    #[serde(default, alias = "prompt")]
    pub message: Option<String>,
}

impl From<GenerateImageRequest> for OutboundRequest {
    fn from(body: GenerateImageRequest) -> Self {
        OutboundRequest::generate_image(body.message.unwrap_or_default())
    }
}

/// JSON form of `POST /modify_image`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModifyImageRequest {
    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default, alias = "prompt")]
    pub instruction: Option<String>,
}

impl From<ModifyImageRequest> for OutboundRequest {
    fn from(body: ModifyImageRequest) -> Self {
        OutboundRequest::modify_image(
            ImageRef::Url(body.image_url.unwrap_or_default()),
            body.instruction.unwrap_or_default(),
        )
    }
}

/// Successful chat reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// Successful image generation: inline base64 or a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerateImageResponse {
    Base64 { image_base64: String },
    Url { image_url: String },
}

/// Successful image modification: inline base64 or a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModifyImageResponse {
    Base64 { modified_image: String },
    Url { modified_image_url: String },
}

fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

impl From<RelayOutput> for ChatResponse {
    fn from(output: RelayOutput) -> Self {
        let reply = match output {
            RelayOutput::Text { content } => content,
            RelayOutput::ImageUrl { url } => url,
            RelayOutput::ImageBytes { data } => encode(&data),
        };
        ChatResponse { reply }
    }
}

impl From<RelayOutput> for GenerateImageResponse {
    fn from(output: RelayOutput) -> Self {
        match output {
            RelayOutput::ImageBytes { data } => GenerateImageResponse::Base64 {
                image_base64: encode(&data),
            },
            RelayOutput::ImageUrl { url } => GenerateImageResponse::Url { image_url: url },
            // A text answer to an image request is most likely base64 already.
            RelayOutput::Text { content } => GenerateImageResponse::Base64 {
                image_base64: content,
            },
        }
    }
}

impl From<RelayOutput> for ModifyImageResponse {
    fn from(output: RelayOutput) -> Self {
        match output {
            RelayOutput::ImageBytes { data } => ModifyImageResponse::Base64 {
                modified_image: encode(&data),
            },
            RelayOutput::ImageUrl { url } => ModifyImageResponse::Url {
                modified_image_url: url,
            },
            RelayOutput::Text { content } => ModifyImageResponse::Base64 {
                modified_image: content,
            },
        }
    }
}

/// `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// `GET /` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub status: String,
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
}
