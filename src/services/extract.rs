//! Response extraction strategies.
//!
//! Providers disagree on where the useful part of a response lives. Each
//! provider carries an ordered list of [`ExtractionStrategy`] values; the
//! first one that matches wins.

use crate::services::relay::RelayOutput;
use base64::Engine as _;
use bytes::Bytes;
use serde_json::Value;

/// Upper bound on the raw body kept for diagnostics.
pub const MAX_DIAGNOSTIC_BODY_LEN: usize = 2000;

/// A successful upstream response, ready for extraction.
#[derive(Debug, Clone)]
pub struct UpstreamBody {
    content_type: Option<String>,
    bytes: Bytes,
    json: Option<Value>,
}

impl UpstreamBody {
    pub fn new(content_type: Option<String>, bytes: Bytes) -> Self {
        let json = if is_image_content_type(content_type.as_deref()) {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };
        Self {
            content_type,
            bytes,
            json,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// Body as text for error details, truncated.
    pub fn diagnostic_text(&self) -> String {
        if is_image_content_type(self.content_type()) {
            return format!(
                "<{} bytes of {}>",
                self.bytes.len(),
                self.content_type().unwrap_or("image")
            );
        }
        truncate_for_diagnostics(&String::from_utf8_lossy(&self.bytes))
    }
}

/// Cut `text` to at most [`MAX_DIAGNOSTIC_BODY_LEN`] bytes on a char boundary.
pub fn truncate_for_diagnostics(text: &str) -> String {
    if text.len() <= MAX_DIAGNOSTIC_BODY_LEN {
        return text.to_string();
    }
    let mut end = MAX_DIAGNOSTIC_BODY_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn is_image_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// A single way of finding the payload in a provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// `choices[0].message.content`
    ChatContent,
    /// `[0].generated_text` or `generated_text`
    GeneratedText,
    /// Whole body when the response is `image/*`
    RawImage,
    /// `images[0]` as a base64 string, data URI or URL
    ImagesBase64,
    /// `images[0].url`
    ImagesUrl,
    /// `data[0].b64_json`
    DataB64Json,
    /// `data[0].url`
    DataUrl,
    /// `artifacts[0].base64`
    ArtifactsBase64,
}

impl ExtractionStrategy {
    pub fn apply(self, body: &UpstreamBody) -> Option<RelayOutput> {
        match self {
            ExtractionStrategy::RawImage => {
                if is_image_content_type(body.content_type()) && !body.bytes().is_empty() {
                    Some(RelayOutput::ImageBytes {
                        data: body.bytes().clone(),
                    })
                } else {
                    None
                }
            }
            ExtractionStrategy::ChatContent => body
                .json()?
                .pointer("/choices/0/message/content")?
                .as_str()
                .map(|content| RelayOutput::Text {
                    content: content.to_string(),
                }),
            ExtractionStrategy::GeneratedText => {
                let json = body.json()?;
                json.pointer("/0/generated_text")
                    .or_else(|| json.get("generated_text"))?
                    .as_str()
                    .map(|content| RelayOutput::Text {
                        content: content.to_string(),
                    })
            }
            ExtractionStrategy::ImagesBase64 => {
                image_from_str(body.json()?.pointer("/images/0")?.as_str()?)
            }
            ExtractionStrategy::ImagesUrl => {
                image_from_str(body.json()?.pointer("/images/0/url")?.as_str()?)
            }
            ExtractionStrategy::DataB64Json => {
                decode_base64(body.json()?.pointer("/data/0/b64_json")?.as_str()?)
                    .map(|data| RelayOutput::ImageBytes { data })
            }
            ExtractionStrategy::DataUrl => {
                image_from_str(body.json()?.pointer("/data/0/url")?.as_str()?)
            }
            ExtractionStrategy::ArtifactsBase64 => {
                decode_base64(body.json()?.pointer("/artifacts/0/base64")?.as_str()?)
                    .map(|data| RelayOutput::ImageBytes { data })
            }
        }
    }
}

/// Apply `strategies` in order and return the first match.
pub fn extract(strategies: &[ExtractionStrategy], body: &UpstreamBody) -> Option<RelayOutput> {
    strategies.iter().find_map(|strategy| strategy.apply(body))
}

/// Interpret a string field that may hold a URL, a data URI or bare base64.
fn image_from_str(value: &str) -> Option<RelayOutput> {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(RelayOutput::ImageUrl {
            url: value.to_string(),
        });
    }
    decode_base64(value).map(|data| RelayOutput::ImageBytes { data })
}

/// Decode standard base64, accepting an optional `data:<mime>;base64,` prefix.
pub fn decode_base64(value: &str) -> Option<Bytes> {
    let value = value.trim();
    let encoded = match value.strip_prefix("data:") {
        Some(rest) => rest.split_once(";base64,")?.1,
        None => value,
    };
    if encoded.is_empty() {
        return None;
    }
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()
        .filter(|data| !data.is_empty())
        .map(Bytes::from)
}
