//! Outbound request bodies.
//!
//! Turns an [`OutboundRequest`] into the body a provider expects, according
//! to the provider's [`PayloadShape`].

use crate::core::error::RelayError;
use crate::services::provider::{PayloadShape, ProviderConfig};
use crate::services::relay::{ImageRef, OutboundRequest};
use base64::Engine as _;
use serde_json::{json, Value};

/// Body of one outbound provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    Json(Value),
    /// Text fields sent as `multipart/form-data`
    Form(Vec<(&'static str, String)>),
}

impl OutboundBody {
    /// Attach the body to a request builder.
    pub fn attach(self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            OutboundBody::Json(value) => builder.json(&value),
            OutboundBody::Form(fields) => {
                let form = fields
                    .into_iter()
                    .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                        form.text(name, value)
                    });
                builder.multipart(form)
            }
        }
    }
}

/// Build the body for `request` as `provider` expects it.
pub fn build_payload(
    provider: &ProviderConfig,
    request: &OutboundRequest,
) -> Result<OutboundBody, RelayError> {
    let body = match (&provider.payload, request) {
        (PayloadShape::OpenAiChat { model }, OutboundRequest::Chat { message }) => {
            OutboundBody::Json(json!({
                "model": model,
                "messages": [{"role": "user", "content": message}],
            }))
        }
        (
            PayloadShape::HfTextToImage {
                model,
                width,
                height,
            },
            OutboundRequest::GenerateImage { prompt },
        ) => OutboundBody::Json(json!({
            "inputs": prompt,
            "parameters": {"width": width, "height": height},
            "model": model,
        })),
        (
            PayloadShape::HfInstructEdit { model },
            OutboundRequest::ModifyImage { image, instruction },
        ) => {
            let image = match image {
                ImageRef::Url(url) => url.clone(),
                ImageRef::Bytes { data, .. } => {
                    base64::engine::general_purpose::STANDARD.encode(data)
                }
            };
            OutboundBody::Json(json!({
                "inputs": {"image": image, "prompt": instruction},
                "model": model,
            }))
        }
        (PayloadShape::FalTextToImage { image_size }, OutboundRequest::GenerateImage { prompt }) => {
            OutboundBody::Json(json!({
                "prompt": prompt,
                "image_size": image_size,
                "num_images": 1,
            }))
        }
        (
            PayloadShape::FalImageToImage { strength },
            OutboundRequest::ModifyImage { image, instruction },
        ) => OutboundBody::Json(json!({
            "image_url": image.to_url(),
            "prompt": instruction,
            "strength": strength,
        })),
        (PayloadShape::OpenAiImages { model, size }, OutboundRequest::GenerateImage { prompt }) => {
            OutboundBody::Json(json!({
                "prompt": prompt,
                "model": model,
                "size": size,
                "n": 1,
                "response_format": "b64_json",
            }))
        }
        (
            PayloadShape::StabilityForm { output_format },
            OutboundRequest::GenerateImage { prompt },
        ) => OutboundBody::Form(vec![
            ("prompt", prompt.clone()),
            ("output_format", output_format.clone()),
        ]),
        _ => {
            return Err(RelayError::Unsupported {
                provider: provider.name.clone(),
                operation: request.operation(),
            })
        }
    };
    Ok(body)
}
