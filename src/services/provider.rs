//! Provider catalogue and fallback chains.
//!
//! A [`ProviderConfig`] is the static description of one provider endpoint
//! for one operation: where to POST, how to authenticate, what payload to
//! build and which response fields to look for. A [`ProviderRegistry`] holds
//! the ordered chain of those per operation.

use crate::core::config::{AppConfig, ProviderSettings, TimeoutConfig};
use crate::services::extract::ExtractionStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The relay operations exposed over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Chat,
    GenerateImage,
    ModifyImage,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Chat => "chat",
            Operation::GenerateImage => "generate_image",
            Operation::ModifyImage => "modify_image",
        }
    }

    pub const fn is_image(self) -> bool {
        matches!(self, Operation::GenerateImage | Operation::ModifyImage)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hosted-inference providers known to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    HuggingFace,
    OpenRouter,
    Fal,
    DeepInfra,
    Stability,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::HuggingFace,
        ProviderKind::OpenRouter,
        ProviderKind::Fal,
        ProviderKind::DeepInfra,
        ProviderKind::Stability,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ProviderKind::HuggingFace => "huggingface",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Fal => "fal",
            ProviderKind::DeepInfra => "deepinfra",
            ProviderKind::Stability => "stability",
        }
    }

    /// Environment variables checked, in order, for this provider's key.
    pub const fn key_env_vars(self) -> &'static [&'static str] {
        match self {
            ProviderKind::HuggingFace => &["HF_KEY", "HF_TOKEN", "HUGGINGFACE_API_KEY"],
            ProviderKind::OpenRouter => &["OPENROUTER_API_KEY", "OPENROUTER_KEY"],
            ProviderKind::Fal => &["FAL_KEY", "FAL_API_KEY"],
            ProviderKind::DeepInfra => &["DEEPINFRA_API_KEY", "DEEPINFRA_TOKEN"],
            ProviderKind::Stability => &["STABILITY_API_KEY", "STABILITY_KEY"],
        }
    }

    pub const fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::HuggingFace => "https://router.huggingface.co",
            ProviderKind::OpenRouter => "https://openrouter.ai/api",
            ProviderKind::Fal => "https://fal.run",
            ProviderKind::DeepInfra => "https://api.deepinfra.com",
            ProviderKind::Stability => "https://api.stability.ai",
        }
    }

    const fn auth(self) -> AuthScheme {
        match self {
            ProviderKind::Fal => AuthScheme::Key,
            _ => AuthScheme::Bearer,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the API key is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `Authorization: Key <key>` (Fal.ai)
    Key,
}

impl AuthScheme {
    pub fn header_value(self, api_key: &str) -> String {
        match self {
            AuthScheme::Bearer => format!("Bearer {}", api_key),
            AuthScheme::Key => format!("Key {}", api_key),
        }
    }
}

/// Shape of the outbound request body.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadShape {
    /// OpenAI-compatible `{model, messages}`
    OpenAiChat { model: String },
    /// Hugging Face text-to-image `{inputs, parameters{width,height}, model}`
    HfTextToImage {
        model: String,
        width: u32,
        height: u32,
    },
    /// Hugging Face instruct edit `{inputs{image,prompt}, model}`
    HfInstructEdit { model: String },
    /// Fal text-to-image `{prompt, image_size, num_images}`
    FalTextToImage { image_size: String },
    /// Fal image-to-image `{image_url, prompt, strength}`
    FalImageToImage { strength: f32 },
    /// OpenAI-compatible image generation `{prompt, model, size, n, response_format}`
    OpenAiImages { model: String, size: String },
    /// Stability multipart form `{prompt, output_format}`
    StabilityForm { output_format: String },
}

impl PayloadShape {
    /// Extraction strategies to try, in priority order, for this shape.
    pub fn default_extraction(&self) -> Vec<ExtractionStrategy> {
        use ExtractionStrategy::*;
        match self {
            PayloadShape::OpenAiChat { .. } => vec![ChatContent, GeneratedText],
            PayloadShape::HfTextToImage { .. } | PayloadShape::HfInstructEdit { .. } => {
                vec![RawImage, ImagesBase64, ImagesUrl, DataB64Json, DataUrl]
            }
            PayloadShape::FalTextToImage { .. } | PayloadShape::FalImageToImage { .. } => {
                vec![ImagesUrl, ImagesBase64, RawImage]
            }
            PayloadShape::OpenAiImages { .. } => vec![DataB64Json, DataUrl],
            PayloadShape::StabilityForm { .. } => vec![RawImage, ArtifactsBase64],
        }
    }
}

/// One provider endpoint for one operation.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider name (for logging and metrics)
    pub name: String,
    pub operation: Operation,
    /// Full URL the request is POSTed to
    pub endpoint: String,
    pub api_key: String,
    pub auth: AuthScheme,
    pub payload: PayloadShape,
    pub extraction: Vec<ExtractionStrategy>,
    /// Optional `Accept` header
    pub accept: Option<&'static str>,
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Provider endpoint with bearer auth and the payload's default extraction.
    pub fn new(
        name: impl Into<String>,
        operation: Operation,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        payload: PayloadShape,
        timeout: Duration,
    ) -> Self {
        let extraction = payload.default_extraction();
        Self {
            name: name.into(),
            operation,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            auth: AuthScheme::Bearer,
            payload,
            extraction,
            accept: None,
            timeout,
        }
    }

    /// Build the catalogue entry for `kind` and `operation`.
    ///
    /// Returns `None` when the provider does not offer the operation.
    pub fn catalog(
        kind: ProviderKind,
        operation: Operation,
        api_key: &str,
        settings: &ProviderSettings,
        timeouts: &TimeoutConfig,
    ) -> Option<Self> {
        let base = settings
            .base_url
            .as_deref()
            .unwrap_or(kind.default_base_url())
            .trim_end_matches('/');
        let model = |configured: &Option<String>, default: &str| {
            configured.clone().unwrap_or_else(|| default.to_string())
        };

        let (endpoint, payload, accept) = match (kind, operation) {
            (ProviderKind::HuggingFace, Operation::Chat) => (
                format!("{}/v1/chat/completions", base),
                PayloadShape::OpenAiChat {
                    model: model(&settings.chat_model, "meta-llama/Llama-3.1-8B-Instruct"),
                },
                None,
            ),
            (ProviderKind::HuggingFace, Operation::GenerateImage) => {
                let model = model(&settings.image_model, "black-forest-labs/FLUX.1-dev");
                (
                    format!("{}/hf-inference/models/{}", base, model),
                    PayloadShape::HfTextToImage {
                        model,
                        width: 512,
                        height: 512,
                    },
                    None,
                )
            }
            (ProviderKind::HuggingFace, Operation::ModifyImage) => {
                let model = model(&settings.edit_model, "timbrooks/instruct-pix2pix");
                (
                    format!("{}/hf-inference/models/{}", base, model),
                    PayloadShape::HfInstructEdit { model },
                    None,
                )
            }
            (ProviderKind::OpenRouter, Operation::Chat) => (
                format!("{}/v1/chat/completions", base),
                PayloadShape::OpenAiChat {
                    model: model(&settings.chat_model, "mistralai/mistral-7b-instruct"),
                },
                None,
            ),
            (ProviderKind::Fal, Operation::GenerateImage) => (
                format!(
                    "{}/{}",
                    base,
                    model(&settings.image_model, "fal-ai/flux/schnell")
                ),
                PayloadShape::FalTextToImage {
                    image_size: "square_hd".to_string(),
                },
                None,
            ),
            (ProviderKind::Fal, Operation::ModifyImage) => (
                format!(
                    "{}/{}",
                    base,
                    model(&settings.edit_model, "fal-ai/flux/dev/image-to-image")
                ),
                PayloadShape::FalImageToImage { strength: 0.85 },
                None,
            ),
            (ProviderKind::DeepInfra, Operation::Chat) => (
                format!("{}/v1/openai/chat/completions", base),
                PayloadShape::OpenAiChat {
                    model: model(
                        &settings.chat_model,
                        "meta-llama/Meta-Llama-3.1-8B-Instruct",
                    ),
                },
                None,
            ),
            (ProviderKind::DeepInfra, Operation::GenerateImage) => (
                format!("{}/v1/openai/images/generations", base),
                PayloadShape::OpenAiImages {
                    model: model(&settings.image_model, "black-forest-labs/FLUX-1-schnell"),
                    size: "1024x1024".to_string(),
                },
                None,
            ),
            (ProviderKind::Stability, Operation::GenerateImage) => (
                format!("{}/v2beta/stable-image/generate/core", base),
                PayloadShape::StabilityForm {
                    output_format: "png".to_string(),
                },
                Some("image/*"),
            ),
            _ => return None,
        };

        let timeout = match operation {
            Operation::Chat => timeouts.chat(),
            Operation::GenerateImage | Operation::ModifyImage => timeouts.image(),
        };

        let mut provider = ProviderConfig::new(
            kind.name(),
            operation,
            endpoint,
            api_key,
            payload,
            timeout,
        );
        provider.auth = kind.auth();
        provider.accept = accept;
        Some(provider)
    }
}

/// Ordered fallback chains, one per operation.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    chat: Vec<ProviderConfig>,
    generate_image: Vec<ProviderConfig>,
    modify_image: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new(
        chat: Vec<ProviderConfig>,
        generate_image: Vec<ProviderConfig>,
        modify_image: Vec<ProviderConfig>,
    ) -> Self {
        Self {
            chat,
            generate_image,
            modify_image,
        }
    }

    /// Build the chains declared in the configuration.
    ///
    /// Providers without an API key, providers that do not offer the
    /// operation and repeated entries are left out.
    pub fn from_config(config: &AppConfig) -> Self {
        let build = |operation: Operation, kinds: &[ProviderKind]| {
            let mut chain: Vec<ProviderConfig> = Vec::with_capacity(kinds.len());
            for &kind in kinds {
                if chain.iter().any(|p| p.name == kind.name()) {
                    tracing::warn!(provider = %kind, operation = %operation, "Duplicate provider in chain ignored");
                    continue;
                }
                let settings = config.providers.get(kind);
                let Some(api_key) = settings.api_key() else {
                    tracing::warn!(
                        provider = %kind,
                        operation = %operation,
                        env = kind.key_env_vars()[0],
                        "API key not set, provider disabled"
                    );
                    continue;
                };
                match ProviderConfig::catalog(kind, operation, api_key, settings, &config.timeouts)
                {
                    Some(provider) => chain.push(provider),
                    None => tracing::warn!(
                        provider = %kind,
                        operation = %operation,
                        "Provider does not support operation, skipped"
                    ),
                }
            }
            chain
        };

        Self {
            chat: build(Operation::Chat, &config.chains.chat),
            generate_image: build(Operation::GenerateImage, &config.chains.generate_image),
            modify_image: build(Operation::ModifyImage, &config.chains.modify_image),
        }
    }

    /// The fallback chain for an operation, in attempt order.
    pub fn chain(&self, operation: Operation) -> &[ProviderConfig] {
        match operation {
            Operation::Chat => &self.chat,
            Operation::GenerateImage => &self.generate_image,
            Operation::ModifyImage => &self.modify_image,
        }
    }

    /// Log the configured chains at startup.
    pub fn log_providers(&self) {
        for operation in [
            Operation::Chat,
            Operation::GenerateImage,
            Operation::ModifyImage,
        ] {
            let names: Vec<&str> = self
                .chain(operation)
                .iter()
                .map(|p| p.name.as_str())
                .collect();
            if names.is_empty() {
                tracing::warn!(operation = %operation, "No provider configured");
            } else {
                tracing::info!(
                    operation = %operation,
                    chain = %names.join(" -> "),
                    "Provider chain configured"
                );
            }
        }
    }
}
