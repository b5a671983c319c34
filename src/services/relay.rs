//! The relay handler.
//!
//! [`RelayHandler::handle`] validates a normalized request, walks the
//! provider chain for its operation in declared order, and returns the first
//! successful extraction. Attempts are strictly sequential and stop at the
//! first success.

use crate::core::error::RelayError;
use crate::core::logging::{get_provider_context, get_request_id, PROVIDER_CONTEXT};
use crate::core::metrics::get_metrics;
use crate::services::artifacts::ArtifactStore;
use crate::services::extract::{extract, UpstreamBody};
use crate::services::payload::build_payload;
use crate::services::provider::{Operation, ProviderConfig, ProviderRegistry};
use base64::Engine as _;
use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::error::Error as _;
use std::sync::Arc;
use std::time::Instant;

/// Image supplied for modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Publicly reachable image URL (or data URI)
    Url(String),
    /// Uploaded image bytes
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
}

impl ImageRef {
    fn is_empty(&self) -> bool {
        match self {
            ImageRef::Url(url) => url.trim().is_empty(),
            ImageRef::Bytes { data, .. } => data.is_empty(),
        }
    }

    /// The image as something a URL field can carry; uploads become a data URI.
    pub fn to_url(&self) -> String {
        match self {
            ImageRef::Url(url) => url.clone(),
            ImageRef::Bytes { data, content_type } => format!(
                "data:{};base64,{}",
                content_type.as_deref().unwrap_or("image/png"),
                base64::engine::general_purpose::STANDARD.encode(data)
            ),
        }
    }
}

/// A normalized inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundRequest {
    Chat { message: String },
    GenerateImage { prompt: String },
    ModifyImage { image: ImageRef, instruction: String },
}

impl OutboundRequest {
    pub fn chat(message: impl AsRef<str>) -> Self {
        OutboundRequest::Chat {
            message: message.as_ref().trim().to_string(),
        }
    }

    pub fn generate_image(prompt: impl AsRef<str>) -> Self {
        OutboundRequest::GenerateImage {
            prompt: prompt.as_ref().trim().to_string(),
        }
    }

    pub fn modify_image(image: ImageRef, instruction: impl AsRef<str>) -> Self {
        let image = match image {
            ImageRef::Url(url) => ImageRef::Url(url.trim().to_string()),
            bytes => bytes,
        };
        OutboundRequest::ModifyImage {
            image,
            instruction: instruction.as_ref().trim().to_string(),
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            OutboundRequest::Chat { .. } => Operation::Chat,
            OutboundRequest::GenerateImage { .. } => Operation::GenerateImage,
            OutboundRequest::ModifyImage { .. } => Operation::ModifyImage,
        }
    }

    /// Check that every required field is present and not blank.
    pub fn validate(&self) -> Result<(), RelayError> {
        match self {
            OutboundRequest::Chat { message } if message.trim().is_empty() => {
                Err(RelayError::Validation("message"))
            }
            OutboundRequest::GenerateImage { prompt } if prompt.trim().is_empty() => {
                Err(RelayError::Validation("message"))
            }
            OutboundRequest::ModifyImage { image, .. } if image.is_empty() => {
                Err(RelayError::Validation(match image {
                    ImageRef::Url(_) => "image_url",
                    ImageRef::Bytes { .. } => "file",
                }))
            }
            OutboundRequest::ModifyImage { instruction, .. } if instruction.trim().is_empty() => {
                Err(RelayError::Validation("instruction"))
            }
            _ => Ok(()),
        }
    }
}

/// Successful relay output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutput {
    Text { content: String },
    ImageBytes { data: Bytes },
    ImageUrl { url: String },
}

impl RelayOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayOutput::Text { .. } => "text",
            RelayOutput::ImageBytes { .. } => "image_bytes",
            RelayOutput::ImageUrl { .. } => "image_url",
        }
    }
}

pub type RelayResult = Result<RelayOutput, RelayError>;

/// Forwards normalized requests to the configured provider chains.
#[derive(Clone)]
pub struct RelayHandler {
    client: reqwest::Client,
    registry: Arc<ProviderRegistry>,
    artifacts: Option<ArtifactStore>,
}

impl RelayHandler {
    pub fn new(
        client: reqwest::Client,
        registry: ProviderRegistry,
        artifacts: Option<ArtifactStore>,
    ) -> Self {
        Self {
            client,
            registry: Arc::new(registry),
            artifacts,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn artifacts(&self) -> Option<&ArtifactStore> {
        self.artifacts.as_ref()
    }

    /// Relay one request.
    ///
    /// Validation failures return before any provider is contacted. A chain
    /// with a single provider reports that provider's failure unchanged; a
    /// longer chain reports [`RelayError::Exhausted`] once every provider
    /// has failed.
    #[tracing::instrument(
        skip(self, request),
        fields(
            request_id = %get_request_id(),
            operation = %request.operation(),
        )
    )]
    pub async fn handle(&self, request: OutboundRequest) -> RelayResult {
        request.validate()?;

        let operation = request.operation();
        let chain = self.registry.chain(operation);
        if chain.is_empty() {
            return Err(RelayError::NotConfigured(operation));
        }

        let output = self.run_chain(chain, &request).await?;
        let output = self.persist_image(operation, output).await;
        tracing::debug!(output = output.kind(), "Relay completed");
        Ok(output)
    }

    async fn run_chain(&self, chain: &[ProviderConfig], request: &OutboundRequest) -> RelayResult {
        let mut failures = Vec::with_capacity(chain.len());

        for provider in chain {
            let result = PROVIDER_CONTEXT
                .scope(provider.name.clone(), self.attempt(provider, request))
                .await;

            match result {
                Ok(output) => {
                    if !failures.is_empty() {
                        tracing::info!(
                            provider = %provider.name,
                            failed_attempts = failures.len(),
                            "Fallback provider succeeded"
                        );
                    }
                    return Ok(output);
                }
                Err(err) => {
                    tracing::warn!(
                        provider = %provider.name,
                        status = err.status().as_u16(),
                        error = %err,
                        "Provider attempt failed"
                    );
                    failures.push(err);
                }
            }
        }

        if failures.len() == 1 {
            Err(failures.remove(0))
        } else {
            Err(RelayError::Exhausted { attempts: failures })
        }
    }

    /// One outbound call to one provider.
    async fn attempt(&self, provider: &ProviderConfig, request: &OutboundRequest) -> RelayResult {
        let operation = provider.operation.as_str();
        let metrics = get_metrics();

        let result = self.send(provider, request).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.outcome(),
        };
        metrics
            .provider_attempts
            .with_label_values(&[&provider.name, operation, outcome])
            .inc();

        result
    }

    async fn send(&self, provider: &ProviderConfig, request: &OutboundRequest) -> RelayResult {
        let body = build_payload(provider, request)?;
        let request_id = get_request_id();

        tracing::debug!(
            request_id = %request_id,
            provider = %get_provider_context(),
            url = %provider.endpoint,
            timeout_secs = provider.timeout.as_secs(),
            "Sending provider request"
        );

        let mut builder = self
            .client
            .post(&provider.endpoint)
            .timeout(provider.timeout)
            .header(AUTHORIZATION, provider.auth.header_value(&provider.api_key));
        if let Some(accept) = provider.accept {
            builder = builder.header(ACCEPT, accept);
        }

        let start = Instant::now();
        let response = body.attach(builder).send().await.map_err(|e| {
            tracing::error!(
                request_id = %request_id,
                provider = %provider.name,
                url = %provider.endpoint,
                error = %e,
                error_source = ?e.source(),
                is_timeout = e.is_timeout(),
                is_connect = e.is_connect(),
                "HTTP request failed to provider"
            );
            RelayError::Transport {
                provider: provider.name.clone(),
                message: e.to_string(),
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await.map_err(|e| RelayError::Transport {
            provider: provider.name.clone(),
            message: e.to_string(),
        })?;

        get_metrics()
            .provider_latency
            .with_label_values(&[&provider.name, provider.operation.as_str()])
            .observe(start.elapsed().as_secs_f64());

        tracing::debug!(
            request_id = %request_id,
            provider = %provider.name,
            status = status,
            content_type = ?content_type,
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Provider responded"
        );

        if !(200..300).contains(&status) {
            return Err(RelayError::Upstream {
                provider: provider.name.clone(),
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let upstream = UpstreamBody::new(content_type, bytes);
        extract(&provider.extraction, &upstream).ok_or_else(|| RelayError::NoValidField {
            provider: provider.name.clone(),
            body: upstream.diagnostic_text(),
        })
    }

    /// Swap image bytes for an artifact URL when the store is enabled.
    ///
    /// A failed write is logged and the bytes are returned as-is.
    async fn persist_image(&self, operation: Operation, output: RelayOutput) -> RelayOutput {
        let (Some(store), RelayOutput::ImageBytes { data }) = (&self.artifacts, &output) else {
            return output;
        };
        if !operation.is_image() {
            return output;
        }

        match store.persist(data).await {
            Ok(url) => {
                get_metrics()
                    .artifacts_written
                    .with_label_values(&[operation.as_str()])
                    .inc();
                tracing::info!(url = %url, bytes = data.len(), "Saved image artifact");
                RelayOutput::ImageUrl { url }
            }
            Err(e) => {
                tracing::warn!(
                    dir = %store.dir().display(),
                    error = %e,
                    "Failed to save image artifact, returning inline image"
                );
                output
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::PayloadShape;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn chat_provider(name: &str, server: &MockServer, route: &str) -> ProviderConfig {
        ProviderConfig::new(
            name,
            Operation::Chat,
            format!("{}{}", server.uri(), route),
            format!("{}-key", name),
            PayloadShape::OpenAiChat {
                model: "test-model".to_string(),
            },
            Duration::from_secs(5),
        )
    }

    fn handler(chat: Vec<ProviderConfig>) -> RelayHandler {
        RelayHandler::new(
            reqwest::Client::new(),
            ProviderRegistry::new(chat, vec![], vec![]),
            None,
        )
    }

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        assert_eq!(
            OutboundRequest::chat("   ").validate(),
            Err(RelayError::Validation("message"))
        );
        assert_eq!(
            OutboundRequest::generate_image("").validate(),
            Err(RelayError::Validation("message"))
        );
        assert_eq!(
            OutboundRequest::modify_image(ImageRef::Url(" ".to_string()), "hat").validate(),
            Err(RelayError::Validation("image_url"))
        );
        assert_eq!(
            OutboundRequest::modify_image(
                ImageRef::Bytes {
                    data: Bytes::new(),
                    content_type: None
                },
                "hat"
            )
            .validate(),
            Err(RelayError::Validation("file"))
        );
        assert_eq!(
            OutboundRequest::modify_image(ImageRef::Url("https://x/a.png".to_string()), "\n")
                .validate(),
            Err(RelayError::Validation("instruction"))
        );
        assert_eq!(OutboundRequest::chat("hello").validate(), Ok(()));
    }

    #[test]
    fn test_constructors_trim() {
        assert_eq!(
            OutboundRequest::chat("  hi  "),
            OutboundRequest::Chat {
                message: "hi".to_string()
            }
        );
        assert_eq!(
            OutboundRequest::modify_image(ImageRef::Url(" u ".to_string()), " i "),
            OutboundRequest::ModifyImage {
                image: ImageRef::Url("u".to_string()),
                instruction: "i".to_string()
            }
        );
    }

    #[test]
    fn test_image_ref_to_url() {
        let upload = ImageRef::Bytes {
            data: Bytes::from_static(b"abc"),
            content_type: Some("image/jpeg".to_string()),
        };
        assert_eq!(upload.to_url(), "data:image/jpeg;base64,YWJj");
        assert_eq!(ImageRef::Url("https://a".to_string()).to_url(), "https://a");
    }

    #[tokio::test]
    async fn test_validation_makes_no_outbound_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(chat_reply("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let relay = handler(vec![chat_provider("a", &server, "/a")]);
        let result = relay.handle(OutboundRequest::chat("")).await;

        assert_eq!(result, Err(RelayError::Validation("message")));
    }

    #[tokio::test]
    async fn test_empty_chain_is_not_configured() {
        let relay = handler(vec![]);
        let result = relay.handle(OutboundRequest::chat("hello")).await;
        assert_eq!(result, Err(RelayError::NotConfigured(Operation::Chat)));
    }

    #[tokio::test]
    async fn test_successful_chat_sends_expected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .and(header("authorization", "Bearer a-key"))
            .and(body_json(serde_json::json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(chat_reply("hi there"))
            .expect(1)
            .mount(&server)
            .await;

        let relay = handler(vec![chat_provider("a", &server, "/a")]);
        let result = relay.handle(OutboundRequest::chat("hello")).await;

        assert_eq!(
            result,
            Ok(RelayOutput::Text {
                content: "hi there".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_single_provider_failure_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let relay = handler(vec![chat_provider("a", &server, "/a")]);
        let err = relay.handle(OutboundRequest::chat("hello")).await.unwrap_err();

        assert_eq!(
            err,
            RelayError::Upstream {
                provider: "a".to_string(),
                status: 503,
                body: "overloaded".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_upstream_error_body_is_kept_whole() {
        let server = MockServer::start().await;
        let body = "E".repeat(5000);
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(503).set_body_string(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let relay = handler(vec![chat_provider("a", &server, "/a")]);
        let err = relay.handle(OutboundRequest::chat("hello")).await.unwrap_err();

        assert_eq!(
            err,
            RelayError::Upstream {
                provider: "a".to_string(),
                status: 503,
                body,
            }
        );
    }

    #[tokio::test]
    async fn test_fallback_stops_at_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(chat_reply("from b"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/c"))
            .respond_with(chat_reply("from c"))
            .expect(0)
            .mount(&server)
            .await;

        let relay = handler(vec![
            chat_provider("a", &server, "/a"),
            chat_provider("b", &server, "/b"),
            chat_provider("c", &server, "/c"),
        ]);
        let result = relay.handle(OutboundRequest::chat("hello")).await;

        assert_eq!(
            result,
            Ok(RelayOutput::Text {
                content: "from b".to_string()
            })
        );

        let paths: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/a", "/b"]);
    }

    #[tokio::test]
    async fn test_missing_field_triggers_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"weird": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(chat_reply("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let relay = handler(vec![
            chat_provider("a", &server, "/a"),
            chat_provider("b", &server, "/b"),
        ]);

        assert_matches!(
            relay.handle(OutboundRequest::chat("hello")).await,
            Ok(RelayOutput::Text { content }) if content == "ok"
        );
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let relay = handler(vec![
            chat_provider("a", &server, "/a"),
            chat_provider("b", &server, "/b"),
        ]);
        let err = relay.handle(OutboundRequest::chat("hello")).await.unwrap_err();

        assert_eq!(err.to_string(), "all providers failed");
        assert_eq!(err.status().as_u16(), 502);
        assert_matches!(err, RelayError::Exhausted { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert_matches!(&attempts[0], RelayError::Upstream { status: 429, .. });
            assert_matches!(&attempts[1], RelayError::NoValidField { body, .. } if body == "not json");
        });
    }

    #[tokio::test]
    async fn test_transport_error_is_bad_gateway() {
        // Nothing listens on the discard port.
        let provider = ProviderConfig::new(
            "offline",
            Operation::Chat,
            "http://127.0.0.1:9/chat",
            "key",
            PayloadShape::OpenAiChat {
                model: "m".to_string(),
            },
            Duration::from_secs(2),
        );
        let relay = handler(vec![provider]);

        let err = relay.handle(OutboundRequest::chat("hello")).await.unwrap_err();
        assert_matches!(err, RelayError::Transport { ref provider, .. } if provider == "offline");
        assert_eq!(err.status().as_u16(), 502);
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(chat_reply("late").set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut provider = chat_provider("slow", &server, "/slow");
        provider.timeout = Duration::from_millis(50);
        let relay = handler(vec![provider]);

        let err = relay.handle(OutboundRequest::chat("hello")).await.unwrap_err();
        assert_matches!(err, RelayError::Transport { .. });
    }

    #[tokio::test]
    async fn test_repeated_requests_are_identical() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(chat_reply("same"))
            .expect(2)
            .mount(&server)
            .await;

        let relay = handler(vec![chat_provider("a", &server, "/a")]);
        let first = relay.handle(OutboundRequest::chat("hello")).await;
        let second = relay.handle(OutboundRequest::chat("hello")).await;

        assert!(first.is_ok());
        assert_eq!(first, second);
    }
}
