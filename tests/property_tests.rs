//! Property-based tests for the inference relay.
//!
//! These tests use proptest to check properties of request validation,
//! response extraction and error status mapping for arbitrary inputs.

use base64::Engine as _;
use bytes::Bytes;
use inference_relay::{
    core::RelayError,
    services::{
        extract::{decode_base64, extract, truncate_for_diagnostics, MAX_DIAGNOSTIC_BODY_LEN},
        ExtractionStrategy, ImageRef, OutboundRequest, RelayOutput, UpstreamBody,
    },
};
use proptest::prelude::*;
use serde_json::json;

fn json_body(value: serde_json::Value) -> UpstreamBody {
    UpstreamBody::new(
        Some("application/json".to_string()),
        Bytes::from(value.to_string()),
    )
}

fn strategy() -> impl Strategy<Value = ExtractionStrategy> {
    prop_oneof![
        Just(ExtractionStrategy::ChatContent),
        Just(ExtractionStrategy::GeneratedText),
        Just(ExtractionStrategy::RawImage),
        Just(ExtractionStrategy::ImagesBase64),
        Just(ExtractionStrategy::ImagesUrl),
        Just(ExtractionStrategy::DataB64Json),
        Just(ExtractionStrategy::DataUrl),
        Just(ExtractionStrategy::ArtifactsBase64),
    ]
}

proptest! {
    /// Property: whitespace-only messages never pass validation
    #[test]
    fn prop_blank_message_is_rejected(message in "[ \t\n]{0,20}") {
        prop_assert_eq!(
            OutboundRequest::chat(&message).validate(),
            Err(RelayError::Validation("message"))
        );
        prop_assert_eq!(
            OutboundRequest::generate_image(&message).validate(),
            Err(RelayError::Validation("message"))
        );
    }

    /// Property: any message with a visible character passes validation
    #[test]
    fn prop_non_blank_message_is_accepted(message in "[ ]{0,3}[a-zA-Z0-9]{1,40}[ ]{0,3}") {
        let request = OutboundRequest::chat(&message);
        prop_assert_eq!(request.validate(), Ok(()));
        prop_assert_eq!(request, OutboundRequest::chat(message.trim()));
    }

    /// Property: a modify request needs both an image and an instruction
    #[test]
    fn prop_modify_requires_both_fields(
        url in "(https://[a-z]{1,10}\\.com/[a-z]{1,10}\\.png)?",
        instruction in "([a-z ]{1,20})?",
    ) {
        let result = OutboundRequest::modify_image(ImageRef::Url(url.clone()), &instruction).validate();
        match (url.is_empty(), instruction.trim().is_empty()) {
            (true, _) => prop_assert_eq!(result, Err(RelayError::Validation("image_url"))),
            (false, true) => prop_assert_eq!(result, Err(RelayError::Validation("instruction"))),
            (false, false) => prop_assert_eq!(result, Ok(())),
        }
    }

    /// Property: chat content is extracted verbatim
    #[test]
    fn prop_chat_content_round_trips(content in "\\PC{1,200}") {
        let body = json_body(json!({"choices": [{"message": {"content": content}}]}));
        prop_assert_eq!(
            extract(&[ExtractionStrategy::ChatContent], &body),
            Some(RelayOutput::Text { content })
        );
    }

    /// Property: base64 image payloads decode to the original bytes
    #[test]
    fn prop_base64_images_decode(data in prop::collection::vec(any::<u8>(), 1..512)) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
        let body = json_body(json!({"data": [{"b64_json": encoded}]}));
        prop_assert_eq!(
            extract(&[ExtractionStrategy::DataB64Json], &body),
            Some(RelayOutput::ImageBytes { data: Bytes::from(data) })
        );
    }

    /// Property: the first matching strategy wins regardless of what follows
    #[test]
    fn prop_first_matching_strategy_wins(rest in prop::collection::vec(strategy(), 0..8)) {
        let body = json_body(json!({
            "choices": [{"message": {"content": "chat"}}],
            "generated_text": "generated",
            "data": [{"url": "https://x/y.png"}]
        }));
        let mut strategies = vec![ExtractionStrategy::DataUrl];
        strategies.extend(rest);
        prop_assert_eq!(
            extract(&strategies, &body),
            Some(RelayOutput::ImageUrl { url: "https://x/y.png".to_string() })
        );
    }

    /// Property: an empty JSON object matches no strategy
    #[test]
    fn prop_empty_object_matches_nothing(strategies in prop::collection::vec(strategy(), 0..8)) {
        prop_assert_eq!(extract(&strategies, &json_body(json!({}))), None);
    }

    /// Property: extraction never panics on arbitrary bodies
    #[test]
    fn prop_extract_arbitrary_bytes(
        data in prop::collection::vec(any::<u8>(), 0..256),
        strategies in prop::collection::vec(strategy(), 0..8),
    ) {
        let body = UpstreamBody::new(None, Bytes::from(data));
        let _ = extract(&strategies, &body);
    }

    /// Property: diagnostics are bounded and keep short bodies intact
    #[test]
    fn prop_truncation_is_bounded(text in "\\PC{0,3000}") {
        let truncated = truncate_for_diagnostics(&text);
        prop_assert!(truncated.len() <= MAX_DIAGNOSTIC_BODY_LEN + 3);
        if text.len() <= MAX_DIAGNOSTIC_BODY_LEN {
            prop_assert_eq!(truncated, text);
        }
    }

    /// Property: garbage never decodes to an empty image
    #[test]
    fn prop_decode_base64_never_empty(text in "\\PC{0,64}") {
        if let Some(data) = decode_base64(&text) {
            prop_assert!(!data.is_empty());
        }
    }

    /// Property: upstream client and server errors keep their status
    #[test]
    fn prop_upstream_error_status_passthrough(status in 400u16..600) {
        let err = RelayError::Upstream {
            provider: "p".to_string(),
            status,
            body: String::new(),
        };
        prop_assert_eq!(err.status().as_u16(), status);
    }

    /// Property: non-error upstream statuses are reported as bad gateway
    #[test]
    fn prop_non_error_status_is_bad_gateway(status in 100u16..400) {
        let err = RelayError::Upstream {
            provider: "p".to_string(),
            status,
            body: String::new(),
        };
        prop_assert_eq!(err.status().as_u16(), 502);
    }
}
