//! Relay services.
//!
//! Provider catalogue and chains, payload construction, response extraction,
//! artifact storage and the relay handler that ties them together.

pub mod artifacts;
pub mod extract;
pub mod payload;
pub mod provider;
pub mod relay;

// Re-export commonly used types
pub use artifacts::ArtifactStore;
pub use extract::{ExtractionStrategy, UpstreamBody};
pub use payload::{build_payload, OutboundBody};
pub use provider::{
    AuthScheme, Operation, PayloadShape, ProviderConfig, ProviderKind, ProviderRegistry,
};
pub use relay::{ImageRef, OutboundRequest, RelayHandler, RelayOutput, RelayResult};
