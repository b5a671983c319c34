//! Inference Relay - a thin HTTP relay in front of hosted inference providers
//!
//! This library exposes three operations over HTTP and forwards each one to
//! a chain of external providers:
//!
//! - **Chat**: `POST /chat` with `{message}`, answered with `{reply}`
//! - **Image generation**: `POST /generate_image` (alias `/image`)
//! - **Image modification**: `POST /modify_image` (alias `/image_modify`),
//!   JSON or multipart upload
//!
//! Providers are tried in configured order until one succeeds. Generated
//! images can optionally be written to a local directory and served back
//! under `/static`.
//!
//! # Architecture
//!
//! - [`core`]: configuration, errors, logging context, metrics, middleware
//! - [`services`]: provider catalogue, payloads, extraction, artifacts and the relay loop
//! - [`api`]: HTTP handlers, request/response models and the router
//!
//! # Configuration
//!
//! Provider keys are read from `HF_KEY`, `OPENROUTER_API_KEY`, `FAL_KEY`,
//! `DEEPINFRA_API_KEY` and `STABILITY_API_KEY`. Everything else has a default
//! and may be set through an optional `relay.yaml` or `RELAY__*` variables.
//!
//! Optional environment variables:
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 5000)
//! - `VERIFY_SSL`: Verify SSL certificates for upstream (default: true)
//! - `RELAY_CONFIG`: Config file path without extension (default: relay)

pub mod api;
pub mod core;
pub mod services;

// Re-export commonly used types for convenience
pub use api::{router, AppState};
pub use core::{AppConfig, AppError, RelayError, Result};
pub use services::{OutboundRequest, ProviderRegistry, RelayHandler, RelayOutput};
