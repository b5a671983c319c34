//! Logging utilities with request and provider context.
//!
//! Task-local values let log lines emitted deep inside a relay call carry
//! the inbound request ID and the provider currently being attempted
//! without threading them through every function.

tokio::task_local! {
    /// Task-local storage for the provider currently being attempted.
    pub static PROVIDER_CONTEXT: String;
}

tokio::task_local! {
    /// Task-local storage for the current request ID.
    pub static REQUEST_ID: String;
}

/// Header used to propagate request IDs in and out of the relay.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Get the current provider name from context, if set.
///
/// Returns an empty string if no provider context is set.
pub fn get_provider_context() -> String {
    PROVIDER_CONTEXT
        .try_with(|ctx| ctx.clone())
        .unwrap_or_default()
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
