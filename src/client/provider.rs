//! Provider abstraction and error classification.
//!
//! The throttled client treats the generation provider as an opaque
//! capability: prompt in, text out. Provider failures reach it as a
//! [`ProviderError`] and are mapped to a retry policy by [`classify`],
//! which keeps the mapping table testable apart from the retry loop.

use async_trait::async_trait;

use crate::models::Attachment;

/// Raw response from a provider, before any policy is applied.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// Generated text; may be empty if the provider produced nothing usable
    pub text: String,
    /// Model that actually served the request, when reported
    pub model: Option<String>,
}

/// Error raised by a provider call.
///
/// Carries the HTTP status when one was received and the provider's own
/// message; classification works from both.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// HTTP status code, if the request got far enough to receive one
    pub status: Option<u16>,
    /// Provider-reported message or transport error text
    pub message: String,
}

impl ProviderError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// A transport-level failure with no HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A generation capability.
///
/// Implemented by [`super::GeminiProvider`] for production and by stubs in
/// tests. Implementations perform no throttling or retries of their own.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Dispatch one generation attempt.
    async fn generate(
        &self,
        prompt: &str,
        attachment: Option<&Attachment>,
    ) -> ProviderResult<RawResponse>;
}

/// Retry policy class for a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Quota or rate-limit exhaustion; retry with exponential backoff
    RateLimited,
    /// Malformed request; never retried
    InvalidRequest,
    /// Provider-side generation failure; retry once with a simplified prompt
    ModelError,
    /// Anything else; retry with linear backoff
    Unknown,
}

/// Map a provider error to its retry class.
///
/// HTTP status takes precedence; otherwise the provider's status strings
/// and a few generic substrings decide.
pub fn classify(error: &ProviderError) -> ErrorClass {
    match error.status {
        Some(429) => return ErrorClass::RateLimited,
        Some(400) => return ErrorClass::InvalidRequest,
        Some(500) => return ErrorClass::ModelError,
        _ => {}
    }

    let message = error.message.to_ascii_lowercase();

    if message.contains("429")
        || message.contains("resource_exhausted")
        || message.contains("rate limit")
        || message.contains("quota")
    {
        ErrorClass::RateLimited
    } else if message.contains("invalid_argument")
        || message.contains("invalid argument")
        || message.contains("malformed")
    {
        ErrorClass::InvalidRequest
    } else if message.contains("internal")
        || message.contains("blocked")
        || message.contains("safety")
        || message.contains("recitation")
    {
        ErrorClass::ModelError
    } else {
        ErrorClass::Unknown
    }
}
