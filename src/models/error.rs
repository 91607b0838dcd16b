//! Error types for shiksha.
//!
//! The taxonomy separates what the caller can do about a failure:
//! - `QuotaExceeded`: recoverable by waiting and resubmitting
//! - `InvalidRequest`: never recoverable, fix the request
//! - `GenerationFailed` / `EmptyResponse`: provider-side, retries already spent
//! - `Timeout` / `Cancelled`: the caller's own deadline fired

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for shiksha.
#[derive(Debug, Error)]
pub enum ShikshaError {
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    /// Malformed prompt or attachment. Surfaced immediately, never retried.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider kept reporting rate-limit errors after every retry.
    #[error("Quota exceeded after {attempts} attempts; wait a minute and resubmit")]
    QuotaExceeded { attempts: u32 },

    /// Provider-side generation error after exhausting retry and
    /// prompt-simplification attempts.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// The call nominally succeeded but the provider returned no usable text.
    #[error("Provider returned an empty response")]
    EmptyResponse,

    /// A caller-supplied deadline elapsed while waiting on the throttle,
    /// a backoff, or the provider itself.
    #[error("Request deadline of {0:?} elapsed")]
    Timeout(Duration),

    /// The request was aborted before a terminal outcome.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShikshaError {
    /// Whether resubmitting the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }
}

/// Result type alias for shiksha.
pub type Result<T> = std::result::Result<T, ShikshaError>;
