//! Request, log-record, and usage-stats types.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{Result, ShikshaError};

/// Length of the prompt preview stored in the request log.
const PREVIEW_LEN: usize = 80;

/// A binary attachment to a generation request (typically a textbook photo).
#[derive(Debug, Clone)]
pub struct Attachment {
    /// MIME type, e.g. "image/jpeg"
    pub mime_type: String,
    /// Decoded bytes
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Decode a base64 payload as received from an upload layer.
    pub fn from_base64(mime_type: impl Into<String>, encoded: &str) -> Result<Self> {
        let data = BASE64
            .decode(encoded.trim())
            .map_err(|e| ShikshaError::InvalidRequest(format!("attachment is not valid base64: {e}")))?;
        Ok(Self::new(mime_type, data))
    }

    /// Re-encode the bytes for providers that take inline base64 data.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }
}

/// A content-generation request.
///
/// Built by the thin prompt builders in [`crate::content`] or directly by a
/// caller; consumed by [`crate::client::ThrottledClient`].
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// User prompt (must be non-empty)
    pub prompt: String,

    /// Optional binary attachment
    pub attachment: Option<Attachment>,

    /// Override for the configured total attempt count (>= 1)
    pub max_retries: Option<u32>,

    /// Deadline for the whole call, including throttle and backoff waits.
    /// When it elapses the call aborts with `Timeout` instead of blocking.
    pub deadline: Option<Duration>,
}

impl GenerationRequest {
    /// A plain text request.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachment: None,
            max_retries: None,
            deadline: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Truncated prompt preview for the request log.
    pub(crate) fn preview(&self) -> String {
        let trimmed = self.prompt.trim();
        if trimmed.chars().count() <= PREVIEW_LEN {
            trimmed.to_string()
        } else {
            trimmed.chars().take(PREVIEW_LEN).collect()
        }
    }
}

/// One entry in the request log. Written once per `generate` call,
/// immutable afterwards; retries do not touch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Wall-clock time the call was accepted
    pub timestamp: DateTime<Utc>,
    /// Monotonic sequence number (1-based)
    pub sequence: u64,
    /// First characters of the prompt
    pub prompt_preview: String,
    /// Whether the request carried an attachment
    pub has_attachment: bool,
}

/// Point-in-time usage summary, derived from client state on demand.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    /// Calls to `generate` since the client was created
    pub total_requests: u64,
    /// Minutes since the client was created
    pub runtime_minutes: f64,
    /// Observed request rate; 0 when runtime is 0
    pub requests_per_minute: f64,
    /// Configured quota (requests per minute)
    pub quota_limit: u32,
    /// Observed rate as a percentage of the quota; 0 when runtime is 0
    pub quota_usage_percent: f64,
    /// Most recent log entries, oldest first
    pub last_requests: Vec<RequestRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_base64_round_trip() {
        let att = Attachment::from_base64("image/png", "aGVsbG8=").unwrap();
        assert_eq!(att.data, b"hello");
        assert_eq!(att.to_base64(), "aGVsbG8=");
    }

    #[test]
    fn attachment_rejects_garbage_base64() {
        let err = Attachment::from_base64("image/png", "!!not base64!!").unwrap_err();
        assert!(matches!(err, ShikshaError::InvalidRequest(_)));
    }

    #[test]
    fn preview_truncates_long_prompts() {
        let req = GenerationRequest::text("x".repeat(500));
        assert_eq!(req.preview().chars().count(), 80);

        let short = GenerationRequest::text("  short prompt  ");
        assert_eq!(short.preview(), "short prompt");
    }
}
