//! shiksha - quota-aware AI content generation for multi-grade classrooms.
//!
//! ## Architecture
//!
//! - **Throttled client**: serializes access to a quota-limited generation
//!   provider, enforces minimum spacing between dispatches, retries
//!   classified failures with backoff, and tracks usage.
//! - **Provider**: pluggable `generate(prompt, attachment?) -> text`
//!   capability; the Gemini REST backend is the production implementation,
//!   stubs stand in for it under test.
//! - **Content builders**: thin per-content-type callers (stories,
//!   worksheets, games, lesson plans, ...) that only format a prompt and
//!   forward it.
//!
//! The quota is a global per-process budget: one `ThrottledClient` per
//! process, shared by every caller.

pub mod client;
pub mod content;
pub mod models;

// Re-exports for convenience
pub use client::{GeminiProvider, Provider, ThrottledClient};
pub use models::{
    Attachment, Config, GenerationRequest, Result, ShikshaError, ThrottleConfig, UsageStats,
};
