//! Quota-aware throttled generation client.
//!
//! The provider quota is a global per-process budget, so every dispatch is
//! paced against a single last-dispatch instant: the gate mutex is held
//! across the spacing sleep, which means two concurrent callers can never
//! both read a stale timestamp and dispatch inside the minimum interval.
//! Retries use exponential backoff with jitter for quota errors, one
//! prompt simplification for model errors, and linear backoff for anything
//! unclassified. Invalid requests fail immediately.

use chrono::Utc;
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use crate::client::provider::{ErrorClass, Provider, classify};
use crate::models::{
    Config, GenerationRequest, RequestRecord, Result, ShikshaError, ThrottleConfig, UsageStats,
};

/// Entries kept in the internal request log.
const LOG_CAPACITY: usize = 32;

/// Entries reported by `usage_stats`.
const STATS_WINDOW: usize = 5;

/// Mutable client state: counters and the request log.
///
/// Owned exclusively by [`ThrottledClient`]; `request_count` only grows and
/// log entries are immutable once written.
struct ClientState {
    request_count: u64,
    log: VecDeque<RequestRecord>,
    started: Instant,
}

/// Throttled generation client.
///
/// Wraps an arbitrary [`Provider`] with quota discipline: minimum spacing
/// between dispatches, classified retries, and usage tracking. One instance
/// per process-level quota; thin callers share it behind an `Arc`.
pub struct ThrottledClient<P> {
    provider: P,
    config: ThrottleConfig,
    system_instruction: String,
    /// Last dispatch instant. The lock is held across the spacing sleep so
    /// spacing is always computed against a consistent prior value.
    gate: tokio::sync::Mutex<Option<Instant>>,
    state: std::sync::Mutex<ClientState>,
}

impl<P: Provider> ThrottledClient<P> {
    pub fn new(provider: P, config: ThrottleConfig, system_instruction: impl Into<String>) -> Self {
        Self {
            provider,
            config,
            system_instruction: system_instruction.into(),
            gate: tokio::sync::Mutex::new(None),
            state: std::sync::Mutex::new(ClientState {
                request_count: 0,
                log: VecDeque::with_capacity(LOG_CAPACITY),
                started: Instant::now(),
            }),
        }
    }

    /// Convenience constructor from the full application config.
    pub fn from_config(provider: P, config: &Config) -> Self {
        Self::new(
            provider,
            config.throttle,
            config.generation.system_instruction.clone(),
        )
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Generate content for a request.
    ///
    /// Counts the call and logs it exactly once, regardless of how many
    /// attempts the retry policy spends. A deadline on the request bounds
    /// the whole call, throttle and backoff waits included.
    pub async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let sequence = self.record_request(&request);

        if request.prompt.trim().is_empty() {
            return Err(ShikshaError::InvalidRequest("prompt is empty".to_string()));
        }

        let attempts = request.max_retries.unwrap_or(self.config.max_retries).max(1);
        debug!(sequence, attempts, "generation request accepted");

        match request.deadline {
            Some(deadline) => match timeout(deadline, self.drive(&request, attempts, sequence)).await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!(sequence, deadline_secs = deadline.as_secs_f64(), "request deadline elapsed");
                    Err(ShikshaError::Timeout(deadline))
                }
            },
            None => self.drive(&request, attempts, sequence).await,
        }
    }

    /// Current usage statistics, derived on demand.
    ///
    /// Both rate figures are zero-guarded: a client that has existed for no
    /// measurable time reports 0, not a division error.
    pub fn usage_stats(&self) -> UsageStats {
        let state = self.state.lock().expect("client state lock poisoned");
        let runtime_secs = state.started.elapsed().as_secs_f64();
        let runtime_minutes = runtime_secs / 60.0;

        let requests_per_minute = if runtime_secs > 0.0 {
            state.request_count as f64 / runtime_minutes
        } else {
            0.0
        };
        let quota_usage_percent = if runtime_secs > 0.0 {
            requests_per_minute / f64::from(self.config.requests_per_minute.max(1)) * 100.0
        } else {
            0.0
        };

        let mut last_requests: Vec<RequestRecord> =
            state.log.iter().rev().take(STATS_WINDOW).cloned().collect();
        last_requests.reverse();

        UsageStats {
            total_requests: state.request_count,
            runtime_minutes,
            requests_per_minute,
            quota_limit: self.config.requests_per_minute,
            quota_usage_percent,
            last_requests,
        }
    }

    /// Attempt loop: pace, dispatch, classify, back off.
    async fn drive(&self, request: &GenerationRequest, attempts: u32, sequence: u64) -> Result<String> {
        let min_delay = self.config.min_delay();
        let mut user_prompt = request.prompt.clone();
        let mut simplified = false;

        for attempt in 0..attempts {
            self.pace(min_delay).await;

            let prompt = format!("{}\n\n{}", self.system_instruction, user_prompt);
            debug!(sequence, attempt = attempt + 1, total = attempts, "dispatching");

            let error = match self
                .provider
                .generate(&prompt, request.attachment.as_ref())
                .await
            {
                Ok(raw) => {
                    if raw.text.trim().is_empty() {
                        return Err(ShikshaError::EmptyResponse);
                    }
                    debug!(sequence, chars = raw.text.len(), "generation succeeded");
                    return Ok(raw.text);
                }
                Err(e) => e,
            };

            let last = attempt + 1 == attempts;
            match classify(&error) {
                ErrorClass::InvalidRequest => {
                    return Err(ShikshaError::InvalidRequest(error.message));
                }
                ErrorClass::RateLimited => {
                    if last {
                        return Err(ShikshaError::QuotaExceeded { attempts });
                    }
                    let backoff = rate_limit_backoff(min_delay, attempt);
                    warn!(
                        sequence,
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    sleep(backoff).await;
                }
                ErrorClass::ModelError => {
                    if last || simplified {
                        return Err(ShikshaError::GenerationFailed(error.message));
                    }
                    user_prompt = simplify_prompt(&user_prompt);
                    simplified = true;
                    warn!(sequence, attempt = attempt + 1, "model error, retrying with simplified prompt");
                }
                ErrorClass::Unknown => {
                    if last {
                        return Err(ShikshaError::GenerationFailed(error.message));
                    }
                    let backoff = Duration::from_secs(2) * (attempt + 1);
                    warn!(
                        sequence,
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs(),
                        error = %error,
                        "unclassified error, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }

        Err(ShikshaError::Internal(
            "retry loop exited without an outcome".to_string(),
        ))
    }

    /// Enforce minimum spacing, then stamp the dispatch time.
    async fn pace(&self, min_delay: Duration) {
        let mut gate = self.gate.lock().await;
        if let Some(last) = *gate {
            let elapsed = last.elapsed();
            if elapsed < min_delay {
                let wait = min_delay - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "throttling before dispatch");
                sleep(wait).await;
            }
        }
        *gate = Some(Instant::now());
    }

    /// Count the call and append its log entry. Happens once per call.
    fn record_request(&self, request: &GenerationRequest) -> u64 {
        let mut state = self.state.lock().expect("client state lock poisoned");
        state.request_count += 1;
        let record = RequestRecord {
            timestamp: Utc::now(),
            sequence: state.request_count,
            prompt_preview: request.preview(),
            has_attachment: request.attachment.is_some(),
        };
        state.log.push_back(record);
        if state.log.len() > LOG_CAPACITY {
            state.log.pop_front();
        }
        state.request_count
    }
}

/// Exponential backoff with jitter for quota errors:
/// `2^(attempt+1) * min_delay + random(0..2s)`.
fn rate_limit_backoff(min_delay: Duration, attempt: u32) -> Duration {
    let exp = (attempt + 1).min(16);
    let jitter = rand::thread_rng().gen_range(0.0..2.0);
    min_delay.mul_f64(2f64.powi(exp as i32)) + Duration::from_secs_f64(jitter)
}

/// Reduce a prompt to its first paragraph plus a generic closing
/// instruction, for one retry after a model-side failure.
fn simplify_prompt(prompt: &str) -> String {
    let first = prompt.split("\n\n").next().unwrap_or(prompt).trim();
    format!("{first}\n\nKeep the response short, simple, and suitable for a classroom.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::provider::{ProviderError, ProviderResult, RawResponse};
    use crate::models::Attachment;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted provider: pops canned results, falls back to a repeating
    /// error, and records every dispatch instant and prompt.
    struct StubProvider {
        script: Mutex<VecDeque<ProviderResult<RawResponse>>>,
        fallback: Option<ProviderError>,
        dispatches: Mutex<Vec<Instant>>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubProvider {
        fn scripted(script: Vec<ProviderResult<RawResponse>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: None,
                dispatches: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn always_failing(error: ProviderError) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Some(error),
                dispatches: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn ok(text: &str) -> ProviderResult<RawResponse> {
            Ok(RawResponse {
                text: text.to_string(),
                model: None,
            })
        }

        fn err(status: Option<u16>, message: &str) -> ProviderResult<RawResponse> {
            Err(ProviderError::new(status, message))
        }

        fn attempts(&self) -> usize {
            self.dispatches.lock().unwrap().len()
        }

        /// Gaps between consecutive dispatch instants.
        fn gaps(&self) -> Vec<Duration> {
            let dispatches = self.dispatches.lock().unwrap();
            dispatches.windows(2).map(|w| w[1] - w[0]).collect()
        }

        fn prompt(&self, index: usize) -> String {
            self.prompts.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        async fn generate(
            &self,
            prompt: &str,
            _attachment: Option<&Attachment>,
        ) -> ProviderResult<RawResponse> {
            self.dispatches.lock().unwrap().push(Instant::now());
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.script.lock().unwrap().pop_front() {
                Some(result) => result,
                None => Err(self
                    .fallback
                    .clone()
                    .expect("stub script exhausted with no fallback")),
            }
        }
    }

    fn client(provider: StubProvider, rpm: u32) -> ThrottledClient<StubProvider> {
        ThrottledClient::new(
            provider,
            ThrottleConfig {
                requests_per_minute: rpm,
                max_retries: 3,
            },
            "You are a helpful teaching assistant.",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_dispatches_respect_min_spacing() {
        let stub = StubProvider::scripted(vec![StubProvider::ok("a"), StubProvider::ok("b")]);
        let client = client(stub, 10);

        client.generate(GenerationRequest::text("first")).await.unwrap();
        client.generate(GenerationRequest::text("second")).await.unwrap();

        let gaps = client.provider().gaps();
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0] >= Duration::from_secs(6), "gap was {:?}", gaps[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn request_count_tracks_calls_not_attempts() {
        let stub = StubProvider::always_failing(ProviderError::new(
            Some(429),
            "429 RESOURCE_EXHAUSTED",
        ));
        let client = client(stub, 10);

        let err = client.generate(GenerationRequest::text("story")).await.unwrap_err();
        assert!(matches!(err, ShikshaError::QuotaExceeded { attempts: 3 }));

        let stats = client.usage_stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(client.provider().attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_backoff_grows_exponentially() {
        let stub = StubProvider::always_failing(ProviderError::new(
            Some(429),
            "429 RESOURCE_EXHAUSTED",
        ));
        let client = client(stub, 10);

        let err = client.generate(GenerationRequest::text("story")).await.unwrap_err();
        assert!(matches!(err, ShikshaError::QuotaExceeded { attempts: 3 }));
        assert_eq!(client.provider().attempts(), 3);

        // min_delay = 6s: waits before retries are >= 2^1*6 and 2^2*6.
        let gaps = client.provider().gaps();
        assert!(gaps[0] >= Duration::from_secs(12), "gap was {:?}", gaps[0]);
        assert!(gaps[1] >= Duration::from_secs(24), "gap was {:?}", gaps[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_when_quota_error_clears() {
        let stub = StubProvider::scripted(vec![
            StubProvider::err(None, "429 RESOURCE_EXHAUSTED"),
            StubProvider::err(None, "429 RESOURCE_EXHAUSTED"),
            StubProvider::ok("the story text"),
        ]);
        let client = client(stub, 10);

        let text = client.generate(GenerationRequest::text("story")).await.unwrap();
        assert_eq!(text, "the story text");
        assert_eq!(client.provider().attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_request_fails_after_one_attempt() {
        let stub = StubProvider::always_failing(ProviderError::new(
            None,
            "INVALID_ARGUMENT: image could not be decoded",
        ));
        let client = client(stub, 10);

        let err = client.generate(GenerationRequest::text("worksheet")).await.unwrap_err();
        assert!(matches!(err, ShikshaError::InvalidRequest(_)));
        assert_eq!(client.provider().attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_prompt_rejected_without_dispatch_but_counted() {
        let stub = StubProvider::scripted(vec![]);
        let client = client(stub, 10);

        let err = client.generate(GenerationRequest::text("   ")).await.unwrap_err();
        assert!(matches!(err, ShikshaError::InvalidRequest(_)));
        assert_eq!(client.provider().attempts(), 0);
        assert_eq!(client.usage_stats().total_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_response_is_its_own_error() {
        let stub = StubProvider::scripted(vec![StubProvider::ok("   ")]);
        let client = client(stub, 10);

        let err = client.generate(GenerationRequest::text("story")).await.unwrap_err();
        assert!(matches!(err, ShikshaError::EmptyResponse));
        assert_eq!(client.provider().attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn model_error_simplifies_prompt_once() {
        let stub = StubProvider::scripted(vec![
            StubProvider::err(Some(500), "INTERNAL: generation failed"),
            StubProvider::ok("done"),
        ]);
        let client = client(stub, 10);

        let prompt = "Write a long worksheet about rivers.\n\nInclude twenty questions with answers.";
        let text = client.generate(GenerationRequest::text(prompt)).await.unwrap();
        assert_eq!(text, "done");
        assert_eq!(client.provider().attempts(), 2);

        let retry_prompt = client.provider().prompt(1);
        assert!(retry_prompt.contains("Write a long worksheet about rivers."));
        assert!(!retry_prompt.contains("twenty questions"));
        assert!(retry_prompt.contains("Keep the response short"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_model_error_is_terminal() {
        let stub = StubProvider::always_failing(ProviderError::new(
            Some(500),
            "INTERNAL: generation failed",
        ));
        let client = client(stub, 10);

        let err = client.generate(GenerationRequest::text("story")).await.unwrap_err();
        assert!(matches!(err, ShikshaError::GenerationFailed(_)));
        // Initial attempt plus the single simplified retry.
        assert_eq!(client.provider().attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_errors_use_linear_backoff() {
        let stub = StubProvider::always_failing(ProviderError::transport(
            "connection reset by peer",
        ));
        // High quota so the linear backoff dominates the spacing floor.
        let client = client(stub, 600);

        let err = client.generate(GenerationRequest::text("story")).await.unwrap_err();
        assert!(matches!(err, ShikshaError::GenerationFailed(_)));
        assert_eq!(client.provider().attempts(), 3);

        let gaps = client.provider().gaps();
        assert!(gaps[0] >= Duration::from_secs(2), "gap was {:?}", gaps[0]);
        assert!(gaps[1] >= Duration::from_secs(4), "gap was {:?}", gaps[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_throttle_wait() {
        let stub = StubProvider::scripted(vec![StubProvider::ok("a")]);
        let client = client(stub, 10);

        client.generate(GenerationRequest::text("first")).await.unwrap();

        // Second call would wait ~6s on the throttle; its 1s deadline wins.
        let err = client
            .generate(GenerationRequest::text("second").with_deadline(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ShikshaError::Timeout(_)));
        assert_eq!(client.provider().attempts(), 1);
        assert_eq!(client.usage_stats().total_requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_client_reports_zeroed_rates() {
        let stub = StubProvider::scripted(vec![]);
        let client = client(stub, 10);

        let stats = client.usage_stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.requests_per_minute, 0.0);
        assert_eq!(stats.quota_usage_percent, 0.0);
        assert_eq!(stats.quota_limit, 10);
        assert!(stats.last_requests.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stats_report_last_five_entries_oldest_first() {
        let stub = StubProvider::always_failing(ProviderError::new(
            None,
            "INVALID_ARGUMENT: nope",
        ));
        let client = client(stub, 600);

        for i in 0..7 {
            let _ = client
                .generate(GenerationRequest::text(format!("prompt {i}")))
                .await;
        }

        let stats = client.usage_stats();
        assert_eq!(stats.total_requests, 7);
        let sequences: Vec<u64> = stats.last_requests.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![3, 4, 5, 6, 7]);
        assert_eq!(stats.last_requests[0].prompt_preview, "prompt 2");
    }

    #[tokio::test(start_paused = true)]
    async fn max_retries_override_is_honored() {
        let stub = StubProvider::always_failing(ProviderError::new(
            Some(429),
            "429 RESOURCE_EXHAUSTED",
        ));
        let client = client(stub, 600);

        let err = client
            .generate(GenerationRequest::text("story").with_max_retries(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ShikshaError::QuotaExceeded { attempts: 1 }));
        assert_eq!(client.provider().attempts(), 1);
    }

    #[test]
    fn simplify_keeps_first_paragraph() {
        let out = simplify_prompt("First part.\n\nSecond part.\n\nThird.");
        assert!(out.starts_with("First part."));
        assert!(!out.contains("Second part."));
        assert!(out.contains("Keep the response short"));
    }

    #[test]
    fn backoff_has_expected_floor() {
        let min_delay = Duration::from_secs(6);
        for attempt in 0..3 {
            let floor = min_delay.mul_f64(2f64.powi(attempt as i32 + 1));
            let backoff = rate_limit_backoff(min_delay, attempt);
            assert!(backoff >= floor);
            assert!(backoff < floor + Duration::from_secs(2));
        }
    }
}
