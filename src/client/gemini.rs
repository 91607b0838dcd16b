//! Gemini `generateContent` REST provider.
//!
//! Speaks the v1beta API directly over reqwest. Attachments travel as
//! inline base64 data alongside the prompt text. This layer performs no
//! throttling or retries; failures surface as [`ProviderError`] for the
//! throttled client to classify.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::client::provider::{Provider, ProviderError, ProviderResult, RawResponse};
use crate::models::{Attachment, ProviderConfig, Result, ShikshaError};

/// Content part in a Gemini request or response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

/// Inline binary payload (images, scans).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    /// base64-encoded bytes
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f64,
    top_p: f64,
    max_output_tokens: u32,
}

/// `generateContent` request payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationParams,
}

/// `generateContent` response payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Error envelope returned on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    message: String,
    /// gRPC-style status string, e.g. "RESOURCE_EXHAUSTED"
    #[serde(default)]
    status: Option<String>,
}

/// Gemini REST provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    top_p: f64,
    max_output_tokens: u32,
}

impl GeminiProvider {
    /// Build a provider from config and a resolved API key.
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ShikshaError::Network)?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_output_tokens: config.max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("x-goog-api-key", key);
        }
        headers
    }

    fn build_request(&self, prompt: &str, attachment: Option<&Attachment>) -> GenerateContentRequest {
        let mut parts = Vec::with_capacity(2);

        // Image first, then the instruction text, matching the API examples
        if let Some(att) = attachment {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: att.mime_type.clone(),
                    data: att.to_base64(),
                },
            });
        }
        parts.push(Part::Text {
            text: prompt.to_string(),
        });

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationParams {
                temperature: self.temperature,
                top_p: self.top_p,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    fn extract_text(response: GenerateContentResponse) -> RawResponse {
        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::Text { text } => Some(text.as_str()),
                        Part::InlineData { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        RawResponse {
            text,
            model: response.model_version,
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn generate(
        &self,
        prompt: &str,
        attachment: Option<&Attachment>,
    ) -> ProviderResult<RawResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = self.build_request(prompt, attachment);

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error = match serde_json::from_str::<ApiErrorResponse>(&error_body) {
                Ok(api_error) => {
                    let status_str = api_error.error.status.unwrap_or_default();
                    ProviderError::new(
                        api_error.error.code.or(Some(status.as_u16())),
                        format!("{status_str} {}", api_error.error.message),
                    )
                }
                Err(_) => ProviderError::new(Some(status.as_u16()), error_body),
            };
            return Err(error);
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(format!("failed to parse response: {e}")))?;

        let raw = Self::extract_text(parsed);
        debug!(
            model = %self.model,
            chars = raw.text.len(),
            "Gemini response received"
        );
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(&ProviderConfig::default(), "test-key".to_string()).unwrap()
    }

    #[test]
    fn request_body_carries_inline_image_before_text() {
        let att = Attachment::new("image/jpeg", vec![1, 2, 3]);
        let req = provider().build_request("describe this page", Some(&att));

        let json = serde_json::to_value(&req).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["text"], "describe this page");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8000);
    }

    #[test]
    fn text_only_request_has_single_part() {
        let req = provider().build_request("hello", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["contents"][0]["parts"].as_array().unwrap().len(), 1);
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[test]
    fn extract_text_joins_candidate_parts() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "Once upon"}, {"text": " a time"}]
                }
            }],
            "modelVersion": "gemini-1.5-flash-002"
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        let raw = GeminiProvider::extract_text(parsed);
        assert_eq!(raw.text, "Once upon a time");
        assert_eq!(raw.model.as_deref(), Some("gemini-1.5-flash-002"));
    }

    #[test]
    fn extract_text_handles_empty_candidates() {
        let parsed: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        let raw = GeminiProvider::extract_text(parsed);
        assert!(raw.text.is_empty());
    }

    #[test]
    fn error_envelope_parses_status_string() {
        let body = r#"{
            "error": {
                "code": 429,
                "message": "Resource has been exhausted",
                "status": "RESOURCE_EXHAUSTED"
            }
        }"#;
        let parsed: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.code, Some(429));
        assert_eq!(parsed.error.status.as_deref(), Some("RESOURCE_EXHAUSTED"));
    }
}
