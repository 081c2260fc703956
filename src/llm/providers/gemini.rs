//! Google Gemini provider (`models/{model}:generateContent`).
//!
//! Conversation turns map onto Gemini `contents`: `user` stays `user`,
//! `assistant` becomes `model`. The optional system prompt travels as
//! `systemInstruction`. All wire types are private to this module.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::config::ProviderConfig;
use crate::llm::ProviderError;
use crate::llm::providers::check_status;
use crate::subsystems::memory::{Role, Turn};

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.api_base_url.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }

    pub async fn generate(&self, history: &[Turn], system: Option<&str>) -> Result<String, ProviderError> {
        let payload = build_request(history, system, self.temperature);

        debug!(model = %self.model, turns = history.len(), "sending Gemini request");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full Gemini request payload");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(endpoint = %self.endpoint, error = %e, timeout = e.is_timeout(), "Gemini request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let response = check_status(response).await?;

        let parsed = response.json::<GenerateContentResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize Gemini response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                input_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "received Gemini response"
            );
        }

        extract_text(parsed)
    }
}

// ── Wire mapping ──────────────────────────────────────────────────────────────

fn build_request(history: &[Turn], system: Option<&str>, temperature: f32) -> GenerateContentRequest {
    let contents = history
        .iter()
        .map(|t| Content {
            role: Some(match t.role {
                Role::User => "user".to_string(),
                Role::Assistant => "model".to_string(),
            }),
            parts: vec![Part { text: t.content.clone() }],
        })
        .collect();

    GenerateContentRequest {
        contents,
        system_instruction: system.map(|s| Content {
            role: None,
            parts: vec![Part { text: s.to_string() }],
        }),
        generation_config: GenerationConfig { temperature },
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, ProviderError> {
    if let Some(feedback) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Request(format!("prompt blocked: {feedback}")));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Request("no candidates in response".into()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        return Err(ProviderError::Request(format!("empty reply (finish reason: {reason})")));
    }
    Ok(text.to_string())
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_maps_roles_and_system() {
        let history = vec![Turn::user("hi"), Turn::assistant("hello"), Turn::user("how are you")];
        let req = build_request(&history, Some("be brief"), 0.2);
        let v = serde_json::to_value(&req).unwrap();

        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][1]["role"], "model");
        assert_eq!(v["contents"][1]["parts"][0]["text"], "hello");
        assert_eq!(v["contents"][2]["parts"][0]["text"], "how are you");
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(v["systemInstruction"].get("role").is_none());
        assert!((v["generationConfig"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn request_without_system_omits_field() {
        let req = build_request(&[Turn::user("hi")], None, 0.0);
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("systemInstruction").is_none());
    }

    #[test]
    fn text_parts_are_concatenated() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello"}, {"text": " there\n"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2}
        });
        let resp: GenerateContentResponse = serde_json::from_value(body).unwrap();
        assert_eq!(extract_text(resp).unwrap(), "Hello there");
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let resp: GenerateContentResponse = serde_json::from_value(body).unwrap();
        let err = extract_text(resp).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn empty_candidate_reports_finish_reason() {
        let body = json!({"candidates": [{"finishReason": "MAX_TOKENS"}]});
        let resp: GenerateContentResponse = serde_json::from_value(body).unwrap();
        let err = extract_text(resp).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn endpoint_is_built_from_base_and_model() {
        let cfg = ProviderConfig {
            api_base_url: "https://example.test/v1beta/".into(),
            model: "gemini-2.5-flash".into(),
            temperature: 0.2,
            timeout_seconds: 5,
        };
        let p = GeminiProvider::new(&cfg, "key".into()).unwrap();
        assert_eq!(p.endpoint, "https://example.test/v1beta/models/gemini-2.5-flash:generateContent");
    }
}
