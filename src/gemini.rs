use crate::schema::Schema;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use reqwest::Client;
use tracing::{info, error, warn};

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("API error: status={status} body={body}")] Status { status: u16, body: String },
    #[error("Other: {0}")] Other(String),
}

/// Everything one `generateContent` call needs.
#[derive(Debug, Clone, Copy)]
pub struct ContentRequest<'a> {
    pub prompt: &'a str,
    pub schema: &'a Schema,
    pub thinking_budget: u32,
}

/// Outbound side of generation. Exactly one request per call; implementations must not
/// retry or stream.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Returns the final response text, or `None` when the model produced no text.
    async fn generate_content(&self, request: ContentRequest<'_>) -> Result<Option<String>, GeminiError>;
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent?key={}", self.base_url, self.model, self.api_key)
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate_content(&self, request: ContentRequest<'_>) -> Result<Option<String>, GeminiError> {
        let url = self.endpoint();
        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        let body = build_request_body(&request);

        let response = self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(GeminiError::Status { status: status.as_u16(), body: response_text });
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Other(format!("parse error: {}: {}", e, response_text)))?;

        if let Some(reason) = parsed.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref()) {
            warn!("⚠️ Prompt blocked by Gemini: {}", reason);
        }

        let text = extract_text(&parsed);
        match &text {
            Some(t) => info!("✅ Received {} chars of response text", t.len()),
            None => warn!("⚠️ No text content found in response"),
        }
        Ok(text)
    }
}

pub fn build_request_body(request: &ContentRequest<'_>) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{"text": request.prompt}]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.schema,
            "candidateCount": 1,
            "thinkingConfig": {
                "thinkingBudget": request.thinking_budget
            }
        }
    })
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback { #[serde(default)] block_reason: Option<String> }

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

/// Concatenated answer text of the first candidate. Thought summaries are skipped.
fn extract_text(resp: &GeminiResponse) -> Option<String> {
    let candidate = resp.candidates.first()?;
    let text: String = candidate.content.parts.iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text.as_deref())
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::cloud_solution_schema;
    use pretty_assertions::assert_eq;

    fn parse(raw: &str) -> GeminiResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn request_body_binds_schema_and_budget() {
        let body = build_request_body(&ContentRequest {
            prompt: "design it",
            schema: cloud_solution_schema(),
            thinking_budget: 1024,
        });
        assert_eq!(body["contents"][0]["parts"][0]["text"], "design it");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], 1024);
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn extracts_text_and_skips_thoughts() {
        let resp = parse(r#"{"candidates":[{"content":{"parts":[
            {"text":"planning the VPC layout","thought":true},
            {"text":"{\"title\":"},
            {"text":"\"x\"}"}
        ]}}]}"#);
        assert_eq!(extract_text(&resp).as_deref(), Some(r#"{"title":"x"}"#));
    }

    #[test]
    fn missing_or_blank_text_is_none() {
        assert_eq!(extract_text(&parse(r#"{"candidates":[]}"#)), None);
        assert_eq!(extract_text(&parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)), None);
        assert_eq!(extract_text(&parse(r#"{"candidates":[{"content":{"parts":[{"text":"  \n"}]}}]}"#)), None);
        assert_eq!(extract_text(&parse(r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#)), None);
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new("k".into(), "https://example.test/v1beta/".into(), "gemini-3-pro-preview".into());
        assert_eq!(client.endpoint(), "https://example.test/v1beta/models/gemini-3-pro-preview:generateContent?key=k");
    }
}
