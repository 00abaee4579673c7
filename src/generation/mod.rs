//! Architecture generation: prompt, one schema-bound backend call, strict decode.

mod parse;
mod prompt;

pub use parse::{parse_solution, ParseError};
pub use prompt::{build_prompt, REQUIREMENTS};

use crate::gemini::{ContentRequest, GeminiError, GenerationBackend};
use crate::models::{CloudSolution, GenerationRequest};
use crate::schema::cloud_solution_schema;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend returned no text")]
    EmptyResponse,
    #[error("failed to parse architecture data: {source}")]
    MalformedResponse {
        #[source]
        source: ParseError,
        raw: String,
    },
    #[error("generation backend failed: {0}")]
    Backend(#[from] GeminiError),
}

impl GenerationError {
    /// What the UI shows; details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        "Failed to generate solution. Please try again or check your API key/connection."
    }
}

pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    thinking_budget: u32,
}

impl GenerationClient {
    pub const DEFAULT_THINKING_BUDGET: u32 = 1024;

    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend, thinking_budget: Self::DEFAULT_THINKING_BUDGET }
    }

    pub fn with_thinking_budget(mut self, thinking_budget: u32) -> Self {
        self.thinking_budget = thinking_budget;
        self
    }

    /// Single attempt: no retry, no caching, no partial result.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<CloudSolution, GenerationError> {
        let prompt = build_prompt(request);
        let schema = cloud_solution_schema();
        info!(provider = %request.provider(), prompt_chars = prompt.len(), "🚀 Generating architecture");

        let text = self.backend
            .generate_content(ContentRequest { prompt: &prompt, schema, thinking_budget: self.thinking_budget })
            .await?
            .ok_or(GenerationError::EmptyResponse)?;

        match parse_solution(&text, schema, request.provider()) {
            Ok(solution) => {
                info!(
                    title = %solution.title,
                    services = solution.tech_stack.iter().map(|t| t.services.len()).sum::<usize>(),
                    steps = solution.walkthrough.len(),
                    "✅ Architecture generated"
                );
                Ok(solution)
            }
            Err(source) => {
                error!("❌ Failed to parse architecture data: {}: {}", source, text);
                Err(GenerationError::MalformedResponse { source, raw: text })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = include_str!("../../tests/fixtures/aws_ecommerce.json");

    enum Reply {
        Text(&'static str),
        Nothing,
        Status(u16),
    }

    struct ScriptedBackend {
        reply: Reply,
        seen: Mutex<Vec<(String, u32, bool)>>,
    }

    impl ScriptedBackend {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self { reply, seen: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate_content(&self, request: ContentRequest<'_>) -> Result<Option<String>, GeminiError> {
            let bound = std::ptr::eq(request.schema, cloud_solution_schema());
            self.seen.lock().push((request.prompt.to_string(), request.thinking_budget, bound));
            match self.reply {
                Reply::Text(t) => Ok(Some(t.to_string())),
                Reply::Nothing => Ok(None),
                Reply::Status(status) => Err(GeminiError::Status { status, body: "quota".into() }),
            }
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            "Highly available e-commerce platform, 1M concurrent users, microservices, payments/order isolation, multi-region DR",
            Provider::Aws,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn issues_one_schema_bound_call() {
        let backend = ScriptedBackend::new(Reply::Text(SAMPLE));
        let client = GenerationClient::new(backend.clone());
        let solution = client.generate(&request()).await.unwrap();

        assert_eq!(solution.provider, Provider::Aws);
        let seen = backend.seen.lock();
        assert_eq!(seen.len(), 1);
        let (prompt, budget, bound) = &seen[0];
        assert!(prompt.contains("multi-region DR"));
        assert_eq!(*budget, GenerationClient::DEFAULT_THINKING_BUDGET);
        assert!(*bound);
    }

    #[tokio::test]
    async fn empty_payload_is_empty_response() {
        let backend = ScriptedBackend::new(Reply::Nothing);
        let err = GenerationClient::new(backend.clone()).generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
        assert_eq!(backend.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_keeps_raw_text() {
        let backend = ScriptedBackend::new(Reply::Text("{\"title\": \"half"));
        let err = GenerationClient::new(backend.clone()).generate(&request()).await.unwrap_err();
        match err {
            GenerationError::MalformedResponse { source, raw } => {
                assert!(matches!(source, ParseError::Syntax(_)));
                assert_eq!(raw, "{\"title\": \"half");
            }
            other => panic!("unexpected: {other:?}"),
        }
        // Failures are not retried.
        assert_eq!(backend.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_backend_error() {
        let backend = ScriptedBackend::new(Reply::Status(429));
        let client = GenerationClient::new(backend).with_thinking_budget(2048);
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Backend(GeminiError::Status { status: 429, .. })));
    }

    #[tokio::test]
    async fn custom_thinking_budget_is_forwarded() {
        let backend = ScriptedBackend::new(Reply::Text(SAMPLE));
        let client = GenerationClient::new(backend.clone()).with_thinking_budget(2048);
        client.generate(&request()).await.unwrap();
        assert_eq!(backend.seen.lock()[0].1, 2048);
    }
}
