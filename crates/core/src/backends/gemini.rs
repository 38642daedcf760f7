use crate::error::PipelineError;
use crate::models::{ChatRole, ChatTurn, ContextEnvelope};
use crate::traits::{EmbeddingBackend, GenerationBackend};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
pub const GEMINI_EMBEDDING_DIMENSIONS: usize = 768;

const BACKEND: &str = "gemini";

fn backend_error(details: impl ToString) -> PipelineError {
    PipelineError::GenerationBackend {
        backend: BACKEND.to_string(),
        details: details.to_string(),
    }
}

fn embedding_error(details: impl ToString) -> PipelineError {
    PipelineError::EmbeddingBackend {
        backend: BACKEND.to_string(),
        details: details.to_string(),
    }
}

/// Gemini `generateContent` client.
pub struct GeminiGenerator {
    endpoint: String,
    model: String,
    api_key: String,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }
}

fn gemini_role(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Assistant => "model",
    }
}

#[async_trait]
impl GenerationBackend for GeminiGenerator {
    async fn generate(
        &self,
        query: &str,
        context: &ContextEnvelope,
        history: &[ChatTurn],
        system_instructions: &str,
    ) -> Result<String, PipelineError> {
        let mut contents: Vec<Value> = history
            .iter()
            .map(|turn| {
                json!({
                    "role": gemini_role(turn.role),
                    "parts": [{"text": turn.content}],
                })
            })
            .collect();
        contents.push(json!({
            "role": "user",
            "parts": [{
                "text": format!("CONTEXT:\n{}\n\nLATEST QUESTION:\n{}", context.render(), query),
            }],
        }));

        let response = self
            .client
            .post(self.generate_url())
            .json(&json!({
                "system_instruction": {"parts": [{"text": system_instructions}]},
                "contents": contents,
                "generationConfig": {
                    "temperature": 0.3,
                    "topK": 30,
                    "topP": 0.95,
                    "maxOutputTokens": 512,
                },
            }))
            .send()
            .await
            .map_err(|error| backend_error(error))?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await.map_err(|error| backend_error(error))?;
        parsed
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| backend_error("response carried no candidate text"))
    }
}

/// Gemini `embedContent` client.
pub struct GeminiEmbedder {
    endpoint: String,
    model: String,
    api_key: String,
    dimensions: usize,
    client: Client,
}

impl GeminiEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            dimensions: GEMINI_EMBEDDING_DIMENSIONS,
            client: Client::new(),
        }
    }

    fn embed_url(&self) -> String {
        format!(
            "{}/models/{}:embedContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let response = self
            .client
            .post(self.embed_url())
            .json(&json!({
                "model": format!("models/{}", self.model),
                "content": {"parts": [{"text": text}]},
            }))
            .send()
            .await
            .map_err(|error| embedding_error(error))?;

        if !response.status().is_success() {
            return Err(embedding_error(response.status()));
        }

        let parsed: Value = response.json().await.map_err(|error| embedding_error(error))?;
        let values = parsed
            .pointer("/embedding/values")
            .and_then(Value::as_array)
            .ok_or_else(|| embedding_error("response carried no embedding values"))?;

        Ok(values
            .iter()
            .filter_map(Value::as_f64)
            .map(|value| value as f32)
            .collect())
    }
}
