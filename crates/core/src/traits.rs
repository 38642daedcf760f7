use crate::error::PipelineError;
use crate::models::{ChatTurn, ContextEnvelope, Relation};
use async_trait::async_trait;

/// Turns text into a fixed-length embedding vector. Implementations may
/// call out over the network; callers must treat `embed` as a suspend
/// point that runs to completion or failure.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
}

/// External language-model backend. The assembled context is the source
/// of truth for the generated answer: the backend must not fabricate
/// facts absent from it.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        query: &str,
        context: &ContextEnvelope,
        history: &[ChatTurn],
        system_instructions: &str,
    ) -> Result<String, PipelineError>;
}

/// Relational storage collaborator: evaluates a query and returns a
/// tabular relation.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<Relation, PipelineError>;
}

#[async_trait]
impl EmbeddingBackend for Box<dyn EmbeddingBackend> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        (**self).embed(text).await
    }
}

#[async_trait]
impl GenerationBackend for Box<dyn GenerationBackend> {
    async fn generate(
        &self,
        query: &str,
        context: &ContextEnvelope,
        history: &[ChatTurn],
        system_instructions: &str,
    ) -> Result<String, PipelineError> {
        (**self)
            .generate(query, context, history, system_instructions)
            .await
    }
}
