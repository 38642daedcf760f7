use crate::assembler::ContextAssembler;
use crate::error::PipelineError;
use crate::index::{EmbeddingIndex, IndexHandle};
use crate::models::{AnalysisReport, ChatTurn, ContextEnvelope, ContextItem, DatasetRef};
use crate::summarizer::{key_insights, quality, recommend, summarize};
use crate::traits::{EmbeddingBackend, GenerationBackend};
use tracing::{debug, info};
use uuid::Uuid;

/// Fixed instructions handed to the generation backend with every
/// request. The assembled context is the model's source of truth.
pub const SYSTEM_INSTRUCTIONS: &str = "\
You are an expert data analyst. Answer the user's latest question using \
the provided context, data summary, and conversation history.

Follow these steps:
1. Understand the specific question being asked.
2. Review the conversation history; maintain context for follow-ups.
3. Examine the retrieved context. It contains the factual data relevant \
to the query and is your source of truth.
4. Synthesize a clear, concise, insightful answer.

RULES:
- ALWAYS base your answers on the provided context. Do not use outside knowledge.
- If the context does not contain the answer, say the information is not \
available in the provided data.
- Be direct. Do not mention \"based on the context\" or \"according to the document\".
- Format answers for readability (bullet points for lists).";

/// Most recent turns forwarded to the generation backend per request.
pub const HISTORY_WINDOW: usize = 4;

pub const UNSUPPORTED_DATASET_MESSAGE: &str =
    "I cannot perform analysis on the provided data type.";

const ANALYZE_QUERY: &str = "Summarize the dataset";
const PREVIEW_ROWS: usize = 5;

/// Stages of the per-query pipeline. Strictly forward: a failure in
/// either working stage terminates the request with that stage's error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ContextAssembly,
    Generation,
    Done,
}

/// State carried through one query's pipeline run: the query text and
/// the context list, which is append-only across stages.
#[derive(Debug)]
pub struct QueryPipeline {
    stage: Stage,
    query: String,
    context: ContextEnvelope,
}

impl QueryPipeline {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            stage: Stage::ContextAssembly,
            query: query.into(),
            context: ContextEnvelope::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn context(&self) -> &ContextEnvelope {
        &self.context
    }

    fn attach_context(&mut self, envelope: ContextEnvelope) {
        debug_assert_eq!(self.stage, Stage::ContextAssembly);
        self.context.extend(envelope);
        self.stage = Stage::Generation;
    }

    fn complete(&mut self) {
        debug_assert_eq!(self.stage, Stage::Generation);
        self.stage = Stage::Done;
    }
}

/// Per-user mutable state: the active dataset, ordered chat history,
/// the last response, and the handle to the active embedding index.
/// Mutated only by the coordinator; one instance per session.
#[derive(Debug)]
pub struct SessionState {
    pub id: Uuid,
    dataset: DatasetRef,
    history: Vec<ChatTurn>,
    last_response: Option<String>,
    index: Option<IndexHandle>,
}

impl SessionState {
    pub fn new(dataset: DatasetRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset,
            history: Vec::new(),
            last_response: None,
            index: None,
        }
    }

    pub fn dataset(&self) -> &DatasetRef {
        &self.dataset
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    pub fn active_collection(&self) -> Option<&str> {
        self.index.as_ref().map(IndexHandle::collection)
    }

    /// Load a new dataset, retiring the active embedding index handle.
    /// The retired collection stays on disk; it is simply no longer
    /// reachable from this session.
    pub fn replace_dataset(&mut self, dataset: DatasetRef) {
        if let Some(retired) = self.index.take() {
            info!(
                session = %self.id,
                collection = retired.collection(),
                "retiring embedding index for replaced dataset"
            );
        }
        self.dataset = dataset;
    }
}

/// Drives the two-stage pipeline (context assembly, then generation)
/// for every query against a session.
pub struct AnalysisCoordinator<G, E>
where
    G: GenerationBackend,
    E: EmbeddingBackend,
{
    generation: G,
    embeddings: E,
    assembler: ContextAssembler,
}

impl<G, E> AnalysisCoordinator<G, E>
where
    G: GenerationBackend,
    E: EmbeddingBackend,
{
    pub fn new(generation: G, embeddings: E, index: EmbeddingIndex) -> Self {
        Self {
            generation,
            embeddings,
            assembler: ContextAssembler::new(index),
        }
    }

    /// Answer a conversational query against the session's dataset.
    ///
    /// The user's turn is recorded before the pipeline runs, so a
    /// failing stage never drops it from the conversation. The assistant
    /// turn is recorded only on success.
    pub async fn chat(
        &self,
        session: &mut SessionState,
        query: &str,
    ) -> Result<String, PipelineError> {
        let prompt_history = recent_history(&session.history);
        session.history.push(ChatTurn::user(query));

        let mut pipeline = QueryPipeline::new(query);
        debug!(session = %session.id, stage = ?pipeline.stage(), "pipeline start");

        let envelope = self
            .assembler
            .assemble(&session.dataset, &mut session.index, query, &self.embeddings)
            .await?;
        pipeline.attach_context(envelope);

        let response = self
            .generation
            .generate(
                pipeline.query(),
                pipeline.context(),
                &prompt_history,
                SYSTEM_INSTRUCTIONS,
            )
            .await?;
        pipeline.complete();

        session.history.push(ChatTurn::assistant(response.clone()));
        session.last_response = Some(response.clone());
        Ok(response)
    }

    /// Produce a full report for the session's dataset: a generated
    /// narrative plus deterministic insights, quality scores, and
    /// recommendations for tabular data.
    pub async fn analyze(
        &self,
        session: &mut SessionState,
    ) -> Result<AnalysisReport, PipelineError> {
        match &session.dataset {
            DatasetRef::Tabular(relation) => {
                let relation = relation.clone();
                let summary = summarize(&relation);
                let score = quality(&relation)?;

                let mut envelope = ContextEnvelope::new();
                envelope.push(ContextItem::Summary(summary));
                let stats = self
                    .assembler
                    .assemble(&session.dataset, &mut session.index, ANALYZE_QUERY, &self.embeddings)
                    .await?;
                envelope.extend(stats);

                let narrative = self
                    .generation
                    .generate(ANALYZE_QUERY, &envelope, &[], SYSTEM_INSTRUCTIONS)
                    .await?;

                let response = format!(
                    "Here are the top results from your query:\n\n{}\n\n{}",
                    relation.to_markdown(PREVIEW_ROWS),
                    narrative
                );

                Ok(AnalysisReport {
                    response,
                    key_insights: key_insights(&relation),
                    quality: Some(score),
                    recommendations: recommend(&score),
                })
            }
            DatasetRef::Text(_) => {
                let envelope = self
                    .assembler
                    .assemble(&session.dataset, &mut session.index, ANALYZE_QUERY, &self.embeddings)
                    .await?;
                let response = self
                    .generation
                    .generate(ANALYZE_QUERY, &envelope, &[], SYSTEM_INSTRUCTIONS)
                    .await?;

                Ok(AnalysisReport {
                    response,
                    key_insights: Vec::new(),
                    quality: None,
                    recommendations: Vec::new(),
                })
            }
            DatasetRef::Unsupported => Ok(AnalysisReport {
                response: UNSUPPORTED_DATASET_MESSAGE.to_string(),
                key_insights: Vec::new(),
                quality: None,
                recommendations: Vec::new(),
            }),
        }
    }
}

fn recent_history(history: &[ChatTurn]) -> Vec<ChatTurn> {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history[start..].to_vec()
}
