use crate::error::PipelineError;
use crate::index::{EmbeddingIndex, IndexHandle};
use crate::models::{ContextEnvelope, ContextItem, DatasetRef};
use crate::summarizer::describe_numeric;
use crate::traits::EmbeddingBackend;
use tracing::debug;

/// Namespace prefix for collections built outside an explicit session
/// namespace.
pub const DEFAULT_COLLECTION_PREFIX: &str = "default";

/// Fragments retrieved per semantic query.
pub const RETRIEVAL_TOP_K: usize = 3;

/// Context marker emitted for tabular datasets without numeric columns.
pub const NO_NUMERIC_COLUMNS_NOTE: &str =
    "The tabular dataset has no numeric columns; no statistical summary is available.";

/// How context will be gathered for a query, decided purely from the
/// dataset kind and whether an index handle is already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPlan {
    /// Tabular with at least one numeric column: deterministic statistics.
    DescriptiveStats,
    /// Tabular without numeric columns: documented fallback marker.
    TabularFallback,
    /// Text without an active index: build one, then search it.
    BuildThenSearch,
    /// Text with an active index: search it directly.
    SearchActive,
    /// Unsupported dataset kind: no context machinery is invoked.
    Empty,
}

pub fn plan_retrieval(dataset: &DatasetRef, has_active_index: bool) -> RetrievalPlan {
    match dataset {
        DatasetRef::Tabular(relation) => {
            if relation.numeric_columns().is_empty() {
                RetrievalPlan::TabularFallback
            } else {
                RetrievalPlan::DescriptiveStats
            }
        }
        DatasetRef::Text(_) => {
            if has_active_index {
                RetrievalPlan::SearchActive
            } else {
                RetrievalPlan::BuildThenSearch
            }
        }
        DatasetRef::Unsupported => RetrievalPlan::Empty,
    }
}

/// Single entry point for per-query context gathering. Dispatches on the
/// dataset kind, lazily building the session's embedding index on the
/// first semantic query against a text dataset.
pub struct ContextAssembler {
    index: EmbeddingIndex,
}

impl ContextAssembler {
    pub fn new(index: EmbeddingIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub async fn assemble(
        &self,
        dataset: &DatasetRef,
        handle: &mut Option<IndexHandle>,
        query: &str,
        embeddings: &(impl EmbeddingBackend + ?Sized),
    ) -> Result<ContextEnvelope, PipelineError> {
        let plan = plan_retrieval(dataset, handle.is_some());
        debug!(?plan, "context assembly dispatch");

        let mut envelope = ContextEnvelope::new();
        match plan {
            RetrievalPlan::DescriptiveStats => {
                if let DatasetRef::Tabular(relation) = dataset {
                    envelope.push(ContextItem::Stats(describe_numeric(relation)));
                }
            }
            RetrievalPlan::TabularFallback => {
                envelope.push(ContextItem::Note(NO_NUMERIC_COLUMNS_NOTE.to_string()));
            }
            RetrievalPlan::BuildThenSearch | RetrievalPlan::SearchActive => {
                if let DatasetRef::Text(blob) = dataset {
                    if handle.is_none() {
                        let built = self
                            .index
                            .build(blob, DEFAULT_COLLECTION_PREFIX, embeddings)
                            .await?;
                        *handle = Some(built);
                    }
                    let hits = self
                        .index
                        .query(handle.as_ref(), query, RETRIEVAL_TOP_K, embeddings)
                        .await?;
                    if !hits.is_empty() {
                        envelope.push(ContextItem::Fragments(hits));
                    }
                }
            }
            RetrievalPlan::Empty => {}
        }

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkingConfig;
    use crate::embedder::HashedNgramEmbedder;
    use crate::models::{CellValue, Column, Relation};
    use tempfile::tempdir;

    fn tabular(values: Vec<CellValue>) -> DatasetRef {
        DatasetRef::Tabular(Relation {
            columns: vec![Column {
                name: "col".to_string(),
                values,
            }],
        })
    }

    fn assembler(dir: &std::path::Path) -> ContextAssembler {
        ContextAssembler::new(EmbeddingIndex::new(
            dir,
            ChunkingConfig {
                max_chars: 24,
                overlap_chars: 6,
            },
        ))
    }

    #[test]
    fn dispatch_is_a_pure_function_of_kind_and_index_state() {
        let numeric = tabular(vec![CellValue::Number(1.0)]);
        let textual = tabular(vec![CellValue::Text("a".to_string())]);
        let blob = DatasetRef::Text("body".to_string());

        assert_eq!(plan_retrieval(&numeric, false), RetrievalPlan::DescriptiveStats);
        assert_eq!(plan_retrieval(&textual, false), RetrievalPlan::TabularFallback);
        assert_eq!(plan_retrieval(&blob, false), RetrievalPlan::BuildThenSearch);
        assert_eq!(plan_retrieval(&blob, true), RetrievalPlan::SearchActive);
        assert_eq!(plan_retrieval(&DatasetRef::Unsupported, true), RetrievalPlan::Empty);
    }

    #[tokio::test]
    async fn numeric_relation_yields_descriptive_stats() {
        let dir = tempdir().unwrap();
        let assembler = assembler(dir.path());
        let embedder = HashedNgramEmbedder::default();
        let dataset = tabular(vec![CellValue::Number(3.0), CellValue::Number(5.0)]);

        let mut handle = None;
        let envelope = assembler
            .assemble(&dataset, &mut handle, "summarize", &embedder)
            .await
            .unwrap();
        assert!(matches!(envelope.items(), [ContextItem::Stats(_)]));
    }

    #[tokio::test]
    async fn zero_numeric_columns_yield_fallback_note_not_error() {
        let dir = tempdir().unwrap();
        let assembler = assembler(dir.path());
        let embedder = HashedNgramEmbedder::default();
        let dataset = tabular(vec![CellValue::Text("ajax".to_string())]);

        let mut handle = None;
        let envelope = assembler
            .assemble(&dataset, &mut handle, "summarize", &embedder)
            .await
            .unwrap();
        match envelope.items() {
            [ContextItem::Note(note)] => assert_eq!(note, NO_NUMERIC_COLUMNS_NOTE),
            other => panic!("expected fallback note, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_dataset_builds_index_lazily_then_reuses_it() {
        let dir = tempdir().unwrap();
        let assembler = assembler(dir.path());
        let embedder = HashedNgramEmbedder::default();
        let dataset = DatasetRef::Text(
            "The match report covers possession, shots on target, and final score.".to_string(),
        );

        let mut handle = None;
        let envelope = assembler
            .assemble(&dataset, &mut handle, "final score", &embedder)
            .await
            .unwrap();
        assert!(handle.is_some());
        assert!(!envelope.is_empty());

        let collection = handle.as_ref().unwrap().collection().to_string();
        let again = assembler
            .assemble(&dataset, &mut handle, "possession", &embedder)
            .await
            .unwrap();
        assert!(!again.is_empty());
        assert_eq!(handle.as_ref().unwrap().collection(), collection);
    }

    #[tokio::test]
    async fn unsupported_dataset_yields_empty_envelope() {
        let dir = tempdir().unwrap();
        let assembler = assembler(dir.path());
        let embedder = HashedNgramEmbedder::default();

        let mut handle = None;
        let envelope = assembler
            .assemble(&DatasetRef::Unsupported, &mut handle, "anything", &embedder)
            .await
            .unwrap();
        assert!(envelope.is_empty());
        assert!(handle.is_none());
    }
}
