use crate::chunker::{fragments, ChunkingConfig};
use crate::error::PipelineError;
use crate::traits::EmbeddingBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

/// Collection identity derives from a fixed-length prefix of the source
/// text, so identical inputs resolve to the same collection name.
pub const IDENTITY_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub vector: Vec<f32>,
}

/// Handle to the active fragment collection of one session. Owns its
/// fragments; dropped (not deleted on disk) when a new dataset is
/// loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHandle {
    collection: String,
    fragments: Vec<Fragment>,
}

impl IndexHandle {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCollection {
    collection: String,
    dimensions: usize,
    created_at: DateTime<Utc>,
    fragments: Vec<Fragment>,
}

/// Durable store of fragment collections for semantic retrieval. One
/// collection per built text dataset, named by content identity so
/// rebuilding identical input reuses the same name and distinct inputs
/// never collide.
pub struct EmbeddingIndex {
    root: PathBuf,
    chunking: ChunkingConfig,
}

impl EmbeddingIndex {
    pub fn new(root: impl Into<PathBuf>, chunking: ChunkingConfig) -> Self {
        Self {
            root: root.into(),
            chunking,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_name(prefix: &str, text: &str) -> String {
        let identity: String = text.chars().take(IDENTITY_PREFIX_CHARS).collect();
        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        format!("{}_{:x}", prefix, hasher.finalize())
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    /// Chunk `text`, embed every fragment, and persist the collection
    /// atomically (write to a temp file, then rename). On embedding
    /// failure nothing is written, so no partial collection is ever
    /// queryable.
    pub async fn build(
        &self,
        text: &str,
        prefix: &str,
        backend: &(impl EmbeddingBackend + ?Sized),
    ) -> Result<IndexHandle, PipelineError> {
        let collection = Self::collection_name(prefix, text);

        let mut built = Vec::new();
        for piece in fragments(text, self.chunking)? {
            let vector = backend.embed(piece).await?;
            built.push(Fragment {
                text: piece.to_string(),
                vector,
            });
        }

        let persisted = PersistedCollection {
            collection: collection.clone(),
            dimensions: backend.dimensions(),
            created_at: Utc::now(),
            fragments: built.clone(),
        };

        tokio::fs::create_dir_all(&self.root).await?;
        let final_path = self.collection_path(&collection);
        let temp_path = self.root.join(format!("{collection}.tmp"));
        let payload = serde_json::to_vec(&persisted)?;
        tokio::fs::write(&temp_path, payload).await?;
        tokio::fs::rename(&temp_path, &final_path).await?;

        info!(
            collection = %collection,
            fragment_count = built.len(),
            path = %final_path.display(),
            "embedding collection persisted"
        );

        Ok(IndexHandle {
            collection,
            fragments: built,
        })
    }

    /// Reload a previously persisted collection, or `None` if it was
    /// never built under this root.
    pub async fn open(&self, collection: &str) -> Result<Option<IndexHandle>, PipelineError> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = tokio::fs::read(&path).await?;
        let persisted: PersistedCollection = serde_json::from_slice(&bytes)?;
        Ok(Some(IndexHandle {
            collection: persisted.collection,
            fragments: persisted.fragments,
        }))
    }

    /// Embed the query and return up to `k` fragment texts ranked by
    /// descending cosine similarity (ties keep insertion order). With no
    /// active handle this returns an empty list, never an error.
    pub async fn query(
        &self,
        handle: Option<&IndexHandle>,
        text: &str,
        k: usize,
        backend: &(impl EmbeddingBackend + ?Sized),
    ) -> Result<Vec<String>, PipelineError> {
        let Some(handle) = handle else {
            return Ok(Vec::new());
        };
        if handle.fragments.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = backend.embed(text).await?;
        let mut ranked: Vec<(f32, &Fragment)> = handle
            .fragments
            .iter()
            .map(|fragment| (cosine_similarity(&query_vector, &fragment.vector), fragment))
            .collect();

        // Stable sort keeps insertion order for equal scores.
        ranked.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(ranked
            .into_iter()
            .take(k)
            .map(|(_, fragment)| fragment.text.clone())
            .collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashedNgramEmbedder;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FailingEmbedder {
        fn dimensions(&self) -> usize {
            8
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
            Err(PipelineError::EmbeddingBackend {
                backend: "fake".to_string(),
                details: "refused".to_string(),
            })
        }
    }

    fn small_chunking() -> ChunkingConfig {
        ChunkingConfig {
            max_chars: 32,
            overlap_chars: 8,
        }
    }

    #[test]
    fn collection_names_are_idempotent_and_distinct() {
        let first = EmbeddingIndex::collection_name("default", "the same long text body");
        let second = EmbeddingIndex::collection_name("default", "the same long text body");
        let other = EmbeddingIndex::collection_name("default", "a different text body");
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(first.starts_with("default_"));
    }

    #[test]
    fn prefix_separates_namespaces() {
        let a = EmbeddingIndex::collection_name("session_a", "shared body");
        let b = EmbeddingIndex::collection_name("session_b", "shared body");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn query_without_handle_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let index = EmbeddingIndex::new(dir.path(), small_chunking());
        let embedder = HashedNgramEmbedder::default();
        let hits = index.query(None, "anything", 3, &embedder).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn build_then_query_returns_at_most_k_ranked_fragments() {
        let dir = tempdir().unwrap();
        let index = EmbeddingIndex::new(dir.path(), small_chunking());
        let embedder = HashedNgramEmbedder::default();

        let text = "Ajax won the league with 81 points. \
                    PSV finished second on goal difference. \
                    Feyenoord completed the top three with a late surge.";
        let handle = index.build(text, "default", &embedder).await.unwrap();
        assert!(handle.len() > 1);

        let hits = index
            .query(Some(&handle), "who won the league", 2, &embedder)
            .await
            .unwrap();
        assert!(hits.len() <= 2);
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn ranking_is_deterministic() {
        let dir = tempdir().unwrap();
        let index = EmbeddingIndex::new(dir.path(), small_chunking());
        let embedder = HashedNgramEmbedder::default();

        let text = "alpha section content here. beta section content here. gamma section content here.";
        let handle = index.build(text, "default", &embedder).await.unwrap();

        let first = index.query(Some(&handle), "beta", 3, &embedder).await.unwrap();
        let second = index.query(Some(&handle), "beta", 3, &embedder).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn rebuild_reuses_the_same_collection_file() {
        let dir = tempdir().unwrap();
        let index = EmbeddingIndex::new(dir.path(), small_chunking());
        let embedder = HashedNgramEmbedder::default();

        let text = "identical input text for both builds";
        let first = index.build(text, "default", &embedder).await.unwrap();
        let second = index.build(text, "default", &embedder).await.unwrap();
        assert_eq!(first.collection(), second.collection());

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn failed_build_leaves_no_partial_collection() {
        let dir = tempdir().unwrap();
        let index = EmbeddingIndex::new(dir.path(), small_chunking());

        let result = index.build("some text to embed", "default", &FailingEmbedder).await;
        assert!(matches!(
            result,
            Err(PipelineError::EmbeddingBackend { .. })
        ));

        let leftover = std::fs::read_dir(dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn persisted_collection_can_be_reopened() {
        let dir = tempdir().unwrap();
        let index = EmbeddingIndex::new(dir.path(), small_chunking());
        let embedder = HashedNgramEmbedder::default();

        let text = "durable fragment collection body";
        let built = index.build(text, "default", &embedder).await.unwrap();

        let reopened = index.open(built.collection()).await.unwrap().unwrap();
        assert_eq!(reopened.len(), built.len());
        assert!(index.open("default_missing").await.unwrap().is_none());
    }
}
