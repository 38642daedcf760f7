pub mod assembler;
pub mod backends;
pub mod chunker;
pub mod embedder;
pub mod error;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod summarizer;
pub mod traits;

pub use assembler::{
    plan_retrieval, ContextAssembler, RetrievalPlan, DEFAULT_COLLECTION_PREFIX,
    NO_NUMERIC_COLUMNS_NOTE, RETRIEVAL_TOP_K,
};
pub use backends::{GeminiEmbedder, GeminiGenerator, SqlHttpStore};
pub use chunker::{fragments, ChunkingConfig, Fragments};
pub use embedder::{HashedNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, PipelineError};
pub use index::{EmbeddingIndex, Fragment, IndexHandle};
pub use ingest::{load_dataset, parse_csv};
pub use models::{
    AnalysisReport, CellValue, ChatRole, ChatTurn, Column, ColumnStats, ContextEnvelope,
    ContextItem, DatasetRef, DatasetSummary, QualityScore, Relation,
};
pub use orchestrator::{
    AnalysisCoordinator, QueryPipeline, SessionState, Stage, HISTORY_WINDOW,
    SYSTEM_INSTRUCTIONS, UNSUPPORTED_DATASET_MESSAGE,
};
pub use summarizer::{describe_numeric, key_insights, quality, recommend, summarize};
pub use traits::{EmbeddingBackend, GenerationBackend, StorageBackend};
