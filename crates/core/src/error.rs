use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv parse error: {0}")]
    CsvParse(String),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("file has no usable content: {0}")]
    EmptyFile(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("embedding backend failure ({backend}): {details}")]
    EmbeddingBackend { backend: String, details: String },

    #[error("generation backend failure ({backend}): {details}")]
    GenerationBackend { backend: String, details: String },

    #[error("storage backend failure: {0}")]
    Storage(String),

    #[error("dataset has no rows to score")]
    EmptyDataset,

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
