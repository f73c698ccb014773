use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("embedding count {embeddings} does not match chunk count {chunks}")]
    EmbeddingCountMismatch { chunks: usize, embeddings: usize },

    #[error(transparent)]
    Backend(#[from] PipelineError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("source {0} not found")]
    SourceNotFound(i64),

    #[error("no relevant content for source {source_id} within distance {threshold}")]
    NoRelevantContent { source_id: i64, threshold: f64 },

    #[error("embedding dimension {actual} does not match configured dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("generation failed with chunks {chunk_ids:?} in context: {details}")]
    UpstreamGeneration { details: String, chunk_ids: Vec<i64> },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
