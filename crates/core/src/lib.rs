pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_text, normalize_text, word_count, ChunkingConfig};
pub use embeddings::{Embedder, HashedNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, PipelineError};
pub use generation::Generator;
pub use ingest::{ingest_source, source_stats, IngestOutcome, SourceStats};
pub use llm::{ChatCompletionsClient, DEFAULT_COMPLETIONS_BASE_URL};
pub use models::{
    DistanceMetric, GenerationMetadata, GenerationResult, NewChunk, PipelineOptions,
    RetrievalResult, RetrievalSummary, SamplingOptions, SourceScope, StoredChunk, StoredSource,
    Style, TailorMetadata, TailorOutcome, TailorRequest,
};
pub use orchestrator::{PipelineStage, TailorPipeline};
pub use retrieval::Retriever;
pub use stores::{MemoryStore, QdrantStore};
pub use traits::{ChunkStore, Completion, CompletionClient};
