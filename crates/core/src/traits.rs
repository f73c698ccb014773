use crate::{
    NewChunk, PipelineError, RetrievalResult, SamplingOptions, SourceScope, StoredChunk,
    StoredSource,
};
use async_trait::async_trait;

#[async_trait]
pub trait ChunkStore: Send + Sync {
    // Stores that rank and limit candidates themselves opt in; the retriever
    // falls back to an in-process scan otherwise.
    fn ranks_natively(&self) -> bool {
        false
    }

    async fn create_source(&self, text: &str) -> Result<StoredSource, PipelineError>;

    async fn get_source(&self, source_id: i64) -> Result<Option<StoredSource>, PipelineError>;

    async fn append_chunks(
        &self,
        source_id: i64,
        chunks: &[NewChunk],
    ) -> Result<Vec<i64>, PipelineError>;

    async fn list_chunks(&self, scope: SourceScope) -> Result<Vec<StoredChunk>, PipelineError>;

    // Rows come back ascending by distance and already limited; only called
    // when ranks_natively returns true.
    async fn rank_chunks(
        &self,
        _query: &[f32],
        _scope: SourceScope,
        _limit: usize,
    ) -> Result<Vec<RetrievalResult>, PipelineError> {
        Err(PipelineError::BackendResponse {
            backend: "store".to_string(),
            details: "native ranking not supported by this store".to_string(),
        })
    }

    async fn delete_source(&self, source_id: i64) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        sampling: &SamplingOptions,
    ) -> Result<Completion, PipelineError>;
}
