use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{PipelineError, Result};
use crate::models::{NewChunk, SourceScope, StoredChunk, StoredSource};
use crate::stores::text_checksum;
use crate::traits::ChunkStore;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    sources: HashMap<i64, StoredSource>,
    chunks: Vec<StoredChunk>,
    next_source_id: i64,
    next_chunk_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn create_source(&self, text: &str) -> Result<StoredSource> {
        let mut inner = self.inner.write().await;
        inner.next_source_id += 1;
        let source = StoredSource {
            id: inner.next_source_id,
            text: text.to_string(),
            checksum: text_checksum(text),
            created_at: Utc::now(),
        };
        inner.sources.insert(source.id, source.clone());
        Ok(source)
    }

    async fn get_source(&self, source_id: i64) -> Result<Option<StoredSource>> {
        let inner = self.inner.read().await;
        Ok(inner.sources.get(&source_id).cloned())
    }

    async fn append_chunks(&self, source_id: i64, chunks: &[NewChunk]) -> Result<Vec<i64>> {
        let mut inner = self.inner.write().await;
        if !inner.sources.contains_key(&source_id) {
            return Err(PipelineError::SourceNotFound(source_id));
        }
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            inner.next_chunk_id += 1;
            let id = inner.next_chunk_id;
            inner.chunks.push(StoredChunk {
                id,
                source_id,
                text: chunk.text.clone(),
                word_count: chunk.word_count,
                embedding: chunk.embedding.clone(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn list_chunks(&self, scope: SourceScope) -> Result<Vec<StoredChunk>> {
        let inner = self.inner.read().await;
        Ok(inner
            .chunks
            .iter()
            .filter(|chunk| scope.matches(chunk.source_id))
            .cloned()
            .collect())
    }

    async fn delete_source(&self, source_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.sources.remove(&source_id).is_none() {
            return Err(PipelineError::SourceNotFound(source_id));
        }
        inner.chunks.retain(|chunk| chunk.source_id != source_id);
        Ok(())
    }
}
