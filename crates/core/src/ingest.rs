use crate::chunking::{chunk_text, normalize_text, word_count, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{IngestError, PipelineError};
use crate::models::{NewChunk, SourceScope};
use crate::traits::ChunkStore;
use chrono::{DateTime, Utc};

#[derive(Debug)]
pub struct IngestOutcome {
    pub source_id: i64,
    pub chunk_count: usize,
    pub text_chars: usize,
}

pub struct SourceStats {
    pub source_id: i64,
    pub created_at: DateTime<Utc>,
    pub text_words: usize,
    pub chunk_count: usize,
    pub average_chunk_words: f64,
}

pub async fn ingest_source<S: ChunkStore>(
    store: &S,
    embedder: &dyn Embedder,
    config: &ChunkingConfig,
    raw_text: &str,
) -> Result<IngestOutcome, IngestError> {
    let cleaned = normalize_text(raw_text)?;
    if cleaned.is_empty() {
        return Err(IngestError::Input("source text is empty".to_string()));
    }

    let chunk_texts = chunk_text(&cleaned, config)?;
    if chunk_texts.is_empty() {
        return Err(IngestError::Input(
            "source text produced no usable chunks".to_string(),
        ));
    }

    let embeddings = embedder.encode(&chunk_texts);
    if embeddings.len() != chunk_texts.len() {
        return Err(IngestError::EmbeddingCountMismatch {
            chunks: chunk_texts.len(),
            embeddings: embeddings.len(),
        });
    }
    for embedding in &embeddings {
        if embedding.len() != embedder.dimensions() {
            return Err(IngestError::Backend(PipelineError::DimensionMismatch {
                expected: embedder.dimensions(),
                actual: embedding.len(),
            }));
        }
    }

    let chunks: Vec<NewChunk> = chunk_texts
        .iter()
        .zip(embeddings)
        .map(|(text, embedding)| NewChunk {
            text: text.clone(),
            word_count: word_count(text),
            embedding,
        })
        .collect();

    // Nothing is persisted until the whole source has chunked and embedded.
    let source = store.create_source(&cleaned).await?;
    let chunk_ids = store.append_chunks(source.id, &chunks).await?;

    tracing::info!(
        source_id = source.id,
        chunks = chunk_ids.len(),
        "source ingested"
    );

    Ok(IngestOutcome {
        source_id: source.id,
        chunk_count: chunk_ids.len(),
        text_chars: cleaned.chars().count(),
    })
}

pub async fn source_stats<S: ChunkStore>(
    store: &S,
    source_id: i64,
) -> Result<SourceStats, PipelineError> {
    let source = store
        .get_source(source_id)
        .await?
        .ok_or(PipelineError::SourceNotFound(source_id))?;
    let chunks = store.list_chunks(SourceScope::Source(source_id)).await?;

    let total_words: usize = chunks.iter().map(|chunk| chunk.word_count).sum();
    let average = if chunks.is_empty() {
        0.0
    } else {
        total_words as f64 / chunks.len() as f64
    };

    Ok(SourceStats {
        source_id,
        created_at: source.created_at,
        text_words: word_count(&source.text),
        chunk_count: chunks.len(),
        average_chunk_words: average,
    })
}
