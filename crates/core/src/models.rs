use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSource {
    pub id: i64,
    pub text: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChunk {
    pub text: String,
    pub word_count: usize,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: i64,
    pub source_id: i64,
    pub text: String,
    pub word_count: usize,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: i64,
    pub source_id: i64,
    pub chunk_text: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceScope {
    All,
    Source(i64),
}

impl SourceScope {
    pub fn matches(&self, source_id: i64) -> bool {
        match self {
            SourceScope::All => true,
            SourceScope::Source(id) => *id == source_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

impl DistanceMetric {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "cosine" => DistanceMetric::Cosine,
            "euclidean" => DistanceMetric::Euclidean,
            "dot_product" => DistanceMetric::DotProduct,
            other => {
                tracing::warn!(metric = other, "unknown similarity metric, using cosine");
                DistanceMetric::Cosine
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dot_product",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Professional,
    Concise,
    Impact,
}

impl Style {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "concise" => Style::Concise,
            "impact" => Style::Impact,
            _ => Style::Professional,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Style::Professional => "professional",
            Style::Concise => "concise",
            Style::Impact => "impact",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub model: String,
    pub style: Style,
    pub max_statements: usize,
    pub query_chars: usize,
    pub tokens_used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub statements: Vec<String>,
    pub cited_chunk_refs: Vec<usize>,
    pub chunk_count: usize,
    pub metadata: GenerationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSummary {
    pub chunks_retrieved: usize,
    pub retrieval_limit: usize,
    pub distance_min: f64,
    pub distance_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEcho {
    pub style: Style,
    pub max_statements: usize,
    pub retrieval_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub text_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailorMetadata {
    pub generation: GenerationMetadata,
    pub retrieval: RetrievalSummary,
    pub request: RequestEcho,
    pub source: SourceSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailorRequest {
    pub source_id: i64,
    pub query_text: String,
    pub max_statements: usize,
    pub style: Style,
    pub retrieval_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailorOutcome {
    pub source_id: i64,
    pub statements: Vec<String>,
    pub cited_chunk_refs: Vec<usize>,
    pub chunk_count: usize,
    pub metadata: TailorMetadata,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_max_words: usize,
    pub min_chunk_words: usize,
    pub retrieval_limit: usize,
    pub distance_threshold: f64,
    pub metric: DistanceMetric,
    pub dimensions: usize,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_completion_tokens: u32,
    pub completion_timeout_secs: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_max_words: 200,
            min_chunk_words: 10,
            retrieval_limit: 12,
            distance_threshold: 0.5,
            metric: DistanceMetric::Cosine,
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_completion_tokens: 1_000,
            completion_timeout_secs: 30,
        }
    }
}

impl From<&PipelineOptions> for SamplingOptions {
    fn from(options: &PipelineOptions) -> Self {
        Self {
            model: options.model.clone(),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_completion_tokens,
        }
    }
}
