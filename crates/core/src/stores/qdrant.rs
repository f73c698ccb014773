use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::error::{PipelineError, Result};
use crate::models::{
    DistanceMetric, NewChunk, RetrievalResult, SourceScope, StoredChunk, StoredSource,
};
use crate::stores::text_checksum;
use crate::traits::ChunkStore;

// Chunk point ids are source_id * stride + offset, so a source holds at
// most this many chunks.
const CHUNK_ID_STRIDE: i64 = 1_000_000;
const SCROLL_PAGE: usize = 256;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
    metric: DistanceMetric,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
        metric: DistanceMetric,
    ) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
            metric,
        }
    }

    fn sources_collection(&self) -> String {
        format!("{}_sources", self.collection)
    }

    pub async fn ensure_collections(&self) -> Result<()> {
        self.ensure_collection(&self.collection, self.vector_size, qdrant_distance(self.metric))
            .await?;
        // Source records live in a sibling collection with stub vectors.
        self.ensure_collection(&self.sources_collection(), 1, "Cosine")
            .await
    }

    async fn ensure_collection(&self, name: &str, size: usize, distance: &str) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/collections/{}", self.endpoint, name))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, name))
            .json(&json!({
                "vectors": { "size": size, "distance": distance }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn count_points(&self, collection: &str, filter: Option<Value>) -> Result<i64> {
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/count",
                self.endpoint, collection
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/count")
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    // Ids come from the highest live id, not the point count: after a
    // delete the count shrinks and would reissue an id a survivor still
    // owns.
    async fn next_source_id(&self) -> Result<i64> {
        let mut ids = Vec::new();
        let mut cursor: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": false,
                "with_vector": false,
            });
            if let Some(offset) = &cursor {
                body["offset"] = offset.clone();
            }

            let response = self
                .client
                .post(format!(
                    "{}/collections/{}/points/scroll",
                    self.endpoint,
                    self.sources_collection()
                ))
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(backend_error(response.status()));
            }

            let parsed: Value = response.json().await?;
            ids.extend(scroll_point_ids(&parsed));

            match parsed.pointer("/result/next_page_offset") {
                Some(offset) if !offset.is_null() => cursor = Some(offset.clone()),
                _ => break,
            }
        }

        Ok(successor_id(&ids))
    }
}

fn backend_error(status: StatusCode) -> PipelineError {
    PipelineError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

fn source_filter(source_id: i64) -> Value {
    json!({
        "must": [{ "key": "source_id", "match": { "value": source_id } }]
    })
}

fn scope_filter(scope: SourceScope) -> Option<Value> {
    match scope {
        SourceScope::All => None,
        SourceScope::Source(source_id) => Some(source_filter(source_id)),
    }
}

fn chunk_point_id(source_id: i64, offset: i64) -> i64 {
    source_id * CHUNK_ID_STRIDE + offset
}

fn scroll_point_ids(payload: &Value) -> Vec<i64> {
    payload
        .pointer("/result/points")
        .and_then(Value::as_array)
        .map(|points| {
            points
                .iter()
                .filter_map(|point| point.pointer("/id").and_then(Value::as_i64))
                .collect()
        })
        .unwrap_or_default()
}

fn successor_id(ids: &[i64]) -> i64 {
    ids.iter().copied().max().unwrap_or(0) + 1
}

fn qdrant_distance(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "Cosine",
        DistanceMetric::Euclidean => "Euclid",
        DistanceMetric::DotProduct => "Dot",
    }
}

// Qdrant reports similarity for Cosine and Dot but raw distance for Euclid.
fn score_to_distance(metric: DistanceMetric, score: f64) -> f64 {
    match metric {
        DistanceMetric::Cosine => 1.0 - score,
        DistanceMetric::DotProduct => -score,
        DistanceMetric::Euclidean => score,
    }
}

fn parse_chunk_point(point: &Value) -> StoredChunk {
    let embedding = point
        .pointer("/vector")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_f64)
                .map(|value| value as f32)
                .collect()
        })
        .unwrap_or_default();

    StoredChunk {
        id: point.pointer("/id").and_then(Value::as_i64).unwrap_or_default(),
        source_id: point
            .pointer("/payload/source_id")
            .and_then(Value::as_i64)
            .unwrap_or_default(),
        text: point
            .pointer("/payload/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        word_count: point
            .pointer("/payload/word_count")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize,
        embedding,
    }
}

#[async_trait]
impl ChunkStore for QdrantStore {
    fn ranks_natively(&self) -> bool {
        true
    }

    async fn create_source(&self, text: &str) -> Result<StoredSource> {
        let id = self.next_source_id().await?;
        let source = StoredSource {
            id,
            text: text.to_string(),
            checksum: text_checksum(text),
            created_at: Utc::now(),
        };

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint,
                self.sources_collection()
            ))
            .json(&json!({
                "points": [{
                    "id": source.id,
                    "vector": [0.0],
                    "payload": {
                        "text": source.text,
                        "checksum": source.checksum,
                        "created_at": source.created_at.to_rfc3339(),
                    }
                }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(source)
    }

    async fn get_source(&self, source_id: i64) -> Result<Option<StoredSource>> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points",
                self.endpoint,
                self.sources_collection()
            ))
            .json(&json!({ "ids": [source_id], "with_payload": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let points = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let Some(point) = points.first() else {
            return Ok(None);
        };

        let created_at = point
            .pointer("/payload/created_at")
            .and_then(Value::as_str)
            .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok())
            .map(|stamp| stamp.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Some(StoredSource {
            id: source_id,
            text: point
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            checksum: point
                .pointer("/payload/checksum")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created_at,
        }))
    }

    async fn append_chunks(&self, source_id: i64, chunks: &[NewChunk]) -> Result<Vec<i64>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let existing = self
            .count_points(&self.collection, Some(source_filter(source_id)))
            .await?;
        if existing + chunks.len() as i64 > CHUNK_ID_STRIDE {
            return Err(PipelineError::Input(format!(
                "source {source_id} exceeds {CHUNK_ID_STRIDE} chunks"
            )));
        }

        let mut ids = Vec::with_capacity(chunks.len());
        let mut points = Vec::with_capacity(chunks.len());
        for (offset, chunk) in chunks.iter().enumerate() {
            if chunk.embedding.len() != self.vector_size {
                return Err(PipelineError::DimensionMismatch {
                    expected: self.vector_size,
                    actual: chunk.embedding.len(),
                });
            }

            let id = chunk_point_id(source_id, existing + offset as i64);
            points.push(json!({
                "id": id,
                "vector": chunk.embedding,
                "payload": {
                    "source_id": source_id,
                    "text": chunk.text,
                    "word_count": chunk.word_count,
                }
            }));
            ids.push(id);
        }

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(ids)
    }

    async fn list_chunks(&self, scope: SourceScope) -> Result<Vec<StoredChunk>> {
        let mut chunks = Vec::new();
        let mut cursor: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": true,
            });
            if let Some(filter) = scope_filter(scope) {
                body["filter"] = filter;
            }
            if let Some(offset) = &cursor {
                body["offset"] = offset.clone();
            }

            let response = self
                .client
                .post(format!(
                    "{}/collections/{}/points/scroll",
                    self.endpoint, self.collection
                ))
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(backend_error(response.status()));
            }

            let parsed: Value = response.json().await?;
            let points = parsed
                .pointer("/result/points")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for point in &points {
                chunks.push(parse_chunk_point(point));
            }

            match parsed.pointer("/result/next_page_offset") {
                Some(offset) if !offset.is_null() => cursor = Some(offset.clone()),
                _ => break,
            }
        }

        chunks.sort_by_key(|chunk| chunk.id);
        Ok(chunks)
    }

    async fn rank_chunks(
        &self,
        query: &[f32],
        scope: SourceScope,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if query.len() != self.vector_size {
            return Err(PipelineError::DimensionMismatch {
                expected: self.vector_size,
                actual: query.len(),
            });
        }

        let mut body = json!({
            "vector": query,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter) = scope_filter(scope) {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(hits.len());
        for hit in &hits {
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            results.push(RetrievalResult {
                chunk_id: hit.pointer("/id").and_then(Value::as_i64).unwrap_or_default(),
                source_id: hit
                    .pointer("/payload/source_id")
                    .and_then(Value::as_i64)
                    .unwrap_or_default(),
                chunk_text: hit
                    .pointer("/payload/text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                distance: score_to_distance(self.metric, score),
            });
        }

        Ok(results)
    }

    async fn delete_source(&self, source_id: i64) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "filter": source_filter(source_id) }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint,
                self.sources_collection()
            ))
            .json(&json!({ "points": [source_id] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_convert_to_distances_per_metric() {
        assert!((score_to_distance(DistanceMetric::Cosine, 0.9) - 0.1).abs() < 1e-9);
        assert_eq!(score_to_distance(DistanceMetric::DotProduct, 0.75), -0.75);
        assert_eq!(score_to_distance(DistanceMetric::Euclidean, 0.3), 0.3);
    }

    #[test]
    fn chunk_point_ids_never_collide_across_sources() {
        assert_eq!(chunk_point_id(1, 0), 1_000_000);
        assert_eq!(chunk_point_id(2, 5), 2_000_005);
        assert!(chunk_point_id(1, CHUNK_ID_STRIDE - 1) < chunk_point_id(2, 0));
    }

    #[test]
    fn chunk_points_parse_payload_and_vector() {
        let point = json!({
            "id": 1_000_001,
            "payload": { "source_id": 1, "text": "led a team of nine", "word_count": 5 },
            "vector": [0.25, 0.5],
        });

        let chunk = parse_chunk_point(&point);
        assert_eq!(chunk.id, 1_000_001);
        assert_eq!(chunk.source_id, 1);
        assert_eq!(chunk.text, "led a team of nine");
        assert_eq!(chunk.word_count, 5);
        assert_eq!(chunk.embedding, vec![0.25, 0.5]);
    }

    #[test]
    fn scope_filters_restrict_to_one_source() {
        assert!(scope_filter(SourceScope::All).is_none());
        let filter = scope_filter(SourceScope::Source(3)).unwrap();
        assert_eq!(
            filter.pointer("/must/0/match/value").and_then(Value::as_i64),
            Some(3)
        );
    }

    #[test]
    fn scroll_pages_surface_point_ids() {
        let page = json!({
            "result": { "points": [{ "id": 1 }, { "id": 3 }], "next_page_offset": null }
        });
        assert_eq!(scroll_point_ids(&page), vec![1, 3]);
        assert_eq!(scroll_point_ids(&json!({ "result": {} })), Vec::<i64>::new());
    }

    #[test]
    fn freed_source_ids_are_never_reissued() {
        // Two sources ingested, the first deleted: id 2 is still live, so
        // the next source takes 3 even though only one point remains.
        assert_eq!(successor_id(&[2]), 3);
        assert_eq!(successor_id(&[1, 3]), 4);
        assert_eq!(successor_id(&[]), 1);
    }
}
