use std::sync::Arc;

use crate::embeddings::Embedder;
use crate::error::PipelineError;
use crate::models::{DistanceMetric, RetrievalResult, SourceScope};
use crate::traits::ChunkStore;

pub struct Retriever<S> {
    store: S,
    embedder: Arc<dyn Embedder>,
    metric: DistanceMetric,
    dimensions: usize,
}

impl<S: ChunkStore> Retriever<S> {
    pub fn new(
        store: S,
        embedder: Arc<dyn Embedder>,
        metric: DistanceMetric,
        dimensions: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            metric,
            dimensions,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn retrieve(
        &self,
        query_text: &str,
        scope: SourceScope,
        limit: usize,
        distance_threshold: f64,
    ) -> Result<Vec<RetrievalResult>, PipelineError> {
        if query_text.trim().is_empty() {
            return Err(PipelineError::Input("query text is blank".to_string()));
        }
        if limit == 0 {
            return Err(PipelineError::Input(
                "retrieval limit must be at least 1".to_string(),
            ));
        }
        if distance_threshold < 0.0 {
            return Err(PipelineError::Input(format!(
                "distance threshold must be non-negative, got {distance_threshold}"
            )));
        }

        let query = self.embedder.encode_one(query_text);
        if query.len() != self.dimensions {
            return Err(PipelineError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut results = if self.store.ranks_natively() {
            self.store.rank_chunks(&query, scope, limit).await?
        } else {
            self.scan(&query, scope).await?
        };

        results.retain(|result| result.distance <= distance_threshold);
        results.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(limit);

        if let (Some(first), Some(last)) = (results.first(), results.last()) {
            tracing::debug!(
                count = results.len(),
                distance_min = first.distance,
                distance_max = last.distance,
                metric = self.metric.name(),
                "retrieval complete"
            );
        }

        Ok(results)
    }

    async fn scan(
        &self,
        query: &[f32],
        scope: SourceScope,
    ) -> Result<Vec<RetrievalResult>, PipelineError> {
        let chunks = self.store.list_chunks(scope).await?;
        let mut results = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if chunk.embedding.len() != self.dimensions {
                return Err(PipelineError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: chunk.embedding.len(),
                });
            }
            results.push(RetrievalResult {
                chunk_id: chunk.id,
                source_id: chunk.source_id,
                chunk_text: chunk.text,
                distance: metric_distance(self.metric, query, &chunk.embedding),
            });
        }
        Ok(results)
    }
}

// Embeddings arrive unit-normalized, so 1 - dot is the cosine distance.
pub fn metric_distance(metric: DistanceMetric, query: &[f32], candidate: &[f32]) -> f64 {
    match metric {
        DistanceMetric::Cosine => 1.0 - dot(query, candidate),
        DistanceMetric::Euclidean => query
            .iter()
            .zip(candidate)
            .map(|(a, b)| {
                let diff = (*a - *b) as f64;
                diff * diff
            })
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::DotProduct => -dot(query, candidate),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::word_count;
    use crate::embeddings::{HashedNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
    use crate::models::NewChunk;
    use crate::stores::MemoryStore;
    use async_trait::async_trait;

    const TEXTS: [&str; 3] = [
        "Led a team of five engineers through a zero-downtime platform migration",
        "Wrote Python microservices handling forty thousand requests per second",
        "Designed Postgres schemas and tuned slow analytical queries",
    ];

    fn embed(text: &str) -> Vec<f32> {
        HashedNgramEmbedder::default().encode_one(text)
    }

    async fn seeded_store(texts: &[&str]) -> (MemoryStore, i64) {
        let store = MemoryStore::new();
        let source = store.create_source("resume text").await.unwrap();
        let chunks: Vec<NewChunk> = texts
            .iter()
            .map(|text| NewChunk {
                text: text.to_string(),
                word_count: word_count(text),
                embedding: embed(text),
            })
            .collect();
        store.append_chunks(source.id, &chunks).await.unwrap();
        (store, source.id)
    }

    fn retriever(store: MemoryStore) -> Retriever<MemoryStore> {
        Retriever::new(
            store,
            std::sync::Arc::new(HashedNgramEmbedder::default()),
            DistanceMetric::Cosine,
            DEFAULT_EMBEDDING_DIMENSIONS,
        )
    }

    #[tokio::test]
    async fn identical_vector_ranks_first_with_near_zero_distance() {
        let (store, source_id) = seeded_store(&TEXTS).await;
        let retriever = retriever(store);

        let results = retriever
            .retrieve(TEXTS[1], SourceScope::Source(source_id), 10, 2.0)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk_text, TEXTS[1]);
        assert!(results[0].distance.abs() < 1e-5);
        assert!(results[1].distance > results[0].distance);
    }

    #[tokio::test]
    async fn results_are_ordered_ascending_with_id_tie_break() {
        let duplicated = TEXTS[0];
        let (store, source_id) = seeded_store(&[duplicated, duplicated, TEXTS[2]]).await;
        let retriever = retriever(store);

        let results = retriever
            .retrieve(duplicated, SourceScope::Source(source_id), 10, 2.0)
            .await
            .unwrap();

        let ids: Vec<i64> = results.iter().map(|result| result.chunk_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(results[0].distance, results[1].distance);
        assert!(results[2].distance >= results[1].distance);
    }

    #[tokio::test]
    async fn threshold_filters_and_limit_truncates() {
        let (store, source_id) = seeded_store(&TEXTS).await;
        let retriever = retriever(store);

        let tight = retriever
            .retrieve(TEXTS[0], SourceScope::Source(source_id), 10, 0.1)
            .await
            .unwrap();
        assert_eq!(tight.len(), 1);
        assert_eq!(tight[0].chunk_text, TEXTS[0]);

        let limited = retriever
            .retrieve(TEXTS[0], SourceScope::Source(source_id), 2, 2.0)
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert!(limited[0].distance <= limited[1].distance);
    }

    #[tokio::test]
    async fn scoped_retrieval_sees_only_that_source() {
        let store = MemoryStore::new();
        let first = store.create_source("first resume").await.unwrap();
        let second = store.create_source("second resume").await.unwrap();
        store
            .append_chunks(
                first.id,
                &[NewChunk {
                    text: TEXTS[0].to_string(),
                    word_count: word_count(TEXTS[0]),
                    embedding: embed(TEXTS[0]),
                }],
            )
            .await
            .unwrap();
        store
            .append_chunks(
                second.id,
                &[NewChunk {
                    text: TEXTS[1].to_string(),
                    word_count: word_count(TEXTS[1]),
                    embedding: embed(TEXTS[1]),
                }],
            )
            .await
            .unwrap();

        let retriever = retriever(store);
        let results = retriever
            .retrieve(TEXTS[0], SourceScope::Source(second.id), 10, 2.0)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results.iter().all(|result| result.source_id == second.id));
    }

    #[tokio::test]
    async fn empty_scope_yields_empty_result() {
        let retriever = retriever(MemoryStore::new());
        let results = retriever
            .retrieve("any query at all", SourceScope::All, 10, 2.0)
            .await
            .unwrap();
        assert!(results.is_empty());

        let missing = retriever
            .retrieve("any query at all", SourceScope::Source(99), 10, 2.0)
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected() {
        let retriever = retriever(MemoryStore::new());

        let blank = retriever.retrieve("   ", SourceScope::All, 10, 0.5).await;
        assert!(matches!(blank, Err(PipelineError::Input(_))));

        let zero_limit = retriever.retrieve("query", SourceScope::All, 0, 0.5).await;
        assert!(matches!(zero_limit, Err(PipelineError::Input(_))));

        let negative = retriever.retrieve("query", SourceScope::All, 10, -0.1).await;
        assert!(matches!(negative, Err(PipelineError::Input(_))));
    }

    #[tokio::test]
    async fn stored_dimension_mismatch_is_fatal() {
        let store = MemoryStore::new();
        let source = store.create_source("resume").await.unwrap();
        store
            .append_chunks(
                source.id,
                &[NewChunk {
                    text: TEXTS[0].to_string(),
                    word_count: word_count(TEXTS[0]),
                    embedding: vec![0.5, 0.5, 0.5],
                }],
            )
            .await
            .unwrap();

        let retriever = retriever(store);
        let result = retriever
            .retrieve("query text", SourceScope::Source(source.id), 10, 2.0)
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::DimensionMismatch { actual: 3, .. })
        ));
    }

    struct NativeWrapper {
        inner: MemoryStore,
        metric: DistanceMetric,
    }

    #[async_trait]
    impl ChunkStore for NativeWrapper {
        fn ranks_natively(&self) -> bool {
            true
        }

        async fn create_source(&self, text: &str) -> Result<crate::StoredSource, PipelineError> {
            self.inner.create_source(text).await
        }

        async fn get_source(
            &self,
            source_id: i64,
        ) -> Result<Option<crate::StoredSource>, PipelineError> {
            self.inner.get_source(source_id).await
        }

        async fn append_chunks(
            &self,
            source_id: i64,
            chunks: &[NewChunk],
        ) -> Result<Vec<i64>, PipelineError> {
            self.inner.append_chunks(source_id, chunks).await
        }

        async fn list_chunks(
            &self,
            scope: SourceScope,
        ) -> Result<Vec<crate::StoredChunk>, PipelineError> {
            self.inner.list_chunks(scope).await
        }

        async fn rank_chunks(
            &self,
            query: &[f32],
            scope: SourceScope,
            limit: usize,
        ) -> Result<Vec<RetrievalResult>, PipelineError> {
            let mut results: Vec<RetrievalResult> = self
                .inner
                .list_chunks(scope)
                .await?
                .into_iter()
                .map(|chunk| RetrievalResult {
                    chunk_id: chunk.id,
                    source_id: chunk.source_id,
                    chunk_text: chunk.text,
                    distance: metric_distance(self.metric, query, &chunk.embedding),
                })
                .collect();
            results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            results.truncate(limit);
            Ok(results)
        }

        async fn delete_source(&self, source_id: i64) -> Result<(), PipelineError> {
            self.inner.delete_source(source_id).await
        }
    }

    #[tokio::test]
    async fn native_and_scan_backends_agree_on_ranking() {
        let (scan_store, source_id) = seeded_store(&TEXTS).await;
        let (native_inner, _) = seeded_store(&TEXTS).await;
        let native_store = NativeWrapper {
            inner: native_inner,
            metric: DistanceMetric::Cosine,
        };

        let scan = retriever(scan_store);
        let native = Retriever::new(
            native_store,
            std::sync::Arc::new(HashedNgramEmbedder::default()),
            DistanceMetric::Cosine,
            DEFAULT_EMBEDDING_DIMENSIONS,
        );

        let query = "leading an engineering team through a platform migration";
        let scope = SourceScope::Source(source_id);
        let from_scan = scan.retrieve(query, scope, 2, 2.0).await.unwrap();
        let from_native = native.retrieve(query, scope, 2, 2.0).await.unwrap();

        let scan_ids: Vec<i64> = from_scan.iter().map(|result| result.chunk_id).collect();
        let native_ids: Vec<i64> = from_native.iter().map(|result| result.chunk_id).collect();
        assert_eq!(scan_ids, native_ids);
        for (a, b) in from_scan.iter().zip(&from_native) {
            assert!((a.distance - b.distance).abs() < 1e-12);
        }
    }

    #[test]
    fn metric_distances_match_their_formulas() {
        let unit_x = [1.0f32, 0.0];
        let unit_y = [0.0f32, 1.0];

        assert!((metric_distance(DistanceMetric::Cosine, &unit_x, &unit_x)).abs() < 1e-9);
        assert!((metric_distance(DistanceMetric::Cosine, &unit_x, &unit_y) - 1.0).abs() < 1e-9);
        assert!(
            (metric_distance(DistanceMetric::Euclidean, &unit_x, &unit_y) - 2f64.sqrt()).abs()
                < 1e-9
        );
        assert!((metric_distance(DistanceMetric::DotProduct, &unit_x, &unit_x) + 1.0).abs() < 1e-9);
        assert_eq!(metric_distance(DistanceMetric::DotProduct, &unit_x, &unit_y), 0.0);
    }

    #[test]
    fn unknown_metric_name_falls_back_to_cosine() {
        assert_eq!(DistanceMetric::parse("manhattan"), DistanceMetric::Cosine);
        assert_eq!(DistanceMetric::parse("cosine"), DistanceMetric::Cosine);
        assert_eq!(DistanceMetric::parse("EUCLIDEAN"), DistanceMetric::Euclidean);
        assert_eq!(
            DistanceMetric::parse(" dot_product "),
            DistanceMetric::DotProduct
        );
    }
}
