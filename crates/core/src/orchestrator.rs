use std::sync::Arc;

use crate::chunking::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::error::{IngestError, PipelineError};
use crate::generation::Generator;
use crate::ingest::{ingest_source, source_stats, IngestOutcome, SourceStats};
use crate::models::{
    PipelineOptions, RequestEcho, RetrievalResult, RetrievalSummary, SamplingOptions, SourceScope,
    SourceSummary, TailorMetadata, TailorOutcome, TailorRequest,
};
use crate::retrieval::Retriever;
use crate::traits::{ChunkStore, CompletionClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Retrieving,
    Generating,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Retrieving => "retrieving",
            PipelineStage::Generating => "generating",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

pub struct TailorPipeline<S, C>
where
    S: ChunkStore,
    C: CompletionClient,
{
    retriever: Retriever<S>,
    generator: Generator<C>,
    embedder: Arc<dyn Embedder>,
    options: PipelineOptions,
}

impl<S, C> TailorPipeline<S, C>
where
    S: ChunkStore,
    C: CompletionClient,
{
    pub fn new(store: S, client: C, embedder: Arc<dyn Embedder>, options: PipelineOptions) -> Self {
        let retriever = Retriever::new(
            store,
            Arc::clone(&embedder),
            options.metric,
            options.dimensions,
        );
        let generator = Generator::new(client, SamplingOptions::from(&options));
        Self {
            retriever,
            generator,
            embedder,
            options,
        }
    }

    pub fn store(&self) -> &S {
        self.retriever.store()
    }

    pub async fn ingest(&self, raw_text: &str) -> Result<IngestOutcome, IngestError> {
        ingest_source(
            self.retriever.store(),
            self.embedder.as_ref(),
            &ChunkingConfig::from(&self.options),
            raw_text,
        )
        .await
    }

    pub async fn retrieve(
        &self,
        query_text: &str,
        scope: SourceScope,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>, PipelineError> {
        self.retriever
            .retrieve(query_text, scope, limit, self.options.distance_threshold)
            .await
    }

    pub async fn stats(&self, source_id: i64) -> Result<SourceStats, PipelineError> {
        source_stats(self.retriever.store(), source_id).await
    }

    pub async fn delete_source(&self, source_id: i64) -> Result<(), PipelineError> {
        self.retriever
            .store()
            .get_source(source_id)
            .await?
            .ok_or(PipelineError::SourceNotFound(source_id))?;
        self.retriever.store().delete_source(source_id).await
    }

    pub async fn tailor(&self, request: &TailorRequest) -> Result<TailorOutcome, PipelineError> {
        match self.run(request).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                tracing::warn!(
                    source_id = request.source_id,
                    stage = PipelineStage::Failed.name(),
                    error = %error,
                    "tailor run failed"
                );
                Err(error)
            }
        }
    }

    async fn run(&self, request: &TailorRequest) -> Result<TailorOutcome, PipelineError> {
        tracing::debug!(
            source_id = request.source_id,
            stage = PipelineStage::Retrieving.name(),
            "tailor run started"
        );

        let source = self
            .retriever
            .store()
            .get_source(request.source_id)
            .await?
            .ok_or(PipelineError::SourceNotFound(request.source_id))?;

        let chunks = self
            .retriever
            .retrieve(
                &request.query_text,
                SourceScope::Source(request.source_id),
                request.retrieval_limit,
                self.options.distance_threshold,
            )
            .await?;

        if chunks.is_empty() {
            return Err(PipelineError::NoRelevantContent {
                source_id: request.source_id,
                threshold: self.options.distance_threshold,
            });
        }

        tracing::debug!(
            source_id = request.source_id,
            stage = PipelineStage::Generating.name(),
            chunks = chunks.len(),
            "retrieval complete"
        );

        let generation = self
            .generator
            .generate(
                &chunks,
                &request.query_text,
                request.max_statements,
                request.style,
            )
            .await?;

        let distance_min = chunks.first().map(|chunk| chunk.distance).unwrap_or(0.0);
        let distance_max = chunks.last().map(|chunk| chunk.distance).unwrap_or(0.0);

        let outcome = TailorOutcome {
            source_id: request.source_id,
            statements: generation.statements,
            cited_chunk_refs: generation.cited_chunk_refs,
            chunk_count: generation.chunk_count,
            metadata: TailorMetadata {
                generation: generation.metadata,
                retrieval: RetrievalSummary {
                    chunks_retrieved: chunks.len(),
                    retrieval_limit: request.retrieval_limit,
                    distance_min,
                    distance_max,
                },
                request: RequestEcho {
                    style: request.style,
                    max_statements: request.max_statements,
                    retrieval_limit: request.retrieval_limit,
                },
                source: SourceSummary {
                    id: source.id,
                    created_at: source.created_at,
                    text_chars: source.text.chars().count(),
                },
            },
        };

        tracing::info!(
            source_id = request.source_id,
            stage = PipelineStage::Done.name(),
            statements = outcome.statements.len(),
            "tailor run complete"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashedNgramEmbedder;
    use crate::models::Style;
    use crate::stores::MemoryStore;
    use crate::traits::Completion;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RESUME: &str = "EXPERIENCE\nBuilt X at Y for three years managing a team of five engineers and delivering Z.\nEDUCATION\nBS in Computer Science from W University with honors completed in 2015.";

    struct FakeCompletionClient {
        reply: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CompletionClient for FakeCompletionClient {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _sampling: &SamplingOptions,
        ) -> Result<Completion, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion {
                text: self.reply.clone(),
                tokens_used: 7,
            })
        }
    }

    struct FailingCompletionClient;

    #[async_trait]
    impl CompletionClient for FailingCompletionClient {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _sampling: &SamplingOptions,
        ) -> Result<Completion, PipelineError> {
            Err(PipelineError::BackendResponse {
                backend: "openai".to_string(),
                details: "upstream unavailable".to_string(),
            })
        }
    }

    fn options(distance_threshold: f64) -> PipelineOptions {
        PipelineOptions {
            chunk_max_words: 50,
            distance_threshold,
            ..PipelineOptions::default()
        }
    }

    fn pipeline_replying(
        reply: &str,
        distance_threshold: f64,
    ) -> (
        TailorPipeline<MemoryStore, FakeCompletionClient>,
        Arc<AtomicUsize>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = FakeCompletionClient {
            reply: reply.to_string(),
            calls: Arc::clone(&calls),
        };
        let pipeline = TailorPipeline::new(
            MemoryStore::new(),
            client,
            Arc::new(HashedNgramEmbedder::default()),
            options(distance_threshold),
        );
        (pipeline, calls)
    }

    fn request(source_id: i64) -> TailorRequest {
        TailorRequest {
            source_id,
            query_text: "Looking for an engineering manager who has led platform teams"
                .to_string(),
            max_statements: 8,
            style: Style::Professional,
            retrieval_limit: 12,
        }
    }

    #[tokio::test]
    async fn end_to_end_run_produces_cited_statements() {
        let reply = "\u{2022} Led five engineers through platform delivery [ref 1]\n\u{2022} Holds a computer science degree with honors [ref 2]";
        let (pipeline, calls) = pipeline_replying(reply, 2.0);

        let ingested = pipeline.ingest(RESUME).await.expect("ingest should succeed");
        assert_eq!(ingested.chunk_count, 2);

        let outcome = pipeline
            .tailor(&request(ingested.source_id))
            .await
            .expect("tailor should succeed");

        assert_eq!(outcome.statements.len(), 2);
        assert_eq!(outcome.cited_chunk_refs, vec![0, 1]);
        assert_eq!(outcome.chunk_count, 2);
        assert_eq!(outcome.metadata.retrieval.chunks_retrieved, 2);
        assert!(
            outcome.metadata.retrieval.distance_min <= outcome.metadata.retrieval.distance_max
        );
        assert_eq!(outcome.metadata.source.id, ingested.source_id);
        assert_eq!(outcome.metadata.request.max_statements, 8);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_source_fails_before_any_backend_work() {
        let (pipeline, calls) = pipeline_replying("\u{2022} fine [ref 1]", 2.0);

        let error = pipeline.tailor(&request(99)).await.unwrap_err();
        assert!(matches!(error, PipelineError::SourceNotFound(99)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_results_fail_with_no_relevant_content() {
        let (pipeline, calls) = pipeline_replying("\u{2022} fine [ref 1]", 0.0);
        let ingested = pipeline.ingest(RESUME).await.unwrap();

        let mut unrelated = request(ingested.source_id);
        unrelated.query_text = "xylophone quartz zephyr".to_string();

        let error = pipeline.tailor(&unrelated).await.unwrap_err();
        assert!(matches!(
            error,
            PipelineError::NoRelevantContent { source_id, .. } if source_id == ingested.source_id
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generator_failure_fails_the_run() {
        let pipeline = TailorPipeline::new(
            MemoryStore::new(),
            FailingCompletionClient,
            Arc::new(HashedNgramEmbedder::default()),
            options(2.0),
        );
        let ingested = pipeline.ingest(RESUME).await.unwrap();

        let error = pipeline.tailor(&request(ingested.source_id)).await.unwrap_err();
        assert!(matches!(
            error,
            PipelineError::BackendResponse { backend, .. } if backend == "openai"
        ));
    }

    #[tokio::test]
    async fn empty_ingest_never_reaches_generation() {
        let (pipeline, calls) = pipeline_replying("\u{2022} fine [ref 1]", 2.0);

        let error = pipeline.ingest("").await.unwrap_err();
        assert!(matches!(error, IngestError::Input(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retrieve_previews_scoped_chunks() {
        let (pipeline, _) = pipeline_replying("\u{2022} fine [ref 1]", 2.0);
        let ingested = pipeline.ingest(RESUME).await.unwrap();

        let preview = pipeline
            .retrieve(
                "computer science degree",
                SourceScope::Source(ingested.source_id),
                1,
            )
            .await
            .unwrap();

        assert_eq!(preview.len(), 1);
        assert!(preview[0].chunk_text.starts_with("EDUCATION"));
    }

    #[tokio::test]
    async fn stats_summarize_an_ingested_source() {
        let (pipeline, _) = pipeline_replying("\u{2022} fine [ref 1]", 2.0);
        let ingested = pipeline.ingest(RESUME).await.unwrap();

        let stats = pipeline.stats(ingested.source_id).await.unwrap();
        assert_eq!(stats.chunk_count, 2);
        assert!(stats.average_chunk_words >= 10.0);
    }

    #[tokio::test]
    async fn deleting_a_source_cascades_to_its_chunks() {
        let (pipeline, _) = pipeline_replying("\u{2022} fine [ref 1]", 2.0);
        let ingested = pipeline.ingest(RESUME).await.unwrap();

        pipeline.delete_source(ingested.source_id).await.unwrap();

        let stats = pipeline.stats(ingested.source_id).await;
        assert!(matches!(stats, Err(PipelineError::SourceNotFound(_))));
        let chunks = pipeline
            .store()
            .list_chunks(SourceScope::All)
            .await
            .unwrap();
        assert!(chunks.is_empty());

        let missing = pipeline.delete_source(404).await;
        assert!(matches!(missing, Err(PipelineError::SourceNotFound(404))));
    }
}
