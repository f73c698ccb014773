use chrono::Utc;
use clap::{Parser, Subcommand};
use resume_rag_core::{
    ChatCompletionsClient, DistanceMetric, Embedder, HashedNgramEmbedder, PipelineOptions,
    QdrantStore, SourceScope, Style, TailorPipeline, TailorRequest, DEFAULT_COMPLETIONS_BASE_URL,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "resume-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection holding resume chunks
    #[arg(long, default_value = "resume_chunks")]
    qdrant_collection: String,

    /// Chat completions base URL
    #[arg(long, default_value = DEFAULT_COMPLETIONS_BASE_URL)]
    openai_base_url: String,

    /// API key for the completions backend
    #[arg(long, env = "OPENAI_API_KEY", default_value = "")]
    openai_api_key: String,

    /// Completion model
    #[arg(long, default_value = "gpt-4o")]
    openai_model: String,

    /// Similarity metric: cosine, euclidean or dot_product
    #[arg(long, default_value = "cosine")]
    metric: String,

    /// Retrieval distance threshold
    #[arg(long, default_value = "0.5")]
    distance_threshold: f64,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a plain-text resume: normalize, chunk, embed and store.
    Ingest {
        /// Path to the resume file.
        #[arg(long)]
        file: String,
    },
    /// Preview retrieval for a query without generating statements.
    Search {
        /// Query text
        #[arg(long)]
        query: String,
        /// Restrict the search to one source.
        #[arg(long)]
        source_id: Option<i64>,
        /// Number of chunks to return.
        #[arg(long, default_value = "12")]
        limit: usize,
    },
    /// Tailor a stored resume against a job description.
    Tailor {
        /// Source to tailor.
        #[arg(long)]
        source_id: i64,
        /// Path to the job description text.
        #[arg(long)]
        jd_file: String,
        /// Upper bound requested from the model.
        #[arg(long, default_value = "8")]
        max_statements: usize,
        /// Statement style: professional, concise or impact.
        #[arg(long, default_value = "professional")]
        style: String,
        /// Chunks to retrieve before generation.
        #[arg(long, default_value = "12")]
        retrieval_limit: usize,
    },
    /// Summarize an ingested source.
    Stats {
        /// Source to describe.
        #[arg(long)]
        source_id: i64,
    },
    /// Delete a source and all of its chunks.
    Delete {
        /// Source to remove.
        #[arg(long)]
        source_id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let options = PipelineOptions {
        metric: DistanceMetric::parse(&cli.metric),
        distance_threshold: cli.distance_threshold,
        model: cli.openai_model.clone(),
        ..PipelineOptions::default()
    };

    let embedder: Arc<dyn Embedder> = Arc::new(HashedNgramEmbedder::default());
    let store = QdrantStore::new(
        &cli.qdrant_url,
        &cli.qdrant_collection,
        options.dimensions,
        options.metric,
    );
    let client = ChatCompletionsClient::new(
        &cli.openai_base_url,
        &cli.openai_api_key,
        Duration::from_secs(options.completion_timeout_secs),
    )
    .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let pipeline = TailorPipeline::new(store, client, embedder, options);
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "resume-rag boot"
    );

    match cli.command {
        Command::Ingest { file } => {
            let text = tokio::fs::read_to_string(&file).await?;

            pipeline
                .store()
                .ensure_collections()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let outcome = pipeline
                .ingest(&text)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "source {} ingested: {} chunks from {} chars at {}",
                outcome.source_id,
                outcome.chunk_count,
                outcome.text_chars,
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            source_id,
            limit,
        } => {
            let scope = match source_id {
                Some(id) => SourceScope::Source(id),
                None => SourceScope::All,
            };

            let results = pipeline
                .retrieve(&query, scope, limit)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("query: {query}");
            if results.is_empty() {
                println!("no chunks within the distance threshold");
            }
            for hit in results {
                println!(
                    "[chunk {}] distance={:.4} source={}",
                    hit.chunk_id, hit.distance, hit.source_id
                );
                println!("  {}", hit.chunk_text);
            }
        }
        Command::Tailor {
            source_id,
            jd_file,
            max_statements,
            style,
            retrieval_limit,
        } => {
            let jd_text = tokio::fs::read_to_string(&jd_file).await?;
            let request = TailorRequest {
                source_id,
                query_text: jd_text,
                max_statements,
                style: Style::parse(&style),
                retrieval_limit,
            };

            let outcome = pipeline
                .tailor(&request)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for statement in &outcome.statements {
                println!("{statement}");
            }
            println!(
                "cited_chunks={:?} of {} retrieved",
                outcome.cited_chunk_refs, outcome.chunk_count
            );

            let meta = &outcome.metadata;
            println!(
                "model={} style={} tokens_used={} distance_min={:.4} distance_max={:.4}",
                meta.generation.model,
                meta.generation.style.name(),
                meta.generation.tokens_used,
                meta.retrieval.distance_min,
                meta.retrieval.distance_max
            );
        }
        Command::Stats { source_id } => {
            let stats = pipeline
                .stats(source_id)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "source {}: created_at={} words={} chunks={} avg_chunk_words={:.1}",
                stats.source_id,
                stats.created_at.to_rfc3339(),
                stats.text_words,
                stats.chunk_count,
                stats.average_chunk_words
            );
        }
        Command::Delete { source_id } => {
            pipeline
                .delete_source(source_id)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("source {source_id} deleted");
        }
    }

    Ok(())
}
