//! Operator entry point for the back-fill pipeline (§9 "operational
//! surface"): builds the dependency chain once at startup from layered
//! config, then runs a single `backfill` or `stats` command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use embedding_core::cancellation::CancellationToken;
use embedding_core::config::{CacheBackendKind, Settings, StoreBackendKind};
use embedding_core::error::EmbeddingError;
use embedding_core::traits::{EmbeddingCacheBackend, EmbeddingProvider, EmbeddingStore};
use embedding_pipeline::{BackfillConfig, BackfillPipeline, RecordOp};
use embedding_provider::cache::{MemoryEmbeddingCache, RedisEmbeddingCache};
use embedding_provider::provider::HttpEmbeddingProvider;
use embedding_provider::EmbeddingService;
use embedding_store::{InMemoryEmbeddingStore, PostgresEmbeddingStore};
use tracing_subscriber::EnvFilter;

const DEFAULT_MODEL: &str = "text-embedding-3-small";
/// In-process LRU bound when no size comes from config; mirrors the cache
/// crate's own test default of "generous enough not to matter in practice".
const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 10_000;

#[derive(Parser)]
#[command(
    name = "embedding-pipeline",
    about = "Back-fill and inspect document/knowledge-item embeddings"
)]
struct Cli {
    /// TOML config file (optional; env vars and defaults fill the rest).
    #[arg(long, env = "EMBEDDING_CONFIG_FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed every record missing a vector, or a caller-supplied id list.
    Backfill {
        #[command(subcommand)]
        kind: BackfillKind,
    },
    /// Print store coverage and exit.
    Stats,
}

#[derive(Subcommand)]
enum BackfillKind {
    Documents {
        /// Specific ids to (re-)embed; omit to drive every missing-vector document.
        #[arg(long)]
        ids: Vec<String>,
    },
    Knowledge {
        /// Specific ids to (re-)embed; omit to drive every missing-vector item.
        #[arg(long)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_tracing(&settings.log_level);

    match settings.store_backend {
        StoreBackendKind::Memory => {
            let store = Arc::new(InMemoryEmbeddingStore::new());
            run(&settings, store, cli.command).await
        }
        StoreBackendKind::Postgres => {
            let dsn = settings
                .postgres_dsn
                .as_deref()
                .ok_or_else(|| EmbeddingError::ConfigMissing("postgres_dsn".into()))?;
            let store = Arc::new(PostgresEmbeddingStore::connect(dsn, true).await?);
            run(&settings, store, cli.command).await
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_provider(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let api_key = settings.provider_api_key.clone().unwrap_or_default();
    let provider = HttpEmbeddingProvider::new(
        settings.provider_url.clone(),
        api_key,
        DEFAULT_MODEL.to_string(),
        settings.provider_timeout(),
    )?;
    Ok(Arc::new(provider))
}

fn build_cache(settings: &Settings) -> Result<Arc<dyn EmbeddingCacheBackend>, EmbeddingError> {
    match settings.cache_backend {
        CacheBackendKind::Memory => Ok(Arc::new(MemoryEmbeddingCache::new(
            DEFAULT_MEMORY_CACHE_CAPACITY,
        ))),
        CacheBackendKind::Redis => {
            let url = settings
                .redis_url
                .as_deref()
                .ok_or_else(|| EmbeddingError::ConfigMissing("redis_url".into()))?;
            Ok(Arc::new(RedisEmbeddingCache::new(url)?))
        }
    }
}

async fn run<S: EmbeddingStore + 'static>(
    settings: &Settings,
    store: Arc<S>,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Stats => {
            let stats = store.stats().await?;
            println!(
                "documents: {}/{} embedded",
                stats.docs_with_vector, stats.docs_total
            );
            println!(
                "knowledge (active): {}/{} embedded",
                stats.knowledge_with_vector, stats.knowledge_total_active
            );
            Ok(())
        }
        Command::Backfill { kind } => {
            let provider = build_provider(settings)?;
            let cache = build_cache(settings)?;
            let service = Arc::new(EmbeddingService::new(
                provider,
                cache,
                store,
                settings.cache_ttl_secs,
                settings.batch_inter_call_delay(),
            ));
            let pipeline = BackfillPipeline::new(service, BackfillConfig::from(&settings.pipeline));

            let cancellation = CancellationToken::new();
            let shutdown = cancellation.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown signal received, finishing the current page");
                    shutdown.cancel();
                }
            });

            let (op, ids) = match kind {
                BackfillKind::Documents { ids } => (RecordOp::Documents, ids),
                BackfillKind::Knowledge { ids } => (RecordOp::Knowledge, ids),
            };

            let report = if ids.is_empty() {
                pipeline.process_all(op, &cancellation).await
            } else {
                pipeline.process_specific(op, ids, &cancellation).await
            };

            println!(
                "processed={} successful={} failed={} cancelled={}",
                report.total_processed, report.successful, report.failed, report.cancelled
            );
            for error in &report.errors {
                eprintln!("error: {error}");
            }

            if report.failed > 0 && report.successful == 0 && !report.cancelled {
                anyhow::bail!("back-fill run completed with no successful records");
            }
            Ok(())
        }
    }
}
