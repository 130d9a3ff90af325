//! Bounded-concurrency worker pool with per-item retry and cooperative
//! cancellation (§4.6, §5), grounded in the producer/bounded-channel/
//! worker-pool idiom used elsewhere in the corpus for async background
//! work, adapted here to the spec's linear (not exponential) retry delay.

use std::sync::Arc;
use std::time::{Duration, Instant};

use embedding_core::cancellation::CancellationToken;
use embedding_core::config::PipelineSettings;
use embedding_core::traits::EmbeddingStore;
use embedding_core::types::PipelineReport;
use embedding_provider::EmbeddingService;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Which kind-specific embedding operation and store listing a run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOp {
    Documents,
    Knowledge,
}

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl From<&PipelineSettings> for BackfillConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            max_workers: settings.max_workers,
            retry_attempts: settings.retry_attempts,
            retry_delay: settings.retry_delay(),
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

pub struct BackfillPipeline<S: EmbeddingStore> {
    service: Arc<EmbeddingService<S>>,
    config: BackfillConfig,
}

impl<S: EmbeddingStore + 'static> BackfillPipeline<S> {
    pub fn new(service: Arc<EmbeddingService<S>>, config: BackfillConfig) -> Self {
        Self { service, config }
    }

    /// `process_all_documents()` / `process_all_knowledge()` (§4.6): loop
    /// over pages until a page comes back empty, checking cancellation
    /// between pages.
    pub async fn process_all(
        &self,
        op: RecordOp,
        cancellation: &CancellationToken,
    ) -> PipelineReport {
        let mut aggregate = PipelineReport::default();
        loop {
            let ids = match self.list_missing(op).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(error = %e, "store fault listing records missing a vector, stopping run");
                    aggregate.errors.push(format!("store fault: {e}"));
                    break;
                }
            };
            if ids.is_empty() {
                break;
            }

            let page_report = self.process_page(ids, op, cancellation).await;
            aggregate.merge(page_report);

            if cancellation.is_cancelled() {
                aggregate.cancelled = true;
                break;
            }
        }
        info!(
            total = aggregate.total_processed,
            successful = aggregate.successful,
            failed = aggregate.failed,
            cancelled = aggregate.cancelled,
            "back-fill run complete"
        );
        aggregate
    }

    /// `process_specific([ids])` (§4.6): a single-batch drive over a
    /// caller-supplied id list, using the same worker pool as a page.
    pub async fn process_specific(
        &self,
        op: RecordOp,
        ids: Vec<String>,
        cancellation: &CancellationToken,
    ) -> PipelineReport {
        self.process_page(ids, op, cancellation).await
    }

    async fn list_missing(
        &self,
        op: RecordOp,
    ) -> Result<Vec<String>, embedding_core::error::EmbeddingError> {
        match op {
            RecordOp::Documents => {
                self.service
                    .store()
                    .list_documents_missing_vector(self.config.batch_size)
                    .await
            }
            RecordOp::Knowledge => {
                self.service
                    .store()
                    .list_knowledge_missing_vector(self.config.batch_size)
                    .await
            }
        }
    }

    /// Per-page algorithm (§4.6 steps 1-4): bounded channel of ids, a
    /// worker pool pulling from it with retry, a producer that enqueues
    /// then closes the channel, and a collector that aggregates outcomes.
    async fn process_page(
        &self,
        ids: Vec<String>,
        op: RecordOp,
        cancellation: &CancellationToken,
    ) -> PipelineReport {
        let total = ids.len();
        if total == 0 {
            return PipelineReport::default();
        }

        let start = Instant::now();
        let worker_count = self.config.max_workers.max(1).min(total);

        let (id_tx, id_rx) = mpsc::channel::<String>(self.config.batch_size.max(1));
        let id_rx = Arc::new(Mutex::new(id_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<Result<(), String>>(total);

        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let id_rx = id_rx.clone();
            let result_tx = result_tx.clone();
            let service = self.service.clone();
            let retry_attempts = self.config.retry_attempts;
            let retry_delay = self.config.retry_delay;
            let cancellation = cancellation.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let next = id_rx.lock().await.recv().await;
                    let Some(id) = next else { break };
                    let outcome = embed_with_retry(
                        &service,
                        op,
                        &id,
                        retry_attempts,
                        retry_delay,
                        &cancellation,
                    )
                    .await;
                    if result_tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        for id in ids {
            if cancellation.is_cancelled() {
                break;
            }
            if id_tx.send(id).await.is_err() {
                break;
            }
        }
        drop(id_tx);

        let mut report = PipelineReport::default();
        while let Some(outcome) = result_rx.recv().await {
            report.total_processed += 1;
            match outcome {
                Ok(()) => report.successful += 1,
                Err(message) => {
                    report.failed += 1;
                    report.errors.push(message);
                }
            }
        }

        for worker in workers {
            let _ = worker.await;
        }

        report.duration = start.elapsed();
        report.cancelled = cancellation.is_cancelled();
        report
    }
}

/// Per-item retry (§4.6 "Per-item retry"): attempts `0..=retry_attempts`,
/// waiting `retry_delay` between attempts (cancellation-aware), recording
/// the last error. Fatal errors (`DimensionMismatch`, `ConfigMissing`) stop
/// retrying immediately rather than burning the retry budget.
async fn embed_with_retry<S: EmbeddingStore>(
    service: &Arc<EmbeddingService<S>>,
    op: RecordOp,
    id: &str,
    retry_attempts: u32,
    retry_delay: Duration,
    cancellation: &CancellationToken,
) -> Result<(), String> {
    let mut last_error: Option<embedding_core::error::EmbeddingError> = None;

    for attempt in 0..=retry_attempts {
        if attempt > 0 {
            // A provider-supplied Retry-After hint floors the fixed delay;
            // it never shortens it.
            let wait = match last_error.as_ref().and_then(|e| e.retry_after()) {
                Some(hint) => retry_delay.max(Duration::from_secs(hint)),
                None => retry_delay,
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancellation.cancelled() => {
                    return Err(format!(
                        "id={id} attempts={attempt} cancelled during retry wait"
                    ));
                }
            }
        }

        if cancellation.is_cancelled() {
            return Err(format!("id={id} attempts={attempt} cancelled"));
        }

        let result = match op {
            RecordOp::Documents => service.embed_document(id).await,
            RecordOp::Knowledge => service.embed_knowledge(id).await,
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_fatal() => {
                return Err(format!("id={id} attempts={} fatal: {e}", attempt + 1));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(format!(
        "id={id} attempts={} exhausted: {}",
        retry_attempts + 1,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
