use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::IngestionPipeline;

const QUEUE_CAPACITY: usize = 100;
const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;

/// One asynchronous unit of work, dispatched at upload time.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub document_id: Uuid,
}

/// Spawn the background worker pool. Documents are independent, so the pool
/// processes them in parallel up to `workers`; within one job the pipeline
/// stages stay strictly sequential. A failed document is retried end to end
/// with exponential back-off. Dropping the returned sender drains and stops
/// the workers.
pub fn spawn_workers(
    pipeline: Arc<IngestionPipeline>,
    workers: usize,
    max_retries: u32,
) -> mpsc::Sender<IngestJob> {
    let (tx, rx) = mpsc::channel::<IngestJob>(QUEUE_CAPACITY);
    let rx = Arc::new(Mutex::new(rx));

    for worker_id in 0..workers.max(1) {
        let rx = rx.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            loop {
                let job = { rx.lock().await.recv().await };
                let Some(job) = job else {
                    info!(worker_id, "ingestion worker shutting down");
                    break;
                };
                run_job(worker_id, &pipeline, job, max_retries).await;
            }
        });
    }

    tx
}

async fn run_job(worker_id: usize, pipeline: &IngestionPipeline, job: IngestJob, max_retries: u32) {
    let attempts = max_retries.max(1);
    let mut backoff = Duration::from_millis(BASE_BACKOFF_MS);

    for attempt in 1..=attempts {
        match pipeline.process(job.document_id).await {
            Ok(records) => {
                info!(
                    worker_id,
                    document_id = %job.document_id,
                    attempt,
                    records,
                    "document processed"
                );
                return;
            }
            Err(err) => {
                if attempt < attempts {
                    warn!(
                        worker_id,
                        document_id = %job.document_id,
                        attempt,
                        error = %err,
                        "ingestion failed, retrying"
                    );
                    let jitter = Duration::from_millis(fastrand::u64(0..250));
                    sleep(backoff + jitter).await;
                    backoff = (backoff * 2).min(Duration::from_millis(MAX_BACKOFF_MS));
                } else {
                    error!(
                        worker_id,
                        document_id = %job.document_id,
                        attempts,
                        error = %err,
                        "ingestion failed, giving up"
                    );
                }
            }
        }
    }
}
