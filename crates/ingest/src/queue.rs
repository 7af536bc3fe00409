//! In-process ingestion job queue.
//!
//! Handlers enqueue; one worker task drains sequentially. The contract is
//! the same as a distributed queue's — a job id in, an eventual status
//! transition out — so the transport can be swapped without touching the
//! worker.

use crate::worker::IngestWorker;
use kindred_core::error::Error;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// A unit of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestJob {
    /// Extract, chunk, embed, and index one uploaded file.
    ProcessFile(Uuid),
    /// Remove a deleted file's vectors from the index.
    PurgeFileVectors(Uuid),
    /// Remove a deleted companion's vectors from the index.
    PurgeCompanionVectors(Uuid),
}

/// Handle for enqueueing ingestion jobs.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<IngestJob>,
}

impl JobQueue {
    /// Spawn the worker loop and return the enqueue handle.
    pub fn start(worker: Arc<IngestWorker>) -> Self {
        let (tx, mut rx) = mpsc::channel::<IngestJob>(256);

        tokio::spawn(async move {
            info!("Ingestion worker started");
            while let Some(job) = rx.recv().await {
                match job {
                    IngestJob::ProcessFile(file_id) => worker.process_file(file_id).await,
                    IngestJob::PurgeFileVectors(file_id) => {
                        worker.purge_file_vectors(file_id).await
                    }
                    IngestJob::PurgeCompanionVectors(companion_id) => {
                        worker.purge_companion_vectors(companion_id).await
                    }
                }
            }
            info!("Ingestion worker stopped");
        });

        Self { tx }
    }

    /// Enqueue a job. Fails only if the worker task has shut down.
    pub async fn enqueue(&self, job: IngestJob) -> Result<(), Error> {
        self.tx.send(job).await.map_err(|_| {
            warn!("Ingestion queue is closed");
            Error::Internal("ingestion queue is closed".into())
        })
    }
}
