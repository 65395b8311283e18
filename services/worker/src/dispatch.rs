//! services/worker/src/dispatch.rs
//!
//! An in-process task dispatcher. "Process this upload" jobs go onto a channel and
//! a fixed pool of workers runs them. Delivery may repeat a job; the run's claim
//! turns a duplicate into a skipped outcome.

use crate::error::WorkerError;
use crate::pipeline::run_upload;
use crate::state::WorkerState;
use doomlearn_core::lifecycle::{RunOutcome, RunOutcomeKind};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const QUEUE_CAPACITY: usize = 64;

/// One unit of dispatched work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub upload_id: Uuid,
    /// Regenerate an upload that is already `ready`, or take over one held by
    /// another run.
    pub force: bool,
}

/// What a dispatcher did before it shut down.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<RunOutcome>,
    /// Jobs still queued when the dispatcher was cancelled. They were never run.
    pub dropped: Vec<Job>,
}

pub struct Dispatcher {
    sender: mpsc::Sender<Job>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<Vec<RunOutcome>>>,
}

impl Dispatcher {
    /// Spawns `concurrency` workers sharing one job queue.
    pub fn start(state: Arc<WorkerState>, concurrency: usize) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let workers = (0..concurrency.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    state.clone(),
                    receiver.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        Self {
            sender,
            receiver,
            cancel,
            workers,
        }
    }

    pub async fn dispatch(&self, upload_id: Uuid, force: bool) -> Result<(), WorkerError> {
        self.sender
            .send(Job { upload_id, force })
            .await
            .map_err(|_| WorkerError::Internal("Dispatcher is shut down".to_string()))
    }

    /// Cancelling stops workers from taking new jobs; runs in flight complete.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Closes the queue and waits for the workers. Without cancellation they drain
    /// the queue; after it, the jobs left behind are reported as dropped.
    pub async fn shutdown(self) -> DispatchReport {
        drop(self.sender);
        let mut report = DispatchReport::default();
        for joined in futures::future::join_all(self.workers).await {
            match joined {
                Ok(mut finished) => report.outcomes.append(&mut finished),
                Err(e) => error!("Dispatcher worker panicked: {:?}", e),
            }
        }

        let mut receiver = self.receiver.lock().await;
        while let Ok(job) = receiver.try_recv() {
            warn!(
                upload_id = %job.upload_id,
                force = job.force,
                "Dropping queued job after cancellation"
            );
            report.dropped.push(job);
        }
        report
    }
}

async fn worker_loop(
    worker: usize,
    state: Arc<WorkerState>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
) -> Vec<RunOutcome> {
    let mut outcomes = Vec::new();
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(worker, "Worker cancelled.");
                break;
            }
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        info!(worker, upload_id = %job.upload_id, force = job.force, "Picked up job");
        let outcome = run_upload(state.clone(), job.upload_id, job.force).await;
        match &outcome.kind {
            RunOutcomeKind::Ready => info!(worker, upload_id = %job.upload_id, "Upload ready"),
            RunOutcomeKind::Failed { error } => {
                warn!(worker, upload_id = %job.upload_id, "Upload failed: {}", error)
            }
            RunOutcomeKind::Skipped { status } => {
                info!(worker, upload_id = %job.upload_id, %status, "Duplicate delivery skipped")
            }
        }
        outcomes.push(outcome);
    }
    outcomes
}
