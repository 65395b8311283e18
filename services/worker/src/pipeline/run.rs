//! services/worker/src/pipeline/run.rs
//!
//! The upload lifecycle boundary. A run claims the upload, extracts and embeds its
//! text, generates every eligible leaf topic, and records `ready` or `failed`.
//! Errors never escape: the caller always receives a `RunOutcome`.

use super::topic::{process_topic, TopicContext};
use crate::state::WorkerState;
use doomlearn_core::chunking::chunk_text;
use doomlearn_core::domain::{NewChunk, Topic, UploadStatus};
use chrono::Utc;
use doomlearn_core::lifecycle::{ClaimRule, RunOutcome, RunOutcomeKind};
use doomlearn_core::topics::TopicTree;
use doomlearn_core::PipelineError;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Topic counters, kept outside `execute` so a failed run still reports them.
#[derive(Default)]
struct Tally {
    attempted: usize,
    completed: usize,
}

/// Processes one upload end to end.
///
/// Without `force` only `uploaded` and `failed` uploads are claimed, plus uploads
/// whose run has held them longer than the run lease. With `force`, `ready` uploads
/// are regenerated and uploads held by another run are taken over. Anything else is
/// left alone and reported as skipped.
pub async fn run_upload(state: Arc<WorkerState>, upload_id: Uuid, force: bool) -> RunOutcome {
    let run_id = Uuid::new_v4();
    let started = Instant::now();
    let rule = ClaimRule::new(force, state.pipeline.run_lease, Utc::now());

    match state.db.claim_upload(upload_id, &rule, run_id).await
    {
        Ok(true) => info!(%upload_id, %run_id, "Claimed upload for processing"),
        Ok(false) => {
            return match state.db.get_upload(upload_id).await {
                Ok(upload) => {
                    info!(%upload_id, status = %upload.status, "Upload not claimable; skipping");
                    RunOutcome::skipped(upload_id, upload.status)
                }
                Err(e) => unclaimed_failure(upload_id, e.into()),
            };
        }
        Err(e) => return unclaimed_failure(upload_id, e.into()),
    }

    let mut tally = Tally::default();
    let result = execute(&state, upload_id, run_id, &mut tally).await;

    let (status, kind) = match &result {
        Ok(()) => (UploadStatus::Ready, RunOutcomeKind::Ready),
        Err(e) => {
            error!(%upload_id, %run_id, "Run failed: {}", e);
            (
                UploadStatus::Failed,
                RunOutcomeKind::Failed {
                    error: e.to_string(),
                },
            )
        }
    };
    let message = result.as_ref().err().map(|e| e.to_string());

    let kind = match state
        .db
        .finish_run(upload_id, run_id, status, message.as_deref())
        .await
    {
        Ok(true) => kind,
        Ok(false) => {
            warn!(%upload_id, %run_id, "Upload was taken over by another run; status left untouched");
            kind
        }
        Err(e) => {
            error!(%upload_id, %run_id, "Failed to record run status: {}", e);
            RunOutcomeKind::Failed {
                error: PipelineError::from(e).to_string(),
            }
        }
    };

    info!(
        %upload_id,
        %run_id,
        status = %status,
        topics_attempted = tally.attempted,
        topics_completed = tally.completed,
        "Run finished in {:?}",
        started.elapsed()
    );

    RunOutcome {
        upload_id,
        run_id: Some(run_id),
        kind,
        topics_attempted: tally.attempted,
        topics_completed: tally.completed,
    }
}

fn unclaimed_failure(upload_id: Uuid, err: PipelineError) -> RunOutcome {
    error!(%upload_id, "Could not start run: {}", err);
    RunOutcome {
        upload_id,
        run_id: None,
        kind: RunOutcomeKind::Failed {
            error: err.to_string(),
        },
        topics_attempted: 0,
        topics_completed: 0,
    }
}

async fn execute(
    state: &Arc<WorkerState>,
    upload_id: Uuid,
    run_id: Uuid,
    tally: &mut Tally,
) -> Result<(), PipelineError> {
    let settings = &state.pipeline;

    // --- 1. Load the upload, its course and the topic tree ---
    let upload = state.db.get_upload(upload_id).await?;
    let course = state.db.get_course(upload.course_id).await?;
    let tree = TopicTree::new(state.db.list_topics(course.id).await?);
    let leaves: Vec<Topic> = tree
        .leaf_topics(settings.max_topics_per_run)
        .into_iter()
        .cloned()
        .collect();
    info!(%upload_id, topics = tree.len(), leaves = leaves.len(), "Loaded course {}", course.id);

    // --- 2. Extract, chunk and embed the source ---
    let data = state.storage.get(&upload.storage_key).await?;
    let text = state
        .extractor
        .extract(data, upload.media_type)
        .await
        .map_err(|e| PipelineError::Extraction(e.to_string()))?;

    let embedder = state.embedder.clone();
    let chunking = settings.chunking;
    let new_chunks = tokio::task::spawn_blocking(move || {
        chunk_text(&text, chunking)
            .map(|piece| NewChunk {
                text: piece.to_string(),
                embedding: Some(embedder.embed(piece)),
                span: None,
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| PipelineError::Extraction(format!("Chunking aborted: {}", e)))?;

    // Chunks are committed before any retrieval runs.
    let inserted = state.db.replace_chunks(upload_id, new_chunks).await?;
    info!(%upload_id, chunks = inserted, "Stored embedded chunks");
    let chunks = state.db.list_embedded_chunks(upload_id).await?;

    // --- 3. Generate every leaf topic ---
    let ctx = Arc::new(TopicContext {
        state: state.clone(),
        course,
        tree,
        chunks,
        run_id,
    });
    let permits = Arc::new(Semaphore::new(settings.topic_concurrency.max(1)));
    tally.attempted = leaves.len();

    let mut tasks = Vec::with_capacity(leaves.len());
    for topic in leaves {
        let ctx = ctx.clone();
        let permits = permits.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await;
            let result = process_topic(&ctx, &topic).await;
            (topic, result)
        }));
    }

    // Every topic is awaited; the earliest failing topic (by order) fails the run.
    let mut first_failure = None;
    for task in tasks {
        let (topic, result) = match task.await {
            Ok(joined) => joined,
            Err(e) => {
                first_failure.get_or_insert(PipelineError::GenerationBackend(format!(
                    "Topic task aborted: {}",
                    e
                )));
                continue;
            }
        };
        match result {
            Ok(reel) => {
                tally.completed += 1;
                info!(%upload_id, topic_id = %topic.id, reel_id = %reel.id, "Topic '{}' generated", topic.title);
            }
            Err(e) => {
                warn!(%upload_id, topic_id = %topic.id, "Topic '{}' failed: {}", topic.title, e);
                first_failure.get_or_insert(e);
            }
        }
    }

    match first_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
