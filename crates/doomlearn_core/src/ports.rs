//! crates/doomlearn_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Chunk, ConceptRequest, Course, FeedEvent, GeneratedConcepts, MediaType, NewChunk, Progress,
    ProgressKey, Quiz, Reel, Topic, Upload, UploadStatus,
};
use crate::lifecycle::ClaimRule;
use crate::mastery::Interaction;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting state: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Write Bundles
//=========================================================================================

/// Everything one topic of a run writes. Stores persist it atomically.
#[derive(Debug, Clone)]
pub struct TopicArtifacts {
    pub reel: Reel,
    pub quiz: Option<Quiz>,
    /// Progress row to create if the key has none yet.
    pub progress_seed: Progress,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Courses and Topics ---
    async fn get_course(&self, course_id: Uuid) -> PortResult<Course>;

    async fn list_topics(&self, course_id: Uuid) -> PortResult<Vec<Topic>>;

    // --- Upload Lifecycle ---
    async fn get_upload(&self, upload_id: Uuid) -> PortResult<Upload>;

    /// Atomically moves the upload into `processing` if `rule` admits its current
    /// status and last update, stamping `run_id`. Returns `false` when the upload was
    /// not claimable.
    async fn claim_upload(
        &self,
        upload_id: Uuid,
        rule: &ClaimRule,
        run_id: Uuid,
    ) -> PortResult<bool>;

    /// Records the terminal status of a run. A no-op (returning `false`) when the
    /// upload is held by another run.
    async fn finish_run(
        &self,
        upload_id: Uuid,
        run_id: Uuid,
        status: UploadStatus,
        error: Option<&str>,
    ) -> PortResult<bool>;

    // --- Chunks ---
    /// Stores the chunks of one run, replacing any left by earlier runs of the upload.
    async fn replace_chunks(&self, upload_id: Uuid, chunks: Vec<NewChunk>) -> PortResult<usize>;

    /// Chunks of the upload that carry an embedding, in insertion order.
    async fn list_embedded_chunks(&self, upload_id: Uuid) -> PortResult<Vec<Chunk>>;

    // --- Generated Artifacts ---
    async fn save_topic_artifacts(&self, artifacts: TopicArtifacts) -> PortResult<()>;

    /// Reels of a course, newest first.
    async fn list_reels(&self, course_id: Uuid) -> PortResult<Vec<Reel>>;

    async fn get_quiz(&self, quiz_id: Uuid) -> PortResult<Quiz>;

    async fn latest_quiz_for_topic(&self, course_id: Uuid, topic_id: Uuid)
        -> PortResult<Option<Quiz>>;

    // --- Progress and Interactions ---
    async fn list_progress(&self, learner_id: Uuid, course_id: Uuid) -> PortResult<Vec<Progress>>;

    /// Loads or creates the row for `key` and applies `interaction` as one
    /// serialized read-modify-write.
    async fn update_progress(
        &self,
        key: ProgressKey,
        interaction: Interaction,
        now: DateTime<Utc>,
    ) -> PortResult<Progress>;

    /// Appends `event` and applies the progress update it carries (see
    /// [`Interaction::from_event`]) as one atomic write. An event whose id was already
    /// recorded is a `Conflict` and changes nothing.
    async fn record_event(&self, event: FeedEvent) -> PortResult<Option<Progress>>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> PortResult<()>;

    async fn get(&self, key: &str) -> PortResult<Bytes>;

    /// A time-limited URL for reading `key`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> PortResult<String>;
}

#[async_trait]
pub trait TextExtractionService: Send + Sync {
    /// Turns raw source bytes into plain text.
    async fn extract(&self, data: Bytes, media_type: MediaType) -> PortResult<String>;
}

/// The generative backend. Implementations may be live network clients or
/// deterministic stand-ins; callers never branch on which.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate_concepts(&self, request: &ConceptRequest) -> PortResult<GeneratedConcepts>;

    /// Narration audio for a script.
    async fn synthesize_voice(&self, script: &str, voice_style: &str) -> PortResult<Bytes>;

    /// A video segment of roughly `duration_secs` seconds.
    async fn generate_video(&self, prompt: &str, duration_secs: u32) -> PortResult<Bytes>;
}
