//! services/worker/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use doomlearn_core::domain::{
    Chunk, Course, FeedEvent, NewChunk, Progress, ProgressKey, Quiz, Reel, TimeSpan, Topic,
    Upload, UploadStatus,
};
use doomlearn_core::lifecycle::ClaimRule;
use doomlearn_core::mastery::Interaction;
use doomlearn_core::ports::{DatabaseService, PortError, PortResult, TopicArtifacts};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        other => unexpected(other),
    }
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> PortError {
    PortError::Unexpected(format!("Corrupt {} column: {}", field, err))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    reel_length_secs: i32,
}
impl CourseRecord {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            reel_length_secs: self.reel_length_secs.max(0) as u32,
        }
    }
}

#[derive(FromRow)]
struct TopicRecord {
    id: Uuid,
    course_id: Uuid,
    parent_id: Option<Uuid>,
    title: String,
    order_index: i32,
    is_leaf: bool,
}
impl TopicRecord {
    fn to_domain(self) -> Topic {
        Topic {
            id: self.id,
            course_id: self.course_id,
            parent_id: self.parent_id,
            title: self.title,
            order_index: self.order_index,
            is_leaf: self.is_leaf,
        }
    }
}

#[derive(FromRow)]
struct UploadRecord {
    id: Uuid,
    course_id: Uuid,
    media_type: String,
    storage_key: String,
    status: String,
    run_id: Option<Uuid>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UploadRecord {
    fn to_domain(self) -> PortResult<Upload> {
        Ok(Upload {
            id: self.id,
            course_id: self.course_id,
            media_type: self.media_type.parse().map_err(|e| corrupt("media_type", e))?,
            storage_key: self.storage_key,
            status: self.status.parse().map_err(|e| corrupt("status", e))?,
            run_id: self.run_id,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ChunkRecord {
    id: Uuid,
    upload_id: Uuid,
    topic_id: Option<Uuid>,
    text: String,
    embedding: Option<Vec<f32>>,
    start_secs: Option<f64>,
    end_secs: Option<f64>,
}
impl ChunkRecord {
    fn to_domain(self) -> Chunk {
        let span = match (self.start_secs, self.end_secs) {
            (Some(start_secs), Some(end_secs)) => Some(TimeSpan {
                start_secs,
                end_secs,
            }),
            _ => None,
        };
        Chunk {
            id: self.id,
            upload_id: self.upload_id,
            topic_id: self.topic_id,
            text: self.text,
            embedding: self.embedding,
            span,
        }
    }
}

#[derive(FromRow)]
struct ReelRecord {
    id: Uuid,
    course_id: Uuid,
    topic_id: Uuid,
    storage_key: String,
    narration_key: Option<String>,
    captions_vtt: String,
    duration_secs: i32,
    source: String,
    created_at: DateTime<Utc>,
}
impl ReelRecord {
    fn to_domain(self) -> PortResult<Reel> {
        Ok(Reel {
            id: self.id,
            course_id: self.course_id,
            topic_id: self.topic_id,
            storage_key: self.storage_key,
            narration_key: self.narration_key,
            captions_vtt: self.captions_vtt,
            duration_secs: self.duration_secs.max(0) as u32,
            source: self.source.parse().map_err(|e| corrupt("source", e))?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct QuizRecord {
    id: Uuid,
    course_id: Uuid,
    topic_id: Uuid,
    question: String,
    choices: Json<Vec<String>>,
    answer_index: i32,
    explanation: Option<String>,
    created_at: DateTime<Utc>,
}
impl QuizRecord {
    fn to_domain(self) -> Quiz {
        Quiz {
            id: self.id,
            course_id: self.course_id,
            topic_id: self.topic_id,
            question: self.question,
            choices: self.choices.0,
            answer_index: self.answer_index.max(0) as usize,
            explanation: self.explanation,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ProgressRecord {
    learner_id: Uuid,
    course_id: Uuid,
    topic_id: Uuid,
    mastery: f64,
    last_seen_at: Option<DateTime<Utc>>,
    next_review_at: Option<DateTime<Utc>>,
}
impl ProgressRecord {
    fn to_domain(self) -> Progress {
        Progress {
            key: ProgressKey {
                learner_id: self.learner_id,
                course_id: self.course_id,
                topic_id: self.topic_id,
            },
            mastery: self.mastery,
            last_seen_at: self.last_seen_at,
            next_review_at: self.next_review_at,
        }
    }
}

const UPLOAD_COLUMNS: &str =
    "id, course_id, media_type, storage_key, status, run_id, metadata, created_at, updated_at";
const REEL_COLUMNS: &str =
    "id, course_id, topic_id, storage_key, narration_key, captions_vtt, duration_secs, source, created_at";
const QUIZ_COLUMNS: &str =
    "id, course_id, topic_id, question, choices, answer_index, explanation, created_at";
const PROGRESS_COLUMNS: &str =
    "learner_id, course_id, topic_id, mastery, last_seen_at, next_review_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(
            "SELECT id, owner_id, title, reel_length_secs FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Course {} not found", course_id)))?;
        Ok(record.to_domain())
    }

    async fn list_topics(&self, course_id: Uuid) -> PortResult<Vec<Topic>> {
        let records = sqlx::query_as::<_, TopicRecord>(
            "SELECT id, course_id, parent_id, title, order_index, is_leaf FROM topics \
             WHERE course_id = $1 ORDER BY order_index ASC, created_at ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_upload(&self, upload_id: Uuid) -> PortResult<Upload> {
        let record = sqlx::query_as::<_, UploadRecord>(&format!(
            "SELECT {} FROM uploads WHERE id = $1",
            UPLOAD_COLUMNS
        ))
        .bind(upload_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Upload {} not found", upload_id)))?;
        record.to_domain()
    }

    async fn claim_upload(
        &self,
        upload_id: Uuid,
        rule: &ClaimRule,
        run_id: Uuid,
    ) -> PortResult<bool> {
        let from: Vec<String> = rule.from.iter().map(|s| s.as_str().to_string()).collect();
        let result = sqlx::query(
            "UPDATE uploads SET status = $3, run_id = $2, last_error = NULL, updated_at = now() \
             WHERE id = $1 AND (status = ANY($4) OR (status = $3 AND updated_at <= $5))",
        )
        .bind(upload_id)
        .bind(run_id)
        .bind(UploadStatus::Processing.as_str())
        .bind(&from)
        .bind(rule.stale_before)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn finish_run(
        &self,
        upload_id: Uuid,
        run_id: Uuid,
        status: UploadStatus,
        error: Option<&str>,
    ) -> PortResult<bool> {
        if !UploadStatus::Processing.can_transition_to(status) {
            return Err(PortError::Conflict(format!(
                "A run cannot finish in status '{}'",
                status
            )));
        }
        let result = sqlx::query(
            "UPDATE uploads SET status = $3, last_error = $4, updated_at = now() \
             WHERE id = $1 AND run_id = $2 AND status = $5",
        )
        .bind(upload_id)
        .bind(run_id)
        .bind(status.as_str())
        .bind(error)
        .bind(UploadStatus::Processing.as_str())
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_chunks(&self, upload_id: Uuid, chunks: Vec<NewChunk>) -> PortResult<usize> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let count = chunks.len();
        sqlx::query("DELETE FROM chunks WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, upload_id, topic_id, text, embedding, start_secs, end_secs) \
                 VALUES ($1, $2, NULL, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(upload_id)
            .bind(&chunk.text)
            .bind(&chunk.embedding)
            .bind(chunk.span.map(|s| s.start_secs))
            .bind(chunk.span.map(|s| s.end_secs))
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(count)
    }

    async fn list_embedded_chunks(&self, upload_id: Uuid) -> PortResult<Vec<Chunk>> {
        let records = sqlx::query_as::<_, ChunkRecord>(
            "SELECT id, upload_id, topic_id, text, embedding, start_secs, end_secs FROM chunks \
             WHERE upload_id = $1 AND embedding IS NOT NULL ORDER BY seq ASC",
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn save_topic_artifacts(&self, artifacts: TopicArtifacts) -> PortResult<()> {
        let TopicArtifacts {
            reel,
            quiz,
            progress_seed,
        } = artifacts;
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO reels (id, course_id, topic_id, storage_key, narration_key, captions_vtt, \
             duration_secs, source, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(reel.id)
        .bind(reel.course_id)
        .bind(reel.topic_id)
        .bind(&reel.storage_key)
        .bind(&reel.narration_key)
        .bind(&reel.captions_vtt)
        .bind(reel.duration_secs as i32)
        .bind(reel.source.as_str())
        .bind(reel.created_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if let Some(quiz) = quiz {
            sqlx::query(
                "INSERT INTO quizzes (id, course_id, topic_id, question, choices, answer_index, \
                 explanation, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(quiz.id)
            .bind(quiz.course_id)
            .bind(quiz.topic_id)
            .bind(&quiz.question)
            .bind(Json(&quiz.choices))
            .bind(quiz.answer_index as i32)
            .bind(&quiz.explanation)
            .bind(quiz.created_at)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        let key = progress_seed.key;
        sqlx::query(
            "INSERT INTO progress (learner_id, course_id, topic_id, mastery, last_seen_at, next_review_at) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (learner_id, course_id, topic_id) DO NOTHING",
        )
        .bind(key.learner_id)
        .bind(key.course_id)
        .bind(key.topic_id)
        .bind(progress_seed.mastery)
        .bind(progress_seed.last_seen_at)
        .bind(progress_seed.next_review_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)
    }

    async fn list_reels(&self, course_id: Uuid) -> PortResult<Vec<Reel>> {
        let records = sqlx::query_as::<_, ReelRecord>(&format!(
            "SELECT {} FROM reels WHERE course_id = $1 ORDER BY created_at DESC",
            REEL_COLUMNS
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_quiz(&self, quiz_id: Uuid) -> PortResult<Quiz> {
        let record = sqlx::query_as::<_, QuizRecord>(&format!(
            "SELECT {} FROM quizzes WHERE id = $1",
            QUIZ_COLUMNS
        ))
        .bind(quiz_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Quiz {} not found", quiz_id)))?;
        Ok(record.to_domain())
    }

    async fn latest_quiz_for_topic(
        &self,
        course_id: Uuid,
        topic_id: Uuid,
    ) -> PortResult<Option<Quiz>> {
        let record = sqlx::query_as::<_, QuizRecord>(&format!(
            "SELECT {} FROM quizzes WHERE course_id = $1 AND topic_id = $2 \
             ORDER BY created_at DESC LIMIT 1",
            QUIZ_COLUMNS
        ))
        .bind(course_id)
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn list_progress(&self, learner_id: Uuid, course_id: Uuid) -> PortResult<Vec<Progress>> {
        let records = sqlx::query_as::<_, ProgressRecord>(&format!(
            "SELECT {} FROM progress WHERE learner_id = $1 AND course_id = $2 ORDER BY seq ASC",
            PROGRESS_COLUMNS
        ))
        .bind(learner_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_progress(
        &self,
        key: ProgressKey,
        interaction: Interaction,
        now: DateTime<Utc>,
    ) -> PortResult<Progress> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let progress = apply_progress(&mut tx, key, interaction, now).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(progress)
    }

    async fn record_event(&self, event: FeedEvent) -> PortResult<Option<Progress>> {
        let payload = event
            .quiz_answer
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query(
            "INSERT INTO feed_events (id, learner_id, course_id, topic_id, reel_id, kind, watch_secs, \
             payload, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(event.id)
        .bind(event.learner_id)
        .bind(event.course_id)
        .bind(event.topic_id)
        .bind(event.reel_id)
        .bind(event.kind.as_str())
        .bind(event.watch_secs)
        .bind(payload)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                PortError::Conflict(format!("Event {} was already recorded", event.id))
            } else {
                unexpected(e)
            }
        })?;

        let progress = match Interaction::from_event(&event) {
            Some((key, interaction)) => {
                Some(apply_progress(&mut tx, key, interaction, event.created_at).await?)
            }
            None => None,
        };
        tx.commit().await.map_err(unexpected)?;
        Ok(progress)
    }
}

/// Loads or creates the progress row and applies `interaction` under a row lock.
async fn apply_progress(
    conn: &mut PgConnection,
    key: ProgressKey,
    interaction: Interaction,
    now: DateTime<Utc>,
) -> PortResult<Progress> {
    sqlx::query(
        "INSERT INTO progress (learner_id, course_id, topic_id) VALUES ($1, $2, $3) \
         ON CONFLICT (learner_id, course_id, topic_id) DO NOTHING",
    )
    .bind(key.learner_id)
    .bind(key.course_id)
    .bind(key.topic_id)
    .execute(&mut *conn)
    .await
    .map_err(unexpected)?;

    // The row lock serializes concurrent updates to the same key.
    let record = sqlx::query_as::<_, ProgressRecord>(&format!(
        "SELECT {} FROM progress WHERE learner_id = $1 AND course_id = $2 AND topic_id = $3 \
         FOR UPDATE",
        PROGRESS_COLUMNS
    ))
    .bind(key.learner_id)
    .bind(key.course_id)
    .bind(key.topic_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(unexpected)?;

    let mut progress = record.to_domain();
    progress.record(interaction, now);

    sqlx::query(
        "UPDATE progress SET mastery = $4, last_seen_at = $5, next_review_at = $6 \
         WHERE learner_id = $1 AND course_id = $2 AND topic_id = $3",
    )
    .bind(key.learner_id)
    .bind(key.course_id)
    .bind(key.topic_id)
    .bind(progress.mastery)
    .bind(progress.last_seen_at)
    .bind(progress.next_review_at)
    .execute(&mut *conn)
    .await
    .map_err(unexpected)?;

    Ok(progress)
}
