//! services/worker/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. Everything lives
//! behind one mutex, so every operation (including progress read-modify-write) is
//! serialized. Used for tests and local runs without PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use doomlearn_core::domain::{
    Chunk, Course, FeedEvent, NewChunk, Progress, ProgressKey, Quiz, Reel, Topic, Upload,
    UploadStatus,
};
use doomlearn_core::lifecycle::ClaimRule;
use doomlearn_core::mastery::Interaction;
use doomlearn_core::ports::{DatabaseService, PortError, PortResult, TopicArtifacts};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    courses: HashMap<Uuid, Course>,
    topics: Vec<Topic>,
    uploads: HashMap<Uuid, Upload>,
    upload_errors: HashMap<Uuid, String>,
    chunks: Vec<Chunk>,
    reels: Vec<Reel>,
    quizzes: Vec<Quiz>,
    progress: Vec<Progress>,
    events: Vec<FeedEvent>,
}

/// A `DatabaseService` backed by plain collections.
#[derive(Default)]
pub struct MemoryDbAdapter {
    state: Mutex<MemoryState>,
}

impl MemoryDbAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding (submission happens outside the pipeline) ---

    pub async fn insert_course(&self, course: Course) {
        self.state.lock().await.courses.insert(course.id, course);
    }

    pub async fn insert_topic(&self, topic: Topic) {
        self.state.lock().await.topics.push(topic);
    }

    pub async fn insert_upload(&self, upload: Upload) {
        self.state.lock().await.uploads.insert(upload.id, upload);
    }

    // --- Inspection ---

    pub async fn last_error(&self, upload_id: Uuid) -> Option<String> {
        self.state.lock().await.upload_errors.get(&upload_id).cloned()
    }

    pub async fn chunk_count(&self, upload_id: Uuid) -> usize {
        let state = self.state.lock().await;
        state.chunks.iter().filter(|c| c.upload_id == upload_id).count()
    }

    pub async fn quizzes(&self, course_id: Uuid) -> Vec<Quiz> {
        let state = self.state.lock().await;
        state
            .quizzes
            .iter()
            .filter(|q| q.course_id == course_id)
            .cloned()
            .collect()
    }

    pub async fn events(&self) -> Vec<FeedEvent> {
        self.state.lock().await.events.clone()
    }
}

#[async_trait]
impl DatabaseService for MemoryDbAdapter {
    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        self.state
            .lock()
            .await
            .courses
            .get(&course_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course_id)))
    }

    async fn list_topics(&self, course_id: Uuid) -> PortResult<Vec<Topic>> {
        let state = self.state.lock().await;
        Ok(state
            .topics
            .iter()
            .filter(|t| t.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn get_upload(&self, upload_id: Uuid) -> PortResult<Upload> {
        self.state
            .lock()
            .await
            .uploads
            .get(&upload_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Upload {} not found", upload_id)))
    }

    async fn claim_upload(
        &self,
        upload_id: Uuid,
        rule: &ClaimRule,
        run_id: Uuid,
    ) -> PortResult<bool> {
        let mut state = self.state.lock().await;
        let upload = state
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| PortError::NotFound(format!("Upload {} not found", upload_id)))?;
        if !rule.admits(upload.status, upload.updated_at) {
            return Ok(false);
        }
        upload.status = UploadStatus::Processing;
        upload.run_id = Some(run_id);
        upload.updated_at = Utc::now();
        state.upload_errors.remove(&upload_id);
        Ok(true)
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
        let mut state = self.state.lock().await;
        let upload = state
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| PortError::NotFound(format!("Upload {} not found", upload_id)))?;
        if upload.run_id != Some(run_id) || upload.status != UploadStatus::Processing {
            return Ok(false);
        }
        upload.status = status;
        upload.updated_at = Utc::now();
        if let Some(error) = error {
            state.upload_errors.insert(upload_id, error.to_string());
        }
        Ok(true)
    }

    async fn replace_chunks(&self, upload_id: Uuid, chunks: Vec<NewChunk>) -> PortResult<usize> {
        let mut state = self.state.lock().await;
        let count = chunks.len();
        state.chunks.retain(|c| c.upload_id != upload_id);
        state.chunks.extend(chunks.into_iter().map(|chunk| Chunk {
            id: Uuid::new_v4(),
            upload_id,
            topic_id: None,
            text: chunk.text,
            embedding: chunk.embedding,
            span: chunk.span,
        }));
        Ok(count)
    }

    async fn list_embedded_chunks(&self, upload_id: Uuid) -> PortResult<Vec<Chunk>> {
        let state = self.state.lock().await;
        Ok(state
            .chunks
            .iter()
            .filter(|c| c.upload_id == upload_id && c.embedding.is_some())
            .cloned()
            .collect())
    }

    async fn save_topic_artifacts(&self, artifacts: TopicArtifacts) -> PortResult<()> {
        let mut state = self.state.lock().await;
        state.reels.push(artifacts.reel);
        if let Some(quiz) = artifacts.quiz {
            state.quizzes.push(quiz);
        }
        let seed = artifacts.progress_seed;
        if !state.progress.iter().any(|p| p.key == seed.key) {
            state.progress.push(seed);
        }
        Ok(())
    }

    async fn list_reels(&self, course_id: Uuid) -> PortResult<Vec<Reel>> {
        let state = self.state.lock().await;
        let mut reels: Vec<Reel> = state
            .reels
            .iter()
            .rev()
            .filter(|r| r.course_id == course_id)
            .cloned()
            .collect();
        reels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reels)
    }

    async fn get_quiz(&self, quiz_id: Uuid) -> PortResult<Quiz> {
        let state = self.state.lock().await;
        state
            .quizzes
            .iter()
            .find(|q| q.id == quiz_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Quiz {} not found", quiz_id)))
    }

    async fn latest_quiz_for_topic(
        &self,
        course_id: Uuid,
        topic_id: Uuid,
    ) -> PortResult<Option<Quiz>> {
        let state = self.state.lock().await;
        let latest = state
            .quizzes
            .iter()
            .filter(|q| q.course_id == course_id && q.topic_id == topic_id)
            .fold(None, |best: Option<&Quiz>, quiz| match best {
                Some(current) if current.created_at > quiz.created_at => Some(current),
                _ => Some(quiz),
            });
        Ok(latest.cloned())
    }

    async fn list_progress(&self, learner_id: Uuid, course_id: Uuid) -> PortResult<Vec<Progress>> {
        let state = self.state.lock().await;
        Ok(state
            .progress
            .iter()
            .filter(|p| p.key.learner_id == learner_id && p.key.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn update_progress(
        &self,
        key: ProgressKey,
        interaction: Interaction,
        now: DateTime<Utc>,
    ) -> PortResult<Progress> {
        let mut state = self.state.lock().await;
        Ok(apply_progress(&mut state, key, interaction, now))
    }

    async fn record_event(&self, event: FeedEvent) -> PortResult<Option<Progress>> {
        let mut state = self.state.lock().await;
        if state.events.iter().any(|e| e.id == event.id) {
            return Err(PortError::Conflict(format!(
                "Event {} was already recorded",
                event.id
            )));
        }
        let progress = Interaction::from_event(&event)
            .map(|(key, interaction)| apply_progress(&mut state, key, interaction, event.created_at));
        state.events.push(event);
        Ok(progress)
    }
}

fn apply_progress(
    state: &mut MemoryState,
    key: ProgressKey,
    interaction: Interaction,
    now: DateTime<Utc>,
) -> Progress {
    let index = match state.progress.iter().position(|p| p.key == key) {
        Some(index) => index,
        None => {
            state.progress.push(Progress::new(key));
            state.progress.len() - 1
        }
    };
    let progress = &mut state.progress[index];
    progress.record(interaction, now);
    progress.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use doomlearn_core::domain::MediaType;

    fn upload(status: UploadStatus) -> Upload {
        Upload {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            media_type: MediaType::Document,
            storage_key: "uploads/a.pdf".to_string(),
            status,
            run_id: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn claim_is_a_compare_and_swap() {
        let db = MemoryDbAdapter::new();
        let up = upload(UploadStatus::Uploaded);
        let id = up.id;
        db.insert_upload(up).await;

        let rule = ClaimRule {
            from: &[UploadStatus::Uploaded, UploadStatus::Failed],
            stale_before: None,
        };
        assert!(db.claim_upload(id, &rule, Uuid::new_v4()).await.unwrap());
        assert!(!db.claim_upload(id, &rule, Uuid::new_v4()).await.unwrap());
        assert_eq!(db.get_upload(id).await.unwrap().status, UploadStatus::Processing);
    }

    #[tokio::test]
    async fn abandoned_claims_can_be_taken_over() {
        let db = MemoryDbAdapter::new();
        let mut up = upload(UploadStatus::Processing);
        let abandoned_run = Uuid::new_v4();
        up.run_id = Some(abandoned_run);
        up.updated_at = Utc::now() - chrono::Duration::hours(2);
        let id = up.id;
        db.insert_upload(up).await;

        let live = ClaimRule {
            from: &[UploadStatus::Uploaded],
            stale_before: Some(Utc::now() - chrono::Duration::hours(3)),
        };
        assert!(!db.claim_upload(id, &live, Uuid::new_v4()).await.unwrap());

        let lapsed = ClaimRule {
            from: &[UploadStatus::Uploaded],
            stale_before: Some(Utc::now() - chrono::Duration::hours(1)),
        };
        let new_run = Uuid::new_v4();
        assert!(db.claim_upload(id, &lapsed, new_run).await.unwrap());
        assert_eq!(db.get_upload(id).await.unwrap().run_id, Some(new_run));
        assert!(!db
            .finish_run(id, abandoned_run, UploadStatus::Ready, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn only_the_owning_run_can_finish() {
        let db = MemoryDbAdapter::new();
        let up = upload(UploadStatus::Uploaded);
        let id = up.id;
        db.insert_upload(up).await;

        let run = Uuid::new_v4();
        let rule = ClaimRule {
            from: &[UploadStatus::Uploaded],
            stale_before: None,
        };
        db.claim_upload(id, &rule, run).await.unwrap();

        let stale = db
            .finish_run(id, Uuid::new_v4(), UploadStatus::Failed, Some("late"))
            .await
            .unwrap();
        assert!(!stale);
        assert!(db.finish_run(id, run, UploadStatus::Ready, None).await.unwrap());
        assert_eq!(db.get_upload(id).await.unwrap().status, UploadStatus::Ready);

        let backwards = db.finish_run(id, run, UploadStatus::Uploaded, None).await;
        assert!(matches!(backwards, Err(PortError::Conflict(_))));
    }

    #[tokio::test]
    async fn rerun_chunks_replace_earlier_ones() {
        let db = MemoryDbAdapter::new();
        let id = Uuid::new_v4();
        let chunk = |text: &str| NewChunk {
            text: text.to_string(),
            embedding: Some(vec![1.0]),
            span: None,
        };
        db.replace_chunks(id, vec![chunk("a"), chunk("b")]).await.unwrap();
        db.replace_chunks(id, vec![chunk("c")]).await.unwrap();

        let texts: Vec<_> = db
            .list_embedded_chunks(id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn progress_is_created_lazily_and_unique_per_key() {
        let db = MemoryDbAdapter::new();
        let key = ProgressKey {
            learner_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            topic_id: Uuid::new_v4(),
        };
        let now = Utc::now();
        db.update_progress(key, Interaction::QuizResult { correct: true }, now)
            .await
            .unwrap();
        let progress = db
            .update_progress(key, Interaction::QuizResult { correct: true }, now)
            .await
            .unwrap();

        assert!((progress.mastery - 0.4).abs() < 1e-9);
        assert_eq!(db.list_progress(key.learner_id, key.course_id).await.unwrap().len(), 1);
    }
}
