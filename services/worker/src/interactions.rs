//! services/worker/src/interactions.rs
//!
//! Records learner interactions. Every interaction is appended to the event log;
//! watches and quiz results also move the learner's mastery for the topic, in the
//! same store write as the log entry.

use chrono::{DateTime, Utc};
use doomlearn_core::domain::{FeedEvent, FeedEventKind, Progress, QuizAnswer};
use doomlearn_core::ports::{DatabaseService, PortError, PortResult};
use tracing::debug;
use uuid::Uuid;

/// An interaction as reported by a client, before it is logged.
#[derive(Debug, Clone)]
pub struct InteractionEvent {
    /// Client-chosen id. A retry with the same id is a `Conflict` and does not count
    /// twice. A fresh id is assigned when absent.
    pub event_id: Option<Uuid>,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub reel_id: Option<Uuid>,
    pub kind: FeedEventKind,
    pub watch_secs: Option<f64>,
    pub quiz_answer: Option<QuizAnswer>,
}

#[derive(Debug, Clone)]
pub struct RecordedInteraction {
    pub event: FeedEvent,
    /// The updated row, when the interaction moved mastery.
    pub progress: Option<Progress>,
}

pub async fn record_interaction(
    db: &dyn DatabaseService,
    input: InteractionEvent,
    now: DateTime<Utc>,
) -> PortResult<RecordedInteraction> {
    let mut topic_id = input.topic_id;

    // A quiz answer must reference a quiz of this course; it also names the topic.
    if let Some(answer) = input.quiz_answer {
        let quiz = db.get_quiz(answer.quiz_id).await?;
        if quiz.course_id != input.course_id {
            return Err(PortError::NotFound(format!(
                "Quiz {} not found in course {}",
                answer.quiz_id, input.course_id
            )));
        }
        topic_id.get_or_insert(quiz.topic_id);
    }

    let event = FeedEvent {
        id: input.event_id.unwrap_or_else(Uuid::new_v4),
        learner_id: input.learner_id,
        course_id: input.course_id,
        topic_id,
        reel_id: input.reel_id,
        kind: input.kind,
        watch_secs: input.watch_secs,
        quiz_answer: input.quiz_answer,
        created_at: now,
    };
    let progress = db.record_event(event.clone()).await?;
    if let Some(progress) = &progress {
        debug!(
            learner_id = %progress.key.learner_id,
            topic_id = %progress.key.topic_id,
            mastery = progress.mastery,
            "Progress updated"
        );
    }

    Ok(RecordedInteraction { event, progress })
}
