//! crates/doomlearn_core/src/mastery.rs
//!
//! Mastery scheduling.
//!
//! Linear nudges to a per-topic mastery score in `[0, 1]` and a three-tier review
//! delay. There is no forgetting curve and no per-item interval history.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{FeedEvent, FeedEventKind, Progress, ProgressKey};

/// Upper bound on what a single watch event can add.
pub const WATCH_GAIN_CAP: f64 = 0.05;
/// Seconds of watching that would be worth a full point of mastery.
pub const WATCH_SECS_PER_POINT: f64 = 300.0;
pub const CORRECT_GAIN: f64 = 0.2;
pub const INCORRECT_PENALTY: f64 = 0.1;

/// A learner signal that moves mastery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interaction {
    Watch { seconds: f64 },
    QuizResult { correct: bool },
}

impl Interaction {
    /// The progress update carried by a logged event, if any. Only watch events with
    /// a topic and elapsed time, and quiz results with a topic, move mastery.
    pub fn from_event(event: &FeedEvent) -> Option<(ProgressKey, Interaction)> {
        let topic_id = event.topic_id?;
        let interaction = match event.kind {
            FeedEventKind::Watch => Interaction::Watch {
                seconds: event.watch_secs?,
            },
            FeedEventKind::QuizResult => Interaction::QuizResult {
                correct: event.quiz_answer?.correct,
            },
            _ => return None,
        };
        let key = ProgressKey {
            learner_id: event.learner_id,
            course_id: event.course_id,
            topic_id,
        };
        Some((key, interaction))
    }

    /// The mastery after applying this interaction, clamped to `[0, 1]`.
    pub fn apply(&self, mastery: f64) -> f64 {
        let next = match *self {
            Interaction::Watch { seconds } => {
                mastery + (seconds.max(0.0) / WATCH_SECS_PER_POINT).min(WATCH_GAIN_CAP)
            }
            Interaction::QuizResult { correct: true } => mastery + CORRECT_GAIN,
            Interaction::QuizResult { correct: false } => mastery - INCORRECT_PENALTY,
        };
        next.clamp(0.0, 1.0)
    }
}

/// How long until a topic with this mastery should be shown again.
pub fn review_delay(mastery: f64) -> Duration {
    if mastery < 0.3 {
        Duration::days(1)
    } else if mastery < 0.7 {
        Duration::days(3)
    } else {
        Duration::days(7)
    }
}

impl Progress {
    /// Applies `interaction`, stamps `last_seen_at` and reschedules the next review.
    pub fn record(&mut self, interaction: Interaction, now: DateTime<Utc>) {
        self.mastery = interaction.apply(self.mastery);
        self.last_seen_at = Some(now);
        self.next_review_at = Some(now + review_delay(self.mastery));
    }
}
