//! crates/doomlearn_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or storage backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Courses and Topics
//=========================================================================================

/// A learner's course. Owns topics, uploads, reels and quizzes.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// Target length of a generated reel, in seconds.
    pub reel_length_secs: u32,
}

/// A node in a course's concept tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub id: Uuid,
    pub course_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub order_index: i32,
    pub is_leaf: bool,
}

//=========================================================================================
// Uploads and Chunks
//=========================================================================================

/// The kind of source material behind an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Document,
    Video,
}

/// Processing status of an upload. See `lifecycle` for the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Processing,
    Ready,
    Failed,
}

/// One source document submitted to a course.
#[derive(Debug, Clone)]
pub struct Upload {
    pub id: Uuid,
    pub course_id: Uuid,
    pub media_type: MediaType,
    pub storage_key: String,
    pub status: UploadStatus,
    /// Token of the run currently (or last) holding the upload.
    pub run_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A time span within timed media, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSpan {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// One segment of extracted text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: Uuid,
    pub upload_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub span: Option<TimeSpan>,
}

/// A chunk ready to be inserted; the store assigns identity and ordering.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub span: Option<TimeSpan>,
}

//=========================================================================================
// Generated Artifacts
//=========================================================================================

/// Where a reel came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReelSource {
    Clip,
    Generated,
}

/// One short-form video artifact for a topic.
#[derive(Debug, Clone)]
pub struct Reel {
    pub id: Uuid,
    pub course_id: Uuid,
    pub topic_id: Uuid,
    pub storage_key: String,
    pub narration_key: Option<String>,
    pub captions_vtt: String,
    pub duration_secs: u32,
    pub source: ReelSource,
    pub created_at: DateTime<Utc>,
}

/// One multiple-choice check for a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    pub id: Uuid,
    pub course_id: Uuid,
    pub topic_id: Uuid,
    pub question: String,
    pub choices: Vec<String>,
    pub answer_index: usize,
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Generation Contract Payloads
//=========================================================================================

/// What the generation backend is asked to write about.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptRequest {
    pub topic_title: String,
    pub facts: Vec<String>,
    pub target_length_secs: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptCard {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub check_for_understanding: Option<String>,
}

/// Hook, ordered steps, then call-to-action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReelScript {
    #[serde(default)]
    pub hook: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub cta: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizItem {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub answer_index: usize,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// The structured output of one concept-generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedConcepts {
    #[serde(default)]
    pub concept_cards: Vec<ConceptCard>,
    #[serde(default)]
    pub reel_script: ReelScript,
    #[serde(default)]
    pub quiz_items: Vec<QuizItem>,
}

//=========================================================================================
// Learner Progress and Interaction Log
//=========================================================================================

/// Identifies the single Progress row for a learner on a course topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressKey {
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub topic_id: Uuid,
}

/// A learner's mastery record for one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub key: ProgressKey,
    pub mastery: f64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
}

impl Progress {
    /// A blank record, as created lazily on first interaction.
    pub fn new(key: ProgressKey) -> Self {
        Self {
            key,
            mastery: 0.0,
            last_seen_at: None,
            next_review_at: None,
        }
    }

    /// The record the pipeline seeds for a freshly generated topic: immediately due.
    pub fn seeded(key: ProgressKey, now: DateTime<Utc>) -> Self {
        Self {
            next_review_at: Some(now),
            ..Self::new(key)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEventKind {
    Watch,
    Skip,
    Replay,
    Like,
    Save,
    Share,
    QuizResult,
}

/// An answer submitted for a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub quiz_id: Uuid,
    pub correct: bool,
    pub selected: Option<usize>,
}

/// An immutable entry of the learner interaction log.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub reel_id: Option<Uuid>,
    pub kind: FeedEventKind,
    pub watch_secs: Option<f64>,
    pub quiz_answer: Option<QuizAnswer>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// String Codecs (used by the storage adapters)
//=========================================================================================

/// Error returned when parsing one of the enums above from its stored name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

macro_rules! string_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum!(MediaType, "media type", { Document => "document", Video => "video" });
string_enum!(UploadStatus, "upload status", {
    Uploaded => "uploaded",
    Processing => "processing",
    Ready => "ready",
    Failed => "failed",
});
string_enum!(ReelSource, "reel source", { Clip => "clip", Generated => "generated" });
string_enum!(FeedEventKind, "feed event kind", {
    Watch => "watch",
    Skip => "skip",
    Replay => "replay",
    Like => "like",
    Save => "save",
    Share => "share",
    QuizResult => "quiz_result",
});
