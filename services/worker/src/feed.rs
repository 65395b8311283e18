//! services/worker/src/feed.rs
//!
//! Assembles a learner's feed page: recent reels with playable URLs and at most one
//! quiz, taken from the learner's weakest topic.

use crate::state::WorkerState;
use doomlearn_core::domain::{Quiz, Reel};
use doomlearn_core::feed::{clamp_limit, select_reels, weakest_topic};
use doomlearn_core::ports::PortResult;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    pub course_id: Uuid,
    pub learner_id: Uuid,
    /// Restricts reels to these topics. Empty or absent means every topic.
    pub topic_filter: Option<HashSet<Uuid>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct FeedReel {
    pub reel: Reel,
    pub video_url: String,
    pub narration_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedPage {
    pub reels: Vec<FeedReel>,
    pub quiz: Option<Quiz>,
}

pub async fn build_feed(state: &WorkerState, request: &FeedRequest) -> PortResult<FeedPage> {
    // Unknown courses are a NotFound rather than an empty page.
    let course = state.db.get_course(request.course_id).await?;

    let all_reels = state.db.list_reels(course.id).await?;
    let limit = clamp_limit(request.limit);
    let mut reels = Vec::new();
    for reel in select_reels(&all_reels, request.topic_filter.as_ref(), limit) {
        let video_url = state.storage.presign_get(&reel.storage_key, state.presign_ttl).await?;
        let narration_url = match &reel.narration_key {
            Some(key) => Some(state.storage.presign_get(key, state.presign_ttl).await?),
            None => None,
        };
        reels.push(FeedReel {
            reel: reel.clone(),
            video_url,
            narration_url,
        });
    }

    let progress = state.db.list_progress(request.learner_id, course.id).await?;
    let quiz = match weakest_topic(&progress) {
        Some(row) => {
            state
                .db
                .latest_quiz_for_topic(course.id, row.key.topic_id)
                .await?
        }
        None => None,
    };

    Ok(FeedPage { reels, quiz })
}
