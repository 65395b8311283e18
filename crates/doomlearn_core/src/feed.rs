//! crates/doomlearn_core/src/feed.rs
//!
//! Feed selection heuristics.
//!
//! Newest reels first, optionally restricted to a topic set, plus a quiz for the
//! learner's weakest topic. Greedy and single-pass: no diversity or exploration.

use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{Progress, Reel};

pub const DEFAULT_FEED_LIMIT: usize = 5;
pub const MAX_FEED_LIMIT: usize = 20;

/// Clamps a requested page size into `1..=MAX_FEED_LIMIT`.
pub fn clamp_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_FEED_LIMIT)
        .clamp(1, MAX_FEED_LIMIT)
}

/// Up to `limit` reels, most recent first. An empty filter means no filter.
pub fn select_reels<'a>(
    reels: &'a [Reel],
    topic_filter: Option<&HashSet<Uuid>>,
    limit: usize,
) -> Vec<&'a Reel> {
    let filter = topic_filter.filter(|topics| !topics.is_empty());
    let mut selected: Vec<&Reel> = reels
        .iter()
        .filter(|reel| filter.map_or(true, |topics| topics.contains(&reel.topic_id)))
        .collect();
    selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    selected.truncate(limit);
    selected
}

/// The row with the lowest mastery. Ties go to the earliest row.
pub fn weakest_topic(progress: &[Progress]) -> Option<&Progress> {
    progress.iter().fold(None, |weakest: Option<&Progress>, row| match weakest {
        Some(current) if current.mastery <= row.mastery => Some(current),
        _ => Some(row),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProgressKey, ReelSource};
    use chrono::{Duration, Utc};

    fn reel(topic_id: Uuid, age_mins: i64) -> Reel {
        Reel {
            id: Uuid::new_v4(),
            course_id: Uuid::nil(),
            topic_id,
            storage_key: format!("reels/{age_mins}.mp4"),
            narration_key: None,
            captions_vtt: String::new(),
            duration_secs: 30,
            source: ReelSource::Generated,
            created_at: Utc::now() - Duration::minutes(age_mins),
        }
    }

    fn progress(mastery: f64) -> Progress {
        Progress {
            key: ProgressKey {
                learner_id: Uuid::nil(),
                course_id: Uuid::nil(),
                topic_id: Uuid::new_v4(),
            },
            mastery,
            last_seen_at: None,
            next_review_at: None,
        }
    }

    #[test]
    fn reels_are_newest_first_and_limited() {
        let topic = Uuid::new_v4();
        let reels = vec![reel(topic, 30), reel(topic, 1), reel(topic, 10)];
        let picked = select_reels(&reels, None, 2);
        let keys: Vec<_> = picked.iter().map(|r| r.storage_key.as_str()).collect();
        assert_eq!(keys, vec!["reels/1.mp4", "reels/10.mp4"]);
    }

    #[test]
    fn topic_filter_restricts_reels() {
        let (wanted, other) = (Uuid::new_v4(), Uuid::new_v4());
        let reels = vec![reel(other, 1), reel(wanted, 2), reel(other, 3)];
        let filter: HashSet<Uuid> = [wanted].into_iter().collect();

        let picked = select_reels(&reels, Some(&filter), 10);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].topic_id, wanted);

        assert_eq!(select_reels(&reels, Some(&HashSet::new()), 10).len(), 3);
    }

    #[test]
    fn weakest_topic_wins() {
        let rows = vec![progress(0.8), progress(0.2), progress(0.5)];
        let weakest = weakest_topic(&rows).unwrap();
        assert_eq!(weakest.key.topic_id, rows[1].key.topic_id);
        assert!(weakest_topic(&[]).is_none());
    }

    #[test]
    fn ties_go_to_the_first_row() {
        let rows = vec![progress(0.3), progress(0.3)];
        assert_eq!(weakest_topic(&rows).unwrap().key.topic_id, rows[0].key.topic_id);
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), 5);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(50)), 20);
    }
}
