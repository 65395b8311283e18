//! crates/doomlearn_core/src/lifecycle.rs
//!
//! Upload lifecycle rules and run outcomes.
//!
//! `uploaded → processing → {ready | failed}`. A run may only claim an upload its
//! [`ClaimRule`] admits. An upload already `processing` is held by its run until the
//! run's lease lapses or a forced run takes it over; either way the new run id fences
//! the old run out of `finish_run`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::UploadStatus;

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Ready | UploadStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Processing, Ready)
                | (Processing, Failed)
                | (Failed, Processing)
                | (Ready, Processing)
                | (Processing, Processing)
        )
    }
}

/// Statuses a new run may claim from. Re-running a `ready` upload, or taking over one
/// another run still holds, must be forced so a redelivered message does not
/// regenerate finished content.
pub fn claimable_from(force: bool) -> &'static [UploadStatus] {
    if force {
        &[
            UploadStatus::Uploaded,
            UploadStatus::Failed,
            UploadStatus::Ready,
            UploadStatus::Processing,
        ]
    } else {
        &[UploadStatus::Uploaded, UploadStatus::Failed]
    }
}

/// Which uploads a new run may claim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaimRule {
    pub from: &'static [UploadStatus],
    /// A `processing` upload last touched at or before this instant is treated as
    /// abandoned by a crashed run. `None` disables the takeover.
    pub stale_before: Option<DateTime<Utc>>,
}

impl ClaimRule {
    pub fn new(force: bool, lease: Duration, now: DateTime<Utc>) -> Self {
        let stale_before = chrono::Duration::from_std(lease)
            .ok()
            .and_then(|lease| now.checked_sub_signed(lease));
        Self {
            from: claimable_from(force),
            stale_before,
        }
    }

    pub fn admits(&self, status: UploadStatus, updated_at: DateTime<Utc>) -> bool {
        if self.from.contains(&status) {
            return true;
        }
        status == UploadStatus::Processing
            && self.stale_before.is_some_and(|cutoff| updated_at <= cutoff)
    }
}

/// How a dispatched run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcomeKind {
    Ready,
    Failed { error: String },
    /// The upload could not be claimed; nothing was done.
    Skipped { status: UploadStatus },
}

/// The structured result handed back to the dispatcher instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub upload_id: Uuid,
    pub run_id: Option<Uuid>,
    pub kind: RunOutcomeKind,
    pub topics_attempted: usize,
    pub topics_completed: usize,
}

impl RunOutcome {
    pub fn skipped(upload_id: Uuid, status: UploadStatus) -> Self {
        Self {
            upload_id,
            run_id: None,
            kind: RunOutcomeKind::Skipped { status },
            topics_attempted: 0,
            topics_completed: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.kind == RunOutcomeKind::Ready
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.kind, RunOutcomeKind::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use UploadStatus::*;

    const LEASE: Duration = Duration::from_secs(600);

    #[test]
    fn processing_is_claimable_only_when_forced() {
        assert!(!claimable_from(false).contains(&Processing));
        assert!(claimable_from(true).contains(&Processing));
    }

    #[test]
    fn a_live_run_keeps_its_upload() {
        let now = Utc::now();
        let rule = ClaimRule::new(false, LEASE, now);
        assert!(!rule.admits(Processing, now - chrono::Duration::seconds(60)));
        assert!(rule.admits(Uploaded, now));
        assert!(!rule.admits(Ready, now - chrono::Duration::hours(5)));
    }

    #[test]
    fn a_lapsed_lease_frees_the_upload() {
        let now = Utc::now();
        let rule = ClaimRule::new(false, LEASE, now);
        assert_eq!(rule.stale_before, Some(now - chrono::Duration::seconds(600)));
        assert!(rule.admits(Processing, now - chrono::Duration::seconds(601)));
        assert!(rule.admits(Processing, now - chrono::Duration::seconds(600)));
    }

    #[test]
    fn force_takes_over_a_live_run() {
        let now = Utc::now();
        assert!(ClaimRule::new(true, LEASE, now).admits(Processing, now));
    }

    #[test]
    fn an_unrepresentable_lease_never_lapses() {
        let rule = ClaimRule::new(false, Duration::MAX, Utc::now());
        assert_eq!(rule.stale_before, None);
        assert!(!rule.admits(Processing, DateTime::<Utc>::MIN_UTC));
    }

    #[test]
    fn ready_needs_force() {
        assert!(!claimable_from(false).contains(&Ready));
        assert!(claimable_from(true).contains(&Ready));
        assert!(claimable_from(false).contains(&Failed));
    }

    #[test]
    fn every_claimable_status_may_enter_processing() {
        for status in claimable_from(true) {
            assert!(status.can_transition_to(Processing));
        }
    }

    #[test]
    fn status_only_moves_forward_within_a_run() {
        assert!(Processing.can_transition_to(Ready));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Uploaded.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Uploaded));
        assert!(Ready.is_terminal() && Failed.is_terminal());
        assert!(!Processing.is_terminal());
    }
}
