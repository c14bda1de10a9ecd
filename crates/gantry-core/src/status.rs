//! Status vocabulary shared by jobs, stages, and pipelines.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Created,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::Created,
        Status::Pending,
        Status::Running,
        Status::Success,
        Status::Failed,
        Status::Canceled,
        Status::Skipped,
        Status::Manual,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failed | Status::Canceled | Status::Skipped
        )
    }

    /// Active statuses may still transition; cancel is only legal from here.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses that count as "this entity is done" for stage admission.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failed | Status::Canceled | Status::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Created => "created",
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Canceled => "canceled",
            Status::Skipped => "skipped",
            Status::Manual => "manual",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a job is allowed to run relative to its prior stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WhenPolicy {
    #[default]
    OnSuccess,
    OnFailure,
    Always,
    Manual,
}

/// One entry in a composite-status fold.
#[derive(Debug, Clone, Copy)]
pub struct StatusEntry {
    pub status: Status,
    pub allow_failure: bool,
}

impl StatusEntry {
    pub fn new(status: Status, allow_failure: bool) -> Self {
        Self {
            status,
            allow_failure,
        }
    }
}

/// Fold a multiset of job statuses into one composite status.
///
/// Pure over the multiset: only counts matter, never ordering. A failed or
/// canceled entry with `allow_failure` counts toward success. The cascade is
/// evaluated top to bottom and the first matching rule wins:
///
/// ```text
/// empty                               -> skipped
/// all created                         -> created
/// all skipped                         -> skipped
/// success + skipped == all            -> success
/// success + skipped + canceled == all -> canceled
/// created + skipped + pending == all  -> pending
/// any running or pending              -> running
/// any manual                          -> manual
/// any created                         -> running
/// otherwise                           -> failed
/// ```
pub fn compose<I>(entries: I) -> Status
where
    I: IntoIterator<Item = StatusEntry>,
{
    let mut total = 0usize;
    let mut created = 0usize;
    let mut pending = 0usize;
    let mut running = 0usize;
    let mut success = 0usize;
    let mut canceled = 0usize;
    let mut skipped = 0usize;
    let mut manual = 0usize;

    for entry in entries {
        total += 1;
        if entry.allow_failure && matches!(entry.status, Status::Failed | Status::Canceled) {
            success += 1;
            continue;
        }
        match entry.status {
            Status::Created => created += 1,
            Status::Pending => pending += 1,
            Status::Running => running += 1,
            Status::Success => success += 1,
            Status::Failed => {}
            Status::Canceled => canceled += 1,
            Status::Skipped => skipped += 1,
            Status::Manual => manual += 1,
        }
    }

    if total == 0 {
        Status::Skipped
    } else if created == total {
        Status::Created
    } else if skipped == total {
        Status::Skipped
    } else if success + skipped == total {
        Status::Success
    } else if success + skipped + canceled == total {
        Status::Canceled
    } else if created + skipped + pending == total {
        Status::Pending
    } else if running + pending > 0 {
        Status::Running
    } else if manual > 0 {
        Status::Manual
    } else if created > 0 {
        Status::Running
    } else {
        Status::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entries(statuses: &[Status]) -> Vec<StatusEntry> {
        statuses
            .iter()
            .map(|&s| StatusEntry::new(s, false))
            .collect()
    }

    #[test]
    fn test_empty_fold_is_skipped() {
        assert_eq!(compose(entries(&[])), Status::Skipped);
    }

    #[test]
    fn test_all_success() {
        assert_eq!(
            compose(entries(&[Status::Success, Status::Success])),
            Status::Success
        );
    }

    #[test]
    fn test_success_with_skipped() {
        assert_eq!(
            compose(entries(&[Status::Success, Status::Skipped])),
            Status::Success
        );
    }

    #[test]
    fn test_any_failed_wins() {
        assert_eq!(
            compose(entries(&[Status::Success, Status::Failed])),
            Status::Failed
        );
    }

    #[test]
    fn test_allowed_failure_counts_as_success() {
        let entries = vec![
            StatusEntry::new(Status::Success, false),
            StatusEntry::new(Status::Failed, true),
        ];
        assert_eq!(compose(entries), Status::Success);
    }

    #[test]
    fn test_in_flight_is_running() {
        assert_eq!(
            compose(entries(&[Status::Success, Status::Pending])),
            Status::Running
        );
        assert_eq!(
            compose(entries(&[Status::Running, Status::Created])),
            Status::Running
        );
    }

    #[test]
    fn test_manual_blocks() {
        assert_eq!(
            compose(entries(&[Status::Success, Status::Manual])),
            Status::Manual
        );
    }

    #[test]
    fn test_unprocessed_created_mixed_is_running() {
        assert_eq!(
            compose(entries(&[Status::Success, Status::Created])),
            Status::Running
        );
    }

    #[test]
    fn test_all_created_stays_created() {
        assert_eq!(
            compose(entries(&[Status::Created, Status::Created])),
            Status::Created
        );
    }

    #[test]
    fn test_canceled_fold() {
        assert_eq!(
            compose(entries(&[Status::Success, Status::Canceled])),
            Status::Canceled
        );
    }

    #[test]
    fn test_order_independence() {
        let a = compose(entries(&[Status::Failed, Status::Success, Status::Manual]));
        let b = compose(entries(&[Status::Manual, Status::Failed, Status::Success]));
        assert_eq!(a, b);
    }
}
