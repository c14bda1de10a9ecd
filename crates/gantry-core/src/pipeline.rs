//! Pipeline records — the aggregate run of all jobs for one commit/ref.

use crate::ids::{PipelineId, ProjectId, TriggerId, UserId};
use crate::status::Status;
use crate::variables::Variable;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Pipeline {
    pub id: PipelineId,
    pub project_id: ProjectId,
    /// Derived from the latest-jobs composite fold, never set directly.
    pub status: Status,
    pub ref_name: String,
    pub sha: String,
    pub before_sha: Option<String>,
    pub tag: bool,
    /// Configuration parse failure; forces the composite status to failed.
    pub yaml_errors: Option<String>,
    pub user_id: Option<UserId>,
    pub trigger_id: Option<TriggerId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Whole seconds between started_at and finished_at, clamped to zero.
    pub duration: Option<i64>,
    pub lock_version: u32,
}

impl Pipeline {
    pub fn new(
        project_id: ProjectId,
        ref_name: impl Into<String>,
        sha: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PipelineId::new(),
            project_id,
            status: Status::Created,
            ref_name: ref_name.into(),
            sha: sha.into(),
            before_sha: None,
            tag: false,
            yaml_errors: None,
            user_id: None,
            trigger_id: None,
            created_at,
            started_at: None,
            finished_at: None,
            duration: None,
            lock_version: 0,
        }
    }

    pub fn invalid_config(&self) -> bool {
        self.yaml_errors.is_some()
    }

    pub fn complete(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds spent waiting before the first job started. Absent when the
    /// pipeline never started or the wait rounded down to zero.
    pub fn queued_duration(&self) -> Option<i64> {
        let started = self.started_at?;
        let queued = (started - self.created_at).num_seconds().max(0);
        (queued > 0).then_some(queued)
    }

    pub fn predefined_variables(&self) -> Vec<Variable> {
        vec![Variable::public(
            "CI_PIPELINE_ID",
            self.id.as_uuid().to_string(),
        )]
    }

    /// Recompute `duration` from the start/finish stamps, clamping skew.
    pub fn refresh_duration(&mut self) {
        self.duration = match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some((finished - started).num_seconds().max(0)),
            _ => None,
        };
    }
}
