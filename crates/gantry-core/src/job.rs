//! Job records — one unit of CI work within a pipeline stage.

use crate::ids::{JobId, PipelineId, ProjectId, RunnerId, TriggerId, UserId};
use crate::status::{Status, WhenPolicy};
use crate::variables::Variable;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub pipeline_id: PipelineId,
    pub project_id: ProjectId,
    pub name: String,
    pub stage: String,
    /// Position of the owning stage; contiguous, assigned from config order.
    pub stage_idx: u32,
    pub status: Status,
    pub ref_name: String,
    pub sha: String,
    /// Whether `ref_name` points at a tag rather than a branch.
    pub tag: bool,
    pub allow_failure: bool,
    pub when: WhenPolicy,
    /// Deployment environment name; may contain `$VAR` placeholders.
    pub environment: Option<String>,
    pub options: JobOptions,
    pub tag_list: Vec<String>,
    pub commands: Vec<String>,
    pub yaml_variables: Vec<Variable>,
    /// Per-job authentication token; always masked in traces and variables.
    pub token: String,
    pub runner_id: Option<RunnerId>,
    pub user_id: Option<UserId>,
    pub trigger_id: Option<TriggerId>,
    pub coverage: Option<f64>,
    /// Superseded by a retry; excluded from latest-jobs folds and lookups.
    pub retried: bool,
    /// Advisory execution timeout consumed by the runner agent.
    pub timeout_seconds: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub artifacts_file: Option<ArtifactsFile>,
    pub artifacts_metadata: Option<ArtifactsFile>,
    pub artifacts_expire_at: Option<DateTime<Utc>>,
    pub erased_at: Option<DateTime<Utc>>,
    pub erased_by: Option<UserId>,
    /// Optimistic lock version; every committed update bumps it.
    pub lock_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactsFile {
    pub filename: String,
    pub size: u64,
}

/// Free-form job options carried from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobOptions {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub artifacts: Option<ArtifactsOptions>,
    #[serde(default)]
    pub cache: Option<CacheOptions>,
    /// Earlier-stage job names whose artifacts this job consumes. `None`
    /// means "all earlier stages"; an empty list means "none".
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactsOptions {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub expire_in: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheOptions {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

impl Job {
    pub fn has_commands(&self) -> bool {
        !self.commands.is_empty()
    }

    /// A manual-action job: waits for an explicit play, never auto-starts.
    pub fn manual_action(&self) -> bool {
        self.when == WhenPolicy::Manual
    }

    pub fn triggered(&self) -> bool {
        self.trigger_id.is_some()
    }

    pub fn cancelable(&self) -> bool {
        self.status.is_active()
    }

    pub fn complete(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn erased(&self) -> bool {
        self.erased_at.is_some()
    }

    /// Expiry strictly in the past means the artifacts are logically absent
    /// even while bytes linger until a sweep removes them.
    pub fn artifacts_expired(&self, now: DateTime<Utc>) -> bool {
        self.artifacts_expire_at.is_some_and(|at| at < now)
    }

    pub fn has_artifacts(&self, now: DateTime<Utc>) -> bool {
        self.artifacts_file.is_some() && !self.artifacts_expired(now)
    }

    pub fn artifacts_size(&self) -> u64 {
        let archive = self.artifacts_file.as_ref().map_or(0, |f| f.size);
        let metadata = self.artifacts_metadata.as_ref().map_or(0, |f| f.size);
        archive + metadata
    }

    /// Wall-clock execution time in whole seconds, clamped to zero on skew.
    pub fn duration(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some((finished - started).num_seconds().max(0)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> Job {
        Job {
            id: JobId::new(),
            pipeline_id: PipelineId::new(),
            project_id: ProjectId::new(),
            name: "compile".to_string(),
            stage: "build".to_string(),
            stage_idx: 0,
            status: Status::Created,
            ref_name: "master".to_string(),
            sha: "97de212e".to_string(),
            tag: false,
            allow_failure: false,
            when: WhenPolicy::OnSuccess,
            environment: None,
            options: JobOptions::default(),
            tag_list: vec![],
            commands: vec!["make".to_string()],
            yaml_variables: vec![],
            token: "jobtoken".to_string(),
            runner_id: None,
            user_id: None,
            trigger_id: None,
            coverage: None,
            retried: false,
            timeout_seconds: None,
            created_at: Utc::now(),
            queued_at: None,
            started_at: None,
            finished_at: None,
            artifacts_file: None,
            artifacts_metadata: None,
            artifacts_expire_at: None,
            erased_at: None,
            erased_by: None,
            lock_version: 0,
        }
    }

    #[test]
    fn test_artifacts_expiry_boundary() {
        let now = Utc::now();
        let mut j = job();

        j.artifacts_expire_at = Some(now - Duration::seconds(1));
        assert!(j.artifacts_expired(now));

        j.artifacts_expire_at = Some(now + Duration::days(1));
        assert!(!j.artifacts_expired(now));

        j.artifacts_expire_at = None;
        assert!(!j.artifacts_expired(now));
    }

    #[test]
    fn test_expired_artifacts_are_logically_absent() {
        let now = Utc::now();
        let mut j = job();
        j.artifacts_file = Some(ArtifactsFile {
            filename: "artifacts.zip".to_string(),
            size: 128,
        });
        assert!(j.has_artifacts(now));

        j.artifacts_expire_at = Some(now - Duration::seconds(1));
        assert!(!j.has_artifacts(now));
    }

    #[test]
    fn test_duration_clamps_clock_skew() {
        let now = Utc::now();
        let mut j = job();
        j.started_at = Some(now);
        j.finished_at = Some(now - Duration::seconds(5));
        assert_eq!(j.duration(), Some(0));

        j.finished_at = Some(now + Duration::seconds(90));
        assert_eq!(j.duration(), Some(90));
    }
}
