//! User-driven job actions: play, retry, retry-failed.
//!
//! A retry never mutates the original job. It creates a sibling copying the
//! config-derived attributes under a fresh identity, marks the original as
//! superseded, and enqueues the sibling. Play may therefore hand back a
//! different job than the one invoked; callers must use the returned record.

use crate::machine::{self, JobEvent};
use crate::processor::{PipelineProcessor, MAX_CONFLICT_RETRIES};
use gantry_core::ids::{JobId, PipelineId, UserId};
use gantry_core::job::Job;
use gantry_core::ports::{Clock, JobRepository};
use gantry_core::project::Project;
use gantry_core::status::Status;
use gantry_core::{Error, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct JobActions {
    jobs: Arc<dyn JobRepository>,
    processor: Arc<PipelineProcessor>,
    clock: Arc<dyn Clock>,
}

impl JobActions {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        processor: Arc<PipelineProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jobs,
            processor,
            clock,
        }
    }

    /// Start a manual-action job. Returns the job that is now pending:
    /// the same record when the enqueue took, or a retried sibling when the
    /// job had already been superseded or the enqueue raced. `Ok(None)`
    /// when the job is not playable.
    pub async fn play_job(
        &self,
        project: &Project,
        job_id: JobId,
        user_id: UserId,
    ) -> Result<Option<Job>> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;
        if !machine::playable(&job, project) {
            return Ok(None);
        }

        if !job.retried {
            if let Some(updated) = self
                .processor
                .enqueue_job_as(project, job_id, user_id)
                .await?
            {
                info!(job = %updated.id, user = %user_id, "manual job played");
                return Ok(Some(updated));
            }
        }

        let sibling = self
            .create_retried_sibling(project, &job, Some(user_id))
            .await?;
        info!(job = %job.id, sibling = %sibling.id, "manual job played via retry");
        Ok(Some(sibling))
    }

    /// Retry a finished job. `Ok(None)` when the guard rejects it. The
    /// original keeps its terminal status; only the sibling is live.
    pub async fn retry_job(
        &self,
        project: &Project,
        job_id: JobId,
        user_id: Option<UserId>,
    ) -> Result<Option<Job>> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;
        if !machine::retryable(&job, project) {
            return Ok(None);
        }
        let sibling = self.create_retried_sibling(project, &job, user_id).await?;
        info!(job = %job.id, sibling = %sibling.id, "job retried");
        Ok(Some(sibling))
    }

    /// Retry every latest failed job that passes the retry guard.
    pub async fn retry_failed(
        &self,
        project: &Project,
        pipeline_id: PipelineId,
        user_id: Option<UserId>,
    ) -> Result<Vec<Job>> {
        let latest = self.jobs.latest_for_pipeline(pipeline_id).await?;
        let mut retried = Vec::new();
        for job in latest.iter().filter(|j| j.status == Status::Failed) {
            if let Some(sibling) = self.retry_job(project, job.id, user_id).await? {
                retried.push(sibling);
            }
        }
        Ok(retried)
    }

    /// Sibling manual jobs of the same pipeline, excluding this job's name.
    pub async fn other_actions(&self, job: &Job) -> Result<Vec<Job>> {
        let latest = self.jobs.latest_for_pipeline(job.pipeline_id).await?;
        Ok(latest
            .into_iter()
            .filter(|other| {
                other.manual_action() && other.status == Status::Manual && other.name != job.name
            })
            .collect())
    }

    /// The unguarded retry path: supersede the original, insert a fresh
    /// sibling from the config-derived attributes, and enqueue it. Later
    /// skipped stages re-attempt processing afterwards.
    async fn create_retried_sibling(
        &self,
        project: &Project,
        original: &Job,
        user_id: Option<UserId>,
    ) -> Result<Job> {
        self.mark_retried(original.id).await?;

        let sibling = retried_sibling(original, user_id, self.clock.now());
        let sibling_id = self.jobs.insert(&sibling).await?;
        self.processor
            .apply_job_event(project, sibling_id, JobEvent::Enqueue)
            .await?;
        self.processor
            .mark_as_processable_after_stage(project, original.pipeline_id, original.stage_idx)
            .await?;

        self.jobs
            .get(sibling_id)
            .await?
            .ok_or(Error::JobNotFound(sibling_id))
    }

    async fn mark_retried(&self, job_id: JobId) -> Result<()> {
        for _attempt in 0..MAX_CONFLICT_RETRIES {
            let job = self
                .jobs
                .get(job_id)
                .await?
                .ok_or(Error::JobNotFound(job_id))?;
            if job.retried {
                return Ok(());
            }
            let mut updated = job;
            updated.retried = true;
            match self.jobs.update(&updated).await {
                Ok(_) => return Ok(()),
                Err(err) if err.is_conflict() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::ConflictRetriesExhausted {
            entity: "job",
            id: job_id.to_string(),
            attempts: MAX_CONFLICT_RETRIES,
        })
    }
}

/// Copy the config-derived attributes of a job into a fresh record ready to
/// be enqueued. Runtime state (runner, trace, artifacts, stamps, coverage)
/// starts clean.
fn retried_sibling(
    original: &Job,
    user_id: Option<UserId>,
    now: chrono::DateTime<chrono::Utc>,
) -> Job {
    Job {
        id: JobId::new(),
        pipeline_id: original.pipeline_id,
        project_id: original.project_id,
        name: original.name.clone(),
        stage: original.stage.clone(),
        stage_idx: original.stage_idx,
        status: Status::Created,
        ref_name: original.ref_name.clone(),
        sha: original.sha.clone(),
        tag: original.tag,
        allow_failure: original.allow_failure,
        when: original.when,
        environment: original.environment.clone(),
        options: original.options.clone(),
        tag_list: original.tag_list.clone(),
        commands: original.commands.clone(),
        yaml_variables: original.yaml_variables.clone(),
        token: Uuid::new_v4().simple().to_string(),
        runner_id: None,
        user_id: user_id.or(original.user_id),
        trigger_id: original.trigger_id,
        coverage: None,
        retried: false,
        timeout_seconds: original.timeout_seconds,
        created_at: now,
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
