//! The pipeline processor service.
//!
//! Owns every status mutation: creating pipelines from parsed configuration,
//! admitting created jobs stage by stage, applying job and pipeline
//! transitions under optimistic-lock retry, and keeping the external build
//! status cache fresh. Cross-process coordination happens entirely through
//! the repository's row versions; the processor holds no in-memory state.

use crate::machine::{self, JobEvent, PipelineEvent, TransitionTable};
use crate::stages::{self, Admission, StageView};
use gantry_core::config::PipelineConfig;
use gantry_core::ids::{JobId, PipelineId, RunnerId, TriggerId, UserId};
use gantry_core::job::Job;
use gantry_core::pipeline::Pipeline;
use gantry_core::ports::{
    CachedStatus, Clock, JobRepository, Notifier, PipelineRepository, QueueSignal, StatusCache,
};
pub use gantry_core::ports::MAX_CONFLICT_RETRIES;
use gantry_core::project::Project;
use gantry_core::status::{compose, Status, StatusEntry};
use gantry_core::variables::Variable;
use gantry_core::{Error, Result};
use gantry_trace::{extract_coverage, TraceStore};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attributes of a pipeline about to be created for a pushed/triggered ref.
#[derive(Debug, Clone)]
pub struct NewPipeline {
    pub ref_name: String,
    pub sha: String,
    pub before_sha: Option<String>,
    pub tag: bool,
    pub user_id: Option<UserId>,
    pub trigger_id: Option<TriggerId>,
}

pub struct PipelineProcessor {
    jobs: Arc<dyn JobRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    notifier: Arc<dyn Notifier>,
    status_cache: Arc<dyn StatusCache>,
    queue_signal: Arc<dyn QueueSignal>,
    clock: Arc<dyn Clock>,
    traces: Arc<TraceStore>,
    job_table: TransitionTable<JobEvent>,
    pipeline_table: TransitionTable<PipelineEvent>,
}

impl PipelineProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        pipelines: Arc<dyn PipelineRepository>,
        notifier: Arc<dyn Notifier>,
        status_cache: Arc<dyn StatusCache>,
        queue_signal: Arc<dyn QueueSignal>,
        clock: Arc<dyn Clock>,
        traces: Arc<TraceStore>,
    ) -> Self {
        Self {
            jobs,
            pipelines,
            notifier,
            status_cache,
            queue_signal,
            clock,
            traces,
            job_table: machine::job_transitions(),
            pipeline_table: machine::pipeline_transitions(),
        }
    }

    /// Create a pipeline and its jobs from parsed configuration, then run
    /// the first processing pass so stage-zero jobs leave `created`.
    pub async fn create_pipeline(
        &self,
        project: &Project,
        attrs: NewPipeline,
        config: &PipelineConfig,
    ) -> Result<Pipeline> {
        let now = self.clock.now();
        let mut pipeline = Pipeline::new(project.id, attrs.ref_name, attrs.sha, now);
        pipeline.before_sha = attrs.before_sha;
        pipeline.tag = attrs.tag;
        pipeline.user_id = attrs.user_id;
        pipeline.trigger_id = attrs.trigger_id;
        let pipeline_id = self.pipelines.insert(&pipeline).await?;

        let specs = config.resolved_jobs();
        for spec in &specs {
            let job = self.job_from_spec(project, &pipeline, spec);
            self.jobs.insert(&job).await?;
        }
        info!(
            pipeline = %pipeline_id,
            ref_name = %pipeline.ref_name,
            jobs = specs.len(),
            "pipeline created"
        );

        self.process_pipeline(project, pipeline_id).await?;
        self.pipelines
            .get(pipeline_id)
            .await?
            .ok_or(Error::PipelineNotFound(pipeline_id))
    }

    /// Create a pipeline whose configuration failed to parse. No jobs are
    /// created and the recompute forces the composite status to failed.
    pub async fn create_invalid_pipeline(
        &self,
        project: &Project,
        attrs: NewPipeline,
        yaml_errors: impl Into<String>,
    ) -> Result<Pipeline> {
        let now = self.clock.now();
        let mut pipeline = Pipeline::new(project.id, attrs.ref_name, attrs.sha, now);
        pipeline.before_sha = attrs.before_sha;
        pipeline.tag = attrs.tag;
        pipeline.user_id = attrs.user_id;
        pipeline.trigger_id = attrs.trigger_id;
        pipeline.yaml_errors = Some(yaml_errors.into());
        let pipeline_id = self.pipelines.insert(&pipeline).await?;

        self.recompute_status(project, pipeline_id).await
    }

    /// Walk stages in ascending order and admit every created job whose
    /// prior-stages composite allows it. Returns the jobs that left
    /// `created` for pending or manual.
    pub async fn process_pipeline(
        &self,
        project: &Project,
        pipeline_id: PipelineId,
    ) -> Result<Vec<JobId>> {
        let latest = self.jobs.latest_for_pipeline(pipeline_id).await?;
        let mut stage_idxs: Vec<u32> = latest
            .iter()
            .filter(|j| j.status == Status::Created)
            .map(|j| j.stage_idx)
            .collect();
        stage_idxs.sort_unstable();
        stage_idxs.dedup();

        let mut processed = Vec::new();
        for stage_idx in stage_idxs {
            // Re-read per stage: admissions in earlier stages change the
            // composite this stage sees.
            let latest = self.jobs.latest_for_pipeline(pipeline_id).await?;
            let prior = stages::prior_stages_status(&latest, stage_idx);
            for job in latest
                .iter()
                .filter(|j| j.stage_idx == stage_idx && j.status == Status::Created)
            {
                match stages::admit(job.when, prior) {
                    Admission::Wait => {}
                    Admission::Enqueue => {
                        if let Some(updated) =
                            self.apply_job_event(project, job.id, JobEvent::Enqueue).await?
                        {
                            processed.push(updated.id);
                        }
                    }
                    Admission::Actionize => {
                        if let Some(updated) = self
                            .apply_job_event(project, job.id, JobEvent::Actionize)
                            .await?
                        {
                            processed.push(updated.id);
                        }
                    }
                    Admission::Skip => {
                        self.apply_job_event(project, job.id, JobEvent::Skip).await?;
                    }
                }
            }
        }

        self.recompute_status(project, pipeline_id).await?;
        Ok(processed)
    }

    /// Apply a runner-reported or user-requested outcome to a job. When the
    /// job lands in a terminal state, the pipeline is re-processed so
    /// later-stage jobs waiting on this stage get admitted.
    pub async fn finish_job(
        &self,
        project: &Project,
        job_id: JobId,
        event: JobEvent,
    ) -> Result<Option<Job>> {
        let Some(saved) = self.apply_job_event(project, job_id, event).await? else {
            return Ok(None);
        };
        if saved.status.is_terminal() {
            self.process_pipeline(project, saved.pipeline_id).await?;
        }
        Ok(Some(saved))
    }

    /// Apply one job event under bounded optimistic retry.
    ///
    /// `Ok(None)` means the event was not legal from the job's current
    /// state — an expected race outcome, never an error.
    pub async fn apply_job_event(
        &self,
        project: &Project,
        job_id: JobId,
        event: JobEvent,
    ) -> Result<Option<Job>> {
        self.apply_job_event_with(project, job_id, event, |_| {}).await
    }

    /// Enqueue a job and record the acting user in the same committed write.
    pub async fn enqueue_job_as(
        &self,
        project: &Project,
        job_id: JobId,
        user_id: UserId,
    ) -> Result<Option<Job>> {
        self.apply_job_event_with(project, job_id, JobEvent::Enqueue, |job| {
            job.user_id = Some(user_id);
        })
        .await
    }

    /// Claim a pending job for a runner: the run transition plus the runner
    /// assignment commit atomically under the row version. A conflict means
    /// another poller won the race — the caller sees "no job", not an error.
    pub async fn claim_job(
        &self,
        project: &Project,
        job_id: JobId,
        runner_id: RunnerId,
    ) -> Result<Option<Job>> {
        let Some(job) = self.jobs.get(job_id).await? else {
            return Ok(None);
        };
        if job.runner_id.is_some() {
            return Ok(None);
        }
        let from = job.status;
        let Some(target) = self.job_table.target(from, JobEvent::Run) else {
            return Ok(None);
        };

        let mut updated = job;
        updated.status = target;
        updated.runner_id = Some(runner_id);
        self.stamp_job(&mut updated, target);

        match self.jobs.update(&updated).await {
            Ok(saved) => {
                info!(job = %saved.id, runner = %runner_id, "job claimed");
                self.after_job_transition(project, &saved).await?;
                Ok(Some(saved))
            }
            Err(err) if err.is_conflict() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Re-attempt the processing transition of every skipped job in stages
    /// after `stage_idx`. Deliberately broad: each job re-evaluates its own
    /// guards, so re-attempting all of them is safe.
    pub async fn mark_as_processable_after_stage(
        &self,
        project: &Project,
        pipeline_id: PipelineId,
        stage_idx: u32,
    ) -> Result<Vec<JobId>> {
        let latest = self.jobs.latest_for_pipeline(pipeline_id).await?;
        let mut revived = Vec::new();
        for job in latest
            .iter()
            .filter(|j| j.stage_idx > stage_idx && j.status == Status::Skipped)
        {
            if let Some(updated) = self.apply_job_event(project, job.id, JobEvent::Enqueue).await? {
                revived.push(updated.id);
            }
        }
        Ok(revived)
    }

    /// Cancel every currently-cancelable job of a pipeline. Individual
    /// conflict losers are tolerated; the batch never aborts on a race.
    pub async fn cancel_running(
        &self,
        project: &Project,
        pipeline_id: PipelineId,
    ) -> Result<usize> {
        let latest = self.jobs.latest_for_pipeline(pipeline_id).await?;
        let mut canceled = 0;
        for job in latest.iter().filter(|j| machine::cancelable(j)) {
            match self.apply_job_event(project, job.id, JobEvent::Cancel).await {
                Ok(Some(_)) => canceled += 1,
                Ok(None) => {}
                Err(Error::ConflictRetriesExhausted { .. }) => {
                    warn!(job = %job.id, "cancel lost every retry, leaving job to its racer");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(canceled)
    }

    /// Fold the latest jobs into a composite status and apply the matching
    /// pipeline event. Idempotent: recomputing with no intervening job
    /// change applies no transition and re-fires no notifications.
    pub async fn recompute_status(
        &self,
        project: &Project,
        pipeline_id: PipelineId,
    ) -> Result<Pipeline> {
        for _attempt in 0..MAX_CONFLICT_RETRIES {
            let pipeline = self
                .pipelines
                .get(pipeline_id)
                .await?
                .ok_or(Error::PipelineNotFound(pipeline_id))?;

            let composite = self.latest_builds_status(&pipeline).await?;
            let Some(event) = machine::event_for_composite(composite) else {
                self.refresh_status_cache(project, &pipeline).await?;
                return Ok(pipeline);
            };
            let from = pipeline.status;
            let Some(target) = self.pipeline_table.target(from, event) else {
                self.refresh_status_cache(project, &pipeline).await?;
                return Ok(pipeline);
            };

            let mut updated = pipeline;
            updated.status = target;
            self.stamp_pipeline(&mut updated, from, target);

            match self.pipelines.update(&updated).await {
                Ok(saved) => {
                    debug!(pipeline = %saved.id, from = %from, to = %target, "pipeline transitioned");
                    for notification in machine::pipeline_notifications(&saved, from, target) {
                        self.notifier.notify(notification).await?;
                    }
                    self.refresh_status_cache(project, &saved).await?;
                    return Ok(saved);
                }
                Err(err) if err.is_conflict() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::ConflictRetriesExhausted {
            entity: "pipeline",
            id: pipeline_id.to_string(),
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    /// The composite status the pipeline's own machine should realize:
    /// failed configuration forces `failed`, otherwise the pure fold over
    /// the latest jobs' statuses (empty set folds to `skipped`).
    pub async fn latest_builds_status(&self, pipeline: &Pipeline) -> Result<Status> {
        if pipeline.invalid_config() {
            return Ok(Status::Failed);
        }
        let latest = self.jobs.latest_for_pipeline(pipeline.id).await?;
        Ok(compose(
            latest
                .iter()
                .map(|j| StatusEntry::new(j.status, j.allow_failure)),
        ))
    }

    /// Stage views for presentation, derived on demand.
    pub async fn stage_views(&self, pipeline_id: PipelineId) -> Result<Vec<StageView>> {
        let latest = self.jobs.latest_for_pipeline(pipeline_id).await?;
        Ok(stages::stage_views(&latest))
    }

    pub async fn pipeline_retryable(
        &self,
        project: &Project,
        pipeline_id: PipelineId,
    ) -> Result<bool> {
        let latest = self.jobs.latest_for_pipeline(pipeline_id).await?;
        Ok(stages::any_retryable(&latest, project))
    }

    pub async fn pipeline_cancelable(&self, pipeline_id: PipelineId) -> Result<bool> {
        let latest = self.jobs.latest_for_pipeline(pipeline_id).await?;
        Ok(stages::any_cancelable(&latest))
    }

    /// Owned copies of the jobs a job depends on, for artifact fan-in.
    pub async fn depends_on(&self, job_id: JobId) -> Result<Vec<Job>> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;
        let latest = self.jobs.latest_for_pipeline(job.pipeline_id).await?;
        Ok(stages::depends_on(&job, &latest)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn apply_job_event_with(
        &self,
        project: &Project,
        job_id: JobId,
        event: JobEvent,
        mutate: impl Fn(&mut Job),
    ) -> Result<Option<Job>> {
        for _attempt in 0..MAX_CONFLICT_RETRIES {
            let job = self
                .jobs
                .get(job_id)
                .await?
                .ok_or(Error::JobNotFound(job_id))?;
            let from = job.status;
            let Some(target) = self.job_table.target(from, event) else {
                debug!(job = %job_id, from = %from, ?event, "illegal job transition ignored");
                return Ok(None);
            };

            let mut updated = job;
            updated.status = target;
            self.stamp_job(&mut updated, target);
            mutate(&mut updated);

            match self.jobs.update(&updated).await {
                Ok(saved) => {
                    debug!(job = %saved.id, from = %from, to = %target, "job transitioned");
                    self.after_job_transition(project, &saved).await?;
                    return Ok(Some(saved));
                }
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

    /// Side effects of a committed job transition, inside the same unit of
    /// work: notifications, the runner queue wake-up, best-effort coverage,
    /// and the cascading pipeline recompute.
    async fn after_job_transition(&self, project: &Project, job: &Job) -> Result<()> {
        for notification in machine::job_notifications(job, job.status) {
            self.notifier.notify(notification).await?;
        }
        if matches!(job.status, Status::Pending | Status::Running) || job.status.is_terminal() {
            self.queue_signal.tick(job.project_id);
        }
        if matches!(job.status, Status::Success | Status::Failed) {
            self.update_coverage(project, job).await;
        }
        self.recompute_status(project, job.pipeline_id).await?;
        Ok(())
    }

    /// Scrape a coverage figure from the trace. Strictly best-effort: a
    /// malformed regex, a missing trace, or a racing writer must never
    /// fail the transition that got us here.
    async fn update_coverage(&self, project: &Project, job: &Job) {
        let Some(pattern) = project.coverage_regex.as_deref() else {
            return;
        };
        let Ok(Some(text)) = self.traces.read(job, project, None) else {
            return;
        };
        let Some(coverage) = extract_coverage(&text, pattern) else {
            return;
        };
        let mut updated = job.clone();
        updated.coverage = Some(coverage);
        if let Err(err) = self.jobs.update(&updated).await {
            debug!(job = %job.id, %err, "coverage update skipped");
        }
    }

    /// Keep the fast "latest build status for project" cache in step: the
    /// entry is overwritten only while it describes the project's current
    /// head commit, otherwise it is dropped.
    async fn refresh_status_cache(&self, project: &Project, pipeline: &Pipeline) -> Result<()> {
        match project.head_sha.as_deref() {
            Some(head) if head == pipeline.sha => {
                self.status_cache
                    .put(project.id, CachedStatus::new(&pipeline.sha, pipeline.status))
                    .await
            }
            _ => self.status_cache.delete(project.id).await,
        }
    }

    fn stamp_job(&self, job: &mut Job, target: Status) {
        let now = self.clock.now();
        match target {
            Status::Pending => {
                job.queued_at.get_or_insert(now);
            }
            Status::Running => job.started_at = Some(now),
            _ if target.is_terminal() => job.finished_at = Some(now),
            _ => {}
        }
    }

    fn stamp_pipeline(&self, pipeline: &mut Pipeline, from: Status, target: Status) {
        let now = self.clock.now();
        if target == Status::Running && matches!(from, Status::Created | Status::Pending) {
            pipeline.started_at = Some(now);
        }
        if target.is_terminal() {
            pipeline.finished_at = Some(now);
            pipeline.refresh_duration();
        }
    }

    fn job_from_spec(
        &self,
        project: &Project,
        pipeline: &Pipeline,
        spec: &gantry_core::config::JobSpec,
    ) -> Job {
        Job {
            id: JobId::new(),
            pipeline_id: pipeline.id,
            project_id: project.id,
            name: spec.name.clone(),
            stage: spec.stage.clone(),
            stage_idx: spec.stage_idx.unwrap_or(0),
            status: Status::Created,
            ref_name: pipeline.ref_name.clone(),
            sha: pipeline.sha.clone(),
            tag: pipeline.tag,
            allow_failure: spec.allow_failure,
            when: spec.when,
            environment: spec.environment.clone(),
            options: spec.options.clone(),
            tag_list: spec.tags.clone(),
            commands: spec.commands.clone(),
            yaml_variables: spec
                .variables
                .iter()
                .map(|(key, value)| Variable::public(key.clone(), value.clone()))
                .collect(),
            token: generate_job_token(),
            runner_id: None,
            user_id: pipeline.user_id,
            trigger_id: pipeline.trigger_id,
            coverage: None,
            retried: false,
            timeout_seconds: Some(project.build_timeout_seconds),
            created_at: self.clock.now(),
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
}

fn generate_job_token() -> String {
    Uuid::new_v4().simple().to_string()
}
