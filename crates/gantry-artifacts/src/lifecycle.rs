//! Artifact lifecycle: expiry, guarded erasure, size accounting.

use crate::store::ArtifactStore;
use chrono::{DateTime, Utc};
use gantry_core::events::Notification;
use gantry_core::ids::{JobId, UserId};
use gantry_core::job::{ArtifactsFile, Job};
use gantry_core::ports::{Clock, JobRepository, Notifier, MAX_CONFLICT_RETRIES};
use gantry_core::project::Project;
use gantry_core::{Error, Result};
use gantry_trace::TraceStore;
use std::sync::Arc;
use tracing::info;

pub struct ArtifactLifecycle {
    jobs: Arc<dyn JobRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn ArtifactStore>,
    traces: Arc<TraceStore>,
}

impl ArtifactLifecycle {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn ArtifactStore>,
        traces: Arc<TraceStore>,
    ) -> Self {
        Self {
            jobs,
            notifier,
            clock,
            store,
            traces,
        }
    }

    /// A job may be erased once it is complete and still owns artifacts or
    /// a trace.
    pub fn erasable(&self, job: &Job, project: &Project) -> bool {
        job.complete() && (job.artifacts_file.is_some() || self.traces.exists(job, project))
    }

    /// Erase a job's artifacts and trace and stamp the acting user.
    ///
    /// All-or-nothing from the caller's perspective, while each sub-removal
    /// is independently idempotent: repeating erase on an already-erased
    /// job is a safe no-op returning the job unchanged. `Ok(None)` when the
    /// guard rejects the job.
    pub async fn erase(
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
        if job.erased() {
            return Ok(Some(job));
        }
        if !self.erasable(&job, project) {
            return Ok(None);
        }

        let size_before = job.artifacts_size();
        self.store.remove_archive(&job)?;
        self.store.remove_metadata(&job)?;
        // The trace is rewritten to empty rather than unlinked, keeping the
        // read path's "erased" rendering distinct from "never ran".
        self.traces.truncate_and_rewrite(&job, project, b"")?;

        let erased = self
            .update_with_retry(job_id, |job| {
                job.artifacts_file = None;
                job.artifacts_metadata = None;
                job.artifacts_expire_at = None;
                job.erased_at = Some(self.clock.now());
                job.erased_by = user_id;
            })
            .await?;

        if size_before > 0 {
            self.notifier
                .notify(Notification::ProjectStatisticsRefresh {
                    project_id: erased.project_id,
                })
                .await?;
        }
        info!(job = %erased.id, "job erased");
        Ok(Some(erased))
    }

    /// Clear the expiry timestamp unconditionally: the artifacts are kept.
    pub async fn keep_artifacts(&self, job_id: JobId) -> Result<Job> {
        self.update_with_retry(job_id, |job| {
            job.artifacts_expire_at = None;
        })
        .await
    }

    pub async fn set_expiry(&self, job_id: JobId, expire_at: DateTime<Utc>) -> Result<Job> {
        self.update_with_retry(job_id, |job| {
            job.artifacts_expire_at = Some(expire_at);
        })
        .await
    }

    /// Record new artifact files on a job. Fires the statistics
    /// recomputation notification exactly once per actual byte-size change;
    /// a save that leaves the total size unchanged stays silent.
    pub async fn update_artifacts(
        &self,
        job_id: JobId,
        archive: Option<ArtifactsFile>,
        metadata: Option<ArtifactsFile>,
        expire_at: Option<DateTime<Utc>>,
    ) -> Result<Job> {
        let before = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;
        let size_before = before.artifacts_size();

        let updated = self
            .update_with_retry(job_id, |job| {
                job.artifacts_file = archive.clone();
                job.artifacts_metadata = metadata.clone();
                job.artifacts_expire_at = expire_at;
            })
            .await?;

        if updated.artifacts_size() != size_before {
            self.notifier
                .notify(Notification::ProjectStatisticsRefresh {
                    project_id: updated.project_id,
                })
                .await?;
        }
        Ok(updated)
    }

    /// Size accounting hook for job destruction: a job leaving with
    /// artifacts still counted triggers one final recount.
    pub async fn on_destroy(&self, job: &Job) -> Result<()> {
        if job.artifacts_size() > 0 {
            self.notifier
                .notify(Notification::ProjectStatisticsRefresh {
                    project_id: job.project_id,
                })
                .await?;
        }
        Ok(())
    }

    async fn update_with_retry(
        &self,
        job_id: JobId,
        mutate: impl Fn(&mut Job),
    ) -> Result<Job> {
        for _attempt in 0..MAX_CONFLICT_RETRIES {
            let job = self
                .jobs
                .get(job_id)
                .await?
                .ok_or(Error::JobNotFound(job_id))?;
            let mut updated = job;
            mutate(&mut updated);
            match self.jobs.update(&updated).await {
                Ok(saved) => return Ok(saved),
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
