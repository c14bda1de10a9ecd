//! Shared in-memory store implementing the repository and cache ports.

use async_trait::async_trait;
use gantry_core::ids::{JobId, PipelineId, ProjectId};
use gantry_core::job::Job;
use gantry_core::pipeline::Pipeline;
use gantry_core::ports::{CachedStatus, JobRepository, PipelineRepository, StatusCache};
use gantry_core::status::Status;
use gantry_core::{Error, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    pipelines: RwLock<HashMap<PipelineId, Pipeline>>,
    /// `(ref, sha) -> pipeline id`, maintained on insert so "latest
    /// pipeline for ref/sha" is an O(1) lookup instead of an aggregate.
    latest_index: RwLock<HashMap<(String, String), PipelineId>>,
    status_cache: RwLock<HashMap<ProjectId, CachedStatus>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn insert(&self, job: &Job) -> Result<JobId> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job.id)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, job: &Job) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get_mut(&job.id).ok_or(Error::JobNotFound(job.id))?;
        if stored.lock_version != job.lock_version {
            return Err(Error::Conflict {
                entity: "job",
                id: job.id.to_string(),
            });
        }
        let mut committed = job.clone();
        committed.lock_version += 1;
        *stored = committed.clone();
        Ok(committed)
    }

    async fn for_pipeline(&self, pipeline_id: PipelineId) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            (a.stage_idx, a.created_at, a.id.as_uuid())
                .cmp(&(b.stage_idx, b.created_at, b.id.as_uuid()))
        });
        Ok(jobs)
    }

    async fn latest_for_pipeline(&self, pipeline_id: PipelineId) -> Result<Vec<Job>> {
        let mut jobs = self.for_pipeline(pipeline_id).await?;
        jobs.retain(|j| !j.retried);
        Ok(jobs)
    }

    async fn pending_unclaimed(&self, project_ids: &[ProjectId]) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| {
                j.status == Status::Pending
                    && j.runner_id.is_none()
                    && !j.retried
                    && project_ids.contains(&j.project_id)
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            (a.created_at, a.id.as_uuid()).cmp(&(b.created_at, b.id.as_uuid()))
        });
        Ok(jobs)
    }
}

#[async_trait]
impl PipelineRepository for MemoryStore {
    async fn insert(&self, pipeline: &Pipeline) -> Result<PipelineId> {
        self.pipelines
            .write()
            .await
            .insert(pipeline.id, pipeline.clone());
        self.latest_index.write().await.insert(
            (pipeline.ref_name.clone(), pipeline.sha.clone()),
            pipeline.id,
        );
        Ok(pipeline.id)
    }

    async fn get(&self, id: PipelineId) -> Result<Option<Pipeline>> {
        Ok(self.pipelines.read().await.get(&id).cloned())
    }

    async fn update(&self, pipeline: &Pipeline) -> Result<Pipeline> {
        let mut pipelines = self.pipelines.write().await;
        let stored = pipelines
            .get_mut(&pipeline.id)
            .ok_or(Error::PipelineNotFound(pipeline.id))?;
        if stored.lock_version != pipeline.lock_version {
            return Err(Error::Conflict {
                entity: "pipeline",
                id: pipeline.id.to_string(),
            });
        }
        let mut committed = pipeline.clone();
        committed.lock_version += 1;
        *stored = committed.clone();
        Ok(committed)
    }

    async fn latest_for(&self, ref_name: &str, sha: &str) -> Result<Option<Pipeline>> {
        let index = self.latest_index.read().await;
        let Some(id) = index.get(&(ref_name.to_string(), sha.to_string())) else {
            return Ok(None);
        };
        Ok(self.pipelines.read().await.get(id).cloned())
    }
}

#[async_trait]
impl StatusCache for MemoryStore {
    async fn get(&self, project_id: ProjectId) -> Result<Option<CachedStatus>> {
        Ok(self.status_cache.read().await.get(&project_id).cloned())
    }

    async fn put(&self, project_id: ProjectId, entry: CachedStatus) -> Result<()> {
        self.status_cache.write().await.insert(project_id, entry);
        Ok(())
    }

    async fn delete(&self, project_id: ProjectId) -> Result<()> {
        self.status_cache.write().await.remove(&project_id);
        Ok(())
    }
}
