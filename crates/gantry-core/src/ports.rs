//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the scheduling core and its
//! external collaborators: the relational store (with row-level optimistic
//! locking), the async notification dispatcher, the fast status cache, and
//! the clock. Adapters live in other crates.

use crate::events::Notification;
use crate::ids::{JobId, PipelineId, ProjectId};
use crate::job::Job;
use crate::pipeline::Pipeline;
use crate::status::Status;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Bound on optimistic-lock retries before a conflict escalates to
/// [`crate::Error::ConflictRetriesExhausted`].
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// Repository for jobs.
///
/// `update` is a compare-and-swap: it commits only when the caller's
/// `lock_version` still matches the stored row, bumps the version, and
/// returns the stored copy; otherwise it fails with [`crate::Error::Conflict`]
/// and the caller re-reads and retries.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<JobId>;

    async fn get(&self, id: JobId) -> Result<Option<Job>>;

    /// Version-checked write. See the trait docs for the CAS contract.
    async fn update(&self, job: &Job) -> Result<Job>;

    /// Every job of a pipeline, including retried-and-superseded ones.
    async fn for_pipeline(&self, pipeline_id: PipelineId) -> Result<Vec<Job>>;

    /// Only the latest (non-retried) jobs, the set status folds and
    /// dependency lookups operate on.
    async fn latest_for_pipeline(&self, pipeline_id: PipelineId) -> Result<Vec<Job>>;

    /// Pending jobs with no runner assigned, across the given projects,
    /// ordered oldest `created_at` first.
    async fn pending_unclaimed(&self, project_ids: &[ProjectId]) -> Result<Vec<Job>>;
}

/// Repository for pipelines, with the same CAS `update` contract as
/// [`JobRepository`].
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn insert(&self, pipeline: &Pipeline) -> Result<PipelineId>;

    async fn get(&self, id: PipelineId) -> Result<Option<Pipeline>>;

    async fn update(&self, pipeline: &Pipeline) -> Result<Pipeline>;

    /// O(1) lookup of the most recently created pipeline for a (ref, sha)
    /// pair, maintained as an index on insert.
    async fn latest_for(&self, ref_name: &str, sha: &str) -> Result<Option<Pipeline>>;
}

/// Fire-and-forget async work dispatch.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Cached `{sha, status}` pair for "latest build status" lookups that must
/// not touch the job table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedStatus {
    pub sha: String,
    pub status: Status,
}

impl CachedStatus {
    pub fn new(sha: impl Into<String>, status: Status) -> Self {
        Self {
            sha: sha.into(),
            status,
        }
    }
}

/// Fast external cache keyed by project.
#[async_trait]
pub trait StatusCache: Send + Sync {
    async fn get(&self, project_id: ProjectId) -> Result<Option<CachedStatus>>;

    async fn put(&self, project_id: ProjectId, entry: CachedStatus) -> Result<()>;

    async fn delete(&self, project_id: ProjectId) -> Result<()>;
}

/// Wake-up signal for long-polling runners: bump the queue generation of
/// every runner that can see the given project's jobs.
pub trait QueueSignal: Send + Sync {
    fn tick(&self, project_id: ProjectId);
}

/// Explicit clock so state-machine entry points stay deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// No-op signal for contexts without polling runners (tests, one-shot CLIs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullQueueSignal;

impl QueueSignal for NullQueueSignal {
    fn tick(&self, _project_id: ProjectId) {}
}
