//! Runner dispatch: handing the single best-next pending job to a poller.
//!
//! Claims go through the repository's row version, so two concurrent
//! pollers can never both take the same job; the loser simply sees "no job
//! available". Long-polling runners short-circuit on a per-runner queue
//! generation token that bumps whenever a visible job changes state.

use crate::processor::PipelineProcessor;
use chrono::{DateTime, Utc};
use gantry_core::ids::{ProjectId, RunnerId};
use gantry_core::job::Job;
use gantry_core::ports::{JobRepository, QueueSignal};
use gantry_core::project::{Project, Runner};
use gantry_core::status::Status;
use gantry_core::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Monotonically increasing per-runner generation counters.
///
/// Shared between the dispatch queue (reads on poll) and the processor
/// (ticks on every visible job transition via [`QueueSignal`]).
#[derive(Default)]
pub struct QueueGenerations {
    inner: RwLock<HashMap<RunnerId, RunnerEntry>>,
}

struct RunnerEntry {
    generation: u64,
    project_ids: Vec<ProjectId>,
}

impl QueueGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the runner's visibility set and return its current token.
    pub fn register(&self, runner: &Runner) -> u64 {
        let mut inner = self.inner.write().expect("queue generation lock poisoned");
        let entry = inner.entry(runner.id).or_insert(RunnerEntry {
            generation: 0,
            project_ids: Vec::new(),
        });
        entry.project_ids = runner.project_ids.clone();
        entry.generation
    }

    pub fn current(&self, runner_id: RunnerId) -> u64 {
        self.inner
            .read()
            .expect("queue generation lock poisoned")
            .get(&runner_id)
            .map(|entry| entry.generation)
            .unwrap_or(0)
    }
}

impl QueueSignal for QueueGenerations {
    fn tick(&self, project_id: ProjectId) {
        let mut inner = self.inner.write().expect("queue generation lock poisoned");
        for entry in inner.values_mut() {
            if entry.project_ids.contains(&project_id) {
                entry.generation += 1;
            }
        }
    }
}

/// The outcome of one long-poll request.
#[derive(Debug)]
pub enum PollOutcome {
    /// Nothing changed since the caller's last generation token.
    Unchanged(u64),
    /// A job was claimed for this runner.
    Claimed(Box<Job>, u64),
    /// The queue changed but nothing is eligible for this runner.
    NoJob(u64),
}

pub struct RunnerDispatchQueue {
    jobs: Arc<dyn JobRepository>,
    processor: Arc<PipelineProcessor>,
    generations: Arc<QueueGenerations>,
}

impl RunnerDispatchQueue {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        processor: Arc<PipelineProcessor>,
        generations: Arc<QueueGenerations>,
    ) -> Self {
        Self {
            jobs,
            processor,
            generations,
        }
    }

    /// Select and claim at most one pending job for a polling runner.
    ///
    /// Eligibility: pending with no runner assigned, owned by one of the
    /// runner's projects with builds enabled, and tag-admissible. Among
    /// eligible candidates the oldest `created_at` wins; claim races fall
    /// through to the next candidate.
    pub async fn request_job(
        &self,
        runner: &Runner,
        projects: &[Project],
    ) -> Result<Option<Job>> {
        self.generations.register(runner);
        if !runner.active {
            return Ok(None);
        }

        for job in self.candidates(runner, projects).await? {
            let Some(project) = projects.iter().find(|p| p.id == job.project_id) else {
                continue;
            };
            match self.processor.claim_job(project, job.id, runner.id).await? {
                Some(claimed) => return Ok(Some(claimed)),
                None => {
                    debug!(job = %job.id, runner = %runner.id, "claim lost, trying next candidate");
                    continue;
                }
            }
        }
        Ok(None)
    }

    /// Long-poll entry point: callers pass the generation token from their
    /// previous poll and get an early answer when nothing changed.
    pub async fn poll(
        &self,
        runner: &Runner,
        projects: &[Project],
        last_generation: Option<u64>,
    ) -> Result<PollOutcome> {
        let generation = self.generations.register(runner);
        if last_generation == Some(generation) {
            return Ok(PollOutcome::Unchanged(generation));
        }
        match self.request_job(runner, projects).await? {
            Some(job) => Ok(PollOutcome::Claimed(
                Box::new(job),
                self.generations.current(runner.id),
            )),
            None => Ok(PollOutcome::NoJob(generation)),
        }
    }

    pub fn current_generation(&self, runner_id: RunnerId) -> u64 {
        self.generations.current(runner_id)
    }

    async fn candidates(&self, runner: &Runner, projects: &[Project]) -> Result<Vec<Job>> {
        let project_ids: Vec<ProjectId> = projects
            .iter()
            .filter(|p| p.builds_enabled && runner.serves_project(p.id))
            .map(|p| p.id)
            .collect();
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let pending = self.jobs.pending_unclaimed(&project_ids).await?;
        Ok(pending
            .into_iter()
            .filter(|job| runner.accepts_tags(&job.tag_list))
            .collect())
    }
}

/// A pending job is stuck when no online runner is able to pick it up.
pub fn stuck(job: &Job, runners: &[Runner], now: DateTime<Utc>) -> bool {
    job.status == Status::Pending
        && !runners.iter().any(|runner| {
            runner.active
                && runner.online(now)
                && runner.serves_project(job.project_id)
                && runner.accepts_tags(&job.tag_list)
        })
}
