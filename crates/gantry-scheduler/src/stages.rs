//! Stage graph evaluation.
//!
//! Stages are a derived view: a named, ordered grouping of a pipeline's
//! latest jobs by `stage_idx`. All jobs in earlier stages must resolve
//! before a stage's own jobs become eligible.

use crate::machine;
use gantry_core::job::Job;
use gantry_core::project::Project;
use gantry_core::status::{compose, Status, StatusEntry, WhenPolicy};

/// Aggregate view over one stage, recomputed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageView {
    pub name: String,
    pub index: u32,
    pub status: Status,
    /// Jobs that failed but were allowed to.
    pub warnings: usize,
}

/// Group latest jobs into ordered stage views.
pub fn stage_views(latest_jobs: &[Job]) -> Vec<StageView> {
    let mut indexes: Vec<u32> = latest_jobs.iter().map(|j| j.stage_idx).collect();
    indexes.sort_unstable();
    indexes.dedup();

    indexes
        .into_iter()
        .map(|index| {
            let members: Vec<&Job> = latest_jobs
                .iter()
                .filter(|j| j.stage_idx == index)
                .collect();
            StageView {
                name: members
                    .first()
                    .map(|j| j.stage.clone())
                    .unwrap_or_default(),
                index,
                status: compose(
                    members
                        .iter()
                        .map(|j| StatusEntry::new(j.status, j.allow_failure)),
                ),
                warnings: members
                    .iter()
                    .filter(|j| j.status == Status::Failed && j.allow_failure)
                    .count(),
            }
        })
        .collect()
}

/// Jobs this job depends on: every latest job in a strictly earlier stage,
/// narrowed to the names in the job's `dependencies` option when that
/// option is present and non-empty. Names absent from earlier stages are
/// silently ignored.
pub fn depends_on<'a>(job: &Job, latest_jobs: &'a [Job]) -> Vec<&'a Job> {
    let earlier: Vec<&Job> = latest_jobs
        .iter()
        .filter(|other| other.stage_idx < job.stage_idx)
        .collect();

    match job.options.dependencies.as_deref() {
        Some([]) | None => earlier,
        Some(names) => earlier
            .into_iter()
            .filter(|other| names.contains(&other.name))
            .collect(),
    }
}

/// Composite status of every latest job in stages strictly before
/// `stage_idx`. An empty prior set folds to success so stage zero is
/// always admissible.
pub fn prior_stages_status(latest_jobs: &[Job], stage_idx: u32) -> Status {
    let entries: Vec<StatusEntry> = latest_jobs
        .iter()
        .filter(|j| j.stage_idx < stage_idx)
        .map(|j| StatusEntry::new(j.status, j.allow_failure))
        .collect();
    if entries.is_empty() {
        Status::Success
    } else {
        compose(entries)
    }
}

/// What processing should do with a created job given the prior-stages
/// composite status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Prior stages are still in flight; leave the job untouched.
    Wait,
    Enqueue,
    /// Manual-action job: park it in `manual` until played.
    Actionize,
    Skip,
}

pub fn admit(when: WhenPolicy, prior: Status) -> Admission {
    if !prior.is_complete() {
        return Admission::Wait;
    }
    let satisfied = match when {
        WhenPolicy::OnSuccess | WhenPolicy::Manual => {
            matches!(prior, Status::Success | Status::Skipped)
        }
        WhenPolicy::OnFailure => prior == Status::Failed,
        WhenPolicy::Always => true,
    };
    match (satisfied, when) {
        (false, _) => Admission::Skip,
        (true, WhenPolicy::Manual) => Admission::Actionize,
        (true, _) => Admission::Enqueue,
    }
}

/// Existential checks exposed at the pipeline level; no stage ordering
/// logic is involved.
pub fn any_retryable(latest_jobs: &[Job], project: &Project) -> bool {
    latest_jobs.iter().any(|j| {
        matches!(j.status, Status::Failed | Status::Canceled) && machine::retryable(j, project)
    })
}

pub fn any_cancelable(latest_jobs: &[Job]) -> bool {
    latest_jobs.iter().any(machine::cancelable)
}
