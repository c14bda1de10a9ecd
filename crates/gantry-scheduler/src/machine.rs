//! Status state machines for jobs and pipelines.
//!
//! Transitions are encoded as an explicit adjacency table built once and
//! validated at construction: every state must either be terminal or have at
//! least one outgoing edge. An event that is not legal from the current
//! state resolves to `None` — runners and UI actions race against each
//! other, so an illegal attempt is an expected, recoverable outcome.

use gantry_core::events::Notification;
use gantry_core::job::Job;
use gantry_core::pipeline::Pipeline;
use gantry_core::project::Project;
use gantry_core::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEvent {
    Enqueue,
    Run,
    Succeed,
    Drop,
    Cancel,
    Skip,
    /// Marks a manual-action job before it has ever been enqueued.
    Actionize,
}

impl JobEvent {
    pub const ALL: [JobEvent; 7] = [
        JobEvent::Enqueue,
        JobEvent::Run,
        JobEvent::Succeed,
        JobEvent::Drop,
        JobEvent::Cancel,
        JobEvent::Skip,
        JobEvent::Actionize,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineEvent {
    Enqueue,
    Run,
    Succeed,
    Drop,
    Cancel,
    Skip,
    /// Composite `manual`: the pipeline is blocked on a manual action.
    Block,
}

impl PipelineEvent {
    pub const ALL: [PipelineEvent; 7] = [
        PipelineEvent::Enqueue,
        PipelineEvent::Run,
        PipelineEvent::Succeed,
        PipelineEvent::Drop,
        PipelineEvent::Cancel,
        PipelineEvent::Skip,
        PipelineEvent::Block,
    ];
}

struct Rule<E> {
    event: E,
    sources: &'static [Status],
    target: Status,
}

/// Adjacency table from (state, event) to target state.
pub struct TransitionTable<E: Copy + Eq + 'static> {
    rules: &'static [Rule<E>],
}

impl<E: Copy + Eq> TransitionTable<E> {
    fn new(rules: &'static [Rule<E>]) -> Self {
        let table = Self { rules };
        table.validate();
        table
    }

    /// Target state for `event` fired from `from`; `None` if illegal.
    pub fn target(&self, from: Status, event: E) -> Option<Status> {
        self.rules
            .iter()
            .find(|rule| rule.event == event && rule.sources.contains(&from))
            .map(|rule| rule.target)
    }

    fn validate(&self) {
        for status in Status::ALL {
            let has_outgoing = self
                .rules
                .iter()
                .any(|rule| rule.sources.contains(&status));
            assert!(
                status.is_terminal() || has_outgoing,
                "state machine state {status} is neither terminal nor has outgoing edges"
            );
        }
    }
}

const JOB_RULES: &[Rule<JobEvent>] = &[
    Rule {
        event: JobEvent::Enqueue,
        sources: &[Status::Created, Status::Skipped, Status::Manual],
        target: Status::Pending,
    },
    Rule {
        event: JobEvent::Run,
        sources: &[Status::Pending],
        target: Status::Running,
    },
    Rule {
        event: JobEvent::Succeed,
        sources: &[Status::Created, Status::Pending, Status::Running, Status::Manual],
        target: Status::Success,
    },
    Rule {
        event: JobEvent::Drop,
        sources: &[Status::Created, Status::Pending, Status::Running, Status::Manual],
        target: Status::Failed,
    },
    Rule {
        event: JobEvent::Cancel,
        sources: &[Status::Created, Status::Pending, Status::Running, Status::Manual],
        target: Status::Canceled,
    },
    Rule {
        event: JobEvent::Skip,
        sources: &[Status::Created, Status::Pending],
        target: Status::Skipped,
    },
    Rule {
        event: JobEvent::Actionize,
        sources: &[Status::Created],
        target: Status::Manual,
    },
];

// Recompute may legally ask a terminal pipeline to go pending again (a
// single retried job), while running -> pending stays illegal so a racing
// recompute no-ops. Loopback is suppressed structurally: no event is legal
// from its own target state.
const PIPELINE_RULES: &[Rule<PipelineEvent>] = &[
    Rule {
        event: PipelineEvent::Enqueue,
        sources: &[
            Status::Created,
            Status::Skipped,
            Status::Manual,
            Status::Success,
            Status::Failed,
            Status::Canceled,
        ],
        target: Status::Pending,
    },
    Rule {
        event: PipelineEvent::Run,
        sources: &[
            Status::Created,
            Status::Pending,
            Status::Success,
            Status::Failed,
            Status::Canceled,
            Status::Skipped,
            Status::Manual,
        ],
        target: Status::Running,
    },
    Rule {
        event: PipelineEvent::Succeed,
        sources: &[
            Status::Created,
            Status::Pending,
            Status::Running,
            Status::Failed,
            Status::Canceled,
            Status::Skipped,
            Status::Manual,
        ],
        target: Status::Success,
    },
    Rule {
        event: PipelineEvent::Drop,
        sources: &[
            Status::Created,
            Status::Pending,
            Status::Running,
            Status::Success,
            Status::Canceled,
            Status::Skipped,
            Status::Manual,
        ],
        target: Status::Failed,
    },
    Rule {
        event: PipelineEvent::Cancel,
        sources: &[
            Status::Created,
            Status::Pending,
            Status::Running,
            Status::Success,
            Status::Failed,
            Status::Skipped,
            Status::Manual,
        ],
        target: Status::Canceled,
    },
    Rule {
        event: PipelineEvent::Skip,
        sources: &[
            Status::Created,
            Status::Pending,
            Status::Running,
            Status::Success,
            Status::Failed,
            Status::Canceled,
            Status::Manual,
        ],
        target: Status::Skipped,
    },
    Rule {
        event: PipelineEvent::Block,
        sources: &[
            Status::Created,
            Status::Pending,
            Status::Running,
            Status::Success,
            Status::Failed,
            Status::Canceled,
            Status::Skipped,
        ],
        target: Status::Manual,
    },
];

pub fn job_transitions() -> TransitionTable<JobEvent> {
    TransitionTable::new(JOB_RULES)
}

pub fn pipeline_transitions() -> TransitionTable<PipelineEvent> {
    TransitionTable::new(PIPELINE_RULES)
}

/// Map a composite status to the pipeline event that realizes it. A
/// composite of `created` applies no event: the pipeline has not been
/// processed yet.
pub fn event_for_composite(composite: Status) -> Option<PipelineEvent> {
    match composite {
        Status::Created => None,
        Status::Pending => Some(PipelineEvent::Enqueue),
        Status::Running => Some(PipelineEvent::Run),
        Status::Success => Some(PipelineEvent::Succeed),
        Status::Failed => Some(PipelineEvent::Drop),
        Status::Canceled => Some(PipelineEvent::Cancel),
        Status::Skipped => Some(PipelineEvent::Skip),
        Status::Manual => Some(PipelineEvent::Block),
    }
}

// === Guard predicates layered on the raw transition graph ===

pub fn playable(job: &Job, project: &Project) -> bool {
    project.builds_enabled
        && job.has_commands()
        && job.manual_action()
        && job.status == Status::Manual
}

pub fn retryable(job: &Job, project: &Project) -> bool {
    project.builds_enabled
        && job.has_commands()
        && matches!(job.status, Status::Success | Status::Failed | Status::Canceled)
}

pub fn cancelable(job: &Job) -> bool {
    job.status.is_active()
}

// === Side effects: transition -> notifications, evaluated synchronously
// right after the transition commit, inside the same unit of work ===

pub fn job_notifications(job: &Job, to: Status) -> Vec<Notification> {
    let mut notifications = Vec::new();
    if to == Status::Pending {
        notifications.push(Notification::JobPending {
            job_id: job.id,
            project_id: job.project_id,
        });
    }
    if to == Status::Running {
        notifications.push(Notification::JobStarted { job_id: job.id });
    }
    if matches!(to, Status::Success | Status::Failed | Status::Canceled) {
        notifications.push(Notification::JobFinished {
            job_id: job.id,
            status: to,
        });
    }
    if to == Status::Success {
        notifications.push(Notification::JobSucceeded { job_id: job.id });
    }
    notifications
}

pub fn pipeline_notifications(pipeline: &Pipeline, from: Status, to: Status) -> Vec<Notification> {
    let mut notifications = Vec::new();
    if to == Status::Running && matches!(from, Status::Created | Status::Pending) {
        notifications.push(Notification::PipelineMetrics {
            pipeline_id: pipeline.id,
        });
    }
    if matches!(to, Status::Success | Status::Failed | Status::Canceled) {
        notifications.push(Notification::PipelineFinished {
            pipeline_id: pipeline.id,
            status: to,
        });
    }
    // Generic hook fan-out on every committed transition; loopbacks never
    // reach here because the table rejects them.
    notifications.push(Notification::PipelineHooks {
        pipeline_id: pipeline.id,
        from,
        to,
    });
    notifications
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_validate() {
        job_transitions();
        pipeline_transitions();
    }

    #[test]
    fn test_job_happy_path() {
        let table = job_transitions();
        assert_eq!(
            table.target(Status::Created, JobEvent::Enqueue),
            Some(Status::Pending)
        );
        assert_eq!(
            table.target(Status::Pending, JobEvent::Run),
            Some(Status::Running)
        );
        assert_eq!(
            table.target(Status::Running, JobEvent::Succeed),
            Some(Status::Success)
        );
    }

    #[test]
    fn test_actionize_only_from_created() {
        let table = job_transitions();
        assert_eq!(
            table.target(Status::Created, JobEvent::Actionize),
            Some(Status::Manual)
        );
        for status in Status::ALL {
            if status != Status::Created {
                assert_eq!(table.target(status, JobEvent::Actionize), None);
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_job_edges_except_enqueue_from_skipped() {
        let table = job_transitions();
        for event in JobEvent::ALL {
            assert_eq!(table.target(Status::Success, event), None);
            assert_eq!(table.target(Status::Failed, event), None);
            assert_eq!(table.target(Status::Canceled, event), None);
        }
        // Skipped jobs can be revived by later-stage re-processing.
        assert_eq!(
            table.target(Status::Skipped, JobEvent::Enqueue),
            Some(Status::Pending)
        );
    }

    #[test]
    fn test_closure_no_op_pairs_are_none() {
        let table = job_transitions();
        // Exhaustive sweep: anything the rules do not list is None.
        let mut legal = 0;
        for status in Status::ALL {
            for event in JobEvent::ALL {
                if table.target(status, event).is_some() {
                    legal += 1;
                }
            }
        }
        assert_eq!(legal, 3 + 1 + 4 + 4 + 4 + 2 + 1);
    }

    #[test]
    fn test_pipeline_loopback_is_illegal() {
        let table = pipeline_transitions();
        assert_eq!(table.target(Status::Running, PipelineEvent::Run), None);
        assert_eq!(table.target(Status::Success, PipelineEvent::Succeed), None);
        assert_eq!(table.target(Status::Manual, PipelineEvent::Block), None);
    }

    #[test]
    fn test_pipeline_enqueue_from_running_is_illegal() {
        let table = pipeline_transitions();
        assert_eq!(table.target(Status::Running, PipelineEvent::Enqueue), None);
    }

    #[test]
    fn test_event_for_composite_covers_vocabulary() {
        assert_eq!(event_for_composite(Status::Created), None);
        assert_eq!(
            event_for_composite(Status::Manual),
            Some(PipelineEvent::Block)
        );
        assert_eq!(
            event_for_composite(Status::Failed),
            Some(PipelineEvent::Drop)
        );
    }
}
