//! Notifications the core hands to the async-dispatch facility.
//!
//! Delivery ordering across kinds is not guaranteed, only eventual
//! execution; every notification is keyed by the entity it concerns.

use crate::ids::{JobId, PipelineId, ProjectId};
use crate::status::Status;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A job entered `pending`; wakes the dispatch-queue path.
    JobPending { job_id: JobId, project_id: ProjectId },
    JobStarted { job_id: JobId },
    JobFinished { job_id: JobId, status: Status },
    /// Fired in addition to JobFinished when the terminal state is success.
    JobSucceeded { job_id: JobId },
    /// Pipeline left the queue and started running; feeds wait-time metrics.
    PipelineMetrics { pipeline_id: PipelineId },
    /// Pipeline reached success/failed/canceled; outcome drives alerting.
    PipelineFinished { pipeline_id: PipelineId, status: Status },
    /// Generic webhook fan-out for any committed pipeline transition.
    PipelineHooks {
        pipeline_id: PipelineId,
        from: Status,
        to: Status,
    },
    /// Artifact byte sizes changed; project statistics need a recount.
    ProjectStatisticsRefresh { project_id: ProjectId },
}

impl Notification {
    /// Routing subject for the dispatch facility.
    pub fn subject(&self) -> String {
        match self {
            Notification::JobPending { job_id, .. } => format!("job.pending.{job_id}"),
            Notification::JobStarted { job_id } => format!("job.started.{job_id}"),
            Notification::JobFinished { job_id, .. } => format!("job.finished.{job_id}"),
            Notification::JobSucceeded { job_id } => format!("job.succeeded.{job_id}"),
            Notification::PipelineMetrics { pipeline_id } => {
                format!("pipeline.metrics.{pipeline_id}")
            }
            Notification::PipelineFinished { pipeline_id, .. } => {
                format!("pipeline.finished.{pipeline_id}")
            }
            Notification::PipelineHooks { pipeline_id, .. } => {
                format!("pipeline.hooks.{pipeline_id}")
            }
            Notification::ProjectStatisticsRefresh { project_id } => {
                format!("project.statistics.{project_id}")
            }
        }
    }
}
