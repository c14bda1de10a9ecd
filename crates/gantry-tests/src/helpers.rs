//! Test helpers wiring the full stack over the in-memory adapters.

use chrono::Utc;
use gantry_artifacts::{ArtifactLifecycle, FsArtifactStore};
use gantry_core::ids::{JobId, PipelineId};
use gantry_core::job::Job;
use gantry_core::pipeline::Pipeline;
use gantry_core::ports::{JobRepository, PipelineRepository};
use gantry_core::project::Project;
use gantry_scheduler::actions::JobActions;
use gantry_scheduler::machine::JobEvent;
use gantry_scheduler::processor::PipelineProcessor;
use gantry_scheduler::queue::{QueueGenerations, RunnerDispatchQueue};
use gantry_store::{FixedClock, MemoryStore, RecordingNotifier};
use gantry_trace::TraceStore;
use std::sync::Arc;
use tempfile::TempDir;

/// Everything a scenario needs, wired the way a deployment wires it: one
/// shared store behind the repository ports, one notifier, one controllable
/// clock threaded through every state-machine entry point.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub generations: Arc<QueueGenerations>,
    pub traces: Arc<TraceStore>,
    pub artifacts: Arc<FsArtifactStore>,
    pub processor: Arc<PipelineProcessor>,
    pub queue: Arc<RunnerDispatchQueue>,
    pub actions: JobActions,
    pub lifecycle: ArtifactLifecycle,
    _scratch: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let scratch = TempDir::new().expect("scratch dir");
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let generations = Arc::new(QueueGenerations::new());
        let traces = Arc::new(TraceStore::new(scratch.path().join("traces")));
        let artifacts = Arc::new(FsArtifactStore::new(scratch.path().join("artifacts")));

        let processor = Arc::new(PipelineProcessor::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            store.clone(),
            generations.clone(),
            clock.clone(),
            traces.clone(),
        ));
        let queue = Arc::new(RunnerDispatchQueue::new(
            store.clone(),
            processor.clone(),
            generations.clone(),
        ));
        let actions = JobActions::new(store.clone(), processor.clone(), clock.clone());
        let lifecycle = ArtifactLifecycle::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            artifacts.clone(),
            traces.clone(),
        );

        Self {
            store,
            notifier,
            clock,
            generations,
            traces,
            artifacts,
            processor,
            queue,
            actions,
            lifecycle,
            _scratch: scratch,
        }
    }

    /// The latest job with this name, which must exist.
    pub async fn job_by_name(&self, pipeline_id: PipelineId, name: &str) -> Job {
        self.store
            .latest_for_pipeline(pipeline_id)
            .await
            .expect("store read")
            .into_iter()
            .find(|j| j.name == name)
            .unwrap_or_else(|| panic!("no latest job named {name}"))
    }

    /// Current stored copy of a job.
    pub async fn store_job(&self, id: JobId) -> Job {
        JobRepository::get(self.store.as_ref(), id)
            .await
            .expect("store read")
            .expect("job exists")
    }

    /// Current stored copy of a pipeline.
    pub async fn store_pipeline(&self, id: PipelineId) -> Pipeline {
        PipelineRepository::get(self.store.as_ref(), id)
            .await
            .expect("store read")
            .expect("pipeline exists")
    }

    /// Drive a pending job through run and a terminal outcome.
    pub async fn run_job_to(&self, project: &Project, job: &Job, outcome: JobEvent) {
        self.processor
            .apply_job_event(project, job.id, JobEvent::Run)
            .await
            .expect("run transition");
        self.processor
            .finish_job(project, job.id, outcome)
            .await
            .expect("terminal transition");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a compact subscriber for debugging a test run; calling it more
/// than once is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
