//! End-to-end pipeline lifecycle scenarios over the in-memory store.

use gantry_core::events::Notification;
use gantry_core::ports::StatusCache;
use gantry_core::status::Status;
use gantry_scheduler::machine::JobEvent;
use gantry_tests::fixtures::{pipeline_attrs, ConfigFixture, ProjectFixture};
use gantry_tests::TestContext;

#[tokio::test]
async fn test_three_stage_happy_path() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::three_stage())
        .await
        .unwrap();

    // Stage zero is admitted immediately; later stages wait.
    assert_eq!(pipeline.status, Status::Pending);
    assert_eq!(
        ctx.job_by_name(pipeline.id, "build_job").await.status,
        Status::Pending
    );
    assert_eq!(
        ctx.job_by_name(pipeline.id, "test_job").await.status,
        Status::Created
    );

    let build = ctx.job_by_name(pipeline.id, "build_job").await;
    ctx.run_job_to(&project, &build, JobEvent::Succeed).await;

    // Finishing stage zero unblocks stage one.
    let test = ctx.job_by_name(pipeline.id, "test_job").await;
    assert_eq!(test.status, Status::Pending);
    assert_eq!(
        ctx.job_by_name(pipeline.id, "deploy_job").await.status,
        Status::Created
    );

    ctx.run_job_to(&project, &test, JobEvent::Succeed).await;
    let deploy = ctx.job_by_name(pipeline.id, "deploy_job").await;
    ctx.run_job_to(&project, &deploy, JobEvent::Succeed).await;

    let pipeline = ctx.processor.recompute_status(&project, pipeline.id).await.unwrap();
    assert_eq!(pipeline.status, Status::Success);
    assert!(pipeline.started_at.is_some());
    assert!(pipeline.finished_at.is_some());
    assert!(pipeline.duration.is_some());

    let finished: Vec<_> = ctx
        .notifier
        .sent()
        .into_iter()
        .filter(|n| matches!(n, Notification::PipelineFinished { .. }))
        .collect();
    assert_eq!(finished.len(), 1);
    assert!(matches!(
        finished[0],
        Notification::PipelineFinished {
            status: Status::Success,
            ..
        }
    ));
}

#[tokio::test]
async fn test_recompute_is_idempotent_and_does_not_refire() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::single_job())
        .await
        .unwrap();
    let job = ctx.job_by_name(pipeline.id, "only_job").await;
    ctx.run_job_to(&project, &job, JobEvent::Succeed).await;

    let before = ctx.notifier.drain();
    assert!(before
        .iter()
        .any(|n| matches!(n, Notification::PipelineFinished { .. })));

    // No intervening job change: same composite, no transition, no
    // notifications re-fired.
    let recomputed = ctx.processor.recompute_status(&project, pipeline.id).await.unwrap();
    assert_eq!(recomputed.status, Status::Success);
    assert!(ctx.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_yaml_error_forces_failed() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_invalid_pipeline(&project, pipeline_attrs(), "jobs config should be a hash")
        .await
        .unwrap();

    assert_eq!(pipeline.status, Status::Failed);
    assert_eq!(
        pipeline.yaml_errors.as_deref(),
        Some("jobs config should be a hash")
    );
}

#[tokio::test]
async fn test_on_success_jobs_skip_after_failure() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::three_stage())
        .await
        .unwrap();

    let build = ctx.job_by_name(pipeline.id, "build_job").await;
    ctx.run_job_to(&project, &build, JobEvent::Succeed).await;
    let test = ctx.job_by_name(pipeline.id, "test_job").await;
    ctx.run_job_to(&project, &test, JobEvent::Drop).await;

    assert_eq!(
        ctx.job_by_name(pipeline.id, "deploy_job").await.status,
        Status::Skipped
    );
    let pipeline = ctx.store_pipeline(pipeline.id).await;
    assert_eq!(pipeline.status, Status::Failed);
}

#[tokio::test]
async fn test_manual_deploy_blocks_then_plays() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let user = gantry_core::ids::UserId::new();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::manual_deploy())
        .await
        .unwrap();

    let build = ctx.job_by_name(pipeline.id, "build_job").await;
    ctx.run_job_to(&project, &build, JobEvent::Succeed).await;
    let test = ctx.job_by_name(pipeline.id, "test_job").await;
    ctx.run_job_to(&project, &test, JobEvent::Succeed).await;

    // The manual job parks in `manual` and blocks the pipeline.
    let deploy = ctx.job_by_name(pipeline.id, "deploy_job").await;
    assert_eq!(deploy.status, Status::Manual);
    assert_eq!(ctx.store_pipeline(pipeline.id).await.status, Status::Manual);

    let played = ctx
        .actions
        .play_job(&project, deploy.id, user)
        .await
        .unwrap()
        .expect("playable");
    assert_eq!(played.id, deploy.id);
    assert_eq!(played.status, Status::Pending);
    assert_eq!(played.user_id, Some(user));

    ctx.run_job_to(&project, &played, JobEvent::Succeed).await;
    assert_eq!(ctx.store_pipeline(pipeline.id).await.status, Status::Success);
}

#[tokio::test]
async fn test_retry_creates_independent_sibling() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::single_job())
        .await
        .unwrap();
    let original = ctx.job_by_name(pipeline.id, "only_job").await;
    ctx.run_job_to(&project, &original, JobEvent::Drop).await;

    let sibling = ctx
        .actions
        .retry_job(&project, original.id, None)
        .await
        .unwrap()
        .expect("retryable");

    // Fresh identity, original untouched, latest set swapped over.
    assert_ne!(sibling.id, original.id);
    assert_eq!(sibling.status, Status::Pending);
    let stored_original = ctx.store_job(original.id).await;
    assert_eq!(stored_original.status, Status::Failed);
    assert!(stored_original.retried);

    let latest = gantry_core::ports::JobRepository::latest_for_pipeline(
        ctx.store.as_ref(),
        pipeline.id,
    )
    .await
    .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, sibling.id);

    ctx.run_job_to(&project, &sibling, JobEvent::Succeed).await;
    assert_eq!(ctx.store_pipeline(pipeline.id).await.status, Status::Success);
}

#[tokio::test]
async fn test_depends_on_resolution() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let mut config = ConfigFixture::three_stage();
    config.jobs[2].options.dependencies = Some(vec!["build_job".to_string()]);
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &config)
        .await
        .unwrap();

    let deploy = ctx.job_by_name(pipeline.id, "deploy_job").await;
    let deps = ctx.processor.depends_on(deploy.id).await.unwrap();
    let names: Vec<&str> = deps.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["build_job"]);

    let test = ctx.job_by_name(pipeline.id, "test_job").await;
    let deps = ctx.processor.depends_on(test.id).await.unwrap();
    let names: Vec<&str> = deps.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["build_job"]);
}

#[tokio::test]
async fn test_status_cache_follows_head_sha() {
    let ctx = TestContext::new();
    let mut project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::single_job())
        .await
        .unwrap();

    // Pipeline sha matches the project head: the entry is kept fresh.
    let cached = StatusCache::get(ctx.store.as_ref(), project.id)
        .await
        .unwrap()
        .expect("cache entry");
    assert_eq!(cached.sha, pipeline.sha);
    assert_eq!(cached.status, Status::Pending);

    // Head moved on: the next recompute drops the stale entry.
    project.head_sha = Some("deadbeef".to_string());
    ctx.processor.recompute_status(&project, pipeline.id).await.unwrap();
    assert!(StatusCache::get(ctx.store.as_ref(), project.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_cancel_running_cancels_the_cancelable() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::three_stage())
        .await
        .unwrap();
    let build = ctx.job_by_name(pipeline.id, "build_job").await;
    ctx.processor
        .apply_job_event(&project, build.id, JobEvent::Run)
        .await
        .unwrap();

    let canceled = ctx.processor.cancel_running(&project, pipeline.id).await.unwrap();
    assert_eq!(canceled, 3);
    assert_eq!(ctx.store_pipeline(pipeline.id).await.status, Status::Canceled);

    // Nothing left to cancel: the second pass is a clean zero.
    assert_eq!(
        ctx.processor.cancel_running(&project, pipeline.id).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_pipeline_retryable_and_cancelable() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::single_job())
        .await
        .unwrap();

    assert!(ctx.processor.pipeline_cancelable(pipeline.id).await.unwrap());
    assert!(!ctx
        .processor
        .pipeline_retryable(&project, pipeline.id)
        .await
        .unwrap());

    let job = ctx.job_by_name(pipeline.id, "only_job").await;
    ctx.run_job_to(&project, &job, JobEvent::Drop).await;

    assert!(!ctx.processor.pipeline_cancelable(pipeline.id).await.unwrap());
    assert!(ctx
        .processor
        .pipeline_retryable(&project, pipeline.id)
        .await
        .unwrap());
}
