//! Artifact lifecycle: expiry, erasure, size accounting.

use chrono::Duration;
use gantry_core::events::Notification;
use gantry_core::job::ArtifactsFile;
use gantry_core::ports::Clock;
use gantry_core::status::Status;
use gantry_scheduler::machine::JobEvent;
use gantry_tests::fixtures::{pipeline_attrs, ConfigFixture, ProjectFixture};
use gantry_tests::TestContext;

fn archive(size: u64) -> ArtifactsFile {
    ArtifactsFile {
        filename: "artifacts.zip".to_string(),
        size,
    }
}

#[tokio::test]
async fn test_expiry_boundary() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::single_job())
        .await
        .unwrap();
    let job = ctx.job_by_name(pipeline.id, "only_job").await;
    let now = ctx.clock.now();

    let job = ctx
        .lifecycle
        .update_artifacts(
            job.id,
            Some(archive(1024)),
            None,
            Some(now - Duration::seconds(1)),
        )
        .await
        .unwrap();
    assert!(job.artifacts_expired(now));
    assert!(!job.has_artifacts(now));

    let job = ctx
        .lifecycle
        .set_expiry(job.id, now + Duration::days(1))
        .await
        .unwrap();
    assert!(!job.artifacts_expired(now));
    assert!(job.has_artifacts(now));

    // Keeping clears the expiry outright.
    let job = ctx.lifecycle.keep_artifacts(job.id).await.unwrap();
    assert_eq!(job.artifacts_expire_at, None);
}

#[tokio::test]
async fn test_statistics_fire_once_per_size_change() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::single_job())
        .await
        .unwrap();
    let job = ctx.job_by_name(pipeline.id, "only_job").await;
    ctx.notifier.drain();

    let stats = |ctx: &TestContext| {
        ctx.notifier
            .count_matching(|n| matches!(n, Notification::ProjectStatisticsRefresh { .. }))
    };

    ctx.lifecycle
        .update_artifacts(job.id, Some(archive(1024)), None, None)
        .await
        .unwrap();
    assert_eq!(stats(&ctx), 1);

    // Same byte size again: no recount.
    ctx.lifecycle
        .update_artifacts(job.id, Some(archive(1024)), None, None)
        .await
        .unwrap();
    assert_eq!(stats(&ctx), 1);

    ctx.lifecycle
        .update_artifacts(job.id, Some(archive(2048)), None, None)
        .await
        .unwrap();
    assert_eq!(stats(&ctx), 2);

    // Destruction of a job still carrying artifacts recounts once more.
    let job = ctx.store_job(job.id).await;
    ctx.lifecycle.on_destroy(&job).await.unwrap();
    assert_eq!(stats(&ctx), 3);
}

#[tokio::test]
async fn test_erase_is_guarded_and_idempotent() {
    let ctx = TestContext::new();
    let project = ProjectFixture::basic();
    let user = gantry_core::ids::UserId::new();
    let pipeline = ctx
        .processor
        .create_pipeline(&project, pipeline_attrs(), &ConfigFixture::single_job())
        .await
        .unwrap();
    let job = ctx.job_by_name(pipeline.id, "only_job").await;

    // Still active: not erasable.
    assert!(ctx
        .lifecycle
        .erase(&project, job.id, Some(user))
        .await
        .unwrap()
        .is_none());

    ctx.traces
        .append(&job, &project, b"some output\n", 0)
        .unwrap();
    ctx.run_job_to(&project, &job, JobEvent::Succeed).await;
    ctx.lifecycle
        .update_artifacts(job.id, Some(archive(1024)), None, None)
        .await
        .unwrap();
    let stored = ctx.store_job(job.id).await;
    ctx.artifacts
        .save_archive(&stored, "artifacts.zip", b"zipbytes")
        .unwrap();
    ctx.notifier.drain();

    let erased = ctx
        .lifecycle
        .erase(&project, job.id, Some(user))
        .await
        .unwrap()
        .expect("erasable");
    assert!(erased.erased());
    assert_eq!(erased.erased_by, Some(user));
    assert_eq!(erased.artifacts_file, None);
    assert_eq!(erased.artifacts_expire_at, None);
    assert_eq!(erased.status, Status::Success);

    // The trace is rewritten to empty, not removed.
    let trace = ctx.traces.read(&erased, &project, None).unwrap().unwrap();
    assert_eq!(trace, "");

    let stats = ctx
        .notifier
        .count_matching(|n| matches!(n, Notification::ProjectStatisticsRefresh { .. }));
    assert_eq!(stats, 1);

    // Repeating is a safe no-op: same record back, no extra notifications.
    let again = ctx
        .lifecycle
        .erase(&project, job.id, Some(user))
        .await
        .unwrap()
        .expect("no-op erase");
    assert_eq!(again.erased_at, erased.erased_at);
    assert_eq!(
        ctx.notifier
            .count_matching(|n| matches!(n, Notification::ProjectStatisticsRefresh { .. })),
        1
    );
}
