//! Test fixtures for creating sample data.

use chrono::Utc;
use gantry_core::config::{JobSpec, PipelineConfig};
use gantry_core::ids::{ProjectId, RunnerId};
use gantry_core::job::JobOptions;
use gantry_core::project::{Project, Runner};
use gantry_core::status::WhenPolicy;
use gantry_core::variables::Variable;
use gantry_scheduler::processor::NewPipeline;
use std::collections::BTreeMap;

/// Factory for projects.
pub struct ProjectFixture;

impl ProjectFixture {
    pub fn basic() -> Project {
        Project {
            id: ProjectId::new(),
            name: "app".to_string(),
            path: "group/app".to_string(),
            builds_enabled: true,
            ci_id: None,
            head_sha: Some("97de212e".to_string()),
            runners_token: "runner-registration-token".to_string(),
            http_url: "https://gantry.example.com/group/app.git".to_string(),
            coverage_regex: None,
            build_timeout_seconds: 3600,
            secret_variables: vec![Variable::masked("DB_PASSWORD", "hunter2")],
            deployment_variables: vec![],
            container_registry: None,
        }
    }

    pub fn with_coverage(regex: &str) -> Project {
        let mut project = Self::basic();
        project.coverage_regex = Some(regex.to_string());
        project
    }
}

/// Factory for parsed pipeline configurations.
pub struct ConfigFixture;

impl ConfigFixture {
    /// build -> test -> deploy, one job per stage.
    pub fn three_stage() -> PipelineConfig {
        PipelineConfig {
            stages: vec!["build".to_string(), "test".to_string(), "deploy".to_string()],
            jobs: vec![
                Self::job("build_job", "build"),
                Self::job("test_job", "test"),
                Self::job("deploy_job", "deploy"),
            ],
        }
    }

    /// Same shape, but the deploy stage waits for a manual action.
    pub fn manual_deploy() -> PipelineConfig {
        let mut config = Self::three_stage();
        config.jobs[2].when = WhenPolicy::Manual;
        config
    }

    pub fn single_job() -> PipelineConfig {
        PipelineConfig {
            stages: vec!["test".to_string()],
            jobs: vec![Self::job("only_job", "test")],
        }
    }

    pub fn job(name: &str, stage: &str) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            stage: stage.to_string(),
            stage_idx: None,
            commands: vec![format!("run {name}")],
            when: WhenPolicy::OnSuccess,
            allow_failure: false,
            environment: None,
            options: JobOptions::default(),
            tags: vec![],
            variables: BTreeMap::new(),
        }
    }
}

/// Factory for runners.
pub struct RunnerFixture;

impl RunnerFixture {
    pub fn online(project_id: ProjectId) -> Runner {
        Runner {
            id: RunnerId::new(),
            description: Some("shared runner".to_string()),
            tag_list: vec![],
            run_untagged: true,
            active: true,
            contacted_at: Some(Utc::now()),
            project_ids: vec![project_id],
        }
    }

    pub fn tagged(project_id: ProjectId, tags: &[&str]) -> Runner {
        let mut runner = Self::online(project_id);
        runner.tag_list = tags.iter().map(|t| t.to_string()).collect();
        runner.run_untagged = false;
        runner
    }
}

pub fn pipeline_attrs() -> NewPipeline {
    NewPipeline {
        ref_name: "master".to_string(),
        sha: "97de212e".to_string(),
        before_sha: None,
        tag: false,
        user_id: None,
        trigger_id: None,
    }
}
