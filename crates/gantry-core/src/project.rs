//! Collaborator records the core consumes at its interface boundary.
//!
//! These are deliberately thin: only the attributes the scheduling core and
//! variable assembly actually read are modeled. Ownership, permissions, and
//! the rest of the project surface live outside this crate.

use crate::ids::{ProjectId, RunnerId, TriggerId, UserId};
use crate::variables::Variable;
use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A runner is considered online if it polled within this window.
pub const RUNNER_ONLINE_CONTACT_WINDOW_SECONDS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Namespaced path, e.g. `group/app`.
    pub path: String,
    pub builds_enabled: bool,
    /// Deprecated numeric CI identifier; only read for the legacy trace
    /// directory fallback.
    pub ci_id: Option<u32>,
    /// Current head commit of the default ref, if known.
    pub head_sha: Option<String>,
    /// Token runners use to register; masked wherever it appears in traces.
    pub runners_token: String,
    pub http_url: String,
    /// User-supplied regex scraped over trace text for a coverage figure.
    pub coverage_regex: Option<String>,
    /// Advisory per-job execution timeout handed to runner agents.
    pub build_timeout_seconds: u32,
    /// Stored secret variables, always non-public.
    pub secret_variables: Vec<Variable>,
    pub deployment_variables: Vec<Variable>,
    pub container_registry: Option<ContainerRegistry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContainerRegistry {
    pub host: String,
    /// Image path for this project, e.g. `registry.example.com/group/app`.
    pub image: String,
}

impl Project {
    pub fn predefined_variables(&self) -> Vec<Variable> {
        vec![
            Variable::public("CI_PROJECT_ID", self.id.as_uuid().to_string()),
            Variable::public("CI_PROJECT_NAME", self.name.clone()),
            Variable::public("CI_PROJECT_PATH", self.path.clone()),
            Variable::public("CI_PROJECT_URL", self.http_url.clone()),
        ]
    }

    pub fn container_registry_variables(&self) -> Vec<Variable> {
        match &self.container_registry {
            Some(registry) => vec![
                Variable::public("CI_REGISTRY", registry.host.clone()),
                Variable::public("CI_REGISTRY_IMAGE", registry.image.clone()),
            ],
            None => vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Runner {
    pub id: RunnerId,
    pub description: Option<String>,
    pub tag_list: Vec<String>,
    /// Whether this runner accepts jobs that declare no tags.
    pub run_untagged: bool,
    pub active: bool,
    pub contacted_at: Option<DateTime<Utc>>,
    pub project_ids: Vec<ProjectId>,
}

impl Runner {
    pub fn online(&self, now: DateTime<Utc>) -> bool {
        self.contacted_at.is_some_and(|at| {
            now - at < Duration::seconds(RUNNER_ONLINE_CONTACT_WINDOW_SECONDS)
        })
    }

    /// Tag admission: the job's tags must be a subset of the runner's, or
    /// the job is untagged and the runner accepts untagged work.
    pub fn accepts_tags(&self, job_tags: &[String]) -> bool {
        if job_tags.is_empty() {
            self.run_untagged
        } else {
            job_tags.iter().all(|t| self.tag_list.contains(t))
        }
    }

    pub fn serves_project(&self, project_id: ProjectId) -> bool {
        self.project_ids.contains(&project_id)
    }

    pub fn predefined_variables(&self) -> Vec<Variable> {
        let mut variables = vec![Variable::public(
            "CI_RUNNER_ID",
            self.id.as_uuid().to_string(),
        )];
        if let Some(description) = &self.description {
            variables.push(Variable::public("CI_RUNNER_DESCRIPTION", description.clone()));
        }
        if !self.tag_list.is_empty() {
            variables.push(Variable::public("CI_RUNNER_TAGS", self.tag_list.join(", ")));
        }
        variables
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

impl User {
    pub fn predefined_variables(&self) -> Vec<Variable> {
        vec![
            Variable::public("GANTRY_USER_ID", self.id.as_uuid().to_string()),
            Variable::public("GANTRY_USER_EMAIL", self.email.clone()),
        ]
    }
}

/// An external trigger request that started a pipeline, with its variables.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerRequest {
    pub id: TriggerId,
    pub variables: Vec<Variable>,
}

/// A deployment environment record, resolvable only after the job's
/// environment name has been expanded.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Environment {
    pub name: String,
    pub slug: String,
}

impl Environment {
    pub fn predefined_variables(&self) -> Vec<Variable> {
        vec![
            Variable::public("CI_ENVIRONMENT_NAME", self.name.clone()),
            Variable::public("CI_ENVIRONMENT_SLUG", self.slug.clone()),
        ]
    }
}
