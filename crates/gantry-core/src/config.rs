//! The shape of parsed pipeline configuration handed to the scheduler.
//!
//! The YAML grammar itself is parsed elsewhere; this module only models the
//! ordered, stage-grouped job attribute records the core consumes.

use crate::job::JobOptions;
use crate::status::WhenPolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    /// Stage names in execution order; defines each job's `stage_idx`.
    pub stages: Vec<String>,
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSpec {
    pub name: String,
    pub stage: String,
    /// Filled from `stages` order when the parser leaves it unset.
    #[serde(default)]
    pub stage_idx: Option<u32>,
    pub commands: Vec<String>,
    #[serde(default)]
    pub when: WhenPolicy,
    #[serde(default)]
    pub allow_failure: bool,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub options: JobOptions,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl PipelineConfig {
    pub fn stage_index(&self, stage: &str) -> Option<u32> {
        self.stages.iter().position(|s| s == stage).map(|i| i as u32)
    }

    /// Job specs with `stage_idx` resolved from stage order, preserving the
    /// config's own ordering. Specs naming an unknown stage are dropped;
    /// the parser reports those as configuration errors before hand-off.
    pub fn resolved_jobs(&self) -> Vec<JobSpec> {
        self.jobs
            .iter()
            .filter_map(|spec| {
                let stage_idx = spec
                    .stage_idx
                    .or_else(|| self.stage_index(&spec.stage))?;
                let mut spec = spec.clone();
                spec.stage_idx = Some(stage_idx);
                Some(spec)
            })
            .collect()
    }
}
