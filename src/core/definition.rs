//! Pipeline and stage definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form configuration attached to stages and gates
pub type ConfigMap = HashMap<String, serde_json::Value>;

/// Stage types handled by the built-in stage implementations
pub const BUILTIN_STAGE_TYPES: [&str; 5] = ["build", "test", "deploy", "containerize", "checkout"];

/// Prefix marking a stage type as a registered stage plugin
pub const PLUGIN_PREFIX: &str = "plugin:";

/// Deployment targets a stage may declare
pub const DEPLOY_TARGETS: [&str; 3] = ["kubernetes", "ecs", "local"];

/// A pipeline definition, immutable once loaded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    pub version: Option<String>,

    /// Human-readable description
    pub description: Option<String>,

    /// Stages in declaration order
    pub stages: Vec<StageDefinition>,

    /// Environments this pipeline can be promoted through
    pub environments: Vec<String>,

    /// Variable defaults seeded into every run
    pub variables: HashMap<String, String>,

    /// Overall timeout in seconds
    pub timeout: Option<i64>,
}

impl PipelineDefinition {
    /// Create an empty definition with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a stage
    pub fn with_stage(mut self, stage: StageDefinition) -> Self {
        self.stages.push(stage);
        self
    }

    /// Set a variable default
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set the overall timeout in seconds
    pub fn with_timeout(mut self, secs: i64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Overall timeout, if a positive one is set
    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout.and_then(|t| u64::try_from(t).ok()).filter(|t| *t > 0)
    }

    /// Get a stage by name
    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Gate requirements declared across all stages, first occurrence wins
    pub fn required_gates(&self) -> Vec<GateRequirement> {
        let mut seen = std::collections::HashSet::new();
        self.stages
            .iter()
            .flat_map(|s| s.gates.iter())
            .filter(|g| seen.insert(g.gate_type.clone()))
            .cloned()
            .collect()
    }
}

/// A single stage in a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Stage name, unique within the pipeline
    pub name: String,

    /// Built-in type or `plugin:<name>`
    pub stage_type: String,

    /// Stage configuration passed to the implementation
    pub config: ConfigMap,

    /// Names of stages that must finish first
    pub depends_on: Vec<String>,

    /// Disabled stages are skipped
    pub enabled: bool,

    /// Number of retries after the first attempt
    pub retry: Option<i64>,

    /// Per-attempt timeout in seconds
    pub timeout: Option<i64>,

    /// Environment this stage is bound to
    pub environment: Option<String>,

    /// Deployment target kind
    pub target: Option<String>,

    /// Gates that must pass before this stage's output is promoted
    pub gates: Vec<GateRequirement>,
}

impl StageDefinition {
    /// Create an enabled stage with no dependencies
    pub fn new(name: impl Into<String>, stage_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage_type: stage_type.into(),
            config: ConfigMap::new(),
            depends_on: Vec::new(),
            enabled: true,
            retry: None,
            timeout: None,
            environment: None,
            target: None,
            gates: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_retry(mut self, retry: i64) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout(mut self, secs: i64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn with_gate(mut self, gate: GateRequirement) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Number of retries, negative values clamp to zero
    pub fn retry_count(&self) -> u32 {
        self.retry
            .map(|r| u32::try_from(r.max(0)).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }

    /// Per-attempt timeout, if a positive one is set
    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout.and_then(|t| u64::try_from(t).ok()).filter(|t| *t > 0)
    }

    /// Plugin name when the type is `plugin:<name>`
    pub fn plugin_name(&self) -> Option<&str> {
        self.stage_type.strip_prefix(PLUGIN_PREFIX)
    }

    /// Check if all dependencies are in the given set
    pub fn dependencies_met(&self, completed: &std::collections::HashSet<String>) -> bool {
        self.depends_on.iter().all(|dep| completed.contains(dep))
    }
}

/// A gate a stage or environment requires, with its thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRequirement {
    /// Gate type, e.g. `coverage-threshold`
    pub gate_type: String,

    /// Gate configuration (thresholds)
    pub config: ConfigMap,
}

impl GateRequirement {
    pub fn new(gate_type: impl Into<String>) -> Self {
        Self {
            gate_type: gate_type.into(),
            config: ConfigMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}
