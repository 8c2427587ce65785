//! Static structural validation of pipeline definitions

use super::definition::{PipelineDefinition, BUILTIN_STAGE_TYPES, DEPLOY_TARGETS, PLUGIN_PREFIX};
use crate::plugin::PluginRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

static PIPELINE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("pipeline name pattern is valid"));

/// Whether `name` is usable as a pipeline name (`[A-Za-z0-9_-]+`)
pub fn is_valid_pipeline_name(name: &str) -> bool {
    PIPELINE_NAME.is_match(name)
}

/// Outcome of validating a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Checks a definition for structural problems, collecting every violation
#[derive(Debug, Clone, Default)]
pub struct PipelineValidator {
    plugin_stage_types: HashSet<String>,
}

impl PipelineValidator {
    /// Validator that accepts built-in stage types only
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator that also accepts `plugin:<name>` for every registered stage plugin
    pub fn with_plugins(registry: &PluginRegistry) -> Self {
        Self {
            plugin_stage_types: registry
                .stage_plugin_names()
                .into_iter()
                .map(|name| format!("{}{}", PLUGIN_PREFIX, name))
                .collect(),
        }
    }

    fn is_valid_stage_type(&self, stage_type: &str) -> bool {
        BUILTIN_STAGE_TYPES.contains(&stage_type) || self.plugin_stage_types.contains(stage_type)
    }

    pub fn validate(&self, definition: &PipelineDefinition) -> ValidationResult {
        let mut errors = Vec::new();

        if definition.name.trim().is_empty() {
            errors.push("Pipeline name is required".to_string());
        } else if !is_valid_pipeline_name(&definition.name) {
            errors.push("Pipeline name must be alphanumeric with hyphens or underscores".to_string());
        }

        if definition.stages.is_empty() {
            errors.push("Pipeline must have at least one stage".to_string());
        }

        let known: HashSet<&str> = definition.stages.iter().map(|s| s.name.as_str()).collect();
        let mut seen = HashSet::new();

        for stage in &definition.stages {
            if stage.name.trim().is_empty() {
                errors.push("Stage name is required".to_string());
                continue;
            }

            if !seen.insert(stage.name.as_str()) {
                errors.push(format!("Duplicate stage name: {}", stage.name));
            }

            if stage.stage_type.trim().is_empty() {
                errors.push(format!("Stage type is required for stage: {}", stage.name));
            } else if !self.is_valid_stage_type(&stage.stage_type) {
                errors.push(format!(
                    "Invalid stage type: {} for stage: {}",
                    stage.stage_type, stage.name
                ));
            }

            if matches!(stage.timeout, Some(t) if t <= 0) {
                errors.push(format!("Stage timeout must be positive for stage: {}", stage.name));
            }

            if matches!(stage.retry, Some(r) if r < 0) {
                errors.push(format!(
                    "Stage retry count cannot be negative for stage: {}",
                    stage.name
                ));
            }

            if let Some(ref target) = stage.target {
                if !DEPLOY_TARGETS.contains(&target.as_str()) {
                    errors.push(format!(
                        "Invalid deployment target: {} for stage: {}",
                        target, stage.name
                    ));
                }
            }

            for dep in &stage.depends_on {
                if dep == &stage.name {
                    errors.push(format!("Stage '{}' cannot depend on itself", stage.name));
                } else if !known.contains(dep.as_str()) {
                    errors.push(format!(
                        "Stage '{}' depends on unknown stage: {}",
                        stage.name, dep
                    ));
                }
            }
        }

        if matches!(definition.timeout, Some(t) if t <= 0) {
            errors.push("Timeout must be positive if specified".to_string());
        }

        ValidationResult::from_errors(errors)
    }
}
