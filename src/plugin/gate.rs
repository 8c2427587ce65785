//! Gate model: results, the read-only context gates see, and the Gate trait

use crate::core::{ConfigMap, PipelineContext, StageResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Severity attached to a gate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Verdict of one gate
///
/// A warning is a soft pass: `passed` is true and severity is `Warn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    pub message: String,
    pub severity: Severity,
    pub metrics: HashMap<String, serde_json::Value>,
}

impl GateResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(true, message, Severity::Info)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(false, message, Severity::Error)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(true, message, Severity::Warn)
    }

    fn new(passed: bool, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            passed,
            message: message.into(),
            severity,
            metrics: HashMap::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    pub fn is_warning(&self) -> bool {
        self.passed && self.severity == Severity::Warn
    }
}

/// Flattened view of a stage result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub success: bool,
    pub duration_ms: u64,
    pub output: String,
    pub metadata: Option<HashMap<String, String>>,
}

impl From<&StageResult> for StageSnapshot {
    fn from(result: &StageResult) -> Self {
        Self {
            success: result.success,
            duration_ms: result.duration_ms,
            output: result.output.clone(),
            metadata: result.metadata.clone(),
        }
    }
}

impl StageSnapshot {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.get(key)).map(String::as_str)
    }
}

/// Read-only snapshot of a run, handed to gates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateContext {
    pub pipeline_name: String,
    pub environment: Option<String>,
    pub variables: HashMap<String, String>,

    /// Stage results keyed by stage name, in name order
    pub stage_results: BTreeMap<String, StageSnapshot>,
}

impl GateContext {
    pub fn from_pipeline(context: &PipelineContext) -> Self {
        Self {
            pipeline_name: context.pipeline_name.clone(),
            environment: context.environment.clone(),
            variables: context.variables.clone(),
            stage_results: context
                .stage_results
                .iter()
                .map(|(name, result)| (name.clone(), StageSnapshot::from(result)))
                .collect(),
        }
    }

    /// Stages whose name contains any keyword, ignoring case
    pub fn stages_matching<'a>(
        &'a self,
        keywords: &'a [&'a str],
    ) -> impl Iterator<Item = (&'a String, &'a StageSnapshot)> + 'a {
        self.stage_results.iter().filter(move |(name, _)| {
            let name = name.to_lowercase();
            keywords.iter().any(|k| name.contains(k))
        })
    }
}

/// A pass/fail/warn check over a run's stage results
pub trait Gate: Send + Sync {
    /// The gate type this implementation answers to, e.g. `coverage-threshold`
    fn gate_type(&self) -> &str;

    fn evaluate(&self, config: &ConfigMap, context: &GateContext) -> GateResult;
}
