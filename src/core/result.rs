//! Stage and pipeline result models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result of one stage attempt; the last attempt's result is the stage's final result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name
    pub stage_name: String,

    /// Whether the stage succeeded
    pub success: bool,

    /// Human-readable output
    pub output: String,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,

    /// Attempt that produced this result (1-based)
    pub attempt: u32,

    /// Structured signals for gates (coverage, vulnerability counts)
    pub metadata: Option<HashMap<String, String>>,

    /// When the result was recorded
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    /// Create a successful result
    pub fn success(stage_name: impl Into<String>, output: impl Into<String>, duration_ms: u64) -> Self {
        Self::new(stage_name, true, output, duration_ms)
    }

    /// Create a failed result
    pub fn failure(stage_name: impl Into<String>, output: impl Into<String>, duration_ms: u64) -> Self {
        Self::new(stage_name, false, output, duration_ms)
    }

    fn new(stage_name: impl Into<String>, success: bool, output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage_name: stage_name.into(),
            success,
            output: output.into(),
            duration_ms,
            attempt: 1,
            metadata: None,
            finished_at: Utc::now(),
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Attach metadata; an empty map leaves metadata unset
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = if metadata.is_empty() { None } else { Some(metadata) };
        self
    }

    /// Look up a metadata value
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.get(key)).map(String::as_str)
    }

    /// Whether this result stands for a disabled stage
    pub fn is_skipped(&self) -> bool {
        self.metadata_value("skipped") == Some("true")
    }
}

/// Why a pipeline run did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Pipeline not found: {0}")]
    NotFound(String),

    #[error("Failed to load pipeline definition: {0}")]
    Config(String),

    #[error("Pipeline validation failed: {}", .0.join(", "))]
    Invalid(Vec<String>),

    #[error("Stage failed: {stage}")]
    StageFailed { stage: String },

    #[error("Stage failed: {stage} - {cause}")]
    StageTask { stage: String, cause: String },

    #[error("{0}")]
    Scheduling(String),

    #[error("Pipeline interrupted: {0}")]
    Interrupted(String),

    #[error("Pipeline timed out after {0}s")]
    TimedOut(u64),
}

impl PipelineError {
    /// Whether the definition itself is at fault
    pub fn is_invalid_definition(&self) -> bool {
        matches!(self, PipelineError::Invalid(_) | PipelineError::Config(_))
    }
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub success: bool,
    pub error: Option<PipelineError>,
}

impl PipelineResult {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: PipelineError) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }

    /// Error message, if the run failed
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}
