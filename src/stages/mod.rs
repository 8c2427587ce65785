//! Stage implementations
//!
//! A [`Stage`] is the unit of work behind a stage type. Built-in types
//! (build, test, containerize, deploy, checkout) shell out to the usual
//! tooling through [`CommandRunner`]; plugins can register their own.

pub mod builtin;
pub mod command;

use crate::core::{ConfigMap, StageContext};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub use builtin::{builtin_stages, BuildStage, CheckoutStage, ContainerizeStage, DeployStage, TestStage};
pub use command::{render_template, CommandOutput, CommandRunner, CommandSpec, CommandStage};

/// Error types for stage execution
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited with code {code}: {stderr}")]
    Command {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Invalid stage configuration: {0}")]
    InvalidConfig(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Failed(String),
}

/// Successful outcome of a stage body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    /// Human-readable output
    pub output: String,

    /// Structured signals read by gates (e.g. `coverage`, `critical`)
    pub metadata: HashMap<String, String>,
}

impl StageOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl From<String> for StageOutput {
    fn from(output: String) -> Self {
        Self::new(output)
    }
}

impl From<&str> for StageOutput {
    fn from(output: &str) -> Self {
        Self::new(output)
    }
}

/// Trait for stage execution - allows for different implementations
#[async_trait]
pub trait Stage: Send + Sync {
    /// Run the stage body once
    async fn execute(&self, config: &ConfigMap, ctx: &StageContext) -> Result<StageOutput, StageError>;
}

/// Read an optional string value from a stage config
pub(crate) fn config_str<'a>(config: &'a ConfigMap, key: &str) -> Option<&'a str> {
    config.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}
