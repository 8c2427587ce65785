//! cd-engine - a continuous-delivery pipeline engine
//!
//! Stages run as a dependency graph with retries and timeouts; quality gates
//! read the accumulated stage results to decide whether a release may be
//! promoted.

pub mod cli;
pub mod core;
pub mod execution;
pub mod plugin;
pub mod stages;

// Re-export commonly used types
pub use core::{
    CancellationToken, ConfigurationLoader, DefinitionProvider, EngineSettings, PipelineContext, PipelineDefinition,
    PipelineError, PipelineResult, StageDefinition, StageResult,
};
pub use execution::{ExecutionEvent, PipelineOrchestrator, Promoter, StageExecutor};
pub use plugin::{GateExecutor, PluginRegistry};
pub use stages::{Stage, StageError, StageOutput};
