//! Core domain models for cd-engine
//!
//! This module defines the pipeline and stage definitions, run state and
//! results, validation, environments and configuration loading.

pub mod cancellation;
pub mod config;
pub mod context;
pub mod definition;
pub mod environment;
pub mod promotion;
pub mod result;
pub mod validator;

pub use cancellation::CancellationToken;
pub use config::{ConfigError, ConfigurationLoader, DefinitionProvider, EngineSettings, InMemoryDefinitions};
pub use context::*;
pub use definition::*;
pub use environment::{Environment, EnvironmentCatalog};
pub use promotion::PromotionPolicy;
pub use result::*;
pub use validator::{is_valid_pipeline_name, PipelineValidator, ValidationResult};
