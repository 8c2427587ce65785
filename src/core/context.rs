//! Pipeline context - run state, variables and stage results

use super::cancellation::CancellationToken;
use super::result::StageResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Execution context for a pipeline run
///
/// Owned by exactly one run. During the concurrent phase stages write into
/// [`VariableStore`] and [`StageResults`]; the orchestrator merges those back
/// here once scheduling is over.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Name of the pipeline to run
    pub pipeline_name: String,

    /// Target environment (if any)
    pub environment: Option<String>,

    /// Validate only, never invoke stages
    pub dry_run: bool,

    /// Unique id of this run
    pub run_id: Uuid,

    /// Run variables (caller-provided values win over definition defaults)
    pub variables: HashMap<String, String>,

    /// Final result per stage name
    pub stage_results: HashMap<String, StageResult>,
}

impl PipelineContext {
    /// Create a new context for the named pipeline
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            environment: None,
            dry_run: false,
            run_id: Uuid::new_v4(),
            variables: HashMap::new(),
            stage_results: HashMap::new(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set a variable
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Get a variable
    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Record the final result of a stage
    pub fn add_stage_result(&mut self, result: StageResult) {
        self.stage_results.insert(result.stage_name.clone(), result);
    }

    /// Get the final result of a stage
    pub fn get_stage_result(&self, stage_name: &str) -> Option<&StageResult> {
        self.stage_results.get(stage_name)
    }

    /// Seed definition defaults without overwriting caller-provided values
    pub fn seed_defaults(&mut self, defaults: &HashMap<String, String>) {
        for (key, value) in defaults {
            self.variables
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Thread-safe variable store shared by the stages of one run
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl VariableStore {
    pub fn new(initial: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().insert(key.into(), value.into());
    }

    /// Copy of all variables
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().clone()
    }
}

/// Thread-safe store of final stage results for one run
#[derive(Debug, Clone, Default)]
pub struct StageResults {
    inner: Arc<RwLock<HashMap<String, StageResult>>>,
}

impl StageResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, result: StageResult) {
        self.inner.write().insert(result.stage_name.clone(), result);
    }

    pub fn get(&self, stage_name: &str) -> Option<StageResult> {
        self.inner.read().get(stage_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of all results
    pub fn snapshot(&self) -> HashMap<String, StageResult> {
        self.inner.read().clone()
    }
}

/// What a stage body sees while it runs
#[derive(Debug, Clone)]
pub struct StageContext {
    pub pipeline_name: String,
    pub environment: Option<String>,
    pub run_id: Uuid,

    /// Name of the stage being executed
    pub stage_name: String,

    pub variables: VariableStore,
    pub results: StageResults,
    pub cancellation: CancellationToken,
}

impl StageContext {
    /// Build a stage view over the shared stores of a run
    pub fn new(
        pipeline: &PipelineContext,
        stage_name: impl Into<String>,
        variables: VariableStore,
        results: StageResults,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            pipeline_name: pipeline.pipeline_name.clone(),
            environment: pipeline.environment.clone(),
            run_id: pipeline.run_id,
            stage_name: stage_name.into(),
            variables,
            results,
            cancellation,
        }
    }

    /// Standalone context, useful when invoking a stage outside a run
    pub fn detached(pipeline_name: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            environment: None,
            run_id: Uuid::new_v4(),
            stage_name: stage_name.into(),
            variables: VariableStore::default(),
            results: StageResults::default(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Variables available for `{{ VAR }}` substitution
    pub fn rendering_variables(&self) -> HashMap<String, String> {
        let mut vars = self.variables.snapshot();
        vars.insert("PIPELINE_NAME".to_string(), self.pipeline_name.clone());
        vars.insert("STAGE_NAME".to_string(), self.stage_name.clone());
        vars.insert("RUN_ID".to_string(), self.run_id.to_string());
        if let Some(ref env) = self.environment {
            vars.entry("ENVIRONMENT".to_string()).or_insert_with(|| env.clone());
        }
        vars
    }
}
