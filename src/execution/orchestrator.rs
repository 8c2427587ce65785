//! Pipeline orchestrator - runs a pipeline's stages as a dependency graph

use super::events::{EventBus, ExecutionEvent};
use super::executor::{ExecutionError, StageExecutor};
use super::scheduler::StageTracker;
use crate::core::{
    CancellationToken, DefinitionProvider, EngineSettings, PipelineContext, PipelineDefinition, PipelineError,
    PipelineResult, PipelineValidator, StageContext, StageDefinition, StageResult, StageResults, ValidationResult,
    VariableStore,
};
use crate::plugin::PluginRegistry;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// Error returned by a pipeline hook
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Callbacks around the stage phase of a run
///
/// Hook failures are logged and never fail the pipeline.
#[async_trait]
pub trait PipelineHook: Send + Sync {
    async fn before_stages(&self, _definition: &PipelineDefinition, _context: &PipelineContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_stages(&self, _definition: &PipelineDefinition, _context: &PipelineContext) -> Result<(), HookError> {
        Ok(())
    }
}

type StageTask = BoxFuture<'static, (String, Result<Result<StageResult, ExecutionError>, JoinError>)>;

/// Stores shared by the stage tasks of one run
struct RunState<'a> {
    context: &'a PipelineContext,
    variables: VariableStore,
    results: StageResults,
    cancellation: CancellationToken,
}

/// Runs pipelines resolved through a [`DefinitionProvider`]
pub struct PipelineOrchestrator {
    provider: Arc<dyn DefinitionProvider>,
    registry: Arc<PluginRegistry>,
    executor: Arc<StageExecutor>,
    settings: EngineSettings,
    hooks: Vec<Arc<dyn PipelineHook>>,
    events: EventBus,
}

impl PipelineOrchestrator {
    pub fn new(
        provider: Arc<dyn DefinitionProvider>,
        registry: Arc<PluginRegistry>,
        executor: Arc<StageExecutor>,
        settings: EngineSettings,
    ) -> Self {
        let events = executor.events();
        Self {
            provider,
            registry,
            executor,
            settings,
            hooks: Vec::new(),
            events,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PipelineHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Event bus shared with the stage executor
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Resolve a pipeline definition by name
    pub fn load_definition(&self, name: &str) -> Result<PipelineDefinition, PipelineError> {
        match self.provider.load_pipeline_definition(name) {
            Ok(Some(definition)) => Ok(definition),
            Ok(None) => Err(PipelineError::NotFound(name.to_string())),
            Err(e) => Err(PipelineError::Config(e.to_string())),
        }
    }

    /// Validate a definition against the registered stage plugins
    pub fn validate(&self, definition: &PipelineDefinition) -> ValidationResult {
        PipelineValidator::with_plugins(&self.registry).validate(definition)
    }

    /// Execute the pipeline named by the context
    pub async fn execute(&self, context: &mut PipelineContext) -> PipelineResult {
        self.execute_with_cancellation(context, &CancellationToken::new()).await
    }

    /// Execute the pipeline, stopping early when `cancellation` fires
    pub async fn execute_with_cancellation(
        &self,
        context: &mut PipelineContext,
        cancellation: &CancellationToken,
    ) -> PipelineResult {
        let run_id = context.run_id;
        info!("Starting pipeline execution: {} ({})", context.pipeline_name, run_id);
        self.events.emit(ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name: context.pipeline_name.clone(),
        });

        let result = match self.run(context, cancellation).await {
            Ok(()) => {
                info!("Pipeline {} completed successfully", context.pipeline_name);
                PipelineResult::success()
            }
            Err(e) => {
                error!("Pipeline {} failed: {}", context.pipeline_name, e);
                PipelineResult::failed(e)
            }
        };

        self.events.emit(ExecutionEvent::PipelineCompleted {
            run_id,
            success: result.success,
        });
        result
    }

    async fn run(&self, context: &mut PipelineContext, cancellation: &CancellationToken) -> Result<(), PipelineError> {
        let definition = self.load_definition(&context.pipeline_name)?;

        let validation = self.validate(&definition);
        if !validation.valid {
            return Err(PipelineError::Invalid(validation.errors));
        }

        if context.dry_run {
            info!(
                "Dry run: pipeline {} is valid ({} stages), nothing executed",
                definition.name,
                definition.stages.len()
            );
            return Ok(());
        }

        context.seed_defaults(&definition.variables);
        for hook in &self.hooks {
            if let Err(e) = hook.before_stages(&definition, context).await {
                warn!("Pre-stage hook failed for {}: {}", definition.name, e);
            }
        }

        let state = RunState {
            context: &*context,
            variables: VariableStore::new(context.variables.clone()),
            results: StageResults::new(),
            cancellation: CancellationToken::new(),
        };
        let variables = state.variables.clone();
        let results = state.results.clone();
        let run_token = state.cancellation.clone();

        let scheduled = self.schedule(&definition, state, cancellation);
        let outcome = match definition.timeout_secs() {
            Some(secs) => match timeout(Duration::from_secs(secs), scheduled).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("Pipeline {} exceeded its {}s timeout", definition.name, secs);
                    run_token.cancel(format!("Pipeline timed out after {}s", secs));
                    Err(PipelineError::TimedOut(secs))
                }
            },
            None => scheduled.await,
        };

        context.variables = variables.snapshot();
        for result in results.snapshot().into_values() {
            context.add_stage_result(result);
        }
        outcome?;

        if let Some(failed) = first_failure(&definition, &context.stage_results) {
            return Err(PipelineError::StageFailed {
                stage: failed.to_string(),
            });
        }

        for hook in &self.hooks {
            if let Err(e) = hook.after_stages(&definition, context).await {
                warn!("Post-stage hook failed for {}: {}", definition.name, e);
            }
        }
        Ok(())
    }

    /// Launch stages as their dependencies complete until none are left
    async fn schedule(
        &self,
        definition: &PipelineDefinition,
        state: RunState<'_>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let workers = Arc::new(Semaphore::new(self.settings.worker_permits()));
        let mut tracker = StageTracker::new(definition);
        let mut in_flight: FuturesUnordered<StageTask> = FuturesUnordered::new();
        let mut halted = false;

        debug!(
            "Scheduling {} stages with {} workers",
            definition.stages.len(),
            self.settings.worker_permits()
        );

        loop {
            if cancellation.is_cancelled() {
                return Err(self.interrupt(&state, cancellation));
            }

            let mut skipped_any = false;
            if !halted {
                for stage in tracker.ready() {
                    if !stage.enabled {
                        self.skip(stage, &state.results);
                        tracker.complete(&stage.name);
                        skipped_any = true;
                        continue;
                    }
                    tracker.start(&stage.name);
                    in_flight.push(self.spawn_stage(stage, &state, workers.clone()));
                }
            }
            // Skipped stages may have unblocked their dependents
            if skipped_any {
                continue;
            }

            if in_flight.is_empty() {
                if tracker.is_complete() || halted {
                    return Ok(());
                }
                return Err(PipelineError::Scheduling(format!(
                    "Circular dependency detected or no runnable stages: {}",
                    tracker.remaining().join(", ")
                )));
            }

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return Err(self.interrupt(&state, cancellation));
                }
                Some((stage, joined)) = in_flight.next() => {
                    match joined {
                        Ok(Ok(result)) => {
                            tracker.complete(&stage);
                            if !result.success && self.settings.fail_fast && !halted {
                                warn!("Stage {} failed, not launching further stages", stage);
                                halted = true;
                            }
                        }
                        Ok(Err(ExecutionError::Interrupted { reason, .. })) => {
                            state.cancellation.cancel(reason.clone());
                            return Err(PipelineError::Interrupted(reason));
                        }
                        Err(join_error) => {
                            error!("Stage task {} did not finish: {}", stage, join_error);
                            state.cancellation.cancel(format!("Stage {} aborted", stage));
                            return Err(PipelineError::StageTask {
                                stage,
                                cause: join_error.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    fn interrupt(&self, state: &RunState<'_>, cancellation: &CancellationToken) -> PipelineError {
        let reason = cancellation
            .reason()
            .unwrap_or_else(|| "cancelled".to_string());
        warn!("Pipeline {} interrupted: {}", state.context.pipeline_name, reason);
        state.cancellation.cancel(reason.clone());
        PipelineError::Interrupted(reason)
    }

    fn skip(&self, stage: &StageDefinition, results: &StageResults) {
        info!("Stage {} is disabled, skipping", stage.name);
        let metadata = HashMap::from([("skipped".to_string(), "true".to_string())]);
        results.insert(StageResult::success(&stage.name, "Stage disabled, skipped", 0).with_metadata(metadata));
        self.events.emit(ExecutionEvent::StageSkipped {
            stage: stage.name.clone(),
        });
    }

    fn spawn_stage(&self, stage: &StageDefinition, state: &RunState<'_>, workers: Arc<Semaphore>) -> StageTask {
        let stage = stage.clone();
        let name = stage.name.clone();
        let ctx = StageContext::new(
            state.context,
            &stage.name,
            state.variables.clone(),
            state.results.clone(),
            state.cancellation.clone(),
        );
        let results = state.results.clone();
        let executor = self.executor.clone();
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = ctx.cancellation.cancelled() => {
                    return Err(ExecutionError::Interrupted {
                        stage: stage.name.clone(),
                        reason: ctx.cancellation.reason().unwrap_or_else(|| "cancelled".to_string()),
                    });
                }
                permit = workers.acquire_owned() => permit.map_err(|_| ExecutionError::Interrupted {
                    stage: stage.name.clone(),
                    reason: "worker pool closed".to_string(),
                })?,
            };

            let result = executor.execute_stage(&stage, &ctx).await?;
            if result.success {
                info!("Stage {} completed in {}ms", stage.name, result.duration_ms);
                events.emit(ExecutionEvent::StageCompleted {
                    stage: stage.name.clone(),
                    duration_ms: result.duration_ms,
                });
            } else {
                error!("Stage {} failed: {}", stage.name, result.output);
                events.emit(ExecutionEvent::StageFailed {
                    stage: stage.name.clone(),
                    error: result.output.clone(),
                });
            }
            results.insert(result.clone());
            Ok::<StageResult, ExecutionError>(result)
        });

        async move { (name, handle.await) }.boxed()
    }
}

/// First failed stage in definition order
fn first_failure<'a>(definition: &'a PipelineDefinition, results: &HashMap<String, StageResult>) -> Option<&'a str> {
    definition
        .stages
        .iter()
        .find(|s| results.get(&s.name).is_some_and(|r| !r.success))
        .map(|s| s.name.as_str())
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("settings", &self.settings)
            .field("hooks", &self.hooks.len())
            .field("executor", &self.executor)
            .finish()
    }
}
