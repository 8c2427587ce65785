//! Stage executor - dispatches a stage to its implementation and retries it

use super::events::{EventBus, ExecutionEvent};
use crate::core::{ConfigMap, EngineSettings, StageContext, StageDefinition, StageResult, PLUGIN_PREFIX};
use crate::plugin::PluginRegistry;
use crate::stages::{builtin_stages, Stage, StageError, StageOutput};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

/// Delay schedule between attempts of a failing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempt `i` (1-based) waits `i * base_delay`
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(Duration::from_millis(settings.retry_base_delay_ms))
    }

    /// Delay after the given failed attempt
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base_delay.saturating_mul(failed_attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Why a stage could not produce a final result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Stage {stage} interrupted: {reason}")]
    Interrupted { stage: String, reason: String },
}

/// Runs stages with timing, timeouts and retries
///
/// Built-in stage types are looked up by exact name; `plugin:<name>` types
/// resolve through the plugin registry. Every failure short of cancellation
/// is reported as a failed [`StageResult`].
pub struct StageExecutor {
    stages: HashMap<String, Arc<dyn Stage>>,
    registry: Arc<PluginRegistry>,
    retry: RetryPolicy,
    events: EventBus,
}

impl StageExecutor {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            stages: builtin_stages(),
            registry,
            retry: RetryPolicy::default(),
            events: EventBus::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the implementation behind a built-in stage type
    pub fn with_stage(mut self, stage_type: impl Into<String>, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(stage_type.into(), stage);
        self
    }

    /// Event bus used for stage start and retry events
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn resolve(&self, stage_type: &str) -> Option<Arc<dyn Stage>> {
        match stage_type.strip_prefix(PLUGIN_PREFIX) {
            Some(plugin) => self
                .registry
                .get_stage_plugin(plugin)
                .map(|plugin| plugin.implementation),
            None => self.stages.get(stage_type).cloned(),
        }
    }

    fn unknown_type(stage_name: &str, stage_type: &str) -> StageResult {
        warn!("Unknown stage type {} for stage {}", stage_type, stage_name);
        StageResult::failure(stage_name, format!("Unknown stage type: {}", stage_type), 0)
    }

    /// Run the stage body once, bounded by the timeout and the run's cancellation
    async fn invoke(
        &self,
        stage: &dyn Stage,
        config: &ConfigMap,
        ctx: &StageContext,
        timeout_secs: Option<u64>,
    ) -> Result<StageOutput, StageError> {
        let body = async {
            match timeout_secs {
                Some(secs) => timeout(Duration::from_secs(secs), stage.execute(config, ctx))
                    .await
                    .unwrap_or(Err(StageError::Timeout(secs))),
                None => stage.execute(config, ctx).await,
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(StageError::Cancelled(cancel_reason(ctx))),
            outcome = body => outcome,
        }
    }

    fn to_result(stage_name: &str, outcome: Result<StageOutput, StageError>, started: Instant) -> StageResult {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(output) => StageResult::success(stage_name, output.output, duration_ms).with_metadata(output.metadata),
            Err(e) => StageResult::failure(stage_name, e.to_string(), duration_ms),
        }
    }

    /// Execute a single attempt of a stage type
    ///
    /// Never fails: unknown types, stage errors and cancellation all come back
    /// as failed results.
    pub async fn execute(&self, stage_type: &str, config: &ConfigMap, ctx: &StageContext) -> StageResult {
        let Some(stage) = self.resolve(stage_type) else {
            return Self::unknown_type(&ctx.stage_name, stage_type);
        };

        let started = Instant::now();
        let outcome = self.invoke(stage.as_ref(), config, ctx, None).await;
        Self::to_result(&ctx.stage_name, outcome, started)
    }

    /// Execute a stage with its retry and timeout settings
    ///
    /// Returns the result of the last attempt. Only cancellation of the run
    /// escapes as an error.
    pub async fn execute_stage(&self, stage: &StageDefinition, ctx: &StageContext) -> Result<StageResult, ExecutionError> {
        let Some(implementation) = self.resolve(&stage.stage_type) else {
            return Ok(Self::unknown_type(&stage.name, &stage.stage_type));
        };

        let max_retries = stage.retry_count();
        let timeout_secs = stage.timeout_secs();
        let interrupted = |reason: String| ExecutionError::Interrupted {
            stage: stage.name.clone(),
            reason,
        };

        let mut attempt: u32 = 1;
        loop {
            if ctx.cancellation.is_cancelled() {
                return Err(interrupted(cancel_reason(ctx)));
            }

            info!("Executing stage: {} (attempt {})", stage.name, attempt);
            self.events.emit(ExecutionEvent::StageStarted {
                stage: stage.name.clone(),
                attempt,
            });

            let started = Instant::now();
            let outcome = self
                .invoke(implementation.as_ref(), &stage.config, ctx, timeout_secs)
                .await;
            if let Err(StageError::Cancelled(reason)) = outcome {
                warn!("Stage {} cancelled during attempt {}", stage.name, attempt);
                return Err(interrupted(reason));
            }

            let result = Self::to_result(&stage.name, outcome, started).with_attempt(attempt);
            if result.success {
                debug!("Stage {} succeeded in {}ms", stage.name, result.duration_ms);
                return Ok(result);
            }
            if attempt > max_retries {
                error!("Stage {} failed after {} attempt(s): {}", stage.name, attempt, result.output);
                return Ok(result);
            }

            let delay = self.retry.delay_after(attempt);
            warn!(
                "Stage {} failed (attempt {}/{}), retrying in {:?}: {}",
                stage.name,
                attempt,
                max_retries + 1,
                delay,
                result.output
            );
            attempt += 1;
            self.events.emit(ExecutionEvent::StageRetrying {
                stage: stage.name.clone(),
                attempt,
                max_retries,
            });

            tokio::select! {
                biased;
                _ = ctx.cancellation.cancelled() => return Err(interrupted(cancel_reason(ctx))),
                _ = sleep(delay) => {}
            }
        }
    }
}

fn cancel_reason(ctx: &StageContext) -> String {
    ctx.cancellation
        .reason()
        .unwrap_or_else(|| "cancelled".to_string())
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stage_types: Vec<&String> = self.stages.keys().collect();
        stage_types.sort();
        f.debug_struct("StageExecutor")
            .field("stage_types", &stage_types)
            .field("retry", &self.retry)
            .finish()
    }
}
