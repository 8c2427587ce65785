//! Test utilities for cd-engine scenarios

use async_trait::async_trait;
use cd_engine::core::{
    ConfigMap, DefinitionProvider, EngineSettings, InMemoryDefinitions, PipelineContext, PipelineDefinition, PipelineError,
    PipelineResult, StageContext, BUILTIN_STAGE_TYPES,
};
use cd_engine::execution::{PipelineOrchestrator, RetryPolicy, StageExecutor};
use cd_engine::plugin::PluginRegistry;
use cd_engine::stages::{Stage, StageError, StageOutput};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a scripted stage behaves
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Number of leading calls that fail
    pub failures: usize,
    /// Fail on every call
    pub always_fail: bool,
    /// Time spent in the stage body
    pub delay: Option<Duration>,
    /// Metadata attached on success
    pub metadata: Vec<(String, String)>,
}

impl Script {
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    pub fn flaky(failures: usize) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.push((key.to_string(), value.to_string()));
        self
    }
}

/// Start and end ticks of one stage body invocation
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub started: u64,
    pub finished: u64,
}

/// Stage double that follows a per-stage script and records every call
///
/// Unscripted stages succeed immediately.
#[derive(Default)]
pub struct RecordingStage {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    spans: Mutex<Vec<(String, Span)>>,
    clock: AtomicU64,
}

impl RecordingStage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, stage: &str, script: Script) {
        self.scripts.lock().insert(stage.to_string(), script);
    }

    pub fn calls(&self, stage: &str) -> usize {
        self.calls.lock().get(stage).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Stage names in the order their bodies started
    pub fn start_order(&self) -> Vec<String> {
        let mut spans = self.spans.lock().clone();
        spans.sort_by_key(|(_, span)| span.started);
        spans.into_iter().map(|(name, _)| name).collect()
    }

    /// Spans of the last invocation of `stage`
    pub fn span(&self, stage: &str) -> Option<Span> {
        self.spans
            .lock()
            .iter()
            .rev()
            .find(|(name, _)| name == stage)
            .map(|(_, span)| *span)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for RecordingStage {
    async fn execute(&self, _config: &ConfigMap, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let started = self.tick();
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(ctx.stage_name.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let script = self.scripts.lock().get(&ctx.stage_name).cloned().unwrap_or_default();

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }

        let finished = self.tick();
        self.spans
            .lock()
            .push((ctx.stage_name.clone(), Span { started, finished }));

        if script.always_fail || call <= script.failures {
            return Err(StageError::Failed(format!("{} failed on call {}", ctx.stage_name, call)));
        }

        let mut output = StageOutput::new(format!("{} done", ctx.stage_name));
        for (key, value) in script.metadata {
            output = output.with_metadata(key, value);
        }
        Ok(output)
    }
}

/// An orchestrator whose built-in stage types all run the same recording stage
pub struct Harness {
    pub orchestrator: PipelineOrchestrator,
    pub stage: Arc<RecordingStage>,
    pub registry: Arc<PluginRegistry>,
}

pub fn harness(definition: PipelineDefinition) -> Harness {
    harness_with(definition, EngineSettings::default())
}

pub fn harness_with(definition: PipelineDefinition, settings: EngineSettings) -> Harness {
    harness_for(Arc::new(InMemoryDefinitions::new().with(definition)), settings)
}

/// Harness resolving pipelines through `provider`
pub fn harness_for(provider: Arc<dyn DefinitionProvider>, settings: EngineSettings) -> Harness {
    let stage = RecordingStage::new();
    let registry = Arc::new(PluginRegistry::new());

    let mut executor = StageExecutor::new(registry.clone()).with_retry_policy(RetryPolicy::new(Duration::from_millis(10)));
    for stage_type in BUILTIN_STAGE_TYPES {
        executor = executor.with_stage(stage_type, stage.clone());
    }

    let orchestrator = PipelineOrchestrator::new(
        provider,
        registry.clone(),
        Arc::new(executor),
        settings,
    );

    Harness {
        orchestrator,
        stage,
        registry,
    }
}

impl Harness {
    pub async fn run(&self, pipeline: &str) -> (PipelineResult, PipelineContext) {
        let mut context = PipelineContext::new(pipeline);
        let result = self.orchestrator.execute(&mut context).await;
        (result, context)
    }
}

/// Assert the pipeline succeeded
pub fn assert_pipeline_succeeded(result: &PipelineResult) {
    assert!(
        result.success,
        "Expected pipeline to succeed, got: {:?}",
        result.error_message()
    );
}

/// Assert the pipeline failed because of the named stage
pub fn assert_stage_failed(result: &PipelineResult, stage: &str) {
    assert_eq!(
        result.error,
        Some(PipelineError::StageFailed {
            stage: stage.to_string()
        }),
        "Expected stage {} to fail the pipeline",
        stage
    );
}

/// Assert every dependency of `stage` finished before `stage` started
pub fn assert_started_after(recorder: &RecordingStage, stage: &str, dependencies: &[&str]) {
    let span = recorder
        .span(stage)
        .unwrap_or_else(|| panic!("Stage {} never ran", stage));
    for dep in dependencies {
        let dep_span = recorder
            .span(dep)
            .unwrap_or_else(|| panic!("Dependency {} never ran", dep));
        assert!(
            dep_span.finished < span.started,
            "Stage {} started before its dependency {} finished",
            stage,
            dep
        );
    }
}
