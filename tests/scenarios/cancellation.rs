//! Test: Cancellation - external interrupts and the pipeline-wide timeout

use crate::helpers::*;
use cd_engine::core::{CancellationToken, PipelineContext, PipelineDefinition, PipelineError, StageDefinition};
use std::time::Duration;
use tokio::time::Instant;

fn slow_chain() -> PipelineDefinition {
    PipelineDefinition::new("release")
        .with_stage(StageDefinition::new("build", "build"))
        .with_stage(StageDefinition::new("integration", "test").depends_on(["build"]))
        .with_stage(StageDefinition::new("deploy", "deploy").depends_on(["integration"]))
}

#[tokio::test]
async fn test_external_cancellation_interrupts_run() {
    let h = harness(slow_chain());
    h.stage.script("integration", Script::slow(Duration::from_secs(5)));

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel("operator abort");
    });

    let started = Instant::now();
    let mut context = PipelineContext::new("release");
    let result = h.orchestrator.execute_with_cancellation(&mut context, &token).await;

    assert_eq!(result.error, Some(PipelineError::Interrupted("operator abort".to_string())));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(h.stage.calls("deploy"), 0);
    assert!(context.get_stage_result("build").unwrap().success);
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let h = harness(slow_chain());
    let token = CancellationToken::new();
    token.cancel("shutdown");

    let mut context = PipelineContext::new("release");
    let result = h.orchestrator.execute_with_cancellation(&mut context, &token).await;

    assert_eq!(result.error_message().as_deref(), Some("Pipeline interrupted: shutdown"));
    assert_eq!(h.stage.total_calls(), 0);
}

#[tokio::test]
async fn test_pipeline_timeout() {
    let h = harness(slow_chain().with_timeout(1));
    h.stage.script("integration", Script::slow(Duration::from_secs(5)));

    let started = Instant::now();
    let (result, context) = h.run("release").await;

    assert_eq!(result.error, Some(PipelineError::TimedOut(1)));
    assert_eq!(result.error_message().as_deref(), Some("Pipeline timed out after 1s"));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(context.get_stage_result("build").is_some());
    assert_eq!(h.stage.calls("deploy"), 0);
}

#[tokio::test]
async fn test_fast_pipeline_within_timeout() {
    let h = harness(slow_chain().with_timeout(5));

    let (result, context) = h.run("release").await;

    assert_pipeline_succeeded(&result);
    assert_eq!(context.stage_results.len(), 3);
}
