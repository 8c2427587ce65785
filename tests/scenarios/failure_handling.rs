//! Test: Failure Handling - fail-fast, draining, disabled stages and timeouts

use crate::helpers::*;
use cd_engine::core::{EngineSettings, PipelineDefinition, StageDefinition};
use std::time::Duration;

fn compile_then_ship() -> PipelineDefinition {
    PipelineDefinition::new("app")
        .with_stage(StageDefinition::new("compile", "build"))
        .with_stage(StageDefinition::new("lint", "test"))
        .with_stage(StageDefinition::new("ship", "deploy").depends_on(["compile"]))
}

#[tokio::test]
async fn test_fail_fast_launches_nothing_new() {
    let h = harness(compile_then_ship());
    h.stage.script("compile", Script::failing());
    h.stage.script("lint", Script::slow(Duration::from_millis(150)));

    let (result, context) = h.run("app").await;

    assert_stage_failed(&result, "compile");
    assert_eq!(h.stage.calls("ship"), 0);
    assert!(context.get_stage_result("ship").is_none());
    // Already running stages drain and keep their results
    assert!(context.get_stage_result("lint").unwrap().success);
}

#[tokio::test]
async fn test_without_fail_fast_dependents_still_run() {
    let settings = EngineSettings {
        fail_fast: false,
        ..EngineSettings::default()
    };
    let h = harness_with(compile_then_ship(), settings);
    h.stage.script("compile", Script::failing());

    let (result, context) = h.run("app").await;

    assert_stage_failed(&result, "compile");
    assert_eq!(h.stage.calls("ship"), 1);
    assert!(context.get_stage_result("ship").unwrap().success);
}

#[tokio::test]
async fn test_first_failure_in_definition_order_is_reported() {
    let settings = EngineSettings {
        fail_fast: false,
        ..EngineSettings::default()
    };
    let def = PipelineDefinition::new("app")
        .with_stage(StageDefinition::new("slow-check", "test"))
        .with_stage(StageDefinition::new("quick-check", "test"));
    let h = harness_with(def, settings);
    h.stage.script(
        "slow-check",
        Script {
            always_fail: true,
            delay: Some(Duration::from_millis(100)),
            ..Script::default()
        },
    );
    h.stage.script("quick-check", Script::failing());

    let (result, _) = h.run("app").await;

    assert_stage_failed(&result, "slow-check");
}

#[tokio::test]
async fn test_disabled_stage_never_reaches_the_executor() {
    let def = PipelineDefinition::new("app")
        .with_stage(StageDefinition::new("compile", "build"))
        .with_stage(StageDefinition::new("smoke", "test").depends_on(["compile"]).disabled())
        .with_stage(StageDefinition::new("ship", "deploy").depends_on(["smoke"]));
    let h = harness(def);

    let (result, context) = h.run("app").await;

    assert_pipeline_succeeded(&result);
    assert_eq!(h.stage.calls("smoke"), 0);
    let smoke = context.get_stage_result("smoke").unwrap();
    assert!(smoke.success);
    assert!(smoke.is_skipped());
    assert_eq!(h.stage.calls("ship"), 1);
}

#[tokio::test]
async fn test_stage_timeout_fails_the_stage() {
    let def = PipelineDefinition::new("app").with_stage(StageDefinition::new("integration", "test").with_timeout(1));
    let h = harness(def);
    h.stage.script("integration", Script::slow(Duration::from_secs(30)));

    let (result, context) = h.run("app").await;

    assert_stage_failed(&result, "integration");
    let stage = context.get_stage_result("integration").unwrap();
    assert_eq!(stage.output, "Timeout after 1 seconds");
    assert!(stage.duration_ms >= 1000);
}

#[tokio::test]
async fn test_unregistered_plugin_stage_is_invalid() {
    let def = PipelineDefinition::new("app").with_stage(StageDefinition::new("scan", "plugin:trivy"));
    let h = harness(def);

    let (result, _) = h.run("app").await;

    assert_eq!(
        result.error_message().as_deref(),
        Some("Pipeline validation failed: Invalid stage type: plugin:trivy for stage: scan")
    );
    assert!(result.error.unwrap().is_invalid_definition());
    assert_eq!(h.stage.total_calls(), 0);
}
