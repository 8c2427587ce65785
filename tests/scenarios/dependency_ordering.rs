//! Test: Dependency Ordering - readiness, parallelism and deadlock detection

use crate::helpers::*;
use cd_engine::core::{EngineSettings, PipelineDefinition, PipelineError, StageDefinition};
use cd_engine::plugin::PluginInfo;
use std::time::Duration;

fn diamond() -> PipelineDefinition {
    PipelineDefinition::new("diamond")
        .with_stage(StageDefinition::new("checkout", "checkout"))
        .with_stage(StageDefinition::new("build", "build").depends_on(["checkout"]))
        .with_stage(StageDefinition::new("docs", "build").depends_on(["checkout"]))
        .with_stage(StageDefinition::new("publish", "deploy").depends_on(["build", "docs"]))
}

#[tokio::test]
async fn test_no_stage_starts_before_its_dependencies() {
    let h = harness(diamond());
    h.stage.script("build", Script::slow(Duration::from_millis(60)));
    h.stage.script("docs", Script::slow(Duration::from_millis(20)));

    let (result, _) = h.run("diamond").await;

    assert_pipeline_succeeded(&result);
    assert_started_after(&h.stage, "build", &["checkout"]);
    assert_started_after(&h.stage, "docs", &["checkout"]);
    assert_started_after(&h.stage, "publish", &["build", "docs"]);
}

#[tokio::test]
async fn test_independent_stages_overlap() {
    let settings = EngineSettings {
        max_parallel_stages: Some(4),
        ..EngineSettings::default()
    };
    let h = harness_with(diamond(), settings);
    h.stage.script("build", Script::slow(Duration::from_millis(150)));
    h.stage.script("docs", Script::slow(Duration::from_millis(150)));

    let (result, _) = h.run("diamond").await;

    assert_pipeline_succeeded(&result);
    let build = h.stage.span("build").unwrap();
    let docs = h.stage.span("docs").unwrap();
    assert!(build.started < docs.finished && docs.started < build.finished);
}

#[tokio::test]
async fn test_single_worker_serializes_stages() {
    let settings = EngineSettings {
        max_parallel_stages: Some(1),
        ..EngineSettings::default()
    };
    let h = harness_with(diamond(), settings);
    h.stage.script("build", Script::slow(Duration::from_millis(50)));
    h.stage.script("docs", Script::slow(Duration::from_millis(50)));

    let (result, context) = h.run("diamond").await;

    assert_pipeline_succeeded(&result);
    assert_eq!(context.stage_results.len(), 4);
    let build = h.stage.span("build").unwrap();
    let docs = h.stage.span("docs").unwrap();
    assert!(build.finished < docs.started || docs.finished < build.started);
}

#[tokio::test]
async fn test_circular_dependency_is_reported() {
    let def = PipelineDefinition::new("loop")
        .with_stage(StageDefinition::new("A", "build").depends_on(["B"]))
        .with_stage(StageDefinition::new("B", "build").depends_on(["A"]));
    let h = harness(def);

    let (result, _) = h.run("loop").await;

    assert!(!result.success);
    assert_eq!(
        result.error,
        Some(PipelineError::Scheduling(
            "Circular dependency detected or no runnable stages: A, B".to_string()
        ))
    );
    assert!(result.error_message().unwrap().contains("Circular dependency"));
    assert_eq!(h.stage.total_calls(), 0);
}

#[tokio::test]
async fn test_cycle_behind_runnable_stages() {
    let def = PipelineDefinition::new("partial")
        .with_stage(StageDefinition::new("setup", "checkout"))
        .with_stage(StageDefinition::new("left", "build").depends_on(["setup", "right"]))
        .with_stage(StageDefinition::new("right", "build").depends_on(["left"]));
    let h = harness(def);

    let (result, context) = h.run("partial").await;

    assert_eq!(
        result.error_message().as_deref(),
        Some("Circular dependency detected or no runnable stages: left, right")
    );
    assert!(context.get_stage_result("setup").unwrap().success);
}

#[tokio::test]
async fn test_plugin_stage_runs_in_the_graph() {
    let def = PipelineDefinition::new("scan")
        .with_stage(StageDefinition::new("build", "build"))
        .with_stage(StageDefinition::new("security-scan", "plugin:scanner").depends_on(["build"]));
    let h = harness(def);
    let scanner = RecordingStage::new();
    h.registry.register_stage(PluginInfo::new("scanner", "2.0"), scanner.clone());

    let (result, context) = h.run("scan").await;

    assert_pipeline_succeeded(&result);
    assert_eq!(scanner.calls("security-scan"), 1);
    assert_eq!(h.stage.calls("security-scan"), 0);
    assert_eq!(context.get_stage_result("security-scan").unwrap().output, "security-scan done");
}
