//! Test: Gates and Promotion - gates read the results of a real run

use crate::helpers::*;
use cd_engine::core::{
    ConfigMap, Environment, EnvironmentCatalog, GateRequirement, PipelineDefinition, PromotionPolicy,
    StageDefinition,
};
use cd_engine::execution::{PromotionRequest, Promoter};
use cd_engine::plugin::{GateExecutor, Severity};
use serde_json::json;
use std::sync::Arc;

fn release() -> PipelineDefinition {
    PipelineDefinition::new("release")
        .with_stage(StageDefinition::new("build", "build"))
        .with_stage(
            StageDefinition::new("unit-test", "test")
                .depends_on(["build"])
                .with_gate(GateRequirement::new("coverage-threshold").with_config("minCoverage", json!(75))),
        )
        .with_stage(StageDefinition::new("security-scan", "build").depends_on(["build"]))
}

fn config(key: &str, value: serde_json::Value) -> ConfigMap {
    ConfigMap::from([(key.to_string(), value)])
}

fn catalog() -> EnvironmentCatalog {
    let mut prod = Environment::new("prod", 3);
    prod.gates = vec!["security-scan".to_string()];
    EnvironmentCatalog::from_environments([Environment::new("dev", 1), Environment::new("staging", 2), prod])
}

#[tokio::test]
async fn test_coverage_below_threshold_fails() {
    let h = harness(release());
    h.stage.script("unit-test", Script::default().with_metadata("coverage", "70"));

    let (result, context) = h.run("release").await;
    assert_pipeline_succeeded(&result);

    let gates = GateExecutor::new(h.registry.clone());
    let gate = gates.execute_gate("coverage-threshold", &config("minCoverage", json!(80)), &context);

    assert!(!gate.passed);
    assert_eq!(gate.severity, Severity::Error);
    assert!(gate.message.contains("70.0"));
    assert!(gate.message.contains("80.0"));
}

#[tokio::test]
async fn test_critical_vulnerability_fails_security_gate() {
    let h = harness(release());
    h.stage.script(
        "security-scan",
        Script::default().with_metadata("critical", "1").with_metadata("high", "0"),
    );

    let (_, context) = h.run("release").await;
    let gates = GateExecutor::new(h.registry.clone());
    let gate = gates.execute_gate("security-scan", &ConfigMap::new(), &context);

    assert!(!gate.passed);
    assert_eq!(gate.message, "Security gate failed: 1 critical vulnerabilities (max: 0)");
}

#[tokio::test]
async fn test_missing_test_stage_is_a_warning() {
    let h = harness(PipelineDefinition::new("build-only").with_stage(StageDefinition::new("build", "build")));

    let (_, context) = h.run("build-only").await;
    let gates = GateExecutor::new(h.registry.clone());
    let gate = gates.execute_gate("test-passed", &ConfigMap::new(), &context);

    assert!(gate.passed);
    assert!(gate.is_warning());
}

#[tokio::test]
async fn test_clean_run_promotes_to_prod() {
    let definition = release();
    let stage_gates = definition.required_gates();
    let h = harness(definition);
    h.stage.script("unit-test", Script::default().with_metadata("coverage", "91.5"));
    h.stage.script(
        "security-scan",
        Script::default().with_metadata("critical", "0").with_metadata("high", "0"),
    );

    let (result, context) = h.run("release").await;
    assert_pipeline_succeeded(&result);

    let promoter = Promoter::new(Arc::new(GateExecutor::new(h.registry.clone())), h.registry.clone(), catalog());
    let request = PromotionRequest::new("release", "prod", PromotionPolicy::production()).with_stage_gates(stage_gates);
    let outcome = promoter.promote(&request, &context);

    assert!(outcome.promoted, "{}", outcome.message);
    assert_eq!(outcome.from.as_deref(), Some("staging"));
    assert_eq!(outcome.message, "Promotion completed to prod");
    let evaluated: Vec<&str> = outcome.gate_results.iter().map(|(g, _)| g.as_str()).collect();
    assert_eq!(evaluated, vec!["test-passed", "coverage-threshold", "security-scan"]);
}

#[tokio::test]
async fn test_failed_tests_block_promotion() {
    let h = harness(release());
    h.stage.script("unit-test", Script::failing());

    let (result, context) = h.run("release").await;
    assert_stage_failed(&result, "unit-test");

    let promoter = Promoter::new(Arc::new(GateExecutor::new(h.registry.clone())), h.registry.clone(), catalog());
    let request = PromotionRequest::new("release", "staging", PromotionPolicy::standard());
    let outcome = promoter.promote(&request, &context);

    assert!(!outcome.promoted);
    assert_eq!(outcome.blocking_gate().map(|(g, _)| g.as_str()), Some("test-passed"));
    assert!(outcome
        .message
        .starts_with("Promotion blocked - gate test-passed failed: Test stage 'unit-test' failed"));
}
