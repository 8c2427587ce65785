//! Test: Success Chain - dependent stages run in order and all succeed

use crate::helpers::*;
use cd_engine::core::{PipelineDefinition, StageDefinition};

fn build_test_deploy() -> PipelineDefinition {
    PipelineDefinition::new("web-app")
        .with_stage(StageDefinition::new("build", "build"))
        .with_stage(StageDefinition::new("test", "test").depends_on(["build"]))
        .with_stage(StageDefinition::new("deploy", "deploy").depends_on(["test"]))
}

#[tokio::test]
async fn test_linear_chain_succeeds() {
    let h = harness(build_test_deploy());

    let (result, context) = h.run("web-app").await;

    assert_pipeline_succeeded(&result);
    let mut names: Vec<&String> = context.stage_results.keys().collect();
    names.sort();
    assert_eq!(names, vec!["build", "deploy", "test"]);
    assert!(context.stage_results.values().all(|r| r.success && r.attempt == 1));
    assert_eq!(h.stage.start_order(), vec!["build", "test", "deploy"]);
}

#[tokio::test]
async fn test_every_stage_runs_exactly_once() {
    let def = PipelineDefinition::new("fan")
        .with_stage(StageDefinition::new("checkout", "checkout"))
        .with_stage(StageDefinition::new("build-api", "build").depends_on(["checkout"]))
        .with_stage(StageDefinition::new("build-web", "build").depends_on(["checkout"]))
        .with_stage(StageDefinition::new("unit-test", "test").depends_on(["build-api", "build-web"]))
        .with_stage(StageDefinition::new("image", "containerize").depends_on(["build-api"]))
        .with_stage(StageDefinition::new("release", "deploy").depends_on(["unit-test", "image"]));
    let h = harness(def.clone());

    let (result, context) = h.run("fan").await;

    assert_pipeline_succeeded(&result);
    assert_eq!(context.stage_results.len(), def.stages.len());
    for stage in &def.stages {
        assert_eq!(h.stage.calls(&stage.name), 1, "stage {} call count", stage.name);
        assert!(context.get_stage_result(&stage.name).is_some());
    }
}

#[tokio::test]
async fn test_definition_variables_seed_the_run() {
    let def = build_test_deploy()
        .with_variable("IMAGE", "web-app")
        .with_variable("TAG", "latest");
    let h = harness(def);

    let mut context = cd_engine::core::PipelineContext::new("web-app").with_variable("TAG", "1.4.2");
    let result = h.orchestrator.execute(&mut context).await;

    assert_pipeline_succeeded(&result);
    assert_eq!(context.get_variable("IMAGE").map(String::as_str), Some("web-app"));
    assert_eq!(context.get_variable("TAG").map(String::as_str), Some("1.4.2"));
}
