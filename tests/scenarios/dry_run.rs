//! Test: Dry Run and Validation - nothing executes for dry runs or invalid definitions

use crate::helpers::*;
use cd_engine::core::{PipelineContext, PipelineDefinition, PipelineError, StageDefinition};

#[tokio::test]
async fn test_dry_run_invokes_no_stage() {
    let def = PipelineDefinition::new("app")
        .with_stage(StageDefinition::new("build", "build"))
        .with_stage(StageDefinition::new("deploy", "deploy").depends_on(["build"]));
    let h = harness(def);

    let mut context = PipelineContext::new("app").with_dry_run(true);
    let result = h.orchestrator.execute(&mut context).await;

    assert_pipeline_succeeded(&result);
    assert_eq!(h.stage.total_calls(), 0);
    assert!(context.stage_results.is_empty());
}

#[tokio::test]
async fn test_dry_run_still_validates() {
    let def = PipelineDefinition::new("app").with_stage(StageDefinition::new("build", "compile"));
    let h = harness(def);

    let mut context = PipelineContext::new("app").with_dry_run(true);
    let result = h.orchestrator.execute(&mut context).await;

    assert_eq!(
        result.error,
        Some(PipelineError::Invalid(vec!["Invalid stage type: compile for stage: build".to_string()]))
    );
}

#[tokio::test]
async fn test_validation_errors_accumulate() {
    let def = PipelineDefinition::new("bad")
        .with_stage(StageDefinition::new("build", "build"))
        .with_stage(StageDefinition::new("build", "build").depends_on(["build"]));
    let h = harness(def);

    let (result, _) = h.run("bad").await;

    let Some(PipelineError::Invalid(errors)) = &result.error else {
        panic!("expected a validation failure, got {:?}", result.error);
    };
    assert!(errors.contains(&"Duplicate stage name: build".to_string()));
    assert!(errors.contains(&"Stage 'build' cannot depend on itself".to_string()));
    assert_eq!(h.stage.total_calls(), 0);
}

#[tokio::test]
async fn test_unknown_pipeline() {
    let h = harness(PipelineDefinition::new("known").with_stage(StageDefinition::new("build", "build")));

    let (result, _) = h.run("unknown").await;

    assert_eq!(result.error, Some(PipelineError::NotFound("unknown".to_string())));
    assert!(!result.error.unwrap().is_invalid_definition());
}
