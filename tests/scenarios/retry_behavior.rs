//! Test: Retry Behavior - failed attempts are retried up to the stage's limit

use crate::helpers::*;
use cd_engine::core::{PipelineDefinition, StageDefinition};
use cd_engine::execution::ExecutionEvent;
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn test_retry_recovers_on_third_attempt() {
    let def = PipelineDefinition::new("app").with_stage(StageDefinition::new("build", "build").with_retry(2));
    let h = harness(def);
    h.stage.script("build", Script::flaky(2));

    let (result, context) = h.run("app").await;

    assert_pipeline_succeeded(&result);
    let build = context.get_stage_result("build").unwrap();
    assert!(build.success);
    assert_eq!(build.attempt, 3);
    assert_eq!(h.stage.calls("build"), 3);
}

#[tokio::test]
async fn test_no_retry_invokes_once() {
    let def = PipelineDefinition::new("app").with_stage(StageDefinition::new("build", "build").with_retry(0));
    let h = harness(def);
    h.stage.script("build", Script::failing());

    let (result, context) = h.run("app").await;

    assert_stage_failed(&result, "build");
    assert_eq!(h.stage.calls("build"), 1);
    assert_eq!(context.get_stage_result("build").unwrap().output, "build failed on call 1");
}

#[tokio::test]
async fn test_retry_events_are_emitted() {
    let def = PipelineDefinition::new("app").with_stage(StageDefinition::new("test", "test").with_retry(3));
    let h = harness(def);
    h.stage.script("test", Script::failing());

    let retries = Arc::new(Mutex::new(Vec::new()));
    let sink = retries.clone();
    h.orchestrator.events().subscribe(move |event| {
        if let ExecutionEvent::StageRetrying { attempt, max_retries, .. } = event {
            sink.lock().push((attempt, max_retries));
        }
    });

    let (result, context) = h.run("app").await;

    assert_stage_failed(&result, "test");
    assert_eq!(h.stage.calls("test"), 4);
    assert_eq!(context.get_stage_result("test").unwrap().attempt, 4);
    assert_eq!(*retries.lock(), vec![(2, 3), (3, 3), (4, 3)]);
}
