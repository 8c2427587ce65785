//! Test: Config Loading - pipelines, environments and engine settings from disk

use crate::helpers::*;
use cd_engine::core::{ConfigurationLoader, DefinitionProvider, PipelineContext};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const RELEASE: &str = r#"
name: release
timeout: 60
variables:
  IMAGE: registry.local/app
  REPLICAS: 1
stages:
  - name: checkout
    type: checkout
  - name: build
    type: build
    depends-on: [checkout]
    retry: 1
  - name: unit-test
    type: test
    dependsOn: [build]
    gates:
      - test-passed
      - type: coverage-threshold
        min-coverage: 85
  - name: deploy
    type: deploy
    depends_on: [unit-test]
    target: staging
"#;

const ENVIRONMENTS: &str = r#"
environments:
  - name: dev
    order: 1
  - name: staging
    order: 2
    auto-promote: true
    replicas: 3
    deploy:
      type: kubernetes
      namespace: app-staging
      strategy: rolling
    resources:
      cpu: 500m
      memory: 1Gi
"#;

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "pipelines/release.yml", RELEASE);
    write(dir.path(), "pipelines/nightly.yaml", "name: nightly\nstages:\n  - name: build\n    type: build\n");
    write(dir.path(), "environments.yml", ENVIRONMENTS);
    write(dir.path(), "engine.yml", "max-parallel-stages: 2\nretry-base-delay-ms: 5\nfail-fast: false\n");
    dir
}

#[test]
fn test_definitions_load_from_yaml() {
    let dir = config_dir();
    let loader = ConfigurationLoader::new(dir.path());

    assert_eq!(loader.list_pipelines().unwrap(), vec!["nightly", "release"]);

    let release = loader.load_pipeline_definition("release").unwrap().unwrap();
    assert_eq!(release.timeout_secs(), Some(60));
    assert_eq!(release.variables.get("REPLICAS").map(String::as_str), Some("1"));
    assert_eq!(release.stage("build").unwrap().retry_count(), 1);
    assert_eq!(release.stage("unit-test").unwrap().depends_on, vec!["build"]);
    assert_eq!(release.stage("deploy").unwrap().depends_on, vec!["unit-test"]);

    let gates = release.required_gates();
    assert_eq!(gates.len(), 2);
    assert_eq!(gates[1].config.get("minCoverage"), Some(&serde_json::json!(85)));

    assert!(loader.load_pipeline_definition("missing").unwrap().is_none());
}

#[test]
fn test_engine_settings_from_disk() {
    let dir = config_dir();
    let settings = ConfigurationLoader::new(dir.path()).load_engine_settings().unwrap();

    assert_eq!(settings.max_parallel_stages, Some(2));
    assert_eq!(settings.retry_base_delay_ms, 5);
    assert!(!settings.fail_fast);
}

#[test]
fn test_malformed_pipeline_is_a_config_error() {
    let dir = config_dir();
    write(dir.path(), "pipelines/broken.yml", "name: [unterminated\n");

    let loader = ConfigurationLoader::new(dir.path());
    assert!(loader.load_pipeline_definition("broken").is_err());
}

#[tokio::test]
async fn test_run_pipeline_from_config_dir() {
    let dir = config_dir();
    let loader = ConfigurationLoader::new(dir.path());
    let settings = loader.load_engine_settings().unwrap();
    let environments = loader.load_environments().unwrap();
    let h = harness_for(Arc::new(loader), settings);

    let mut context = PipelineContext::new("release")
        .with_environment("staging")
        .with_variable("IMAGE", "registry.local/app:rc1");
    environments.apply_overrides(&mut context);
    let result = h.orchestrator.execute(&mut context).await;

    assert_pipeline_succeeded(&result);
    assert_eq!(context.stage_results.len(), 4);
    assert_started_after(&h.stage, "deploy", &["unit-test"]);

    let var = |key: &str| context.get_variable(key).map(String::as_str);
    assert_eq!(var("ENVIRONMENT_NAME"), Some("staging"));
    assert_eq!(var("ENVIRONMENT_ORDER"), Some("2"));
    assert_eq!(var("DEPLOY_TYPE"), Some("kubernetes"));
    assert_eq!(var("DEPLOY_NAMESPACE"), Some("app-staging"));
    assert_eq!(var("CPU"), Some("500m"));
    assert_eq!(var("REPLICAS"), Some("3"));
    assert_eq!(var("IMAGE"), Some("registry.local/app:rc1"));
}

#[tokio::test]
async fn test_broken_definition_fails_run_as_config_error() {
    let dir = config_dir();
    write(dir.path(), "pipelines/broken.yml", "stages: {not: a list}\n");
    let h = harness_for(Arc::new(ConfigurationLoader::new(dir.path())), Default::default());

    let (result, _) = h.run("broken").await;

    assert!(result.error.as_ref().unwrap().is_invalid_definition());
    assert!(result
        .error_message()
        .unwrap()
        .starts_with("Failed to load pipeline definition"));
}
