//! Built-in stage types
//!
//! Each stage turns its config into a [`CommandSpec`] and runs it. String
//! config values support `{{ VAR }}` substitution from the run's variables.

use super::command::{render_template, CommandRunner, CommandSpec};
use super::{config_str, Stage, StageError, StageOutput};
use crate::core::{ConfigMap, StageContext};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn words(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

fn config_bool(config: &ConfigMap, key: &str, default: bool) -> bool {
    config.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// A full command line from the `command` key, if set
fn command_override(config: &ConfigMap, vars: &HashMap<String, String>) -> Option<CommandSpec> {
    let mut parts = words(&render_template(config_str(config, "command")?, vars)).into_iter();
    let program = parts.next()?;
    Some(CommandSpec::new(program).args(parts))
}

fn lookup<'a>(config: &'a ConfigMap, key: &str, vars: &'a HashMap<String, String>, var: &str) -> Option<&'a str> {
    config_str(config, key).or_else(|| vars.get(var).map(String::as_str))
}

/// The built-in stage set, keyed by stage type
pub fn builtin_stages() -> HashMap<String, Arc<dyn Stage>> {
    let runner = CommandRunner::new();
    let mut stages: HashMap<String, Arc<dyn Stage>> = HashMap::new();
    stages.insert("build".to_string(), Arc::new(BuildStage::new(runner.clone())));
    stages.insert("test".to_string(), Arc::new(TestStage::new(runner.clone())));
    stages.insert("containerize".to_string(), Arc::new(ContainerizeStage::new(runner.clone())));
    stages.insert("deploy".to_string(), Arc::new(DeployStage::new(runner.clone())));
    stages.insert("checkout".to_string(), Arc::new(CheckoutStage::new(runner)));
    stages
}

/// Compiles the project with maven, gradle, npm, cargo, dotnet or make
#[derive(Debug, Clone, Default)]
pub struct BuildStage {
    runner: CommandRunner,
}

impl BuildStage {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn command_for(&self, config: &ConfigMap, vars: &HashMap<String, String>) -> Result<CommandSpec, StageError> {
        let working_dir = lookup(config, "working-dir", vars, "WORKING_DIRECTORY").unwrap_or(".");
        let tool = config_str(config, "build-tool").unwrap_or("maven");
        let skip_tests = config_bool(config, "skipTests", true);

        let spec = match command_override(config, vars) {
            Some(spec) => spec,
            None => match tool {
                "maven" | "mvn" => {
                    let mut spec = CommandSpec::new("mvn")
                        .args(words(config_str(config, "goals").unwrap_or("clean package")));
                    if skip_tests {
                        spec = spec.arg("-DskipTests");
                    }
                    spec
                }
                "gradle" => {
                    let program = if Path::new(working_dir).join("gradlew").exists() {
                        "./gradlew"
                    } else {
                        "gradle"
                    };
                    let mut spec =
                        CommandSpec::new(program).args(words(config_str(config, "tasks").unwrap_or("build")));
                    if skip_tests {
                        spec = spec.args(["-x", "test"]);
                    }
                    spec
                }
                "npm" | "node" => CommandSpec::new("npm")
                    .arg("run")
                    .arg(config_str(config, "script").unwrap_or("build")),
                "cargo" => CommandSpec::new("cargo").args(["build", "--release"]),
                "dotnet" => CommandSpec::new("dotnet").arg("build"),
                "make" => CommandSpec::new("make").args(config_str(config, "target").map(words).unwrap_or_default()),
                other => return Err(StageError::InvalidConfig(format!("Unsupported build tool: {}", other))),
            },
        };

        let spec = spec
            .args(config_str(config, "options").map(words).unwrap_or_default())
            .current_dir(working_dir);
        Ok(spec.render(vars))
    }
}

#[async_trait]
impl Stage for BuildStage {
    async fn execute(&self, config: &ConfigMap, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let spec = self.command_for(config, &ctx.rendering_variables())?;
        info!("Building with: {}", spec.display());
        let output = self.runner.run(&spec, &ctx.cancellation).await?;
        Ok(StageOutput::new(format!(
            "Build completed successfully using {}\n{}",
            spec.program,
            output.combined()
        )))
    }
}

/// Runs the project's test suite
#[derive(Debug, Clone, Default)]
pub struct TestStage {
    runner: CommandRunner,
}

impl TestStage {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn command_for(&self, config: &ConfigMap, vars: &HashMap<String, String>) -> Result<CommandSpec, StageError> {
        let working_dir = lookup(config, "working-dir", vars, "WORKING_DIRECTORY").unwrap_or(".");
        let spec = match command_override(config, vars) {
            Some(spec) => spec,
            None => match config_str(config, "test-tool").unwrap_or("maven") {
                "maven" | "mvn" => CommandSpec::new("mvn").arg("test"),
                "gradle" => CommandSpec::new("gradle").arg("test"),
                "npm" | "node" => CommandSpec::new("npm").arg("test"),
                "cargo" => CommandSpec::new("cargo").arg("test"),
                "dotnet" => CommandSpec::new("dotnet").arg("test"),
                other => return Err(StageError::InvalidConfig(format!("Unsupported test tool: {}", other))),
            },
        };
        Ok(spec.current_dir(working_dir).render(vars))
    }
}

#[async_trait]
impl Stage for TestStage {
    async fn execute(&self, config: &ConfigMap, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let test_type = config_str(config, "test-type").unwrap_or("unit");
        let spec = self.command_for(config, &ctx.rendering_variables())?;
        info!("Running {} tests: {}", test_type, spec.display());
        let output = self.runner.run(&spec, &ctx.cancellation).await?;
        Ok(StageOutput::new(format!("Tests passed successfully\n{}", output.combined()))
            .with_metadata("test-type", test_type))
    }
}

/// Builds a container image with docker
#[derive(Debug, Clone, Default)]
pub struct ContainerizeStage {
    runner: CommandRunner,
}

impl ContainerizeStage {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    /// Image reference (`name:tag`) built for this run
    fn image_ref(config: &ConfigMap, vars: &HashMap<String, String>) -> String {
        let image = lookup(config, "image", vars, "IMAGE").unwrap_or("myapp");
        let tag = lookup(config, "tag", vars, "GIT_COMMIT").unwrap_or("latest");
        format!("{}:{}", image, tag)
    }

    fn command_for(&self, config: &ConfigMap, vars: &HashMap<String, String>) -> CommandSpec {
        let dockerfile = config_str(config, "dockerfile").unwrap_or("Dockerfile");
        let context = config_str(config, "context").unwrap_or(".");
        CommandSpec::new("docker")
            .args(["build", "-t"])
            .arg(Self::image_ref(config, vars))
            .args(["-f", dockerfile, context])
            .render(vars)
    }
}

#[async_trait]
impl Stage for ContainerizeStage {
    async fn execute(&self, config: &ConfigMap, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let vars = ctx.rendering_variables();
        let image = render_template(&Self::image_ref(config, &vars), &vars);
        let spec = self.command_for(config, &vars);
        info!("Building Docker image: {}", image);
        self.runner.run(&spec, &ctx.cancellation).await?;
        ctx.variables.set("CONTAINER_IMAGE", image.clone());
        Ok(StageOutput::new(format!("Containerized successfully: {}", image)).with_metadata("image", image))
    }
}

/// Rolls out a release to kubernetes, ECS or a local docker host
#[derive(Debug, Clone, Default)]
pub struct DeployStage {
    runner: CommandRunner,
}

impl DeployStage {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn command_for(&self, config: &ConfigMap, ctx: &StageContext, vars: &HashMap<String, String>) -> Result<CommandSpec, StageError> {
        let target = config_str(config, "type")
            .or_else(|| config_str(config, "target"))
            .or_else(|| vars.get("DEPLOY_TYPE").map(String::as_str))
            .unwrap_or("");
        let image = lookup(config, "image", vars, "CONTAINER_IMAGE").unwrap_or("myapp:latest");

        let spec = match target {
            "kubernetes" => {
                let namespace = lookup(config, "namespace", vars, "DEPLOY_NAMESPACE").unwrap_or("default");
                match config_str(config, "manifest") {
                    Some(manifest) => CommandSpec::new("kubectl").args(["apply", "-n", namespace, "-f", manifest]),
                    None => {
                        let deployment = config_str(config, "deployment").unwrap_or(&ctx.pipeline_name);
                        CommandSpec::new("kubectl")
                            .args(["set", "image", "-n", namespace])
                            .arg(format!("deployment/{}", deployment))
                            .arg(format!("{}={}", deployment, image))
                    }
                }
            }
            "ecs" => {
                let cluster = lookup(config, "cluster", vars, "DEPLOY_CLUSTER").unwrap_or("default");
                let service = config_str(config, "service").unwrap_or(&ctx.pipeline_name);
                CommandSpec::new("aws")
                    .args(["ecs", "update-service", "--cluster", cluster, "--service", service])
                    .arg("--force-new-deployment")
            }
            "local" => {
                let name = config_str(config, "container-name").unwrap_or(&ctx.pipeline_name);
                CommandSpec::new("docker").args(["run", "-d", "--name", name, image])
            }
            other => {
                return Err(StageError::InvalidConfig(format!("Unknown deployment target: {}", other)));
            }
        };
        Ok(spec.render(vars))
    }
}

#[async_trait]
impl Stage for DeployStage {
    async fn execute(&self, config: &ConfigMap, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let vars = ctx.rendering_variables();
        let spec = self.command_for(config, ctx, &vars)?;
        info!("Deploying: {}", spec.display());
        let output = self.runner.run(&spec, &ctx.cancellation).await?;
        Ok(StageOutput::new(format!("Deployment completed: {}\n{}", spec.display(), output.combined())))
    }
}

/// Clones the source repository
#[derive(Debug, Clone, Default)]
pub struct CheckoutStage {
    runner: CommandRunner,
}

impl CheckoutStage {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn command_for(&self, config: &ConfigMap, vars: &HashMap<String, String>) -> Result<CommandSpec, StageError> {
        let repository = lookup(config, "repository", vars, "GIT_REPOSITORY")
            .ok_or_else(|| StageError::InvalidConfig("checkout requires 'repository'".to_string()))?;
        let branch = lookup(config, "branch", vars, "GIT_BRANCH").unwrap_or("main");
        let directory = config_str(config, "directory").unwrap_or("workspace");

        let mut spec = CommandSpec::new("git").args(["clone", "--branch", branch]);
        if let Some(depth) = config.get("depth").and_then(|v| v.as_u64()) {
            spec = spec.arg("--depth").arg(depth.to_string());
        }
        Ok(spec.args([repository, directory]).render(vars))
    }
}

#[async_trait]
impl Stage for CheckoutStage {
    async fn execute(&self, config: &ConfigMap, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let vars = ctx.rendering_variables();
        let spec = self.command_for(config, &vars)?;
        info!("Checking out: {}", spec.display());
        let output = self.runner.run(&spec, &ctx.cancellation).await?;
        if let Some(directory) = spec.args.last() {
            ctx.variables.set("WORKING_DIRECTORY", directory.clone());
        }
        Ok(StageOutput::new(format!("Checked out {}\n{}", spec.display(), output.combined())))
    }
}
