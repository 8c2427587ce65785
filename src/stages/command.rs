//! External command execution for stages

use super::{Stage, StageError, StageOutput};
use crate::core::{CancellationToken, ConfigMap, StageContext};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Replace `{{ VAR }}` (or `{{VAR}}`) placeholders; unknown names are left untouched
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        rendered = rendered
            .replace(&format!("{{{{ {} }}}}", key), value)
            .replace(&format!("{{{{{}}}}}", key), value);
    }
    rendered
}

/// A command line to run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Apply `{{ VAR }}` substitution to the program and arguments
    pub fn render(mut self, variables: &HashMap<String, String>) -> Self {
        self.program = render_template(&self.program, variables);
        self.args = self
            .args
            .iter()
            .map(|a| render_template(a, variables))
            .collect();
        self
    }

    /// The command line as a single string, for logging
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

/// Runs external commands as child processes
///
/// The child is killed if the run is cancelled or times out.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    /// Timeout for command execution in seconds
    timeout_secs: Option<u64>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Run a command to completion
    ///
    /// # Errors
    /// Returns `StageError` if:
    /// - The program cannot be spawned
    /// - It exits with a non-zero status
    /// - The command times out or the run is cancelled
    pub async fn run(
        &self,
        spec: &CommandSpec,
        cancellation: &CancellationToken,
    ) -> Result<CommandOutput, StageError> {
        debug!("Running command: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).envs(&spec.env).kill_on_drop(true);
        if let Some(ref dir) = spec.working_dir {
            command.current_dir(dir);
        }

        let output = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return Err(StageError::Cancelled(cancellation.reason().unwrap_or_default()));
            }
            result = self.wait(command) => result,
        };

        let output = output.map_err(|e| match e {
            WaitError::Timeout(secs) => StageError::Timeout(secs),
            WaitError::Io(e) => StageError::Spawn {
                program: spec.program.clone(),
                reason: e.to_string(),
            },
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", spec.program, code, stderr.trim());
            return Err(StageError::Command {
                program: spec.program.clone(),
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        debug!("{} returned {} bytes of output", spec.program, stdout.len());
        Ok(CommandOutput { stdout, stderr })
    }

    async fn wait(&self, mut command: Command) -> Result<std::process::Output, WaitError> {
        match self.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), command.output())
                .await
                .map_err(|_| WaitError::Timeout(secs))?
                .map_err(WaitError::Io),
            None => command.output().await.map_err(WaitError::Io),
        }
    }
}

enum WaitError {
    Timeout(u64),
    Io(std::io::Error),
}

/// A stage plugin that runs a configured command
///
/// Arguments and environment values support `{{ VAR }}` substitution from the
/// run's variables and the stage's string config values. A stage may append
/// arguments through an `args` list in its config.
#[derive(Debug, Clone)]
pub struct CommandStage {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    runner: CommandRunner,
}

impl CommandStage {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            runner: CommandRunner::new(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command_for(&self, config: &ConfigMap, ctx: &StageContext) -> CommandSpec {
        let mut variables = ctx.rendering_variables();
        for (key, value) in config {
            if let Some(s) = value.as_str() {
                variables.entry(key.clone()).or_insert_with(|| s.to_string());
            }
        }

        let extra_args = config
            .get("args")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item.as_str() {
                        Some(s) => s.to_string(),
                        None => item.to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut spec = CommandSpec::new(self.program.clone())
            .args(self.args.iter().cloned())
            .args(extra_args)
            .render(&variables);
        for (key, value) in &self.env {
            spec = spec.env(key.clone(), render_template(value, &variables));
        }
        spec
    }
}

#[async_trait]
impl Stage for CommandStage {
    async fn execute(&self, config: &ConfigMap, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let spec = self.command_for(config, ctx);
        let output = self.runner.run(&spec, &ctx.cancellation).await?;
        Ok(StageOutput::new(output.combined()))
    }
}
