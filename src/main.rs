use anyhow::{Context, Result};
use cd_engine::cli::commands::{PromoteCommand, RunCommand, StatusCommand, ValidateCommand};
use cd_engine::cli::output::*;
use cd_engine::cli::{Cli, Command, EXIT_FAILURE, EXIT_INVALID_DEFINITION};
use cd_engine::core::{
    CancellationToken, ConfigurationLoader, DefinitionProvider, PipelineContext, PipelineDefinition, PipelineError,
    PipelineResult, PromotionPolicy, BUILTIN_STAGE_TYPES,
};
use cd_engine::execution::{
    execution_levels, find_cycle, PipelineOrchestrator, PromotionRequest, Promoter, RetryPolicy, StageExecutor,
};
use cd_engine::plugin::{GateExecutor, LogNotifier, PluginInfo, PluginRegistry};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Everything a command needs, wired once per invocation
struct Engine {
    loader: Arc<ConfigurationLoader>,
    registry: Arc<PluginRegistry>,
    gates: Arc<GateExecutor>,
    orchestrator: PipelineOrchestrator,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match dispatch(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            println!("{} {:#}", CROSS, style(&e).red());
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<ExitCode> {
    let engine = build_engine(cli)?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(&engine, cmd).await,
        Command::Validate(cmd) => validate_pipeline(&engine, cmd),
        Command::List => list_pipelines(&engine),
        Command::Status(cmd) => show_status(&engine, cmd),
        Command::Promote(cmd) => promote(&engine, cmd).await,
        Command::Plugins => list_plugins(&engine),
    }
}

fn build_engine(cli: &Cli) -> Result<Engine> {
    let loader = Arc::new(ConfigurationLoader::new(&cli.config_dir));
    let settings = loader
        .load_engine_settings()
        .context("Failed to load engine settings")?;
    let plugins = loader.load_plugins().context("Failed to load plugin configuration")?;

    let registry = Arc::new(PluginRegistry::new());
    registry.register_notifier(
        PluginInfo::new("log", env!("CARGO_PKG_VERSION")),
        Arc::new(LogNotifier::new("cd-engine")),
    );
    registry.register_configured(&plugins);

    let gates = Arc::new(GateExecutor::new(registry.clone()));
    let executor = StageExecutor::new(registry.clone()).with_retry_policy(RetryPolicy::from_settings(&settings));
    debug!("Engine settings: {:?}", settings);

    let provider: Arc<dyn DefinitionProvider> = loader.clone();
    let orchestrator = PipelineOrchestrator::new(provider, registry.clone(), Arc::new(executor), settings);

    Ok(Engine {
        loader,
        registry,
        gates,
        orchestrator,
    })
}

/// Exit code for a failed lookup; unreadable or unknown definitions are invalid
fn lookup_failure(name: &str, e: &PipelineError) -> ExitCode {
    println!("{} {}: {}", CROSS, style(name).bold(), style(e).red());
    ExitCode::from(EXIT_INVALID_DEFINITION)
}

/// Run a pipeline with Ctrl-C wired to cancellation, printing events as they happen
async fn execute(engine: &Engine, context: &mut PipelineContext) -> PipelineResult {
    let cancellation = CancellationToken::new();
    let token = cancellation.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel("Interrupted by user");
        }
    });

    engine
        .orchestrator
        .events()
        .subscribe(|event| println!("{}", format_execution_event(&event)));

    println!();
    let result = engine
        .orchestrator
        .execute_with_cancellation(context, &cancellation)
        .await;
    ctrl_c.abort();
    result
}

fn print_stage_summary(context: &PipelineContext) {
    if context.stage_results.is_empty() {
        return;
    }

    let mut results: Vec<_> = context.stage_results.values().collect();
    results.sort_by_key(|r| r.finished_at);

    println!("\n{}", style("Stages").bold());
    for result in results {
        println!("  {}", format_stage_result(result));
        if !result.success {
            println!("{}", format_output(&result.output, 5));
        }
    }
}

fn report_failure(name: &str, result: &PipelineResult) -> ExitCode {
    match &result.error {
        Some(PipelineError::Invalid(errors)) => {
            println!("\n{} {} is not a valid pipeline:", CROSS, style(name).bold());
            for e in errors {
                println!("  - {}", style(e).red());
            }
            ExitCode::from(EXIT_INVALID_DEFINITION)
        }
        Some(e) => {
            println!("\n{} {} {}: {}", CROSS, style(name).bold(), style("failed").red(), e);
            if e.is_invalid_definition() {
                ExitCode::from(EXIT_INVALID_DEFINITION)
            } else {
                ExitCode::from(EXIT_FAILURE)
            }
        }
        None => ExitCode::SUCCESS,
    }
}

async fn run_pipeline(engine: &Engine, cmd: &RunCommand) -> Result<ExitCode> {
    let mut context = PipelineContext::new(&cmd.name).with_dry_run(cmd.dry_run);

    if let Some(ref env) = cmd.env {
        context = context.with_environment(env);
        let catalog = engine
            .loader
            .load_environments()
            .context("Failed to load environments")?;
        catalog.apply_overrides(&mut context);
        println!("{} Environment: {}", INFO, style(env).cyan());
    }

    // Command-line variables win over environment settings
    for (key, value) in &cmd.var {
        context.set_variable(key, value);
        println!("{} Variable override: {} = {}", INFO, style(key).cyan(), style(value).dim());
    }

    let result = execute(engine, &mut context).await;
    print_stage_summary(&context);

    if result.success {
        let what = if cmd.dry_run { "is valid (dry run)" } else { "completed successfully" };
        println!("\n{} {} {}", CHECK, style(&cmd.name).bold(), style(what).green());
        return Ok(ExitCode::SUCCESS);
    }
    Ok(report_failure(&cmd.name, &result))
}

fn validate_pipeline(engine: &Engine, cmd: &ValidateCommand) -> Result<ExitCode> {
    let definition = match engine.orchestrator.load_definition(&cmd.name) {
        Ok(definition) => definition,
        Err(e) => return Ok(lookup_failure(&cmd.name, &e)),
    };

    let report = engine.orchestrator.validate(&definition);
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_validation(&cmd.name, &report));
        if let Some(cycle) = find_cycle(&definition) {
            println!("{} Dependency cycle: {}", WARN, style(cycle.join(" -> ")).yellow());
        }
    }

    Ok(if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_INVALID_DEFINITION)
    })
}

fn list_pipelines(engine: &Engine) -> Result<ExitCode> {
    let names = engine
        .loader
        .list_pipelines()
        .context("Failed to list pipelines")?;

    if names.is_empty() {
        println!(
            "{} No pipelines found in {}",
            INFO,
            style(engine.loader.config_dir().display()).dim()
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} Pipelines:", INFO);
    for name in &names {
        println!("  {}", style(name).bold());
    }
    Ok(ExitCode::SUCCESS)
}

fn print_stages(definition: &PipelineDefinition) {
    for stage in &definition.stages {
        let deps = if stage.depends_on.is_empty() {
            String::new()
        } else {
            format!(" <- {}", stage.depends_on.join(", "))
        };
        let disabled = if stage.enabled { "" } else { " (disabled)" };
        println!(
            "  {} [{}]{}{}",
            style(&stage.name).bold(),
            style(&stage.stage_type).cyan(),
            style(deps).dim(),
            style(disabled).yellow()
        );
    }
}

fn show_status(engine: &Engine, cmd: &StatusCommand) -> Result<ExitCode> {
    let definition = match engine.orchestrator.load_definition(&cmd.name) {
        Ok(definition) => definition,
        Err(e) => return Ok(lookup_failure(&cmd.name, &e)),
    };

    println!("{} Pipeline {}", INFO, style(&definition.name).bold());
    if let Some(ref description) = definition.description {
        println!("  {}", style(description).dim());
    }
    if !definition.environments.is_empty() {
        println!("  Environments: {}", definition.environments.join(" -> "));
    }

    println!("\n{}", style("Stages").bold());
    print_stages(&definition);

    println!("\n{}", style("Execution levels").bold());
    for (level, wave) in execution_levels(&definition).iter().enumerate() {
        println!("  {}: {}", level + 1, wave.join(", "));
    }
    if let Some(cycle) = find_cycle(&definition) {
        println!("{} Dependency cycle: {}", WARN, style(cycle.join(" -> ")).yellow());
    }

    let report = engine.orchestrator.validate(&definition);
    println!("\n{}", format_validation(&definition.name, &report));
    Ok(ExitCode::SUCCESS)
}

async fn promote(engine: &Engine, cmd: &PromoteCommand) -> Result<ExitCode> {
    let definition = match engine.orchestrator.load_definition(&cmd.name) {
        Ok(definition) => definition,
        Err(e) => return Ok(lookup_failure(&cmd.name, &e)),
    };
    let catalog = engine
        .loader
        .load_environments()
        .context("Failed to load environments")?;

    let policy = PromotionPolicy::from_type(&cmd.policy);
    println!("{}", style("Promotion Request").bold());
    println!("  From: {}", cmd.from.as_deref().unwrap_or("previous environment"));
    println!("  To: {}", style(&cmd.to).cyan());
    println!("  Policy: {}", policy.name);
    if let Some(ref description) = policy.description {
        println!("  Description: {}", style(description).dim());
    }

    let mut request = PromotionRequest::new(&cmd.name, &cmd.to, policy)
        .with_stage_gates(definition.required_gates())
        .with_dry_run(cmd.dry_run);
    if let Some(ref from) = cmd.from {
        request = request.from_environment(from);
    }

    let mut context = PipelineContext::new(&cmd.name)
        .with_environment(&cmd.to)
        .with_dry_run(cmd.dry_run);
    catalog.apply_overrides(&mut context);

    if !cmd.dry_run {
        let result = execute(engine, &mut context).await;
        print_stage_summary(&context);
        if !result.success {
            println!("\n{} Promotion blocked - pipeline did not succeed", CROSS);
            return Ok(report_failure(&cmd.name, &result));
        }
    }

    let promoter = Promoter::new(engine.gates.clone(), engine.registry.clone(), catalog);
    let outcome = promoter.promote(&request, &context);

    if cmd.dry_run {
        println!("\n{} [DRY RUN] {}", INFO, outcome.message);
        for requirement in &outcome.requirements {
            println!("  - {}", requirement.gate_type);
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n{}", style("Gates").bold());
    for (gate_type, result) in &outcome.gate_results {
        println!("  {}", format_gate_result(gate_type, result));
    }

    if outcome.promoted {
        println!("\n{} {}", CHECK, style(&outcome.message).green());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("\n{} {}", CROSS, style(&outcome.message).red());
        Ok(ExitCode::from(EXIT_FAILURE))
    }
}

fn list_plugins(engine: &Engine) -> Result<ExitCode> {
    let listing = engine.registry.list_all_plugins();

    println!("{}", style("Stage types").bold());
    for stage_type in BUILTIN_STAGE_TYPES {
        println!("  {} {}", stage_type, style("(built-in)").dim());
    }
    for name in &listing.stages {
        println!("  plugin:{}", name);
    }

    println!("\n{}", style("Gates").bold());
    for gate in engine.gates.builtin_gate_types() {
        println!("  {} {}", gate, style("(built-in)").dim());
    }
    for gate in &listing.gates {
        println!("  {}", gate);
    }

    println!("\n{}", style("Notifiers").bold());
    for notifier in &listing.notifiers {
        println!("  {}", notifier);
    }
    Ok(ExitCode::SUCCESS)
}
