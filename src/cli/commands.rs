//! CLI command definitions

use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Pipeline name
    #[arg(short, long)]
    pub name: String,

    /// Target environment; its settings become run variables
    #[arg(short, long)]
    pub env: Option<String>,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Validate only, run no stages
    #[arg(long)]
    pub dry_run: bool,
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Pipeline name
    #[arg(short, long)]
    pub name: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show a pipeline's structure
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Pipeline name
    #[arg(short, long)]
    pub name: String,
}

/// Promote a release into an environment
#[derive(Debug, Args, Clone)]
pub struct PromoteCommand {
    /// Pipeline name
    #[arg(short, long)]
    pub name: String,

    /// Target environment
    #[arg(short, long)]
    pub to: String,

    /// Source environment (defaults to the one before the target)
    #[arg(short, long)]
    pub from: Option<String>,

    /// Promotion policy (fast-track, standard, production, security-patch)
    #[arg(long, default_value = "standard")]
    pub policy: String,

    /// Report the gates without running the pipeline or evaluating them
    #[arg(long)]
    pub dry_run: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
