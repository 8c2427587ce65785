//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{PromoteCommand, RunCommand, StatusCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Exit code for a pipeline that ran and failed, or a blocked promotion
pub const EXIT_FAILURE: u8 = 1;

/// Exit code for a definition that is invalid, unreadable or unknown
pub const EXIT_INVALID_DEFINITION: u8 = 2;

/// Continuous-delivery pipeline engine
#[derive(Debug, Parser, Clone)]
#[command(name = "cd-engine")]
#[command(version)]
#[command(about = "Runs delivery pipelines and gates promotions between environments", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding pipelines/, environments.yml, plugins.yml and engine.yml
    #[arg(short, long, global = true, default_value = "config")]
    pub config_dir: PathBuf,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline definition
    Validate(ValidateCommand),

    /// List available pipelines
    List,

    /// Show a pipeline's stages and execution levels
    Status(StatusCommand),

    /// Promote a release into an environment
    Promote(PromoteCommand),

    /// List registered plugins
    Plugins,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
