//! CLI argument parsing with clap derive

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags};
use crate::commands;

/// Bring up relay and cluster port-forwards for a benchmark environment and
/// collect its telemetry
#[derive(Parser)]
#[command(
    name = "meshbench",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Tunnel configuration file [default: ~/.meshbench/tunnels.yaml]
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log diagnostic events to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Free the configured ports and open every tunnel
    Up,

    /// Kill whatever holds the configured ports
    Down,

    /// Show which configured ports are bound
    Status,

    /// Show service dependencies recorded by the trace server
    Deps(commands::deps::DepsArgs),

    /// Check that the metrics and trace servers answer
    Check,

    /// Run the load generator and save its output
    Load(commands::load::LoadArgs),

    /// Save range-query results for every traced service
    Collect(commands::collect::CollectArgs),
}

impl Cli {
    /// Execute the CLI command and return the process exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<i32> {
        let Cli {
            config,
            json,
            quiet,
            no_color,
            verbose: _,
            command,
        } = self;
        let app = AppContext::new(AppFlags {
            config,
            no_color,
            quiet,
            json,
        });

        match command {
            Command::Up => commands::up::run(&app).await,
            Command::Down => commands::down::run(&app).await,
            Command::Status => commands::status::run(&app).await.map(|()| 0),
            Command::Deps(args) => commands::deps::run(&app, &args).await.map(|()| 0),
            Command::Check => commands::check::run(&app).await,
            Command::Load(args) => commands::load::run(&app, &args).await.map(|()| 0),
            Command::Collect(args) => commands::collect::run(&app, &args).await,
        }
    }
}
