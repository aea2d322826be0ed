//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Keep self-hosted agent instances alive: diagnose, repair, bootstrap, checkpoint
#[derive(Parser)]
#[command(
    name = "hatchery",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output (any non-empty `NO_COLOR` except 0/false/no/off)
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Skip confirmation prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the health battery against one instance or the whole fleet
    Diagnose(commands::diagnose::DiagnoseArgs),

    /// Diagnose, repair on-box, verify, and escalate what is left
    Fix(commands::fix::FixArgs),

    /// Install and configure the identity/checkpoint toolchain
    #[command(name = "setup-amcp")]
    SetupAmcp(commands::setup_amcp::SetupAmcpArgs),

    /// Show, set, or push an instance's secrets
    Config(commands::config::ConfigArgs),

    /// Take a checkpoint and record its identifier
    Checkpoint(commands::checkpoint::CheckpointArgs),

    /// List managed instances
    List(commands::list::ListArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            command,
        } = self;

        if let Command::Version = command {
            commands::version::run(json)?;
            return Ok(ExitCode::SUCCESS);
        }

        let app = AppContext::new(&AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
        })?;

        match command {
            Command::Diagnose(args) => commands::diagnose::run(&app, &args).await,
            Command::Fix(args) => commands::fix::run(&app, &args).await,
            Command::SetupAmcp(args) => commands::setup_amcp::run(&app, &args).await,
            Command::Config(args) => commands::config::run(&app, &args).await,
            Command::Checkpoint(args) => commands::checkpoint::run(&app, &args).await,
            Command::List(args) => commands::list::run(&app, &args).await,
            Command::Version => Ok(ExitCode::SUCCESS),
        }
    }
}
