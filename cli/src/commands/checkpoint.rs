//! `hatchery checkpoint`: snapshot the instance's agent state.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::checkpoint;
use crate::domain::checkpoint::CheckpointMode;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the checkpoint command.
#[derive(Args)]
pub struct CheckpointArgs {
    /// Instance to checkpoint
    pub name: String,

    /// Include the full agent workspace, not just the session state
    #[arg(long)]
    pub full: bool,
}

/// Run the checkpoint command.
///
/// An uncaptured identifier is a warning, not a failure.
///
/// # Errors
///
/// Returns an error for an unknown or unreachable instance or a failed
/// checkpoint command.
pub async fn run(app: &AppContext, args: &CheckpointArgs) -> Result<ExitCode> {
    let mode = if args.full {
        CheckpointMode::Full
    } else {
        CheckpointMode::Quick
    };
    let shell = app.shell();
    let reporter = TerminalReporter::new(&app.output);
    let outcome =
        checkpoint::checkpoint(&shell, &app.instances, &reporter, &args.name, mode).await?;
    drop(reporter);

    if app.is_json() {
        json::print(&outcome)?;
    } else {
        HumanRenderer::new(&app.output).render_checkpoint(&outcome);
    }
    Ok(ExitCode::SUCCESS)
}
