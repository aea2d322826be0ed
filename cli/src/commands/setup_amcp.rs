//! `hatchery setup-amcp`: bootstrap the identity/checkpoint toolchain.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::bootstrap::{self, BootstrapOptions};
use crate::application::services::config_push::SecretsPusher;
use crate::domain::bootstrap::StepOutcome;
use crate::domain::error::BootstrapError;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the setup-amcp command.
#[derive(Args)]
pub struct SetupAmcpArgs {
    /// Instance to bootstrap
    pub name: String,

    /// Recreate the identity even if one exists
    #[arg(long)]
    pub force: bool,

    /// Show the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Run the setup-amcp command.
///
/// # Errors
///
/// Returns an error for an unknown or unreachable instance, a missing
/// package installer, or a failed step.
pub async fn run(app: &AppContext, args: &SetupAmcpArgs) -> Result<ExitCode> {
    if args.force
        && !args.dry_run
        && !app.confirm(
            &format!(
                "Recreate the identity on {}? The old identity cannot be recovered.",
                args.name
            ),
            false,
        )?
    {
        app.output.info("Aborted.");
        return Ok(ExitCode::SUCCESS);
    }

    let shell = app.shell();
    let pusher = SecretsPusher::new(&shell, &app.secrets);
    let reporter = TerminalReporter::new(&app.output);
    let report = bootstrap::setup_amcp(
        &shell,
        &pusher,
        &app.instances,
        &reporter,
        &args.name,
        BootstrapOptions {
            force: args.force,
            dry_run: args.dry_run,
        },
    )
    .await?;
    drop(reporter);

    if !report.succeeded() {
        let (step, reason) = report
            .steps
            .iter()
            .find_map(|s| match &s.outcome {
                StepOutcome::Failed { reason } => {
                    Some((s.step.capability.as_str().to_string(), reason.clone()))
                }
                _ => None,
            })
            .unwrap_or_else(|| ("unknown".to_string(), "step did not complete".to_string()));
        let err = BootstrapError::ActionFailed { step, reason };
        if app.is_json() {
            println!(
                "{}",
                json::format_failure(&err.to_string(), "bootstrap_failed", &report)?
            );
            return Ok(ExitCode::FAILURE);
        }
        HumanRenderer::new(&app.output).render_bootstrap(&report);
        return Err(err.into());
    }

    if app.is_json() {
        json::print(&report)?;
    } else {
        HumanRenderer::new(&app.output).render_bootstrap(&report);
    }
    Ok(ExitCode::SUCCESS)
}
