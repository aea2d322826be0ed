//! `hatchery diagnose`: run the health battery.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::{diagnose, fleet};
use crate::domain::health::OverallState;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Slack added to the per-instance fleet deadline on top of the ssh command
/// timeout.
const FLEET_DEADLINE_SLACK: Duration = Duration::from_secs(5);

/// Arguments for the diagnose command.
#[derive(Args)]
pub struct DiagnoseArgs {
    /// Instance to diagnose
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub name: Option<String>,

    /// Diagnose every managed instance
    #[arg(long)]
    pub all: bool,
}

/// Run the diagnose command.
///
/// Exits 1 when an instance could not be reached; a degraded or offline
/// instance was diagnosed successfully and exits 0.
///
/// # Errors
///
/// Returns an error for an unknown instance or a store failure.
pub async fn run(app: &AppContext, args: &DiagnoseArgs) -> Result<ExitCode> {
    let settings = diagnose::DiagnoseSettings::from(&app.config);
    let shell = app.shell();
    let reporter = TerminalReporter::new(&app.output);

    let Some(name) = args.name.as_deref() else {
        let deadline =
            Duration::from_secs(app.config.ssh.command_timeout_secs) + FLEET_DEADLINE_SLACK;
        let report = fleet::diagnose_all(
            &shell,
            &app.instances,
            &reporter,
            &settings,
            app.config.fleet.parallelism,
            deadline,
        )
        .await?;
        drop(reporter);
        if app.is_json() {
            json::print(&report)?;
        } else {
            HumanRenderer::new(&app.output).render_fleet(&report);
        }
        return Ok(if report.unreachable > 0 || !report.record_failures.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    };

    let report = diagnose::diagnose(&shell, &app.instances, &reporter, name, &settings).await?;
    drop(reporter);
    if app.is_json() {
        json::print(&report)?;
    } else {
        HumanRenderer::new(&app.output).render_report(&report);
    }
    Ok(if report.overall_state == OverallState::Unreachable {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
