//! `hatchery fix`: diagnose, repair, verify, escalate.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::diagnose::DiagnoseSettings;
use crate::application::services::remediation::{self, FixSettings, RemediationPorts};
use crate::infra::knowledge::HttpKnowledgeSearch;
use crate::infra::notify::TelegramNotifier;
use crate::infra::repair::RemoteRepairAgent;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the fix command.
#[derive(Args)]
pub struct FixArgs {
    /// Instance to repair
    pub name: String,
}

/// Run the fix command. Exits 1 when anything was escalated.
///
/// # Errors
///
/// Returns an error for an unknown instance, an unreachable instance, or a
/// repair agent that could not run.
pub async fn run(app: &AppContext, args: &FixArgs) -> Result<ExitCode> {
    let shell = app.shell();
    let knowledge = HttpKnowledgeSearch::new(app.config.knowledge.url.clone());
    let agent = RemoteRepairAgent::new(app.repair_shell());
    let notifier = TelegramNotifier::default();
    let ports = RemediationPorts {
        knowledge: &knowledge,
        agent: &agent,
        notifier: &notifier,
    };
    let settings = FixSettings {
        diagnose: DiagnoseSettings::from(&app.config),
        policy: app.config.remediation.clone(),
    };

    let reporter = TerminalReporter::new(&app.output);
    let outcome = remediation::fix(
        &shell,
        &app.instances,
        &ports,
        &reporter,
        &args.name,
        &settings,
    )
    .await?;
    drop(reporter);

    if app.is_json() {
        json::print(&outcome)?;
    } else {
        HumanRenderer::new(&app.output).render_fix(&outcome);
    }
    Ok(if outcome.is_escalated() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
