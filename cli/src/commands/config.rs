//! `hatchery config`: show, set, and push an instance's secrets.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::ProgressReporter as _;
use crate::application::services::config_push;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the config command. `--show` is the default.
#[derive(Args)]
pub struct ConfigArgs {
    /// Instance whose secrets to manage
    pub name: String,

    /// Show stored secrets, masked
    #[arg(long, conflicts_with_all = ["set", "push"])]
    pub show: bool,

    /// Store one secret locally
    #[arg(long, value_name = "KEY=VALUE", conflicts_with = "push")]
    pub set: Option<String>,

    /// Write stored secrets into the instance's AMCP config
    #[arg(long)]
    pub push: bool,
}

/// Run the config command.
///
/// # Errors
///
/// Returns an error for an unknown instance, an invalid assignment, or a
/// failed push.
pub async fn run(app: &AppContext, args: &ConfigArgs) -> Result<ExitCode> {
    if let Some(assignment) = &args.set {
        let key = config_push::set(&app.instances, &app.secrets, &args.name, assignment).await?;
        if app.is_json() {
            json::print(&serde_json::json!({ "instance": args.name, "set": key }))?;
        } else {
            app.output.success(&format!("Stored {key} for {}", args.name));
            app.output.info(&format!(
                "Apply it with: hatchery config {} --push",
                args.name
            ));
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.push {
        let shell = app.shell();
        let reporter = TerminalReporter::new(&app.output);
        reporter.step(&format!("pushing secrets to {}...", args.name));
        let keys = config_push::push(&shell, &app.instances, &app.secrets, &args.name).await?;
        reporter.success(&format!("{} key(s) written", keys.len()));
        drop(reporter);
        if app.is_json() {
            json::print(&serde_json::json!({ "instance": args.name, "pushed": keys }))?;
        } else {
            for key in &keys {
                app.output.kv("-", key);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let masked = config_push::show(&app.instances, &app.secrets, &args.name).await?;
    if app.is_json() {
        let secrets: serde_json::Map<String, serde_json::Value> = masked
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        json::print(&serde_json::json!({ "instance": args.name, "secrets": secrets }))?;
    } else {
        HumanRenderer::new(&app.output).render_secrets(&args.name, &masked);
    }
    Ok(ExitCode::SUCCESS)
}
