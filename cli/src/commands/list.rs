//! `hatchery list`: managed instances from the local store.

use std::process::ExitCode;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use hatchery_common::{AmcpStatus, Instance, InstanceStatus};
use serde::Serialize;

use crate::app::AppContext;
use crate::application::services::instance;
use crate::output::human::HumanRenderer;
use crate::output::json;

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Only show instances with this status
    #[arg(long, value_enum)]
    pub status: Option<InstanceStatus>,
}

/// JSON row for one instance. Credentials and notify targets are left out.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceRow<'a> {
    name: &'a str,
    ip: &'a str,
    region: &'a str,
    status: InstanceStatus,
    amcp_status: AmcpStatus,
    last_checkpoint_cid: Option<&'a str>,
    last_checkpoint_at: Option<DateTime<Utc>>,
    last_diagnosed_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Instance> for InstanceRow<'a> {
    fn from(instance: &'a Instance) -> Self {
        Self {
            name: &instance.name,
            ip: &instance.ip,
            region: &instance.region,
            status: instance.status,
            amcp_status: instance.amcp_status,
            last_checkpoint_cid: instance.last_checkpoint_cid.as_deref(),
            last_checkpoint_at: instance.last_checkpoint_at,
            last_diagnosed_at: instance.last_diagnosed_at,
        }
    }
}

/// Run the list command.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn run(app: &AppContext, args: &ListArgs) -> Result<ExitCode> {
    let instances = instance::list(&app.instances, args.status).await?;
    if app.is_json() {
        let rows: Vec<InstanceRow<'_>> = instances.iter().map(InstanceRow::from).collect();
        json::print(&rows)?;
    } else {
        HumanRenderer::new(&app.output).render_instances(&instances);
    }
    Ok(ExitCode::SUCCESS)
}
