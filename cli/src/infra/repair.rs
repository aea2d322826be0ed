//! Repair agent: the on-box coding agent, driven over the remote shell.

use anyhow::Result;
use hatchery_common::Instance;
use tracing::info;

use crate::application::ports::{RemoteShell, RepairAgent};
use crate::domain::error::RemediationError;
use crate::domain::remediation::{
    RepairReport, RepairRequest, parse_repair_report, render_prompt, repair_script,
};

/// Runs `claude -p` on the child as the service user and decodes its
/// `---REPAIR---` result.
pub struct RemoteRepairAgent<S> {
    shell: S,
}

impl<S: RemoteShell> RemoteRepairAgent<S> {
    #[must_use]
    pub fn new(shell: S) -> Self {
        Self { shell }
    }
}

impl<S: RemoteShell> RepairAgent for RemoteRepairAgent<S> {
    async fn repair(&self, instance: &Instance, request: &RepairRequest) -> Result<RepairReport> {
        let script = repair_script(&render_prompt(request));
        info!(instance = %instance.name, issues = request.report.checks_failed, "starting repair agent");
        let output = self.shell.run_script(instance, &script).await?;
        parse_repair_report(&output).map_err(|reason| {
            RemediationError::ActionFailed {
                instance: instance.name.clone(),
                reason,
            }
            .into()
        })
    }
}
