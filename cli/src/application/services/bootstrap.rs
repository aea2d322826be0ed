//! Application service: AMCP bootstrap (`setup-amcp`) use-case.
//!
//! Probe once, plan with the pure planner, then execute the plan's mutating
//! steps in order. Dry runs stop after planning, so both modes share one
//! plan.

use anyhow::Result;
use chrono::Utc;
use hatchery_common::{AmcpStatus, Instance};
use tracing::{debug, info, warn};

use crate::application::ports::{
    ConfigPusher, InstanceRepository, ProgressReporter, RemoteShell,
};
use crate::application::services::instance;
use crate::domain::bootstrap::{
    BootstrapReport, BootstrapStep, Capability, PlannedAction, StepOutcome, StepReport,
    action_script, bootstrap_probe_script, capability_probe_script, decode_bootstrap_probe,
    decode_capability, installer_blocks, plan_bootstrap,
};
use crate::domain::error::{BootstrapError, TransportError};
use crate::domain::probe::{ActionResult, classify_result, parse_sections};

#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapOptions {
    /// Recreate the identity even if one exists.
    pub force: bool,
    /// Report the plan without executing it.
    pub dry_run: bool,
}

/// Bring the instance's AMCP capabilities to the target state.
///
/// Step failures are reported in the returned report; the instance is only
/// marked `bootstrapped` when every step succeeded.
///
/// # Errors
///
/// Returns an error for an unknown instance, a transport failure at any
/// point (probe, action, or verification), a malformed probe, or
/// `BootstrapError::InstallerUnavailable`. Nothing is persisted in those
/// cases.
pub async fn setup_amcp(
    shell: &impl RemoteShell,
    pusher: &impl ConfigPusher,
    repo: &impl InstanceRepository,
    reporter: &impl ProgressReporter,
    name: &str,
    options: BootstrapOptions,
) -> Result<BootstrapReport> {
    let mut instance = instance::resolve(repo, name).await?;

    reporter.step("probing AMCP capabilities...");
    let output = shell.run_script(&instance, &bootstrap_probe_script()).await?;
    let probe = decode_bootstrap_probe(&parse_sections(&output))?;

    if let Some(missing) = installer_blocks(&probe) {
        return Err(BootstrapError::InstallerUnavailable {
            instance: name.to_string(),
            missing: missing
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
        .into());
    }

    let plan = plan_bootstrap(&probe, options.force);
    debug!(instance = %name, steps = ?plan, "bootstrap plan");

    if options.dry_run {
        let steps = plan
            .into_iter()
            .map(|step| {
                let outcome = if step.planned_action.is_mutating() {
                    StepOutcome::Planned
                } else {
                    StepOutcome::Skipped
                };
                StepReport { step, outcome }
            })
            .collect();
        return Ok(BootstrapReport {
            instance: name.to_string(),
            dry_run: true,
            installer: probe.installer,
            steps,
        });
    }

    let mut steps = Vec::with_capacity(plan.len());
    let mut aborted = false;
    let mut checkpoint_cid = None;
    for step in plan {
        let outcome = if aborted {
            StepOutcome::NotRun
        } else if !step.planned_action.is_mutating() {
            StepOutcome::Skipped
        } else {
            reporter.step(&format!(
                "{} {}...",
                step.planned_action.as_str(),
                step.capability.label()
            ));
            match execute_step(shell, pusher, &instance, &step).await {
                Ok(detail) => {
                    reporter.success(&format!("{} ready", step.capability.label()));
                    if step.capability == Capability::FirstCheckpoint {
                        checkpoint_cid.clone_from(&detail);
                    }
                    StepOutcome::Done { detail }
                }
                Err(StepError::Transport(e)) => {
                    warn!(instance = %name, step = %step.capability, "bootstrap aborted: {e}");
                    return Err(e.into());
                }
                Err(StepError::Failed(reason)) => {
                    warn!(instance = %name, step = %step.capability, "bootstrap step failed: {reason}");
                    reporter.warn(&format!("{} failed: {reason}", step.capability.label()));
                    aborted = true;
                    StepOutcome::Failed { reason }
                }
            }
        };
        steps.push(StepReport { step, outcome });
    }

    let report = BootstrapReport {
        instance: name.to_string(),
        dry_run: false,
        installer: probe.installer,
        steps,
    };

    if report.succeeded() {
        instance.amcp_status = AmcpStatus::Bootstrapped;
        if let Some(cid) = checkpoint_cid.filter(|c| !c.is_empty()) {
            instance.last_checkpoint_cid = Some(cid);
            instance.last_checkpoint_at = Some(Utc::now());
        }
        repo.put(&instance).await?;
        info!(instance = %name, done = report.done(), "AMCP bootstrapped");
    }
    Ok(report)
}

/// Why a step did not complete.
enum StepError {
    /// The step ran and did not reach its post-condition.
    Failed(String),
    /// The child could not be reached; the whole run aborts.
    Transport(TransportError),
}

impl From<TransportError> for StepError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<String> for StepError {
    fn from(reason: String) -> Self {
        Self::Failed(reason)
    }
}

/// Run one step and verify its post-condition.
async fn execute_step(
    shell: &impl RemoteShell,
    pusher: &impl ConfigPusher,
    instance: &Instance,
    step: &BootstrapStep,
) -> Result<Option<String>, StepError> {
    let detail = if step.planned_action == PlannedAction::Push {
        let keys = pusher
            .push(instance)
            .await
            .map_err(|e| match e.downcast::<TransportError>() {
                Ok(transport) => StepError::Transport(transport),
                Err(e) => StepError::Failed(format!("{e:#}")),
            })?;
        Some(format!("{} key(s) pushed", keys.len()))
    } else {
        let Some(script) = action_script(step.capability, step.planned_action) else {
            return Ok(None);
        };
        let output = shell.run_script(instance, &script).await?;
        match classify_result(&output) {
            ActionResult::Ok(detail) => detail.filter(|d| !d.is_empty()),
            ActionResult::Failed(reason) => return Err(reason.into()),
            ActionResult::NoMarker => {
                return Err(StepError::Failed(
                    "action ended without reporting a result".to_string(),
                ));
            }
        }
    };

    let output = shell
        .run_script(instance, &capability_probe_script(step.capability))
        .await?;
    let state = decode_capability(step.capability, &parse_sections(&output))
        .map_err(|e| StepError::Failed(e.to_string()))?;
    if !state.is_present() {
        return Err(StepError::Failed(format!(
            "{} still missing after {}",
            step.capability.label(),
            step.planned_action.as_str()
        )));
    }
    if step.capability == Capability::Identity
        && let Some(previous) = step.current_state.handle()
        && state.handle() == Some(previous)
    {
        return Err(StepError::Failed(format!(
            "identity unchanged after {}",
            step.planned_action.as_str()
        )));
    }
    Ok(detail.or_else(|| state.handle().map(str::to_string)))
}
