//! Application service: checkpoint use-case.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::application::ports::{InstanceRepository, ProgressReporter, RemoteShell};
use crate::application::services::instance;
use crate::domain::checkpoint::{
    CID_NOT_CAPTURED, CheckpointMode, CheckpointOutcome, checkpoint_script, cid_from_state_file,
    extract_cid, principal_probe_script, resolve_principal, state_file_script,
};
use crate::domain::error::CheckpointError;
use crate::domain::probe::{ActionResult, action_output, classify_result, parse_sections};

/// Take a checkpoint as the gateway's principal and record its CID.
///
/// A run whose CID cannot be found still succeeds, with a warning and the
/// stored metadata left as it was.
///
/// # Errors
///
/// Returns an error for an unknown instance, a transport failure, or
/// `CheckpointError::ActionFailed` when the checkpoint command fails.
pub async fn checkpoint(
    shell: &impl RemoteShell,
    repo: &impl InstanceRepository,
    reporter: &impl ProgressReporter,
    name: &str,
    mode: CheckpointMode,
) -> Result<CheckpointOutcome> {
    let mut instance = instance::resolve(repo, name).await?;

    reporter.step("resolving gateway principal...");
    let output = shell.run_script(&instance, &principal_probe_script()).await?;
    let principal =
        resolve_principal(&parse_sections(&output)).unwrap_or_else(|| instance.ssh_user.clone());

    reporter.step(&format!("running {} as {principal}...", mode.subcommand()));
    let output = shell
        .run_script(&instance, &checkpoint_script(&principal, mode))
        .await?;
    match classify_result(&output) {
        ActionResult::Ok(_) => {}
        ActionResult::Failed(reason) => {
            return Err(CheckpointError::ActionFailed {
                instance: name.to_string(),
                reason,
            }
            .into());
        }
        ActionResult::NoMarker => {
            return Err(CheckpointError::ActionFailed {
                instance: name.to_string(),
                reason: "checkpoint ended without reporting a result".to_string(),
            }
            .into());
        }
    }

    let mut cid = extract_cid(&action_output(&output));
    if cid.is_none() {
        match shell.run_script(&instance, &state_file_script(&principal)).await {
            Ok(state) => cid = cid_from_state_file(&state),
            Err(e) => warn!(instance = %name, "could not read checkpoint state file: {e}"),
        }
    }

    let warning = if let Some(cid) = &cid {
        instance.last_checkpoint_cid = Some(cid.clone());
        instance.last_checkpoint_at = Some(Utc::now());
        repo.put(&instance).await?;
        info!(instance = %name, %cid, "checkpoint recorded");
        reporter.success(&format!("checkpoint {cid}"));
        None
    } else {
        warn!(instance = %name, "checkpoint succeeded but {CID_NOT_CAPTURED}");
        reporter.warn(&format!("checkpoint taken, {CID_NOT_CAPTURED}"));
        Some(CID_NOT_CAPTURED.to_string())
    };

    Ok(CheckpointOutcome {
        instance: name.to_string(),
        mode,
        principal,
        cid,
        warning,
    })
}
