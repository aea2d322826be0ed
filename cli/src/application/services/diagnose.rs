//! Application service: diagnose use-case.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All I/O is routed through injected port traits.

use anyhow::Result;
use chrono::Utc;
use hatchery_common::{AmcpStatus, Instance};
use tracing::{debug, info, warn};

use crate::application::ports::{InstanceRepository, ProgressReporter, RemoteShell};
use crate::application::services::instance;
use crate::domain::config::AppConfig;
use crate::domain::error::TransportError;
use crate::domain::health::{DiagnosticReport, Thresholds};
use crate::domain::probe::{decode_diagnostic, diagnostic_script};

/// Inputs to a diagnostic run that come from the app config.
#[derive(Debug, Clone, Default)]
pub struct DiagnoseSettings {
    pub thresholds: Thresholds,
    /// Expected gateway principal for the `principal` check.
    pub service_user: String,
}

impl From<&AppConfig> for DiagnoseSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            service_user: config.child.service_user.clone(),
        }
    }
}

/// Diagnose one instance by name and persist the result.
///
/// A transport failure is not an error here: it yields an `Unreachable`
/// report, which is persisted like any other.
///
/// # Errors
///
/// Returns an error for an invalid or unknown name, or if the store fails.
pub async fn diagnose(
    shell: &impl RemoteShell,
    repo: &impl InstanceRepository,
    reporter: &impl ProgressReporter,
    name: &str,
    settings: &DiagnoseSettings,
) -> Result<DiagnosticReport> {
    let instance = instance::resolve(repo, name).await?;
    reporter.step(&format!("probing {name}..."));
    let report = diagnose_record(shell, repo, instance, settings).await?;
    if report.is_transport_failure() {
        reporter.warn(&format!("{name} could not be reached"));
    } else {
        reporter.success(&format!(
            "{name}: {} passed, {} failed",
            report.checks_passed, report.checks_failed
        ));
    }
    Ok(report)
}

/// Diagnose an already-loaded record and persist the result.
///
/// # Errors
///
/// Returns an error only if the store write fails.
pub async fn diagnose_record(
    shell: &impl RemoteShell,
    repo: &impl InstanceRepository,
    mut instance: Instance,
    settings: &DiagnoseSettings,
) -> Result<DiagnosticReport> {
    let report = match probe(shell, &instance, settings).await {
        Ok(report) => report,
        Err(err) => DiagnosticReport::unreachable(&instance.name, &err, Utc::now()),
    };
    record_report(&mut instance, &report);
    repo.put(&instance).await?;
    Ok(report)
}

/// Run the battery without persisting anything.
///
/// # Errors
///
/// Returns the transport error if the session could not be completed.
pub async fn probe(
    shell: &impl RemoteShell,
    instance: &Instance,
    settings: &DiagnoseSettings,
) -> Result<DiagnosticReport, TransportError> {
    let script = diagnostic_script(&settings.service_user);
    debug!(instance = %instance.name, bytes = script.len(), "running diagnostic probe");
    let output = shell.run_script(instance, &script).await.inspect_err(|e| {
        warn!(instance = %instance.name, code = e.code(), "diagnostic probe failed: {e}");
    })?;
    let report = decode_diagnostic(&instance.name, &output, &settings.thresholds, Utc::now());
    info!(
        instance = %instance.name,
        state = report.overall_state.as_str(),
        failed = report.checks_failed,
        "diagnosed"
    );
    Ok(report)
}

/// Copy a report's conclusions into the record.
///
/// AMCP is only marked degraded when it was bootstrapped; a later clean
/// bootstrap restores it.
pub fn record_report(instance: &mut Instance, report: &DiagnosticReport) {
    instance.status = report.overall_state.into();
    instance.last_diagnosed_at = Some(report.probed_at);
    if instance.amcp_status == AmcpStatus::Bootstrapped && report.amcp_broken() {
        instance.amcp_status = AmcpStatus::Degraded;
    }
}
