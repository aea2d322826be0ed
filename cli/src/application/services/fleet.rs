//! Application service: diagnose every managed instance.
//!
//! Runs on the caller's task with bounded concurrency; instances never share
//! a remote session and one failure never touches another's result.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::warn;

use crate::application::ports::{InstanceRepository, ProgressReporter, RemoteShell};
use crate::application::services::diagnose::{DiagnoseSettings, probe, record_report};
use crate::domain::error::TransportError;
use crate::domain::health::{DiagnosticReport, OverallState};

/// Aggregated result of `diagnose --all`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetReport {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub offline: usize,
    pub unreachable: usize,
    /// One report per instance, sorted by name.
    pub reports: Vec<DiagnosticReport>,
    /// Instances whose report could not be written to the local store.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub record_failures: Vec<RecordFailure>,
}

/// A diagnosis that was made but not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub instance: String,
    pub message: String,
}

impl FleetReport {
    fn from_results(results: Vec<(DiagnosticReport, Option<RecordFailure>)>) -> Self {
        let (mut reports, failures): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        let mut record_failures: Vec<RecordFailure> = failures.into_iter().flatten().collect();
        reports.sort_by(|a, b| a.instance.cmp(&b.instance));
        record_failures.sort_by(|a, b| a.instance.cmp(&b.instance));
        let count = |state| reports.iter().filter(|r| r.overall_state == state).count();
        Self {
            total: reports.len(),
            healthy: count(OverallState::Healthy),
            degraded: count(OverallState::Degraded),
            offline: count(OverallState::Offline),
            unreachable: count(OverallState::Unreachable),
            reports,
            record_failures,
        }
    }
}

/// Diagnose all instances, at most `parallelism` at a time.
///
/// Each instance's probe gets `deadline`; an instance that exceeds it is
/// reported unreachable. A report that cannot be stored is still returned,
/// and the store error is listed in `record_failures`.
///
/// # Errors
///
/// Returns an error only if the store cannot be listed.
pub async fn diagnose_all(
    shell: &impl RemoteShell,
    repo: &impl InstanceRepository,
    reporter: &impl ProgressReporter,
    settings: &DiagnoseSettings,
    parallelism: usize,
    deadline: Duration,
) -> Result<FleetReport> {
    let instances = repo.list().await?;
    reporter.step(&format!("probing {} instance(s)...", instances.len()));

    let results: Vec<(DiagnosticReport, Option<RecordFailure>)> = stream::iter(instances)
        .map(|mut instance| async move {
            let name = instance.name.clone();
            let report = match tokio::time::timeout(deadline, probe(shell, &instance, settings)).await
            {
                Ok(Ok(report)) => report,
                Ok(Err(err)) => DiagnosticReport::unreachable(&name, &err, Utc::now()),
                Err(_) => {
                    warn!(instance = %name, "diagnosis deadline exceeded");
                    let err = TransportError::Unreachable {
                        instance: name.clone(),
                        reason: format!("no answer within {}s", deadline.as_secs()),
                    };
                    DiagnosticReport::unreachable(&name, &err, Utc::now())
                }
            };
            record_report(&mut instance, &report);
            let failure = repo.put(&instance).await.err().map(|e| {
                warn!(instance = %name, "could not record diagnosis: {e:#}");
                RecordFailure {
                    instance: name,
                    message: format!("{e:#}"),
                }
            });
            (report, failure)
        })
        .buffer_unordered(parallelism.max(1))
        .collect()
        .await;

    let fleet = FleetReport::from_results(results);
    reporter.success(&format!(
        "{} healthy, {} degraded, {} offline, {} unreachable",
        fleet.healthy, fleet.degraded, fleet.offline, fleet.unreachable
    ));
    Ok(fleet)
}
