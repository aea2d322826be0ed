//! Application service: fix use-case: diagnose, repair once, verify, and
//! escalate to the parent when the repair did not hold.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::Result;
use chrono::Utc;
use hatchery_common::Instance;
use tracing::{info, warn};

use crate::application::ports::{
    EscalationNotifier, InstanceRepository, KnowledgeSearch, ProgressReporter, RemoteShell,
    RepairAgent,
};
use crate::application::services::diagnose::{DiagnoseSettings, probe, record_report};
use crate::application::services::instance;
use crate::domain::error::RemediationError;
use crate::domain::health::DiagnosticReport;
use crate::domain::remediation::{
    EscalationNotice, EscalationReason, FixOutcome, KnowledgeHint, RemediationAttempt,
    RemediationNote, RemediationPolicy, RepairRequest, escalation_reasons,
};

/// Collaborators of a fix run.
pub struct RemediationPorts<'a, K, A, N> {
    pub knowledge: &'a K,
    pub agent: &'a A,
    pub notifier: &'a N,
}

#[derive(Debug, Clone, Default)]
pub struct FixSettings {
    pub diagnose: DiagnoseSettings,
    pub policy: RemediationPolicy,
}

/// Diagnose `name` and, if anything failed, run one repair and verify it.
///
/// # Errors
///
/// Returns an error for an unknown instance, a transport failure on the
/// first diagnosis, `RemediationError::ActionFailed` when the repair agent
/// fails (an escalation is still attempted and its delivery is stated in the
/// error context), or a store failure.
pub async fn fix<K, A, N>(
    shell: &impl RemoteShell,
    repo: &impl InstanceRepository,
    ports: &RemediationPorts<'_, K, A, N>,
    reporter: &impl ProgressReporter,
    name: &str,
    settings: &FixSettings,
) -> Result<FixOutcome>
where
    K: KnowledgeSearch,
    A: RepairAgent,
    N: EscalationNotifier,
{
    let policy = &settings.policy;
    let mut instance = instance::resolve(repo, name).await?;

    reporter.step(&format!("diagnosing {name}..."));
    let initial = match probe(shell, &instance, &settings.diagnose).await {
        Ok(report) => report,
        Err(err) => {
            let report = DiagnosticReport::unreachable(name, &err, Utc::now());
            record_report(&mut instance, &report);
            repo.put(&instance).await?;
            return Err(err.into());
        }
    };
    record_report(&mut instance, &initial);

    if initial.checks_failed == 0 {
        if policy.accumulate_across_runs {
            instance.remediation_failures = 0;
        }
        repo.put(&instance).await?;
        reporter.success(&format!("{name} is healthy, nothing to fix"));
        return Ok(FixOutcome::healthy(name));
    }
    repo.put(&instance).await?;

    let mut notes = Vec::new();
    let hints = gather_hints(ports.knowledge, &initial, &mut notes).await;

    let request = RepairRequest {
        instance: name.to_string(),
        report: initial.clone(),
        hints,
        max_attempts_per_issue: policy.max_attempts_per_issue,
    };
    reporter.step(&format!(
        "repairing {} issue(s) on {name}...",
        initial.checks_failed
    ));
    let repair = match ports.agent.repair(&instance, &request).await {
        Ok(repair) => repair,
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(instance = %name, "repair agent failed: {reason}");
            let reasons = vec![EscalationReason::AgentFailed {
                reason: reason.clone(),
            }];
            let notice = EscalationNotice::new(&initial, None, &reasons);
            let delivered = send_notice(ports.notifier, &instance, &notice, &mut notes).await;
            if policy.accumulate_across_runs {
                instance.remediation_failures += 1;
                repo.put(&instance).await?;
            }
            let delivery = if delivered {
                "escalation sent to parent".to_string()
            } else {
                let detail = notes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("escalation not delivered ({detail})")
            };
            return Err(anyhow::Error::from(RemediationError::ActionFailed {
                instance: name.to_string(),
                reason,
            })
            .context(format!("repair of {name} failed; {delivery}")));
        }
    };
    info!(
        instance = %name,
        fixed = repair.fixed,
        escalated = repair.escalated,
        "repair agent finished"
    );

    if policy.verify_delay_secs > 0 {
        reporter.step(&format!(
            "waiting {}s before verifying...",
            policy.verify_delay_secs
        ));
        tokio::time::sleep(policy.verify_delay()).await;
    }
    let verification = match probe(shell, &instance, &settings.diagnose).await {
        Ok(report) => report,
        Err(err) => DiagnosticReport::unreachable(name, &err, Utc::now()),
    };

    let prior_failures = instance.remediation_failures;
    let escalation = escalation_reasons(&repair, &verification, policy, prior_failures);
    if repair.fixed > 0 && verification.checks_failed > 0 {
        notes.push(RemediationNote::PartialRemediation {
            fixed: repair.fixed,
            remaining: verification.checks_failed,
        });
    }

    let mut escalation_delivered = false;
    if !escalation.is_empty() {
        let notice = EscalationNotice::new(&verification, Some(&repair), &escalation);
        escalation_delivered = send_notice(ports.notifier, &instance, &notice, &mut notes).await;
    }

    record_report(&mut instance, &verification);
    let verified_clean = !verification.is_transport_failure() && verification.checks_failed == 0;
    if policy.accumulate_across_runs {
        instance.remediation_failures = if verified_clean {
            0
        } else {
            prior_failures + 1
        };
    }
    repo.put(&instance).await?;

    if escalation.is_empty() {
        reporter.success(&format!("{name}: {} fixed, verified healthy", repair.fixed));
    } else {
        reporter.warn(&format!("{name}: escalated ({} reason(s))", escalation.len()));
    }

    Ok(FixOutcome {
        instance: name.to_string(),
        healthy: false,
        fixed: repair.fixed,
        escalated: repair.escalated,
        attempt: Some(RemediationAttempt {
            attempt_number: if policy.accumulate_across_runs {
                prior_failures + 1
            } else {
                1
            },
            issues_found: initial.checks_failed,
            issues_fixed: repair.fixed,
            issues_escalated: repair.escalated,
            timestamp: Utc::now(),
        }),
        fixes: repair.fixes,
        verification: Some(verification),
        escalation,
        escalation_delivered,
        notes,
    })
}

/// One knowledge query per failing check. Stops at the first failure of the
/// collaborator and records it.
async fn gather_hints(
    knowledge: &impl KnowledgeSearch,
    report: &DiagnosticReport,
    notes: &mut Vec<RemediationNote>,
) -> Vec<KnowledgeHint> {
    let mut hints = Vec::new();
    for check in report.failing() {
        let query = format!("{} {}", check.id.label(), check.detail);
        match knowledge.search(&query).await {
            Ok(solutions) => hints.push(KnowledgeHint {
                issue: format!("{}: {}", check.id.label(), check.detail),
                solutions,
            }),
            Err(e) => {
                warn!("knowledge search unavailable: {e:#}");
                notes.push(RemediationNote::CollaboratorUnavailable {
                    collaborator: "knowledge".to_string(),
                    reason: format!("{e:#}"),
                });
                break;
            }
        }
    }
    hints
}

/// Deliver `notice` to the instance's parent. Returns whether it arrived.
async fn send_notice(
    notifier: &impl EscalationNotifier,
    instance: &Instance,
    notice: &EscalationNotice,
    notes: &mut Vec<RemediationNote>,
) -> bool {
    match notifier.notify(&instance.parent_notify, notice).await {
        Ok(()) => {
            info!(instance = %instance.name, "escalation sent to parent");
            true
        }
        Err(e) => {
            warn!(instance = %instance.name, "escalation not delivered: {e:#}");
            notes.push(RemediationNote::CollaboratorUnavailable {
                collaborator: "notifier".to_string(),
                reason: format!("{e:#}"),
            });
            false
        }
    }
}
