//! Remediation policy, repair-agent contract, and escalation rules.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hatchery_common::REPAIR_DELIMITER;

use crate::domain::health::{DiagnosticReport, OverallState};
use crate::domain::probe::{prelude, shell_quote};

// ── Policy ────────────────────────────────────────────────────────────────────

/// Limits applied to one `fix` run. Loaded from the `remediation` section of
/// the app config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationPolicy {
    /// Passed to the repair agent: how often it may retry one issue.
    pub max_attempts_per_issue: u32,
    /// Attempts at or above this escalate to the parent.
    pub escalation_threshold: u32,
    /// Pause between the repair and the verification probe.
    pub verify_delay_secs: u64,
    /// Count failed runs in the instance record and escalate once the
    /// threshold is reached across invocations.
    pub accumulate_across_runs: bool,
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_issue: 3,
            escalation_threshold: 3,
            verify_delay_secs: 5,
            accumulate_across_runs: false,
        }
    }
}

impl RemediationPolicy {
    #[must_use]
    pub fn verify_delay(&self) -> Duration {
        Duration::from_secs(self.verify_delay_secs)
    }
}

// ── Collaborator contracts ────────────────────────────────────────────────────

/// A previously recorded fix returned by the knowledge collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorSolution {
    pub title: String,
    pub solution: String,
    #[serde(default)]
    pub score: f64,
}

/// Knowledge results for one failing check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeHint {
    pub issue: String,
    pub solutions: Vec<PriorSolution>,
}

/// Everything the repair agent is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    pub instance: String,
    pub report: DiagnosticReport,
    pub hints: Vec<KnowledgeHint>,
    pub max_attempts_per_issue: u32,
}

/// One fix attempted by the repair agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairFix {
    pub issue: String,
    #[serde(default)]
    pub action: String,
    /// Free text: `fixed`, `failed`, `escalated`, ...
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub attempts: u32,
}

/// The repair agent's own account of what it did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub fixed: u32,
    pub escalated: u32,
    #[serde(default)]
    pub fixes: Vec<RepairFix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Prompt handed to the on-box agent.
#[must_use]
pub fn render_prompt(request: &RepairRequest) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are repairing the agent gateway on instance '{}'. The latest diagnostic found these problems:",
        request.instance
    );
    for issue in request.report.issues() {
        let _ = writeln!(prompt, "- {issue}");
    }
    let with_solutions: Vec<&KnowledgeHint> =
        request.hints.iter().filter(|h| !h.solutions.is_empty()).collect();
    if !with_solutions.is_empty() {
        let _ = writeln!(prompt, "\nFixes that worked elsewhere:");
        for hint in with_solutions {
            for s in &hint.solutions {
                let _ = writeln!(prompt, "- [{}] {}: {}", hint.issue, s.title, s.solution);
            }
        }
    }
    let _ = writeln!(
        prompt,
        "\nFix each problem. Try at most {} times per problem; if it still fails, stop and mark it escalated.",
        request.max_attempts_per_issue
    );
    let _ = writeln!(
        prompt,
        "Do not delete the identity in ~/.amcp or any session data. When done, print a line containing only {REPAIR_DELIMITER} followed by JSON:"
    );
    let _ = write!(
        prompt,
        r#"{{"fixed":<n>,"escalated":<n>,"fixes":[{{"issue":"...","action":"...","outcome":"fixed|failed|escalated","attempts":<n>}}],"summary":"..."}}"#
    );
    prompt
}

/// Script running the on-box agent non-interactively as the service user.
/// The prompt goes through a private temp file so its size and quoting never
/// touch the command line; the login shell opens it and feeds it on stdin.
#[must_use]
pub fn repair_script(prompt: &str) -> String {
    let mut script = prelude();
    let _ = write!(
        script,
        r#"PROMPT={prompt}
F=$(mktemp)
printf '%s' "$PROMPT" >"$F"
as_svc 'claude -p --dangerously-skip-permissions' <"$F" 2>&1
rm -f "$F"
"#,
        prompt = shell_quote(prompt),
    );
    script
}

/// Decode the agent's result: the first JSON value after the last
/// `---REPAIR---` line.
///
/// # Errors
///
/// Returns a reason string when the delimiter is absent or the JSON is
/// unusable.
pub fn parse_repair_report(output: &str) -> Result<RepairReport, String> {
    let Some(idx) = output.rfind(REPAIR_DELIMITER) else {
        return Err("repair agent printed no result".to_string());
    };
    let rest = output[idx + REPAIR_DELIMITER.len()..].trim_start();
    serde_json::Deserializer::from_str(rest)
        .into_iter::<RepairReport>()
        .next()
        .ok_or_else(|| "repair agent result is empty".to_string())?
        .map_err(|e| format!("repair agent result is not valid JSON: {e}"))
}

// ── Escalation ────────────────────────────────────────────────────────────────

/// Why a run escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationReason {
    AgentEscalated { count: u32 },
    AttemptsExhausted { issue: String, attempts: u32 },
    StillFailing { checks_failed: usize },
    RepeatedFailures { runs: u32 },
    AgentFailed { reason: String },
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AgentEscalated { count } => write!(f, "repair agent escalated {count} issue(s)"),
            Self::AttemptsExhausted { issue, attempts } => {
                write!(f, "'{issue}' still failing after {attempts} attempts")
            }
            Self::StillFailing { checks_failed } => {
                write!(f, "{checks_failed} check(s) still failing after repair")
            }
            Self::RepeatedFailures { runs } => write!(f, "{runs} consecutive failed repair runs"),
            Self::AgentFailed { reason } => write!(f, "repair agent failed: {reason}"),
        }
    }
}

/// Apply the escalation rules. An empty result means no escalation.
///
/// `prior_failures` is only consulted when the policy accumulates across
/// runs.
#[must_use]
pub fn escalation_reasons(
    repair: &RepairReport,
    verification: &DiagnosticReport,
    policy: &RemediationPolicy,
    prior_failures: u32,
) -> Vec<EscalationReason> {
    let mut reasons = Vec::new();
    if repair.escalated > 0 {
        reasons.push(EscalationReason::AgentEscalated {
            count: repair.escalated,
        });
    }
    for fix in &repair.fixes {
        if fix.attempts >= policy.escalation_threshold {
            reasons.push(EscalationReason::AttemptsExhausted {
                issue: fix.issue.clone(),
                attempts: fix.attempts,
            });
        }
    }
    let still_failing = verification.is_transport_failure() || verification.checks_failed > 0;
    if still_failing {
        reasons.push(EscalationReason::StillFailing {
            checks_failed: verification.checks_failed,
        });
        if policy.accumulate_across_runs && prior_failures + 1 >= policy.escalation_threshold {
            reasons.push(EscalationReason::RepeatedFailures {
                runs: prior_failures + 1,
            });
        }
    }
    reasons
}

/// Message sent to the parent when a run escalates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationNotice {
    pub instance: String,
    pub state: OverallState,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub issues: Vec<String>,
    pub agent_summary: String,
    pub reasons: Vec<String>,
}

impl EscalationNotice {
    #[must_use]
    pub fn new(
        report: &DiagnosticReport,
        repair: Option<&RepairReport>,
        reasons: &[EscalationReason],
    ) -> Self {
        let agent_summary = match repair {
            Some(r) => r.summary.clone().unwrap_or_else(|| {
                format!("{} fixed, {} escalated", r.fixed, r.escalated)
            }),
            None => "repair agent did not run".to_string(),
        };
        Self {
            instance: report.instance.clone(),
            state: report.overall_state,
            checks_passed: report.checks_passed,
            checks_failed: report.checks_failed,
            issues: report.issues(),
            agent_summary,
            reasons: reasons.iter().map(ToString::to_string).collect(),
        }
    }

    /// Plain-text body for chat delivery.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut text = format!(
            "Instance {} needs attention ({})\n{} passed, {} failed\n",
            self.instance,
            self.state.as_str(),
            self.checks_passed,
            self.checks_failed
        );
        for issue in &self.issues {
            let _ = writeln!(text, "- {issue}");
        }
        let _ = writeln!(text, "Repair: {}", self.agent_summary);
        for reason in &self.reasons {
            let _ = writeln!(text, "Escalated: {reason}");
        }
        text
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Non-fatal conditions recorded on a fix result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemediationNote {
    PartialRemediation { fixed: u32, remaining: usize },
    CollaboratorUnavailable { collaborator: String, reason: String },
}

impl std::fmt::Display for RemediationNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PartialRemediation { fixed, remaining } => {
                write!(f, "partial remediation: {fixed} fixed, {remaining} remaining")
            }
            Self::CollaboratorUnavailable {
                collaborator,
                reason,
            } => write!(f, "{collaborator} unavailable: {reason}"),
        }
    }
}

/// Bookkeeping for one remediation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationAttempt {
    pub attempt_number: u32,
    pub issues_found: usize,
    pub issues_fixed: u32,
    pub issues_escalated: u32,
    pub timestamp: DateTime<Utc>,
}

/// Result of `fix`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixOutcome {
    pub instance: String,
    /// The first diagnosis found nothing to fix.
    pub healthy: bool,
    /// Reported by the repair agent, verbatim.
    pub fixed: u32,
    /// Reported by the repair agent, verbatim.
    pub escalated: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<RemediationAttempt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixes: Vec<RepairFix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<DiagnosticReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalation: Vec<EscalationReason>,
    /// The notice reached the parent.
    pub escalation_delivered: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<RemediationNote>,
}

impl FixOutcome {
    /// Outcome for an instance that needed no repair.
    #[must_use]
    pub fn healthy(instance: &str) -> Self {
        Self {
            instance: instance.to_string(),
            healthy: true,
            fixed: 0,
            escalated: 0,
            attempt: None,
            fixes: Vec::new(),
            verification: None,
            escalation: Vec::new(),
            escalation_delivered: false,
            notes: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_escalated(&self) -> bool {
        !self.escalation.is_empty()
    }
}
