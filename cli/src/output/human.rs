//! Human-readable terminal renderer.
//!
//! Every summary ends with explicit counts, and transport failures ("could
//! not even try") are rendered apart from failing checks ("tried and still
//! broken").

use hatchery_common::Instance;
use owo_colors::OwoColorize as _;

use crate::application::services::fleet::FleetReport;
use crate::domain::bootstrap::{BootstrapReport, StepOutcome};
use crate::domain::checkpoint::CheckpointOutcome;
use crate::domain::health::{DiagnosticReport, Outcome, OverallState};
use crate::domain::remediation::FixOutcome;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render one diagnostic report, grouped by category.
    pub fn render_report(&self, report: &DiagnosticReport) {
        if self.ctx.quiet {
            return;
        }
        println!();
        println!(
            "  {} {}",
            report.instance.style(self.ctx.styles.header),
            self.state_label(report.overall_state)
        );
        if let Some(err) = &report.transport_error {
            println!();
            self.ctx.error(&err.message);
            self.ctx.info("No checks ran.");
            println!();
            return;
        }
        for (category, checks) in report.by_category() {
            println!();
            println!("  {}", category.title().style(self.ctx.styles.bold));
            for check in checks {
                let line = format!("{:<18} {}", check.id.label(), check.detail);
                match check.outcome {
                    Outcome::Ok => self.ctx.success(&line),
                    Outcome::Warn => self.ctx.warn(&line),
                    Outcome::Error => self.ctx.error(&line),
                }
            }
        }
        println!();
        println!(
            "  {} passed, {} failed",
            report.checks_passed, report.checks_failed
        );
        println!();
    }

    /// Render a fleet run: one line per instance, then totals.
    pub fn render_fleet(&self, fleet: &FleetReport) {
        if self.ctx.quiet {
            return;
        }
        println!();
        if fleet.reports.is_empty() {
            self.ctx.info("No instances. Records live in ~/.hatchery/instances/");
            return;
        }
        for report in &fleet.reports {
            let detail = match &report.transport_error {
                Some(err) => err.message.clone(),
                None => format!(
                    "{} passed, {} failed",
                    report.checks_passed, report.checks_failed
                ),
            };
            println!(
                "  {:<24} {:<22} {detail}",
                report.instance,
                self.state_label(report.overall_state)
            );
        }
        println!();
        println!(
            "  {} instance(s): {} healthy, {} degraded, {} offline, {} unreachable",
            fleet.total, fleet.healthy, fleet.degraded, fleet.offline, fleet.unreachable
        );
        for failure in &fleet.record_failures {
            self.ctx
                .warn(&format!("{}: result not saved: {}", failure.instance, failure.message));
        }
        println!();
    }

    /// Render a bootstrap plan or run.
    pub fn render_bootstrap(&self, report: &BootstrapReport) {
        if self.ctx.quiet {
            return;
        }
        println!();
        let title = if report.dry_run {
            format!("AMCP plan for {} (dry run)", report.instance)
        } else {
            format!("AMCP setup for {}", report.instance)
        };
        self.ctx.header(&title);
        println!();
        for step in &report.steps {
            let label = format!(
                "{:<18} {:<9}",
                step.step.capability.label(),
                step.step.planned_action.as_str()
            );
            match &step.outcome {
                StepOutcome::Planned => self.ctx.info(&label),
                StepOutcome::Skipped => self.ctx.kv("-", &format!("{label} already present")),
                StepOutcome::Done { detail } => {
                    self.ctx
                        .success(&format!("{label} {}", detail.as_deref().unwrap_or("")));
                }
                StepOutcome::Failed { reason } => self.ctx.error(&format!("{label} {reason}")),
                StepOutcome::NotRun => self.ctx.kv("-", &format!("{label} not run")),
            }
        }
        println!();
        if report.dry_run {
            println!(
                "  {} action(s) planned, {} skipped",
                report.action_set().len(),
                report.skipped()
            );
        } else {
            println!(
                "  {} done, {} skipped, {} failed",
                report.done(),
                report.skipped(),
                report.failed()
            );
        }
        println!();
    }

    /// Render the result of a fix run.
    pub fn render_fix(&self, outcome: &FixOutcome) {
        if self.ctx.quiet {
            return;
        }
        println!();
        if outcome.healthy {
            self.ctx
                .success(&format!("{} is healthy, nothing to fix", outcome.instance));
            println!();
            return;
        }
        for fix in &outcome.fixes {
            let line = format!("{}: {} ({} attempt(s))", fix.issue, fix.action, fix.attempts);
            if fix.outcome == "fixed" {
                self.ctx.success(&line);
            } else {
                self.ctx.warn(&line);
            }
        }
        if let Some(verification) = &outcome.verification {
            self.ctx.kv(
                "Verification:",
                &format!(
                    "{} ({} passed, {} failed)",
                    verification.overall_state.as_str(),
                    verification.checks_passed,
                    verification.checks_failed
                ),
            );
        }
        for reason in &outcome.escalation {
            self.ctx.warn(&format!("Escalated: {reason}"));
        }
        if outcome.is_escalated() && !outcome.escalation_delivered {
            self.ctx.error("Escalation notice was not delivered");
        }
        for note in &outcome.notes {
            self.ctx.info(&note.to_string());
        }
        println!();
        println!(
            "  {} fixed, {} escalated",
            outcome.fixed, outcome.escalated
        );
        println!();
    }

    /// Render a checkpoint result.
    pub fn render_checkpoint(&self, outcome: &CheckpointOutcome) {
        match (&outcome.cid, &outcome.warning) {
            (Some(cid), _) => self.ctx.kv("CID:", cid),
            (None, Some(warning)) => self.ctx.warn(&format!("Checkpoint taken, {warning}")),
            (None, None) => {}
        }
        self.ctx.kv("Principal:", &outcome.principal);
    }

    /// Render the instance table.
    pub fn render_instances(&self, instances: &[Instance]) {
        if self.ctx.quiet {
            return;
        }
        if instances.is_empty() {
            println!("No instances. Records live in ~/.hatchery/instances/");
            return;
        }
        println!(
            "  {:<24} {:<16} {:<12} {:<12} {}",
            "NAME".style(self.ctx.styles.dim),
            "IP".style(self.ctx.styles.dim),
            "STATUS".style(self.ctx.styles.dim),
            "AMCP".style(self.ctx.styles.dim),
            "LAST CHECKPOINT".style(self.ctx.styles.dim),
        );
        for instance in instances {
            println!(
                "  {:<24} {:<16} {:<12} {:<12} {}",
                instance.name,
                instance.ip,
                instance.status.as_str(),
                instance.amcp_status.to_string(),
                instance.last_checkpoint_cid.as_deref().unwrap_or("-"),
            );
        }
        println!();
        println!("  {} instance(s)", instances.len());
    }

    /// Render stored secrets, already masked.
    pub fn render_secrets(&self, name: &str, secrets: &[(String, String)]) {
        if secrets.is_empty() {
            self.ctx.info(&format!(
                "No secrets stored for {name}. Set one: hatchery config {name} --set <key>=<value>"
            ));
            return;
        }
        self.ctx.header(&format!("Secrets for {name}"));
        for (key, masked) in secrets {
            self.ctx.kv(&format!("{key:<28}"), masked);
        }
    }

    fn state_label(&self, state: OverallState) -> String {
        let text = state.as_str();
        let style = match state {
            OverallState::Healthy => self.ctx.styles.success,
            OverallState::Degraded => self.ctx.styles.warning,
            OverallState::Offline | OverallState::Unreachable => self.ctx.styles.error,
        };
        text.style(style).to_string()
    }
}
