//! AMCP capability bootstrap: probe grammar, planning, and action scripts.
//!
//! Planning is a pure function of a fresh probe and the force flag, so a
//! dry run and a live run always agree on the action set.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use hatchery_common::{CHECK_DELIMITER, PROBE_HEADER, PROBE_VERSION, RESULT_DELIMITER};

use crate::domain::error::MalformedProbeOutput;
use crate::domain::probe::{AMCP_DIR, ProbeSections, prelude};

/// npm package providing the `amcp` CLI.
pub const AMCP_CLI_PACKAGE: &str = "@amcp/cli";
/// npm package providing `proactive-amcp` (checkpoints, watchdog).
pub const PROACTIVE_AMCP_PACKAGE: &str = "proactive-amcp";
/// systemd timer installed by `proactive-amcp install-watchdog`.
pub const WATCHDOG_TIMER: &str = "amcp-watchdog.timer";

// ── Types ─────────────────────────────────────────────────────────────────────

/// One optional subsystem on the child, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AmcpCli,
    ProactiveAmcp,
    Identity,
    Config,
    Watchdog,
    FirstCheckpoint,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::AmcpCli,
        Capability::ProactiveAmcp,
        Capability::Identity,
        Capability::Config,
        Capability::Watchdog,
        Capability::FirstCheckpoint,
    ];

    /// Section key in the bootstrap probe.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AmcpCli => "amcp_cli",
            Self::ProactiveAmcp => "proactive_amcp",
            Self::Identity => "identity",
            Self::Config => "config",
            Self::Watchdog => "watchdog",
            Self::FirstCheckpoint => "first_checkpoint",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::AmcpCli => "AMCP CLI",
            Self::ProactiveAmcp => "proactive-amcp",
            Self::Identity => "Identity",
            Self::Config => "Config",
            Self::Watchdog => "Watchdog",
            Self::FirstCheckpoint => "First checkpoint",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the probe found for a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "version", rename_all = "kebab-case")]
pub enum CurrentState {
    Missing,
    Present,
    /// Present, with a version or handle (package version, identity AID,
    /// checkpoint CID).
    PresentWithVersion(String),
}

impl CurrentState {
    #[must_use]
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    /// The version or handle, when the probe reported one.
    #[must_use]
    pub fn handle(&self) -> Option<&str> {
        match self {
            Self::PresentWithVersion(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannedAction {
    Skip,
    Install,
    Create,
    Recreate,
    Push,
}

impl PlannedAction {
    #[must_use]
    pub fn is_mutating(self) -> bool {
        self != Self::Skip
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Install => "install",
            Self::Create => "create",
            Self::Recreate => "recreate",
            Self::Push => "push",
        }
    }
}

/// One planned step of a bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapStep {
    pub capability: Capability,
    pub current_state: CurrentState,
    pub planned_action: PlannedAction,
}

/// Decoded bootstrap probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapProbe {
    /// npm version, or `None` when npm is unavailable.
    pub installer: Option<String>,
    /// One entry per capability, in `Capability::ALL` order.
    pub capabilities: Vec<(Capability, CurrentState)>,
}

impl BootstrapProbe {
    #[must_use]
    pub fn state_of(&self, capability: Capability) -> Option<&CurrentState> {
        self.capabilities
            .iter()
            .find(|(c, _)| *c == capability)
            .map(|(_, s)| s)
    }

    /// Capabilities the probe reported as missing.
    #[must_use]
    pub fn missing(&self) -> Vec<Capability> {
        self.capabilities
            .iter()
            .filter(|(_, s)| !s.is_present())
            .map(|(c, _)| *c)
            .collect()
    }
}

// ── Probe ─────────────────────────────────────────────────────────────────────

fn capability_snippet(capability: Capability) -> String {
    let amcp = AMCP_DIR;
    match capability {
        Capability::AmcpCli => cli_presence_snippet("amcp"),
        Capability::ProactiveAmcp => cli_presence_snippet("proactive-amcp"),
        Capability::Identity => format!(
            r#"AID=$(json_get "$SVC_HOME/{amcp}/identity.json" '.aid')
if [ -n "$AID" ]; then echo "present:$AID"; else echo missing; fi"#
        ),
        Capability::Config => format!(
            r#"if [ -f "$SVC_HOME/{amcp}/config.json" ]; then echo present; else echo missing; fi"#
        ),
        Capability::Watchdog => format!(
            r#"if systemctl is-enabled {WATCHDOG_TIMER} >/dev/null 2>&1 || as_svc 'crontab -l' 2>/dev/null | grep -q 'proactive-amcp watchdog'; then
  echo present
else echo missing; fi"#
        ),
        Capability::FirstCheckpoint => format!(
            r#"CID=$(json_get "$SVC_HOME/{amcp}/last-checkpoint.json" '.cid')
if [ -n "$CID" ]; then echo "present:$CID"; else echo missing; fi"#
        ),
    }
}

fn cli_presence_snippet(bin: &str) -> String {
    format!(
        r#"if as_svc 'command -v {bin}' >/dev/null 2>&1; then
  V=$(as_svc '{bin} --version' 2>/dev/null | head -1)
  if [ -n "$V" ]; then echo "present:$V"; else echo present; fi
else echo missing; fi"#
    )
}

const INSTALLER_SNIPPET: &str = r#"if command -v npm >/dev/null 2>&1; then echo "ok:$(npm --version 2>/dev/null)"; else echo missing; fi"#;

/// Probe script for the installer and every capability, in one session.
#[must_use]
pub fn bootstrap_probe_script() -> String {
    let mut script = prelude();
    let _ = writeln!(script, "echo '{PROBE_HEADER}{PROBE_VERSION}'");
    let _ = writeln!(script, "echo '{CHECK_DELIMITER}installer'");
    let _ = writeln!(script, "{INSTALLER_SNIPPET}");
    for capability in Capability::ALL {
        let _ = writeln!(script, "echo '{CHECK_DELIMITER}{}'", capability.as_str());
        let _ = writeln!(script, "{}", capability_snippet(capability));
    }
    script
}

/// Probe script for a single capability, used to verify a step's
/// post-condition.
#[must_use]
pub fn capability_probe_script(capability: Capability) -> String {
    let mut script = prelude();
    let _ = writeln!(script, "echo '{CHECK_DELIMITER}{}'", capability.as_str());
    let _ = writeln!(script, "{}", capability_snippet(capability));
    script
}

/// Decode one capability section: `present[:<version>]` or `missing`.
///
/// # Errors
///
/// Returns `MalformedProbeOutput` for anything else, including an absent
/// section.
pub fn decode_capability(
    capability: Capability,
    sections: &ProbeSections,
) -> Result<CurrentState, MalformedProbeOutput> {
    let line = sections.first(capability.as_str()).unwrap_or_default();
    match line {
        "missing" => Ok(CurrentState::Missing),
        "present" => Ok(CurrentState::Present),
        _ => match line.strip_prefix("present:").map(str::trim) {
            Some(v) if !v.is_empty() => Ok(CurrentState::PresentWithVersion(v.to_string())),
            Some(_) => Ok(CurrentState::Present),
            None => Err(MalformedProbeOutput {
                check: capability.as_str().to_string(),
                raw: line.to_string(),
            }),
        },
    }
}

/// Decode the full bootstrap probe.
///
/// # Errors
///
/// Returns `MalformedProbeOutput` if the installer or any capability section
/// is malformed. Planning on a guess could reinstall or overwrite things, so
/// nothing is defaulted.
pub fn decode_bootstrap_probe(
    sections: &ProbeSections,
) -> Result<BootstrapProbe, MalformedProbeOutput> {
    let installer_line = sections.first("installer").unwrap_or_default();
    let installer = match installer_line {
        "missing" => None,
        other => match other.strip_prefix("ok:") {
            Some(v) => Some(v.trim().to_string()),
            None => {
                return Err(MalformedProbeOutput {
                    check: "installer".to_string(),
                    raw: other.to_string(),
                });
            }
        },
    };
    let capabilities = Capability::ALL
        .iter()
        .map(|&c| decode_capability(c, sections).map(|s| (c, s)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BootstrapProbe {
        installer,
        capabilities,
    })
}

// ── Planning ──────────────────────────────────────────────────────────────────

/// Compute the action for every step.
///
/// `force` only affects identity (recreate) and, through it, the first
/// checkpoint, which must be redone for a new identity.
#[must_use]
pub fn plan_bootstrap(probe: &BootstrapProbe, force: bool) -> Vec<BootstrapStep> {
    let mut identity_changes = false;
    Capability::ALL
        .iter()
        .map(|&capability| {
            let current_state = probe
                .state_of(capability)
                .cloned()
                .unwrap_or(CurrentState::Missing);
            let present = current_state.is_present();
            let planned_action = match capability {
                Capability::AmcpCli | Capability::ProactiveAmcp | Capability::Watchdog => {
                    if present {
                        PlannedAction::Skip
                    } else {
                        PlannedAction::Install
                    }
                }
                Capability::Identity => {
                    let action = if force {
                        PlannedAction::Recreate
                    } else if present {
                        PlannedAction::Skip
                    } else {
                        PlannedAction::Create
                    };
                    identity_changes = action.is_mutating();
                    action
                }
                Capability::Config => PlannedAction::Push,
                Capability::FirstCheckpoint => {
                    if present && !identity_changes {
                        PlannedAction::Skip
                    } else {
                        PlannedAction::Create
                    }
                }
            };
            BootstrapStep {
                capability,
                current_state,
                planned_action,
            }
        })
        .collect()
}

/// Fail-fast rule: without npm, nothing missing can be brought up.
///
/// Returns the missing capabilities when the run must abort.
#[must_use]
pub fn installer_blocks(probe: &BootstrapProbe) -> Option<Vec<Capability>> {
    let missing = probe.missing();
    (probe.installer.is_none() && !missing.is_empty()).then_some(missing)
}

// ── Action scripts ────────────────────────────────────────────────────────────

fn with_result(body: &str) -> String {
    let mut script = prelude();
    script.push_str(body);
    if !body.ends_with('\n') {
        script.push('\n');
    }
    script
}

fn npm_install_body(package: &str, bin: &str) -> String {
    format!(
        r#"npm install -g {package} >/tmp/hatchery-npm.log 2>&1
if as_svc 'command -v {bin}' >/dev/null 2>&1; then
  echo "{RESULT_DELIMITER}ok:$(as_svc '{bin} --version' 2>/dev/null | head -1)"
else
  echo "{RESULT_DELIMITER}error:npm install {package} failed: $(tail -1 /tmp/hatchery-npm.log)"
fi"#
    )
}

/// Remote script performing `action` for `capability`.
///
/// Returns `None` for `Skip` and for `Config`/`Push`, which is carried out
/// by the config push service.
#[must_use]
pub fn action_script(capability: Capability, action: PlannedAction) -> Option<String> {
    let amcp = AMCP_DIR;
    let body = match (capability, action) {
        (_, PlannedAction::Skip) | (Capability::Config, _) => return None,
        (Capability::AmcpCli, _) => npm_install_body(AMCP_CLI_PACKAGE, "amcp"),
        (Capability::ProactiveAmcp, _) => npm_install_body(PROACTIVE_AMCP_PACKAGE, "proactive-amcp"),
        (Capability::Identity, PlannedAction::Recreate) => format!(
            r#"F="$SVC_HOME/{amcp}/identity.json"
[ -f "$F" ] && as_svc "cp ~/{amcp}/identity.json ~/{amcp}/identity.json.bak.$(date +%s)"
if as_svc 'mkdir -p ~/{amcp} && amcp identity create --force --out ~/{amcp}/identity.json' >/tmp/hatchery-identity.log 2>&1; then
  echo "{RESULT_DELIMITER}ok:$(json_get "$F" '.aid')"
else
  echo "{RESULT_DELIMITER}error:identity recreate failed: $(tail -1 /tmp/hatchery-identity.log)"
fi"#
        ),
        (Capability::Identity, _) => format!(
            r#"F="$SVC_HOME/{amcp}/identity.json"
if as_svc 'mkdir -p ~/{amcp} && amcp identity create --out ~/{amcp}/identity.json' >/tmp/hatchery-identity.log 2>&1; then
  echo "{RESULT_DELIMITER}ok:$(json_get "$F" '.aid')"
else
  echo "{RESULT_DELIMITER}error:identity create failed: $(tail -1 /tmp/hatchery-identity.log)"
fi"#
        ),
        (Capability::Watchdog, _) => format!(
            r#"if as_svc 'proactive-amcp install-watchdog' >/tmp/hatchery-watchdog.log 2>&1; then
  echo "{RESULT_DELIMITER}ok"
else
  echo "{RESULT_DELIMITER}error:watchdog install failed: $(tail -1 /tmp/hatchery-watchdog.log)"
fi"#
        ),
        (Capability::FirstCheckpoint, _) => format!(
            r#"if as_svc 'proactive-amcp checkpoint' >/tmp/hatchery-checkpoint.log 2>&1; then
  echo "{RESULT_DELIMITER}ok:$(json_get "$SVC_HOME/{amcp}/last-checkpoint.json" '.cid')"
else
  echo "{RESULT_DELIMITER}error:first checkpoint failed: $(tail -1 /tmp/hatchery-checkpoint.log)"
fi"#
        ),
    };
    Some(with_result(&body))
}

// ── Report ────────────────────────────────────────────────────────────────────

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Dry run: the step would run.
    Planned,
    Skipped,
    Done { detail: Option<String> },
    Failed { reason: String },
    /// An earlier step failed.
    NotRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    #[serde(flatten)]
    pub step: BootstrapStep,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    pub instance: String,
    pub dry_run: bool,
    pub installer: Option<String>,
    pub steps: Vec<StepReport>,
}

impl BootstrapReport {
    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(&s.outcome)).count()
    }

    #[must_use]
    pub fn done(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Done { .. }))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Skipped))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Failed { .. }))
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failed() == 0 && self.count(|o| matches!(o, StepOutcome::NotRun)) == 0
    }

    /// Capabilities with a mutating action, in order.
    #[must_use]
    pub fn action_set(&self) -> Vec<(Capability, PlannedAction)> {
        self.steps
            .iter()
            .filter(|s| s.step.planned_action.is_mutating())
            .map(|s| (s.step.capability, s.step.planned_action))
            .collect()
    }
}
