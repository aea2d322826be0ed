//! Checkpoint principal resolution, scripts, and CID extraction.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use hatchery_common::{CHECK_DELIMITER, RESULT_DELIMITER};

use crate::domain::probe::{AMCP_DIR, GATEWAY_PROCESS, GATEWAY_UNIT, ProbeSections, shell_quote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointMode {
    #[default]
    Quick,
    Full,
}

impl CheckpointMode {
    /// `proactive-amcp` subcommand for this mode.
    #[must_use]
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::Quick => "checkpoint",
            Self::Full => "full-checkpoint",
        }
    }
}

// ── Principal ─────────────────────────────────────────────────────────────────

/// Probe for the user the gateway runs as. Three sections, most
/// authoritative first.
#[must_use]
pub fn principal_probe_script() -> String {
    format!(
        r#"set +e
echo '{CHECK_DELIMITER}systemd'
if [ "$(systemctl show -p LoadState --value {GATEWAY_UNIT} 2>/dev/null)" = "loaded" ]; then
  U=$(systemctl show -p User --value {GATEWAY_UNIT} 2>/dev/null)
  echo "loaded:$U"
else echo unloaded; fi
echo '{CHECK_DELIMITER}process'
PID=$(pgrep -o -f {GATEWAY_PROCESS} 2>/dev/null)
if [ -n "$PID" ]; then echo "owner:$(ps -o user= -p "$PID" | tr -d ' ')"; else echo none; fi
echo '{CHECK_DELIMITER}login'
id -un
"#
    )
}

/// Resolve the principal from the probe sections.
///
/// A loaded unit with an empty `User=` runs as root.
#[must_use]
pub fn resolve_principal(sections: &ProbeSections) -> Option<String> {
    if let Some(line) = sections.first("systemd")
        && let Some(user) = line.strip_prefix("loaded:")
    {
        let user = user.trim();
        return Some(if user.is_empty() { "root" } else { user }.to_string());
    }
    if let Some(line) = sections.first("process")
        && let Some(owner) = line.strip_prefix("owner:")
        && !owner.trim().is_empty()
    {
        return Some(owner.trim().to_string());
    }
    sections
        .first("login")
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

/// Wrap `command` so it runs as `principal` with a login shell.
fn as_principal(principal: &str, command: &str) -> String {
    let user = shell_quote(principal);
    let quoted = shell_quote(command);
    format!(
        r#"if [ {user} = "$(id -un)" ]; then bash -lc {quoted}; else sudo -u {user} -H bash -lc {quoted}; fi"#
    )
}

/// Script that takes the checkpoint and ends with a result marker.
#[must_use]
pub fn checkpoint_script(principal: &str, mode: CheckpointMode) -> String {
    let command = format!("proactive-amcp {} 2>&1", mode.subcommand());
    let mut script = String::from("set +e\n");
    let _ = writeln!(script, "OUT=$({})", as_principal(principal, &command));
    let _ = writeln!(script, "RC=$?");
    let _ = writeln!(script, r#"printf '%s\n' "$OUT""#);
    let _ = writeln!(
        script,
        r#"if [ "$RC" -eq 0 ]; then echo '{RESULT_DELIMITER}ok'; else echo "{RESULT_DELIMITER}error:exit $RC: $(printf '%s' "$OUT" | tail -1)"; fi"#
    );
    script
}

/// Script that prints the state file written by the last checkpoint.
#[must_use]
pub fn state_file_script(principal: &str) -> String {
    let command = format!("cat ~/{AMCP_DIR}/last-checkpoint.json 2>/dev/null");
    format!("set +e\n{}\n", as_principal(principal, &command))
}

// ── CID extraction ────────────────────────────────────────────────────────────

static CREATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"Checkpoint created:\s*(\S+)").expect("valid regex")
});

// CIDv0 is base58btc `Qm` + 44 chars; CIDv1 base32 starts with `baf`.
static BARE_CID_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\b(Qm[1-9A-HJ-NP-Za-km-z]{44}|baf[a-z2-7]{20,})\b").expect("valid regex")
});

/// Pull a content identifier out of checkpoint command output, verbatim.
#[must_use]
pub fn extract_cid(output: &str) -> Option<String> {
    if let Some(caps) = CREATED_RE.captures(output) {
        return Some(caps[1].to_string());
    }
    BARE_CID_RE.find(output).map(|m| m.as_str().to_string())
}

#[derive(Deserialize)]
struct StateFile {
    cid: Option<String>,
}

/// Read `cid` from the contents of `last-checkpoint.json`.
#[must_use]
pub fn cid_from_state_file(contents: &str) -> Option<String> {
    serde_json::from_str::<StateFile>(contents.trim())
        .ok()?
        .cid
        .filter(|c| !c.trim().is_empty())
}

/// Result of one checkpoint run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointOutcome {
    pub instance: String,
    pub mode: CheckpointMode,
    pub principal: String,
    pub cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub const CID_NOT_CAPTURED: &str = "identifier not captured";
