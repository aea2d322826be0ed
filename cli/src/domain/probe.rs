//! Probe wire format: script construction and output parsing.
//!
//! A probe is one shell script executed in one remote session. It prints a
//! version header, then one `---CHECK---<id>` section per check. Action
//! scripts end with a single `---RESULT---` marker. Everything that knows
//! the text layout lives here.

use std::collections::HashMap;
use std::fmt::Write as _;

use hatchery_common::{CHECK_DELIMITER, PROBE_HEADER, PROBE_VERSION, RESULT_DELIMITER};

use crate::domain::health::{CheckId, DiagnosticReport, HealthCheck, Thresholds, classify};

// ── Child layout ──────────────────────────────────────────────────────────────

/// systemd unit running the child's gateway service.
pub const GATEWAY_UNIT: &str = "agent-gateway";

/// Pattern matched by `pgrep -f` to find the gateway process.
pub const GATEWAY_PROCESS: &str = "agent-gateway";

/// Local health endpoint of the gateway.
pub const HEALTH_URL: &str = "http://127.0.0.1:18789/health";

/// Directories relative to the service user's home.
pub const GATEWAY_DIR: &str = ".agent-gateway";
pub const AMCP_DIR: &str = ".amcp";

/// Remote keys that must be present in the AMCP config for it to be complete.
pub const REQUIRED_REMOTE_KEYS: &[&str] = &[
    "anthropic.apiKey",
    "pinata.jwt",
    "parent_bot_token",
    "parent_chat_id",
];

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Output of a probe script split into sections.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProbeSections {
    /// Version from the `---PROBE---v<N>` header, if present.
    pub version: Option<u32>,
    sections: HashMap<String, Vec<String>>,
}

impl ProbeSections {
    /// Non-empty lines of the section named `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.sections.get(key).map(Vec::as_slice)
    }

    /// First line of section `key`, trimmed.
    #[must_use]
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)?.first().map(|l| l.trim())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Split probe output into sections with a single sequential scan.
///
/// Lines before the first delimiter (login banners, shell noise) are
/// ignored. A repeated section key keeps the first occurrence.
#[must_use]
pub fn parse_sections(output: &str) -> ProbeSections {
    let mut parsed = ProbeSections::default();
    let mut current: Option<String> = None;

    for raw in output.lines() {
        let line = raw.trim_end_matches('\r');
        if let Some(version) = line.strip_prefix(PROBE_HEADER) {
            parsed.version = version.trim().parse().ok();
            current = None;
            continue;
        }
        if let Some(key) = line.strip_prefix(CHECK_DELIMITER) {
            let key = key.trim().to_string();
            if parsed.sections.contains_key(&key) {
                current = None;
            } else {
                parsed.sections.insert(key.clone(), Vec::new());
                current = Some(key);
            }
            continue;
        }
        if line.starts_with(RESULT_DELIMITER) {
            current = None;
            continue;
        }
        if let Some(key) = &current
            && !line.trim().is_empty()
            && let Some(lines) = parsed.sections.get_mut(key)
        {
            lines.push(line.to_string());
        }
    }
    parsed
}

/// Outcome of an action script, decoded from its `---RESULT---` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    /// `---RESULT---ok` or `---RESULT---ok:<detail>`.
    Ok(Option<String>),
    /// `---RESULT---error:<reason>`.
    Failed(String),
    /// No marker: the script died before reporting.
    NoMarker,
}

/// Classify action script output by its last result marker.
#[must_use]
pub fn classify_result(output: &str) -> ActionResult {
    let Some(marker) = output
        .lines()
        .rev()
        .find_map(|l| l.trim_end_matches('\r').strip_prefix(RESULT_DELIMITER))
    else {
        return ActionResult::NoMarker;
    };
    let marker = marker.trim();
    if marker == "ok" {
        return ActionResult::Ok(None);
    }
    if let Some(detail) = marker.strip_prefix("ok:") {
        return ActionResult::Ok(Some(detail.trim().to_string()));
    }
    match marker.strip_prefix("error:") {
        Some(reason) if !reason.trim().is_empty() => ActionResult::Failed(reason.trim().to_string()),
        _ => ActionResult::Failed(format!("unrecognized result marker: {marker}")),
    }
}

/// Lines of stdout that precede the result marker and are not delimiters.
#[must_use]
pub fn action_output(output: &str) -> String {
    output
        .lines()
        .filter(|l| !l.starts_with(RESULT_DELIMITER) && !l.starts_with(CHECK_DELIMITER))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Script construction helpers ───────────────────────────────────────────────

/// Quote `value` as a single POSIX shell word.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell prelude shared by every script: resolves the gateway's service user
/// into `SVC_USER` / `SVC_HOME`, its pid into `PID`, and defines `json_ok`.
///
/// `as_svc` runs its argument from the service user's home directory, since
/// `sudo -H` changes `HOME` but not the working directory.
#[must_use]
pub fn prelude() -> String {
    format!(
        r#"set +e
export PATH="$PATH:/usr/local/bin:$HOME/.local/bin:$HOME/.npm-global/bin"
PID=$(pgrep -o -f {process} 2>/dev/null)
SVC_USER=""
if [ "$(systemctl show -p LoadState --value {unit} 2>/dev/null)" = "loaded" ]; then
  SVC_USER=$(systemctl show -p User --value {unit} 2>/dev/null)
  [ -n "$SVC_USER" ] || SVC_USER=root
elif [ -n "$PID" ]; then
  SVC_USER=$(ps -o user= -p "$PID" | tr -d ' ')
fi
[ -n "$SVC_USER" ] || SVC_USER=$(id -un)
SVC_HOME=$(getent passwd "$SVC_USER" | cut -d: -f6)
[ -n "$SVC_HOME" ] || SVC_HOME=$HOME
json_ok() {{
  if command -v jq >/dev/null 2>&1; then jq empty "$1" >/dev/null 2>&1
  else python3 -m json.tool "$1" >/dev/null 2>&1; fi
}}
json_get() {{
  jq -r "$2 // empty" "$1" 2>/dev/null
}}
as_svc() {{
  if [ "$SVC_USER" = "$(id -un)" ]; then bash -lc "cd ~ || exit 1; $1"
  else sudo -n -u "$SVC_USER" -H bash -lc "cd ~ || exit 1; $1"; fi
}}
"#,
        process = GATEWAY_PROCESS,
        unit = GATEWAY_UNIT,
    )
}

// ── Diagnostic battery ────────────────────────────────────────────────────────

fn check_snippet(id: CheckId, expected_user: &str) -> String {
    let gw = GATEWAY_DIR;
    let amcp = AMCP_DIR;
    match id {
        CheckId::Connectivity => "echo ok".to_string(),
        CheckId::GatewayProcess => {
            r#"if [ -n "$PID" ]; then echo "ok:$PID"; else echo "error:not_running"; fi"#
                .to_string()
        }
        CheckId::HealthEndpoint => format!(
            r#"curl -s -o /dev/null -m 5 -w '%{{http_code}} %{{time_total}}\n' {HEALTH_URL} 2>/dev/null || true"#
        ),
        CheckId::SessionStore => format!(
            r#"T=0; C=0
for f in "$SVC_HOME"/{gw}/sessions/*.json; do
  [ -e "$f" ] || continue
  T=$((T+1))
  json_ok "$f" || C=$((C+1))
done
echo "$T $C""#
        ),
        CheckId::ConfigValid => format!(
            r#"F="$SVC_HOME/{gw}/config.json"
if [ ! -f "$F" ]; then echo missing; elif json_ok "$F"; then echo ok; else echo invalid; fi"#
        ),
        CheckId::Disk => r#"df -P / | awk 'NR==2 {gsub("%","",$5); print $5}'"#.to_string(),
        CheckId::Memory => {
            r#"free | awk '/^Mem:/ {printf "%d\n", ($2-$7)*100/$2}'"#.to_string()
        }
        CheckId::AgentCli => r#"if as_svc 'command -v claude' >/dev/null 2>&1; then
  echo "ok:$(as_svc 'claude --version' 2>/dev/null | head -1)"
else echo missing; fi"#
            .to_string(),
        CheckId::AgentAuth => r#"F="$SVC_HOME/.claude/.credentials.json"
if [ ! -f "$F" ]; then echo missing; else
  EXP=$(json_get "$F" '.claudeAiOauth.expiresAt')
  if [ -z "$EXP" ]; then echo "ok:none"
  elif [ "$EXP" -gt "$(( $(date +%s) * 1000 ))" ] 2>/dev/null; then echo "ok:$EXP"
  else echo expired; fi
fi"#
        .to_string(),
        CheckId::ApiKey => format!(
            r#"KEY=$(json_get "$SVC_HOME/{amcp}/config.json" '.anthropic.apiKey')
if [ -z "$KEY" ]; then echo missing; else
  CODE=$(curl -s -o /dev/null -m 10 -w '%{{http_code}}' -H "x-api-key: $KEY" -H "anthropic-version: 2023-06-01" https://api.anthropic.com/v1/models 2>/dev/null)
  printf '%s %.10s...\n' "${{CODE:-000}}" "$KEY"
fi"#
        ),
        CheckId::Principal => format!(
            r#"PUSER=none
[ -n "$PID" ] && PUSER=$(ps -o user= -p "$PID" | tr -d ' ')
echo "${{PUSER:-none}} {expected}""#,
            expected = shell_quote(expected_user),
        ),
        CheckId::Identity => format!(
            r#"AID=$(json_get "$SVC_HOME/{amcp}/identity.json" '.aid')
if [ -n "$AID" ]; then echo "ok:$AID"; else echo missing; fi"#
        ),
        CheckId::AmcpConfig => format!(
            r#"F="$SVC_HOME/{amcp}/config.json"
if [ ! -f "$F" ]; then echo missing; else
  M=""
  for k in {keys}; do [ -n "$(json_get "$F" ".$k")" ] || M="$M,$k"; done
  if [ -z "$M" ]; then echo ok; else echo "incomplete:${{M#,}}"; fi
fi"#,
            keys = REQUIRED_REMOTE_KEYS.join(" "),
        ),
        CheckId::CheckpointAge => format!(
            r#"F="$SVC_HOME/{amcp}/last-checkpoint.json"
if [ -f "$F" ]; then echo $(( $(date +%s) - $(stat -c %Y "$F") )); else echo never; fi"#
        ),
    }
}

/// Build the full diagnostic probe: every check in battery order, one session.
#[must_use]
pub fn diagnostic_script(expected_user: &str) -> String {
    let mut script = prelude();
    let _ = writeln!(script, "echo '{PROBE_HEADER}{PROBE_VERSION}'");
    for id in CheckId::ALL {
        let _ = writeln!(script, "echo '{CHECK_DELIMITER}{}'", id.as_str());
        let _ = writeln!(script, "{}", check_snippet(id, expected_user));
    }
    script
}

/// Decode the output of `diagnostic_script` into a report.
///
/// Every check in the battery yields exactly one `HealthCheck`, in battery
/// order, whatever the output looks like.
#[must_use]
pub fn decode_diagnostic(
    instance: &str,
    output: &str,
    thresholds: &Thresholds,
    probed_at: chrono::DateTime<chrono::Utc>,
) -> DiagnosticReport {
    let sections = parse_sections(output);
    let checks: Vec<HealthCheck> = CheckId::ALL
        .iter()
        .map(|&id| classify(id, sections.get(id.as_str()), thresholds))
        .collect();
    DiagnosticReport::from_checks(instance, sections.version, checks, probed_at)
}
