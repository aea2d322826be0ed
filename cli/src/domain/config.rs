//! App configuration schema and per-instance secrets mapping.
//!
//! Pure functions only. No I/O, no async, no filesystem access.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::ConfigError;
use crate::domain::health::Thresholds;
use crate::domain::probe::{AMCP_DIR, prelude, shell_quote};
use crate::domain::remediation::RemediationPolicy;
use hatchery_common::RESULT_DELIMITER;

// ── App config schema ─────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.hatchery/config.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ssh: SshSettings,
    pub fleet: FleetSettings,
    pub thresholds: Thresholds,
    pub remediation: RemediationPolicy,
    pub knowledge: KnowledgeSettings,
    pub child: ChildSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub connect_timeout_secs: u64,
    /// Upper bound for one remote script, connect included.
    pub command_timeout_secs: u64,
    /// Upper bound for a repair agent run.
    pub repair_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            command_timeout_secs: 120,
            repair_timeout_secs: 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    /// Instances diagnosed at once by `diagnose --all`.
    pub parallelism: usize,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self { parallelism: 4 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSettings {
    /// Base URL of the knowledge service. Search is disabled when unset.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildSettings {
    /// User the gateway is expected to run as.
    pub service_user: String,
}

impl Default for ChildSettings {
    fn default() -> Self {
        Self {
            service_user: "agent".to_string(),
        }
    }
}

// ── Secrets mapping ───────────────────────────────────────────────────────────

/// Local secret key → dotted key in the child's AMCP config.
pub const KEY_MAPPING: &[(&str, &str)] = &[
    ("anthropic_api_key", "anthropic.apiKey"),
    ("pinata_jwt", "pinata.jwt"),
    ("solvr_api_key", "solvr.apiKey"),
    ("parent_telegram_bot_token", "parent_bot_token"),
    ("parent_telegram_chat_id", "parent_chat_id"),
    ("parent_email", "parent_email"),
    ("gateway_token", "gateway.token"),
];

/// Local secrets document: flat key → value.
pub type Secrets = BTreeMap<String, String>;

/// Remote key for a local secret key.
///
/// # Errors
///
/// Returns `ConfigError::UnknownKey` listing the valid keys.
pub fn remote_key(key: &str) -> Result<&'static str, ConfigError> {
    KEY_MAPPING
        .iter()
        .find(|(local, _)| *local == key)
        .map(|(_, remote)| *remote)
        .ok_or_else(|| ConfigError::UnknownKey {
            key: key.to_string(),
            valid: KEY_MAPPING
                .iter()
                .map(|(k, _)| *k)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Parse `key=value` and validate the key.
///
/// # Errors
///
/// Returns an error if there is no `=`, the key is unknown, or the value is
/// empty.
pub fn parse_assignment(raw: &str) -> Result<(String, String), ConfigError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidAssignment(raw.to_string()))?;
    let key = key.trim();
    remote_key(key)?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Build the nested remote document from local secrets.
///
/// Unknown local keys are skipped. Returns the document and the remote keys
/// it contains, in mapping order.
#[must_use]
pub fn remote_document(secrets: &Secrets) -> (Value, Vec<&'static str>) {
    let mut root = Map::new();
    let mut pushed = Vec::new();
    for (local, remote) in KEY_MAPPING {
        let Some(value) = secrets.get(*local) else {
            continue;
        };
        insert_dotted(&mut root, remote, Value::String(value.clone()));
        pushed.push(*remote);
    }
    (Value::Object(root), pushed)
}

fn insert_dotted(root: &mut Map<String, Value>, dotted: &str, value: Value) {
    let mut parts = dotted.split('.').peekable();
    let mut node = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            node.insert(part.to_string(), value);
            return;
        }
        let entry = node
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }
}

/// Mask a secret for display: keep a short prefix, hide the rest.
#[must_use]
pub fn mask_secret(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    if value.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

/// Script merging `document` into the child's AMCP config as the service
/// user. Deep merge via `jq` when present, plain replace otherwise.
#[must_use]
pub fn config_push_script(document: &Value) -> String {
    let json = shell_quote(&document.to_string());
    let amcp = AMCP_DIR;
    let mut script = prelude();
    let _ = write!(
        script,
        r#"NEW={json}
TMP=$(mktemp)
CUR=$(as_svc 'cat ~/{amcp}/config.json 2>/dev/null')
if [ -n "$CUR" ] && command -v jq >/dev/null 2>&1 && printf '%s' "$CUR" | jq --argjson new "$NEW" '. * $new' >"$TMP" 2>/dev/null; then :
else printf '%s\n' "$NEW" >"$TMP"; fi
if as_svc 'mkdir -p ~/{amcp} && umask 077 && cat > ~/{amcp}/config.json.tmp && mv ~/{amcp}/config.json.tmp ~/{amcp}/config.json' <"$TMP"; then
  echo "{RESULT_DELIMITER}ok"
else
  echo "{RESULT_DELIMITER}error:could not write ~/{amcp}/config.json as $SVC_USER"
fi
rm -f "$TMP"
"#
    );
    script
}

// ── Unit tests ───────────────────────────────────────────────────────────────
