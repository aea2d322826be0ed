//! Health check domain types and pure diagnostic functions.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! All functions take data in and return data out.

use chrono::{DateTime, Utc};
use hatchery_common::InstanceStatus;
use serde::{Deserialize, Serialize};

use crate::domain::error::{MalformedProbeOutput, TransportError};

// ── Check identity ────────────────────────────────────────────────────────────

/// Stable identifier of one check in the diagnostic battery.
///
/// `ALL` is the battery order; the probe script emits sections in exactly
/// this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    Connectivity,
    GatewayProcess,
    HealthEndpoint,
    SessionStore,
    ConfigValid,
    Disk,
    Memory,
    AgentCli,
    AgentAuth,
    ApiKey,
    Principal,
    Identity,
    AmcpConfig,
    CheckpointAge,
}

impl CheckId {
    pub const ALL: [CheckId; 14] = [
        CheckId::Connectivity,
        CheckId::GatewayProcess,
        CheckId::HealthEndpoint,
        CheckId::SessionStore,
        CheckId::ConfigValid,
        CheckId::Disk,
        CheckId::Memory,
        CheckId::AgentCli,
        CheckId::AgentAuth,
        CheckId::ApiKey,
        CheckId::Principal,
        CheckId::Identity,
        CheckId::AmcpConfig,
        CheckId::CheckpointAge,
    ];

    /// Wire name, as written after `---CHECK---`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::GatewayProcess => "gateway_process",
            Self::HealthEndpoint => "health_endpoint",
            Self::SessionStore => "session_store",
            Self::ConfigValid => "config_valid",
            Self::Disk => "disk",
            Self::Memory => "memory",
            Self::AgentCli => "agent_cli",
            Self::AgentAuth => "agent_auth",
            Self::ApiKey => "api_key",
            Self::Principal => "principal",
            Self::Identity => "identity",
            Self::AmcpConfig => "amcp_config",
            Self::CheckpointAge => "checkpoint_age",
        }
    }

    #[must_use]
    pub fn category(self) -> Category {
        match self {
            Self::Connectivity | Self::GatewayProcess | Self::HealthEndpoint => {
                Category::Connectivity
            }
            Self::AgentCli | Self::AgentAuth | Self::ApiKey => Category::Authentication,
            Self::Identity | Self::AmcpConfig | Self::CheckpointAge => Category::Amcp,
            Self::SessionStore | Self::ConfigValid | Self::Disk | Self::Memory | Self::Principal => {
                Category::System
            }
        }
    }

    /// Short human label used in summaries and escalation notices.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Connectivity => "SSH connectivity",
            Self::GatewayProcess => "Gateway process",
            Self::HealthEndpoint => "Gateway health endpoint",
            Self::SessionStore => "Session store",
            Self::ConfigValid => "Gateway config",
            Self::Disk => "Disk usage",
            Self::Memory => "Memory usage",
            Self::AgentCli => "Agent CLI",
            Self::AgentAuth => "Agent authentication",
            Self::ApiKey => "Upstream API key",
            Self::Principal => "Service user",
            Self::Identity => "AMCP identity",
            Self::AmcpConfig => "AMCP config",
            Self::CheckpointAge => "Last checkpoint",
        }
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping used for human summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Connectivity,
    Authentication,
    Amcp,
    System,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Connectivity,
        Category::Authentication,
        Category::Amcp,
        Category::System,
    ];

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Connectivity => "Connectivity",
            Self::Authentication => "Authentication",
            Self::Amcp => "AMCP",
            Self::System => "System",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Warn,
    Error,
}

/// One classified check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub id: CheckId,
    pub category: Category,
    pub outcome: Outcome,
    pub detail: String,
}

impl HealthCheck {
    #[must_use]
    pub fn new(id: CheckId, outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            id,
            category: id.category(),
            outcome,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.outcome != Outcome::Ok
    }
}

// ── Thresholds ────────────────────────────────────────────────────────────────

/// Numeric limits applied while decoding check output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Disk usage percent at which the check warns.
    pub disk_warn_percent: u8,
    /// Disk usage percent at which the check errors.
    pub disk_error_percent: u8,
    pub memory_warn_percent: u8,
    pub memory_error_percent: u8,
    /// Health endpoint latency above this is a warning.
    pub health_latency_warn_ms: u64,
    /// Checkpoints older than this are stale.
    pub checkpoint_stale_hours: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            disk_warn_percent: 80,
            disk_error_percent: 90,
            memory_warn_percent: 85,
            memory_error_percent: 95,
            health_latency_warn_ms: 2000,
            checkpoint_stale_hours: 24,
        }
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────────

/// Decode one check section against its grammar.
///
/// `lines` are the non-empty lines that followed the check's delimiter.
///
/// # Errors
///
/// Returns `MalformedProbeOutput` when the lines do not match the grammar
/// for `id`.
pub fn decode(
    id: CheckId,
    lines: &[String],
    thresholds: &Thresholds,
) -> Result<(Outcome, String), MalformedProbeOutput> {
    let malformed = || MalformedProbeOutput {
        check: id.as_str().to_string(),
        raw: lines.join("\n"),
    };
    let first = lines.first().map(|l| l.trim()).ok_or_else(malformed)?;

    let decoded = match id {
        CheckId::Connectivity => (first == "ok").then(|| (Outcome::Ok, "connected".to_string())),
        CheckId::GatewayProcess => decode_gateway_process(first),
        CheckId::HealthEndpoint => decode_health_endpoint(first, thresholds),
        CheckId::SessionStore => decode_session_store(first),
        CheckId::ConfigValid => match first {
            "ok" => Some((Outcome::Ok, "valid JSON".to_string())),
            "missing" => Some((Outcome::Error, "config file missing".to_string())),
            "invalid" => Some((Outcome::Error, "config file is not valid JSON".to_string())),
            _ => None,
        },
        CheckId::Disk => decode_percent(
            first,
            thresholds.disk_warn_percent,
            thresholds.disk_error_percent,
        ),
        CheckId::Memory => decode_percent(
            first,
            thresholds.memory_warn_percent,
            thresholds.memory_error_percent,
        ),
        CheckId::AgentCli => decode_agent_cli(first),
        CheckId::AgentAuth => decode_agent_auth(first),
        CheckId::ApiKey => decode_api_key(first),
        CheckId::Principal => decode_principal(first),
        CheckId::Identity => match first {
            "missing" => Some((Outcome::Error, "no identity".to_string())),
            other => other
                .strip_prefix("ok:")
                .filter(|aid| !aid.is_empty())
                .map(|aid| (Outcome::Ok, aid.to_string())),
        },
        CheckId::AmcpConfig => decode_amcp_config(first),
        CheckId::CheckpointAge => decode_checkpoint_age(first, thresholds.checkpoint_stale_hours),
    };

    decoded.ok_or_else(malformed)
}

/// Decode a check section, turning any malformed or absent output into an
/// `error` check with detail `"unparseable"`.
#[must_use]
pub fn classify(id: CheckId, lines: Option<&[String]>, thresholds: &Thresholds) -> HealthCheck {
    let Some(lines) = lines else {
        return HealthCheck::new(id, Outcome::Error, "unparseable");
    };
    match decode(id, lines, thresholds) {
        Ok((outcome, detail)) => HealthCheck::new(id, outcome, detail),
        Err(_) => HealthCheck::new(id, Outcome::Error, "unparseable"),
    }
}

fn decode_gateway_process(line: &str) -> Option<(Outcome, String)> {
    if let Some(pid) = line.strip_prefix("ok:") {
        let pid: u32 = pid.parse().ok()?;
        return Some((Outcome::Ok, format!("pid {pid}")));
    }
    line.strip_prefix("error:")
        .filter(|reason| !reason.is_empty())
        .map(|reason| (Outcome::Error, reason.to_string()))
}

fn decode_health_endpoint(line: &str, thresholds: &Thresholds) -> Option<(Outcome, String)> {
    let mut parts = line.split_whitespace();
    let code: u16 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ms = (seconds * 1000.0).round() as u64;
    Some(match code {
        0 => (Outcome::Error, "connection refused".to_string()),
        200..=299 if ms > thresholds.health_latency_warn_ms => {
            (Outcome::Warn, format!("HTTP {code} in {ms}ms (slow)"))
        }
        200..=299 => (Outcome::Ok, format!("HTTP {code} in {ms}ms")),
        _ => (Outcome::Error, format!("HTTP {code} in {ms}ms")),
    })
}

fn decode_session_store(line: &str) -> Option<(Outcome, String)> {
    let mut parts = line.split_whitespace();
    let total: u32 = parts.next()?.parse().ok()?;
    let corrupt: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || corrupt > total {
        return None;
    }
    Some(if corrupt == 0 {
        (Outcome::Ok, format!("{total} sessions"))
    } else {
        (
            Outcome::Error,
            format!("{corrupt} of {total} session files corrupt"),
        )
    })
}

fn decode_percent(line: &str, warn: u8, error: u8) -> Option<(Outcome, String)> {
    let pct: u8 = line.trim_end_matches('%').parse().ok()?;
    if pct > 100 {
        return None;
    }
    let outcome = if pct >= error {
        Outcome::Error
    } else if pct >= warn {
        Outcome::Warn
    } else {
        Outcome::Ok
    };
    Some((outcome, format!("{pct}% used")))
}

fn decode_agent_cli(line: &str) -> Option<(Outcome, String)> {
    if line == "missing" {
        return Some((Outcome::Error, "not installed".to_string()));
    }
    let version = line.strip_prefix("ok:")?.trim();
    Some((
        Outcome::Ok,
        if version.is_empty() {
            "installed".to_string()
        } else {
            version.to_string()
        },
    ))
}

fn decode_agent_auth(line: &str) -> Option<(Outcome, String)> {
    match line {
        "missing" => Some((Outcome::Error, "no credentials".to_string())),
        "expired" => Some((Outcome::Error, "credentials expired".to_string())),
        _ => {
            let expiry = line.strip_prefix("ok:")?;
            if expiry == "none" {
                return Some((Outcome::Ok, "credentials present".to_string()));
            }
            let ms: i64 = expiry.parse().ok()?;
            let detail = DateTime::<Utc>::from_timestamp_millis(ms).map_or_else(
                || "credentials present".to_string(),
                |at| format!("valid until {}", at.format("%Y-%m-%d %H:%M UTC")),
            );
            Some((Outcome::Ok, detail))
        }
    }
}

fn decode_api_key(line: &str) -> Option<(Outcome, String)> {
    if line == "missing" {
        return Some((Outcome::Error, "no API key configured".to_string()));
    }
    let (code, masked) = line.split_once(' ')?;
    let code: u16 = code.parse().ok()?;
    let masked = masked.trim();
    Some(match code {
        200 => (Outcome::Ok, format!("{masked} accepted")),
        401 | 403 => (Outcome::Error, format!("{masked} rejected (HTTP {code})")),
        0 => (Outcome::Warn, format!("{masked} not verified (no response)")),
        _ => (Outcome::Warn, format!("{masked} not verified (HTTP {code})")),
    })
}

fn decode_principal(line: &str) -> Option<(Outcome, String)> {
    let mut parts = line.split_whitespace();
    let actual = parts.next()?;
    let expected = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(if actual == "none" {
        (Outcome::Warn, "gateway not running".to_string())
    } else if actual == expected {
        (Outcome::Ok, format!("running as {actual}"))
    } else {
        (
            Outcome::Error,
            format!("running as {actual}, expected {expected}"),
        )
    })
}

fn decode_amcp_config(line: &str) -> Option<(Outcome, String)> {
    match line {
        "ok" => Some((Outcome::Ok, "complete".to_string())),
        "missing" => Some((Outcome::Error, "config file missing".to_string())),
        _ => {
            let keys = line.strip_prefix("incomplete:")?;
            (!keys.is_empty()).then(|| (Outcome::Warn, format!("missing keys: {keys}")))
        }
    }
}

fn decode_checkpoint_age(line: &str, stale_hours: u64) -> Option<(Outcome, String)> {
    if line == "never" {
        return Some((Outcome::Warn, "no checkpoint yet".to_string()));
    }
    let age_secs: u64 = line.parse().ok()?;
    let hours = age_secs / 3600;
    Some(if hours >= stale_hours {
        (Outcome::Warn, format!("{hours}h old (stale)"))
    } else {
        (Outcome::Ok, format!("{hours}h old"))
    })
}

// ── State derivation ──────────────────────────────────────────────────────────

/// Overall classification of one diagnostic run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallState {
    Healthy,
    Degraded,
    Offline,
    Unreachable,
}

impl OverallState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
            Self::Unreachable => "unreachable",
        }
    }
}

impl From<OverallState> for InstanceStatus {
    fn from(state: OverallState) -> Self {
        match state {
            OverallState::Healthy => InstanceStatus::Healthy,
            OverallState::Degraded => InstanceStatus::Degraded,
            OverallState::Offline => InstanceStatus::Offline,
            OverallState::Unreachable => InstanceStatus::Unreachable,
        }
    }
}

/// Derive the overall state. First match wins:
/// transport failure, gateway process down, any other non-ok check, healthy.
#[must_use]
pub fn derive_state(transport_failed: bool, checks: &[HealthCheck]) -> OverallState {
    if transport_failed {
        return OverallState::Unreachable;
    }
    if checks
        .iter()
        .any(|c| c.id == CheckId::GatewayProcess && c.outcome == Outcome::Error)
    {
        return OverallState::Offline;
    }
    if checks.iter().any(HealthCheck::is_failed) {
        return OverallState::Degraded;
    }
    OverallState::Healthy
}

// ── Report ────────────────────────────────────────────────────────────────────

/// Transport failure as carried inside a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportFailure {
    /// `unreachable` or `auth_failure`.
    pub kind: String,
    pub message: String,
}

/// All checks for one instance at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub instance: String,
    pub probed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_version: Option<u32>,
    pub overall_state: OverallState,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub checks: Vec<HealthCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_error: Option<TransportFailure>,
}

impl DiagnosticReport {
    /// Build a report from classified checks.
    #[must_use]
    pub fn from_checks(
        instance: &str,
        probe_version: Option<u32>,
        checks: Vec<HealthCheck>,
        probed_at: DateTime<Utc>,
    ) -> Self {
        let checks_failed = checks.iter().filter(|c| c.is_failed()).count();
        Self {
            instance: instance.to_string(),
            probed_at,
            probe_version,
            overall_state: derive_state(false, &checks),
            checks_passed: checks.len() - checks_failed,
            checks_failed,
            checks,
            transport_error: None,
        }
    }

    /// Build the report for a run whose remote session never completed.
    #[must_use]
    pub fn unreachable(instance: &str, err: &TransportError, probed_at: DateTime<Utc>) -> Self {
        Self {
            instance: instance.to_string(),
            probed_at,
            probe_version: None,
            overall_state: derive_state(true, &[]),
            checks_passed: 0,
            checks_failed: 0,
            checks: Vec::new(),
            transport_error: Some(TransportFailure {
                kind: err.code().to_string(),
                message: err.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        self.transport_error.is_some()
    }

    /// Checks whose outcome is `warn` or `error`.
    pub fn failing(&self) -> impl Iterator<Item = &HealthCheck> {
        self.checks.iter().filter(|c| c.is_failed())
    }

    /// One line per failing check, e.g. `"Disk usage: 93% used"`.
    #[must_use]
    pub fn issues(&self) -> Vec<String> {
        self.failing()
            .map(|c| format!("{}: {}", c.id.label(), c.detail))
            .collect()
    }

    /// Group checks by category in category order, skipping empty groups.
    ///
    /// Pure projection over `checks`; order within a group is battery order.
    #[must_use]
    pub fn by_category(&self) -> Vec<(Category, Vec<&HealthCheck>)> {
        Category::ALL
            .iter()
            .map(|&cat| {
                (
                    cat,
                    self.checks.iter().filter(|c| c.category == cat).collect::<Vec<_>>(),
                )
            })
            .filter(|(_, checks)| !checks.is_empty())
            .collect()
    }

    /// `true` when any AMCP-category check is an error.
    #[must_use]
    pub fn amcp_broken(&self) -> bool {
        self.checks
            .iter()
            .any(|c| c.category == Category::Amcp && c.outcome == Outcome::Error)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
