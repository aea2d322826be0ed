//! Canned instances and remote outputs.

#![allow(dead_code)]

use hatchery_cli::application::services::diagnose::DiagnoseSettings;
use hatchery_cli::domain::remediation::{RepairFix, RepairReport};
use hatchery_common::Instance;

/// Needle identifying the diagnostic battery script.
pub const DIAGNOSTIC: &str = "---CHECK---connectivity";
/// Needle identifying the bootstrap probe script.
pub const BOOTSTRAP_PROBE: &str = "---CHECK---installer";
/// Needle identifying the checkpoint principal probe.
pub const PRINCIPAL_PROBE: &str = "---CHECK---systemd";

pub fn instance(name: &str) -> Instance {
    let mut instance = Instance::new(name, "10.0.0.7", "root", "/keys/fleet");
    instance.gateway_token = Some("gw-token-1234".to_string());
    instance
}

pub fn settings() -> DiagnoseSettings {
    DiagnoseSettings {
        service_user: "agent".to_string(),
        ..DiagnoseSettings::default()
    }
}

const HEALTHY: &[(&str, &str)] = &[
    ("connectivity", "ok"),
    ("gateway_process", "ok:812"),
    ("health_endpoint", "200 0.021"),
    ("session_store", "4 0"),
    ("config_valid", "ok"),
    ("disk", "41"),
    ("memory", "37"),
    ("agent_cli", "ok:1.0.31 (Claude Code)"),
    ("agent_auth", "ok:none"),
    ("api_key", "200 sk-ant-api..."),
    ("principal", "agent agent"),
    ("identity", "ok:aid_7f3k"),
    ("amcp_config", "ok"),
    ("checkpoint_age", "7200"),
];

/// Diagnostic probe output: healthy except for `overrides`.
pub fn diagnostic_output(overrides: &[(&str, &str)]) -> String {
    let mut out = String::from("Welcome to Ubuntu 24.04 LTS\n---PROBE---v1\n");
    for (id, line) in HEALTHY {
        let line = overrides
            .iter()
            .find(|(o, _)| o == id)
            .map_or(*line, |(_, l)| *l);
        out.push_str(&format!("---CHECK---{id}\n{line}\n"));
    }
    out
}

pub fn healthy_output() -> String {
    diagnostic_output(&[])
}

/// Gateway down: the process check fails and the endpoint refuses.
pub fn offline_output() -> String {
    diagnostic_output(&[
        ("gateway_process", "error:not_running"),
        ("health_endpoint", "000 0.001"),
        ("principal", "none agent"),
    ])
}

/// Bootstrap probe output with the given installer line and capability
/// lines, in capability order.
pub fn bootstrap_output(installer: &str, capabilities: &[(&str, &str)]) -> String {
    let mut out = format!("---PROBE---v1\n---CHECK---installer\n{installer}\n");
    for (key, line) in capabilities {
        out.push_str(&format!("---CHECK---{key}\n{line}\n"));
    }
    out
}

pub fn all_present() -> Vec<(&'static str, &'static str)> {
    vec![
        ("amcp_cli", "present:1.4.2"),
        ("proactive_amcp", "present:0.9.0"),
        ("identity", "present:aid_old"),
        ("config", "present"),
        ("watchdog", "present"),
        ("first_checkpoint", "present:QmOldCheckpoint"),
    ]
}

pub fn all_missing() -> Vec<(&'static str, &'static str)> {
    vec![
        ("amcp_cli", "missing"),
        ("proactive_amcp", "missing"),
        ("identity", "missing"),
        ("config", "missing"),
        ("watchdog", "missing"),
        ("first_checkpoint", "missing"),
    ]
}

/// Single-capability verification output.
pub fn capability_output(key: &str, line: &str) -> String {
    format!("---CHECK---{key}\n{line}\n")
}

pub fn repair_report(fixed: u32, escalated: u32, attempts: u32) -> RepairReport {
    RepairReport {
        fixed,
        escalated,
        fixes: vec![RepairFix {
            issue: "Gateway process: not_running".to_string(),
            action: "restarted agent-gateway".to_string(),
            outcome: if escalated > 0 { "escalated" } else { "fixed" }.to_string(),
            attempts,
        }],
        summary: Some("gateway restarted".to_string()),
    }
}
