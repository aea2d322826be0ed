//! End-to-end tests of the `hatchery` binary against a temporary home.
//!
//! Nothing here opens a remote session: every case either fails before the
//! transport is built or only touches local records.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Home(TempDir);

impl Home {
    fn new() -> Self {
        Self(tempfile::tempdir().expect("tempdir"))
    }

    fn hatchery(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hatchery"));
        cmd.env("NO_COLOR", "1")
            .env("HATCHERY_HOME", self.0.path())
            .env_remove("HATCHERY_CONFIG")
            .env_remove("HATCHERY_LOG")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Write a minimal instance record the way the provisioner would.
    fn add_instance(&self, name: &str) {
        let dir = self.0.path().join("instances");
        std::fs::create_dir_all(&dir).unwrap();
        let record = serde_json::json!({
            "name": name,
            "ip": "203.0.113.7",
            "sshUser": "root",
            "sshKeyRef": "/keys/fleet",
            "region": "fra1",
        });
        std::fs::write(dir.join(format!("{name}.json")), record.to_string()).unwrap();
    }
}

// --- Help and version ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    Home::new()
        .hatchery()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_cli_help_lists_every_command() {
    let out = Home::new()
        .hatchery()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let help = String::from_utf8(out).unwrap();
    for command in ["diagnose", "fix", "setup-amcp", "config", "checkpoint", "list", "version"] {
        assert!(help.contains(command), "missing {command} in:\n{help}");
    }
}

#[test]
fn test_version_command_shows_version() {
    Home::new()
        .hatchery()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "hatchery {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let out = Home::new()
        .hatchery()
        .args(["version", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_no_color_env_accepts_conventional_values() {
    for value in ["1", "true", "yes", "0", ""] {
        Home::new()
            .hatchery()
            .env("NO_COLOR", value)
            .arg("version")
            .assert()
            .success();
    }
}

// --- Argument validation ---

#[test]
fn test_unknown_subcommand_exits_two() {
    Home::new().hatchery().arg("resurrect").assert().code(2);
}

#[test]
fn test_diagnose_requires_name_or_all() {
    Home::new()
        .hatchery()
        .arg("diagnose")
        .assert()
        .code(2);
}

#[test]
fn test_diagnose_name_conflicts_with_all() {
    Home::new()
        .hatchery()
        .args(["diagnose", "alpha", "--all"])
        .assert()
        .code(2);
}

#[test]
fn test_config_set_conflicts_with_push() {
    Home::new()
        .hatchery()
        .args(["config", "alpha", "--set", "pinata_jwt=x", "--push"])
        .assert()
        .code(2);
}

// --- Local records ---

#[test]
fn test_list_empty_home() {
    Home::new()
        .hatchery()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No instances"));
}

#[test]
fn test_list_json_omits_credentials() {
    let home = Home::new();
    home.add_instance("alpha");

    let out = home
        .hatchery()
        .args(["list", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rows: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(rows[0]["name"], "alpha");
    assert_eq!(rows[0]["status"], "unknown");
    assert!(rows[0].get("sshKeyRef").is_none());
    assert!(rows[0].get("gatewayToken").is_none());
}

#[test]
fn test_list_filters_by_status() {
    let home = Home::new();
    home.add_instance("alpha");

    home.hatchery()
        .args(["list", "--status", "healthy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha").not());
}

#[test]
fn test_unknown_instance_json_error() {
    let out = Home::new()
        .hatchery()
        .args(["--json", "checkpoint", "ghost"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "unknown_instance");
    assert!(value["message"].as_str().unwrap().contains("ghost"));
}

#[test]
fn test_unknown_instance_human_error() {
    Home::new()
        .hatchery()
        .args(["diagnose", "ghost"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:").and(predicate::str::contains("ghost")));
}

#[test]
fn test_invalid_instance_name_rejected() {
    Home::new()
        .hatchery()
        .args(["config", "../etc", "--show"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid instance name"));
}

#[test]
fn test_config_set_then_show_masks_values() {
    let home = Home::new();
    home.add_instance("alpha");

    home.hatchery()
        .args(["config", "alpha", "--set", "anthropic_api_key=sk-ant-api03-secretvalue"])
        .assert()
        .success()
        .stdout(predicate::str::contains("anthropic_api_key"));

    home.hatchery()
        .args(["config", "alpha", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sk-a****"))
        .stdout(predicate::str::contains("secretvalue").not());

    let out = home
        .hatchery()
        .args(["--json", "config", "alpha"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["secrets"]["anthropic_api_key"], "sk-a****");
}

#[test]
fn test_config_set_unknown_key_lists_valid_keys() {
    let home = Home::new();
    home.add_instance("alpha");

    home.hatchery()
        .args(["config", "alpha", "--set", "openai_key=abc"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Valid settings"))
        .stderr(predicate::str::contains("pinata_jwt"));
}

#[test]
fn test_config_file_parse_error_is_reported() {
    let home = Home::new();
    std::fs::write(home.0.path().join("config.yaml"), "ssh: [not, a, map").unwrap();

    home.hatchery()
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config.yaml"));
}
