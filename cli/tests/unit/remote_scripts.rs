//! Generated remote scripts executed under bash against stub system tools.
//!
//! The stubs report a gateway unit owned by `hatchery-svc`, so every
//! `as_svc` call takes the sudo branch. The stub `sudo` behaves like the real
//! one with `-H`: it changes `HOME` and keeps the working directory.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write as _;
use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use hatchery_cli::domain::bootstrap::{Capability, PlannedAction, action_script};
use hatchery_cli::domain::config::config_push_script;
use hatchery_common::RESULT_DELIMITER;
use tempfile::TempDir;

struct Child {
    _root: TempDir,
    stubs: PathBuf,
    login_home: PathBuf,
    svc_home: PathBuf,
}

impl Child {
    fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let stubs = root.path().join("bin");
        let login_home = root.path().join("login");
        let svc_home = root.path().join("svc");
        for dir in [&stubs, &login_home, &svc_home] {
            std::fs::create_dir_all(dir).unwrap();
        }
        let child = Self {
            _root: root,
            stubs,
            login_home,
            svc_home,
        };
        child.stub(
            "systemctl",
            "case \"$3\" in\n  LoadState) echo loaded ;;\n  User) echo hatchery-svc ;;\nesac\n",
        );
        child.stub("pgrep", "exit 1\n");
        child.stub(
            "getent",
            &format!("echo \"hatchery-svc:x:990:990::{}:/bin/sh\"\n", child.svc_home.display()),
        );
        // sudo -n -u USER -H bash -lc CMD
        child.stub(
            "sudo",
            &format!("export HOME='{}'\nshift 6\nexec bash -c \"$1\"\n", child.svc_home.display()),
        );
        child.stub(
            "amcp",
            "while [ $# -gt 0 ]; do [ \"$1\" = --out ] && OUT=$2; shift; done\n\
             mkdir -p \"$(dirname \"$OUT\")\" && printf '{\"aid\":\"aid-new\"}' >\"$OUT\"\n",
        );
        child
    }

    fn stub(&self, name: &str, body: &str) {
        let path = self.stubs.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Run `script` the way the ssh transport does: `bash -s`, script on
    /// stdin, from the login user's home.
    fn run(&self, script: &str) -> String {
        let path = format!(
            "{}:{}",
            self.stubs.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let mut bash = Command::new("bash")
            .arg("-s")
            .current_dir(&self.login_home)
            .env("HOME", &self.login_home)
            .env("PATH", path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("bash runs");
        bash.stdin
            .take()
            .unwrap()
            .write_all(script.as_bytes())
            .unwrap();
        let out = bash.wait_with_output().unwrap();
        String::from_utf8_lossy(&out.stdout).into_owned()
    }
}

fn amcp_dir(home: &Path) -> PathBuf {
    home.join(".amcp")
}

#[test]
fn test_identity_create_lands_in_service_home() {
    let child = Child::new();
    let script = action_script(Capability::Identity, PlannedAction::Create).unwrap();

    let out = child.run(&script);

    assert!(out.contains(&format!("{RESULT_DELIMITER}ok")), "output:\n{out}");
    assert!(amcp_dir(&child.svc_home).join("identity.json").is_file());
    assert!(!amcp_dir(&child.login_home).exists());
}

#[test]
fn test_identity_recreate_backs_up_in_service_home() {
    let child = Child::new();
    let dir = amcp_dir(&child.svc_home);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("identity.json"), r#"{"aid":"aid-old"}"#).unwrap();
    let script = action_script(Capability::Identity, PlannedAction::Recreate).unwrap();

    let out = child.run(&script);

    assert!(out.contains(&format!("{RESULT_DELIMITER}ok")), "output:\n{out}");
    let backups = std::fs::read_dir(&dir)
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("identity.json.bak."))
        .count();
    assert_eq!(backups, 1);
    let current = std::fs::read_to_string(dir.join("identity.json")).unwrap();
    assert!(current.contains("aid-new"));
    assert!(!amcp_dir(&child.login_home).exists());
}

#[test]
fn test_config_push_writes_service_users_document() {
    let child = Child::new();
    let doc = serde_json::json!({"anthropic": {"apiKey": "sk-ant-secret"}});

    let out = child.run(&config_push_script(&doc));

    assert!(out.contains(&format!("{RESULT_DELIMITER}ok")), "output:\n{out}");
    let written = std::fs::read_to_string(amcp_dir(&child.svc_home).join("config.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(value["anthropic"]["apiKey"], "sk-ant-secret");
    assert!(!amcp_dir(&child.login_home).exists());
}
