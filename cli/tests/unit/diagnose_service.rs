//! Diagnose use-case against scripted remote output.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use hatchery_cli::application::services::diagnose::diagnose;
use hatchery_cli::domain::error::TransportError;
use hatchery_cli::domain::health::{CheckId, Outcome, OverallState};
use hatchery_common::{AmcpStatus, InstanceStatus};

use crate::helpers::{DIAGNOSTIC, diagnostic_output, healthy_output, instance, offline_output, settings};
use crate::mocks::{MemoryRepo, NoShell, ScriptedShell, SilentReporter};

#[tokio::test]
async fn test_diagnose_healthy_instance() {
    let shell = ScriptedShell::new().on(DIAGNOSTIC, &healthy_output());
    let repo = MemoryRepo::with([instance("alpha")]);

    let report = diagnose(&shell, &repo, &SilentReporter, "alpha", &settings())
        .await
        .unwrap();

    assert_eq!(report.overall_state, OverallState::Healthy);
    assert_eq!(report.checks_passed, CheckId::ALL.len());
    assert_eq!(report.checks_failed, 0);
    assert_eq!(shell.scripts().len(), 1, "one remote session per diagnosis");

    let stored = repo.stored("alpha");
    assert_eq!(stored.status, InstanceStatus::Healthy);
    assert!(stored.last_diagnosed_at.is_some());
}

#[tokio::test]
async fn test_diagnose_gateway_down_is_offline_regardless_of_other_checks() {
    let shell = ScriptedShell::new().on(DIAGNOSTIC, &offline_output());
    let repo = MemoryRepo::with([instance("alpha")]);

    let report = diagnose(&shell, &repo, &SilentReporter, "alpha", &settings())
        .await
        .unwrap();

    assert_eq!(report.overall_state, OverallState::Offline);
    assert_eq!(repo.stored("alpha").status, InstanceStatus::Offline);
}

#[tokio::test]
async fn test_diagnose_disk_warning_is_degraded() {
    let shell = ScriptedShell::new().on(DIAGNOSTIC, &diagnostic_output(&[("disk", "85")]));
    let repo = MemoryRepo::with([instance("alpha")]);

    let report = diagnose(&shell, &repo, &SilentReporter, "alpha", &settings())
        .await
        .unwrap();

    assert_eq!(report.overall_state, OverallState::Degraded);
    assert_eq!(report.checks_failed, 1);
    let disk = report.checks.iter().find(|c| c.id == CheckId::Disk).unwrap();
    assert_eq!(disk.outcome, Outcome::Warn);
}

#[tokio::test]
async fn test_diagnose_transport_failure_is_unreachable_and_persisted() {
    let shell = ScriptedShell::new().on_err(
        DIAGNOSTIC,
        TransportError::Unreachable {
            instance: "alpha".into(),
            reason: "Connection timed out".into(),
        },
    );
    let mut record = instance("alpha");
    record.status = InstanceStatus::Healthy;
    let repo = MemoryRepo::with([record]);

    let report = diagnose(&shell, &repo, &SilentReporter, "alpha", &settings())
        .await
        .unwrap();

    assert_eq!(report.overall_state, OverallState::Unreachable);
    assert!(report.checks.is_empty(), "no checks ran");
    assert_eq!(report.transport_error.as_ref().unwrap().kind, "unreachable");
    assert_eq!(repo.stored("alpha").status, InstanceStatus::Unreachable);
}

#[tokio::test]
async fn test_diagnose_auth_failure_keeps_its_kind() {
    let shell = ScriptedShell::new().on_err(
        DIAGNOSTIC,
        TransportError::AuthFailure {
            instance: "alpha".into(),
            reason: "Permission denied (publickey)".into(),
        },
    );
    let repo = MemoryRepo::with([instance("alpha")]);

    let report = diagnose(&shell, &repo, &SilentReporter, "alpha", &settings())
        .await
        .unwrap();

    assert_eq!(report.overall_state, OverallState::Unreachable);
    assert_eq!(report.transport_error.unwrap().kind, "auth_failure");
}

#[tokio::test]
async fn test_diagnose_unknown_instance_never_opens_a_session() {
    let repo = MemoryRepo::default();
    let err = diagnose(&NoShell, &repo, &SilentReporter, "ghost", &settings())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));
    assert_eq!(repo.put_count(), 0);
}

#[tokio::test]
async fn test_diagnose_invalid_name_rejected_before_lookup() {
    let repo = MemoryRepo::default();
    let err = diagnose(&NoShell, &repo, &SilentReporter, "../etc", &settings())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid instance name"), "got: {err}");
}

#[tokio::test]
async fn test_diagnose_marks_bootstrapped_amcp_degraded_on_amcp_errors() {
    let shell = ScriptedShell::new().on(DIAGNOSTIC, &diagnostic_output(&[("identity", "missing")]));
    let mut record = instance("alpha");
    record.amcp_status = AmcpStatus::Bootstrapped;
    let repo = MemoryRepo::with([record]);

    diagnose(&shell, &repo, &SilentReporter, "alpha", &settings())
        .await
        .unwrap();

    assert_eq!(repo.stored("alpha").amcp_status, AmcpStatus::Degraded);
}

#[tokio::test]
async fn test_diagnose_garbled_section_is_an_unparseable_error_check() {
    let shell = ScriptedShell::new().on(DIAGNOSTIC, &diagnostic_output(&[("memory", "lots")]));
    let repo = MemoryRepo::with([instance("alpha")]);

    let report = diagnose(&shell, &repo, &SilentReporter, "alpha", &settings())
        .await
        .unwrap();

    let memory = report.checks.iter().find(|c| c.id == CheckId::Memory).unwrap();
    assert_eq!(memory.outcome, Outcome::Error);
    assert_eq!(memory.detail, "unparseable");
    assert_eq!(report.checks.len(), CheckId::ALL.len());
}
