//! Property-based tests for state derivation and secret handling.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::Utc;
use proptest::prelude::*;

use hatchery_cli::domain::checkpoint::extract_cid;
use hatchery_cli::domain::config::{KEY_MAPPING, Secrets, mask_secret, parse_assignment, remote_document};
use hatchery_cli::domain::health::{
    CheckId, DiagnosticReport, HealthCheck, Outcome, OverallState, derive_state,
};

fn outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Ok), Just(Outcome::Warn), Just(Outcome::Error)]
}

fn checks() -> impl Strategy<Value = Vec<HealthCheck>> {
    prop::collection::vec(outcome(), CheckId::ALL.len()).prop_map(|outcomes| {
        CheckId::ALL
            .iter()
            .zip(outcomes)
            .map(|(&id, outcome)| HealthCheck::new(id, outcome, "x"))
            .collect()
    })
}

// ============================================================================
// derive_state()
// ============================================================================

proptest! {
    /// A transport failure wins over anything the checks say.
    #[test]
    fn prop_transport_failure_is_always_unreachable(checks in checks()) {
        prop_assert_eq!(derive_state(true, &checks), OverallState::Unreachable);
    }

    /// Gateway down means offline, whatever else failed.
    #[test]
    fn prop_gateway_error_is_offline(mut checks in checks()) {
        checks[1] = HealthCheck::new(CheckId::GatewayProcess, Outcome::Error, "not_running");
        prop_assert_eq!(derive_state(false, &checks), OverallState::Offline);
    }

    /// Otherwise the state is healthy exactly when nothing failed.
    #[test]
    fn prop_healthy_iff_no_failures(checks in checks()) {
        let gateway_down = checks
            .iter()
            .any(|c| c.id == CheckId::GatewayProcess && c.outcome == Outcome::Error);
        prop_assume!(!gateway_down);
        let state = derive_state(false, &checks);
        let any_failed = checks.iter().any(HealthCheck::is_failed);
        prop_assert_eq!(state == OverallState::Healthy, !any_failed);
        prop_assert_eq!(state == OverallState::Degraded, any_failed);
    }

    /// Passed plus failed always covers every check.
    #[test]
    fn prop_report_counts_cover_all_checks(checks in checks()) {
        let total = checks.len();
        let report = DiagnosticReport::from_checks("alpha", Some(1), checks, Utc::now());
        prop_assert_eq!(report.checks_passed + report.checks_failed, total);
    }
}

// ============================================================================
// Secrets
// ============================================================================

proptest! {
    /// Masking never shows more than a four-character prefix.
    #[test]
    fn prop_mask_never_leaks_the_tail(value in "[A-Za-z0-9_.-]{0,64}") {
        let masked = mask_secret(&value);
        prop_assert!(masked.ends_with("****"));
        prop_assert!(masked.chars().count() <= 8);
        if value.chars().count() > 8 {
            prop_assert!(!masked.contains(&value[4..]));
        }
    }

    /// Assignments to unmapped keys are always rejected.
    #[test]
    fn prop_unknown_keys_rejected(key in "[a-z_]{1,24}", value in "[a-z0-9]{1,16}") {
        prop_assume!(!KEY_MAPPING.iter().any(|(k, _)| *k == key));
        let assignment = format!("{key}={value}");
        prop_assert!(parse_assignment(&assignment).is_err());
    }

    /// Values keep everything after the first `=`.
    #[test]
    fn prop_assignment_keeps_equals_in_value(value in "[A-Za-z0-9]{1,16}=[A-Za-z0-9=]{0,16}") {
        let (key, parsed) = parse_assignment(&format!("pinata_jwt={value}")).unwrap();
        prop_assert_eq!(key, "pinata_jwt");
        prop_assert_eq!(parsed, value);
    }

    /// The pushed document carries exactly the mapped keys that are stored.
    #[test]
    fn prop_remote_document_pushes_only_stored_keys(mask in prop::collection::vec(any::<bool>(), KEY_MAPPING.len())) {
        let secrets: Secrets = KEY_MAPPING
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|((local, _), _)| ((*local).to_string(), "v".to_string()))
            .collect();
        let (_, pushed) = remote_document(&secrets);
        prop_assert_eq!(pushed.len(), secrets.len());
    }
}

// ============================================================================
// extract_cid()
// ============================================================================

proptest! {
    /// Whatever follows "Checkpoint created:" is returned verbatim.
    #[test]
    fn prop_created_line_cid_is_verbatim(
        noise in "[a-z ]{0,40}",
        cid in "[A-Za-z0-9]{8,60}",
    ) {
        let output = format!("{noise}\nCheckpoint created: {cid}\n");
        prop_assert_eq!(extract_cid(&output), Some(cid));
    }
}
