//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── Transport errors ──────────────────────────────────────────────────────────

/// Failure to establish or complete a remote session with a child.
///
/// Both variants mean "could not even try": no check or action ran.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Instance '{instance}' is unreachable: {reason}")]
    Unreachable { instance: String, reason: String },

    #[error("Authentication to '{instance}' was rejected: {reason}")]
    AuthFailure { instance: String, reason: String },
}

impl TransportError {
    /// Stable machine-readable code used in JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "unreachable",
            Self::AuthFailure { .. } => "auth_failure",
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Unreachable { reason, .. } | Self::AuthFailure { reason, .. } => reason,
        }
    }
}

// ── Instance errors ───────────────────────────────────────────────────────────

/// Errors related to resolving an instance record.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("Unknown instance '{0}'. Run 'hatchery list' to see managed instances.")]
    UnknownInstance(String),

    #[error("Invalid instance name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}

// ── Probe decoding ────────────────────────────────────────────────────────────

/// A single check's output did not match its grammar.
///
/// Local to that check: the decoder turns it into an `error` outcome with
/// detail `"unparseable"`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Malformed output for check '{check}': {raw:?}")]
pub struct MalformedProbeOutput {
    pub check: String,
    pub raw: String,
}

// ── Bootstrap errors ──────────────────────────────────────────────────────────

/// Errors that stop a bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(
        "Package installer (npm) is not available on '{instance}' and capabilities are missing: {missing}"
    )]
    InstallerUnavailable { instance: String, missing: String },

    #[error("Bootstrap step '{step}' failed: {reason}")]
    ActionFailed { step: String, reason: String },
}

// ── Checkpoint errors ─────────────────────────────────────────────────────────

/// The checkpoint command ran but reported failure.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint failed on '{instance}': {reason}")]
    ActionFailed { instance: String, reason: String },
}

// ── Remediation errors ────────────────────────────────────────────────────────

/// The repair agent could not be run or returned an unusable result.
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("Repair agent failed on '{instance}': {reason}")]
    ActionFailed { instance: String, reason: String },
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to local secrets keys and assignments.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid assignment '{0}': expected key=value")]
    InvalidAssignment(String),

    #[error("Value for {0} must not be empty")]
    EmptyValue(String),
}
