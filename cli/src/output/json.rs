//! JSON output helpers.
//!
//! Provides the error-object formatter used by all `--json` code paths when
//! a command fails, and the printer for successful results.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::error::{BootstrapError, InstanceError, TransportError};

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Format a JSON error object that also carries the partial result of the
/// failed command under `report`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_failure<T: Serialize + ?Sized>(
    message: &str,
    code: &str,
    report: &T,
) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
        "report": report,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Print `value` as pretty JSON on stdout.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("JSON serialization failed")?
    );
    Ok(())
}

/// Stable code for a failed command, from the typed error at the root of the
/// chain.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<TransportError>() {
        return e.code();
    }
    if let Some(e) = err.downcast_ref::<InstanceError>() {
        return match e {
            InstanceError::UnknownInstance(_) => "unknown_instance",
            InstanceError::InvalidName { .. } => "error",
        };
    }
    if err.downcast_ref::<BootstrapError>().is_some() {
        return "bootstrap_failed";
    }
    "error"
}
