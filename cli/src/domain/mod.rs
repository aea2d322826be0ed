//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod bootstrap;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod health;
pub mod probe;
pub mod remediation;

pub use config::AppConfig;
pub use error::{
    BootstrapError, CheckpointError, ConfigError, InstanceError, MalformedProbeOutput,
    RemediationError, TransportError,
};
pub use health::{CheckId, DiagnosticReport, HealthCheck, Outcome, OverallState, Thresholds};
