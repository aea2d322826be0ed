//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `hatchery_common`, never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use hatchery_common::{Instance, NotifyTarget};

use crate::domain::config::{AppConfig, Secrets};
use crate::domain::error::TransportError;
use crate::domain::remediation::{EscalationNotice, PriorSolution, RepairReport, RepairRequest};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program with stdin piped from `input`, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Remote Execution Port ─────────────────────────────────────────────────────

/// One remote session per call: the whole script runs in a single round trip.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Execute `script` on `instance` and return its stdout.
    ///
    /// A non-zero exit of the script itself is not an error; checks report
    /// their results in-band.
    async fn run_script(&self, instance: &Instance, script: &str) -> Result<String, TransportError>;
}

// ── Persistence Ports ─────────────────────────────────────────────────────────

/// Durable per-instance metadata, keyed by instance name.
#[allow(async_fn_in_trait)]
pub trait InstanceRepository {
    /// Load one record, `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<Instance>>;
    /// Replace the record atomically.
    async fn put(&self, instance: &Instance) -> Result<()>;
    /// Every record, sorted by name.
    async fn list(&self) -> Result<Vec<Instance>>;
}

/// Local secrets documents, one per instance.
#[allow(async_fn_in_trait)]
pub trait SecretsStore {
    /// Load the document, empty if none exists.
    async fn load(&self, name: &str) -> Result<Secrets>;
    async fn save(&self, name: &str, secrets: &Secrets) -> Result<()>;
}

/// Abstracts app config loading so commands can be tested without touching
/// the user's home directory.
pub trait ConfigStore {
    /// Load the config, defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<AppConfig>;
    /// Path of the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}

// ── Collaborator Ports ────────────────────────────────────────────────────────

/// Writes the instance's secrets into the child's AMCP config.
#[allow(async_fn_in_trait)]
pub trait ConfigPusher {
    /// Push and return the remote keys written.
    async fn push(&self, instance: &Instance) -> Result<Vec<String>>;
}

/// Looks up fixes that worked before.
#[allow(async_fn_in_trait)]
pub trait KnowledgeSearch {
    async fn search(&self, query: &str) -> Result<Vec<PriorSolution>>;
}

/// The on-box agent that edits files and restarts services.
#[allow(async_fn_in_trait)]
pub trait RepairAgent {
    async fn repair(&self, instance: &Instance, request: &RepairRequest) -> Result<RepairReport>;
}

/// Delivers escalation notices to an instance's parent.
#[allow(async_fn_in_trait)]
pub trait EscalationNotifier {
    async fn notify(&self, target: &NotifyTarget, notice: &EscalationNotice) -> Result<()>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Synchronous.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}
