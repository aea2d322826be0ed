//! Application context: unified state passed to every command handler.
//!
//! `AppContext` owns the output context, the loaded configuration, and the
//! production adapters, so adding a cross-cutting concern changes one struct
//! and zero command signatures.

use std::time::Duration;

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::config::AppConfig;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::YamlConfigStore;
use crate::infra::secrets::FileSecretsStore;
use crate::infra::ssh::SshTransport;
use crate::infra::state::JsonInstanceRepository;
use crate::output::OutputContext;

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `HATCHERY_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context. Always quiet in JSON mode so progress never
    /// interleaves with the document on stdout.
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Loaded `config.yaml`, defaults when absent.
    pub config: AppConfig,
    /// Instance metadata store.
    pub instances: JsonInstanceRepository,
    /// Per-instance secrets store.
    pub secrets: FileSecretsStore,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `HATCHERY_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or
    /// `config.yaml` exists but cannot be parsed.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("HATCHERY_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };
        let quiet = flags.output.quiet || flags.output.json;

        Ok(Self {
            output: OutputContext::new(flags.output.no_color, quiet),
            mode,
            config: YamlConfigStore.load()?,
            instances: JsonInstanceRepository::new()?,
            secrets: FileSecretsStore::new()?,
            non_interactive,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Transport for probes and short actions.
    #[must_use]
    pub fn shell(&self) -> SshTransport<TokioCommandRunner> {
        self.transport(self.config.ssh.command_timeout_secs)
    }

    /// Transport for the repair agent, which may run for many minutes.
    #[must_use]
    pub fn repair_shell(&self) -> SshTransport<TokioCommandRunner> {
        self.transport(self.config.ssh.repair_timeout_secs)
    }

    fn transport(&self, command_timeout_secs: u64) -> SshTransport<TokioCommandRunner> {
        SshTransport::new(
            TokioCommandRunner::new(),
            Duration::from_secs(self.config.ssh.connect_timeout_secs),
            Duration::from_secs(command_timeout_secs),
        )
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `HATCHERY_YES`
    /// env), returns `true` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(true);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}
