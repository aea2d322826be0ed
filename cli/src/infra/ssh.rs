//! Remote probe transport over the system `ssh` binary.
//!
//! The script travels on stdin to `bash -s`, so nothing is interpolated into
//! the remote command line and `pgrep -f` never matches the probe itself.

use std::time::Duration;

use hatchery_common::Instance;
use tracing::debug;

use crate::application::ports::{CommandRunner, RemoteShell};
use crate::domain::error::TransportError;

/// ssh's own exit status for connection-level failures.
const SSH_FAILURE_STATUS: i32 = 255;

/// stderr fragments that mean the child rejected our credentials.
const AUTH_SIGNATURES: &[&str] = &[
    "Permission denied",
    "Too many authentication failures",
    "Host key verification failed",
];

/// `RemoteShell` that opens one ssh session per script.
pub struct SshTransport<R> {
    runner: R,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl<R: CommandRunner> SshTransport<R> {
    #[must_use]
    pub fn new(runner: R, connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            runner,
            connect_timeout,
            command_timeout,
        }
    }

    /// Arguments passed to `ssh` for `instance`.
    #[must_use]
    pub fn ssh_args(&self, instance: &Instance) -> Vec<String> {
        vec![
            "-i".to_string(),
            instance.ssh_key_ref.clone(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            format!("{}@{}", instance.ssh_user, instance.ip),
            "bash".to_string(),
            "-s".to_string(),
        ]
    }
}

impl<R: CommandRunner> RemoteShell for SshTransport<R> {
    async fn run_script(&self, instance: &Instance, script: &str) -> Result<String, TransportError> {
        let args = self.ssh_args(instance);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(instance = %instance.name, ip = %instance.ip, "opening ssh session");

        let output = self
            .runner
            .run_with_stdin("ssh", &args, script.as_bytes(), self.command_timeout)
            .await
            .map_err(|e| TransportError::Unreachable {
                instance: instance.name.clone(),
                reason: format!("{e:#}"),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        classify_exit(&instance.name, output.status.code(), &stderr)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Map ssh's exit status to a transport outcome. Any status other than 255
/// belongs to the remote script and counts as a completed session.
///
/// # Errors
///
/// Returns `AuthFailure` for 255 with an auth signature on stderr,
/// `Unreachable` for any other 255 or a signal-terminated ssh.
pub fn classify_exit(instance: &str, code: Option<i32>, stderr: &str) -> Result<(), TransportError> {
    match code {
        Some(SSH_FAILURE_STATUS) => {
            let reason = last_line(stderr);
            if AUTH_SIGNATURES.iter().any(|sig| stderr.contains(sig)) {
                Err(TransportError::AuthFailure {
                    instance: instance.to_string(),
                    reason,
                })
            } else {
                Err(TransportError::Unreachable {
                    instance: instance.to_string(),
                    reason,
                })
            }
        }
        Some(_) => Ok(()),
        None => Err(TransportError::Unreachable {
            instance: instance.to_string(),
            reason: "ssh terminated by signal".to_string(),
        }),
    }
}

fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("ssh exited with status 255")
        .to_string()
}
