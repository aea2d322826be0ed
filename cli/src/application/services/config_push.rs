//! Application service: per-instance secrets (show, set, push) for the
//! child's AMCP config.

use anyhow::{Context, Result};
use hatchery_common::Instance;
use tracing::info;

use crate::application::ports::{ConfigPusher, InstanceRepository, RemoteShell, SecretsStore};
use crate::application::services::instance;
use crate::domain::config::{Secrets, config_push_script, mask_secret, parse_assignment, remote_document};
use crate::domain::probe::{ActionResult, classify_result};

/// Stored keys with masked values, sorted by key.
///
/// # Errors
///
/// Returns an error for an unknown instance or an unreadable secrets file.
pub async fn show(
    repo: &impl InstanceRepository,
    secrets: &impl SecretsStore,
    name: &str,
) -> Result<Vec<(String, String)>> {
    instance::resolve(repo, name).await?;
    let stored = secrets.load(name).await?;
    Ok(stored
        .iter()
        .map(|(k, v)| (k.clone(), mask_secret(v)))
        .collect())
}

/// Store one `key=value` assignment. Returns the key.
///
/// # Errors
///
/// Returns an error for an unknown instance, an invalid assignment, or a
/// failed write.
pub async fn set(
    repo: &impl InstanceRepository,
    secrets: &impl SecretsStore,
    name: &str,
    assignment: &str,
) -> Result<String> {
    instance::resolve(repo, name).await?;
    let (key, value) = parse_assignment(assignment)?;
    let mut stored = secrets.load(name).await?;
    stored.insert(key.clone(), value);
    secrets.save(name, &stored).await?;
    info!(instance = %name, %key, "secret stored");
    Ok(key)
}

/// Push the stored secrets of `name`. Returns the remote keys written.
///
/// # Errors
///
/// Returns an error for an unknown instance or a failed push.
pub async fn push(
    shell: &impl RemoteShell,
    repo: &impl InstanceRepository,
    secrets: &impl SecretsStore,
    name: &str,
) -> Result<Vec<String>> {
    let instance = instance::resolve(repo, name).await?;
    SecretsPusher::new(shell, secrets).push(&instance).await
}

/// `ConfigPusher` backed by the local secrets store.
pub struct SecretsPusher<'a, S, K> {
    shell: &'a S,
    secrets: &'a K,
}

impl<'a, S, K> SecretsPusher<'a, S, K> {
    pub fn new(shell: &'a S, secrets: &'a K) -> Self {
        Self { shell, secrets }
    }
}

impl<S: RemoteShell, K: SecretsStore> ConfigPusher for SecretsPusher<'_, S, K> {
    async fn push(&self, instance: &Instance) -> Result<Vec<String>> {
        let name = &instance.name;
        let mut stored: Secrets = self
            .secrets
            .load(name)
            .await
            .with_context(|| format!("loading secrets for {name}"))?;
        if let Some(token) = &instance.gateway_token {
            stored
                .entry("gateway_token".to_string())
                .or_insert_with(|| token.clone());
        }
        let (document, keys) = remote_document(&stored);
        if keys.is_empty() {
            anyhow::bail!(
                "no secrets stored for {name}. Run: hatchery config {name} --set <key>=<value>"
            );
        }

        let output = self
            .shell
            .run_script(instance, &config_push_script(&document))
            .await?;
        match classify_result(&output) {
            ActionResult::Ok(_) => {
                info!(instance = %name, keys = keys.len(), "config pushed");
                Ok(keys.into_iter().map(str::to_string).collect())
            }
            ActionResult::Failed(reason) => anyhow::bail!("config push failed: {reason}"),
            ActionResult::NoMarker => {
                anyhow::bail!("config push ended without reporting a result")
            }
        }
    }
}
