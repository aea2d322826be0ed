//! Infrastructure implementation of the `InstanceRepository` port.
//!
//! One JSON document per instance under `<home>/instances/<name>.json`.
//! Blocking filesystem work runs on `tokio::task::spawn_blocking`; writes are
//! atomic (temp file + rename) so a crash never leaves a torn record.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hatchery_common::{Instance, validate_instance_name};
use tracing::{debug, warn};

use crate::application::ports::InstanceRepository;
use crate::domain::error::InstanceError;

/// File-backed instance store.
#[derive(Debug, Clone)]
pub struct JsonInstanceRepository {
    dir: PathBuf,
}

impl JsonInstanceRepository {
    /// Store rooted at `<hatchery home>/instances`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::with_dir(crate::infra::paths::instances_dir()?))
    }

    /// Store rooted at an explicit directory (used in tests).
    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(dir: &Path, name: &str) -> Result<PathBuf> {
        validate_instance_name(name).map_err(|reason| InstanceError::InvalidName {
            name: name.to_string(),
            reason,
        })?;
        Ok(dir.join(format!("{name}.json")))
    }

    fn get_sync(dir: &Path, name: &str) -> Result<Option<Instance>> {
        let path = Self::path_for(dir, name)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading instance file {}", path.display()))?;
        let instance: Instance = serde_json::from_str(&content)
            .with_context(|| format!("parsing instance file {}", path.display()))?;
        Ok(Some(instance))
    }

    fn put_sync(dir: &Path, instance: &Instance) -> Result<()> {
        let path = Self::path_for(dir, &instance.name)?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
        let content = serde_json::to_string_pretty(instance).context("serializing instance")?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("finalizing instance file {}", path.display()))?;
        debug!(instance = %instance.name, path = %path.display(), "instance saved");
        Ok(())
    }

    fn list_sync(dir: &Path) -> Result<Vec<Instance>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut instances = Vec::new();
        for entry in
            std::fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::get_sync(dir, name) {
                Ok(Some(instance)) => instances.push(instance),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), "skipping unreadable instance file: {e:#}"),
            }
        }
        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }
}

impl InstanceRepository for JsonInstanceRepository {
    async fn get(&self, name: &str) -> Result<Option<Instance>> {
        let dir = self.dir.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || Self::get_sync(&dir, &name))
            .await
            .context("instance load task panicked")?
    }

    async fn put(&self, instance: &Instance) -> Result<()> {
        let dir = self.dir.clone();
        let instance = instance.clone();
        tokio::task::spawn_blocking(move || Self::put_sync(&dir, &instance))
            .await
            .context("instance save task panicked")?
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || Self::list_sync(&dir))
            .await
            .context("instance list task panicked")?
    }
}
