//! Infrastructure implementation of the `SecretsStore` port.
//!
//! Flat JSON string maps under `<home>/secrets/<name>.json`, mode 0600.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hatchery_common::validate_instance_name;

use crate::application::ports::SecretsStore;
use crate::domain::config::Secrets;
use crate::domain::error::InstanceError;

#[derive(Debug, Clone)]
pub struct FileSecretsStore {
    dir: PathBuf,
}

impl FileSecretsStore {
    /// Store rooted at `<hatchery home>/secrets`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::with_dir(crate::infra::paths::secrets_dir()?))
    }

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

    fn load_sync(dir: &Path, name: &str) -> Result<Secrets> {
        let path = Self::path_for(dir, name)?;
        if !path.exists() {
            return Ok(Secrets::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading secrets file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing secrets file {}", path.display()))
    }

    fn save_sync(dir: &Path, name: &str, secrets: &Secrets) -> Result<()> {
        let path = Self::path_for(dir, name)?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
                .with_context(|| format!("setting permissions on {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(secrets).context("serializing secrets")?;
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
            .with_context(|| format!("finalizing secrets file {}", path.display()))
    }
}

impl SecretsStore for FileSecretsStore {
    async fn load(&self, name: &str) -> Result<Secrets> {
        let dir = self.dir.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || Self::load_sync(&dir, &name))
            .await
            .context("secrets load task panicked")?
    }

    async fn save(&self, name: &str, secrets: &Secrets) -> Result<()> {
        let dir = self.dir.clone();
        let name = name.to_string();
        let secrets = secrets.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&dir, &name, &secrets))
            .await
            .context("secrets save task panicked")?
    }
}
