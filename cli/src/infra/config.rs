//! Infrastructure implementation of the `ConfigStore` port.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::application::ports::ConfigStore;
use crate::domain::config::AppConfig;

/// Production implementation of `ConfigStore` that reads a YAML file.
pub struct YamlConfigStore;

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<AppConfig> {
        let path = self.path()?;
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }

    fn path(&self) -> Result<PathBuf> {
        if let Ok(val) = std::env::var("HATCHERY_CONFIG") {
            return Ok(PathBuf::from(val));
        }
        Ok(crate::infra::paths::hatchery_home()?.join("config.yaml"))
    }
}
