//! Application service: resolving instance records by name.

use anyhow::Result;
use hatchery_common::{Instance, InstanceStatus, validate_instance_name};

use crate::application::ports::InstanceRepository;
use crate::domain::error::InstanceError;

/// Validate `name` and load its record.
///
/// # Errors
///
/// Returns `InstanceError::InvalidName` before touching the store, or
/// `InstanceError::UnknownInstance` if no record exists.
pub async fn resolve(repo: &impl InstanceRepository, name: &str) -> Result<Instance> {
    validate_instance_name(name).map_err(|reason| InstanceError::InvalidName {
        name: name.to_string(),
        reason,
    })?;
    repo.get(name)
        .await?
        .ok_or_else(|| InstanceError::UnknownInstance(name.to_string()).into())
}

/// All records, optionally filtered by status.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list(
    repo: &impl InstanceRepository,
    status: Option<InstanceStatus>,
) -> Result<Vec<Instance>> {
    let mut instances = repo.list().await?;
    if let Some(status) = status {
        instances.retain(|i| i.status == status);
    }
    Ok(instances)
}
