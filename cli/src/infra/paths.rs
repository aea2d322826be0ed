//! Local filesystem layout under the hatchery home directory.

use std::path::PathBuf;

use anyhow::Result;

/// `$HATCHERY_HOME`, else `~/.hatchery`.
///
/// # Errors
///
/// Returns an error if neither the override nor a home directory is
/// available.
pub fn hatchery_home() -> Result<PathBuf> {
    if let Ok(val) = std::env::var("HATCHERY_HOME")
        && !val.is_empty()
    {
        return Ok(PathBuf::from(val));
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".hatchery"))
}

/// Directory holding one metadata record per instance.
///
/// # Errors
///
/// See [`hatchery_home`].
pub fn instances_dir() -> Result<PathBuf> {
    Ok(hatchery_home()?.join("instances"))
}

/// Directory holding one secrets document per instance.
///
/// # Errors
///
/// See [`hatchery_home`].
pub fn secrets_dir() -> Result<PathBuf> {
    Ok(hatchery_home()?.join("secrets"))
}
