//! Wire constants shared by the probe scripts and their decoders.
//!
//! Every remote script writes plain text. Sections are introduced by a
//! delimiter line; the text after the delimiter on the same line is the
//! section key.

/// Version of the diagnostic battery. Bump when check order or grammar changes.
pub const PROBE_VERSION: u32 = 1;

/// First line written by every probe script, followed by the version number.
pub const PROBE_HEADER: &str = "---PROBE---v";

/// Starts a check section: `---CHECK---<id>`.
pub const CHECK_DELIMITER: &str = "---CHECK---";

/// Terminal marker of an action script: `---RESULT---ok[:detail]` or
/// `---RESULT---error:<reason>`.
pub const RESULT_DELIMITER: &str = "---RESULT---";

/// Precedes the JSON document printed by the on-box repair agent.
pub const REPAIR_DELIMITER: &str = "---REPAIR---";

/// Validate an instance name: `^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$`.
///
/// Names double as file names in the metadata store, so anything that could
/// escape the store directory is rejected.
pub fn validate_instance_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() || name.len() > 63 {
        return Err("instance name must be 1-63 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("instance name may only contain [a-z0-9-]");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err("instance name must not start or end with '-'");
    }
    Ok(())
}
