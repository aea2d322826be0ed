//! Command implementations
//!
//! Each command wires `AppContext` adapters into one application service and
//! renders the result. Commands return the process exit code; errors bubble
//! to `main`, which formats them for the active output mode.

pub mod checkpoint;
pub mod config;
pub mod diagnose;
pub mod fix;
pub mod list;
pub mod setup_amcp;
pub mod version;
