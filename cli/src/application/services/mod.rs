//! Application services: use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`, never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod bootstrap;
pub mod checkpoint;
pub mod config_push;
pub mod diagnose;
pub mod fleet;
pub mod instance;
pub mod remediation;
