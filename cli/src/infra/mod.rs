//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the ssh
//! transport, the local stores, and the HTTP collaborators.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod command_runner;
pub mod config;
pub mod knowledge;
pub mod notify;
pub mod paths;
pub mod repair;
pub mod secrets;
pub mod ssh;
pub mod state;
