//! # pamgate core
//!
//! Core types, configuration, and secrets for pamgate.
//!
//! This crate provides:
//! - The closed set of internal roles and their backend group names
//! - The process-wide role/group mapping table
//! - Secret wrappers that never show up in logs
//! - Configuration loading and validation (JSON5 format)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod roles;
pub mod secrets;

pub use config::{AuthSection, Config, ConfigError};
pub use roles::{AuthorityGrant, Role, RoleGroupTable};
pub use secrets::{Secret, scrub_secrets};
