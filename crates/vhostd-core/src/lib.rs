//! # vhostd-core — configuration, errors and logging
//!
//! Foundation crate for the vhostd HTTP server:
//!
//! - [`config`] — the virtual-host configuration model and file parser
//! - [`error`] — structured error types shared by every crate
//! - [`vlog`] — leveled stderr logging macros (`log_error!` .. `log_trace!`)

pub mod config;
pub mod error;
pub mod vlog;

pub use config::{ListenConfig, LocationConfig, ServerConfig};
pub use error::{ConfigError, ServError, ServResult};
