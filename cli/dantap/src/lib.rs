//! dantap - directly attachable network plugin
//!
//! Gives a sandbox a tap device bridged into host networking. On ADD it
//! ensures the host bridge exists, creates and attaches a per-sandbox tap
//! device, asks an allocation backend for addresses, and records a
//! descriptor so later teardown and out-of-process network configurators
//! can find the same information by sandbox id.
//!
//! ## Modules
//!
//! - `args`: protocol envelope (verb, sandbox id, backend search path)
//! - `config`: network configuration document and process settings
//! - `link`: host link seam and its iproute2 implementation
//! - `ipam`: allocation backend seam and its exec implementation
//! - `rollback`: compensating action stack
//! - `provision` / `deprovision`: the ADD and DEL workflows
//! - `plugin`: verb dispatch

pub mod args;
pub mod config;
pub mod deprovision;
pub mod error;
pub mod ipam;
pub mod link;
pub mod logging;
pub mod plugin;
pub mod provision;
pub mod rollback;

// Re-export commonly used types
pub use args::{Command, Invocation};
pub use config::{NetConf, PluginConfig};
pub use error::{ErrorResponse, IpamError, LinkError, PluginError};
pub use ipam::{ExecIpam, Ipam};
pub use link::{IpCommand, Link, LinkLayer};
pub use plugin::Plugin;
