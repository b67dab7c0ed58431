//! Protocol envelope: the verb and sandbox context passed in the environment.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use dan_descriptor::validate_sandbox_id;

use crate::error::PluginError;

/// Default search path for allocation backends.
pub const DEFAULT_PLUGIN_PATH: &str = "/opt/cni/bin";

/// Verb selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    /// Provision the network for a sandbox.
    #[value(name = "ADD")]
    Add,
    /// Tear down the network for a sandbox.
    #[value(name = "DEL")]
    Del,
    /// Validate configuration without touching the host.
    #[value(name = "CHECK")]
    Check,
    /// Report supported versions.
    #[value(name = "VERSION")]
    Version,
}

/// dantap - bridge a tap device into host networking for a sandbox.
#[derive(Debug, Clone, Parser)]
#[command(name = "dantap")]
#[command(author, version, about, long_about = None)]
pub struct Invocation {
    /// Verb to run.
    #[arg(long, env = "CNI_COMMAND", value_enum)]
    pub command: Command,

    /// Sandbox identifier.
    #[arg(long, env = "CNI_CONTAINERID")]
    pub container_id: Option<String>,

    /// Network namespace path of the sandbox.
    #[arg(long, env = "CNI_NETNS")]
    pub netns: Option<String>,

    /// Interface name requested inside the sandbox.
    #[arg(long, env = "CNI_IFNAME")]
    pub ifname: Option<String>,

    /// Extra `KEY=VALUE;...` arguments.
    #[arg(long = "cni-args", env = "CNI_ARGS")]
    pub cni_args: Option<String>,

    /// Colon-separated directories searched for allocation backends.
    #[arg(long, env = "CNI_PATH", default_value = DEFAULT_PLUGIN_PATH)]
    pub path: String,
}

impl Invocation {
    /// Build an invocation for a verb and sandbox.
    pub fn new(command: Command, container_id: impl Into<String>) -> Self {
        Self {
            command,
            container_id: Some(container_id.into()),
            netns: None,
            ifname: None,
            cni_args: None,
            path: DEFAULT_PLUGIN_PATH.to_string(),
        }
    }

    /// The sandbox identifier, validated for use as a record key.
    pub fn sandbox_id(&self) -> Result<&str, PluginError> {
        let id = self
            .container_id
            .as_deref()
            .ok_or_else(|| PluginError::InvalidEnvironment("CNI_CONTAINERID is required".to_string()))?;

        validate_sandbox_id(id)
            .map_err(|e| PluginError::InvalidEnvironment(format!("CNI_CONTAINERID: {}", e)))?;
        Ok(id)
    }

    /// Directories searched for allocation backends.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.path
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .collect()
    }
}
