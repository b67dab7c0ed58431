//! Verb dispatch.

use serde::Serialize;
use tracing::{debug, info};

use dan_descriptor::{AllocationResult, DescriptorStore};

use crate::args::{Command, Invocation};
use crate::config::{NetConf, DEFAULT_CNI_VERSION, SUPPORTED_VERSIONS};
use crate::deprovision::{Deprovisioner, TeardownRequest};
use crate::error::PluginError;
use crate::ipam::Ipam;
use crate::link::LinkLayer;
use crate::provision::{ProvisionRequest, ResourceProvisioner};

/// Answer to the VERSION verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    #[serde(rename = "supportedVersions")]
    pub supported_versions: Vec<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            cni_version: DEFAULT_CNI_VERSION.to_string(),
            supported_versions: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// The tap plugin bound to its collaborators.
pub struct Plugin<L, I> {
    link: L,
    ipam: I,
    store: DescriptorStore,
}

impl<L: LinkLayer, I: Ipam> Plugin<L, I> {
    /// Create a plugin.
    pub fn new(link: L, ipam: I, store: DescriptorStore) -> Self {
        Self { link, ipam, store }
    }

    /// Link layer in use.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Allocation backend in use.
    pub fn ipam(&self) -> &I {
        &self.ipam
    }

    /// Descriptor store in use.
    pub fn store(&self) -> &DescriptorStore {
        &self.store
    }

    /// Run the verb of an invocation. Returns the JSON to print, if any.
    pub fn run(&self, invocation: &Invocation, stdin: &[u8]) -> Result<Option<String>, PluginError> {
        debug!(command = ?invocation.command, container_id = ?invocation.container_id, "Invocation");

        let output = match invocation.command {
            Command::Add => {
                let result = self.cmd_add(invocation.sandbox_id()?, stdin)?;
                Some(serde_json::to_string(&result)?)
            }
            Command::Del => {
                self.cmd_del(invocation.sandbox_id()?, stdin)?;
                None
            }
            Command::Check => {
                invocation.sandbox_id()?;
                self.cmd_check(stdin)?;
                None
            }
            Command::Version => Some(serde_json::to_string(&VersionInfo::default())?),
        };
        Ok(output)
    }

    /// Provision the network for a sandbox.
    pub fn cmd_add(&self, sandbox_id: &str, stdin: &[u8]) -> Result<AllocationResult, PluginError> {
        let conf = NetConf::load(stdin)?;
        debug!(conf = ?conf, "cmdAdd conf");

        let request = ProvisionRequest {
            sandbox_id,
            conf: &conf,
            payload: stdin,
        };
        ResourceProvisioner::new(&self.link, &self.ipam, &self.store).provision(&request)
    }

    /// Tear down the network for a sandbox.
    pub fn cmd_del(&self, sandbox_id: &str, stdin: &[u8]) -> Result<(), PluginError> {
        let conf = NetConf::load_for_teardown(stdin)?;
        debug!(conf = ?conf, "cmdDel conf");

        let request = TeardownRequest {
            sandbox_id,
            conf: &conf,
            payload: stdin,
        };
        Deprovisioner::new(&self.link, &self.ipam, &self.store).deprovision(&request)
    }

    /// Validate configuration only.
    pub fn cmd_check(&self, stdin: &[u8]) -> Result<(), PluginError> {
        let conf = NetConf::load(stdin)?;
        info!(network = %conf.name, bridge = %conf.bridge, "Configuration valid");
        Ok(())
    }
}

/// Best-effort result version from a configuration document, for error output.
pub fn version_hint(stdin: &[u8]) -> String {
    NetConf::parse(stdin)
        .ok()
        .map(|conf| conf.result_version().to_string())
        .unwrap_or_else(|| DEFAULT_CNI_VERSION.to_string())
}
