//! Allocation result shape exchanged with address backends.
//!
//! This is the subset of the container-network result format the tap
//! plugin reads from its allocation backend and writes back to its caller.
//! Results with the 0.3/0.4 per-address `version` tag and 1.0 results both
//! decode; [`AllocationResult::for_version`] restamps a result for output.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::ipnet::IpNet;

/// Result of an address allocation, also used as the plugin's own result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    #[serde(rename = "cniVersion", default, skip_serializing_if = "String::is_empty")]
    pub cni_version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    #[serde(default, skip_serializing_if = "Dns::is_empty")]
    pub dns: Dns,
}

/// An interface created by the plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

/// One allocated address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConfig {
    /// Address family tag ("4" or "6"), only present in pre-1.0 results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Index into `interfaces` this address applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<usize>,

    pub address: IpNet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
}

/// One allocated route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub dst: IpNet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<IpAddr>,
}

/// DNS settings handed out by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dns {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Dns {
    /// Returns true if no DNS settings are present.
    pub fn is_empty(&self) -> bool {
        self.nameservers.is_empty()
            && self.domain.is_none()
            && self.search.is_empty()
            && self.options.is_empty()
    }
}

impl AllocationResult {
    /// Point every address at the interface with the given index.
    pub fn assign_interface(&mut self, index: usize) {
        for ip in &mut self.ips {
            ip.interface = Some(index);
        }
    }

    /// Restamp the result for the given result version.
    ///
    /// Pre-1.0 versions carry a per-address family tag; 1.0 and later drop it.
    pub fn for_version(mut self, cni_version: &str) -> Self {
        let legacy = cni_version.starts_with("0.");
        for ip in &mut self.ips {
            let family = if ip.address.is_ipv4() { "4" } else { "6" };
            ip.version = legacy.then(|| family.to_string());
        }
        self.cni_version = cni_version.to_string();
        self
    }
}
