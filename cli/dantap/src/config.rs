//! Configuration for the tap plugin.
//!
//! Two sources feed a run:
//! - [`NetConf`]: the network configuration document on standard input
//! - [`PluginConfig`]: process settings from `DAN_*` environment variables

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use dan_descriptor::{IpNet, DEFAULT_BASE_DIR};

use crate::error::PluginError;

/// Result versions this plugin can emit.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.3.0", "0.3.1", "0.4.0", "1.0.0"];

/// Version assumed when the configuration does not name one.
pub const DEFAULT_CNI_VERSION: &str = "1.0.0";

/// Interface names are limited to 15 bytes (IFNAMSIZ - 1).
pub const MAX_IFNAME_LEN: usize = 15;

/// Prefix of derived tap device names.
const TAP_PREFIX: &str = "dan";

/// Hex digits of the sandbox hash used in derived names.
const TAP_HASH_LEN: usize = MAX_IFNAME_LEN - TAP_PREFIX.len();

/// Network configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetConf {
    #[serde(rename = "cniVersion", default)]
    pub cni_version: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub plugin_type: String,

    #[serde(default)]
    pub ipam: IpamConf,

    /// Host bridge the tap device is attached to.
    #[serde(default)]
    pub bridge: String,

    /// Address given to the bridge when it has to be created (CIDR).
    #[serde(rename = "bridgeIP", default)]
    pub bridge_ip: String,

    /// Fixed host-side device name instead of one derived from the sandbox id.
    #[serde(rename = "tapName", default)]
    pub tap_name: Option<String>,
}

/// Allocation backend section. Everything except `type` is read by the backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpamConf {
    #[serde(rename = "type", default)]
    pub plugin_type: String,
}

impl NetConf {
    /// Parse a configuration document.
    pub fn parse(bytes: &[u8]) -> Result<Self, PluginError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Parse and validate a configuration document.
    pub fn load(bytes: &[u8]) -> Result<Self, PluginError> {
        let conf = Self::parse(bytes)?;
        conf.validate()?;
        Ok(conf)
    }

    /// Parse a configuration document for teardown.
    ///
    /// Only the allocation backend is required, so networks created under an
    /// older or since-edited configuration can still be removed.
    pub fn load_for_teardown(bytes: &[u8]) -> Result<Self, PluginError> {
        let conf = Self::parse(bytes)?;
        conf.require_ipam()?;
        Ok(conf)
    }

    /// Check the fields the plugin relies on.
    pub fn validate(&self) -> Result<(), PluginError> {
        if !self.cni_version.is_empty() && !SUPPORTED_VERSIONS.contains(&self.cni_version.as_str()) {
            return Err(PluginError::IncompatibleVersion(self.cni_version.clone()));
        }

        self.require_ipam()?;

        validate_ifname("bridge", &self.bridge)?;
        self.bridge_address()?;

        if let Some(tap_name) = &self.tap_name {
            validate_ifname("tapName", tap_name)?;
        }

        Ok(())
    }

    fn require_ipam(&self) -> Result<(), PluginError> {
        if self.ipam.plugin_type.is_empty() {
            return Err(PluginError::Configuration(
                "tap interface requires an IPAM configuration".to_string(),
            ));
        }
        Ok(())
    }

    /// Result version to emit.
    pub fn result_version(&self) -> &str {
        if self.cni_version.is_empty() {
            DEFAULT_CNI_VERSION
        } else {
            &self.cni_version
        }
    }

    /// Parsed bridge address. Only IPv4 is accepted.
    pub fn bridge_address(&self) -> Result<IpNet, PluginError> {
        let addr = IpNet::from_cidr(&self.bridge_ip).map_err(|e| {
            PluginError::Configuration(format!("failed to parse bridge IP({:?}): {}", self.bridge_ip, e))
        })?;

        if !addr.is_ipv4() {
            return Err(PluginError::Configuration(format!(
                "bridge IP {} is not an IPv4 address",
                self.bridge_ip
            )));
        }
        Ok(addr)
    }

    /// Host-side tap device name for a sandbox.
    ///
    /// Uses `tapName` when configured, otherwise `dan` followed by the first
    /// 12 hex digits of the SHA-256 of the sandbox id.
    pub fn tap_name_for(&self, sandbox_id: &str) -> String {
        match &self.tap_name {
            Some(name) => name.clone(),
            None => derive_tap_name(sandbox_id),
        }
    }
}

/// Derive a tap device name from a sandbox id.
pub fn derive_tap_name(sandbox_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(sandbox_id.as_bytes()));
    format!("{}{}", TAP_PREFIX, &digest[..TAP_HASH_LEN])
}

fn validate_ifname(field: &str, name: &str) -> Result<(), PluginError> {
    if name.is_empty() {
        return Err(PluginError::Configuration(format!("{} must be set", field)));
    }
    if name.len() > MAX_IFNAME_LEN {
        return Err(PluginError::Configuration(format!(
            "{} {:?} exceeds {} bytes",
            field, name, MAX_IFNAME_LEN
        )));
    }
    if name.contains(['/', ' ']) {
        return Err(PluginError::Configuration(format!(
            "{} {:?} is not a valid interface name",
            field, name
        )));
    }
    Ok(())
}

/// Process settings.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Directory holding descriptor records.
    pub state_dir: PathBuf,

    /// Append-only diagnostic log.
    pub log_file: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl PluginConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let state_dir = lookup("DAN_STATE_DIR").unwrap_or_else(|| DEFAULT_BASE_DIR.to_string());
        if state_dir.trim().is_empty() {
            bail!("DAN_STATE_DIR must not be empty");
        }

        let log_file = lookup("DAN_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp/dan.log"));

        let log_level = lookup("DAN_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            state_dir: PathBuf::from(state_dir),
            log_file,
            log_level,
        })
    }
}
