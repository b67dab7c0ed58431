//! Host link manipulation.
//!
//! [`LinkLayer`] is the seam between the provisioning workflows and the
//! kernel. [`IpCommand`] implements it with iproute2:
//!
//! - `ip -j addr show dev <name>` for lookups
//! - `ip link add <name> type bridge` / `ip tuntap add dev <name> mode tap`
//! - `ip addr add <cidr> dev <name>`
//! - `ip link set dev <name> master <bridge>` / `ip link set dev <name> up`
//! - `ip link delete <name>`

use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use dan_descriptor::IpNet;

use crate::error::LinkError;

/// A host network link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Link {
    /// Interface index.
    pub index: u32,
    /// Interface name.
    pub name: String,
    /// Hardware address, empty if the link has none.
    pub mac: String,
    /// IPv4 addresses with their prefixes.
    pub addresses: Vec<IpNet>,
}

/// Link operations needed by the workflows.
pub trait LinkLayer: Send + Sync {
    /// Look up a link by name.
    fn link_by_name(&self, name: &str) -> Result<Link, LinkError>;

    /// Create a bridge.
    fn add_bridge(&self, name: &str) -> Result<(), LinkError>;

    /// Assign an address to a link.
    fn add_address(&self, name: &str, addr: &IpNet) -> Result<(), LinkError>;

    /// Create a tap-mode tuntap device.
    fn add_tap(&self, name: &str) -> Result<(), LinkError>;

    /// Enslave a link to a bridge.
    fn set_master(&self, name: &str, master: &str) -> Result<(), LinkError>;

    /// Bring a link administratively up.
    fn set_up(&self, name: &str) -> Result<(), LinkError>;

    /// Delete a link.
    fn delete_link(&self, name: &str) -> Result<(), LinkError>;
}

/// iproute2-backed link layer.
#[derive(Debug, Clone)]
pub struct IpCommand {
    program: String,
}

impl IpCommand {
    /// Use `ip` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("ip")
    }

    /// Use a specific `ip` binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run an `ip` command and return its stdout. Failures are classified
    /// against `subject` when the command names a single device.
    fn run(&self, subject: Option<&str>, args: &[&str]) -> Result<Vec<u8>, LinkError> {
        debug!(args = %args.join(" "), "Running ip command");

        let output = Command::new(&self.program).args(args).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify(subject, args, stderr.trim()));
        }

        Ok(output.stdout)
    }
}

impl Default for IpCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkLayer for IpCommand {
    fn link_by_name(&self, name: &str) -> Result<Link, LinkError> {
        let stdout = self.run(Some(name), &["-j", "addr", "show", "dev", name])?;
        parse_addr_show(name, &stdout)
    }

    fn add_bridge(&self, name: &str) -> Result<(), LinkError> {
        self.run(Some(name), &["link", "add", name, "type", "bridge"])?;
        Ok(())
    }

    fn add_address(&self, name: &str, addr: &IpNet) -> Result<(), LinkError> {
        let cidr = addr.to_string();
        self.run(Some(name), &["addr", "add", &cidr, "dev", name])
            .map_err(|e| match e {
                LinkError::AlreadyExists(_) => LinkError::AlreadyExists(format!("{} on {}", cidr, name)),
                other => other,
            })?;
        Ok(())
    }

    fn add_tap(&self, name: &str) -> Result<(), LinkError> {
        self.run(Some(name), &["tuntap", "add", "dev", name, "mode", "tap"])?;
        Ok(())
    }

    fn set_master(&self, name: &str, master: &str) -> Result<(), LinkError> {
        // Either device may be the missing one
        self.run(None, &["link", "set", "dev", name, "master", master])?;
        Ok(())
    }

    fn set_up(&self, name: &str) -> Result<(), LinkError> {
        self.run(Some(name), &["link", "set", "dev", name, "up"])?;
        Ok(())
    }

    fn delete_link(&self, name: &str) -> Result<(), LinkError> {
        self.run(Some(name), &["link", "delete", name])?;
        Ok(())
    }
}

/// Map a failed command to a link error by its stderr.
fn classify(subject: Option<&str>, args: &[&str], stderr: &str) -> LinkError {
    match subject {
        Some(subject)
            if stderr.contains("does not exist") || stderr.contains("Cannot find device") =>
        {
            LinkError::NotFound(subject.to_string())
        }
        Some(subject) if stderr.contains("File exists") => {
            LinkError::AlreadyExists(subject.to_string())
        }
        _ => LinkError::Command {
            args: args.join(" "),
            stderr: stderr.to_string(),
        },
    }
}

/// One entry of `ip -j addr show`.
#[derive(Debug, Deserialize)]
struct AddrShow {
    ifindex: u32,
    ifname: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    addr_info: Vec<AddrInfo>,
}

#[derive(Debug, Deserialize)]
struct AddrInfo {
    #[serde(default)]
    family: String,
    #[serde(default)]
    local: Option<String>,
    #[serde(default)]
    prefixlen: Option<u8>,
}

fn parse_addr_show(name: &str, stdout: &[u8]) -> Result<Link, LinkError> {
    let entries: Vec<AddrShow> =
        serde_json::from_slice(stdout).map_err(|e| LinkError::Parse(e.to_string()))?;

    let entry = entries
        .into_iter()
        .find(|entry| entry.ifname == name)
        .ok_or_else(|| LinkError::NotFound(name.to_string()))?;

    let addresses = entry
        .addr_info
        .iter()
        .filter(|info| info.family == "inet")
        .filter_map(|info| {
            let local = info.local.as_deref()?;
            let prefixlen = info.prefixlen?;
            IpNet::from_cidr(&format!("{}/{}", local, prefixlen)).ok()
        })
        .collect();

    Ok(Link {
        index: entry.ifindex,
        name: entry.ifname,
        mac: entry.address.unwrap_or_default(),
        addresses,
    })
}
