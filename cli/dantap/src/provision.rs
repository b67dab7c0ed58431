//! ADD workflow.
//!
//! ```text
//! Init -> BridgeEnsured -> TapCreated -> TapAttached -> Allocated
//!      -> ResultAssembled -> Committed
//! ```
//!
//! The tap device and the allocation are registered on a [`Rollback`] stack
//! as they are acquired and released in reverse if a later step fails. The
//! bridge is shared across sandboxes and is never removed.

use std::fmt;

use tracing::{debug, info, warn};

use dan_descriptor::{AllocationResult, Descriptor, DescriptorStore, DeviceType, Interface};

use crate::config::NetConf;
use crate::error::{IpamError, PluginError};
use crate::ipam::Ipam;
use crate::link::{Link, LinkLayer};
use crate::rollback::Rollback;

/// Progress of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Init,
    BridgeEnsured,
    TapCreated,
    TapAttached,
    Allocated,
    ResultAssembled,
    Committed,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::BridgeEnsured => "bridge_ensured",
            Self::TapCreated => "tap_created",
            Self::TapAttached => "tap_attached",
            Self::Allocated => "allocated",
            Self::ResultAssembled => "result_assembled",
            Self::Committed => "committed",
        };
        f.write_str(s)
    }
}

/// Inputs of one provisioning run.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionRequest<'r> {
    /// Sandbox the network is for.
    pub sandbox_id: &'r str,
    /// Parsed and validated configuration.
    pub conf: &'r NetConf,
    /// Raw configuration document, forwarded to the allocation backend.
    pub payload: &'r [u8],
}

/// Creates the host resources for a sandbox network.
pub struct ResourceProvisioner<'a, L, I> {
    link: &'a L,
    ipam: &'a I,
    store: &'a DescriptorStore,
}

impl<'a, L: LinkLayer, I: Ipam> ResourceProvisioner<'a, L, I> {
    /// Create a provisioner over the given collaborators.
    pub fn new(link: &'a L, ipam: &'a I, store: &'a DescriptorStore) -> Self {
        Self { link, ipam, store }
    }

    /// Run the ADD workflow and return the result for the caller.
    ///
    /// On failure every resource acquired by this run has been released
    /// before the error is returned. A descriptor write failure is returned
    /// without releasing anything.
    pub fn provision(&self, request: &ProvisionRequest<'_>) -> Result<AllocationResult, PluginError> {
        let tap_name = request.conf.tap_name_for(request.sandbox_id);
        info!(
            sandbox_id = %request.sandbox_id,
            bridge = %request.conf.bridge,
            tap = %tap_name,
            ipam = %request.conf.ipam.plugin_type,
            "Provisioning network"
        );

        let mut rollback = Rollback::new();
        let mut state = ProvisionState::Init;

        let result = match self.acquire(request, &tap_name, &mut rollback, &mut state) {
            Ok(result) => {
                rollback.commit();
                result
            }
            Err(e) => {
                warn!(
                    sandbox_id = %request.sandbox_id,
                    state = %state,
                    pending = rollback.len(),
                    error = %e,
                    "Provisioning failed, rolling back"
                );
                let failed = rollback.unwind();
                if failed > 0 {
                    warn!(sandbox_id = %request.sandbox_id, failed, "Rollback incomplete");
                }
                return Err(e);
            }
        };

        let descriptor = Descriptor::build(&tap_name, DeviceType::Tap, &result);
        self.store.save(request.sandbox_id, &descriptor)?;
        debug!(sandbox_id = %request.sandbox_id, state = %ProvisionState::Committed, "State transition");

        info!(
            sandbox_id = %request.sandbox_id,
            tap = %tap_name,
            ips = result.ips.len(),
            "Network provisioned"
        );
        Ok(result)
    }

    fn acquire(
        &self,
        request: &ProvisionRequest<'_>,
        tap_name: &str,
        rollback: &mut Rollback<'a>,
        state: &mut ProvisionState,
    ) -> Result<AllocationResult, PluginError> {
        let conf = request.conf;

        let bridge = self.ensure_bridge(conf)?;
        self.advance(state, ProvisionState::BridgeEnsured);

        self.link
            .add_tap(tap_name)
            .map_err(|source| PluginError::ResourceCreation {
                resource: format!("tap device {}", tap_name),
                source,
            })?;
        let link = self.link;
        let name = tap_name.to_string();
        rollback.push(format!("delete tap device {}", tap_name), move || {
            link.delete_link(&name)
        });
        self.advance(state, ProvisionState::TapCreated);

        let tap = self.attach_tap(tap_name, &bridge)?;
        self.advance(state, ProvisionState::TapAttached);

        let plugin = conf.ipam.plugin_type.clone();
        let mut result = self.ipam.add(&plugin, request.payload)?;
        let ipam = self.ipam;
        let payload = request.payload.to_vec();
        rollback.push(format!("release allocation from {}", plugin), move || {
            ipam.del(&plugin, &payload)
        });
        self.advance(state, ProvisionState::Allocated);

        if result.ips.is_empty() {
            return Err(IpamError::EmptyResult {
                plugin: conf.ipam.plugin_type.clone(),
            }
            .into());
        }

        // Every address belongs to the single tap interface
        result.assign_interface(0);
        result.interfaces = vec![Interface {
            name: tap.name,
            mac: tap.mac,
            sandbox: None,
        }];
        let result = result.for_version(conf.result_version());
        self.advance(state, ProvisionState::ResultAssembled);

        Ok(result)
    }

    /// Look up the bridge, creating it with the configured address if absent.
    fn ensure_bridge(&self, conf: &NetConf) -> Result<Link, PluginError> {
        match self.link.link_by_name(&conf.bridge) {
            Ok(bridge) => {
                let wanted = conf.bridge_address()?;
                if !bridge.addresses.contains(&wanted) {
                    warn!(
                        bridge = %bridge.name,
                        configured = %wanted,
                        actual = ?bridge.addresses.iter().map(ToString::to_string).collect::<Vec<_>>(),
                        "Existing bridge does not carry the configured address, reusing as-is"
                    );
                }
                debug!(bridge = %bridge.name, index = bridge.index, "Reusing bridge");
                Ok(bridge)
            }
            Err(e) if e.is_not_found() => self.create_bridge(conf),
            Err(source) => Err(PluginError::ResourceCreation {
                resource: format!("master bridge device {}", conf.bridge),
                source,
            }),
        }
    }

    fn create_bridge(&self, conf: &NetConf) -> Result<Link, PluginError> {
        let addr = conf.bridge_address()?;
        let name = conf.bridge.as_str();
        let creation_err = |source| PluginError::ResourceCreation {
            resource: format!("bridge {}", name),
            source,
        };

        match self.link.add_bridge(name) {
            Ok(()) => info!(bridge = %name, "Bridge created"),
            // Another invocation won the race; use its bridge
            Err(e) if e.is_already_exists() => info!(bridge = %name, "Bridge created concurrently"),
            Err(e) => return Err(creation_err(e)),
        }

        match self.link.add_address(name, &addr) {
            Ok(()) => info!(bridge = %name, address = %addr, "Bridge address assigned"),
            Err(e) if e.is_already_exists() => debug!(bridge = %name, address = %addr, "Bridge address present"),
            Err(e) => return Err(creation_err(e)),
        }

        self.link.set_up(name).map_err(creation_err)?;
        self.link.link_by_name(name).map_err(creation_err)
    }

    /// Enslave the tap to the bridge, re-fetch it and bring it up.
    fn attach_tap(&self, tap_name: &str, bridge: &Link) -> Result<Link, PluginError> {
        let attach_err = |source| PluginError::Attachment {
            device: tap_name.to_string(),
            source,
        };

        self.link.set_master(tap_name, &bridge.name).map_err(attach_err)?;

        // Re-fetch for the hardware address assigned by the kernel
        let tap = self.link.link_by_name(tap_name).map_err(attach_err)?;
        debug!(tap = %tap.name, mac = %tap.mac, index = tap.index, "Tap device created");

        self.link.set_up(tap_name).map_err(attach_err)?;
        Ok(tap)
    }

    fn advance(&self, state: &mut ProvisionState, next: ProvisionState) {
        debug!(from = %state, to = %next, "State transition");
        *state = next;
    }
}
