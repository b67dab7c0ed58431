//! DEL workflow.
//!
//! ```text
//! Init -> AllocationReleased -> LinkRemoved -> DescriptorRemoved
//! ```
//!
//! Every step runs even if an earlier one failed. Only an allocation release
//! failure is returned to the caller; link and descriptor failures are
//! logged. A missing device or descriptor is treated as already torn down,
//! so repeated calls succeed.

use tracing::{debug, error, info, warn};

use dan_descriptor::{DescriptorStore, DeviceType};

use crate::config::NetConf;
use crate::error::PluginError;
use crate::ipam::Ipam;
use crate::link::LinkLayer;

/// Inputs of one teardown run.
#[derive(Debug, Clone, Copy)]
pub struct TeardownRequest<'r> {
    /// Sandbox the network was created for.
    pub sandbox_id: &'r str,
    /// Parsed configuration. Only the allocation backend is required.
    pub conf: &'r NetConf,
    /// Raw configuration document, forwarded to the allocation backend.
    pub payload: &'r [u8],
}

/// Removes the host resources of a sandbox network.
pub struct Deprovisioner<'a, L, I> {
    link: &'a L,
    ipam: &'a I,
    store: &'a DescriptorStore,
}

impl<'a, L: LinkLayer, I: Ipam> Deprovisioner<'a, L, I> {
    /// Create a deprovisioner over the given collaborators.
    pub fn new(link: &'a L, ipam: &'a I, store: &'a DescriptorStore) -> Self {
        Self { link, ipam, store }
    }

    /// Run the DEL workflow.
    pub fn deprovision(&self, request: &TeardownRequest<'_>) -> Result<(), PluginError> {
        let tap_name = self.device_name(request);
        info!(sandbox_id = %request.sandbox_id, tap = %tap_name, "Tearing down network");

        let released = self
            .ipam
            .del(&request.conf.ipam.plugin_type, request.payload)
            .map_err(PluginError::from);
        match &released {
            Ok(()) => debug!(sandbox_id = %request.sandbox_id, "Allocation released"),
            Err(e) => error!(sandbox_id = %request.sandbox_id, error = %e, "Failed to release allocation"),
        }

        match self.link.delete_link(&tap_name) {
            Ok(()) => info!(tap = %tap_name, "Tap device deleted"),
            Err(e) if e.is_not_found() => debug!(tap = %tap_name, "Tap device already gone"),
            Err(e) => error!(tap = %tap_name, error = %e, "Failed to delete tap device"),
        }

        match self.store.remove(request.sandbox_id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(sandbox_id = %request.sandbox_id, "No descriptor to remove")
            }
            Err(e) => {
                warn!(sandbox_id = %request.sandbox_id, error = %e, "Failed to remove descriptor")
            }
        }

        released
    }

    /// Device name from the stored descriptor, or derived as on ADD.
    fn device_name(&self, request: &TeardownRequest<'_>) -> String {
        match self.store.load(request.sandbox_id) {
            Ok(descriptors) => {
                if let Some(descriptor) = descriptors
                    .into_iter()
                    .find(|d| d.device_type == DeviceType::Tap)
                {
                    return descriptor.device_name;
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(sandbox_id = %request.sandbox_id, error = %e, "Unreadable descriptor, deriving device name")
            }
        }
        request.conf.tap_name_for(request.sandbox_id)
    }
}
