//! # dan-descriptor
//!
//! Data model for directly attachable networks (DANs).
//!
//! A DAN is the host-side half of a sandbox network attachment: a tap
//! device bridged into host networking, plus the addresses and routes an
//! allocation backend handed out for it. This crate provides:
//!
//! - Prefix-length conversion for contiguous IPv4 masks
//! - [`IpNet`], an address paired with its mask
//! - The allocation result shape exchanged with address backends
//! - [`Descriptor`], the normalized record consumed by sandbox network
//!   configurators, and [`DescriptorStore`] for persisting it
//!
//! ## Persisted Format
//!
//! One JSON file per sandbox under the store's base directory, holding a
//! one-element array:
//!
//! ```json
//! [{"type":"tap","name":"dan1a2b3c4d5e6f","network_info":{
//!   "interface":{"ip_addresses":[{"family":"v4","address":"10.0.0.5","mask":"24"}]},
//!   "routes":[{"dest":"0.0.0.0/0","gateway":"10.0.0.1","family":"v4"}]}}]
//! ```

mod allocation;
mod descriptor;
mod error;
mod ipnet;
pub mod prefix;
mod store;

pub use allocation::{AllocationResult, Dns, Interface, IpConfig, Route};
pub use descriptor::{Descriptor, DeviceType, IpAddressEntry, NetworkInfo, NetworkInterface, RouteEntry};
pub use error::DescriptorError;
pub use ipnet::IpNet;
pub use store::{validate_sandbox_id, DescriptorStore, DEFAULT_BASE_DIR};
