//! Descriptor data model.
//!
//! Field names and shapes are read by sandbox network configurators
//! outside this workspace; do not rename them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::allocation::AllocationResult;

/// Family tag written for every address and route.
///
/// Always "v4", including for IPv6 allocations; readers only handle IPv4.
const FAMILY_V4: &str = "v4";

/// Kind of host device backing a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Virtual tap device bridged into host networking.
    Tap,
}

/// Persisted network state for one sandbox device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "type")]
    pub device_type: DeviceType,

    /// Host-side interface name.
    #[serde(rename = "name")]
    pub device_name: String,

    pub network_info: NetworkInfo,
}

/// Addresses and routes attached to a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub interface: NetworkInterface,

    #[serde(with = "nullable_vec", default)]
    pub routes: Vec<RouteEntry>,
}

/// Address list of the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    #[serde(with = "nullable_vec", default)]
    pub ip_addresses: Vec<IpAddressEntry>,
}

/// One address, with its prefix length as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressEntry {
    pub family: String,
    pub address: String,
    #[serde(rename = "mask")]
    pub prefix_length: String,
}

/// One route; an empty gateway means the route has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    #[serde(rename = "dest")]
    pub destination: String,
    pub gateway: String,
    pub family: String,
}

impl Descriptor {
    /// Build a descriptor from an allocation result.
    pub fn build(
        device_name: impl Into<String>,
        device_type: DeviceType,
        result: &AllocationResult,
    ) -> Self {
        let ip_addresses = result
            .ips
            .iter()
            .map(|ip| IpAddressEntry {
                family: FAMILY_V4.to_string(),
                address: ip.address.addr().to_string(),
                prefix_length: ip.address.prefix_len().to_string(),
            })
            .collect();

        let routes = result
            .routes
            .iter()
            .map(|route| RouteEntry {
                destination: route.dst.network().to_string(),
                gateway: route.gw.map(|gw| gw.to_string()).unwrap_or_default(),
                family: FAMILY_V4.to_string(),
            })
            .collect();

        Self {
            device_type,
            device_name: device_name.into(),
            network_info: NetworkInfo {
                interface: NetworkInterface { ip_addresses },
                routes,
            },
        }
    }
}

impl IpAddressEntry {
    /// Prefix length as a number.
    pub fn prefix_len(&self) -> Option<u8> {
        self.prefix_length.parse().ok()
    }
}

/// Empty lists are written as `null` and `null` reads back as empty.
mod nullable_vec {
    use super::*;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, T>(items: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        if items.is_empty() {
            serializer.serialize_none()
        } else {
            serializer.collect_seq(items)
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }
}
