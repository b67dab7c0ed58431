//! IP network value: an address paired with its subnet mask.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;
use crate::prefix;

/// An address with its subnet mask, written in CIDR notation.
///
/// The address keeps its host bits (`10.0.0.5/24` stays `10.0.0.5`);
/// use [`IpNet::network`] for the masked network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpNet {
    addr: IpAddr,
    mask: IpAddr,
}

impl IpNet {
    /// Create a network from an address and prefix length.
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, DescriptorError> {
        let mask = match addr {
            IpAddr::V4(_) if prefix_len <= 32 => IpAddr::V4(Ipv4Addr::from(prefix::mask_v4(prefix_len))),
            IpAddr::V6(_) if prefix_len <= 128 => IpAddr::V6(Ipv6Addr::from(prefix::mask_v6(prefix_len))),
            _ => {
                return Err(DescriptorError::InvalidCidr(format!(
                    "prefix length {} out of range for {}",
                    prefix_len, addr
                )))
            }
        };
        Ok(Self { addr, mask })
    }

    /// Parse from CIDR notation (e.g., "10.0.0.5/24").
    pub fn from_cidr(s: &str) -> Result<Self, DescriptorError> {
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            return Err(DescriptorError::InvalidCidr(format!("missing '/' in CIDR: {}", s)));
        };

        let addr = IpAddr::from_str(addr_str)
            .map_err(|_| DescriptorError::InvalidCidr(format!("invalid address: {}", addr_str)))?;

        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| DescriptorError::InvalidCidr(format!("invalid prefix: {}", prefix_str)))?;

        Self::new(addr, prefix_len)
    }

    /// The address, host bits included.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// The subnet mask.
    pub fn mask(&self) -> IpAddr {
        self.mask
    }

    /// Prefix length derived from the mask.
    pub fn prefix_len(&self) -> u8 {
        match self.mask {
            IpAddr::V4(mask) => prefix::prefix_len_from_octets(mask.octets()),
            IpAddr::V6(mask) => prefix::prefix_len_v6(u128::from(mask)),
        }
    }

    /// The network this address belongs to.
    pub fn network(&self) -> IpNet {
        let prefix_len = self.prefix_len();
        let addr = match self.addr {
            IpAddr::V4(a) => IpAddr::V4(prefix::network_v4(a, prefix_len)),
            IpAddr::V6(a) => IpAddr::V6(prefix::network_v6(a, prefix_len)),
        };
        IpNet { addr, mask: self.mask }
    }

    /// Returns true for IPv4 networks.
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }
}

impl fmt::Display for IpNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len())
    }
}

impl FromStr for IpNet {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cidr(s)
    }
}

impl TryFrom<String> for IpNet {
    type Error = DescriptorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_cidr(&s)
    }
}

impl From<IpNet> for String {
    fn from(net: IpNet) -> Self {
        net.to_string()
    }
}
