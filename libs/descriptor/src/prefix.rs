//! Conversion between contiguous subnet masks and prefix lengths.
//!
//! Masks are handled as the big-endian integer value of their octets, so
//! `255.255.255.0` is `0xffff_ff00`. Only contiguous masks (a run of 1-bits
//! followed by a run of 0-bits) are meaningful here; for anything else the
//! result counts the bits above the lowest set bit.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Prefix length of a contiguous IPv4 mask.
///
/// An all-zero mask is `/0`.
pub fn prefix_len(mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    (32 - mask.trailing_zeros()) as u8
}

/// Prefix length of a contiguous IPv4 mask given as octets.
pub fn prefix_len_from_octets(mask: [u8; 4]) -> u8 {
    prefix_len(u32::from_be_bytes(mask))
}

/// Prefix length of a contiguous IPv6 mask.
pub fn prefix_len_v6(mask: u128) -> u8 {
    if mask == 0 {
        return 0;
    }
    (128 - mask.trailing_zeros()) as u8
}

/// Build the IPv4 mask for a prefix length (clamped to 32).
pub fn mask_v4(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        len if len >= 32 => u32::MAX,
        len => u32::MAX << (32 - len),
    }
}

/// Build the IPv6 mask for a prefix length (clamped to 128).
pub fn mask_v6(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        len if len >= 128 => u128::MAX,
        len => u128::MAX << (128 - len),
    }
}

/// Mask an IPv4 address to its network.
pub fn network_v4(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) & mask_v4(prefix_len))
}

/// Mask an IPv6 address to its network.
pub fn network_v6(addr: Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    Ipv6Addr::from(u128::from(addr) & mask_v6(prefix_len))
}
