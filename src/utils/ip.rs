//! Dotted-quad IPv4 strings <-> big-endian 32-bit numbers

use crate::error::{Error, Result};
use std::net::Ipv4Addr;

/// Parses a dotted-quad address into its big-endian numeric value.
pub fn ip_to_u32(ip: &str) -> Result<u32> {
    let addr: Ipv4Addr = ip
        .trim()
        .parse()
        .map_err(|_| Error::invalid("IPv4 address", ip))?;
    Ok(u32::from(addr))
}

/// Formats a big-endian numeric address in dotted-quad notation.
pub fn u32_to_ip(n: u32) -> String {
    Ipv4Addr::from(n).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_dotted_quads() {
        for ip in ["0.0.0.0", "10.1.0.1", "192.168.0.1", "255.255.255.0", "255.255.255.255"] {
            assert_eq!(u32_to_ip(ip_to_u32(ip).unwrap()), ip);
        }
    }

    #[test]
    fn big_endian_value() {
        assert_eq!(ip_to_u32("192.168.0.1").unwrap(), 0xC0A8_0001);
        assert_eq!(u32_to_ip(0xFFFF_FF00), "255.255.255.0");
    }

    #[test]
    fn rejects_garbage() {
        assert!(ip_to_u32("192.168.0").is_err());
        assert!(ip_to_u32("300.1.1.1").is_err());
        assert!(ip_to_u32("not an ip").is_err());
    }
}
