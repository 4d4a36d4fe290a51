//! Address family capability
//!
//! The normalizer, the range index, and the log classifier all branch on
//! IPv4 vs IPv6 at some point. This module collects that branching in one
//! place: bit width, textual form used in the database, address parsing,
//! and the private-range test.

use std::fmt::Display;
use std::net::IpAddr;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// IP address family, the `ipv4`/`ipv6` value of a delegation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "ipv4")]
    Ipv4,
    #[serde(rename = "ipv6")]
    Ipv6,
}

impl AddressFamily {
    /// Width of an address in bits (32 for IPv4, 128 for IPv6).
    pub const fn bit_width(&self) -> u8 {
        match self {
            AddressFamily::Ipv4 => 32,
            AddressFamily::Ipv6 => 128,
        }
    }

    /// The `type` column value used in the RIR extended format and in storage.
    pub const fn table_value(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "ipv4",
            AddressFamily::Ipv6 => "ipv6",
        }
    }

    /// Parse an address, accepting it only when it belongs to this family.
    pub fn parse_addr(&self, s: &str) -> Option<IpAddr> {
        let addr: IpAddr = s.parse().ok()?;
        match (self, addr) {
            (AddressFamily::Ipv4, IpAddr::V4(_)) => Some(addr),
            (AddressFamily::Ipv6, IpAddr::V6(_)) => Some(addr),
            _ => None,
        }
    }

    /// RFC1918 private-range test.
    ///
    /// Applies to IPv4 only: `10.0.0.0/8`, `172.16.0.0/12`, `192.168.0.0/16`.
    /// IPv6 addresses are never considered private here.
    pub fn is_private(&self, addr: &IpAddr) -> bool {
        match (self, addr) {
            (AddressFamily::Ipv4, IpAddr::V4(v4)) => {
                let o = v4.octets();
                o[0] == 10 || (o[0] == 172 && (o[1] & 0xf0) == 16) || (o[0] == 192 && o[1] == 168)
            }
            _ => false,
        }
    }

    /// Family of a parsed address.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_value())
    }
}

impl FromStr for AddressFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4" => Ok(AddressFamily::Ipv4),
            "ipv6" => Ok(AddressFamily::Ipv6),
            other => Err(anyhow!("unknown address family: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ranges() {
        let fam = AddressFamily::Ipv4;
        for ip in ["10.1.1.1", "172.16.5.5", "172.31.255.255", "192.168.1.1"] {
            let addr: IpAddr = ip.parse().unwrap();
            assert!(fam.is_private(&addr), "{} should be private", ip);
        }
        for ip in ["8.8.8.8", "172.15.0.1", "172.32.0.1", "192.169.0.1"] {
            let addr: IpAddr = ip.parse().unwrap();
            assert!(!fam.is_private(&addr), "{} should not be private", ip);
        }
        // the filter never applies to IPv6
        let v6: IpAddr = "fc00::1".parse().unwrap();
        assert!(!AddressFamily::Ipv6.is_private(&v6));
    }

    #[test]
    fn test_parse_addr_family_mismatch() {
        assert!(AddressFamily::Ipv4.parse_addr("8.8.8.8").is_some());
        assert!(AddressFamily::Ipv4.parse_addr("2001:db8::1").is_none());
        assert!(AddressFamily::Ipv6.parse_addr("2001:db8::1").is_some());
        assert!(AddressFamily::Ipv6.parse_addr("8.8.8.8").is_none());
    }

    #[test]
    fn test_round_trip() {
        assert_eq!(
            "ipv4".parse::<AddressFamily>().unwrap(),
            AddressFamily::Ipv4
        );
        assert_eq!(AddressFamily::Ipv6.to_string(), "ipv6");
        assert!("asn".parse::<AddressFamily>().is_err());
    }
}
