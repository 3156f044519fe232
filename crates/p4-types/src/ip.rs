//! IPv4 address and prefix types.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 host address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    /// Bit width of an IPv4 address field in a match-action pipeline.
    pub const BITWIDTH: u32 = 32;

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address(Ipv4Addr::new(a, b, c, d))
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }

    pub fn to_u32(&self) -> u32 {
        u32::from(self.0)
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv4Addr>()
            .map(Ipv4Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl TryFrom<String> for Ipv4Address {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Address> for String {
    fn from(addr: Ipv4Address) -> String {
        addr.to_string()
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(addr: Ipv4Address) -> Self {
        addr.0
    }
}

/// An IPv4 prefix in CIDR notation (e.g. `10.0.3.3/32`).
///
/// A bare address parses as a host prefix (`/32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Prefix {
    address: Ipv4Address,
    prefix_len: u8,
}

impl Ipv4Prefix {
    /// Creates a new prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if `prefix_len` exceeds 32.
    pub fn new(address: Ipv4Address, prefix_len: u8) -> Result<Self, ParseError> {
        if u32::from(prefix_len) > Ipv4Address::BITWIDTH {
            return Err(ParseError::InvalidIpPrefix(format!(
                "prefix length {} exceeds maximum 32",
                prefix_len
            )));
        }
        Ok(Ipv4Prefix {
            address,
            prefix_len,
        })
    }

    /// Creates a /32 host prefix.
    pub const fn host(address: Ipv4Address) -> Self {
        Ipv4Prefix {
            address,
            prefix_len: 32,
        }
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns the network address (host bits cleared).
    pub fn network(&self) -> Ipv4Address {
        let mask = if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        };
        Ipv4Address(Ipv4Addr::from(self.address.to_u32() & mask))
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('/') {
            Some((addr_str, len_str)) => {
                let address: Ipv4Address = addr_str
                    .parse()
                    .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
                let prefix_len: u8 = len_str
                    .parse()
                    .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
                Ipv4Prefix::new(address, prefix_len)
            }
            None => s
                .parse::<Ipv4Address>()
                .map(Ipv4Prefix::host)
                .map_err(|_| ParseError::InvalidIpPrefix(s.to_string())),
        }
    }
}

impl TryFrom<String> for Ipv4Prefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Prefix> for String {
    fn from(prefix: Ipv4Prefix) -> String {
        prefix.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ipv4_parse() {
        let addr: Ipv4Address = "10.0.3.3".parse().unwrap();
        assert_eq!(addr.octets(), [10, 0, 3, 3]);
        assert_eq!(addr.to_u32(), 0x0a00_0303);
    }

    #[test]
    fn test_ipv4_rejects_garbage() {
        assert!("10.0.3".parse::<Ipv4Address>().is_err());
        assert!("10.0.3.256".parse::<Ipv4Address>().is_err());
        assert!("::1".parse::<Ipv4Address>().is_err());
    }

    #[test]
    fn test_bare_address_is_host_prefix() {
        let prefix: Ipv4Prefix = "10.0.1.1".parse().unwrap();
        assert_eq!(prefix.prefix_len(), 32);
        assert_eq!(prefix.to_string(), "10.0.1.1/32");
    }

    #[test]
    fn test_prefix_network() {
        let prefix: Ipv4Prefix = "10.0.3.77/24".parse().unwrap();
        assert_eq!(prefix.prefix_len(), 24);
        assert_eq!(prefix.network(), Ipv4Address::new(10, 0, 3, 0));

        let default: Ipv4Prefix = "1.2.3.4/0".parse().unwrap();
        assert_eq!(default.network(), Ipv4Address::new(0, 0, 0, 0));
    }

    #[test]
    fn test_invalid_prefix_length() {
        assert!("10.0.0.0/33".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.0/x".parse::<Ipv4Prefix>().is_err());
    }
}
