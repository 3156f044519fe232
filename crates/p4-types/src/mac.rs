//! Ethernet addresses as carried in action parameters.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// ```
/// use p4_types::MacAddress;
///
/// let mac: MacAddress = "0:0:0:0:3:3".parse().unwrap();
/// assert_eq!(mac.as_bytes(), &[0, 0, 0, 0, 3, 3]);
/// assert_eq!(mac.to_string(), "00:00:00:00:03:03");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }

    /// Octets in transmission order.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, octet) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", octet)?;
        }
        Ok(())
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    /// Accepts six colon-separated hex octets of one or two digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidMacAddress(s.to_string());
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(MacAddress(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse() {
        let mac: MacAddress = "00:00:00:00:1:a".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0, 0, 0, 0, 0x01, 0x0a]);
        assert_eq!(mac.to_string(), "00:00:00:00:01:0a");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "00:00:00:00:03", "00:00:00:00:03:03:03", "00:00:00:00:03:zz", "00:00:00:00:03:303", "00-00-00-00-03-03"] {
            assert!(bad.parse::<MacAddress>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_ordering_follows_octets() {
        let low = MacAddress::new([0, 0, 0, 0, 1, 1]);
        let high: MacAddress = "00:00:00:00:03:03".parse().unwrap();
        assert!(low < high);
    }

    #[test]
    fn test_serde_as_string() {
        let mac: MacAddress = serde_json::from_str("\"00:00:00:00:03:03\"").unwrap();
        assert_eq!(serde_json::to_string(&mac).unwrap(), "\"00:00:00:00:03:03\"");
        assert!(serde_json::from_str::<MacAddress>("\"bogus\"").is_err());
    }
}
