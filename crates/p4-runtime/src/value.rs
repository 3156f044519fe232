//! Canonical byte-string encoding of match and parameter values.
//!
//! P4Runtime carries every value as a big-endian byte string in canonical
//! form: no leading zero bytes, and zero encoded as a single `0x00` byte.

use p4_types::{Ipv4Address, MacAddress};
use std::fmt;

/// A match-field or action-parameter value in canonical wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldValue(Vec<u8>);

impl FieldValue {
    /// Builds a value from big-endian bytes, canonicalizing it.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let first = bytes.iter().position(|b| *b != 0);
        match first {
            Some(idx) => FieldValue(bytes[idx..].to_vec()),
            None => FieldValue(vec![0]),
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_bytes(&value.to_be_bytes())
    }

    pub fn from_bool(value: bool) -> Self {
        Self::from_u64(u64::from(value))
    }

    pub fn from_mac(mac: &MacAddress) -> Self {
        Self::from_bytes(mac.as_bytes())
    }

    pub fn from_ipv4(addr: &Ipv4Address) -> Self {
        Self::from_bytes(&addr.octets())
    }

    /// Returns the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of significant bits (0 for the zero value).
    pub fn bit_len(&self) -> u32 {
        match self.0.first() {
            Some(0) | None => 0,
            Some(first) => (self.0.len() as u32 - 1) * 8 + (8 - first.leading_zeros()),
        }
    }

    /// Returns true if the value can be represented in `bitwidth` bits.
    pub fn fits(&self, bitwidth: u32) -> bool {
        self.bit_len() <= bitwidth
    }

    /// Returns the value as an integer if it fits in 128 bits.
    pub fn to_u128(&self) -> Option<u128> {
        if self.0.len() > 16 {
            return None;
        }
        Some(self.0.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
    }

    /// Returns the value as an integer if it fits in 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        self.to_u128().and_then(|v| u64::try_from(v).ok())
    }

    /// Bitwise AND of two values.
    pub fn and(&self, other: &FieldValue) -> FieldValue {
        let len = self.0.len().max(other.0.len());
        let a = left_pad(&self.0, len);
        let b = left_pad(&other.0, len);
        let anded: Vec<u8> = a.iter().zip(b.iter()).map(|(x, y)| x & y).collect();
        FieldValue::from_bytes(&anded)
    }

    /// Keeps the top `prefix_len` bits of a `bitwidth`-wide value.
    pub fn mask_prefix(&self, prefix_len: u32, bitwidth: u32) -> FieldValue {
        self.and(&prefix_mask(prefix_len, bitwidth))
    }
}

/// All-ones mask covering `bitwidth` bits.
pub fn full_mask(bitwidth: u32) -> FieldValue {
    prefix_mask(bitwidth, bitwidth)
}

/// Mask with the top `prefix_len` bits of a `bitwidth`-wide field set.
pub fn prefix_mask(prefix_len: u32, bitwidth: u32) -> FieldValue {
    let prefix_len = prefix_len.min(bitwidth);
    let nbytes = bitwidth.div_ceil(8) as usize;
    let mut bytes = vec![0u8; nbytes.max(1)];
    // Bit 0 is the most significant bit of the field, which sits after the
    // padding bits of the first byte.
    let pad = nbytes as u32 * 8 - bitwidth;
    for bit in 0..prefix_len {
        let pos = pad + bit;
        bytes[(pos / 8) as usize] |= 0x80 >> (pos % 8);
    }
    FieldValue::from_bytes(&bytes)
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::from_u64(value)
    }
}

impl From<MacAddress> for FieldValue {
    fn from(mac: MacAddress) -> Self {
        FieldValue::from_mac(&mac)
    }
}

impl From<Ipv4Address> for FieldValue {
    fn from(addr: Ipv4Address) -> Self {
        FieldValue::from_ipv4(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_canonical_form() {
        assert_eq!(FieldValue::from_u64(0).as_bytes(), &[0]);
        assert_eq!(FieldValue::from_u64(0x0102).as_bytes(), &[1, 2]);
        assert_eq!(FieldValue::from_bytes(&[0, 0, 0x80]).as_bytes(), &[0x80]);
    }

    #[test]
    fn test_bit_len_and_fits() {
        assert_eq!(FieldValue::from_u64(0).bit_len(), 0);
        assert_eq!(FieldValue::from_u64(1).bit_len(), 1);
        assert_eq!(FieldValue::from_u64(255).bit_len(), 8);
        assert_eq!(FieldValue::from_u64(256).bit_len(), 9);
        assert!(FieldValue::from_u64(511).fits(9));
        assert!(!FieldValue::from_u64(512).fits(9));
    }

    #[test]
    fn test_mac_and_ip_encoding() {
        let mac: MacAddress = "00:00:00:00:03:03".parse().unwrap();
        assert_eq!(FieldValue::from(mac).as_bytes(), &[3, 3]);
        let ip: Ipv4Address = "10.0.3.3".parse().unwrap();
        assert_eq!(FieldValue::from(ip).to_u64(), Some(0x0a00_0303));
    }

    #[test]
    fn test_prefix_mask() {
        assert_eq!(prefix_mask(24, 32).to_u64(), Some(0xffff_ff00));
        assert_eq!(prefix_mask(0, 32).to_u64(), Some(0));
        assert_eq!(full_mask(9).to_u64(), Some(0x1ff));
        assert_eq!(prefix_mask(1, 9).to_u64(), Some(0x100));
    }

    #[test]
    fn test_mask_prefix_clears_host_bits() {
        let ip = FieldValue::from_u64(0x0a00_03ff);
        assert_eq!(ip.mask_prefix(24, 32).to_u64(), Some(0x0a00_0300));
    }

    #[test]
    fn test_display_is_hex() {
        assert_eq!(FieldValue::from_u64(0x0a00_0303).to_string(), "0x0a000303");
    }
}
