//! Canonical MAC address handling
//!
//! Telemetry reports BSSIDs in whatever form the driver prints them
//! (`a:1b:2c:d:e:f`, lower case, dashes). Every comparison in the crate goes
//! through [`MacAddr`], whose display form is six upper-case, zero-padded,
//! colon-separated octets.

use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 48-bit IEEE MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Broadcast address, used as a never-matching placeholder
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    /// Placeholder BSSID of a station that was not associated
    pub const UNSPECIFIED: MacAddr = MacAddr([0x00; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Read an address from the first six bytes of a slice
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(Self(octets))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(AppError::validation(format!(
                "Invalid MAC address '{}': expected 6 octets, found {}",
                trimmed,
                parts.len()
            )));
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts.iter()) {
            if part.is_empty() || part.len() > 2 {
                return Err(AppError::validation(format!(
                    "Invalid MAC address '{}': bad octet '{}'",
                    trimmed, part
                )));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| {
                AppError::validation(format!(
                    "Invalid MAC address '{}': octet '{}' is not hex",
                    trimmed, part
                ))
            })?;
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalizes_short_octets() {
        let mac: MacAddr = "a:1b:2c:d:e:f".parse().unwrap();
        assert_eq!(mac.to_string(), "0A:1B:2C:0D:0E:0F");
        assert_eq!(mac, MacAddr::new([0x0a, 0x1b, 0x2c, 0x0d, 0x0e, 0x0f]));
    }

    #[test]
    fn test_accepts_dashes_and_lowercase() {
        let mac: MacAddr = "94-a6-7e-54-d4-33".parse().unwrap();
        assert_eq!(mac.to_string(), "94:A6:7E:54:D4:33");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("Not-Associated".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44:555".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44:zz".parse::<MacAddr>().is_err());
        assert!("".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_from_slice() {
        let bytes = [1u8, 2, 3, 4, 5, 6, 7];
        assert_eq!(MacAddr::from_slice(&bytes).unwrap().to_string(), "01:02:03:04:05:06");
        assert!(MacAddr::from_slice(&bytes[..5]).is_none());
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let mac: MacAddr = "a:b:c:d:e:f".parse().unwrap();
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"0A:0B:0C:0D:0E:0F\"");
        let back: MacAddr = serde_json::from_str("\"0a:0b:0c:0d:0e:0f\"").unwrap();
        assert_eq!(back, mac);
    }
}
