//! Bluetooth device addresses and the `--dev` target they are parsed from.
//!
//! The peripheral can be selected either by its MAC address or by its
//! advertised name. Anything that parses as a MAC address is treated as one.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth MAC address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a MAC address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid MAC address: '{0}' is not valid hex")]
    InvalidHex(String),
    #[error("invalid MAC address: mixed separators")]
    MixedSeparators,
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Parse `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF`, in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = if s.contains('-') { '-' } else { ':' };
        if separator == '-' && s.contains(':') {
            return Err(ParseMacError::MixedSeparators);
        }

        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<MacAddress> for bluer::Address {
    fn from(addr: MacAddress) -> Self {
        bluer::Address(addr.0)
    }
}

/// Peripheral selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    /// Connect to this exact address
    Address(MacAddress),
    /// Connect to the first device advertising this name
    Name(String),
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTarget::Address(address) => write!(f, "{address}"),
            DeviceTarget::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Parse a device target for `clap`.
///
/// # Example
/// ```
/// use agora_logger::mac_address::{DeviceTarget, MacAddress, parse_device};
///
/// assert_eq!(
///     parse_device("aa-bb-cc-dd-ee-ff").unwrap(),
///     DeviceTarget::Address(MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]))
/// );
/// assert_eq!(
///     parse_device("EP Agora").unwrap(),
///     DeviceTarget::Name("EP Agora".to_string())
/// );
/// ```
pub fn parse_device(src: &str) -> Result<DeviceTarget, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("device address or name must not be empty".into());
    }

    Ok(match src.parse::<MacAddress>() {
        Ok(address) => DeviceTarget::Address(address),
        Err(_) => DeviceTarget::Name(src.to_string()),
    })
}
