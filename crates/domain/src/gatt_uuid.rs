//! GATT attribute UUIDs.
//!
//! Assigned numbers are 16-bit aliases of UUIDs on the Bluetooth base UUID
//! `0000xxxx-0000-1000-8000-00805F9B34FB`. The interpreter accepts both
//! forms; 16-bit values are always sent as 4 uppercase hex digits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The Bluetooth base UUID with the 16-bit slot zeroed.
pub const BLUETOOTH_BASE_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5F9B_34FB);

const ALIAS_MASK: u128 = 0xFFFF_FFFF_u128 << 96;

/// A GATT UUID, either an assigned 16-bit number or a full 128-bit UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattUuid(uuid::Uuid);

impl GattUuid {
    /// Build the 128-bit form of an assigned 16-bit number.
    #[must_use]
    pub const fn from_u16(short: u16) -> Self {
        Self(uuid::Uuid::from_u128(
            BLUETOOTH_BASE_UUID.as_u128() | ((short as u128) << 96),
        ))
    }

    /// Wrap a full UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Access the full 128-bit UUID.
    #[must_use]
    pub const fn as_uuid(self) -> uuid::Uuid {
        self.0
    }

    /// The 16-bit alias, if this UUID sits on the Bluetooth base UUID.
    #[must_use]
    pub fn as_u16(self) -> Option<u16> {
        let value = self.0.as_u128();
        if value & !ALIAS_MASK != BLUETOOTH_BASE_UUID.as_u128() {
            return None;
        }
        u16::try_from(value >> 96).ok()
    }
}

impl From<uuid::Uuid> for GattUuid {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<u16> for GattUuid {
    fn from(short: u16) -> Self {
        Self::from_u16(short)
    }
}

impl fmt::Display for GattUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u16() {
            Some(short) => write!(f, "{short:04X}"),
            None => write!(f, "{}", self.0.hyphenated()),
        }
    }
}

impl FromStr for GattUuid {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);

        if digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return u16::from_str_radix(digits, 16)
                .map(Self::from_u16)
                .map_err(|_| ValidationError::InvalidUuid(s.to_string()));
        }

        uuid::Uuid::parse_str(text)
            .map(Self)
            .map_err(|_| ValidationError::InvalidUuid(s.to_string()))
    }
}

impl Serialize for GattUuid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GattUuid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
