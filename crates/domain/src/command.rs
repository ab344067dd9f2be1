//! Command encoder: pure functions building interpreter command lines.
//!
//! Every function returns an [`OutboundCommand`]: the text to send (without
//! the trailing newline) plus the [`Operation`] it belongs to. Nothing here
//! performs IO or looks at the session state.
//!
//! ## Rendering rules
//!
//! | Value | Rendering |
//! |-------|-----------|
//! | address | `AA:BB:CC:DD:EE:FF` |
//! | 16-bit UUID | 4 uppercase hex digits |
//! | 128-bit UUID | canonical hyphenated form |
//! | handle / offset | 4 uppercase hex digits, zero-padded, no prefix |
//! | write payload | concatenated 2-digit uppercase hex |
//! | psm / mtu | decimal |
//!
//! Optional trailing arguments are emitted in strict leading order: an
//! argument is only written if every argument before it was.

use std::fmt::{self, Write as _};

use crate::address::{AddressType, BdAddr};
use crate::error::ValidationError;
use crate::gatt_uuid::GattUuid;
use crate::security::SecurityLevel;
use crate::state::{Operation, ProtocolState};

/// An encoded command line, ready to be written to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    operation: Operation,
    text: String,
}

impl OutboundCommand {
    fn build(operation: Operation, args: &[Option<String>]) -> Self {
        let mut text = operation.verb().to_string();
        for arg in args.iter().map_while(Option::as_ref) {
            text.push(' ');
            text.push_str(arg);
        }
        Self { operation, text }
    }

    /// The operation this command performs.
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The state the session enters once this command is sent.
    #[must_use]
    pub fn next_state(&self) -> ProtocolState {
        self.operation.busy_state()
    }

    /// The command line, without trailing newline.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Render a handle or offset as 4 uppercase hex digits (e.g. `"002A"`).
#[must_use]
pub fn format_handle(handle: u16) -> String {
    format!("{handle:04X}")
}

/// Parse a handle written as 1–4 hex digits, with or without `0x`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidHandle`] for anything else.
pub fn parse_handle(text: &str) -> Result<u16, ValidationError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidHandle(text.to_string()));
    }
    u16::from_str_radix(digits, 16).map_err(|_| ValidationError::InvalidHandle(text.to_string()))
}

/// Render bytes as concatenated 2-digit uppercase hex (e.g. `"ABCD"`).
#[must_use]
pub fn format_hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02X}");
            out
        })
}

/// Parse hex bytes, either concatenated (`"0a1b"`) or separated by
/// whitespace (`"0a 1b"`).
///
/// # Errors
///
/// Returns [`ValidationError::InvalidHexPayload`] when a non-hex character
/// is present or the digit count is odd.
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>, ValidationError> {
    let invalid = || ValidationError::InvalidHexPayload(text.to_string());

    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 || !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(invalid());
    }

    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
            u8::from_str_radix(pair, 16).map_err(|_| invalid())
        })
        .collect()
}

/// `connect <addr> [<type>]`
#[must_use]
pub fn connect(address: BdAddr, address_type: Option<AddressType>) -> OutboundCommand {
    OutboundCommand::build(
        Operation::Connect,
        &[
            Some(address.to_string()),
            address_type.map(|kind| kind.as_str().to_string()),
        ],
    )
}

/// `psm <n>`
#[must_use]
pub fn set_psm(psm: u16) -> OutboundCommand {
    OutboundCommand::build(Operation::SetPsm, &[Some(psm.to_string())])
}

/// `mtu <n>`
#[must_use]
pub fn set_mtu(mtu: u16) -> OutboundCommand {
    OutboundCommand::build(Operation::SetMtu, &[Some(mtu.to_string())])
}

/// `sec-level <low|medium|high>`
#[must_use]
pub fn set_security_level(level: SecurityLevel) -> OutboundCommand {
    OutboundCommand::build(
        Operation::SetSecurityLevel,
        &[Some(level.as_str().to_string())],
    )
}

/// `primary`
#[must_use]
pub fn primary_discovery() -> OutboundCommand {
    OutboundCommand::build(Operation::PrimaryDiscovery, &[])
}

/// `primary <uuid>`
#[must_use]
pub fn primary_discovery_by_uuid(uuid: GattUuid) -> OutboundCommand {
    OutboundCommand::build(Operation::PrimaryDiscoveryByUuid, &[Some(uuid.to_string())])
}

/// `characteristics [<start> [<end> [<uuid>]]]`
///
/// Range order is not validated: only presence gates emission.
#[must_use]
pub fn characteristics_discovery(
    start: Option<u16>,
    end: Option<u16>,
    uuid: Option<GattUuid>,
) -> OutboundCommand {
    OutboundCommand::build(
        Operation::CharacteristicsDiscovery,
        &[
            start.map(format_handle),
            end.map(format_handle),
            uuid.map(|u| u.to_string()),
        ],
    )
}

/// `char-desc [<start> [<end>]]`
///
/// An `end` lower than `start` is dropped rather than sent.
#[must_use]
pub fn descriptor_discovery(start: Option<u16>, end: Option<u16>) -> OutboundCommand {
    let end = match (start, end) {
        (Some(start), Some(end)) if end < start => None,
        (_, end) => end,
    };
    OutboundCommand::build(
        Operation::DescriptorDiscovery,
        &[start.map(format_handle), end.map(format_handle)],
    )
}

/// `char-read-hnd <handle> [<offset>]`
#[must_use]
pub fn read_by_handle(handle: u16, offset: Option<u16>) -> OutboundCommand {
    OutboundCommand::build(
        Operation::ReadByHandle,
        &[Some(format_handle(handle)), offset.map(format_handle)],
    )
}

/// `char-read-uuid <uuid> [<start> [<end>]]`
#[must_use]
pub fn read_by_uuid(uuid: GattUuid, start: Option<u16>, end: Option<u16>) -> OutboundCommand {
    OutboundCommand::build(
        Operation::ReadByUuid,
        &[
            Some(uuid.to_string()),
            start.map(format_handle),
            end.map(format_handle),
        ],
    )
}

/// `char-write-req <handle> <hexbytes>`
///
/// # Errors
///
/// Returns [`ValidationError::EmptyWritePayload`] when `value` is empty.
pub fn write_request(handle: u16, value: &[u8]) -> Result<OutboundCommand, ValidationError> {
    write(Operation::WriteRequest, handle, value)
}

/// `char-write-cmd <handle> <hexbytes>`
///
/// # Errors
///
/// Returns [`ValidationError::EmptyWritePayload`] when `value` is empty.
pub fn write_command(handle: u16, value: &[u8]) -> Result<OutboundCommand, ValidationError> {
    write(Operation::WriteCommand, handle, value)
}

fn write(operation: Operation, handle: u16, value: &[u8]) -> Result<OutboundCommand, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyWritePayload);
    }
    Ok(OutboundCommand::build(
        operation,
        &[Some(format_handle(handle)), Some(format_hex_bytes(value))],
    ))
}
