//! Result kinds and listener-visible events.
//!
//! Each known result tag maps to exactly one [`ResultKind`]. Whether a tag
//! ends the pending command ("terminal") is part of the same table so the
//! dispatcher has a single place to look.

use serde::Serialize;

use crate::command::parse_hex_bytes;
use crate::error::ValidationError;
use crate::line::{ResultLine, ShellError};

/// What a result line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Connected,
    Disconnected,
    PrimaryService,
    PrimaryServiceEnd,
    PrimaryServiceByUuid,
    PrimaryServiceByUuidEnd,
    Characteristic,
    CharacteristicEnd,
    Descriptor,
    DescriptorEnd,
    ValueByHandle,
    ValueByUuid,
    ValueByUuidEnd,
    WriteRequestResult,
    WriteCommandResult,
    SecurityLevelResult,
    MtuResult,
    PsmResult,
    Notification,
    Indication,
}

/// `(tag, kind, terminal)`.
const RESULT_TAGS: &[(&str, ResultKind, bool)] = &[
    ("CONNECT", ResultKind::Connected, false),
    ("DISCONNECT", ResultKind::Disconnected, false),
    ("PRIMARY-ALL", ResultKind::PrimaryService, false),
    ("PRIMARY-ALL-END", ResultKind::PrimaryServiceEnd, true),
    ("PRIMARY-UUID", ResultKind::PrimaryServiceByUuid, false),
    ("PRIMARY-UUID-END", ResultKind::PrimaryServiceByUuidEnd, true),
    ("CHAR", ResultKind::Characteristic, false),
    ("CHAR-END", ResultKind::CharacteristicEnd, true),
    ("CHAR-VAL-DESC", ResultKind::Descriptor, false),
    ("CHAR-VAL-DESC-END", ResultKind::DescriptorEnd, true),
    ("CHAR-READ-HND", ResultKind::ValueByHandle, true),
    ("CHAR-READ-UUID", ResultKind::ValueByUuid, false),
    ("CHAR-READ-UUID-END", ResultKind::ValueByUuidEnd, true),
    ("CHAR-WRITE-REQ", ResultKind::WriteRequestResult, true),
    ("CHAR-WRITE", ResultKind::WriteCommandResult, true),
    ("SEC-LEVEL", ResultKind::SecurityLevelResult, true),
    ("MTU", ResultKind::MtuResult, true),
    ("PSM", ResultKind::PsmResult, true),
    ("NOTIFICATION", ResultKind::Notification, false),
    ("INDICATION", ResultKind::Indication, false),
];

impl ResultKind {
    /// Look up the kind for a result tag. Unknown tags return `None`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        RESULT_TAGS
            .iter()
            .find(|(known, _, _)| *known == tag)
            .map(|(_, kind, _)| *kind)
    }

    /// The wire tag for this kind.
    #[must_use]
    pub fn tag(self) -> &'static str {
        RESULT_TAGS
            .iter()
            .find(|(_, kind, _)| *kind == self)
            .map_or("", |(tag, _, _)| tag)
    }

    /// Whether a result of this kind ends the pending command.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        RESULT_TAGS
            .iter()
            .any(|(_, kind, terminal)| *kind == self && *terminal)
    }
}

/// A result line whose tag is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GattResult {
    pub kind: ResultKind,
    /// Handle or status code, depending on the kind.
    pub code: u16,
    pub payload: String,
}

impl GattResult {
    /// Resolve a classified result line. Unknown tags return `None`.
    #[must_use]
    pub fn from_line(line: &ResultLine) -> Option<Self> {
        ResultKind::from_tag(&line.tag).map(|kind| Self {
            kind,
            code: line.code,
            payload: line.payload.clone(),
        })
    }

    /// Whether a status-bearing result reports success (status 0).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Decode the payload as hex bytes (`"0a 1b"` or `"0A1B"`).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidHexPayload`] when the payload is
    /// not hex.
    pub fn value(&self) -> Result<Vec<u8>, ValidationError> {
        parse_hex_bytes(&self.payload)
    }
}

/// Everything a listener can observe, in serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GattEvent {
    Result(GattResult),
    ShellError(ShellError),
    ProcessExited { code: Option<i32> },
    StdinClosed,
}
