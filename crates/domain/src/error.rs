//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts via `#[from]`.
//! The domain owns the two families every layer needs: argument
//! validation and state-machine rejections.

use crate::state::{Operation, ProtocolState};

/// Argument or payload validation failure.
///
/// Raised before anything is sent; the session state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A write was requested without any bytes.
    #[error("write payload must not be empty")]
    EmptyWritePayload,

    /// The text is not a `AA:BB:CC:DD:EE:FF` device address.
    #[error("invalid device address {0:?}")]
    InvalidAddress(String),

    /// The text is neither a 16-bit nor a 128-bit UUID.
    #[error("invalid GATT UUID {0:?}")]
    InvalidUuid(String),

    /// The text is not a 16-bit hexadecimal handle.
    #[error("invalid attribute handle {0:?}")]
    InvalidHandle(String),

    /// The text is not a sequence of hexadecimal byte pairs.
    #[error("invalid hex payload {0:?}")]
    InvalidHexPayload(String),

    /// Unknown security level name.
    #[error("unknown security level {0:?}")]
    UnknownSecurityLevel(String),

    /// Unknown address type name.
    #[error("unknown address type {0:?}")]
    UnknownAddressType(String),
}

/// An operation was refused because of the current protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The operation is only legal while no connection exists.
    #[error("{operation} requires an idle session, current state is {state}")]
    NotIdle {
        /// The refused operation.
        operation: Operation,
        /// State at the time of the call.
        state: ProtocolState,
    },

    /// The operation needs an established connection.
    #[error("{operation} requires a connection, current state is {state}")]
    NotConnected {
        /// The refused operation.
        operation: Operation,
        /// State at the time of the call.
        state: ProtocolState,
    },

    /// Another command is still waiting for its result.
    #[error("{operation} refused while a command is pending, current state is {state}")]
    Busy {
        /// The refused operation.
        operation: Operation,
        /// State at the time of the call.
        state: ProtocolState,
    },
}

impl StateError {
    /// The operation that was refused.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::NotIdle { operation, .. }
            | Self::NotConnected { operation, .. }
            | Self::Busy { operation, .. } => *operation,
        }
    }

    /// The state the session was in when the operation was refused.
    #[must_use]
    pub fn state(&self) -> ProtocolState {
        match self {
            Self::NotIdle { state, .. }
            | Self::NotConnected { state, .. }
            | Self::Busy { state, .. } => *state,
        }
    }
}
