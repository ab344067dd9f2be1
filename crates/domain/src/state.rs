//! Connection state machine.
//!
//! The interpreter accepts one command at a time. [`StateMachine`] tracks
//! which command is in flight and decides whether a new [`Operation`] may
//! be issued:
//!
//! ```text
//!  Idle ──connect──▶ Connecting ──CONNECT(0)──▶ Connected ──op──▶ <busy>
//!   ▲  ╲                                           ▲               │
//!   │   psm──▶ SetPsm ──completed──▶ Idle          └──completed────┘
//!   └──────────────── DISCONNECT / release ────────────────────────
//! ```
//!
//! Transitions never perform IO; the session facade owns the lock and the
//! bridge and calls into this type while holding the lock.

use std::fmt;

use serde::Serialize;

use crate::error::StateError;

/// The single active protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolState {
    /// No connection, no command in flight.
    #[default]
    Idle,
    /// `connect` sent, waiting for the link.
    Connecting,
    /// Link up, ready for the next command.
    Connected,
    /// `disconnect` sent, waiting for the link to drop.
    Disconnecting,
    /// `primary` in flight.
    PrimaryDiscovery,
    /// `primary <uuid>` in flight.
    PrimaryDiscoveryByUuid,
    /// `characteristics` in flight.
    CharacteristicsDiscovery,
    /// `char-desc` in flight.
    DescriptorDiscovery,
    /// `char-read-uuid` in flight.
    ReadByUuid,
    /// `char-read-hnd` in flight.
    ReadByHandle,
    /// `char-write-req` in flight.
    WriteRequest,
    /// `char-write-cmd` in flight.
    WriteCommand,
    /// `sec-level` in flight.
    SetSecLevel,
    /// `mtu` in flight.
    SetMtu,
    /// `psm` in flight.
    SetPsm,
}

impl ProtocolState {
    /// Kebab-case name, as used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::PrimaryDiscovery => "primary-discovery",
            Self::PrimaryDiscoveryByUuid => "primary-discovery-by-uuid",
            Self::CharacteristicsDiscovery => "characteristics-discovery",
            Self::DescriptorDiscovery => "descriptor-discovery",
            Self::ReadByUuid => "read-by-uuid",
            Self::ReadByHandle => "read-by-handle",
            Self::WriteRequest => "write-request",
            Self::WriteCommand => "write-command",
            Self::SetSecLevel => "set-sec-level",
            Self::SetMtu => "set-mtu",
            Self::SetPsm => "set-psm",
        }
    }

    /// Whether a command is waiting for its result.
    ///
    /// Everything except `Idle` and `Connected` is busy.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        !matches!(self, Self::Idle | Self::Connected)
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation gated by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// `connect`
    Connect,
    /// `psm`
    SetPsm,
    /// `mtu`
    SetMtu,
    /// `sec-level`
    SetSecurityLevel,
    /// `primary`
    PrimaryDiscovery,
    /// `primary <uuid>`
    PrimaryDiscoveryByUuid,
    /// `characteristics`
    CharacteristicsDiscovery,
    /// `char-desc`
    DescriptorDiscovery,
    /// `char-read-hnd`
    ReadByHandle,
    /// `char-read-uuid`
    ReadByUuid,
    /// `char-write-req`
    WriteRequest,
    /// `char-write-cmd`
    WriteCommand,
}

impl Operation {
    /// The interpreter verb for this operation.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::SetPsm => "psm",
            Self::SetMtu => "mtu",
            Self::SetSecurityLevel => "sec-level",
            Self::PrimaryDiscovery | Self::PrimaryDiscoveryByUuid => "primary",
            Self::CharacteristicsDiscovery => "characteristics",
            Self::DescriptorDiscovery => "char-desc",
            Self::ReadByHandle => "char-read-hnd",
            Self::ReadByUuid => "char-read-uuid",
            Self::WriteRequest => "char-write-req",
            Self::WriteCommand => "char-write-cmd",
        }
    }

    /// The state entered once the command has been issued.
    #[must_use]
    pub const fn busy_state(self) -> ProtocolState {
        match self {
            Self::Connect => ProtocolState::Connecting,
            Self::SetPsm => ProtocolState::SetPsm,
            Self::SetMtu => ProtocolState::SetMtu,
            Self::SetSecurityLevel => ProtocolState::SetSecLevel,
            Self::PrimaryDiscovery => ProtocolState::PrimaryDiscovery,
            Self::PrimaryDiscoveryByUuid => ProtocolState::PrimaryDiscoveryByUuid,
            Self::CharacteristicsDiscovery => ProtocolState::CharacteristicsDiscovery,
            Self::DescriptorDiscovery => ProtocolState::DescriptorDiscovery,
            Self::ReadByHandle => ProtocolState::ReadByHandle,
            Self::ReadByUuid => ProtocolState::ReadByUuid,
            Self::WriteRequest => ProtocolState::WriteRequest,
            Self::WriteCommand => ProtocolState::WriteCommand,
        }
    }

    /// States in which this operation can never run, whatever is pending.
    const fn excluded_by_link(self, state: ProtocolState) -> bool {
        match self {
            Self::ReadByHandle => {
                matches!(state, ProtocolState::Idle | ProtocolState::Disconnecting)
            }
            _ => matches!(state, ProtocolState::Idle | ProtocolState::Connecting),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// What the caller should do after [`StateMachine::check`] accepted a
/// write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Issue the command now.
    Ready,
    /// A command is pending; wait for completion and check again.
    Wait,
}

/// Outcome of [`StateMachine::command_completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Nothing was in flight; the state is unchanged.
    Unexpected,
    /// A (dis)connect is in flight; waiters are woken, the state is unchanged.
    Wake,
    /// The command finished and the machine settled in the given state.
    Settled(ProtocolState),
}

/// Per-session protocol state machine.
#[derive(Debug, Default)]
pub struct StateMachine {
    state: ProtocolState,
}

impl StateMachine {
    /// Start in [`ProtocolState::Idle`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Decide whether `operation` may be issued now. Never mutates.
    ///
    /// Only [`Operation::WriteRequest`] ever yields [`Admission::Wait`];
    /// every other operation is refused with [`StateError::Busy`] while a
    /// command is pending.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] describing why the operation is illegal in
    /// the current state.
    pub fn check(&self, operation: Operation) -> Result<Admission, StateError> {
        let state = self.state;
        match operation {
            Operation::Connect | Operation::SetPsm => {
                if state != ProtocolState::Idle {
                    return Err(StateError::NotIdle { operation, state });
                }
            }
            Operation::SetMtu | Operation::SetSecurityLevel => {
                if state == ProtocolState::Idle || state == ProtocolState::Connecting {
                    return Err(StateError::NotConnected { operation, state });
                }
                if state != ProtocolState::Connected {
                    return Err(StateError::Busy { operation, state });
                }
            }
            _ => {
                if operation.excluded_by_link(state) {
                    return Err(StateError::NotConnected { operation, state });
                }
                if state.is_busy() {
                    if operation == Operation::WriteRequest {
                        return Ok(Admission::Wait);
                    }
                    return Err(StateError::Busy { operation, state });
                }
            }
        }
        Ok(Admission::Ready)
    }

    /// Enter the busy state of an accepted operation.
    pub fn enter(&mut self, operation: Operation) {
        self.state = operation.busy_state();
    }

    /// [`check`](Self::check) then [`enter`](Self::enter) in one step.
    ///
    /// A write request that would have to wait is refused with
    /// [`StateError::Busy`]; callers that want to wait use `check`.
    ///
    /// # Errors
    ///
    /// Returns the [`StateError`] from `check`, leaving the state untouched.
    pub fn attempt(&mut self, operation: Operation) -> Result<(), StateError> {
        match self.check(operation)? {
            Admission::Ready => {
                self.enter(operation);
                Ok(())
            }
            Admission::Wait => Err(StateError::Busy {
                operation,
                state: self.state,
            }),
        }
    }

    /// A terminal result arrived for the command in flight.
    ///
    /// `Connecting` and `Disconnecting` are left alone: the link events
    /// decide those. `SetPsm` settles back to `Idle`, every other busy
    /// state to `Connected`.
    pub fn command_completed(&mut self) -> Completion {
        match self.state {
            ProtocolState::Idle | ProtocolState::Connected => Completion::Unexpected,
            ProtocolState::Connecting | ProtocolState::Disconnecting => Completion::Wake,
            ProtocolState::SetPsm => {
                self.state = ProtocolState::Idle;
                Completion::Settled(ProtocolState::Idle)
            }
            _ => {
                self.state = ProtocolState::Connected;
                Completion::Settled(ProtocolState::Connected)
            }
        }
    }

    /// The link came up.
    pub fn connected(&mut self) {
        self.state = ProtocolState::Connected;
    }

    /// The link went down.
    pub fn disconnected(&mut self) {
        self.state = ProtocolState::Idle;
    }

    /// Force the machine back to `Idle`, as on release.
    pub fn reset(&mut self) {
        self.state = ProtocolState::Idle;
    }
}
