//! GATT session facade.
//!
//! A [`GattSession`] owns one interpreter process (through an [`IoBridge`])
//! and the protocol state machine for its single logical connection. Every
//! operation runs the same sequence under the session lock:
//!
//! 1. precondition check against the current state
//! 2. encode the command line
//! 3. enter the operation's busy state
//! 4. hand the line to the bridge
//!
//! Inbound lines go through [`GattSession::line_received`], which takes the
//! same lock, so an operation never interleaves with a result.
//!
//! Only [`GattSession::write_request`] waits for a pending command to
//! complete; every other operation is refused with
//! [`StateError::Busy`] while one is in flight.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use gattlink_domain::address::{AddressType, BdAddr};
use gattlink_domain::command::{self, OutboundCommand};
use gattlink_domain::error::{StateError, ValidationError};
use gattlink_domain::event::GattResult;
use gattlink_domain::gatt_uuid::GattUuid;
use gattlink_domain::line::{InboundLine, classify};
use gattlink_domain::security::SecurityLevel;
use gattlink_domain::state::{Admission, Operation, ProtocolState, StateMachine};

use crate::dispatcher;
use crate::ports::{BridgeError, GattListener, IoBridge};

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The current protocol state does not allow the operation.
    #[error("operation refused by protocol state")]
    State(#[from] StateError),

    /// An argument could not be encoded.
    #[error("invalid operation argument")]
    Validation(#[from] ValidationError),

    /// The command was accepted but the bridge failed to deliver it.
    /// The session stays in the operation's busy state.
    #[error("failed to send command")]
    Send(#[source] BridgeError),

    /// The session has been released.
    #[error("session released")]
    Released,
}

/// How the interpreter's output stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The process terminated, with its exit code when one is known.
    Exited(Option<i32>),
    /// The output closed while the process was still alive.
    StillRunning,
}

struct Inner<B> {
    machine: StateMachine,
    bridge: Option<B>,
    listener: Option<Arc<dyn GattListener>>,
}

/// One interpreter process and its logical connection.
pub struct GattSession<B> {
    inner: Mutex<Inner<B>>,
    /// Signalled on every state change a waiting write request cares about.
    changed: Notify,
}

impl<B: IoBridge> GattSession<B> {
    /// Create an idle session writing through `bridge`.
    #[must_use]
    pub fn new(bridge: B) -> Self {
        Self {
            inner: Mutex::new(Inner {
                machine: StateMachine::new(),
                bridge: Some(bridge),
                listener: None,
            }),
            changed: Notify::new(),
        }
    }

    /// Bind `listener`, replacing any previous one.
    pub async fn set_listener(&self, listener: Arc<dyn GattListener>) {
        let mut inner = self.inner.lock().await;
        if inner.bridge.is_none() {
            tracing::debug!("listener not bound, session already released");
            return;
        }
        inner.listener = Some(listener);
    }

    /// Unbind the current listener. Results keep their state effects.
    pub async fn clear_listener(&self) {
        self.inner.lock().await.listener = None;
    }

    /// The current protocol state.
    pub async fn state(&self) -> ProtocolState {
        self.inner.lock().await.machine.state()
    }

    /// Whether [`release`](Self::release) has run.
    pub async fn is_released(&self) -> bool {
        self.inner.lock().await.bridge.is_none()
    }

    /// Resolve once the session has been released, by a caller or because
    /// the interpreter's output ended.
    pub async fn released(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_released().await {
                return;
            }
            notified.await;
        }
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// `connect <addr> [<type>]`; requires `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn connect(
        &self,
        address: BdAddr,
        address_type: Option<AddressType>,
    ) -> Result<(), SessionError> {
        self.issue(Operation::Connect, || {
            Ok(command::connect(address, address_type))
        })
        .await
    }

    /// Tear the session down.
    ///
    /// No `disconnect` line is sent: the interpreter is stopped and the
    /// session released, which always succeeds.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` matches the other operations.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.release().await;
        Ok(())
    }

    /// `psm <n>`; requires `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn set_psm(&self, psm: u16) -> Result<(), SessionError> {
        self.issue(Operation::SetPsm, || Ok(command::set_psm(psm)))
            .await
    }

    /// `mtu <n>`; requires `Connected`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn set_mtu(&self, mtu: u16) -> Result<(), SessionError> {
        self.issue(Operation::SetMtu, || Ok(command::set_mtu(mtu)))
            .await
    }

    /// `sec-level <level>`; requires `Connected`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn set_security_level(&self, level: SecurityLevel) -> Result<(), SessionError> {
        self.issue(Operation::SetSecurityLevel, || {
            Ok(command::set_security_level(level))
        })
        .await
    }

    /// `primary`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn primary_discovery(&self) -> Result<(), SessionError> {
        self.issue(Operation::PrimaryDiscovery, || {
            Ok(command::primary_discovery())
        })
        .await
    }

    /// `primary <uuid>`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn primary_discovery_by_uuid(&self, uuid: GattUuid) -> Result<(), SessionError> {
        self.issue(Operation::PrimaryDiscoveryByUuid, || {
            Ok(command::primary_discovery_by_uuid(uuid))
        })
        .await
    }

    /// `characteristics [<start> [<end> [<uuid>]]]`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn characteristics_discovery(
        &self,
        start: Option<u16>,
        end: Option<u16>,
        uuid: Option<GattUuid>,
    ) -> Result<(), SessionError> {
        self.issue(Operation::CharacteristicsDiscovery, || {
            Ok(command::characteristics_discovery(start, end, uuid))
        })
        .await
    }

    /// `char-desc [<start> [<end>]]`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn descriptor_discovery(
        &self,
        start: Option<u16>,
        end: Option<u16>,
    ) -> Result<(), SessionError> {
        self.issue(Operation::DescriptorDiscovery, || {
            Ok(command::descriptor_discovery(start, end))
        })
        .await
    }

    /// `char-read-hnd <handle> [<offset>]`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn read_by_handle(&self, handle: u16, offset: Option<u16>) -> Result<(), SessionError> {
        self.issue(Operation::ReadByHandle, || {
            Ok(command::read_by_handle(handle, offset))
        })
        .await
    }

    /// `char-read-uuid <uuid> [<start> [<end>]]`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused or not delivered.
    pub async fn read_by_uuid(
        &self,
        uuid: GattUuid,
        start: Option<u16>,
        end: Option<u16>,
    ) -> Result<(), SessionError> {
        self.issue(Operation::ReadByUuid, || {
            Ok(command::read_by_uuid(uuid, start, end))
        })
        .await
    }

    /// `char-write-req <handle> <hexbytes>`.
    ///
    /// While another command is pending this waits until the session is
    /// `Connected` again, then sends. The wait ends early if the link goes
    /// down or the session is released.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for an empty `value`,
    /// [`SessionError::Released`] when released while waiting, or a
    /// [`SessionError::State`] rejection.
    pub async fn write_request(&self, handle: u16, value: &[u8]) -> Result<(), SessionError> {
        let operation = Operation::WriteRequest;
        let mut inner = self.inner.lock().await;
        loop {
            if inner.bridge.is_none() {
                return Err(SessionError::Released);
            }
            match inner.machine.check(operation) {
                Ok(Admission::Ready) => break,
                Ok(Admission::Wait) => {
                    tracing::debug!(state = %inner.machine.state(), "write request waiting for pending command");
                    let notified = self.changed.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    drop(inner);
                    notified.await;
                    inner = self.inner.lock().await;
                }
                Err(err) => {
                    tracing::warn!(%err, "operation refused");
                    return Err(err.into());
                }
            }
        }

        let command = command::write_request(handle, value).map_err(refused)?;
        Self::send(&mut inner, &command)
    }

    /// `char-write-cmd <handle> <hexbytes>`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when refused, invalid or not delivered.
    pub async fn write_command(&self, handle: u16, value: &[u8]) -> Result<(), SessionError> {
        self.issue(Operation::WriteCommand, || {
            command::write_command(handle, value)
        })
        .await
    }

    /// Stop the interpreter and drop the listener. Idempotent.
    ///
    /// Any waiting write request is woken and fails with
    /// [`SessionError::Released`].
    pub async fn release(&self) {
        let mut inner = self.inner.lock().await;
        self.release_locked(&mut inner);
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    /// Process one line of interpreter output.
    pub async fn line_received(&self, line: &str) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.bridge.is_none() {
            tracing::trace!(line, "line after release dropped");
            return;
        }

        match classify(line) {
            InboundLine::Prompt(prompt) => {
                tracing::trace!(
                    state = %prompt.state,
                    address = %prompt.address.trim(),
                    kind = %prompt.kind,
                    "prompt"
                );
            }
            InboundLine::Result(result_line) => {
                let Some(result) = GattResult::from_line(&result_line) else {
                    tracing::debug!(tag = %result_line.tag, "unknown result tag dropped");
                    return;
                };
                dispatcher::apply_state(&mut inner.machine, &result);
                match &inner.listener {
                    Some(listener) => dispatcher::route(listener.as_ref(), &result),
                    None => tracing::debug!(tag = result.kind.tag(), "no listener bound"),
                }
                self.changed.notify_waiters();
            }
            InboundLine::Error(error) => {
                tracing::warn!(code = error.code, line = %error.message, "interpreter reported an error");
                if let Some(listener) = &inner.listener {
                    listener.on_shell_error(&error);
                }
            }
            InboundLine::Unrecognized => {
                tracing::trace!(line, "unrecognized line dropped");
            }
        }
    }

    /// The interpreter's output stream ended. Reports the cause to the
    /// listener, then releases the session.
    pub async fn end_of_stream(&self, end: StreamEnd) {
        let mut inner = self.inner.lock().await;
        if inner.bridge.is_none() {
            return;
        }

        match end {
            StreamEnd::Exited(code) => {
                tracing::info!(?code, "interpreter exited");
                if let Some(listener) = &inner.listener {
                    listener.on_process_exit(code);
                }
            }
            StreamEnd::StillRunning => {
                tracing::warn!("interpreter output closed while still running");
                if let Some(listener) = &inner.listener {
                    listener.on_stdin_closed();
                }
            }
        }
        self.release_locked(&mut inner);
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn issue<F>(&self, operation: Operation, encode: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> Result<OutboundCommand, ValidationError>,
    {
        let mut inner = self.inner.lock().await;
        if inner.bridge.is_none() {
            return Err(SessionError::Released);
        }

        let state = inner.machine.state();
        let admitted = match inner.machine.check(operation) {
            Ok(Admission::Ready) => Ok(()),
            Ok(Admission::Wait) => Err(StateError::Busy { operation, state }),
            Err(err) => Err(err),
        };
        if let Err(err) = admitted {
            tracing::warn!(%err, "operation refused");
            return Err(err.into());
        }

        let command = encode().map_err(refused)?;
        Self::send(&mut inner, &command)
    }

    fn send(inner: &mut Inner<B>, command: &OutboundCommand) -> Result<(), SessionError> {
        let Some(bridge) = inner.bridge.as_ref() else {
            return Err(SessionError::Released);
        };

        inner.machine.enter(command.operation());
        tracing::debug!(%command, state = %inner.machine.state(), "sending command");

        bridge.send_line(command.text()).map_err(|err| {
            tracing::warn!(%err, %command, "command not delivered, state kept");
            SessionError::Send(err)
        })
    }

    fn release_locked(&self, inner: &mut Inner<B>) {
        let Some(bridge) = inner.bridge.take() else {
            tracing::debug!("session already released");
            return;
        };
        inner.listener = None;
        bridge.shutdown();
        inner.machine.reset();
        self.changed.notify_waiters();
        tracing::info!("session released");
    }
}

fn refused(err: ValidationError) -> ValidationError {
    tracing::warn!(%err, "operation refused");
    err
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use gattlink_domain::line::ShellError;

    use super::*;

    // ── Test doubles ────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingBridge {
        sent: StdMutex<Vec<String>>,
        shutdowns: StdMutex<usize>,
        fail: bool,
    }

    impl RecordingBridge {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        fn shutdowns(&self) -> usize {
            *self.shutdowns.lock().unwrap()
        }
    }

    impl IoBridge for RecordingBridge {
        fn send_line(&self, line: &str) -> Result<(), BridgeError> {
            if self.fail {
                return Err(BridgeError::Closed);
            }
            self.sent.lock().unwrap().push(line.to_string());
            Ok(())
        }

        fn shutdown(&self) {
            *self.shutdowns.lock().unwrap() += 1;
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        calls: StdMutex<Vec<String>>,
    }

    impl RecordingListener {
        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl GattListener for RecordingListener {
        fn on_connected(&self, result: &GattResult) {
            self.push(format!("connected:{}", result.code));
        }
        fn on_characteristic_end(&self, result: &GattResult) {
            self.push(format!("characteristic_end:{}", result.code));
        }
        fn on_value_by_handle(&self, result: &GattResult) {
            self.push(format!("value_by_handle:{}", result.payload));
        }
        fn on_psm_result(&self, result: &GattResult) {
            self.push(format!("psm:{}", result.code));
        }
        fn on_process_exit(&self, code: Option<i32>) {
            self.push(format!("process_exit:{code:?}"));
        }
        fn on_stdin_closed(&self) {
            self.push("stdin_closed".to_string());
        }
        fn on_shell_error(&self, error: &ShellError) {
            self.push(format!("shell_error:{}", error.code));
        }
    }

    const ADDRESS: &str = "00:11:22:33:44:55";

    fn session_with(bridge: RecordingBridge) -> (GattSession<Arc<RecordingBridge>>, Arc<RecordingBridge>) {
        let bridge = Arc::new(bridge);
        (GattSession::new(Arc::clone(&bridge)), bridge)
    }

    async fn listening_session() -> (
        Arc<GattSession<Arc<RecordingBridge>>>,
        Arc<RecordingBridge>,
        Arc<RecordingListener>,
    ) {
        let (session, bridge) = session_with(RecordingBridge::default());
        let listener = Arc::new(RecordingListener::default());
        session.set_listener(listener.clone()).await;
        (Arc::new(session), bridge, listener)
    }

    async fn connected_session() -> (
        Arc<GattSession<Arc<RecordingBridge>>>,
        Arc<RecordingBridge>,
        Arc<RecordingListener>,
    ) {
        let (session, bridge, listener) = listening_session().await;
        session
            .connect(ADDRESS.parse().unwrap(), Some(AddressType::Public))
            .await
            .unwrap();
        session.line_received("CONNECT(0000): 00:11:22:33:44:55").await;
        (session, bridge, listener)
    }

    // ── Connect ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn should_send_connect_and_enter_connecting() {
        let (session, bridge, _) = listening_session().await;

        session
            .connect(ADDRESS.parse().unwrap(), Some(AddressType::Public))
            .await
            .unwrap();

        assert_eq!(bridge.sent(), ["connect 00:11:22:33:44:55 public"]);
        assert_eq!(session.state().await, ProtocolState::Connecting);
    }

    #[tokio::test]
    async fn should_become_connected_on_connect_result() {
        let (session, _, listener) = connected_session().await;

        assert_eq!(session.state().await, ProtocolState::Connected);
        assert_eq!(listener.calls(), ["connected:0"]);
    }

    #[tokio::test]
    async fn should_return_to_idle_on_failed_connect() {
        let (session, _, listener) = listening_session().await;
        session.connect(ADDRESS.parse().unwrap(), None).await.unwrap();

        session.line_received("CONNECT(0010): 00:11:22:33:44:55").await;

        assert_eq!(session.state().await, ProtocolState::Idle);
        assert_eq!(listener.calls(), ["connected:16"]);
    }

    #[tokio::test]
    async fn should_refuse_connect_when_not_idle() {
        let (session, bridge, _) = connected_session().await;

        let err = session.connect(ADDRESS.parse().unwrap(), None).await.unwrap_err();

        assert!(matches!(err, SessionError::State(StateError::NotIdle { .. })));
        assert_eq!(bridge.sent().len(), 1);
    }

    // ── Preconditions ───────────────────────────────────────────────────

    #[tokio::test]
    async fn should_refuse_gatt_operations_before_connect() {
        let (session, bridge, _) = listening_session().await;

        let err = session.primary_discovery().await.unwrap_err();
        assert!(matches!(err, SessionError::State(StateError::NotConnected { .. })));
        let err = session.set_mtu(247).await.unwrap_err();
        assert!(matches!(err, SessionError::State(StateError::NotConnected { .. })));

        assert!(bridge.sent().is_empty());
        assert_eq!(session.state().await, ProtocolState::Idle);
    }

    #[tokio::test]
    async fn should_refuse_second_command_while_busy() {
        let (session, bridge, _) = connected_session().await;
        session
            .characteristics_discovery(Some(0x10), Some(0x05), None)
            .await
            .unwrap();

        let err = session.read_by_handle(0x2A, None).await.unwrap_err();
        assert!(matches!(err, SessionError::State(StateError::Busy { .. })));
        let err = session.write_command(0x10, &[1]).await.unwrap_err();
        assert!(matches!(err, SessionError::State(StateError::Busy { .. })));

        assert_eq!(
            bridge.sent(),
            ["connect 00:11:22:33:44:55 public", "characteristics 0010 0005"]
        );
        assert_eq!(
            session.state().await,
            ProtocolState::CharacteristicsDiscovery
        );
    }

    #[tokio::test]
    async fn should_reject_empty_write_without_state_change() {
        let (session, bridge, _) = connected_session().await;

        let err = session.write_command(0x10, &[]).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::EmptyWritePayload)
        ));
        assert_eq!(bridge.sent().len(), 1);
        assert_eq!(session.state().await, ProtocolState::Connected);
    }

    // ── Completion ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn should_return_to_connected_on_terminal_result() {
        let (session, _, listener) = connected_session().await;
        session.read_by_handle(0x2A, None).await.unwrap();

        session.line_received("CHAR-READ-HND(0000): 0a 1b").await;

        assert_eq!(session.state().await, ProtocolState::Connected);
        assert_eq!(listener.calls(), ["connected:0", "value_by_handle:0a 1b"]);
    }

    #[tokio::test]
    async fn should_return_to_idle_after_psm() {
        let (session, bridge, listener) = listening_session().await;
        session.set_psm(31).await.unwrap();
        assert_eq!(session.state().await, ProtocolState::SetPsm);

        session.line_received("PSM(0000): 31").await;

        assert_eq!(bridge.sent(), ["psm 31"]);
        assert_eq!(session.state().await, ProtocolState::Idle);
        assert_eq!(listener.calls(), ["psm:0"]);
    }

    #[tokio::test]
    async fn should_apply_state_without_listener() {
        let (session, _, listener) = connected_session().await;
        session.set_mtu(247).await.unwrap();
        session.clear_listener().await;

        session.line_received("MTU(0000): 247").await;

        assert_eq!(session.state().await, ProtocolState::Connected);
        assert_eq!(listener.calls(), ["connected:0"]);
    }

    #[tokio::test]
    async fn should_ignore_unrecognized_and_unknown_lines() {
        let (session, _, listener) = connected_session().await;
        session.primary_discovery().await.unwrap();

        session.line_received("Attempting to connect").await;
        session.line_received("BOGUS(0000): x").await;
        session.line_received("[CON][00:11:22:33:44:55][LE]>").await;

        assert_eq!(session.state().await, ProtocolState::PrimaryDiscovery);
        assert_eq!(listener.calls(), ["connected:0"]);
    }

    #[tokio::test]
    async fn should_report_shell_error_without_state_change() {
        let (session, _, listener) = connected_session().await;

        session
            .line_received("ERROR(0002) parse: bad argument (1,5): 'zz'")
            .await;

        assert_eq!(session.state().await, ProtocolState::Connected);
        assert_eq!(listener.calls(), ["connected:0", "shell_error:2"]);
    }

    // ── Write request ───────────────────────────────────────────────────

    #[tokio::test]
    async fn should_block_write_request_until_pending_command_completes() {
        let (session, bridge, _) = connected_session().await;
        session.characteristics_discovery(None, None, None).await.unwrap();

        let writer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.write_request(0x0010, &[0xAB, 0xCD]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());
        assert_eq!(bridge.sent().len(), 2);

        session.line_received("CHAR-END(0000):").await;
        writer.await.unwrap().unwrap();

        assert_eq!(
            bridge.sent(),
            [
                "connect 00:11:22:33:44:55 public",
                "characteristics",
                "char-write-req 0010 ABCD"
            ]
        );
        assert_eq!(session.state().await, ProtocolState::WriteRequest);
    }

    #[tokio::test]
    async fn should_keep_waiting_through_streamed_results() {
        let (session, bridge, _) = connected_session().await;
        session.primary_discovery().await.unwrap();

        let writer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.write_request(0x0010, &[0x01]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        session
            .line_received("PRIMARY-ALL(0001): 0001 0005 1800")
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());
        assert_eq!(bridge.sent().len(), 2);

        session.line_received("PRIMARY-ALL-END(0000):").await;
        writer.await.unwrap().unwrap();
        assert_eq!(bridge.sent().last().unwrap(), "char-write-req 0010 01");
    }

    #[tokio::test]
    async fn should_release_waiting_write_request_without_listener() {
        let (session, bridge, listener) = connected_session().await;
        session.primary_discovery().await.unwrap();
        session.clear_listener().await;

        let writer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.write_request(0x10, &[1]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        session.line_received("PRIMARY-ALL-END(0000):").await;

        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer still waiting")
            .unwrap()
            .unwrap();
        assert_eq!(bridge.sent().last().unwrap(), "char-write-req 0010 01");
        assert_eq!(listener.calls(), ["connected:0"]);
    }

    #[tokio::test]
    async fn should_reject_empty_write_request_without_state_change() {
        let (session, bridge, _) = connected_session().await;

        let err = session.write_request(0x10, &[]).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::EmptyWritePayload)
        ));
        assert_eq!(bridge.sent().len(), 1);
        assert_eq!(session.state().await, ProtocolState::Connected);
    }

    #[tokio::test]
    async fn should_fail_waiting_write_request_on_release() {
        let (session, bridge, _) = connected_session().await;
        session.primary_discovery().await.unwrap();

        let writer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.write_request(0x0010, &[0x01]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        session.release().await;

        let err = writer.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::Released));
        assert_eq!(bridge.sent().len(), 2);
    }

    #[tokio::test]
    async fn should_fail_waiting_write_request_on_link_loss() {
        let (session, _, _) = connected_session().await;
        session.primary_discovery().await.unwrap();

        let writer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.write_request(0x0010, &[0x01]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        session.line_received("DISCONNECT(0000): 00:11:22:33:44:55").await;

        let err = writer.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::State(StateError::NotConnected { .. })));
    }

    // ── Send failure ────────────────────────────────────────────────────

    #[tokio::test]
    async fn should_keep_transition_when_send_fails() {
        let (session, _) = session_with(RecordingBridge {
            fail: true,
            ..RecordingBridge::default()
        });

        let err = session.connect(ADDRESS.parse().unwrap(), None).await.unwrap_err();

        assert!(matches!(err, SessionError::Send(BridgeError::Closed)));
        assert_eq!(session.state().await, ProtocolState::Connecting);
    }

    // ── Release ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn should_release_once_when_called_twice() {
        let (session, bridge, _) = connected_session().await;

        session.release().await;
        session.release().await;

        assert_eq!(bridge.shutdowns(), 1);
        assert!(session.is_released().await);
        assert_eq!(session.state().await, ProtocolState::Idle);
    }

    #[tokio::test]
    async fn should_fail_fast_after_release() {
        let (session, bridge, listener) = connected_session().await;
        session.release().await;

        let err = session.connect(ADDRESS.parse().unwrap(), None).await.unwrap_err();
        assert!(matches!(err, SessionError::Released));
        let err = session.write_request(0x10, &[1]).await.unwrap_err();
        assert!(matches!(err, SessionError::Released));

        session.line_received("CONNECT(0000): 00:11:22:33:44:55").await;
        assert_eq!(bridge.sent().len(), 1);
        assert_eq!(listener.calls(), ["connected:0"]);
    }

    #[tokio::test]
    async fn should_always_succeed_on_disconnect() {
        let (session, bridge, _) = connected_session().await;
        session.primary_discovery().await.unwrap();

        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();

        assert!(session.is_released().await);
        assert_eq!(bridge.shutdowns(), 1);
        assert!(!bridge.sent().iter().any(|line| line == "disconnect"));
    }

    #[tokio::test]
    async fn should_drop_listener_on_release() {
        let (session, _, listener) = connected_session().await;
        assert_eq!(Arc::strong_count(&listener), 2);

        session.release().await;

        assert_eq!(Arc::strong_count(&listener), 1);
    }

    // ── End of stream ───────────────────────────────────────────────────

    #[tokio::test]
    async fn should_wake_release_waiters_on_end_of_stream() {
        let (session, _, _) = connected_session().await;
        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.released().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        session.end_of_stream(StreamEnd::Exited(Some(0))).await;

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("release waiter still pending")
            .unwrap();
    }

    #[tokio::test]
    async fn should_resolve_release_wait_when_already_released() {
        let (session, _, _) = connected_session().await;
        session.release().await;

        tokio::time::timeout(Duration::from_secs(1), session.released())
            .await
            .expect("release wait did not resolve");
    }

    #[tokio::test]
    async fn should_report_process_exit_and_release() {
        let (session, bridge, listener) = connected_session().await;

        session.end_of_stream(StreamEnd::Exited(Some(1))).await;

        assert_eq!(listener.calls(), ["connected:0", "process_exit:Some(1)"]);
        assert!(session.is_released().await);
        assert_eq!(bridge.shutdowns(), 1);
    }

    #[tokio::test]
    async fn should_report_stdin_closed_and_release() {
        let (session, _, listener) = listening_session().await;

        session.end_of_stream(StreamEnd::StillRunning).await;
        session.end_of_stream(StreamEnd::Exited(None)).await;

        assert_eq!(listener.calls(), ["stdin_closed"]);
        assert!(session.is_released().await);
    }
}
