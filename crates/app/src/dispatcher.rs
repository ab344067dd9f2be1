//! Result dispatcher: applies a result's state effect and routes it to the
//! matching listener callback.

use gattlink_domain::event::{GattResult, ResultKind};
use gattlink_domain::state::{Completion, StateMachine};

use crate::ports::GattListener;

/// Apply the state effect of `result`.
///
/// Link results move the machine directly; terminal results complete the
/// pending command. Runs whether or not a listener is bound.
pub fn apply_state(machine: &mut StateMachine, result: &GattResult) {
    match result.kind {
        ResultKind::Connected if result.is_success() => machine.connected(),
        ResultKind::Connected | ResultKind::Disconnected => machine.disconnected(),
        kind if kind.is_terminal() => match machine.command_completed() {
            Completion::Unexpected => {
                tracing::debug!(
                    tag = kind.tag(),
                    state = %machine.state(),
                    "terminal result with no command pending, ignored"
                );
            }
            Completion::Wake => {}
            Completion::Settled(state) => {
                tracing::trace!(tag = kind.tag(), %state, "command completed");
            }
        },
        _ => {}
    }
}

/// Invoke the one listener callback for `result`'s kind.
pub fn route(listener: &dyn GattListener, result: &GattResult) {
    match result.kind {
        ResultKind::Connected => listener.on_connected(result),
        ResultKind::Disconnected => listener.on_disconnected(result),
        ResultKind::PrimaryService => listener.on_primary_service(result),
        ResultKind::PrimaryServiceEnd => listener.on_primary_service_end(result),
        ResultKind::PrimaryServiceByUuid => listener.on_primary_service_by_uuid(result),
        ResultKind::PrimaryServiceByUuidEnd => listener.on_primary_service_by_uuid_end(result),
        ResultKind::Characteristic => listener.on_characteristic(result),
        ResultKind::CharacteristicEnd => listener.on_characteristic_end(result),
        ResultKind::Descriptor => listener.on_descriptor(result),
        ResultKind::DescriptorEnd => listener.on_descriptor_end(result),
        ResultKind::ValueByHandle => listener.on_value_by_handle(result),
        ResultKind::ValueByUuid => listener.on_value_by_uuid(result),
        ResultKind::ValueByUuidEnd => listener.on_value_by_uuid_end(result),
        ResultKind::WriteRequestResult => listener.on_write_request_result(result),
        ResultKind::WriteCommandResult => listener.on_write_command_result(result),
        ResultKind::SecurityLevelResult => listener.on_security_level_result(result),
        ResultKind::MtuResult => listener.on_mtu_result(result),
        ResultKind::PsmResult => listener.on_psm_result(result),
        ResultKind::Notification => listener.on_notification(result),
        ResultKind::Indication => listener.on_indication(result),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use gattlink_domain::state::{Operation, ProtocolState};

    use super::*;

    fn result(kind: ResultKind, code: u16) -> GattResult {
        GattResult {
            kind,
            code,
            payload: String::new(),
        }
    }

    fn machine_in(operation: Operation) -> StateMachine {
        let mut machine = StateMachine::new();
        machine.enter(operation);
        machine
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn push(&self, name: &'static str) {
            self.calls.lock().unwrap().push(name);
        }
    }

    impl GattListener for Recorder {
        fn on_connected(&self, _: &GattResult) {
            self.push("connected");
        }
        fn on_characteristic(&self, _: &GattResult) {
            self.push("characteristic");
        }
        fn on_write_command_result(&self, _: &GattResult) {
            self.push("write_command");
        }
        fn on_write_request_result(&self, _: &GattResult) {
            self.push("write_request");
        }
        fn on_notification(&self, _: &GattResult) {
            self.push("notification");
        }
    }

    // ── State effects ───────────────────────────────────────────────────

    #[test]
    fn should_connect_on_zero_status() {
        let mut machine = machine_in(Operation::Connect);
        apply_state(&mut machine, &result(ResultKind::Connected, 0));
        assert_eq!(machine.state(), ProtocolState::Connected);
    }

    #[test]
    fn should_go_idle_on_failed_connect() {
        let mut machine = machine_in(Operation::Connect);
        apply_state(&mut machine, &result(ResultKind::Connected, 0x0D));
        assert_eq!(machine.state(), ProtocolState::Idle);
    }

    #[test]
    fn should_go_idle_on_disconnect() {
        let mut machine = machine_in(Operation::CharacteristicsDiscovery);
        apply_state(&mut machine, &result(ResultKind::Disconnected, 0));
        assert_eq!(machine.state(), ProtocolState::Idle);
    }

    #[test]
    fn should_complete_on_terminal_result() {
        let mut machine = machine_in(Operation::SetMtu);
        apply_state(&mut machine, &result(ResultKind::MtuResult, 0));
        assert_eq!(machine.state(), ProtocolState::Connected);

        let mut machine = machine_in(Operation::SetPsm);
        apply_state(&mut machine, &result(ResultKind::PsmResult, 0));
        assert_eq!(machine.state(), ProtocolState::Idle);
    }

    #[test]
    fn should_stay_busy_on_streamed_entries() {
        let mut machine = machine_in(Operation::PrimaryDiscovery);
        apply_state(&mut machine, &result(ResultKind::PrimaryService, 1));
        assert_eq!(machine.state(), ProtocolState::PrimaryDiscovery);

        apply_state(&mut machine, &result(ResultKind::PrimaryServiceEnd, 0));
        assert_eq!(machine.state(), ProtocolState::Connected);
    }

    #[test]
    fn should_ignore_terminal_result_while_idle() {
        let mut machine = StateMachine::new();
        apply_state(&mut machine, &result(ResultKind::CharacteristicEnd, 0));
        assert_eq!(machine.state(), ProtocolState::Idle);
    }

    #[test]
    fn should_not_change_state_on_notification() {
        let mut machine = machine_in(Operation::ReadByHandle);
        apply_state(&mut machine, &result(ResultKind::Notification, 0x12));
        assert_eq!(machine.state(), ProtocolState::ReadByHandle);
    }

    // ── Routing ─────────────────────────────────────────────────────────

    #[test]
    fn should_route_each_kind_to_its_callback() {
        let recorder = Recorder::default();
        route(&recorder, &result(ResultKind::Connected, 0));
        route(&recorder, &result(ResultKind::Characteristic, 0));
        route(&recorder, &result(ResultKind::WriteCommandResult, 0));
        route(&recorder, &result(ResultKind::WriteRequestResult, 0));
        route(&recorder, &result(ResultKind::Notification, 0));
        route(&recorder, &result(ResultKind::MtuResult, 0));

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            [
                "connected",
                "characteristic",
                "write_command",
                "write_request",
                "notification"
            ]
        );
    }
}
