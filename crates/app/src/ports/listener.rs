//! Listener port: one callback per result family plus out-of-band events.
//!
//! Callbacks run on the line-delivery path with the session lock held.
//! They must return quickly and must not call back into the session.

use gattlink_domain::event::GattResult;
use gattlink_domain::line::ShellError;

/// Receives session events. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait GattListener: Send + Sync {
    /// `CONNECT`; `result.code` is the status, 0 on success.
    fn on_connected(&self, result: &GattResult) {}
    /// `DISCONNECT`.
    fn on_disconnected(&self, result: &GattResult) {}
    /// One `PRIMARY-ALL` entry.
    fn on_primary_service(&self, result: &GattResult) {}
    fn on_primary_service_end(&self, result: &GattResult) {}
    /// One `PRIMARY-UUID` entry.
    fn on_primary_service_by_uuid(&self, result: &GattResult) {}
    fn on_primary_service_by_uuid_end(&self, result: &GattResult) {}
    /// One `CHAR` entry.
    fn on_characteristic(&self, result: &GattResult) {}
    fn on_characteristic_end(&self, result: &GattResult) {}
    /// One `CHAR-VAL-DESC` entry.
    fn on_descriptor(&self, result: &GattResult) {}
    fn on_descriptor_end(&self, result: &GattResult) {}
    /// `CHAR-READ-HND`; see [`GattResult::value`].
    fn on_value_by_handle(&self, result: &GattResult) {}
    /// One `CHAR-READ-UUID` entry; `result.code` is the handle.
    fn on_value_by_uuid(&self, result: &GattResult) {}
    fn on_value_by_uuid_end(&self, result: &GattResult) {}
    fn on_write_request_result(&self, result: &GattResult) {}
    fn on_write_command_result(&self, result: &GattResult) {}
    fn on_security_level_result(&self, result: &GattResult) {}
    fn on_mtu_result(&self, result: &GattResult) {}
    fn on_psm_result(&self, result: &GattResult) {}
    /// Unsolicited notification; `result.code` is the handle.
    fn on_notification(&self, result: &GattResult) {}
    /// Unsolicited indication; `result.code` is the handle.
    fn on_indication(&self, result: &GattResult) {}

    /// The interpreter process terminated.
    fn on_process_exit(&self, code: Option<i32>) {}
    /// The output stream closed while the process was still running.
    fn on_stdin_closed(&self) {}
    /// The interpreter reported a command error.
    fn on_shell_error(&self, error: &ShellError) {}
}

