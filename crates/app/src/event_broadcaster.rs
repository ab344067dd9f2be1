//! In-process event broadcaster backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use gattlink_domain::event::{GattEvent, GattResult};
use gattlink_domain::line::ShellError;

use crate::ports::GattListener;

/// Listener that republishes every session event on a tokio [`broadcast`]
/// channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
pub struct EventBroadcaster {
    sender: broadcast::Sender<GattEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GattEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: GattEvent) {
        // only fails with zero receivers
        let _ = self.sender.send(event);
    }

    fn publish_result(&self, result: &GattResult) {
        self.publish(GattEvent::Result(result.clone()));
    }
}

impl GattListener for EventBroadcaster {
    fn on_connected(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_disconnected(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_primary_service(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_primary_service_end(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_primary_service_by_uuid(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_primary_service_by_uuid_end(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_characteristic(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_characteristic_end(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_descriptor(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_descriptor_end(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_value_by_handle(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_value_by_uuid(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_value_by_uuid_end(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_write_request_result(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_write_command_result(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_security_level_result(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_mtu_result(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_psm_result(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_notification(&self, result: &GattResult) {
        self.publish_result(result);
    }
    fn on_indication(&self, result: &GattResult) {
        self.publish_result(result);
    }

    fn on_process_exit(&self, code: Option<i32>) {
        self.publish(GattEvent::ProcessExited { code });
    }
    fn on_stdin_closed(&self) {
        self.publish(GattEvent::StdinClosed);
    }
    fn on_shell_error(&self, error: &ShellError) {
        self.publish(GattEvent::ShellError(error.clone()));
    }
}
