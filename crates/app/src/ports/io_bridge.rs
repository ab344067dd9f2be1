//! IO bridge port: the write side of the interpreter process.

/// Errors raised while handing a line to the interpreter.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The bridge has been shut down or the process input is gone.
    #[error("interpreter input is closed")]
    Closed,

    /// Writing to the process failed.
    #[error("interpreter write error")]
    Io(#[source] std::io::Error),
}

/// Sends command lines to a running interpreter.
///
/// Implementations must not block: the session calls these methods while
/// holding its lock.
pub trait IoBridge: Send + Sync {
    /// Queue one command line. The newline is appended by the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] when the line cannot be delivered.
    fn send_line(&self, line: &str) -> Result<(), BridgeError>;

    /// Stop the interpreter. Called at most once per session.
    fn shutdown(&self);
}

impl<T: IoBridge> IoBridge for std::sync::Arc<T> {
    fn send_line(&self, line: &str) -> Result<(), BridgeError> {
        (**self).send_line(line)
    }

    fn shutdown(&self) {
        (**self).shutdown();
    }
}
