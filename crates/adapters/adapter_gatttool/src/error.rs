//! Process adapter error types.

/// Errors raised while starting the interpreter process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The program could not be started.
    #[error("failed to spawn {program}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A standard stream of the child was not captured.
    #[error("interpreter {0} is not piped")]
    MissingPipe(&'static str),
}
