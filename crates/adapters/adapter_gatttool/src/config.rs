//! Interpreter process configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the `gatttool` child process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatttoolConfig {
    /// Program to run, looked up on `PATH` when not absolute.
    pub program: String,
    /// Arguments; must put the program in interactive mode.
    pub args: Vec<String>,
    /// Optional HCI adapter (e.g. `hci1`), passed as `-i <adapter>`.
    pub adapter: Option<String>,
    /// How long to wait for the process to exit once its output closes,
    /// in milliseconds.
    pub exit_grace_ms: u64,
}

impl GatttoolConfig {
    /// The full argument list, adapter selection included.
    #[must_use]
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(adapter) = &self.adapter {
            args.push("-i".to_string());
            args.push(adapter.clone());
        }
        args
    }

    /// [`exit_grace_ms`](Self::exit_grace_ms) as a [`Duration`].
    #[must_use]
    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }
}

impl Default for GatttoolConfig {
    fn default() -> Self {
        Self {
            program: "gatttool".to_string(),
            args: vec!["-I".to_string()],
            adapter: None,
            exit_grace_ms: 100,
        }
    }
}
