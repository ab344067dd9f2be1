//! # gattlink-adapter-gatttool
//!
//! Process adapter: runs the BlueZ `gatttool` in interactive mode and
//! connects it to a [`GattSession`](gattlink_app::session::GattSession).
//!
//! ## How it works
//!
//! | Stream | Task | Destination |
//! |--------|------|-------------|
//! | stdin | writer | command lines queued by [`ProcessBridge`] |
//! | stdout | pump | `GattSession::line_received`, then `end_of_stream` |
//! | stderr | logger | `tracing` at debug level |
//!
//! When stdout closes the pump gives the process a short grace period to
//! exit, then reports either the exit code or that the process is still
//! running. Either way the session is released and the child killed.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `gattlink-app` only.

mod config;
mod error;
mod process;

pub use config::GatttoolConfig;
pub use error::ProcessError;
pub use process::{GatttoolSession, ProcessBridge, spawn};
