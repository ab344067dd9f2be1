//! Port definitions: traits that adapters and callers implement.
//!
//! Ports are the boundaries between the session and the outside world.
//! They are defined here (in `app`) so that both the session and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod io_bridge;
pub mod listener;

pub use io_bridge::{BridgeError, IoBridge};
pub use listener::GattListener;
