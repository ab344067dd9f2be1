//! # gattlink-app
//!
//! Application layer: the session facade and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters and callers implement:
//!   - `IoBridge`: writes command lines to the interpreter and shuts it down
//!   - `GattListener`: receives results and out-of-band events
//! - Provide the **session facade** (`GattSession`) that gates every
//!   operation through the protocol state machine
//! - Route classified result lines to the listener (`dispatcher`)
//! - Provide **in-process infrastructure** (event broadcaster) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `gattlink-domain` only (plus `tokio::sync` for locking and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod dispatcher;
pub mod event_broadcaster;
pub mod ports;
pub mod session;
