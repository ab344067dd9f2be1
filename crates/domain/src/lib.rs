//! # gattlink-domain
//!
//! Pure domain model for driving an interactive GATT command interpreter.
//!
//! ## Responsibilities
//! - Value types: Bluetooth device addresses, GATT UUIDs, security levels
//! - The **protocol state machine** gating which operation may be issued when
//! - The **command encoder** turning operations into interpreter command lines
//! - The **line classifier** turning interpreter output into typed lines
//! - The **result tag table** mapping result tags to event kinds
//!
//! ## Dependency rule
//! This crate has **no internal dependencies** and performs no IO.
//! Process handling and listener plumbing live in the `app` crate (ports)
//! and in adapters.

pub mod error;

pub mod address;
pub mod gatt_uuid;
pub mod security;

pub mod command;
pub mod event;
pub mod line;
pub mod state;
