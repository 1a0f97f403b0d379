//! # omm-core
//!
//! Core crate for the OMM access layer, providing:
//!
//! - **Types** (`types`): domain/state enums, QoS, message envelopes, service
//!   and tunnel-stream descriptors
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): `OmmError` via thiserror
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
