//! Core data types: domain/state enums, QoS, message envelopes, service
//! descriptors, and tunnel-stream class of service.
//!
//! Messages are already-decoded envelopes. Payloads are carried as
//! `serde_json::Value` so the core never touches wire bytes.

pub mod enums;
pub mod msg;
pub mod service;
pub mod state;
pub mod tunnel;

pub use enums::*;
pub use msg::*;
pub use service::*;
pub use state::*;
pub use tunnel::*;
