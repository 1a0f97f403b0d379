//! # omm-access
//!
//! Item stream lifecycle and callback dispatch for an OMM session.
//!
//! ## Architecture
//!
//! ```text
//! OmmSession (user lock, dispatch loop)
//!   └─ ItemCallbackClient (item map, stream index, inbound routing)
//!        ├─ item::*          Single / Batch / Tunnel / Sub / Login / Dictionary / Directory
//!        └─ SessionContext   allocator, directory registry, timers, transport, dictionary cache
//! ```
//!
//! - [`stream_id`]: consumer ascending / provider descending ids, wraparound
//! - [`directory`]: service registry with tombstoned deletes
//! - [`timeout`]: deferred one-shot tasks run on the dispatch thread
//! - [`transport`]: the boundary trait and inbound event types
//! - [`client`]: the application callback trait

pub mod callback;
pub mod client;
pub mod closed_status;
pub mod context;
pub mod dictionary_cache;
pub mod directory;
pub mod item;
pub mod session;
pub mod stream_id;
pub mod timeout;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use callback::ItemCallbackClient;
pub use client::{Closure, Notification, OmmConsumerClient, OmmConsumerEvent, SharedClient};
pub use item::{ItemHandle, ItemType};
pub use session::{DispatchResult, OmmSession};
pub use transport::{
    ChannelEvent, ChannelId, OutboundMsg, Transport, TransportEvent, TransportEventReceiver, TransportEventSender,
};
