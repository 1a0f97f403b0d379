//! Boundary between the access layer and the transport.
//!
//! The transport owns sockets, encoding, and the reactor. It hands the access
//! layer decoded [`TransportEvent`]s over a crossbeam channel and accepts
//! typed [`OutboundMsg`]s through [`Transport::submit`]. The `user` handle
//! passed to `submit` is echoed back on every event for that stream, which is
//! the dispatcher's fast path for routing.

use omm_core::error::OmmResult;
use omm_core::types::{
    CloseMsg, GenericMsg, Msg, OmmState, PostMsg, ReqMsg, ServiceUpdate, TunnelStreamRequest,
};

use crate::item::ItemHandle;

/// Identifies one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A message the access layer asks the transport to send.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMsg {
    Request(ReqMsg),
    Close(CloseMsg),
    Post(PostMsg),
    Generic(GenericMsg),
    /// Open a tunnel stream on `stream_id` against `service_id`.
    TunnelOpen {
        stream_id: i32,
        service_id: u16,
        request: TunnelStreamRequest,
    },
    TunnelClose {
        stream_id: i32,
    },
    /// Message carried inside a tunnel stream.
    SubStream {
        tunnel_stream_id: i32,
        msg: Box<OutboundMsg>,
    },
    /// Ask the dictionary subsystem to load dictionaries for a service.
    DictionaryDownload {
        service_id: u16,
        service_name: String,
    },
    /// Tear the channel down.
    CloseChannel {
        reason: String,
    },
}

/// Transport used by a session.
///
/// `submit` must not block on network I/O; it queues the message on the
/// channel's send buffer and returns.
pub trait Transport: Send {
    fn submit(&mut self, channel: ChannelId, msg: OutboundMsg, user: Option<ItemHandle>) -> OmmResult<()>;
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Channel lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEvent {
    Up,
    Ready,
    DownReconnecting,
    Down,
}

/// A decoded event delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Item stream message. `user` echoes the handle given to `submit`.
    Item {
        channel: ChannelId,
        user: Option<ItemHandle>,
        msg: Msg,
    },
    /// Message on a tunnel sub-stream; `msg.stream_id()` is the sub-stream id.
    SubStream {
        channel: ChannelId,
        tunnel: ItemHandle,
        msg: Msg,
    },
    /// Tunnel stream state change.
    TunnelStatus {
        channel: ChannelId,
        tunnel: ItemHandle,
        state: OmmState,
    },
    /// Source directory stream refresh/update/status.
    Directory {
        channel: ChannelId,
        state: Option<OmmState>,
        services: Vec<ServiceUpdate>,
    },
    Channel {
        channel: ChannelId,
        event: ChannelEvent,
    },
}

/// Sender half of the transport event channel.
pub type TransportEventSender = crossbeam_channel::Sender<TransportEvent>;

/// Receiver half of the transport event channel, drained by the dispatch thread.
pub type TransportEventReceiver = crossbeam_channel::Receiver<TransportEvent>;
