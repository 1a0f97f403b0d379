//! Application callback interface.
//!
//! Applications implement [`OmmConsumerClient`] and pass it to
//! `register_client`. Every delivery invokes `on_all_msg` first, then the
//! class-specific method, on the dispatch thread.

use std::any::Any;
use std::sync::Arc;

use omm_core::types::{AckMsg, GenericMsg, Msg, RefreshMsg, StatusMsg, UpdateMsg};

use crate::item::ItemHandle;
use crate::transport::ChannelId;

/// Opaque application value attached to a registration.
pub type Closure = Option<Arc<dyn Any + Send + Sync>>;

/// Context of a callback invocation.
#[derive(Clone)]
pub struct OmmConsumerEvent {
    pub(crate) handle: ItemHandle,
    pub(crate) parent_handle: Option<ItemHandle>,
    pub(crate) closure: Closure,
    pub(crate) channel: Option<ChannelId>,
}

impl OmmConsumerEvent {
    /// Handle of the item this message belongs to.
    pub fn handle(&self) -> ItemHandle {
        self.handle
    }

    /// Batch or tunnel handle this item was opened under.
    pub fn parent_handle(&self) -> Option<ItemHandle> {
        self.parent_handle
    }

    pub fn closure(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.closure.as_ref()
    }

    /// Closure downcast to `T`.
    pub fn closure_as<T: Any>(&self) -> Option<&T> {
        self.closure.as_ref().and_then(|c| c.downcast_ref::<T>())
    }

    /// Channel the message arrived on. `None` for internally generated messages.
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }
}

impl std::fmt::Debug for OmmConsumerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmmConsumerEvent")
            .field("handle", &self.handle)
            .field("parent_handle", &self.parent_handle)
            .field("has_closure", &self.closure.is_some())
            .field("channel", &self.channel)
            .finish()
    }
}

/// Callbacks an application implements. All methods default to no-ops.
pub trait OmmConsumerClient: Send + Sync {
    fn on_refresh_msg(&self, _msg: &RefreshMsg, _event: &OmmConsumerEvent) {}
    fn on_update_msg(&self, _msg: &UpdateMsg, _event: &OmmConsumerEvent) {}
    fn on_status_msg(&self, _msg: &StatusMsg, _event: &OmmConsumerEvent) {}
    fn on_generic_msg(&self, _msg: &GenericMsg, _event: &OmmConsumerEvent) {}
    fn on_ack_msg(&self, _msg: &AckMsg, _event: &OmmConsumerEvent) {}
    /// Invoked before the class-specific callback for every message.
    fn on_all_msg(&self, _msg: &Msg, _event: &OmmConsumerEvent) {}
}

/// Client shared between registrations.
pub type SharedClient = Arc<dyn OmmConsumerClient>;

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A callback invocation queued by the dispatcher.
///
/// The dispatcher only queues; the session delivers after releasing its lock
/// so callbacks may call back into the session.
pub struct Notification {
    pub(crate) client: SharedClient,
    pub(crate) msg: Msg,
    pub(crate) event: OmmConsumerEvent,
}

impl Notification {
    pub fn msg(&self) -> &Msg {
        &self.msg
    }

    pub fn event(&self) -> &OmmConsumerEvent {
        &self.event
    }

    /// Invoke `on_all_msg`, then the class-specific callback.
    pub fn deliver(&self) {
        self.client.on_all_msg(&self.msg, &self.event);
        match &self.msg {
            Msg::Refresh(m) => self.client.on_refresh_msg(m, &self.event),
            Msg::Update(m) => self.client.on_update_msg(m, &self.event),
            Msg::Status(m) => self.client.on_status_msg(m, &self.event),
            Msg::Generic(m) => self.client.on_generic_msg(m, &self.event),
            Msg::Ack(m) => self.client.on_ack_msg(m, &self.event),
            Msg::Request(_) | Msg::Post(_) => {}
        }
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("class", &self.msg.class())
            .field("event", &self.event)
            .finish()
    }
}
