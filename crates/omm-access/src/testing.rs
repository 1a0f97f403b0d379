//! Recording doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use omm_core::config::AppConfig;
use omm_core::error::{OmmError, OmmResult};
use omm_core::types::{Msg, ServiceInfo, ServiceState, ServiceUpdate, StatusMsg};

use crate::callback::ItemCallbackClient;
use crate::client::{OmmConsumerClient, OmmConsumerEvent, SharedClient};
use crate::context::SessionContext;
use crate::item::ItemHandle;
use crate::stream_id::StreamIdAllocator;
use crate::transport::{ChannelEvent, ChannelId, OutboundMsg, Transport, TransportEvent};

pub(crate) const CHANNEL: ChannelId = ChannelId(1);

/// Transport that records every submit and can be told to fail.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    sent: Arc<Mutex<Vec<(ChannelId, OutboundMsg, Option<ItemHandle>)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub(crate) fn sent(&self) -> Vec<(ChannelId, OutboundMsg, Option<ItemHandle>)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Option<OutboundMsg> {
        self.sent.lock().unwrap().last().map(|(_, m, _)| m.clone())
    }

    pub(crate) fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Transport for RecordingTransport {
    fn submit(&mut self, channel: ChannelId, msg: OutboundMsg, user: Option<ItemHandle>) -> OmmResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OmmError::Transport("channel is not connected".into()));
        }
        self.sent.lock().unwrap().push((channel, msg, user));
        Ok(())
    }
}

/// Client that records every `on_all_msg` delivery.
#[derive(Default)]
pub(crate) struct RecordingClient {
    msgs: Mutex<Vec<(ItemHandle, Msg)>>,
}

impl RecordingClient {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn msgs(&self) -> Vec<(ItemHandle, Msg)> {
        self.msgs.lock().unwrap().clone()
    }

    pub(crate) fn statuses(&self) -> Vec<(ItemHandle, StatusMsg)> {
        self.msgs()
            .into_iter()
            .filter_map(|(h, m)| match m {
                Msg::Status(s) => Some((h, s)),
                _ => None,
            })
            .collect()
    }
}

impl OmmConsumerClient for RecordingClient {
    fn on_all_msg(&self, msg: &Msg, event: &OmmConsumerEvent) {
        self.msgs.lock().unwrap().push((event.handle(), msg.clone()));
    }
}

pub(crate) fn as_client(client: &Arc<RecordingClient>) -> SharedClient {
    client.clone()
}

/// Dispatcher over a recording transport, built from `config`.
pub(crate) fn dispatcher(config: serde_json::Value) -> (ItemCallbackClient, RecordingTransport) {
    let config: AppConfig = serde_json::from_value(config).unwrap();
    let transport = RecordingTransport::default();
    let ctx = SessionContext::new(&config, Box::new(transport.clone()));
    (ItemCallbackClient::new(ctx), transport)
}

/// Consumer dispatcher with [`CHANNEL`] up and `services` advertised on it.
pub(crate) fn consumer_with(services: &[(u16, &str)]) -> (ItemCallbackClient, RecordingTransport) {
    let (mut d, transport) = dispatcher(serde_json::json!({
        "session": { "instance_name": "Consumer_1", "item_count_hint": 64 }
    }));
    d.process_event(TransportEvent::Channel {
        channel: CHANNEL,
        event: ChannelEvent::Up,
    });
    let updates = services
        .iter()
        .map(|(id, name)| ServiceUpdate::add(*id, ServiceInfo::named(*name), ServiceState::default()))
        .collect();
    d.process_event(TransportEvent::Directory {
        channel: CHANNEL,
        state: None,
        services: updates,
    });
    transport.clear();
    (d, transport)
}

/// Shrink the main stream id range so wraparound is reachable. Call before
/// anything allocates.
pub(crate) fn with_stream_ceiling(d: &mut ItemCallbackClient, ceiling: i32) {
    d.ctx.allocator = StreamIdAllocator::with_ceiling(d.ctx.role, ceiling);
}

/// Fire every task due within the next two seconds and deliver the queue.
pub(crate) fn run_timers(d: &mut ItemCallbackClient) -> usize {
    d.process_timeouts(Instant::now() + Duration::from_secs(2));
    deliver(d)
}

pub(crate) fn deliver(d: &mut ItemCallbackClient) -> usize {
    let queued = d.take_notifications();
    let n = queued.len();
    for notification in queued {
        notification.deliver();
    }
    n
}
