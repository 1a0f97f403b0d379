//! In-process simulated provider.
//!
//! Stands in for a real transport so the runner can exercise the full item
//! lifecycle without a network:
//!
//! ```text
//! OmmSession ──submit(OutboundMsg)──► SimulatedProvider ──TransportEvent──► crossbeam ──► dispatch()
//!                                            │
//!                                            └─ open streams ◄── update ticker (tokio task)
//! ```
//!
//! Requests are answered immediately with a refresh; streaming items then
//! receive an update every tick. Closes are absorbed silently.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ahash::AHashMap;
use omm_access::{ChannelEvent, ChannelId, ItemHandle, OutboundMsg, Transport, TransportEvent, TransportEventSender};
use omm_core::config::ServiceConfig;
use omm_core::error::{OmmError, OmmResult};
use omm_core::types::{
    AckMsg, DataState, DomainType, Msg, MsgKey, OmmState, RefreshMsg, ReqMsg, ServiceUpdate, StatusCode, StreamState,
    UpdateMsg,
};
use serde_json::json;
use tracing::{debug, info, warn};

/// A stream the provider keeps updating.
#[derive(Debug, Clone)]
pub struct OpenStream {
    user: Option<ItemHandle>,
    domain_type: DomainType,
    name: String,
    ticks: u64,
}

/// Streams shared between the provider and the update ticker.
pub type OpenStreams = Arc<Mutex<AHashMap<i32, OpenStream>>>;

pub struct SimulatedProvider {
    channel: ChannelId,
    services: Vec<ServiceConfig>,
    events: TransportEventSender,
    open: OpenStreams,
    /// Tunnel stream id -> tunnel handle.
    tunnels: AHashMap<i32, ItemHandle>,
}

impl SimulatedProvider {
    pub fn new(channel: ChannelId, services: Vec<ServiceConfig>, events: TransportEventSender) -> Self {
        Self {
            channel,
            services,
            events,
            open: Arc::new(Mutex::new(AHashMap::new())),
            tunnels: AHashMap::new(),
        }
    }

    pub fn open_streams(&self) -> OpenStreams {
        self.open.clone()
    }

    /// Bring the simulated channel up.
    pub fn connect(channel: ChannelId, events: &TransportEventSender) -> anyhow::Result<()> {
        events.send(TransportEvent::Channel {
            channel,
            event: ChannelEvent::Up,
        })?;
        events.send(TransportEvent::Channel {
            channel,
            event: ChannelEvent::Ready,
        })?;
        Ok(())
    }

    fn emit(&self, event: TransportEvent) -> OmmResult<()> {
        self.events
            .send(event)
            .map_err(|_| OmmError::Transport("session event channel closed".into()))
    }

    fn emit_item(&self, user: Option<ItemHandle>, msg: Msg) -> OmmResult<()> {
        self.emit(TransportEvent::Item {
            channel: self.channel,
            user,
            msg,
        })
    }

    fn answer_request(&mut self, req: ReqMsg, user: Option<ItemHandle>) -> OmmResult<()> {
        match req.domain_type {
            DomainType::LOGIN => {
                info!("[sim] login from '{}'", req.key.name_or_empty());
                let refresh = RefreshMsg {
                    stream_id: req.stream_id,
                    domain_type: DomainType::LOGIN,
                    key: req.key.clone(),
                    state: OmmState::open_ok("Login accepted by host simulator"),
                    complete: true,
                    solicited: true,
                    ..RefreshMsg::default()
                };
                self.emit_item(user, Msg::Refresh(refresh))
            }
            DomainType::SOURCE => {
                let services = self.services.iter().map(|s| ServiceUpdate::add(s.id, s.info(), s.state())).collect();
                info!("[sim] advertising {} service(s)", self.services.len());
                self.emit(TransportEvent::Directory {
                    channel: self.channel,
                    state: Some(OmmState::open_ok("")),
                    services,
                })
            }
            _ if req.is_batch() => {
                for (i, name) in req.batch_item_names.iter().enumerate() {
                    let stream_id = req.stream_id + i as i32 + 1;
                    self.open_item(stream_id, user, &req, name)?;
                }
                Ok(())
            }
            _ => {
                let name = req.key.name_or_empty().to_string();
                self.open_item(req.stream_id, user, &req, &name)
            }
        }
    }

    fn open_item(&mut self, stream_id: i32, user: Option<ItemHandle>, req: &ReqMsg, name: &str) -> OmmResult<()> {
        let streaming = req.interest_after_refresh;
        let stream_state = if streaming {
            StreamState::Open
        } else {
            StreamState::NonStreaming
        };
        let refresh = RefreshMsg {
            stream_id,
            domain_type: req.domain_type,
            key: MsgKey::named(name),
            state: OmmState::new(stream_state, DataState::Ok, StatusCode::None, "All is well"),
            complete: true,
            solicited: true,
            clear_cache: true,
            qos: req.qos,
            payload: quote(name, 0),
            ..RefreshMsg::default()
        };
        if streaming {
            let stream = OpenStream {
                user,
                domain_type: req.domain_type,
                name: name.to_string(),
                ticks: 0,
            };
            lock(&self.open).insert(stream_id, stream);
        }
        debug!("[sim] refresh '{name}' on stream {stream_id}");
        self.emit_item(user, Msg::Refresh(refresh))
    }
}

impl Transport for SimulatedProvider {
    fn submit(&mut self, channel: ChannelId, msg: OutboundMsg, user: Option<ItemHandle>) -> OmmResult<()> {
        if channel != self.channel {
            return Err(OmmError::Transport(format!("unknown {channel}")));
        }
        match msg {
            OutboundMsg::Request(req) => self.answer_request(req, user),
            OutboundMsg::Close(close) => {
                lock(&self.open).remove(&close.stream_id);
                debug!("[sim] close on stream {}", close.stream_id);
                Ok(())
            }
            OutboundMsg::Post(post) => {
                if !post.solicit_ack {
                    return Ok(());
                }
                let ack = AckMsg {
                    stream_id: post.stream_id,
                    domain_type: post.domain_type,
                    ack_id: post.post_id.unwrap_or_default(),
                    ..AckMsg::default()
                };
                self.emit_item(user, Msg::Ack(ack))
            }
            OutboundMsg::Generic(generic) => self.emit_item(user, Msg::Generic(generic)),
            OutboundMsg::TunnelOpen { stream_id, request, .. } => {
                let Some(tunnel) = user else {
                    warn!("[sim] tunnel open on stream {stream_id} without a handle; ignored");
                    return Ok(());
                };
                self.tunnels.insert(stream_id, tunnel);
                info!("[sim] tunnel '{}' open on stream {stream_id}", request.name);
                self.emit(TransportEvent::TunnelStatus {
                    channel: self.channel,
                    tunnel,
                    state: OmmState::open_ok("Tunnel stream established"),
                })
            }
            OutboundMsg::TunnelClose { stream_id } => {
                self.tunnels.remove(&stream_id);
                Ok(())
            }
            OutboundMsg::SubStream { tunnel_stream_id, msg } => {
                let (Some(tunnel), OutboundMsg::Request(req)) = (self.tunnels.get(&tunnel_stream_id).copied(), *msg)
                else {
                    return Ok(());
                };
                let refresh = RefreshMsg {
                    stream_id: req.stream_id,
                    domain_type: req.domain_type,
                    key: req.key.clone(),
                    state: OmmState::open_ok("Sub stream open"),
                    complete: true,
                    solicited: true,
                    ..RefreshMsg::default()
                };
                self.emit(TransportEvent::SubStream {
                    channel: self.channel,
                    tunnel,
                    msg: Msg::Refresh(refresh),
                })
            }
            OutboundMsg::DictionaryDownload { service_name, .. } => {
                info!("[sim] dictionary download requested for '{service_name}'");
                Ok(())
            }
            OutboundMsg::CloseChannel { reason } => {
                warn!("[sim] channel close requested: {reason}");
                self.emit(TransportEvent::Channel {
                    channel: self.channel,
                    event: ChannelEvent::Down,
                })
            }
        }
    }
}

/// Send one update per open stream every `interval` until the session goes away.
pub async fn run_updates(channel: ChannelId, open: OpenStreams, events: TransportEventSender, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let updates: Vec<_> = lock(&open)
            .iter_mut()
            .map(|(stream_id, s)| {
                s.ticks += 1;
                let update = UpdateMsg {
                    stream_id: *stream_id,
                    domain_type: s.domain_type,
                    key: MsgKey::named(s.name.clone()),
                    payload: quote(&s.name, s.ticks),
                    ..UpdateMsg::default()
                };
                TransportEvent::Item {
                    channel,
                    user: s.user,
                    msg: Msg::Update(update),
                }
            })
            .collect();
        for event in updates {
            if events.send(event).is_err() {
                info!("[sim] session gone, update ticker exiting");
                return;
            }
        }
    }
}

fn lock(open: &OpenStreams) -> std::sync::MutexGuard<'_, AHashMap<i32, OpenStream>> {
    open.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Deterministic quote for `name` at `tick`.
fn quote(name: &str, tick: u64) -> serde_json::Value {
    let seed = name.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
    let mid = 100.0 + (seed % 5000) as f64 / 100.0;
    let drift = ((tick % 20) as f64 - 10.0) / 100.0;
    json!({ "BID": mid + drift - 0.01, "ASK": mid + drift + 0.01, "TRDPRC_1": mid + drift })
}

#[cfg(test)]
mod tests {
    use super::*;
    use omm_core::types::CloseMsg;

    fn provider() -> (SimulatedProvider, crossbeam_channel::Receiver<TransportEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let services = vec![serde_json::from_value(serde_json::json!({ "id": 1, "name": "DIRECT_FEED" })).unwrap()];
        (SimulatedProvider::new(ChannelId(1), services, tx), rx)
    }

    #[test]
    fn source_request_advertises_services() {
        let (mut sim, rx) = provider();
        let req = ReqMsg::new().domain_type(DomainType::SOURCE).stream_id(2);
        sim.submit(ChannelId(1), OutboundMsg::Request(req), None).unwrap();
        match rx.try_recv().unwrap() {
            TransportEvent::Directory { services, .. } => {
                assert_eq!(services.len(), 1);
                assert_eq!(services[0].info.as_ref().unwrap().name, "DIRECT_FEED");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn streaming_items_are_tracked_until_closed() {
        let (mut sim, rx) = provider();
        let open = sim.open_streams();
        sim.submit(ChannelId(1), OutboundMsg::Request(ReqMsg::new().name("IBM.N").stream_id(5)), None).unwrap();
        sim.submit(
            ChannelId(1),
            OutboundMsg::Request(ReqMsg::new().name("TRI.N").stream_id(6).interest_after_refresh(false)),
            None,
        )
        .unwrap();
        assert_eq!(rx.try_iter().count(), 2);
        assert_eq!(lock(&open).len(), 1);

        let close = CloseMsg { stream_id: 5, domain_type: DomainType::MARKET_PRICE };
        sim.submit(ChannelId(1), OutboundMsg::Close(close), None).unwrap();
        assert!(lock(&open).is_empty());
    }

    #[test]
    fn batch_children_follow_the_batch_stream() {
        let (mut sim, rx) = provider();
        let req = ReqMsg::new().batch(["A", "B"]).stream_id(10);
        sim.submit(ChannelId(1), OutboundMsg::Request(req), None).unwrap();
        let ids: Vec<i32> = rx
            .try_iter()
            .map(|e| match e {
                TransportEvent::Item { msg, .. } => msg.stream_id(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![11, 12]);
    }

    #[test]
    fn wrong_channel_is_rejected() {
        let (mut sim, _rx) = provider();
        let err = sim.submit(ChannelId(9), OutboundMsg::TunnelClose { stream_id: 1 }, None).unwrap_err();
        assert!(err.text().contains("channel-9"));
    }
}
