//! Item registry and inbound message dispatcher.
//!
//! [`ItemCallbackClient`] owns every live [`Item`] in one insertion-ordered
//! map and keeps a secondary `stream_id -> handle` index for items that own
//! a transport stream. Both change only through [`insert_item`],
//! [`index_stream`] and [`destroy_item`].
//!
//! Inbound routing:
//!
//! ```text
//! TransportEvent::Item ─► user handle? ──yes──► item ──batch?──► child by stream id
//!                              │no
//!                              ├─ login stream ─► login fan-out
//!                              ├─ provider role ─► stream index
//!                              └─ otherwise logged and dropped
//! ```
//!
//! The dispatcher never calls application code. Callbacks are queued as
//! [`Notification`]s and delivered by the session after it drops its lock.
//!
//! [`insert_item`]: ItemCallbackClient::insert_item
//! [`index_stream`]: ItemCallbackClient::index_stream
//! [`destroy_item`]: ItemCallbackClient::destroy_item

use std::time::{Duration, Instant};

use ahash::AHashMap;
use indexmap::IndexMap;
use omm_core::error::{OmmError, OmmResult, UsageErrorCode};
use omm_core::types::{
    DomainType, GenericMsg, Msg, MsgClass, OmmState, PostMsg, ReqMsg, Role, ServiceUpdate, StreamState,
    TunnelStreamRequest,
};
use tracing::{debug, error, info, warn};

use crate::client::{Closure, Notification, OmmConsumerEvent, SharedClient};
use crate::closed_status::ClosedStatusInfo;
use crate::context::SessionContext;
use crate::item::login::LoginState;
use crate::item::{Item, ItemHandle, ItemKind, ItemType};
use crate::stream_id::LOGIN_STREAM_ID;
use crate::timeout::{TimeoutHandle, TimeoutTask};
use crate::transport::{ChannelEvent, ChannelId, OutboundMsg, TransportEvent};

/// Whether delivering `msg` ends its stream.
///
/// A non-streaming refresh ends the stream only on its final part; any other
/// refresh or status ends it when the stream state is no longer Open.
pub(crate) fn closes_stream(msg: &Msg) -> bool {
    match msg {
        Msg::Refresh(r) if r.state.stream_state == StreamState::NonStreaming => r.complete,
        Msg::Refresh(r) => r.state.stream_state != StreamState::Open,
        Msg::Status(s) => s.state.as_ref().is_some_and(|st| st.stream_state != StreamState::Open),
        _ => false,
    }
}

pub struct ItemCallbackClient {
    pub(crate) ctx: SessionContext,
    pub(crate) items: IndexMap<ItemHandle, Item>,
    pub(crate) stream_index: AHashMap<i32, ItemHandle>,
    pub(crate) login: LoginState,
    next_handle: u64,
    notifications: Vec<Notification>,
}

impl ItemCallbackClient {
    pub fn new(ctx: SessionContext) -> Self {
        let capacity = ctx.session.effective_item_count_hint();
        Self {
            ctx,
            items: IndexMap::with_capacity(capacity),
            stream_index: AHashMap::with_capacity(capacity),
            login: LoginState::default(),
            next_handle: 0,
            notifications: Vec::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    // -----------------------------------------------------------------------
    // Application API
    // -----------------------------------------------------------------------

    /// Register interest in an item stream.
    ///
    /// No callback for the returned handle is queued before this returns. An
    /// unresolvable service is reported later as a closed status, never as
    /// an error here.
    pub fn register_client(
        &mut self,
        req: ReqMsg,
        client: SharedClient,
        closure: Closure,
        parent: Option<ItemHandle>,
    ) -> OmmResult<ItemHandle> {
        if let Some(parent) = parent {
            return match self.item_type_of_live(parent) {
                Some(ItemType::TunnelItem) => self.register_sub_item(req, client, closure, parent),
                Some(other) => Err(self.ctx.usage(
                    &format!("Invalid attempt to use {other} as parentHandle on registerClient(). "),
                    UsageErrorCode::InvalidArgument,
                )),
                None => Err(self.ctx.usage(
                    "Attempt to use invalid parentHandle on registerClient(). ",
                    UsageErrorCode::InvalidArgument,
                )),
            };
        }

        match req.domain_type {
            DomainType::LOGIN => self.register_login(client, closure),
            DomainType::DICTIONARY => self.register_dictionary(req, client, closure),
            DomainType::SOURCE => self.register_directory(req, client, closure),
            _ if req.is_batch() => self.register_batch(req, client, closure),
            _ => self.register_single(req, client, closure, None),
        }
    }

    /// Open a tunnel stream.
    pub fn register_tunnel(
        &mut self,
        req: TunnelStreamRequest,
        client: SharedClient,
        closure: Closure,
    ) -> OmmResult<ItemHandle> {
        self.open_tunnel(req, client, closure)
    }

    /// Change an open registration.
    pub fn reissue(&mut self, req: ReqMsg, handle: ItemHandle) -> OmmResult<()> {
        if !self.items.contains_key(&handle) {
            return Err(self.invalid_handle(handle, "Attempt to use invalid Handle on reissue(). "));
        }
        self.item_modify(handle, req)
    }

    /// Close a registration. Unknown handles are ignored.
    pub fn unregister(&mut self, handle: ItemHandle) -> OmmResult<()> {
        if !self.items.contains_key(&handle) {
            debug!("[dispatch] unregister of unknown handle {handle} ignored");
            return Ok(());
        }
        self.item_close(handle)
    }

    pub fn submit_post(&mut self, post: PostMsg, handle: ItemHandle) -> OmmResult<()> {
        if !self.items.contains_key(&handle) {
            return Err(self.invalid_handle(handle, "Attempt to use invalid Handle on submit( const PostMsg& ). "));
        }
        self.item_post(handle, post)
    }

    pub fn submit_generic(&mut self, generic: GenericMsg, handle: ItemHandle) -> OmmResult<()> {
        if !self.items.contains_key(&handle) {
            return Err(self.invalid_handle(handle, "Attempt to use invalid Handle on submit( const GenericMsg& ). "));
        }
        self.item_generic(handle, generic)
    }

    fn invalid_handle(&self, handle: ItemHandle, text: &str) -> OmmError {
        OmmError::invalid_handle(handle.0, format!("{text}Instance name='{}'.", self.ctx.instance_name))
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Route one transport event.
    pub fn process_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Item { channel, user, msg } => self.process_item_msg(channel, user, msg),
            TransportEvent::SubStream { channel, tunnel, msg } => self.process_sub_stream_msg(channel, tunnel, msg),
            TransportEvent::TunnelStatus { channel, tunnel, state } => {
                self.process_tunnel_status(channel, tunnel, state)
            }
            TransportEvent::Directory {
                channel,
                state,
                services,
            } => self.process_directory(channel, state, services),
            TransportEvent::Channel { channel, event } => self.process_channel_event(channel, event),
        }
    }

    /// Fire every deferred task due at `now`.
    pub fn process_timeouts(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some((timeout, task)) = self.ctx.timeouts.pop_due(now) {
            self.fire(timeout, task);
            fired += 1;
        }
        fired
    }

    /// Deadline of the earliest pending task.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.ctx.timeouts.next_deadline()
    }

    /// Callbacks queued since the last call, in order.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn process_item_msg(&mut self, channel: ChannelId, user: Option<ItemHandle>, msg: Msg) {
        let class = msg.class();
        if matches!(class, MsgClass::Request | MsgClass::Post) {
            warn!("[dispatch] Received unsupported {class} from {channel}; dropped");
            return;
        }

        let is_login_stream = msg.stream_id() == LOGIN_STREAM_ID
            && (msg.domain_type() == DomainType::LOGIN || matches!(class, MsgClass::Ack | MsgClass::Generic));

        let handle = match user {
            Some(handle) => handle,
            None if is_login_stream => return self.process_login_msg(channel, msg),
            None if self.ctx.role == Role::NiProvider => match self.stream_index.get(&msg.stream_id()) {
                Some(handle) => *handle,
                None => {
                    warn!("[dispatch] Received {class} on unknown stream {}; dropped", msg.stream_id());
                    return;
                }
            },
            None => {
                error!(
                    "[dispatch] Received an item event without user specified pointer or stream info ({class} on stream {})",
                    msg.stream_id()
                );
                return;
            }
        };

        let Some(item) = self.items.get(&handle) else {
            warn!("[dispatch] Received {class} for closed handle {handle} on stream {}; dropped", msg.stream_id());
            return;
        };

        let target = match &item.kind {
            ItemKind::Login(_) => None,
            ItemKind::Batch(batch) => match batch.single_item(item.stream_id, msg.stream_id()) {
                Some(child) if self.items.contains_key(&child) => Some(child),
                _ => {
                    warn!("[dispatch] Received {class} for closed batch member on stream {}; dropped", msg.stream_id());
                    return;
                }
            },
            _ => Some(handle),
        };

        let Some(target) = target else {
            return self.process_login_msg(channel, msg);
        };
        self.deliver(target, msg, Some(channel));
    }

    /// Queue `msg` for `handle` and apply the post-dispatch lifecycle rule.
    pub(crate) fn deliver(&mut self, handle: ItemHandle, mut msg: Msg, channel: Option<ChannelId>) {
        msg.set_service_name(self.service_name_of(handle));
        let closes = closes_stream(&msg);
        self.notify(handle, msg, channel);
        if closes {
            debug!("[dispatch] stream of handle {handle} closed by provider");
            self.item_remove(handle);
        }
    }

    fn fire(&mut self, timeout: TimeoutHandle, task: TimeoutTask) {
        let handle = match task {
            TimeoutTask::ItemStatus(h)
            | TimeoutTask::LoginRefresh(h)
            | TimeoutTask::DictionaryPart(h)
            | TimeoutTask::DirectoryRefresh(h) => h,
        };
        match self.items.get_mut(&handle) {
            Some(item) if item.timeout == Some(timeout) => item.timeout = None,
            Some(_) => {}
            None => return,
        }
        match task {
            TimeoutTask::ItemStatus(h) => self.send_item_status(h),
            TimeoutTask::LoginRefresh(h) => self.send_login_refresh(h),
            TimeoutTask::DictionaryPart(h) => self.send_dictionary_part(h),
            TimeoutTask::DirectoryRefresh(h) => self.send_directory_refresh(h),
        }
    }

    pub(crate) fn send_item_status(&mut self, handle: ItemHandle) {
        let Some(info) = self.items.get(&handle).and_then(|i| i.closed_status.clone()) else {
            return;
        };
        self.notify(handle, Msg::Status(info.to_status_msg()), None);
        if info.closes_item() {
            self.item_remove(handle);
        }
    }

    fn process_directory(&mut self, channel: ChannelId, state: Option<OmmState>, services: Vec<ServiceUpdate>) {
        if let Some(state) = &state {
            if !state.is_open() {
                error!("[directory] directory stream on {channel} is no longer open: {state}; closing channel");
                let reason = format!("Directory stream closed: {}", state.status_text);
                if let Err(e) = self.ctx.submit(channel, OutboundMsg::CloseChannel { reason }, None, "close channel") {
                    error!("[directory] {e}");
                }
                return;
            }
            let suspect = state.is_open_suspect();
            if suspect {
                warn!("[directory] directory stream on {channel} is Open / Suspect: {state}");
            }
            self.ctx.channels.set_directory_suspect(channel, suspect);
        }

        let mut changes = Vec::with_capacity(services.len());
        for update in services {
            let Some(change) = self.ctx.directories.apply(channel, update) else {
                continue;
            };
            if change.download_dictionary {
                self.request_dictionary_download(channel, change.service_id);
            }
            changes.push(change.directory);
        }
        self.publish_directory_changes(channel, &changes);
    }

    fn request_dictionary_download(&mut self, channel: ChannelId, service_id: u16) {
        let Some((_, directory)) = self.ctx.directories.directory_by_id(service_id) else {
            return;
        };
        let msg = OutboundMsg::DictionaryDownload {
            service_id,
            service_name: directory.name().to_string(),
        };
        info!("[directory] requesting dictionary download for service '{}' on {channel}", directory.name());
        if let Err(e) = self.ctx.submit(channel, msg, None, "request dictionary download") {
            error!("[directory] {e}");
        }
    }

    fn process_channel_event(&mut self, channel: ChannelId, event: ChannelEvent) {
        debug!("[dispatch] {channel} {event:?}");
        match event {
            ChannelEvent::Up => self.channel_up(channel),
            ChannelEvent::Ready => self.channel_ready(channel),
            ChannelEvent::DownReconnecting => {
                self.tombstone_channel(channel);
                self.channel_down_reconnecting(channel);
            }
            ChannelEvent::Down => {
                self.tombstone_channel(channel);
                self.channel_closed(channel);
            }
        }
    }

    fn tombstone_channel(&mut self, channel: ChannelId) {
        let lost = self.ctx.directories.channel_down(channel);
        if !lost.is_empty() {
            info!("[directory] {} service(s) on {channel} marked deleted", lost.len());
            self.publish_directory_changes(channel, &lost);
        }
    }

    // -----------------------------------------------------------------------
    // Item bookkeeping
    // -----------------------------------------------------------------------

    pub(crate) fn next_handle(&mut self) -> ItemHandle {
        self.next_handle += 1;
        ItemHandle(self.next_handle)
    }

    pub(crate) fn insert_item(&mut self, item: Item) {
        debug!("[dispatch] added {} handle {}", item.item_type(), item.handle);
        self.items.insert(item.handle, item);
    }

    /// Next free main stream id, or the first of a block of `children + 1`.
    pub(crate) fn allocate_stream_id(&self, children: usize) -> OmmResult<i32> {
        let index = &self.stream_index;
        self.ctx.allocator.next_stream_id(children, |id| index.contains_key(&id))
    }

    pub(crate) fn index_stream(&mut self, stream_id: i32, handle: ItemHandle) {
        if let Some(item) = self.items.get_mut(&handle) {
            item.stream_id = stream_id;
        }
        self.stream_index.insert(stream_id, handle);
    }

    /// Drop `handle` from the map and the stream index and cancel its
    /// pending task. Variant bookkeeping is the caller's job.
    pub(crate) fn destroy_item(&mut self, handle: ItemHandle) -> Option<Item> {
        let item = self.items.shift_remove(&handle)?;
        if item.stream_id != 0 && self.stream_index.get(&item.stream_id) == Some(&handle) {
            self.stream_index.remove(&item.stream_id);
            if self.ctx.role == Role::NiProvider {
                self.ctx.allocator.return_stream_id(item.stream_id);
            }
        }
        if let Some(timeout) = item.timeout {
            self.ctx.timeouts.cancel(timeout);
        }
        debug!("[dispatch] removed {} handle {handle} (stream {})", item.item_type(), item.stream_id);
        Some(item)
    }

    /// Replace the item's pending task with `task` after `delay`.
    pub(crate) fn schedule_task(&mut self, handle: ItemHandle, delay: Duration, task: TimeoutTask) {
        let Some(item) = self.items.get_mut(&handle) else {
            return;
        };
        if let Some(old) = item.timeout.take() {
            self.ctx.timeouts.cancel(old);
        }
        item.timeout = Some(self.ctx.timeouts.schedule(delay, task));
    }

    /// Attach `info` and deliver it after the closed status delay. Only the
    /// first call per item has an effect.
    pub(crate) fn schedule_closed_status(&mut self, handle: ItemHandle, info: ClosedStatusInfo) {
        let Some(item) = self.items.get_mut(&handle) else {
            return;
        };
        if item.closed_status.is_some() {
            return;
        }
        debug!("[dispatch] scheduling status for handle {handle}: {}", info.state());
        item.closed_status = Some(info);
        let delay = self.ctx.session.closed_status_delay();
        self.schedule_task(handle, delay, TimeoutTask::ItemStatus(handle));
    }

    /// Queue a callback for `handle`.
    pub(crate) fn notify(&mut self, handle: ItemHandle, msg: Msg, channel: Option<ChannelId>) {
        let Some(item) = self.items.get(&handle) else {
            return;
        };
        let event = OmmConsumerEvent {
            handle,
            parent_handle: item.parent,
            closure: item.closure.clone(),
            channel,
        };
        self.notifications.push(Notification {
            client: item.client.clone(),
            msg,
            event,
        });
    }

    /// Service name of the directory the item resolved against.
    pub(crate) fn service_name_of(&self, handle: ItemHandle) -> Option<String> {
        let item = self.items.get(&handle)?;
        let directory = item
            .directory
            .or_else(|| item.parent.and_then(|p| self.items.get(&p)).and_then(|p| p.directory))?;
        self.ctx.directories.get(directory).map(|d| d.name().to_string())
    }

    fn item_type_of_live(&self, handle: ItemHandle) -> Option<ItemType> {
        self.items.get(&handle).map(Item::item_type)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Number of live items.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn contains(&self, handle: ItemHandle) -> bool {
        self.items.contains_key(&handle)
    }

    pub fn item(&self, handle: ItemHandle) -> Option<&Item> {
        self.items.get(&handle)
    }

    /// Live handles in registration order.
    pub fn handles(&self) -> impl Iterator<Item = ItemHandle> + '_ {
        self.items.keys().copied()
    }

    /// Handle currently owning main `stream_id`.
    pub fn handle_for_stream(&self, stream_id: i32) -> Option<ItemHandle> {
        self.stream_index.get(&stream_id).copied()
    }

    pub fn indexed_stream_count(&self) -> usize {
        self.stream_index.len()
    }

    pub fn pending_timeouts(&self) -> usize {
        self.ctx.timeouts.len()
    }
}

impl std::fmt::Debug for ItemCallbackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemCallbackClient")
            .field("ctx", &self.ctx)
            .field("items", &self.items.len())
            .field("streams", &self.stream_index.len())
            .field("queued", &self.notifications.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use omm_core::types::{
        DataState, DictionaryKind, GenericMsg, PostMsg, RefreshMsg, ServiceInfo, ServiceState, StatusCode, StatusMsg,
        TunnelStreamRequest,
    };
    use serde_json::json;

    use super::*;
    use crate::testing::{
        CHANNEL, RecordingClient, as_client, consumer_with, deliver, dispatcher, run_timers, with_stream_ceiling,
    };

    fn refresh(stream_id: i32, state: OmmState) -> Msg {
        Msg::Refresh(RefreshMsg {
            stream_id,
            state,
            complete: true,
            ..RefreshMsg::default()
        })
    }

    fn status(stream_id: i32, domain_type: DomainType, state: OmmState) -> Msg {
        Msg::Status(StatusMsg {
            stream_id,
            domain_type,
            state: Some(state),
            ..StatusMsg::default()
        })
    }

    fn item_event(user: Option<ItemHandle>, msg: Msg) -> TransportEvent {
        TransportEvent::Item {
            channel: CHANNEL,
            user,
            msg,
        }
    }

    fn closed(text: &str) -> OmmState {
        OmmState::new(StreamState::Closed, DataState::Suspect, StatusCode::None, text)
    }

    fn assert_index_consistent(d: &ItemCallbackClient) {
        for (stream_id, handle) in &d.stream_index {
            assert_eq!(d.item(*handle).map(Item::stream_id), Some(*stream_id));
        }
        let open = d
            .items
            .values()
            .filter(|i| matches!(i.kind, ItemKind::Single | ItemKind::Batch(_) | ItemKind::Tunnel(_)))
            .filter(|i| i.stream_id != 0)
            .count();
        assert_eq!(open, d.indexed_stream_count());
    }

    #[test]
    fn unknown_service_status_is_deferred() {
        let (mut d, transport) = consumer_with(&[(5, "DIRECT_FEED")]);
        let client = RecordingClient::shared();
        let h = d
            .register_client(ReqMsg::new().name("IBM.N").service_name("NOPE"), as_client(&client), None, None)
            .unwrap();

        assert_eq!(deliver(&mut d), 0);
        assert!(d.contains(h));
        assert!(transport.sent().is_empty());

        assert_eq!(run_timers(&mut d), 1);
        let statuses = client.statuses();
        assert_eq!(statuses.len(), 1);
        let (handle, msg) = &statuses[0];
        assert_eq!(*handle, h);
        let state = msg.state.as_ref().unwrap();
        assert_eq!(state.stream_state, StreamState::Closed);
        assert_eq!(state.data_state, DataState::Suspect);
        assert_eq!(state.status_code, StatusCode::SourceUnknown);
        assert_eq!(state.status_text, "Service name of 'NOPE' is not found.");
        assert_eq!(msg.key.name.as_deref(), Some("IBM.N"));
        assert!(!d.contains(h));
        assert_eq!(run_timers(&mut d), 0);
    }

    #[test]
    fn unknown_service_id_text() {
        let (mut d, _t) = consumer_with(&[]);
        let client = RecordingClient::shared();
        d.register_client(ReqMsg::new().name("IBM.N").service_id(77), as_client(&client), None, None)
            .unwrap();
        run_timers(&mut d);
        let statuses = client.statuses();
        assert_eq!(statuses[0].1.state.as_ref().unwrap().status_text, "Service id of '77' is not found.");
    }

    #[test]
    fn open_and_close_keep_stream_index_in_sync() {
        let (mut d, transport) = consumer_with(&[(5, "DIRECT_FEED")]);
        let client = RecordingClient::shared();
        let handles: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|n| {
                d.register_client(ReqMsg::new().name(*n).service_id(5), as_client(&client), None, None)
                    .unwrap()
            })
            .collect();
        let ids: Vec<_> = handles.iter().map(|h| d.item(*h).unwrap().stream_id()).collect();
        assert_eq!(ids, vec![5, 6, 7]);
        assert_index_consistent(&d);

        match transport.last() {
            Some(OutboundMsg::Request(req)) => {
                assert_eq!(req.stream_id, 7);
                assert_eq!(req.service_name.as_deref(), Some("DIRECT_FEED"));
                assert!(req.key.service_id.is_none());
                assert!(req.qos.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }

        d.unregister(handles[1]).unwrap();
        assert!(matches!(transport.last(), Some(OutboundMsg::Close(c)) if c.stream_id == 6));
        assert_eq!(d.handle_for_stream(6), None);
        assert_index_consistent(&d);

        d.process_event(item_event(Some(handles[0]), refresh(5, OmmState::open_ok(""))));
        d.process_event(item_event(Some(handles[0]), status(5, DomainType::MARKET_PRICE, closed("gone"))));
        assert_eq!(deliver(&mut d), 2);
        let msgs = client.msgs();
        match &msgs[0].1 {
            Msg::Refresh(r) => assert_eq!(r.service_name.as_deref(), Some("DIRECT_FEED")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!d.contains(handles[0]));
        assert_index_consistent(&d);
        assert_eq!(d.indexed_stream_count(), 1);

        // Late message for a removed handle is dropped.
        d.process_event(item_event(Some(handles[0]), refresh(5, OmmState::open_ok(""))));
        assert_eq!(deliver(&mut d), 0);
    }

    #[test]
    fn non_streaming_refresh_closes_on_final_part() {
        let (mut d, _t) = consumer_with(&[(5, "DIRECT_FEED")]);
        let client = RecordingClient::shared();
        let h = d
            .register_client(
                ReqMsg::new().name("IBM.N").service_id(5).interest_after_refresh(false),
                as_client(&client),
                None,
                None,
            )
            .unwrap();
        let snapshot = OmmState::new(StreamState::NonStreaming, DataState::Ok, StatusCode::None, "");
        let mut part = RefreshMsg {
            stream_id: 5,
            state: snapshot,
            complete: false,
            ..RefreshMsg::default()
        };
        d.process_event(item_event(Some(h), Msg::Refresh(part.clone())));
        assert!(d.contains(h));
        part.complete = true;
        d.process_event(item_event(Some(h), Msg::Refresh(part)));
        assert!(!d.contains(h));
        assert_eq!(deliver(&mut d), 2);
    }

    #[test]
    fn api_errors_on_unknown_handles() {
        let (mut d, _t) = consumer_with(&[(5, "DIRECT_FEED")]);
        let e = d.reissue(ReqMsg::new(), ItemHandle(99)).unwrap_err();
        assert_eq!(
            e.text(),
            "Attempt to use invalid Handle on reissue(). Instance name='Consumer_1'."
        );
        let e = d.submit_post(PostMsg::default(), ItemHandle(99)).unwrap_err();
        assert!(e.text().starts_with("Attempt to use invalid Handle on submit( const PostMsg& ). "));
        let e = d.submit_generic(GenericMsg::new("x"), ItemHandle(99)).unwrap_err();
        assert!(e.text().starts_with("Attempt to use invalid Handle on submit( const GenericMsg& ). "));
        assert!(d.unregister(ItemHandle(99)).is_ok());
    }

    #[test]
    fn transport_failure_is_a_usage_error() {
        let (mut d, transport) = consumer_with(&[(5, "DIRECT_FEED")]);
        transport.set_failing(true);
        let client = RecordingClient::shared();
        let e = d
            .register_client(ReqMsg::new().name("IBM.N").service_id(5), as_client(&client), None, None)
            .unwrap_err();
        assert_eq!(e.usage_code(), Some(UsageErrorCode::FailureOperation));
        assert_eq!(
            e.text(),
            "Failed to open or modify item request. Reason: channel is not connected"
        );
        assert_eq!(d.item_count(), 0);
        assert_index_consistent(&d);
    }

    #[test]
    fn batch_children_close_in_any_order() {
        let (mut d, transport) = consumer_with(&[(5, "DIRECT_FEED")]);
        let client = RecordingClient::shared();
        let h = d
            .register_client(
                ReqMsg::new().service_name("DIRECT_FEED").batch(["A", "B", "C"]),
                as_client(&client),
                None,
                None,
            )
            .unwrap();

        let batch = d.batch(h).unwrap();
        assert_eq!(batch.single_item_list().len(), 4);
        assert_eq!(batch.item_count(), 3);
        let children = batch.single_item_list()[1..].to_vec();
        assert_eq!(d.item(h).unwrap().stream_id(), 5);
        let child_ids: Vec<_> = children.iter().map(|c| d.item(*c).unwrap().stream_id()).collect();
        assert_eq!(child_ids, vec![6, 7, 8]);
        assert_index_consistent(&d);
        match transport.last() {
            Some(OutboundMsg::Request(req)) => {
                assert_eq!(req.stream_id, 5);
                assert_eq!(req.batch_item_names, vec!["A", "B", "C"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let e = d.unregister(h).unwrap_err();
        assert_eq!(e.text(), "Invalid attempt to close batch stream. Instance name='Consumer_1'.");
        let e = d.submit_generic(GenericMsg::new("x"), h).unwrap_err();
        assert!(e.text().starts_with("Invalid attempt to submit GenericMsg on batch stream. "));

        d.process_event(item_event(Some(h), refresh(7, OmmState::open_ok(""))));
        deliver(&mut d);
        assert_eq!(client.msgs()[0].0, children[1]);

        d.unregister(children[0]).unwrap();
        d.unregister(children[1]).unwrap();
        assert_eq!(d.batch(h).unwrap().item_count(), 1);
        assert!(d.contains(h));
        d.unregister(children[2]).unwrap();
        assert!(!d.contains(h));
        assert_eq!(d.item_count(), 0);
        assert_index_consistent(&d);
    }

    #[test]
    fn batch_on_unknown_service_closes_every_child() {
        let (mut d, _t) = consumer_with(&[]);
        let client = RecordingClient::shared();
        let h = d
            .register_client(ReqMsg::new().service_name("NOPE").batch(["A", "B"]), as_client(&client), None, None)
            .unwrap();
        assert_eq!(deliver(&mut d), 0);
        assert_eq!(run_timers(&mut d), 2);
        let names: Vec<_> = client.statuses().iter().map(|(_, s)| s.key.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(!d.contains(h));
    }

    #[test]
    fn provider_batch_is_split() {
        let (mut d, transport) = dispatcher(json!({ "session": { "role": "ni_provider" } }));
        d.process_event(TransportEvent::Channel {
            channel: CHANNEL,
            event: ChannelEvent::Up,
        });
        assert_eq!(transport.sent().len(), 1);
        d.process_event(TransportEvent::Directory {
            channel: CHANNEL,
            state: None,
            services: vec![ServiceUpdate::add(5, ServiceInfo::named("NI_PUB"), ServiceState::default())],
        });

        let client = RecordingClient::shared();
        let h = d
            .register_client(ReqMsg::new().service_name("NI_PUB").batch(["A", "B"]), as_client(&client), None, None)
            .unwrap();
        let batch = d.batch(h).unwrap();
        assert!(batch.is_split());
        let children = batch.single_item_list()[1..].to_vec();
        let ids: Vec<_> = children.iter().map(|c| d.item(*c).unwrap().stream_id()).collect();
        assert!(ids.iter().all(|id| *id < 0));
        assert_ne!(ids[0], ids[1]);

        assert_eq!(run_timers(&mut d), 1);
        let (handle, ack) = &client.statuses()[0];
        assert_eq!(*handle, h);
        assert_eq!(ack.state.as_ref().unwrap().status_text, "Batch request acknowledged.");
        assert!(d.contains(h));

        // Provider streams are routed by stream id.
        d.process_event(item_event(None, refresh(ids[1], OmmState::open_ok(""))));
        deliver(&mut d);
        assert_eq!(client.msgs().last().unwrap().0, children[1]);

        for child in children {
            d.unregister(child).unwrap();
        }
        assert!(!d.contains(h));
        assert_index_consistent(&d);
    }

    fn ni_provider_with(services: Vec<ServiceUpdate>) -> ItemCallbackClient {
        let (mut d, _t) = dispatcher(json!({ "session": { "role": "ni_provider" } }));
        d.process_event(TransportEvent::Channel {
            channel: CHANNEL,
            event: ChannelEvent::Up,
        });
        d.process_event(TransportEvent::Directory {
            channel: CHANNEL,
            state: None,
            services,
        });
        d
    }

    fn ack_text(status: &StatusMsg) -> &str {
        &status.state.as_ref().unwrap().status_text
    }

    #[test]
    fn split_batch_on_unknown_service_acknowledges_parent_once() {
        let mut d = ni_provider_with(Vec::new());
        let client = RecordingClient::shared();
        let h = d
            .register_client(ReqMsg::new().service_name("NOPE").batch(["A", "B"]), as_client(&client), None, None)
            .unwrap();
        assert_eq!(deliver(&mut d), 0);

        assert_eq!(run_timers(&mut d), 3);
        let statuses = client.statuses();
        assert_eq!(statuses[0].0, h);
        assert_eq!(ack_text(&statuses[0].1), "Batch request acknowledged.");
        assert_eq!(statuses.iter().filter(|(handle, _)| *handle == h).count(), 1);
        let closed: Vec<_> = statuses[1..].iter().map(|(_, s)| s.key.name.clone().unwrap()).collect();
        assert_eq!(closed, vec!["A", "B"]);
        assert!(!d.contains(h));
        assert_eq!(d.pending_timeouts(), 0);
    }

    #[test]
    fn split_batch_closed_early_still_acknowledges_parent() {
        let mut d = ni_provider_with(vec![ServiceUpdate::add(5, ServiceInfo::named("NI_PUB"), ServiceState::default())]);
        let client = RecordingClient::shared();
        let h = d
            .register_client(ReqMsg::new().service_name("NI_PUB").batch(["A", "B"]), as_client(&client), None, None)
            .unwrap();
        let children = d.batch(h).unwrap().single_item_list()[1..].to_vec();
        for child in children {
            d.unregister(child).unwrap();
        }
        assert!(!d.contains(h));

        assert_eq!(deliver(&mut d), 1);
        let (handle, ack) = &client.statuses()[0];
        assert_eq!(*handle, h);
        assert_eq!(ack_text(ack), "Batch request acknowledged.");
        assert_eq!(run_timers(&mut d), 0);
    }

    #[test]
    fn consumer_batch_after_wraparound_is_split() {
        let (mut d, transport) = consumer_with(&[(5, "DIRECT_FEED")]);
        with_stream_ceiling(&mut d, 10);
        let client = RecordingClient::shared();
        let singles: Vec<_> = (0..6)
            .map(|i| {
                let req = ReqMsg::new().name(format!("S{i}")).service_name("DIRECT_FEED");
                d.register_client(req, as_client(&client), None, None).unwrap()
            })
            .collect();
        let ids: Vec<_> = singles.iter().map(|h| d.item(*h).unwrap().stream_id()).collect();
        assert_eq!(ids, (5..=10).collect::<Vec<_>>());

        // Streams 6 and 8 free up.
        d.unregister(singles[1]).unwrap();
        d.unregister(singles[3]).unwrap();
        transport.clear();

        let h = d
            .register_client(ReqMsg::new().service_name("DIRECT_FEED").batch(["A", "B"]), as_client(&client), None, None)
            .unwrap();
        let batch = d.batch(h).unwrap();
        assert!(batch.is_split());
        let children = batch.single_item_list()[1..].to_vec();
        let child_ids: Vec<_> = children.iter().map(|c| d.item(*c).unwrap().stream_id()).collect();
        assert_eq!(child_ids, vec![6, 8]);
        assert_eq!(transport.sent().len(), 2);
        assert_index_consistent(&d);

        assert_eq!(run_timers(&mut d), 1);
        let (handle, ack) = &client.statuses()[0];
        assert_eq!(*handle, h);
        assert_eq!(ack_text(ack), "Batch request acknowledged.");
        assert!(d.contains(h));
    }

    #[test]
    fn parent_handle_must_be_a_tunnel() {
        let (mut d, _t) = consumer_with(&[(5, "DIRECT_FEED")]);
        let client = RecordingClient::shared();
        let single = d
            .register_client(ReqMsg::new().name("IBM.N").service_id(5), as_client(&client), None, None)
            .unwrap();
        let e = d
            .register_client(ReqMsg::new().name("x"), as_client(&client), None, Some(single))
            .unwrap_err();
        assert_eq!(
            e.text(),
            "Invalid attempt to use SingleItem as parentHandle on registerClient(). Instance name='Consumer_1'."
        );
        let e = d
            .register_client(ReqMsg::new().name("x"), as_client(&client), None, Some(ItemHandle(999)))
            .unwrap_err();
        assert!(e.text().starts_with("Attempt to use invalid parentHandle on registerClient(). "));
    }

    #[test]
    fn tunnel_sub_streams() {
        let (mut d, transport) = consumer_with(&[(5, "DIRECT_FEED")]);
        let client = RecordingClient::shared();
        let tunnel = d
            .register_tunnel(TunnelStreamRequest::new().service_name("DIRECT_FEED"), as_client(&client), None)
            .unwrap();
        match transport.last() {
            Some(OutboundMsg::TunnelOpen { stream_id, service_id, .. }) => {
                assert_eq!(stream_id, 5);
                assert_eq!(service_id, 5);
            }
            other => panic!("unexpected {other:?}"),
        }

        let sub = |d: &mut ItemCallbackClient, req: ReqMsg| {
            d.register_client(req, as_client(&client), None, Some(tunnel))
        };
        let s1 = sub(&mut d, ReqMsg::new().name("q1")).unwrap();
        assert_eq!(d.item(s1).unwrap().stream_id(), 5);
        assert_eq!(d.handle_for_stream(5), Some(tunnel));
        match transport.last() {
            Some(OutboundMsg::SubStream { tunnel_stream_id, msg }) => {
                assert_eq!(tunnel_stream_id, 5);
                assert!(matches!(*msg, OutboundMsg::Request(ref r) if r.stream_id == 5));
            }
            other => panic!("unexpected {other:?}"),
        }

        let s2 = sub(&mut d, ReqMsg::new().name("q2").stream_id(9)).unwrap();
        assert_eq!(d.item(s2).unwrap().stream_id(), 9);
        let e = sub(&mut d, ReqMsg::new().name("q3").stream_id(9)).unwrap_err();
        assert!(e.text().contains("substream streamId (9) is already in use"));
        let e = sub(&mut d, ReqMsg::new().name("q3").stream_id(-1)).unwrap_err();
        assert!(e.text().starts_with("Invalid attempt to assign negative streamId to a sub stream."));
        let e = d.reissue(ReqMsg::new(), tunnel).unwrap_err();
        assert!(e.text().starts_with("Invalid attempt to reissue tunnel stream using ReqMsg. "));

        d.unregister(s1).unwrap();
        let s3 = sub(&mut d, ReqMsg::new().name("q3")).unwrap();
        assert_eq!(d.item(s3).unwrap().stream_id(), 5);

        d.process_event(TransportEvent::SubStream {
            channel: CHANNEL,
            tunnel,
            msg: refresh(9, OmmState::open_ok("")),
        });
        d.process_event(TransportEvent::SubStream {
            channel: CHANNEL,
            tunnel,
            msg: refresh(42, OmmState::open_ok("")),
        });
        assert_eq!(deliver(&mut d), 1);
        assert_eq!(client.msgs()[0].0, s2);

        d.process_event(TransportEvent::TunnelStatus {
            channel: CHANNEL,
            tunnel,
            state: closed("tunnel closed"),
        });
        assert_eq!(deliver(&mut d), 1);
        let (handle, st) = client.statuses().pop().unwrap();
        assert_eq!(handle, tunnel);
        assert!(st.private_stream);
        assert_eq!(st.key.name.as_deref(), Some("Tunnel"));
        assert!(!d.contains(tunnel));
        assert!(!d.contains(s2));
        assert!(!d.contains(s3));
        assert_eq!(d.item_count(), 0);
    }

    #[test]
    fn sub_stream_by_service_name_is_closed_later() {
        let (mut d, _t) = consumer_with(&[(5, "DIRECT_FEED")]);
        let client = RecordingClient::shared();
        let tunnel = d
            .register_tunnel(TunnelStreamRequest::new().service_id(5), as_client(&client), None)
            .unwrap();
        let s = d
            .register_client(ReqMsg::new().name("q").service_name("DIRECT_FEED"), as_client(&client), None, Some(tunnel))
            .unwrap();
        assert_eq!(deliver(&mut d), 0);
        run_timers(&mut d);
        let (handle, st) = client.statuses().pop().unwrap();
        assert_eq!(handle, s);
        assert_eq!(st.state.unwrap().status_text, "Invalid attempt to open sub stream using serviceName.");
        assert!(d.contains(tunnel));
    }

    #[test]
    fn login_stream_fan_out() {
        let (mut d, transport) = consumer_with(&[]);
        let client = RecordingClient::shared();
        let login = || ReqMsg::new().domain_type(DomainType::LOGIN);
        let l1 = d.register_client(login(), as_client(&client), None, None).unwrap();
        let l2 = d.register_client(login(), as_client(&client), None, None).unwrap();
        assert_eq!(d.item(l1).unwrap().item_type(), ItemType::LoginItem);

        let login_refresh = Msg::Refresh(RefreshMsg {
            stream_id: LOGIN_STREAM_ID,
            domain_type: DomainType::LOGIN,
            state: OmmState::open_ok("Login accepted"),
            complete: true,
            ..RefreshMsg::default()
        });
        d.process_event(item_event(None, login_refresh));
        assert_eq!(deliver(&mut d), 2);

        let l3 = d.register_client(login(), as_client(&client), None, None).unwrap();
        assert_eq!(deliver(&mut d), 0);
        assert_eq!(run_timers(&mut d), 1);
        assert_eq!(client.msgs().last().unwrap().0, l3);

        d.reissue(login().name("bob"), l1).unwrap();
        match transport.last() {
            Some(OutboundMsg::Request(r)) => {
                assert_eq!(r.stream_id, LOGIN_STREAM_ID);
                assert_eq!(r.key.name.as_deref(), Some("bob"));
            }
            other => panic!("unexpected {other:?}"),
        }
        d.submit_post(PostMsg::default(), l2).unwrap();
        assert!(matches!(transport.last(), Some(OutboundMsg::Post(p)) if p.stream_id == LOGIN_STREAM_ID));

        d.process_event(TransportEvent::Channel {
            channel: CHANNEL,
            event: ChannelEvent::DownReconnecting,
        });
        d.process_event(TransportEvent::Channel {
            channel: CHANNEL,
            event: ChannelEvent::DownReconnecting,
        });
        assert_eq!(deliver(&mut d), 3);
        let text = |c: &RecordingClient| c.statuses().last().unwrap().1.state.clone().unwrap().status_text;
        assert_eq!(text(client.as_ref()), "channel down");

        let e = d.submit_generic(GenericMsg::new("x"), l1).unwrap_err();
        assert_eq!(e.usage_code(), Some(UsageErrorCode::NoActiveChannel));

        d.process_event(TransportEvent::Channel {
            channel: CHANNEL,
            event: ChannelEvent::Up,
        });
        d.process_event(TransportEvent::Channel {
            channel: CHANNEL,
            event: ChannelEvent::Ready,
        });
        assert_eq!(deliver(&mut d), 3);
        assert_eq!(text(client.as_ref()), "channel up");

        d.process_event(item_event(None, status(LOGIN_STREAM_ID, DomainType::LOGIN, closed("Login denied"))));
        assert_eq!(deliver(&mut d), 3);
        assert!(d.login_state().items().is_empty());
        assert_eq!(d.item_count(), 0);
    }

    #[test]
    fn late_login_after_closed_state_is_removed() {
        let (mut d, _t) = consumer_with(&[]);
        let client = RecordingClient::shared();
        d.process_event(item_event(
            None,
            Msg::Refresh(RefreshMsg {
                stream_id: LOGIN_STREAM_ID,
                domain_type: DomainType::LOGIN,
                state: OmmState::open_ok(""),
                ..RefreshMsg::default()
            }),
        ));
        d.process_event(TransportEvent::Channel {
            channel: CHANNEL,
            event: ChannelEvent::Down,
        });
        let h = d
            .register_client(ReqMsg::new().domain_type(DomainType::LOGIN), as_client(&client), None, None)
            .unwrap();
        run_timers(&mut d);
        assert_eq!(client.msgs().len(), 1);
        assert!(!d.contains(h));
    }

    #[test]
    fn directory_update_scenario() {
        let (mut d, transport) = consumer_with(&[]);
        let client = RecordingClient::shared();
        let view = d
            .register_client(ReqMsg::new().domain_type(DomainType::SOURCE), as_client(&client), None, None)
            .unwrap();
        let missing = d
            .register_client(
                ReqMsg::new().domain_type(DomainType::SOURCE).service_name("NOPE"),
                as_client(&client),
                None,
                None,
            )
            .unwrap();

        d.process_event(TransportEvent::Directory {
            channel: CHANNEL,
            state: Some(OmmState::open_ok("")),
            services: vec![ServiceUpdate::add(5, ServiceInfo::named("DIRECT_FEED"), ServiceState::default())],
        });
        assert_eq!(deliver(&mut d), 0);
        assert!(matches!(transport.last(), Some(OutboundMsg::DictionaryDownload { service_id: 5, .. })));

        run_timers(&mut d);
        let msgs = client.msgs();
        assert_eq!(msgs.len(), 2);
        let refresh = msgs.iter().find_map(|(h, m)| match m {
            Msg::Refresh(r) if *h == view => Some(r.clone()),
            _ => None,
        });
        assert_eq!(refresh.unwrap().payload["services"][0]["name"], "DIRECT_FEED");
        assert!(!d.contains(missing));

        let closed_state = ServiceState {
            accepting_requests: false,
            ..ServiceState::default()
        };
        d.process_event(TransportEvent::Directory {
            channel: CHANNEL,
            state: None,
            services: vec![ServiceUpdate::update(5, None, Some(closed_state))],
        });
        let (_, dir) = d.context().directories.directory_by_id(5).unwrap();
        assert!(!dir.accepting_requests());
        assert_eq!(dir.name(), "DIRECT_FEED");

        assert_eq!(deliver(&mut d), 1);
        match &client.msgs().last().unwrap().1 {
            Msg::Update(u) => assert_eq!(u.payload["services"][0]["state"]["accepting_requests"], false),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn directory_stream_closed_closes_channel() {
        let (mut d, transport) = consumer_with(&[(5, "DIRECT_FEED")]);
        d.process_event(TransportEvent::Directory {
            channel: CHANNEL,
            state: Some(closed("source directory closed")),
            services: Vec::new(),
        });
        assert!(matches!(transport.last(), Some(OutboundMsg::CloseChannel { .. })));

        d.process_event(TransportEvent::Directory {
            channel: CHANNEL,
            state: Some(OmmState::new(StreamState::Open, DataState::Suspect, StatusCode::None, "")),
            services: Vec::new(),
        });
        assert!(d.context().channels.is_directory_suspect(CHANNEL));
    }

    #[test]
    fn local_dictionary_not_ready() {
        let (mut d, _t) = consumer_with(&[]);
        let client = RecordingClient::shared();
        let h = d
            .register_client(
                ReqMsg::new().domain_type(DomainType::DICTIONARY).name("RWFFld"),
                as_client(&client),
                None,
                None,
            )
            .unwrap();
        assert_eq!(d.item(h).unwrap().stream_id(), 3);
        assert_eq!(run_timers(&mut d), 1);
        let (_, st) = client.statuses().pop().unwrap();
        let state = st.state.unwrap();
        assert_eq!(state.stream_state, StreamState::ClosedRecover);
        assert_eq!(state.status_code, StatusCode::Error);
        assert_eq!(state.status_text, "Data dictionary is not ready to provide.");
        assert!(!d.contains(h));
    }

    #[test]
    fn dictionary_request_validation() {
        let (mut d, _t) = consumer_with(&[]);
        let client = RecordingClient::shared();
        let dict = || ReqMsg::new().domain_type(DomainType::DICTIONARY);
        let e = d.register_client(dict().name("Other"), as_client(&client), None, None).unwrap_err();
        assert!(e.text().starts_with("Invalid ReqMsg's name : Other\nReqMsg's name must be \"RWFFld\" or \"RWFEnum\""));
        let e = d.register_client(dict(), as_client(&client), None, None).unwrap_err();
        assert!(e.text().starts_with("ReqMsg's name is not defined. "));
        let e = d.register_client(dict().name("RWFFld").name_type(3), as_client(&client), None, None).unwrap_err();
        assert!(e.text().starts_with("Invalid ReqMsg's name type : 3. "));
    }

    #[test]
    fn local_dictionary_parts() {
        let (mut d, _t) = dispatcher(json!({
            "session": { "dictionary_part_size": 2 },
            "dictionary": { "fields": [
                { "fid": 25, "acronym": "ASK", "rwf_type": "REAL" },
                { "fid": 22, "acronym": "BID", "rwf_type": "REAL" },
                { "fid": 3, "acronym": "DSPLY_NAME", "rwf_type": "RMTES_STRING" }
            ] }
        }));
        assert_eq!(d.context().directories.len(), 0);
        let client = RecordingClient::shared();
        let h = d
            .register_client(
                ReqMsg::new().domain_type(DomainType::DICTIONARY).name("RWFFld"),
                as_client(&client),
                None,
                None,
            )
            .unwrap();
        assert!(d.dictionary(h).unwrap().is_local());
        assert_eq!(run_timers(&mut d), 2);
        let parts: Vec<_> = client
            .msgs()
            .into_iter()
            .filter_map(|(_, m)| match m {
                Msg::Refresh(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(parts.len(), 2);
        assert!(!parts[0].complete && parts[0].clear_cache);
        assert!(parts[1].complete);
        assert_eq!(parts[0].payload["entries"][0]["acronym"], "DSPLY_NAME");
        assert!(d.contains(h));
        assert_eq!(d.pending_timeouts(), 0);

        let e = d.reissue(ReqMsg::new(), h).unwrap_err();
        assert!(e.text().starts_with("Invalid attempt to modify dictionary stream. "));
        d.unregister(h).unwrap();
        assert!(!d.contains(h));
    }

    #[test]
    fn file_dictionary_kind_downloads_on_add() {
        let (mut d, transport) = dispatcher(json!({ "dictionary": { "kind": "file" } }));
        assert_eq!(d.context().directories.dictionary_kind(), DictionaryKind::File);
        d.process_event(TransportEvent::Channel {
            channel: CHANNEL,
            event: ChannelEvent::Up,
        });
        let down = ServiceState {
            up: false,
            ..ServiceState::default()
        };
        d.process_event(TransportEvent::Directory {
            channel: CHANNEL,
            state: None,
            services: vec![ServiceUpdate::add(1, ServiceInfo::named("F"), down)],
        });
        assert!(matches!(transport.last(), Some(OutboundMsg::DictionaryDownload { service_id: 1, .. })));
    }

    #[test]
    fn channel_down_tombstones_services() {
        let (mut d, _t) = consumer_with(&[(5, "DIRECT_FEED")]);
        d.process_event(TransportEvent::Channel {
            channel: CHANNEL,
            event: ChannelEvent::Down,
        });
        assert!(d.context().directories.directory_by_id(5).is_none());
        assert!(d.context().channels.login_channels().is_empty());

        let client = RecordingClient::shared();
        let h = d
            .register_client(ReqMsg::new().name("IBM.N").service_name("DIRECT_FEED"), as_client(&client), None, None)
            .unwrap();
        run_timers(&mut d);
        assert_eq!(client.statuses()[0].0, h);
    }
}
