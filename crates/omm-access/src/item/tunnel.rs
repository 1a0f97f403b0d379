//! Tunnel item and its sub-stream multiplexer.
//!
//! A tunnel is one transport stream that carries many sub-streams. Sub-stream
//! ids form a private space starting at [`STARTING_SUB_STREAM_ID`]; they never
//! enter the session's stream index.

use omm_core::error::{OmmError, OmmResult, UsageErrorCode};
use omm_core::types::{Msg, MsgKey, OmmState, ReqMsg, StatusMsg, TunnelStreamRequest};
use tracing::{debug, error, warn};

use crate::callback::ItemCallbackClient;
use crate::client::{Closure, SharedClient};
use crate::closed_status::ClosedStatusInfo;
use crate::item::{Item, ItemHandle, ItemKind};
use crate::transport::{ChannelId, OutboundMsg};

pub const STARTING_SUB_STREAM_ID: i32 = 5;

// ---------------------------------------------------------------------------
// SubStreamTable
// ---------------------------------------------------------------------------

/// Sub-stream id allocator and slot table of one tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubStreamTable {
    next: i32,
    returned: Vec<i32>,
    slots: Vec<Option<ItemHandle>>,
}

impl Default for SubStreamTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SubStreamTable {
    pub fn new() -> Self {
        Self {
            next: STARTING_SUB_STREAM_ID,
            returned: Vec::new(),
            slots: Vec::with_capacity(32),
        }
    }

    /// Most recently returned id first, else the next fresh one not taken
    /// by an explicit open.
    pub fn next_sub_stream_id(&mut self) -> i32 {
        if let Some(id) = self.returned.pop() {
            return id;
        }
        while self.get(self.next).is_some() {
            self.next += 1;
        }
        let id = self.next;
        self.next += 1;
        id
    }

    /// Bind `handle` to `stream_id`, or to a fresh id when `stream_id` is 0.
    pub fn add_sub_item(&mut self, handle: ItemHandle, stream_id: i32) -> OmmResult<i32> {
        let stream_id = if stream_id == 0 {
            self.next_sub_stream_id()
        } else {
            if stream_id < STARTING_SUB_STREAM_ID {
                return Err(OmmError::usage(
                    format!(
                        "Invalid attempt to open a sub stream with streamId smaller than starting stream id. Passed in stream id is {stream_id}"
                    ),
                    UsageErrorCode::InvalidArgument,
                ));
            }
            if let Some(pos) = self.returned.iter().position(|id| *id == stream_id) {
                self.returned.remove(pos);
            } else if self.get(stream_id).is_some() {
                return Err(OmmError::usage(
                    format!("Invalid attempt to open a substream: substream streamId ({stream_id}) is already in use"),
                    UsageErrorCode::InvalidOperation,
                ));
            }
            stream_id
        };

        let slot = stream_id as usize;
        if self.slots.len() <= slot {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(handle);
        Ok(stream_id)
    }

    /// Free `stream_id` and return it to the reuse list.
    pub fn remove_sub_item(&mut self, stream_id: i32) {
        if stream_id < STARTING_SUB_STREAM_ID {
            if stream_id > 0 {
                error!("[tunnel] Internal error. Current stream Id in remove_sub_item is less than the starting stream id.");
            }
            return;
        }
        let Some(slot) = self.slots.get_mut(stream_id as usize) else {
            error!("[tunnel] Internal error. Current stream Id in remove_sub_item is greater than the list size.");
            return;
        };
        if slot.take().is_some() {
            self.returned.push(stream_id);
        }
    }

    /// Handle bound to `stream_id`, logging out-of-range ids.
    pub fn get_sub_item(&self, stream_id: i32) -> Option<ItemHandle> {
        if stream_id < STARTING_SUB_STREAM_ID {
            if stream_id > 0 {
                error!("[tunnel] Internal error. Current stream Id in get_sub_item is less than the starting stream id.");
            }
            return None;
        }
        if stream_id as usize >= self.slots.len() {
            error!("[tunnel] Internal error. Current stream Id in get_sub_item is greater than the list size.");
            return None;
        }
        self.get(stream_id)
    }

    fn get(&self, stream_id: i32) -> Option<ItemHandle> {
        usize::try_from(stream_id).ok().and_then(|s| self.slots.get(s).copied().flatten())
    }

    /// Handles of every bound sub-stream, in id order.
    pub fn sub_items(&self) -> Vec<ItemHandle> {
        self.slots.iter().filter_map(|s| *s).collect()
    }
}

// ---------------------------------------------------------------------------
// TunnelItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TunnelItem {
    pub(crate) request: TunnelStreamRequest,
    pub(crate) sub_streams: SubStreamTable,
}

impl TunnelItem {
    pub fn request(&self) -> &TunnelStreamRequest {
        &self.request
    }

    pub fn sub_streams(&self) -> &SubStreamTable {
        &self.sub_streams
    }
}

impl ItemCallbackClient {
    pub(crate) fn open_tunnel(
        &mut self,
        req: TunnelStreamRequest,
        client: SharedClient,
        closure: Closure,
    ) -> OmmResult<ItemHandle> {
        let handle = self.next_handle();
        let tunnel = TunnelItem {
            request: req.clone(),
            sub_streams: SubStreamTable::new(),
        };
        self.insert_item(Item::new(handle, req.domain_type, client, closure, None, ItemKind::Tunnel(tunnel)));

        let (directory, channel) = match self.resolve_service(req.service_name.as_deref(), req.service_id) {
            Ok(found) => found,
            Err(text) => {
                debug!("[tunnel] handle {handle}: {text}");
                let info = ClosedStatusInfo::closed(0, &status_request(&req), text);
                self.schedule_closed_status(handle, info);
                return Ok(handle);
            }
        };
        self.attach_directory(handle, directory, channel);

        let service_id = self.ctx.directories.get(directory).map_or(0, |d| d.id());
        let stream_id = match self.allocate_stream_id(0) {
            Ok(id) => id,
            Err(e) => {
                self.destroy_item(handle);
                return Err(e);
            }
        };
        self.index_stream(stream_id, handle);

        let open = OutboundMsg::TunnelOpen {
            stream_id,
            service_id,
            request: req,
        };
        if let Err(e) = self.ctx.submit(channel, open, Some(handle), "open tunnel stream request") {
            self.destroy_item(handle);
            return Err(e);
        }
        debug!("[tunnel] handle {handle} opening on stream {stream_id} (service id {service_id})");
        Ok(handle)
    }

    pub(crate) fn close_tunnel(&mut self, handle: ItemHandle) -> OmmResult<()> {
        let (stream_id, channel) = match self.items.get(&handle) {
            Some(item) => (item.stream_id, item.channel),
            None => return Ok(()),
        };
        let result = match channel {
            Some(channel) if stream_id != 0 => self.ctx.submit(
                channel,
                OutboundMsg::TunnelClose { stream_id },
                Some(handle),
                "close tunnel stream request",
            ),
            _ => Ok(()),
        };
        self.item_remove(handle);
        result
    }

    /// Remove every sub-stream, then the tunnel.
    pub(crate) fn remove_tunnel(&mut self, handle: ItemHandle) {
        for sub in self.tunnel_sub_items(handle) {
            self.item_remove(sub);
        }
        self.destroy_item(handle);
    }

    fn tunnel_sub_items(&self, handle: ItemHandle) -> Vec<ItemHandle> {
        match self.items.get(&handle).map(|i| &i.kind) {
            Some(ItemKind::Tunnel(t)) => t.sub_streams.sub_items(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn tunnel_mut(&mut self, handle: ItemHandle) -> Option<&mut TunnelItem> {
        match &mut self.items.get_mut(&handle)?.kind {
            ItemKind::Tunnel(t) => Some(t),
            _ => None,
        }
    }

    /// Tunnel bookkeeping for `handle`, if it is a tunnel.
    pub fn tunnel(&self, handle: ItemHandle) -> Option<&TunnelItem> {
        match &self.items.get(&handle)?.kind {
            ItemKind::Tunnel(t) => Some(t),
            _ => None,
        }
    }

    /// Send `msg` inside the tunnel stream of `tunnel`.
    pub(crate) fn submit_on_tunnel(
        &mut self,
        tunnel: ItemHandle,
        msg: OutboundMsg,
        sub: ItemHandle,
        what: &str,
    ) -> OmmResult<()> {
        let (stream_id, channel) = match self.items.get(&tunnel) {
            Some(item) => (item.stream_id, item.channel),
            None => (0, None),
        };
        match channel {
            Some(channel) if stream_id != 0 => {
                let wrapped = OutboundMsg::SubStream {
                    tunnel_stream_id: stream_id,
                    msg: Box::new(msg),
                };
                self.ctx.submit(channel, wrapped, Some(sub), what)
            }
            _ => Err(OmmError::usage(
                format!("Failed to {what}. Reason: tunnel stream is not open"),
                UsageErrorCode::InvalidOperation,
            )),
        }
    }

    pub(crate) fn process_tunnel_status(&mut self, channel: ChannelId, tunnel: ItemHandle, state: OmmState) {
        let Some(item) = self.items.get(&tunnel) else {
            warn!("[tunnel] Received a tunnel stream status event for closed handle {tunnel}; dropped");
            return;
        };
        let ItemKind::Tunnel(t) = &item.kind else {
            error!("[tunnel] Received a tunnel stream status event for non-tunnel handle {tunnel}; dropped");
            return;
        };
        let service_id = item
            .directory
            .and_then(|d| self.ctx.directories.get(d))
            .map(|d| d.id());
        let status = StatusMsg {
            stream_id: item.stream_id,
            domain_type: item.domain_type,
            key: MsgKey {
                name: Some(t.request.name.clone()),
                service_id,
                ..MsgKey::default()
            },
            state: Some(state),
            private_stream: true,
            ..StatusMsg::default()
        };
        self.deliver(tunnel, Msg::Status(status), Some(channel));
    }

    pub(crate) fn process_sub_stream_msg(&mut self, channel: ChannelId, tunnel: ItemHandle, msg: Msg) {
        let sub_stream_id = msg.stream_id();
        let sub = match self.items.get(&tunnel).map(|i| &i.kind) {
            Some(ItemKind::Tunnel(t)) => t.sub_streams.get_sub_item(sub_stream_id),
            _ => {
                warn!("[tunnel] Received a tunnel stream message event for closed tunnel {tunnel}; dropped");
                return;
            }
        };
        match sub {
            Some(sub) if self.items.contains_key(&sub) => self.deliver(sub, msg, Some(channel)),
            _ => error!(
                "[tunnel] Received a tunnel stream message event containing sub stream message with unknown streamId {sub_stream_id}. Message is dropped."
            ),
        }
    }
}

/// Request-shaped view of a tunnel request, used for its closed status.
fn status_request(req: &TunnelStreamRequest) -> ReqMsg {
    let mut out = ReqMsg::new().name(req.name.clone()).domain_type(req.domain_type).private_stream(true);
    out.service_name = req.service_name.clone();
    out.key.service_id = req.service_id;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_five_and_reuse_returned() {
        let mut t = SubStreamTable::new();
        assert_eq!(t.add_sub_item(ItemHandle(1), 0).unwrap(), 5);
        assert_eq!(t.add_sub_item(ItemHandle(2), 0).unwrap(), 6);
        t.remove_sub_item(5);
        assert_eq!(t.get_sub_item(5), None);
        assert_eq!(t.add_sub_item(ItemHandle(3), 0).unwrap(), 5);
        assert_eq!(t.get_sub_item(5), Some(ItemHandle(3)));
        assert_eq!(t.sub_items(), vec![ItemHandle(3), ItemHandle(2)]);
    }

    #[test]
    fn explicit_ids() {
        let mut t = SubStreamTable::new();
        let e = t.add_sub_item(ItemHandle(1), 4).unwrap_err();
        assert!(e.text().starts_with("Invalid attempt to open a sub stream with streamId smaller than starting stream id."));

        assert_eq!(t.add_sub_item(ItemHandle(1), 9).unwrap(), 9);
        let e = t.add_sub_item(ItemHandle(2), 9).unwrap_err();
        assert_eq!(e.text(), "Invalid attempt to open a substream: substream streamId (9) is already in use");

        // A freed id is accepted explicitly through the reuse list.
        t.remove_sub_item(9);
        assert_eq!(t.add_sub_item(ItemHandle(2), 9).unwrap(), 9);
        assert_eq!(t.add_sub_item(ItemHandle(3), 0).unwrap(), 5);

        // Fresh ids skip over explicitly taken ones.
        for h in 4..=6 {
            t.add_sub_item(ItemHandle(h), 0).unwrap();
        }
        assert_eq!(t.next_sub_stream_id(), 10);
    }

    #[test]
    fn removing_twice_returns_once() {
        let mut t = SubStreamTable::new();
        t.add_sub_item(ItemHandle(1), 0).unwrap();
        t.remove_sub_item(5);
        t.remove_sub_item(5);
        assert_eq!(t.next_sub_stream_id(), 5);
        assert_eq!(t.next_sub_stream_id(), 6);
        t.remove_sub_item(2);
        t.remove_sub_item(400);
    }
}
