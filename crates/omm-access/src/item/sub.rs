//! Sub item: a stream carried inside a tunnel.
//!
//! Its stream id comes from the tunnel's [`SubStreamTable`] and never enters
//! the session's stream index. Every outbound message is wrapped and sent on
//! the tunnel's stream.
//!
//! [`SubStreamTable`]: crate::item::SubStreamTable

use omm_core::error::{OmmResult, UsageErrorCode};
use omm_core::types::{CloseMsg, GenericMsg, PostMsg, ReqMsg};
use tracing::debug;

use crate::callback::ItemCallbackClient;
use crate::client::{Closure, SharedClient};
use crate::closed_status::ClosedStatusInfo;
use crate::item::{Item, ItemHandle, ItemKind};
use crate::transport::OutboundMsg;

impl ItemCallbackClient {
    pub(crate) fn register_sub_item(
        &mut self,
        req: ReqMsg,
        client: SharedClient,
        closure: Closure,
        tunnel: ItemHandle,
    ) -> OmmResult<ItemHandle> {
        if req.stream_id < 0 {
            return Err(self.ctx.usage(
                "Invalid attempt to assign negative streamId to a sub stream. ",
                UsageErrorCode::InvalidArgument,
            ));
        }

        let handle = self.next_handle();
        self.insert_item(Item::new(handle, req.domain_type, client, closure, Some(tunnel), ItemKind::Sub));

        if req.service_name.is_some() {
            let info = ClosedStatusInfo::closed(0, &req, "Invalid attempt to open sub stream using serviceName.");
            self.schedule_closed_status(handle, info);
            return Ok(handle);
        }

        let added = match self.tunnel_mut(tunnel) {
            Some(t) => t.sub_streams.add_sub_item(handle, req.stream_id),
            None => Ok(0),
        };
        let sub_stream_id = match added {
            Ok(id) => id,
            Err(e) => {
                self.destroy_item(handle);
                let code = e.usage_code().unwrap_or(UsageErrorCode::InvalidArgument);
                return Err(self.ctx.usage(&format!("{}. ", e.text()), code));
            }
        };
        if let Some(item) = self.items.get_mut(&handle) {
            item.stream_id = sub_stream_id;
        }

        if let Err(e) = self.submit_sub_request(handle, req) {
            self.remove_sub(handle);
            return Err(e);
        }
        debug!("[tunnel] sub item {handle} opened on sub stream {sub_stream_id} of tunnel {tunnel}");
        Ok(handle)
    }

    fn submit_sub_request(&mut self, handle: ItemHandle, mut req: ReqMsg) -> OmmResult<()> {
        let Some((stream_id, tunnel)) = self.sub_route(handle) else {
            return Ok(());
        };
        req.stream_id = stream_id;
        self.submit_on_tunnel(tunnel, OutboundMsg::Request(req), handle, "open or modify sub stream request")
    }

    /// Sub stream id and owning tunnel of a sub item.
    fn sub_route(&self, handle: ItemHandle) -> Option<(i32, ItemHandle)> {
        let item = self.items.get(&handle)?;
        Some((item.stream_id, item.parent?))
    }

    pub(crate) fn modify_sub(&mut self, handle: ItemHandle, req: ReqMsg) -> OmmResult<()> {
        self.submit_sub_request(handle, req)
    }

    pub(crate) fn post_sub(&mut self, handle: ItemHandle, mut post: PostMsg) -> OmmResult<()> {
        let Some((stream_id, tunnel)) = self.sub_route(handle) else {
            return Ok(());
        };
        post.stream_id = stream_id;
        self.submit_on_tunnel(tunnel, OutboundMsg::Post(post), handle, "submit PostMsg on sub stream")
    }

    pub(crate) fn generic_sub(&mut self, handle: ItemHandle, mut generic: GenericMsg) -> OmmResult<()> {
        let Some((stream_id, tunnel)) = self.sub_route(handle) else {
            return Ok(());
        };
        generic.stream_id = stream_id;
        self.submit_on_tunnel(tunnel, OutboundMsg::Generic(generic), handle, "submit GenericMsg on sub stream")
    }

    pub(crate) fn close_sub(&mut self, handle: ItemHandle) -> OmmResult<()> {
        let result = match (self.sub_route(handle), self.items.get(&handle).map(|i| i.domain_type)) {
            (Some((stream_id, tunnel)), Some(domain_type)) if stream_id != 0 => {
                let close = CloseMsg { stream_id, domain_type };
                self.submit_on_tunnel(tunnel, OutboundMsg::Close(close), handle, "close sub stream request")
            }
            _ => Ok(()),
        };
        self.item_remove(handle);
        result
    }

    /// Drop the sub item and give its id back to the tunnel.
    pub(crate) fn remove_sub(&mut self, handle: ItemHandle) {
        let Some(item) = self.destroy_item(handle) else {
            return;
        };
        if let Some(t) = item.parent.and_then(|p| self.tunnel_mut(p)) {
            t.sub_streams.remove_sub_item(item.stream_id);
        }
    }
}
