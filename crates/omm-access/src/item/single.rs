//! Single item: one request, one stream.

use omm_core::error::{OmmError, OmmResult, UsageErrorCode};
use omm_core::types::{CloseMsg, GenericMsg, PostMsg, Qos, ReqMsg};
use tracing::{debug, error};

use crate::callback::ItemCallbackClient;
use crate::client::{Closure, SharedClient};
use crate::closed_status::ClosedStatusInfo;
use crate::directory::DirectoryRef;
use crate::item::{Item, ItemHandle, ItemKind};
use crate::transport::{ChannelId, OutboundMsg};

/// Text of the closed status for a request whose service cannot be found.
pub(crate) fn service_not_found(service_name: Option<&str>, service_id: Option<u16>) -> String {
    match (service_name, service_id) {
        (Some(name), _) => format!("Service name of '{name}' is not found."),
        (None, Some(id)) => format!("Service id of '{id}' is not found."),
        (None, None) => "Passed in request message does not identify any service.".to_string(),
    }
}

impl ItemCallbackClient {
    /// Look up the service a request names: by name first, then by id.
    ///
    /// `Err` carries the closed status text.
    pub(crate) fn resolve_service(
        &self,
        service_name: Option<&str>,
        service_id: Option<u16>,
    ) -> Result<(DirectoryRef, ChannelId), String> {
        let found = match (service_name, service_id) {
            (Some(name), _) => self.ctx.directories.directory_by_name(name),
            (None, Some(id)) => self.ctx.directories.directory_by_id(id),
            (None, None) => None,
        };
        found
            .map(|(r, d)| (r, d.channel()))
            .ok_or_else(|| service_not_found(service_name, service_id))
    }

    pub(crate) fn register_single(
        &mut self,
        req: ReqMsg,
        client: SharedClient,
        closure: Closure,
        parent: Option<ItemHandle>,
    ) -> OmmResult<ItemHandle> {
        let handle = self.next_handle();
        self.insert_item(Item::new(handle, req.domain_type, client, closure, parent, ItemKind::Single));
        if let Err(e) = self.open_single(handle, req) {
            self.item_remove(handle);
            return Err(e);
        }
        Ok(handle)
    }

    /// Resolve the service and send the request, or schedule the closed
    /// status if the service is unknown.
    pub(crate) fn open_single(&mut self, handle: ItemHandle, req: ReqMsg) -> OmmResult<()> {
        match self.resolve_service(req.service_name.as_deref(), req.key.service_id) {
            Ok((directory, channel)) => {
                self.attach_directory(handle, directory, channel);
                self.submit_request(handle, req, 0)
            }
            Err(text) => {
                debug!("[item] handle {handle}: {text}");
                let info = ClosedStatusInfo::closed(0, &req, text);
                self.schedule_closed_status(handle, info);
                Ok(())
            }
        }
    }

    pub(crate) fn attach_directory(&mut self, handle: ItemHandle, directory: DirectoryRef, channel: ChannelId) {
        if let Some(item) = self.items.get_mut(&handle) {
            item.directory = Some(directory);
            item.channel = Some(channel);
        }
    }

    /// Send `req` for `handle`, assigning a stream id (and `children` more
    /// after it) on first submit.
    pub(crate) fn submit_request(&mut self, handle: ItemHandle, mut req: ReqMsg, children: usize) -> OmmResult<()> {
        let (stream_id, channel) = match self.items.get(&handle) {
            Some(item) => (item.stream_id, item.channel),
            None => return Ok(()),
        };
        let Some(channel) = channel else {
            return Err(OmmError::usage(
                "Failed to open or modify item request. Reason: item stream is not open",
                UsageErrorCode::NoActiveChannel,
            ));
        };

        let stream_id = if stream_id == 0 {
            let id = self.allocate_stream_id(children)?;
            self.index_stream(id, handle);
            id
        } else {
            stream_id
        };

        req.stream_id = stream_id;
        req.key.service_id = None;
        req.service_name = self.service_name_of(handle);
        if req.qos.is_none() {
            req.qos = Some(Qos::REALTIME_TICK_BY_TICK);
            req.worst_qos = Some(Qos::WORST_ACCEPTABLE);
        }

        self.ctx
            .submit(channel, OutboundMsg::Request(req), Some(handle), "open or modify item request")
    }

    pub(crate) fn modify_single(&mut self, handle: ItemHandle, req: ReqMsg) -> OmmResult<()> {
        self.submit_request(handle, req, 0)
    }

    pub(crate) fn close_single(&mut self, handle: ItemHandle) -> OmmResult<()> {
        let Some(item) = self.items.get(&handle) else {
            return Ok(());
        };
        let result = match item.channel {
            Some(channel) if item.stream_id != 0 => {
                let close = CloseMsg {
                    stream_id: item.stream_id,
                    domain_type: item.domain_type,
                };
                self.ctx
                    .submit(channel, OutboundMsg::Close(close), Some(handle), "close item request")
            }
            _ => Ok(()),
        };
        self.item_remove(handle);
        result
    }

    pub(crate) fn post_single(&mut self, handle: ItemHandle, mut post: PostMsg) -> OmmResult<()> {
        let channel = self.open_channel_of(handle, "submit PostMsg on item stream")?;
        if let Some(item) = self.items.get(&handle) {
            post.stream_id = item.stream_id;
        }
        if post.service_name.is_none() && post.key.service_id.is_none() {
            post.service_name = self.service_name_of(handle);
        }
        self.ctx
            .submit(channel, OutboundMsg::Post(post), Some(handle), "submit PostMsg on item stream")
    }

    pub(crate) fn generic_single(&mut self, handle: ItemHandle, mut generic: GenericMsg) -> OmmResult<()> {
        let channel = self.open_channel_of(handle, "submit GenericMsg on item stream")?;
        if let Some(item) = self.items.get(&handle) {
            generic.stream_id = item.stream_id;
        }
        self.ctx
            .submit(channel, OutboundMsg::Generic(generic), Some(handle), "submit GenericMsg on item stream")
    }

    fn open_channel_of(&self, handle: ItemHandle, what: &str) -> OmmResult<ChannelId> {
        match self.items.get(&handle) {
            Some(item) if item.stream_id != 0 => item.channel.ok_or_else(|| {
                OmmError::usage(format!("Failed to {what}. Reason: No active channel"), UsageErrorCode::NoActiveChannel)
            }),
            _ => {
                error!("[item] {what} on handle {handle} before its stream was opened");
                Err(OmmError::usage(
                    format!("Failed to {what}. Reason: item stream is not open"),
                    UsageErrorCode::InvalidOperation,
                ))
            }
        }
    }

    /// Drop the item and release its slot in a batch parent.
    pub(crate) fn remove_single(&mut self, handle: ItemHandle) {
        let Some(item) = self.destroy_item(handle) else {
            return;
        };
        if let Some(parent) = item.parent {
            self.decrement_item_count(parent);
        }
    }
}
