//! Login items and the login stream.
//!
//! Every login registration shares stream 1. The session keeps the last
//! login refresh so late registrations see the current state, and fans
//! every inbound login message out to all login items.
//!
//! Channel transitions are reported on the login stream as well:
//!
//! ```text
//! Up               send login (and directory) request
//! Ready            Open / Ok       "channel up"     after a reconnect
//! DownReconnecting Open / Suspect  "channel down"   first time only
//! Down             Closed / Suspect "channel closed"
//! ```

use omm_core::error::OmmResult;
use omm_core::types::{
    DataState, DomainType, GenericMsg, Msg, MsgKey, OmmState, PostMsg, RefreshMsg, ReqMsg, Role, StatusCode,
    StatusMsg, StreamState,
};
use tracing::{debug, error, info};

use crate::callback::{ItemCallbackClient, closes_stream};
use crate::client::{Closure, SharedClient};
use crate::item::{Item, ItemHandle, ItemKind};
use crate::stream_id::LOGIN_STREAM_ID;
use crate::timeout::TimeoutTask;
use crate::transport::{ChannelId, OutboundMsg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoginItem {
    /// Opened by a non-interactive provider session.
    pub ni_provider: bool,
}

/// Login stream state shared by all login items.
#[derive(Debug, Default)]
pub struct LoginState {
    pub(crate) items: Vec<ItemHandle>,
    pub(crate) refresh: Option<RefreshMsg>,
    pub(crate) refresh_received: bool,
}

impl LoginState {
    pub fn items(&self) -> &[ItemHandle] {
        &self.items
    }

    /// Most recent login refresh, with its state kept current by statuses.
    pub fn refresh(&self) -> Option<&RefreshMsg> {
        self.refresh.as_ref()
    }
}

impl ItemCallbackClient {
    pub(crate) fn register_login(&mut self, client: SharedClient, closure: Closure) -> OmmResult<ItemHandle> {
        let handle = self.next_handle();
        let login = LoginItem {
            ni_provider: self.ctx.role == Role::NiProvider,
        };
        let mut item = Item::new(handle, DomainType::LOGIN, client, closure, None, ItemKind::Login(login));
        item.stream_id = LOGIN_STREAM_ID;
        item.channel = self.ctx.channels.active();
        self.insert_item(item);
        self.login.items.push(handle);

        if self.login.refresh.is_some() {
            let delay = self.ctx.session.login_refresh_delay();
            self.schedule_task(handle, delay, TimeoutTask::LoginRefresh(handle));
        }
        Ok(handle)
    }

    /// Deliver the cached login refresh to a late registration.
    pub(crate) fn send_login_refresh(&mut self, handle: ItemHandle) {
        let Some(mut refresh) = self.login.refresh.clone() else {
            return;
        };
        refresh.stream_id = LOGIN_STREAM_ID;
        refresh.solicited = true;
        self.deliver(handle, Msg::Refresh(refresh), None);
    }

    /// Inbound message on the login stream.
    pub(crate) fn process_login_msg(&mut self, channel: ChannelId, msg: Msg) {
        match &msg {
            Msg::Refresh(refresh) => {
                self.login.refresh = Some(refresh.clone());
                self.login.refresh_received = true;
            }
            Msg::Status(status) => {
                if let (Some(state), Some(cached)) = (&status.state, self.login.refresh.as_mut()) {
                    cached.state = state.clone();
                }
            }
            _ => {}
        }
        if let Msg::Refresh(_) | Msg::Status(_) = &msg {
            info!("[login] {} on {channel}", msg.class());
        }

        let closes = closes_stream(&msg);
        self.fan_out_login(msg, Some(channel));
        if closes {
            self.remove_all_login_items();
        }
    }

    fn fan_out_login(&mut self, msg: Msg, channel: Option<ChannelId>) {
        if self.login.items.is_empty() {
            debug!("[login] no login item registered for {}", msg.class());
            return;
        }
        for handle in self.login.items.clone() {
            self.notify(handle, msg.clone(), channel);
        }
    }

    fn remove_all_login_items(&mut self) {
        for handle in std::mem::take(&mut self.login.items) {
            self.destroy_item(handle);
        }
    }

    /// Report a channel transition on the login stream.
    fn send_login_status(&mut self, channel: ChannelId, state: OmmState) {
        if let Some(cached) = self.login.refresh.as_mut() {
            cached.state = state.clone();
        }
        let status = StatusMsg {
            stream_id: LOGIN_STREAM_ID,
            domain_type: DomainType::LOGIN,
            key: MsgKey {
                name: self.ctx.login_request.key.name.clone(),
                name_type: self.ctx.login_request.key.name_type,
                ..MsgKey::default()
            },
            state: Some(state),
            ..StatusMsg::default()
        };
        self.fan_out_login(Msg::Status(status), Some(channel));
    }

    pub(crate) fn modify_login(&mut self, req: ReqMsg) -> OmmResult<()> {
        let mut login = req;
        login.stream_id = LOGIN_STREAM_ID;
        login.domain_type = DomainType::LOGIN;
        if login.key.name.is_none() {
            login.key.name = self.ctx.login_request.key.name.clone();
            login.key.name_type = self.ctx.login_request.key.name_type;
        }
        if login.payload.is_null() {
            login.payload = self.ctx.login_request.payload.clone();
        }
        self.ctx.login_request = login.clone();
        self.ctx.fan_out(OutboundMsg::Request(login), None, "modify login request")
    }

    pub(crate) fn post_login(&mut self, mut post: PostMsg) -> OmmResult<()> {
        post.stream_id = LOGIN_STREAM_ID;
        self.ctx.fan_out(OutboundMsg::Post(post), None, "submit PostMsg on login stream")
    }

    pub(crate) fn generic_login(&mut self, mut generic: GenericMsg) -> OmmResult<()> {
        generic.stream_id = LOGIN_STREAM_ID;
        self.ctx.fan_out(OutboundMsg::Generic(generic), None, "submit GenericMsg on login stream")
    }

    pub(crate) fn remove_login(&mut self, handle: ItemHandle) {
        self.login.items.retain(|h| *h != handle);
        self.destroy_item(handle);
    }

    /// Login state shared by all login items.
    pub fn login_state(&self) -> &LoginState {
        &self.login
    }

    // -----------------------------------------------------------------------
    // Channel transitions
    // -----------------------------------------------------------------------

    pub(crate) fn channel_up(&mut self, channel: ChannelId) {
        if !self.ctx.channels.add(channel) {
            debug!("[login] {channel} already in the login channel list");
        }
        let login = self.ctx.login_request.clone();
        if let Err(e) = self.ctx.submit(channel, OutboundMsg::Request(login), None, "send login request") {
            error!("[login] {e}");
        }
        if self.ctx.role == Role::Consumer {
            let directory = self.ctx.directory_request.clone();
            if let Err(e) = self.ctx.submit(channel, OutboundMsg::Request(directory), None, "send directory request") {
                error!("[directory] {e}");
            }
        }
    }

    pub(crate) fn channel_ready(&mut self, channel: ChannelId) {
        if self.ctx.channels.clear_reconnecting(channel) && self.login.refresh_received {
            info!("[login] {channel} recovered");
            let state = OmmState::new(StreamState::Open, DataState::Ok, StatusCode::None, "channel up");
            self.send_login_status(channel, state);
        }
    }

    pub(crate) fn channel_down_reconnecting(&mut self, channel: ChannelId) {
        if self.ctx.channels.mark_reconnecting(channel) && self.login.refresh_received {
            info!("[login] {channel} down, reconnecting");
            let state = OmmState::new(StreamState::Open, DataState::Suspect, StatusCode::None, "channel down");
            self.send_login_status(channel, state);
        }
    }

    pub(crate) fn channel_closed(&mut self, channel: ChannelId) {
        self.ctx.channels.remove(channel);
        if self.login.refresh_received {
            info!("[login] {channel} closed");
            let state = OmmState::new(StreamState::Closed, DataState::Suspect, StatusCode::None, "channel closed");
            self.send_login_status(channel, state);
        }
    }
}
