//! Directory item: the application's view of the service directory.
//!
//! It never opens a stream of its own. The refresh is built from the
//! registry, and later registry changes are re-published as updates.

use std::time::Duration;

use omm_core::error::OmmResult;
use omm_core::types::{DomainType, Msg, MsgKey, OmmState, RefreshMsg, ReqMsg, UpdateMsg};
use serde_json::{Value, json};
use tracing::debug;

use crate::callback::ItemCallbackClient;
use crate::client::{Closure, SharedClient};
use crate::closed_status::ClosedStatusInfo;
use crate::directory::{Directory, DirectoryRef};
use crate::item::{Item, ItemHandle, ItemKind};
use crate::stream_id::DIRECTORY_STREAM_ID;
use crate::timeout::TimeoutTask;
use crate::transport::ChannelId;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryItem {
    service_name: Option<String>,
    service_id: Option<u16>,
    filter: Option<u32>,
}

impl DirectoryItem {
    fn from_request(req: &ReqMsg) -> Self {
        Self {
            service_name: req.service_name.clone(),
            service_id: req.key.service_id,
            filter: req.key.filter,
        }
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    pub fn service_id(&self) -> Option<u16> {
        self.service_id
    }

    /// No service filter, or the filter names this directory.
    pub fn matches(&self, directory: &Directory) -> bool {
        match (&self.service_name, self.service_id) {
            (Some(name), _) => directory.name() == name,
            (None, Some(id)) => directory.id() == id,
            (None, None) => true,
        }
    }
}

impl ItemCallbackClient {
    pub(crate) fn register_directory(
        &mut self,
        req: ReqMsg,
        client: SharedClient,
        closure: Closure,
    ) -> OmmResult<ItemHandle> {
        let handle = self.next_handle();
        let kind = ItemKind::Directory(DirectoryItem::from_request(&req));
        let mut item = Item::new(handle, DomainType::SOURCE, client, closure, None, kind);
        item.stream_id = DIRECTORY_STREAM_ID;
        self.insert_item(item);
        self.open_directory(handle, &req);
        Ok(handle)
    }

    /// Schedule the refresh, or the closed status if the filter names a
    /// service the registry does not know.
    fn open_directory(&mut self, handle: ItemHandle, req: &ReqMsg) {
        if req.has_service() {
            if let Err(text) = self.resolve_service(req.service_name.as_deref(), req.key.service_id) {
                debug!("[directory] handle {handle}: {text}");
                let info = ClosedStatusInfo::closed(DIRECTORY_STREAM_ID, req, text);
                self.schedule_closed_status(handle, info);
                return;
            }
        }
        self.schedule_task(handle, Duration::ZERO, TimeoutTask::DirectoryRefresh(handle));
    }

    pub(crate) fn send_directory_refresh(&mut self, handle: ItemHandle) {
        let Some(ItemKind::Directory(view)) = self.items.get(&handle).map(|i| &i.kind) else {
            return;
        };
        let services: Vec<Value> = self
            .ctx
            .directories
            .directories()
            .filter(|(_, d)| !d.is_deleted() && view.matches(d))
            .map(|(_, d)| directory_entry(d))
            .collect();
        let refresh = RefreshMsg {
            stream_id: DIRECTORY_STREAM_ID,
            domain_type: DomainType::SOURCE,
            key: view_key(view),
            state: OmmState::open_ok(""),
            complete: true,
            solicited: true,
            clear_cache: true,
            payload: json!({ "services": services }),
            ..RefreshMsg::default()
        };
        debug!("[directory] refresh for handle {handle} lists {} service(s)", services_len(&refresh));
        self.deliver(handle, Msg::Refresh(refresh), None);
    }

    /// Re-filter the view and send a fresh refresh.
    pub(crate) fn modify_directory(&mut self, handle: ItemHandle, req: ReqMsg) -> OmmResult<()> {
        match self.items.get_mut(&handle).map(|i| &mut i.kind) {
            Some(ItemKind::Directory(view)) => *view = DirectoryItem::from_request(&req),
            _ => return Ok(()),
        }
        self.open_directory(handle, &req);
        Ok(())
    }

    /// Publish changed directories to every directory item watching them.
    pub(crate) fn publish_directory_changes(&mut self, channel: ChannelId, changed: &[DirectoryRef]) {
        if changed.is_empty() {
            return;
        }
        let mut updates = Vec::new();
        for item in self.items.values() {
            let ItemKind::Directory(view) = &item.kind else {
                continue;
            };
            // Views still waiting for their refresh get the current registry then.
            if item.timeout.is_some() {
                continue;
            }
            let services: Vec<Value> = changed
                .iter()
                .filter_map(|r| self.ctx.directories.get(*r))
                .filter(|d| view.matches(d))
                .map(directory_entry)
                .collect();
            if services.is_empty() {
                continue;
            }
            let update = UpdateMsg {
                stream_id: DIRECTORY_STREAM_ID,
                domain_type: DomainType::SOURCE,
                key: view_key(view),
                payload: json!({ "services": services }),
                ..UpdateMsg::default()
            };
            updates.push((item.handle, update));
        }
        for (handle, update) in updates {
            self.notify(handle, Msg::Update(update), Some(channel));
        }
    }

    /// Directory view of `handle`, if it is a directory item.
    pub fn directory_view(&self, handle: ItemHandle) -> Option<&DirectoryItem> {
        match &self.items.get(&handle)?.kind {
            ItemKind::Directory(d) => Some(d),
            _ => None,
        }
    }
}

fn view_key(view: &DirectoryItem) -> MsgKey {
    MsgKey {
        service_id: view.service_id,
        filter: view.filter,
        ..MsgKey::default()
    }
}

fn directory_entry(directory: &Directory) -> Value {
    if directory.is_deleted() {
        return json!({ "service_id": directory.id(), "name": directory.name(), "action": "delete" });
    }
    json!({
        "service_id": directory.id(),
        "name": directory.name(),
        "action": "update",
        "info": serde_json::to_value(directory.info()).unwrap_or_default(),
        "state": serde_json::to_value(directory.state()).unwrap_or_default(),
    })
}

fn services_len(refresh: &RefreshMsg) -> usize {
    refresh.payload["services"].as_array().map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use omm_core::types::{ServiceInfo, ServiceState};

    use super::*;

    #[test]
    fn view_filter() {
        let d = Directory::new(5, ServiceInfo::named("DIRECT_FEED"), ServiceState::default(), ChannelId(1));
        assert!(DirectoryItem::default().matches(&d));
        assert!(DirectoryItem::from_request(&ReqMsg::new().service_name("DIRECT_FEED")).matches(&d));
        assert!(!DirectoryItem::from_request(&ReqMsg::new().service_name("OTHER")).matches(&d));
        assert!(DirectoryItem::from_request(&ReqMsg::new().service_id(5)).matches(&d));
        assert!(!DirectoryItem::from_request(&ReqMsg::new().service_id(6)).matches(&d));
    }

    #[test]
    fn live_entry_carries_info() {
        let d = Directory::new(5, ServiceInfo::named("DIRECT_FEED"), ServiceState::default(), ChannelId(1));
        let entry = directory_entry(&d);
        assert_eq!(entry["action"], "update");
        assert_eq!(entry["info"]["name"], "DIRECT_FEED");
        assert_eq!(entry["state"]["accepting_requests"], true);
    }
}
