//! Dictionary item.
//!
//! A request that names a service is an ordinary item stream. A request
//! without one is served from the session's [`DictionaryCache`] on the
//! reserved stream (3 field, 4 enum), one part per timer tick.
//!
//! [`DictionaryCache`]: crate::dictionary_cache::DictionaryCache

use omm_core::error::{OmmResult, UsageErrorCode};
use omm_core::types::{
    DataState, DomainType, Msg, MsgKey, OmmState, RefreshMsg, ReqMsg, StatusCode, StatusMsg, StreamState, name_type,
};
use tracing::{debug, warn};

use crate::callback::ItemCallbackClient;
use crate::client::{Closure, SharedClient};
use crate::dictionary_cache::DictionaryName;
use crate::item::{Item, ItemHandle, ItemKind};
use crate::stream_id::{ENUM_DICTIONARY_STREAM_ID, FIELD_DICTIONARY_STREAM_ID};
use crate::timeout::TimeoutTask;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryItem {
    name: String,
    filter: Option<u32>,
    local: Option<LocalDictionary>,
}

/// Progress of a dictionary served from the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocalDictionary {
    dictionary: DictionaryName,
    part_num: u16,
    streaming: bool,
}

impl DictionaryItem {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Served from the local cache rather than a provider.
    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }
}

impl ItemCallbackClient {
    pub(crate) fn register_dictionary(
        &mut self,
        req: ReqMsg,
        client: SharedClient,
        closure: Closure,
    ) -> OmmResult<ItemHandle> {
        if let Some(nt) = req.key.name_type {
            if nt != name_type::UNSPECIFIED && nt != name_type::RIC {
                return Err(self.ctx.usage(
                    &format!("Invalid ReqMsg's name type : {nt}. "),
                    UsageErrorCode::InvalidArgument,
                ));
            }
        }
        let Some(name) = req.key.name.clone() else {
            return Err(self.ctx.usage("ReqMsg's name is not defined. ", UsageErrorCode::InvalidArgument));
        };
        let Some(dictionary) = DictionaryName::parse(&name) else {
            return Err(self.ctx.usage(
                &format!(
                    "Invalid ReqMsg's name : {name}\nReqMsg's name must be \"RWFFld\" or \"RWFEnum\" for MMT_DICTIONARY domain type. "
                ),
                UsageErrorCode::InvalidArgument,
            ));
        };

        let local = (!req.has_service()).then_some(LocalDictionary {
            dictionary,
            part_num: 0,
            streaming: req.interest_after_refresh,
        });
        let kind = ItemKind::Dictionary(DictionaryItem {
            name,
            filter: req.key.filter,
            local,
        });
        let handle = self.next_handle();
        self.insert_item(Item::new(handle, DomainType::DICTIONARY, client, closure, None, kind));

        if local.is_none() {
            if let Err(e) = self.open_single(handle, req) {
                self.item_remove(handle);
                return Err(e);
            }
            return Ok(handle);
        }

        let stream_id = match dictionary {
            DictionaryName::Field => FIELD_DICTIONARY_STREAM_ID,
            DictionaryName::Enum => ENUM_DICTIONARY_STREAM_ID,
        };
        if let Some(item) = self.items.get_mut(&handle) {
            item.stream_id = stream_id;
        }
        let delay = self.ctx.session.dictionary_part_delay();
        self.schedule_task(handle, delay, TimeoutTask::DictionaryPart(handle));
        debug!("[dictionary] handle {handle} serving {} locally on stream {stream_id}", dictionary.as_str());
        Ok(handle)
    }

    /// Deliver the next locally encoded part and re-arm until complete.
    pub(crate) fn send_dictionary_part(&mut self, handle: ItemHandle) {
        let Some(item) = self.items.get(&handle) else {
            return;
        };
        let ItemKind::Dictionary(DictionaryItem {
            name,
            filter,
            local: Some(local),
        }) = &item.kind
        else {
            return;
        };
        let (stream_id, local, key) = (
            item.stream_id,
            *local,
            MsgKey {
                name: Some(name.clone()),
                filter: *filter,
                ..MsgKey::default()
            },
        );

        if !self.ctx.dictionary.is_loaded() {
            warn!("[dictionary] local dictionary requested by handle {handle} is not loaded");
            let state = OmmState::new(
                StreamState::ClosedRecover,
                DataState::Suspect,
                StatusCode::Error,
                "Data dictionary is not ready to provide.",
            );
            self.deliver(handle, dictionary_status(stream_id, key, state), None);
            return;
        }

        let part_size = self.ctx.session.effective_dictionary_part_size();
        let Some(part) = self.ctx.dictionary.part(local.dictionary, local.part_num, part_size) else {
            let state = OmmState::new(
                StreamState::Closed,
                DataState::Suspect,
                StatusCode::Error,
                "Failed to provide data dictionary: Internal error.",
            );
            self.deliver(handle, dictionary_status(stream_id, key, state), None);
            return;
        };

        let stream_state = if local.streaming {
            StreamState::Open
        } else {
            StreamState::NonStreaming
        };
        let refresh = RefreshMsg {
            stream_id,
            domain_type: DomainType::DICTIONARY,
            key,
            state: OmmState::new(stream_state, DataState::Ok, StatusCode::None, ""),
            complete: part.complete,
            solicited: true,
            clear_cache: part.part_num == 0,
            part_num: Some(part.part_num),
            payload: part.payload,
            ..RefreshMsg::default()
        };
        self.deliver(handle, Msg::Refresh(refresh), None);

        if part.complete {
            return;
        }
        if let Some(ItemKind::Dictionary(DictionaryItem { local: Some(l), .. })) =
            self.items.get_mut(&handle).map(|i| &mut i.kind)
        {
            l.part_num += 1;
        }
        let delay = self.ctx.session.dictionary_part_delay();
        self.schedule_task(handle, delay, TimeoutTask::DictionaryPart(handle));
    }

    pub(crate) fn close_dictionary(&mut self, handle: ItemHandle) -> OmmResult<()> {
        match self.dictionary(handle) {
            Some(d) if d.is_local() => {
                self.item_remove(handle);
                Ok(())
            }
            Some(_) => self.close_single(handle),
            None => Ok(()),
        }
    }

    pub(crate) fn remove_dictionary(&mut self, handle: ItemHandle) {
        self.destroy_item(handle);
    }

    /// Dictionary bookkeeping for `handle`, if it is a dictionary item.
    pub fn dictionary(&self, handle: ItemHandle) -> Option<&DictionaryItem> {
        match &self.items.get(&handle)?.kind {
            ItemKind::Dictionary(d) => Some(d),
            _ => None,
        }
    }
}

fn dictionary_status(stream_id: i32, key: MsgKey, state: OmmState) -> Msg {
    Msg::Status(StatusMsg {
        stream_id,
        domain_type: DomainType::DICTIONARY,
        key,
        state: Some(state),
        ..StatusMsg::default()
    })
}
