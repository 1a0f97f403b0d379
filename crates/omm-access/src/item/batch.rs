//! Batch item: one request carrying N item names.
//!
//! The batch takes the first id of a contiguous block and child `i` takes
//! `batch + i + 1`:
//!
//! ```text
//! single_item_list: [batch, child 1, child 2, ..., child N]
//! stream ids:        s      s+1      s+2          s+N
//! ```
//!
//! The batch lives until its last child is removed. When the allocator is
//! in wraparound mode a contiguous block cannot be promised, so the names are
//! registered as independent singles that still count against the batch.

use omm_core::error::{OmmResult, UsageErrorCode};
use omm_core::types::{ReqMsg, Role};
use tracing::{debug, warn};

use crate::callback::ItemCallbackClient;
use crate::client::{Closure, SharedClient};
use crate::closed_status::ClosedStatusInfo;
use crate::item::{Item, ItemHandle, ItemKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// Index 0 is the batch itself.
    single_item_list: Vec<ItemHandle>,
    item_count: usize,
    split: bool,
}

impl BatchItem {
    fn new(handle: ItemHandle, split: bool) -> Self {
        Self {
            single_item_list: vec![handle],
            item_count: 0,
            split,
        }
    }

    fn add_single_item(&mut self, child: ItemHandle) {
        self.single_item_list.push(child);
        self.item_count = self.single_item_list.len() - 1;
    }

    pub fn single_item_list(&self) -> &[ItemHandle] {
        &self.single_item_list
    }

    /// Children not yet removed.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Registered as independent singles.
    pub fn is_split(&self) -> bool {
        self.split
    }

    /// Member owning `stream_id`, given the batch's own stream id.
    pub fn single_item(&self, batch_stream_id: i32, stream_id: i32) -> Option<ItemHandle> {
        if stream_id == batch_stream_id {
            return self.single_item_list.first().copied();
        }
        let offset = usize::try_from(i64::from(stream_id) - i64::from(batch_stream_id)).ok()?;
        self.single_item_list.get(offset).copied()
    }

    /// Returns `true` when the last child is gone.
    fn decrement_item_count(&mut self) -> bool {
        self.item_count = self.item_count.saturating_sub(1);
        self.item_count == 0
    }
}

impl ItemCallbackClient {
    pub(crate) fn register_batch(&mut self, req: ReqMsg, client: SharedClient, closure: Closure) -> OmmResult<ItemHandle> {
        let names = req.batch_item_names.clone();
        let split = self.ctx.role == Role::NiProvider || self.ctx.allocator.would_wrap(names.len());
        if split {
            return self.register_split_batch(req, names, client, closure);
        }

        let handle = self.next_handle();
        let mut batch = BatchItem::new(handle, false);
        let mut children = Vec::with_capacity(names.len());
        for name in &names {
            let child = self.next_handle();
            batch.add_single_item(child);
            children.push((child, child_request(&req, name)));
        }
        self.insert_item(Item::new(handle, req.domain_type, client.clone(), closure.clone(), None, ItemKind::Batch(batch)));
        for (child, _) in &children {
            self.insert_item(Item::new(*child, req.domain_type, client.clone(), closure.clone(), Some(handle), ItemKind::Single));
        }

        match self.resolve_service(req.service_name.as_deref(), req.key.service_id) {
            Ok((directory, channel)) => {
                self.attach_directory(handle, directory, channel);
                for (child, _) in &children {
                    self.attach_directory(*child, directory, channel);
                }
                if let Err(e) = self.open_batch(handle, req, &children) {
                    for (child, _) in &children {
                        self.destroy_item(*child);
                    }
                    self.destroy_item(handle);
                    return Err(e);
                }
            }
            Err(text) => {
                debug!("[batch] handle {handle}: {text}");
                for (child, child_req) in children {
                    let info = ClosedStatusInfo::closed(0, &child_req, text.clone());
                    self.schedule_closed_status(child, info);
                }
            }
        }
        Ok(handle)
    }

    /// Reserve the id block, index every member, and send the batch request.
    fn open_batch(&mut self, handle: ItemHandle, req: ReqMsg, children: &[(ItemHandle, ReqMsg)]) -> OmmResult<()> {
        let first = self.allocate_stream_id(children.len())?;
        self.index_stream(first, handle);
        for (i, (child, _)) in children.iter().enumerate() {
            self.index_stream(first + i as i32 + 1, *child);
        }
        self.submit_request(handle, req, children.len())?;
        debug!("[batch] handle {handle} opened {} items from stream {first}", children.len());
        Ok(())
    }

    fn register_split_batch(
        &mut self,
        req: ReqMsg,
        names: Vec<String>,
        client: SharedClient,
        closure: Closure,
    ) -> OmmResult<ItemHandle> {
        debug!("[batch] splitting batch of {} into single requests", names.len());
        let handle = self.next_handle();
        self.insert_item(Item::new(handle, req.domain_type, client.clone(), closure.clone(), None, ItemKind::Batch(BatchItem::new(handle, true))));
        // Queued ahead of any child status so the parent hears first.
        self.schedule_closed_status(handle, ClosedStatusInfo::batch_acknowledged(0, &req));

        let mut opened = Vec::with_capacity(names.len());
        for name in &names {
            let child = self.next_handle();
            self.insert_item(Item::new(child, req.domain_type, client.clone(), closure.clone(), Some(handle), ItemKind::Single));
            if let Some(ItemKind::Batch(batch)) = self.items.get_mut(&handle).map(|i| &mut i.kind) {
                batch.add_single_item(child);
            }
            opened.push(child);
            if let Err(e) = self.open_single(child, child_request(&req, name)) {
                warn!("[batch] split request for '{name}' failed: {e}");
                for child in opened {
                    self.destroy_item(child);
                }
                self.destroy_item(handle);
                return Err(self.ctx.usage(
                    "Failed to split a batch request into single item requests on registerClient(). ",
                    UsageErrorCode::InternalError,
                ));
            }
        }
        Ok(handle)
    }

    /// Release one child slot; the batch goes away with the last one.
    pub(crate) fn decrement_item_count(&mut self, parent: ItemHandle) {
        let Some(ItemKind::Batch(batch)) = self.items.get_mut(&parent).map(|i| &mut i.kind) else {
            return;
        };
        if !batch.decrement_item_count() {
            return;
        }
        debug!("[batch] last item of batch {parent} removed");
        let ack_pending = self
            .items
            .get(&parent)
            .is_some_and(|i| i.timeout.is_some() && i.closed_status.as_ref().is_some_and(|c| !c.closes_item()));
        if ack_pending {
            self.send_item_status(parent);
        }
        self.destroy_item(parent);
    }

    /// Batch bookkeeping for `handle`, if it is a batch.
    pub fn batch(&self, handle: ItemHandle) -> Option<&BatchItem> {
        match &self.items.get(&handle)?.kind {
            ItemKind::Batch(b) => Some(b),
            _ => None,
        }
    }
}

fn child_request(req: &ReqMsg, name: &str) -> ReqMsg {
    let mut child = req.clone();
    child.batch_item_names.clear();
    child.key.name = Some(name.to_string());
    child.stream_id = 0;
    child
}
