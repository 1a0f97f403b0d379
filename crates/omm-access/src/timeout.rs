//! Deferred one-shot tasks serviced by the dispatch thread.
//!
//! Registration calls must return before any callback for the new handle
//! fires. Work that has to reach the application "later" (synthesized closed
//! status, the cached login refresh, locally encoded dictionary parts) is
//! queued here and executed by the same loop that drains transport events, so
//! it is strictly ordered with all other deliveries.
//!
//! Cancellation is explicit: [`TimeoutQueue::cancel`] drops a task by handle.
//! Cancelled entries are discarded lazily when they reach the front.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use ahash::AHashMap;

use crate::item::ItemHandle;

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutHandle(u64);

/// Work a timeout performs when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutTask {
    /// Deliver the item's stored [`ClosedStatusInfo`](crate::closed_status::ClosedStatusInfo).
    ItemStatus(ItemHandle),
    /// Deliver the cached login refresh to a late login registration.
    LoginRefresh(ItemHandle),
    /// Deliver the next locally encoded dictionary part.
    DictionaryPart(ItemHandle),
    /// Deliver the synthesized directory refresh.
    DirectoryRefresh(ItemHandle),
}

/// Single-threaded timer queue.
#[derive(Debug, Default)]
pub struct TimeoutQueue {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    tasks: AHashMap<u64, TimeoutTask>,
    next_id: u64,
}

impl TimeoutQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to fire `delay` from now.
    pub fn schedule(&mut self, delay: Duration, task: TimeoutTask) -> TimeoutHandle {
        self.schedule_at(Instant::now() + delay, task)
    }

    pub fn schedule_at(&mut self, deadline: Instant, task: TimeoutTask) -> TimeoutHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.heap.push(Reverse((deadline, id)));
        self.tasks.insert(id, task);
        TimeoutHandle(id)
    }

    /// Drop a pending task. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimeoutHandle) -> bool {
        self.tasks.remove(&handle.0).is_some()
    }

    pub fn is_pending(&self, handle: TimeoutHandle) -> bool {
        self.tasks.contains_key(&handle.0)
    }

    /// Earliest deadline of a live task.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Pop the next task due at or before `now`, in deadline then schedule order.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimeoutHandle, TimeoutTask)> {
        self.discard_cancelled();
        let Reverse((deadline, id)) = *self.heap.peek()?;
        if deadline > now {
            return None;
        }
        self.heap.pop();
        self.tasks.remove(&id).map(|task| (TimeoutHandle(id), task))
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.heap.peek() {
            if self.tasks.contains_key(id) {
                break;
            }
            self.heap.pop();
        }
    }
}
