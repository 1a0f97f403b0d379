//! Service directory registry.
//!
//! Holds one [`Directory`] per advertised service and keeps two O(1) indexes
//! (by service id, by service name) plus a per-channel collection in sync.
//!
//! Deleted services are tombstoned rather than dropped so items that resolved
//! against them keep a valid [`DirectoryRef`]. A later Add carrying the same
//! name revives the tombstoned slot:
//!
//! ```text
//! Add(id=5,"FEED") ──► slot 0 live
//! Delete(5)        ──► slot 0 tombstoned
//! Add(id=9,"FEED") ──► slot 0 live again, id index 5 → 9, channel moved if changed
//! ```

use ahash::AHashMap;
use omm_core::types::{DictionaryKind, ServiceAction, ServiceInfo, ServiceState, ServiceUpdate};
use tracing::{debug, error, warn};

use crate::transport::ChannelId;

/// Stable reference to a directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectoryRef(usize);

/// One advertised service on one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    id: u16,
    name: String,
    info: ServiceInfo,
    state: ServiceState,
    channel: ChannelId,
    deleted: bool,
    dictionary_requested: bool,
}

impl Directory {
    pub fn new(id: u16, info: ServiceInfo, state: ServiceState, channel: ChannelId) -> Self {
        Self {
            id,
            name: info.name.clone(),
            info,
            state,
            channel,
            deleted: false,
            dictionary_requested: false,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn accepting_requests(&self) -> bool {
        self.state.accepting_requests
    }

    pub fn is_up(&self) -> bool {
        self.state.up
    }
}

/// What an applied [`ServiceUpdate`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryChangeKind {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryChange {
    pub directory: DirectoryRef,
    pub service_id: u16,
    pub kind: DirectoryChangeKind,
    /// The service just became eligible for dictionary download.
    pub download_dictionary: bool,
}

/// Registry of directories for a session.
#[derive(Debug, Default)]
pub struct DirectoryRegistry {
    slots: Vec<Option<Directory>>,
    by_id: AHashMap<u16, usize>,
    by_name: AHashMap<String, usize>,
    by_channel: AHashMap<ChannelId, Vec<usize>>,
    dictionary_kind: DictionaryKind,
}

impl DirectoryRegistry {
    pub fn new(dictionary_kind: DictionaryKind, capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            by_id: AHashMap::with_capacity(capacity),
            by_name: AHashMap::with_capacity(capacity),
            by_channel: AHashMap::new(),
            dictionary_kind,
        }
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Live directory by service name.
    pub fn directory_by_name(&self, name: &str) -> Option<(DirectoryRef, &Directory)> {
        let slot = *self.by_name.get(name)?;
        self.live(slot)
    }

    /// Live directory by service id.
    pub fn directory_by_id(&self, id: u16) -> Option<(DirectoryRef, &Directory)> {
        let slot = *self.by_id.get(&id)?;
        self.live(slot)
    }

    /// Directory behind a reference, tombstoned or not.
    pub fn get(&self, r: DirectoryRef) -> Option<&Directory> {
        self.slots.get(r.0).and_then(Option::as_ref)
    }

    /// Live directories in insertion order.
    pub fn directories(&self) -> impl Iterator<Item = (DirectoryRef, &Directory)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.as_ref().filter(|d| !d.deleted).map(|d| (DirectoryRef(i), d)))
    }

    /// Live directories owned by `channel`.
    pub fn directories_on(&self, channel: ChannelId) -> Vec<DirectoryRef> {
        self.by_channel
            .get(&channel)
            .map(|slots| slots.iter().copied().filter(|&s| self.live(s).is_some()).map(DirectoryRef).collect())
            .unwrap_or_default()
    }

    pub fn dictionary_kind(&self) -> DictionaryKind {
        self.dictionary_kind
    }

    /// Number of live directories.
    pub fn len(&self) -> usize {
        self.directories().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, slot: usize) -> Option<(DirectoryRef, &Directory)> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .filter(|d| !d.deleted)
            .map(|d| (DirectoryRef(slot), d))
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Insert a directory into the list, both indexes, and its channel's
    /// collection.
    pub fn add_directory(&mut self, directory: Directory) -> DirectoryRef {
        let slot = self.slots.len();
        self.by_id.insert(directory.id, slot);
        self.by_name.insert(directory.name.clone(), slot);
        self.by_channel.entry(directory.channel).or_default().push(slot);
        self.slots.push(Some(directory));
        DirectoryRef(slot)
    }

    /// Remove a directory from every index. References to it resolve to `None`
    /// afterwards.
    pub fn remove_directory(&mut self, id: u16) -> Option<Directory> {
        let slot = self.by_id.remove(&id)?;
        let directory = self.slots.get_mut(slot)?.take()?;
        if self.by_name.get(&directory.name) == Some(&slot) {
            self.by_name.remove(&directory.name);
        }
        if let Some(list) = self.by_channel.get_mut(&directory.channel) {
            list.retain(|&s| s != slot);
        }
        Some(directory)
    }

    /// Apply one decoded directory entry received on `channel`.
    pub fn apply(&mut self, channel: ChannelId, update: ServiceUpdate) -> Option<DirectoryChange> {
        match update.action {
            ServiceAction::Add => self.apply_add(channel, update),
            ServiceAction::Update => self.apply_update(update),
            ServiceAction::Delete => self.apply_delete(update.service_id),
        }
    }

    /// Tombstone every directory owned by `channel`.
    pub fn channel_down(&mut self, channel: ChannelId) -> Vec<DirectoryRef> {
        let slots = self.by_channel.get(&channel).cloned().unwrap_or_default();
        let mut lost = Vec::new();
        for slot in slots {
            if let Some(Some(d)) = self.slots.get_mut(slot) {
                if !d.deleted {
                    d.deleted = true;
                    lost.push(DirectoryRef(slot));
                }
            }
        }
        lost
    }

    fn apply_add(&mut self, channel: ChannelId, update: ServiceUpdate) -> Option<DirectoryChange> {
        let Some(info) = update.info else {
            error!("[directory] Received service with Add action but no Service Info (service id {})", update.service_id);
            return None;
        };
        let state = update.state.unwrap_or_default();
        let id = update.service_id;

        // A live service keeps its name; a tombstoned one gives up the id.
        if let Some(&other) = self.by_id.get(&id) {
            if let Some(existing) = self.slots[other].as_ref().filter(|d| d.name != info.name) {
                if !existing.deleted {
                    error!(
                        "[directory] Received Add action for service '{}' (id {id}) attempting to change service name to {}",
                        existing.name, info.name
                    );
                    return None;
                }
                warn!("[directory] service id {id} re-added under name '{}'", info.name);
                self.by_id.remove(&id);
            }
        }

        let slot = match self.by_name.get(&info.name).copied() {
            Some(slot) => {
                self.reuse_slot(slot, id, info, state, channel);
                slot
            }
            None => {
                let r = self.add_directory(Directory::new(id, info, state, channel));
                debug!("[directory] added service '{}' (id {id}) on {channel}", self.slots[r.0].as_ref().map_or("", |d| d.name()));
                r.0
            }
        };

        let download_dictionary = self.check_dictionary(slot);
        Some(DirectoryChange {
            directory: DirectoryRef(slot),
            service_id: id,
            kind: DirectoryChangeKind::Added,
            download_dictionary,
        })
    }

    fn reuse_slot(&mut self, slot: usize, id: u16, info: ServiceInfo, state: ServiceState, channel: ChannelId) {
        let Some(directory) = self.slots[slot].as_mut() else {
            return;
        };
        let old_id = directory.id;
        let old_channel = directory.channel;

        directory.info = info;
        directory.state = state;
        if directory.deleted {
            directory.dictionary_requested = false;
        }
        directory.deleted = false;
        directory.channel = channel;
        directory.id = id;

        if old_channel != channel {
            if let Some(list) = self.by_channel.get_mut(&old_channel) {
                list.retain(|&s| s != slot);
            }
            self.by_channel.entry(channel).or_default().push(slot);
        }

        if old_id != id && self.by_id.get(&old_id) == Some(&slot) {
            self.by_id.remove(&old_id);
        }
        self.by_id.insert(id, slot);

        debug!("[directory] reused slot for service '{}' (id {old_id} -> {id}) on {channel}", self.slots[slot].as_ref().map_or("", |d| d.name()));
    }

    fn apply_update(&mut self, update: ServiceUpdate) -> Option<DirectoryChange> {
        let id = update.service_id;
        let Some(slot) = self.by_id.get(&id).copied().filter(|&s| self.live(s).is_some()) else {
            error!("[directory] Received Update action for unknown service with service id {id}");
            return None;
        };
        let directory = self.slots[slot].as_mut()?;

        if let Some(info) = &update.info {
            if info.name != directory.name {
                error!(
                    "[directory] Received Update action for service '{}' (id {id}) attempting to change service name to {}",
                    directory.name, info.name
                );
                return None;
            }
        }
        if let Some(info) = update.info {
            directory.info = info;
        }
        if let Some(state) = update.state {
            directory.state = state;
        }

        let download_dictionary = self.check_dictionary(slot);
        Some(DirectoryChange {
            directory: DirectoryRef(slot),
            service_id: id,
            kind: DirectoryChangeKind::Updated,
            download_dictionary,
        })
    }

    fn apply_delete(&mut self, id: u16) -> Option<DirectoryChange> {
        let Some(slot) = self.by_id.get(&id).copied().filter(|&s| self.live(s).is_some()) else {
            error!("[directory] Received Delete action for unknown service with service id {id}");
            return None;
        };
        let directory = self.slots[slot].as_mut()?;
        directory.deleted = true;
        debug!("[directory] deleted service '{}' (id {id})", directory.name);
        Some(DirectoryChange {
            directory: DirectoryRef(slot),
            service_id: id,
            kind: DirectoryChangeKind::Deleted,
            download_dictionary: false,
        })
    }

    /// Flag the dictionary download once per acceptance of the service.
    fn check_dictionary(&mut self, slot: usize) -> bool {
        let kind = self.dictionary_kind;
        let Some(directory) = self.slots[slot].as_mut() else {
            return false;
        };
        let eligible = kind == DictionaryKind::File || (directory.state.accepting_requests && directory.state.up);
        if eligible && !directory.dictionary_requested {
            directory.dictionary_requested = true;
            true
        } else {
            false
        }
    }
}
