//! Item variants and their capability dispatch.
//!
//! An item is one application registration. Its variant decides what
//! `modify`, `close`, `submit` and `remove` mean:
//!
//! ```text
//! Single      one request, one stream
//! Batch       one request fanned into N Singles on a contiguous id block
//! Tunnel      one stream multiplexing Sub streams with their own id space
//! Sub         a stream inside a tunnel
//! Login       stream 1, one per registration, fanned out by the login client
//! Dictionary  RWFFld / RWFEnum, remote or served from the local cache
//! Directory   synthetic view of the directory registry
//! ```
//!
//! Variant behaviour lives in the submodules as `impl ItemCallbackClient`
//! blocks keyed by [`ItemHandle`]; this module matches on [`ItemKind`] and
//! forwards.

pub mod batch;
pub mod dictionary;
pub mod directory;
pub mod login;
pub mod single;
pub mod sub;
pub mod tunnel;

use omm_core::error::{OmmError, OmmResult, UsageErrorCode};
use omm_core::types::{DomainType, GenericMsg, PostMsg, ReqMsg};

use crate::callback::ItemCallbackClient;
use crate::client::{Closure, SharedClient};
use crate::closed_status::ClosedStatusInfo;
use crate::directory::DirectoryRef;
use crate::timeout::TimeoutHandle;
use crate::transport::ChannelId;

pub use batch::BatchItem;
pub use dictionary::DictionaryItem;
pub use directory::DirectoryItem;
pub use login::LoginItem;
pub use tunnel::{STARTING_SUB_STREAM_ID, SubStreamTable, TunnelItem};

/// Opaque handle of a registration. Never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemHandle(pub(crate) u64);

impl ItemHandle {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ItemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Variant tag, as reported to the application and in error texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    SingleItem,
    BatchItem,
    TunnelItem,
    SubItem,
    LoginItem,
    NiProviderLoginItem,
    DictionaryItem,
    DirectoryItem,
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SingleItem => "SingleItem",
            Self::BatchItem => "BatchItem",
            Self::TunnelItem => "TunnelItem",
            Self::SubItem => "SubItem",
            Self::LoginItem => "LoginItem",
            Self::NiProviderLoginItem => "NiProviderLoginItem",
            Self::DictionaryItem => "DictionaryItem",
            Self::DirectoryItem => "DirectoryItem",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum ItemKind {
    Single,
    Batch(BatchItem),
    Tunnel(TunnelItem),
    Sub,
    Login(LoginItem),
    Dictionary(DictionaryItem),
    Directory(DirectoryItem),
}

impl ItemKind {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Single => ItemType::SingleItem,
            Self::Batch(_) => ItemType::BatchItem,
            Self::Tunnel(_) => ItemType::TunnelItem,
            Self::Sub => ItemType::SubItem,
            Self::Login(l) if l.ni_provider => ItemType::NiProviderLoginItem,
            Self::Login(_) => ItemType::LoginItem,
            Self::Dictionary(_) => ItemType::DictionaryItem,
            Self::Directory(_) => ItemType::DirectoryItem,
        }
    }
}

/// One registration owned by the dispatcher.
pub struct Item {
    pub(crate) handle: ItemHandle,
    /// `0` until a stream id is assigned.
    pub(crate) stream_id: i32,
    pub(crate) domain_type: DomainType,
    pub(crate) client: SharedClient,
    pub(crate) closure: Closure,
    /// Batch or tunnel this item was opened under.
    pub(crate) parent: Option<ItemHandle>,
    pub(crate) directory: Option<DirectoryRef>,
    pub(crate) channel: Option<ChannelId>,
    /// Set at most once.
    pub(crate) closed_status: Option<ClosedStatusInfo>,
    /// Pending deferred task, cancelled when the item goes away.
    pub(crate) timeout: Option<TimeoutHandle>,
    pub(crate) kind: ItemKind,
}

impl Item {
    pub(crate) fn new(
        handle: ItemHandle,
        domain_type: DomainType,
        client: SharedClient,
        closure: Closure,
        parent: Option<ItemHandle>,
        kind: ItemKind,
    ) -> Self {
        Self {
            handle,
            stream_id: 0,
            domain_type,
            client,
            closure,
            parent,
            directory: None,
            channel: None,
            closed_status: None,
            timeout: None,
            kind,
        }
    }

    pub fn handle(&self) -> ItemHandle {
        self.handle
    }

    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    pub fn domain_type(&self) -> DomainType {
        self.domain_type
    }

    pub fn parent(&self) -> Option<ItemHandle> {
        self.parent
    }

    pub fn directory(&self) -> Option<DirectoryRef> {
        self.directory
    }

    pub fn item_type(&self) -> ItemType {
        self.kind.item_type()
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("handle", &self.handle)
            .field("type", &self.item_type())
            .field("stream_id", &self.stream_id)
            .field("domain_type", &self.domain_type)
            .field("parent", &self.parent)
            .field("channel", &self.channel)
            .field("closed_status", &self.closed_status.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Capability dispatch
// ---------------------------------------------------------------------------

impl ItemCallbackClient {
    fn item_type_of(&self, handle: ItemHandle) -> Option<ItemType> {
        self.items.get(&handle).map(Item::item_type)
    }

    /// Reissue `req` on the item's stream.
    pub(crate) fn item_modify(&mut self, handle: ItemHandle, req: ReqMsg) -> OmmResult<()> {
        match self.item_type_of(handle) {
            Some(ItemType::SingleItem) => self.modify_single(handle, req),
            Some(ItemType::BatchItem) => Err(self.ctx.usage(
                "Invalid attempt to modify batch stream. ",
                UsageErrorCode::InvalidOperation,
            )),
            Some(ItemType::TunnelItem) => Err(self.ctx.usage(
                "Invalid attempt to reissue tunnel stream using ReqMsg. ",
                UsageErrorCode::InvalidOperation,
            )),
            Some(ItemType::SubItem) => self.modify_sub(handle, req),
            Some(ItemType::LoginItem | ItemType::NiProviderLoginItem) => self.modify_login(req),
            Some(ItemType::DictionaryItem) => Err(self.ctx.usage(
                "Invalid attempt to modify dictionary stream. ",
                UsageErrorCode::InvalidOperation,
            )),
            Some(ItemType::DirectoryItem) => self.modify_directory(handle, req),
            None => Ok(()),
        }
    }

    /// Close the item's stream and remove it.
    pub(crate) fn item_close(&mut self, handle: ItemHandle) -> OmmResult<()> {
        match self.item_type_of(handle) {
            Some(ItemType::SingleItem) => self.close_single(handle),
            Some(ItemType::BatchItem) => Err(self.ctx.usage(
                "Invalid attempt to close batch stream. ",
                UsageErrorCode::InvalidOperation,
            )),
            Some(ItemType::TunnelItem) => self.close_tunnel(handle),
            Some(ItemType::SubItem) => self.close_sub(handle),
            Some(ItemType::DictionaryItem) => self.close_dictionary(handle),
            Some(ItemType::LoginItem | ItemType::NiProviderLoginItem | ItemType::DirectoryItem) => {
                self.item_remove(handle);
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub(crate) fn item_post(&mut self, handle: ItemHandle, post: PostMsg) -> OmmResult<()> {
        let rejected = |what: &str| format!("Invalid attempt to submit PostMsg on {what} stream. ");
        match self.item_type_of(handle) {
            Some(ItemType::SingleItem) => self.post_single(handle, post),
            Some(ItemType::SubItem) => self.post_sub(handle, post),
            Some(ItemType::LoginItem) => self.post_login(post),
            Some(ItemType::NiProviderLoginItem) => {
                tracing::debug!("[login] PostMsg is not supported on the NiProvider login stream; dropped");
                Ok(())
            }
            Some(ItemType::BatchItem) => Err(self.ctx.usage(&rejected("batch"), UsageErrorCode::InvalidOperation)),
            Some(ItemType::TunnelItem) => Err(self.ctx.usage(&rejected("tunnel"), UsageErrorCode::InvalidOperation)),
            Some(ItemType::DictionaryItem) => {
                Err(self.ctx.usage(&rejected("dictionary"), UsageErrorCode::InvalidOperation))
            }
            Some(ItemType::DirectoryItem) => {
                Err(self.ctx.usage(&rejected("directory"), UsageErrorCode::InvalidOperation))
            }
            None => Err(OmmError::invalid_handle(handle.0, "Attempt to use invalid Handle on submit( const PostMsg& ). ")),
        }
    }

    pub(crate) fn item_generic(&mut self, handle: ItemHandle, generic: GenericMsg) -> OmmResult<()> {
        let rejected = |what: &str| format!("Invalid attempt to submit GenericMsg on {what} stream. ");
        match self.item_type_of(handle) {
            Some(ItemType::SingleItem) => self.generic_single(handle, generic),
            Some(ItemType::SubItem) => self.generic_sub(handle, generic),
            Some(ItemType::LoginItem | ItemType::NiProviderLoginItem) => self.generic_login(generic),
            Some(ItemType::BatchItem) => Err(self.ctx.usage(&rejected("batch"), UsageErrorCode::InvalidOperation)),
            Some(ItemType::TunnelItem) => Err(self.ctx.usage(&rejected("tunnel"), UsageErrorCode::InvalidOperation)),
            Some(ItemType::DictionaryItem) => {
                Err(self.ctx.usage(&rejected("dictionary"), UsageErrorCode::InvalidOperation))
            }
            Some(ItemType::DirectoryItem) => {
                Err(self.ctx.usage(&rejected("directory"), UsageErrorCode::InvalidOperation))
            }
            None => Err(OmmError::invalid_handle(handle.0, "Attempt to use invalid Handle on submit( const GenericMsg& ). ")),
        }
    }

    /// End the item's lifecycle without telling the transport.
    ///
    /// A batch parent ignores this; it goes away when its last child does.
    /// Removing a handle twice is a no-op.
    pub(crate) fn item_remove(&mut self, handle: ItemHandle) {
        match self.item_type_of(handle) {
            Some(ItemType::SingleItem) => self.remove_single(handle),
            Some(ItemType::BatchItem) => {}
            Some(ItemType::TunnelItem) => self.remove_tunnel(handle),
            Some(ItemType::SubItem) => self.remove_sub(handle),
            Some(ItemType::LoginItem | ItemType::NiProviderLoginItem) => self.remove_login(handle),
            Some(ItemType::DictionaryItem) => self.remove_dictionary(handle),
            Some(ItemType::DirectoryItem) => {
                self.destroy_item(handle);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_names() {
        assert_eq!(ItemType::BatchItem.to_string(), "BatchItem");
        assert_eq!(ItemType::NiProviderLoginItem.to_string(), "NiProviderLoginItem");
        assert_eq!(ItemKind::Single.item_type(), ItemType::SingleItem);
        assert_eq!(ItemKind::Login(LoginItem { ni_provider: true }).item_type(), ItemType::NiProviderLoginItem);
        assert_eq!(ItemHandle(7).to_string(), "7");
    }
}
