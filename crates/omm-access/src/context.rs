//! Per-session state shared by every item.
//!
//! One [`SessionContext`] exists per session. It owns the collaborators the
//! items call into: allocator, directory registry, timer queue, transport and
//! dictionary cache. Nothing here is global.

use ahash::AHashSet;
use omm_core::config::{AppConfig, SessionConfig};
use omm_core::error::{OmmError, OmmResult, UsageErrorCode};
use omm_core::types::{ReqMsg, Role};
use tracing::{debug, warn};

use crate::dictionary_cache::DictionaryCache;
use crate::directory::DirectoryRegistry;
use crate::item::ItemHandle;
use crate::stream_id::{DIRECTORY_STREAM_ID, LOGIN_STREAM_ID, StreamIdAllocator};
use crate::timeout::TimeoutQueue;
use crate::transport::{ChannelId, OutboundMsg, Transport};

/// Channels the session is logged in on, in the order they came up.
#[derive(Debug, Default)]
pub struct ChannelSet {
    login_channels: Vec<ChannelId>,
    reconnecting: AHashSet<ChannelId>,
    directory_suspect: AHashSet<ChannelId>,
}

impl ChannelSet {
    /// Add `channel` to the login channel list. Returns `false` if present.
    pub fn add(&mut self, channel: ChannelId) -> bool {
        if self.login_channels.contains(&channel) {
            return false;
        }
        self.login_channels.push(channel);
        true
    }

    pub fn remove(&mut self, channel: ChannelId) {
        self.login_channels.retain(|c| *c != channel);
        self.reconnecting.remove(&channel);
        self.directory_suspect.remove(&channel);
    }

    /// Take `channel` out of the login list and mark it reconnecting.
    /// Returns `true` on the first mark only.
    pub fn mark_reconnecting(&mut self, channel: ChannelId) -> bool {
        self.login_channels.retain(|c| *c != channel);
        self.reconnecting.insert(channel)
    }

    /// Clear the reconnecting mark. Returns whether it was set.
    pub fn clear_reconnecting(&mut self, channel: ChannelId) -> bool {
        self.reconnecting.remove(&channel)
    }

    pub fn set_directory_suspect(&mut self, channel: ChannelId, suspect: bool) {
        if suspect {
            self.directory_suspect.insert(channel);
        } else {
            self.directory_suspect.remove(&channel);
        }
    }

    /// Directory stream on `channel` last reported Open / Suspect.
    pub fn is_directory_suspect(&self, channel: ChannelId) -> bool {
        self.directory_suspect.contains(&channel)
    }

    pub fn login_channels(&self) -> &[ChannelId] {
        &self.login_channels
    }

    /// First channel still in the login list.
    pub fn active(&self) -> Option<ChannelId> {
        self.login_channels.first().copied()
    }
}

pub struct SessionContext {
    pub(crate) instance_name: String,
    pub(crate) role: Role,
    pub(crate) session: SessionConfig,
    pub(crate) login_request: ReqMsg,
    pub(crate) directory_request: ReqMsg,
    pub(crate) allocator: StreamIdAllocator,
    pub(crate) directories: DirectoryRegistry,
    pub(crate) timeouts: TimeoutQueue,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) dictionary: DictionaryCache,
    pub(crate) channels: ChannelSet,
}

impl SessionContext {
    pub fn new(config: &AppConfig, transport: Box<dyn Transport>) -> Self {
        let session = config.session();
        let role = session.effective_role();
        let dictionary = config.dictionary();
        Self {
            instance_name: session.effective_instance_name(),
            role,
            login_request: config.login().to_request().stream_id(LOGIN_STREAM_ID),
            directory_request: config
                .directory_request
                .clone()
                .unwrap_or_default()
                .to_request()
                .stream_id(DIRECTORY_STREAM_ID),
            allocator: StreamIdAllocator::new(role),
            directories: DirectoryRegistry::new(dictionary.effective_kind(), session.effective_service_count_hint()),
            timeouts: TimeoutQueue::new(),
            transport,
            dictionary: DictionaryCache::from_config(&dictionary),
            channels: ChannelSet::default(),
            session,
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn directories(&self) -> &DirectoryRegistry {
        &self.directories
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn dictionary(&self) -> &DictionaryCache {
        &self.dictionary
    }

    /// `text` suffixed with the instance name, as carried by usage errors.
    pub(crate) fn usage(&self, text: &str, code: UsageErrorCode) -> OmmError {
        OmmError::usage(format!("{text}Instance name='{}'.", self.instance_name), code)
    }

    /// Submit to the transport, mapping a failure to the usage error callers
    /// see.
    pub(crate) fn submit(
        &mut self,
        channel: ChannelId,
        msg: OutboundMsg,
        user: Option<ItemHandle>,
        what: &str,
    ) -> OmmResult<()> {
        self.transport.submit(channel, msg, user).map_err(|e| {
            tracing::error!("[{}] Internal error: submit failed for {what}: {e}", self.instance_name);
            OmmError::usage(
                format!("Failed to {what}. Reason: {}", e.text()),
                UsageErrorCode::FailureOperation,
            )
        })
    }

    /// Send `msg` on every login channel.
    pub(crate) fn fan_out(&mut self, msg: OutboundMsg, user: Option<ItemHandle>, what: &str) -> OmmResult<()> {
        let channels = self.channels.login_channels().to_vec();
        if channels.is_empty() {
            warn!("[{}] no active channel for {what}", self.instance_name);
            return Err(OmmError::usage(
                format!("Failed to {what}. Reason: No active channel"),
                UsageErrorCode::NoActiveChannel,
            ));
        }
        for channel in channels {
            debug!("[{}] {what} on {channel}", self.instance_name);
            self.submit(channel, msg.clone(), user, what)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("instance_name", &self.instance_name)
            .field("role", &self.role)
            .field("directories", &self.directories.len())
            .field("timeouts", &self.timeouts.len())
            .field("channels", &self.channels)
            .finish()
    }
}
