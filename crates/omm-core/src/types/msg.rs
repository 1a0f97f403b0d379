//! Decoded message envelopes exchanged between the application, the access
//! layer, and the transport.
//!
//! ```text
//! application ──ReqMsg/PostMsg/GenericMsg──► access layer ──OutboundMsg──► transport
//! application ◄──callbacks── access layer ◄──Msg (Refresh/Update/Status/Generic/Ack)── transport
//! ```
//!
//! A `stream_id` of `0` on an outbound request means "not yet assigned".

use serde::{Deserialize, Serialize};

use super::enums::{DomainType, MsgClass};
use super::state::{OmmState, Qos};

/// Decoded payload. The core passes it through untouched.
pub type Payload = serde_json::Value;

// ---------------------------------------------------------------------------
// MsgKey
// ---------------------------------------------------------------------------

/// Identifies the item a message refers to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MsgKey {
    pub name: Option<String>,
    pub name_type: Option<u8>,
    pub service_id: Option<u16>,
    pub filter: Option<u32>,
    pub identifier: Option<i32>,
}

impl MsgKey {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Outbound application messages
// ---------------------------------------------------------------------------

/// Item request (open or reissue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReqMsg {
    pub stream_id: i32,
    pub domain_type: DomainType,
    pub key: MsgKey,
    /// Service name. Resolved by the access layer, never sent as is.
    pub service_name: Option<String>,
    pub qos: Option<Qos>,
    pub worst_qos: Option<Qos>,
    /// Non-empty for batch requests.
    pub batch_item_names: Vec<String>,
    pub interest_after_refresh: bool,
    pub private_stream: bool,
    pub pause: bool,
    pub no_refresh: bool,
    pub priority: Option<(u8, u16)>,
    pub payload: Payload,
}

impl Default for ReqMsg {
    fn default() -> Self {
        Self {
            stream_id: 0,
            domain_type: DomainType::MARKET_PRICE,
            key: MsgKey::default(),
            service_name: None,
            qos: None,
            worst_qos: None,
            batch_item_names: Vec::new(),
            interest_after_refresh: true,
            private_stream: false,
            pause: false,
            no_refresh: false,
            priority: None,
            payload: Payload::Null,
        }
    }
}

impl ReqMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.key.name = Some(name.into());
        self
    }

    pub fn name_type(mut self, name_type: u8) -> Self {
        self.key.name_type = Some(name_type);
        self
    }

    pub fn service_name(mut self, service: impl Into<String>) -> Self {
        self.service_name = Some(service.into());
        self
    }

    pub fn service_id(mut self, id: u16) -> Self {
        self.key.service_id = Some(id);
        self
    }

    pub fn filter(mut self, filter: u32) -> Self {
        self.key.filter = Some(filter);
        self
    }

    pub fn domain_type(mut self, domain: DomainType) -> Self {
        self.domain_type = domain;
        self
    }

    pub fn qos(mut self, qos: Qos) -> Self {
        self.qos = Some(qos);
        self
    }

    pub fn interest_after_refresh(mut self, streaming: bool) -> Self {
        self.interest_after_refresh = streaming;
        self
    }

    pub fn private_stream(mut self, private: bool) -> Self {
        self.private_stream = private;
        self
    }

    pub fn pause(mut self, pause: bool) -> Self {
        self.pause = pause;
        self
    }

    pub fn stream_id(mut self, stream_id: i32) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Turn this into a batch request over `names`.
    pub fn batch<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.batch_item_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_batch(&self) -> bool {
        !self.batch_item_names.is_empty()
    }

    pub fn has_service(&self) -> bool {
        self.service_name.is_some() || self.key.service_id.is_some()
    }
}

/// Contribution posted on an open stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostMsg {
    pub stream_id: i32,
    pub domain_type: DomainType,
    pub key: MsgKey,
    pub service_name: Option<String>,
    pub post_id: Option<u32>,
    pub solicit_ack: bool,
    pub complete: bool,
    pub payload: Payload,
}

/// Bidirectional, non-caching message on an open stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericMsg {
    pub stream_id: i32,
    pub domain_type: DomainType,
    pub key: MsgKey,
    pub complete: bool,
    pub part_num: Option<u16>,
    pub payload: Payload,
}

impl GenericMsg {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            key: MsgKey::named(name),
            complete: true,
            ..Self::default()
        }
    }
}

/// Close request sent to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CloseMsg {
    pub stream_id: i32,
    pub domain_type: DomainType,
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// Image (full or partial) of an item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshMsg {
    pub stream_id: i32,
    pub domain_type: DomainType,
    pub key: MsgKey,
    pub state: OmmState,
    pub complete: bool,
    pub solicited: bool,
    pub clear_cache: bool,
    pub private_stream: bool,
    pub qos: Option<Qos>,
    pub part_num: Option<u16>,
    pub service_name: Option<String>,
    pub payload: Payload,
}

/// Change to a previously delivered image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateMsg {
    pub stream_id: i32,
    pub domain_type: DomainType,
    pub key: MsgKey,
    pub update_type_num: u8,
    pub service_name: Option<String>,
    pub payload: Payload,
}

/// State change of a stream. `state` is absent on pure informational status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusMsg {
    pub stream_id: i32,
    pub domain_type: DomainType,
    pub key: MsgKey,
    pub state: Option<OmmState>,
    pub private_stream: bool,
    pub service_name: Option<String>,
    pub payload: Payload,
}

/// Acknowledgement of a [`PostMsg`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AckMsg {
    pub stream_id: i32,
    pub domain_type: DomainType,
    pub ack_id: u32,
    pub nack_code: Option<u8>,
    pub text: Option<String>,
    pub service_name: Option<String>,
}

/// Any decoded message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Msg {
    Refresh(RefreshMsg),
    Update(UpdateMsg),
    Status(StatusMsg),
    Generic(GenericMsg),
    Ack(AckMsg),
    Request(ReqMsg),
    Post(PostMsg),
}

impl Msg {
    pub fn class(&self) -> MsgClass {
        match self {
            Self::Refresh(_) => MsgClass::Refresh,
            Self::Update(_) => MsgClass::Update,
            Self::Status(_) => MsgClass::Status,
            Self::Generic(_) => MsgClass::Generic,
            Self::Ack(_) => MsgClass::Ack,
            Self::Request(_) => MsgClass::Request,
            Self::Post(_) => MsgClass::Post,
        }
    }

    pub fn stream_id(&self) -> i32 {
        match self {
            Self::Refresh(m) => m.stream_id,
            Self::Update(m) => m.stream_id,
            Self::Status(m) => m.stream_id,
            Self::Generic(m) => m.stream_id,
            Self::Ack(m) => m.stream_id,
            Self::Request(m) => m.stream_id,
            Self::Post(m) => m.stream_id,
        }
    }

    pub fn domain_type(&self) -> DomainType {
        match self {
            Self::Refresh(m) => m.domain_type,
            Self::Update(m) => m.domain_type,
            Self::Status(m) => m.domain_type,
            Self::Generic(m) => m.domain_type,
            Self::Ack(m) => m.domain_type,
            Self::Request(m) => m.domain_type,
            Self::Post(m) => m.domain_type,
        }
    }

    /// Overwrite the service name on classes that carry one.
    pub fn set_service_name(&mut self, name: Option<String>) {
        match self {
            Self::Refresh(m) => m.service_name = name,
            Self::Update(m) => m.service_name = name,
            Self::Status(m) => m.service_name = name,
            Self::Ack(m) => m.service_name = name,
            Self::Generic(_) | Self::Request(_) | Self::Post(_) => {}
        }
    }
}
