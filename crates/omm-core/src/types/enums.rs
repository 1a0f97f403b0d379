//! Enumerations used throughout the OMM access layer.
//!
//! Discriminant values follow the RDM/RWF numbering so they can be logged and
//! compared against provider-side traces.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// RDM message-model (domain) type.
///
/// Domains are an open set on the wire, so this is a newtype over `u8` with
/// constants for the well-known models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainType(pub u8);

impl DomainType {
    pub const LOGIN: Self = Self(1);
    pub const SOURCE: Self = Self(4);
    pub const DICTIONARY: Self = Self(5);
    pub const MARKET_PRICE: Self = Self(6);
    pub const MARKET_BY_ORDER: Self = Self(7);
    pub const MARKET_BY_PRICE: Self = Self(8);
    pub const MARKET_MAKER: Self = Self(9);
    pub const SYMBOL_LIST: Self = Self(10);
    pub const SYSTEM: Self = Self(127);

    /// `true` for login, source directory, and dictionary.
    pub fn is_admin(&self) -> bool {
        matches!(*self, Self::LOGIN | Self::SOURCE | Self::DICTIONARY)
    }
}

impl Default for DomainType {
    fn default() -> Self {
        Self::MARKET_PRICE
    }
}

impl std::fmt::Display for DomainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::LOGIN => write!(f, "Login"),
            Self::SOURCE => write!(f, "Source"),
            Self::DICTIONARY => write!(f, "Dictionary"),
            Self::MARKET_PRICE => write!(f, "MarketPrice"),
            Self::MARKET_BY_ORDER => write!(f, "MarketByOrder"),
            Self::MARKET_BY_PRICE => write!(f, "MarketByPrice"),
            Self::MARKET_MAKER => write!(f, "MarketMaker"),
            Self::SYMBOL_LIST => write!(f, "SymbolList"),
            Self::SYSTEM => write!(f, "System"),
            Self(other) => write!(f, "Domain({other})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Message classes
// ---------------------------------------------------------------------------

/// Message class of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgClass {
    Request,
    Refresh,
    Update,
    Status,
    Generic,
    Post,
    Ack,
    Close,
}

impl std::fmt::Display for MsgClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Request => "ReqMsg",
            Self::Refresh => "RefreshMsg",
            Self::Update => "UpdateMsg",
            Self::Status => "StatusMsg",
            Self::Generic => "GenericMsg",
            Self::Post => "PostMsg",
            Self::Ack => "AckMsg",
            Self::Close => "CloseMsg",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Stream / data state
// ---------------------------------------------------------------------------

/// Stream state carried by refresh and status messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StreamState {
    #[default]
    Unspecified = 0,
    Open = 1,
    NonStreaming = 2,
    ClosedRecover = 3,
    Closed = 4,
    ClosedRedirected = 5,
}

/// Health of the data on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataState {
    #[default]
    NoChange = 0,
    Ok = 1,
    Suspect = 2,
}

/// Status code qualifying a stream/data state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StatusCode {
    #[default]
    None = 0,
    NotFound = 1,
    Timeout = 2,
    NotAuthorized = 3,
    InvalidArgument = 4,
    UsageError = 5,
    Preempted = 6,
    RealtimeResumed = 8,
    FailoverStarted = 9,
    FailoverCompleted = 10,
    GapDetected = 11,
    NoResources = 12,
    TooManyItems = 13,
    AlreadyOpen = 14,
    SourceUnknown = 15,
    NotOpen = 16,
    Error = 28,
}

// ---------------------------------------------------------------------------
// Key / session enums
// ---------------------------------------------------------------------------

/// Name type of a message key. Only the values the core inspects.
pub mod name_type {
    pub const UNSPECIFIED: u8 = 0;
    pub const RIC: u8 = 1;
    pub const USER_NAME: u8 = 1;
}

/// Which side of the connection this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Consumer,
    NiProvider,
}

/// Where the session's field/enum dictionaries come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DictionaryKind {
    /// Downloaded from the provider over the channel.
    #[default]
    Channel,
    /// Pre-loaded from local files.
    File,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_display_and_admin() {
        assert_eq!(DomainType::MARKET_PRICE.to_string(), "MarketPrice");
        assert_eq!(DomainType(200).to_string(), "Domain(200)");
        assert!(DomainType::LOGIN.is_admin());
        assert!(!DomainType::MARKET_BY_ORDER.is_admin());
    }

    #[test]
    fn domain_serde_is_numeric() {
        let d: DomainType = serde_json::from_str("7").unwrap();
        assert_eq!(d, DomainType::MARKET_BY_ORDER);
        assert_eq!(serde_json::to_string(&DomainType::SOURCE).unwrap(), "4");
    }
}
