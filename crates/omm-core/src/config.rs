//! Configuration parsing for the OMM access layer.
//!
//! A session reads its settings from a single JSON file. The core only
//! consumes `session`, `logger`, `login`, `directory_request`, and
//! `dictionary`; `services` and `items` drive the demo runner.
//!
//! # Example config
//!
//! ```json
//! {
//!   "session": { "instance_name": "Consumer_1", "closed_status_delay_ms": 1000 },
//!   "logger": { "severity": "success", "log_path": "/tmp/log" },
//!   "login": { "username": "user", "application_id": "256" },
//!   "dictionary": { "kind": "channel" },
//!   "services": [{ "id": 1, "name": "DIRECT_FEED" }],
//!   "items": [{ "name": "IBM.N", "service_name": "DIRECT_FEED" }]
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OmmError, OmmResult};

use crate::types::{DictionaryKind, DomainType, MsgKey, ReqMsg, Role, ServiceInfo, ServiceState, name_type};

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub session: Option<SessionConfig>,
    pub logger: Option<LoggerConfig>,
    pub login: Option<LoginConfig>,
    pub directory_request: Option<DirectoryRequestConfig>,
    pub dictionary: Option<DictionaryConfig>,

    /// Services the simulated provider advertises.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// Item requests the runner registers at startup.
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

impl AppConfig {
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    pub fn login(&self) -> LoginConfig {
        self.login.clone().unwrap_or_default()
    }

    pub fn dictionary(&self) -> DictionaryConfig {
        self.dictionary.clone().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Per-session tuning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    pub instance_name: Option<String>,
    pub role: Option<Role>,

    /// Delay before a synthesized closed status is delivered.
    pub closed_status_delay_ms: Option<u64>,

    /// Delay before a late login registration gets the cached refresh.
    pub login_refresh_delay_ms: Option<u64>,

    /// Interval between locally encoded dictionary parts.
    pub dictionary_part_delay_ms: Option<u64>,

    /// Entries per locally encoded dictionary part.
    pub dictionary_part_size: Option<usize>,

    /// Initial capacity of the item map.
    pub item_count_hint: Option<u32>,

    /// Initial capacity of the directory indexes.
    pub service_count_hint: Option<u32>,

    /// Maximum transport events drained per `dispatch` call.
    pub max_dispatch_count: Option<u32>,
}

impl SessionConfig {
    pub fn effective_instance_name(&self) -> String {
        self.instance_name.clone().unwrap_or_else(|| "Consumer_1".to_string())
    }

    pub fn effective_role(&self) -> Role {
        self.role.unwrap_or_default()
    }

    pub fn closed_status_delay(&self) -> Duration {
        Duration::from_millis(self.closed_status_delay_ms.unwrap_or(1000))
    }

    pub fn login_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.login_refresh_delay_ms.unwrap_or(10))
    }

    pub fn dictionary_part_delay(&self) -> Duration {
        Duration::from_millis(self.dictionary_part_delay_ms.unwrap_or(500))
    }

    pub fn effective_dictionary_part_size(&self) -> usize {
        self.dictionary_part_size.unwrap_or(100).max(1)
    }

    pub fn effective_item_count_hint(&self) -> usize {
        self.item_count_hint.unwrap_or(100_000) as usize
    }

    pub fn effective_service_count_hint(&self) -> usize {
        self.service_count_hint.unwrap_or(513) as usize
    }

    pub fn effective_max_dispatch_count(&self) -> usize {
        self.max_dispatch_count.unwrap_or(100).max(1) as usize
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Logger severity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggerSeverity {
    Verbose,
    Success,
    Warning,
    Error,
    NoLogMsg,
}

impl LoggerSeverity {
    /// `EnvFilter` directive for this severity.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Verbose => "trace",
            Self::Success => "info",
            Self::Warning => "warn",
            Self::Error => "error",
            Self::NoLogMsg => "off",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggerConfig {
    pub severity: Option<LoggerSeverity>,
    pub log_path: Option<String>,
    pub module_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Admin request templates
// ---------------------------------------------------------------------------

/// Login request template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginConfig {
    pub username: Option<String>,
    pub application_id: Option<String>,
    pub position: Option<String>,
    pub instance_id: Option<String>,
}

impl LoginConfig {
    pub fn effective_username(&self) -> String {
        self.username
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "user".to_string())
    }

    /// Login request built from this template.
    pub fn to_request(&self) -> ReqMsg {
        let mut attrib = serde_json::Map::new();
        attrib.insert(
            "ApplicationId".into(),
            self.application_id.clone().unwrap_or_else(|| "256".into()).into(),
        );
        if let Some(position) = &self.position {
            attrib.insert("Position".into(), position.clone().into());
        }
        if let Some(instance_id) = &self.instance_id {
            attrib.insert("InstanceId".into(), instance_id.clone().into());
        }
        ReqMsg::new()
            .domain_type(DomainType::LOGIN)
            .name(self.effective_username())
            .name_type(name_type::USER_NAME)
            .payload(serde_json::Value::Object(attrib))
    }
}

/// Source directory request template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryRequestConfig {
    pub filter: Option<u32>,
    pub service_name: Option<String>,
}

impl DirectoryRequestConfig {
    /// Info | State | Group by default.
    pub fn effective_filter(&self) -> u32 {
        self.filter.unwrap_or(0x07)
    }

    pub fn to_request(&self) -> ReqMsg {
        let mut req = ReqMsg::new().domain_type(DomainType::SOURCE).filter(self.effective_filter());
        if let Some(name) = &self.service_name {
            req = req.service_name(name.clone());
        }
        req
    }
}

// ---------------------------------------------------------------------------
// Dictionary
// ---------------------------------------------------------------------------

/// One field dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldEntry {
    pub fid: i16,
    pub acronym: String,
    pub rwf_type: String,
}

/// One enumerated value of a field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnumEntry {
    pub fid: i16,
    pub value: u16,
    pub display: String,
}

/// Dictionary source plus optional inline content for the local cache.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DictionaryConfig {
    pub kind: Option<DictionaryKind>,
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
    #[serde(default)]
    pub enums: Vec<EnumEntry>,
}

impl DictionaryConfig {
    pub fn effective_kind(&self) -> DictionaryKind {
        self.kind.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Runner inputs
// ---------------------------------------------------------------------------

/// A service advertised by the simulated provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub id: u16,
    pub name: String,
    pub vendor: Option<String>,
    pub up: Option<bool>,
    pub accepting_requests: Option<bool>,
    /// Interval between simulated updates per open item.
    pub update_interval_ms: Option<u64>,
}

impl ServiceConfig {
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            vendor: self.vendor.clone(),
            is_source: true,
            capabilities: vec![DomainType::MARKET_PRICE, DomainType::MARKET_BY_PRICE, DomainType::DICTIONARY],
            dictionaries_provided: vec!["RWFFld".into(), "RWFEnum".into()],
            dictionaries_used: vec!["RWFFld".into(), "RWFEnum".into()],
            ..ServiceInfo::named(self.name.clone())
        }
    }

    pub fn state(&self) -> ServiceState {
        ServiceState {
            up: self.up.unwrap_or(true),
            accepting_requests: self.accepting_requests.unwrap_or(true),
            status: None,
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.unwrap_or(1000))
    }
}

/// An item the runner registers.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemConfig {
    /// Item name. Ignored when `batch` is set.
    #[serde(default)]
    pub name: String,
    pub service_name: Option<String>,
    pub service_id: Option<u16>,
    pub domain: Option<DomainType>,
    pub batch: Option<Vec<String>>,
    pub streaming: Option<bool>,
}

impl ItemConfig {
    pub fn to_request(&self) -> ReqMsg {
        let mut req = ReqMsg {
            domain_type: self.domain.unwrap_or_default(),
            key: MsgKey {
                service_id: self.service_id,
                ..MsgKey::default()
            },
            service_name: self.service_name.clone(),
            interest_after_refresh: self.streaming.unwrap_or(true),
            ..ReqMsg::default()
        };
        match &self.batch {
            Some(names) if !names.is_empty() => req.batch_item_names = names.clone(),
            _ => req.key.name = Some(self.name.clone()),
        }
        req
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_config(&content)?)
}

/// Parse a JSON config document.
pub fn parse_config(content: &str) -> OmmResult<AppConfig> {
    serde_json::from_str(content).map_err(|e| OmmError::Config(e.to_string()))
}
