//! Source directory service descriptors.
//!
//! The transport decodes the source directory stream into a list of
//! [`ServiceUpdate`]s; the directory registry applies them in order.

use serde::{Deserialize, Serialize};

use super::enums::DomainType;
use super::state::{OmmState, Qos};

/// Action a directory entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    Add,
    Update,
    Delete,
}

/// Service info filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceInfo {
    pub name: String,
    pub vendor: Option<String>,
    pub is_source: bool,
    pub capabilities: Vec<DomainType>,
    pub dictionaries_provided: Vec<String>,
    pub dictionaries_used: Vec<String>,
    pub qos: Vec<Qos>,
    pub item_list: Option<String>,
}

impl ServiceInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Service state filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceState {
    /// Service up (`true`) or down.
    pub up: bool,
    pub accepting_requests: bool,
    pub status: Option<OmmState>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            up: true,
            accepting_requests: true,
            status: None,
        }
    }
}

/// One entry of a source directory refresh/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    pub action: ServiceAction,
    pub service_id: u16,
    #[serde(default)]
    pub info: Option<ServiceInfo>,
    #[serde(default)]
    pub state: Option<ServiceState>,
}

impl ServiceUpdate {
    pub fn add(service_id: u16, info: ServiceInfo, state: ServiceState) -> Self {
        Self {
            action: ServiceAction::Add,
            service_id,
            info: Some(info),
            state: Some(state),
        }
    }

    pub fn update(service_id: u16, info: Option<ServiceInfo>, state: Option<ServiceState>) -> Self {
        Self {
            action: ServiceAction::Update,
            service_id,
            info,
            state,
        }
    }

    pub fn delete(service_id: u16) -> Self {
        Self {
            action: ServiceAction::Delete,
            service_id,
            info: None,
            state: None,
        }
    }
}
