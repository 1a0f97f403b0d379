//! Tunnel stream open parameters and class of service.
//!
//! A tunnel stream is a private sub-channel multiplexed inside one item
//! stream. Its behaviour is negotiated through a [`ClassOfService`].

use serde::{Deserialize, Serialize};

use super::enums::DomainType;
use super::msg::ReqMsg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationType {
    #[default]
    NotRequired,
    OmmLogin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowControlType {
    None,
    #[default]
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GuaranteeType {
    #[default]
    None,
    PersistentQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataIntegrityType {
    BestEffort,
    #[default]
    Reliable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowControl {
    pub flow_type: FlowControlType,
    /// `-1` lets the transport pick its default window.
    pub recv_window_size: i32,
    pub send_window_size: i32,
}

impl Default for FlowControl {
    fn default() -> Self {
        Self {
            flow_type: FlowControlType::Bidirectional,
            recv_window_size: -1,
            send_window_size: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Guarantee {
    pub guarantee_type: GuaranteeType,
    pub persist_locally: bool,
    pub persistence_file_path: Option<String>,
}

/// Negotiated tunnel stream behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassOfService {
    pub max_msg_size: u32,
    pub authentication: AuthenticationType,
    pub flow_control: FlowControl,
    pub data_integrity: DataIntegrityType,
    pub guarantee: Guarantee,
}

impl Default for ClassOfService {
    fn default() -> Self {
        Self {
            max_msg_size: 6144,
            authentication: AuthenticationType::NotRequired,
            flow_control: FlowControl::default(),
            data_integrity: DataIntegrityType::Reliable,
            guarantee: Guarantee::default(),
        }
    }
}

/// Request to open a tunnel stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelStreamRequest {
    pub domain_type: DomainType,
    pub name: String,
    pub service_name: Option<String>,
    pub service_id: Option<u16>,
    pub response_timeout_secs: u32,
    pub guaranteed_output_buffers: u32,
    pub class_of_service: ClassOfService,
    /// Login sent inside the tunnel when authentication is `OmmLogin`.
    pub login_request: Option<ReqMsg>,
}

impl Default for TunnelStreamRequest {
    fn default() -> Self {
        Self {
            domain_type: DomainType::SYSTEM,
            name: "Tunnel".to_string(),
            service_name: None,
            service_id: None,
            response_timeout_secs: 60,
            guaranteed_output_buffers: 50,
            class_of_service: ClassOfService::default(),
            login_request: None,
        }
    }
}

impl TunnelStreamRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn service_id(mut self, id: u16) -> Self {
        self.service_id = Some(id);
        self
    }

    pub fn domain_type(mut self, domain: DomainType) -> Self {
        self.domain_type = domain;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn class_of_service(mut self, cos: ClassOfService) -> Self {
        self.class_of_service = cos;
        self
    }
}
