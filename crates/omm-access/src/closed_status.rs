//! Snapshot used to synthesize a status message after registration returns.

use omm_core::types::{DomainType, MsgKey, OmmState, ReqMsg, StatusMsg};

/// Everything needed to build the deferred [`StatusMsg`] for an item.
///
/// Attached to an item at most once, then delivered by a
/// [`TimeoutTask::ItemStatus`](crate::timeout::TimeoutTask::ItemStatus).
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedStatusInfo {
    key: MsgKey,
    service_name: Option<String>,
    stream_id: i32,
    domain_type: DomainType,
    private_stream: bool,
    state: OmmState,
}

impl ClosedStatusInfo {
    /// Closed / Suspect / SourceUnknown status for `req`.
    pub fn closed(stream_id: i32, req: &ReqMsg, text: impl Into<String>) -> Self {
        Self::with_state(stream_id, req, OmmState::closed_source_unknown(text))
    }

    /// Open / Ok acknowledgement sent on a split batch parent.
    pub fn batch_acknowledged(stream_id: i32, req: &ReqMsg) -> Self {
        Self::with_state(stream_id, req, OmmState::open_ok("Batch request acknowledged."))
    }

    pub fn with_state(stream_id: i32, req: &ReqMsg, state: OmmState) -> Self {
        Self {
            key: req.key.clone(),
            service_name: req.service_name.clone(),
            stream_id,
            domain_type: req.domain_type,
            private_stream: req.private_stream,
            state,
        }
    }

    pub fn state(&self) -> &OmmState {
        &self.state
    }

    /// Whether delivering this status ends the item.
    pub fn closes_item(&self) -> bool {
        !self.state.is_open()
    }

    pub fn to_status_msg(&self) -> StatusMsg {
        StatusMsg {
            stream_id: self.stream_id,
            domain_type: self.domain_type,
            key: self.key.clone(),
            state: Some(self.state.clone()),
            private_stream: self.private_stream,
            service_name: self.service_name.clone(),
            payload: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use omm_core::types::{DataState, StatusCode, StreamState};

    use super::*;

    #[test]
    fn closed_status_carries_request_identity() {
        let req = ReqMsg::new().name("IBM.N").service_name("DIRECT_FEED").private_stream(true);
        let info = ClosedStatusInfo::closed(0, &req, "Service name of 'DIRECT_FEED' is not found.");
        assert!(info.closes_item());

        let status = info.to_status_msg();
        let state = status.state.unwrap();
        assert_eq!(state.stream_state, StreamState::Closed);
        assert_eq!(state.data_state, DataState::Suspect);
        assert_eq!(state.status_code, StatusCode::SourceUnknown);
        assert_eq!(state.status_text, "Service name of 'DIRECT_FEED' is not found.");
        assert_eq!(status.key.name.as_deref(), Some("IBM.N"));
        assert_eq!(status.service_name.as_deref(), Some("DIRECT_FEED"));
        assert!(status.private_stream);
    }

    #[test]
    fn batch_ack_keeps_stream_open() {
        let req = ReqMsg::new().batch(["A", "B"]);
        let info = ClosedStatusInfo::batch_acknowledged(12, &req);
        assert!(!info.closes_item());
        assert_eq!(info.to_status_msg().stream_id, 12);
        assert_eq!(info.state().data_state, DataState::Ok);
    }
}
