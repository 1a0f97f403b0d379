//! Stream state and quality-of-service descriptors.

use serde::{Deserialize, Serialize};

use super::enums::{DataState, StatusCode, StreamState};

// ---------------------------------------------------------------------------
// OmmState
// ---------------------------------------------------------------------------

/// Stream state + data state + code + free text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OmmState {
    pub stream_state: StreamState,
    pub data_state: DataState,
    pub status_code: StatusCode,
    pub status_text: String,
}

impl OmmState {
    pub fn new(stream_state: StreamState, data_state: DataState, status_code: StatusCode, text: impl Into<String>) -> Self {
        Self {
            stream_state,
            data_state,
            status_code,
            status_text: text.into(),
        }
    }

    /// Open / Ok / None.
    pub fn open_ok(text: impl Into<String>) -> Self {
        Self::new(StreamState::Open, DataState::Ok, StatusCode::None, text)
    }

    /// Closed / Suspect / SourceUnknown, the state of an item whose service
    /// could not be resolved.
    pub fn closed_source_unknown(text: impl Into<String>) -> Self {
        Self::new(StreamState::Closed, DataState::Suspect, StatusCode::SourceUnknown, text)
    }

    pub fn is_open(&self) -> bool {
        self.stream_state == StreamState::Open
    }

    /// Open but suspect.
    pub fn is_open_suspect(&self) -> bool {
        self.stream_state == StreamState::Open && self.data_state == DataState::Suspect
    }
}

impl std::fmt::Display for OmmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} / {:?} / {:?} / '{}'",
            self.stream_state, self.data_state, self.status_code, self.status_text
        )
    }
}

// ---------------------------------------------------------------------------
// Qos
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Timeliness {
    #[default]
    Unspecified = 0,
    Realtime = 1,
    DelayedUnknown = 2,
    Delayed = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Rate {
    #[default]
    Unspecified = 0,
    TickByTick = 1,
    JitConflated = 2,
    TimeConflated = 3,
}

/// Quality of service of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Qos {
    pub timeliness: Timeliness,
    pub rate: Rate,
    pub dynamic: bool,
    pub time_info: u16,
    pub rate_info: u16,
}

impl Qos {
    /// Best QoS requested when the application gives none.
    pub const REALTIME_TICK_BY_TICK: Qos = Qos {
        timeliness: Timeliness::Realtime,
        rate: Rate::TickByTick,
        dynamic: false,
        time_info: 0,
        rate_info: 0,
    };

    /// Worst QoS requested when the application gives none.
    pub const WORST_ACCEPTABLE: Qos = Qos {
        timeliness: Timeliness::DelayedUnknown,
        rate: Rate::TimeConflated,
        dynamic: false,
        time_info: 0,
        rate_info: 65535,
    };
}
