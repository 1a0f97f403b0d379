//! Stream id allocation.
//!
//! Consumer sessions hand out ascending ids above the reserved admin range:
//!
//! ```text
//! 1 login | 2 directory | 3 field dictionary | 4 enum dictionary | 5.. items
//! ```
//!
//! Ids grow monotonically until the signed 32-bit space is nearly exhausted.
//! The allocator then restarts from the starting id and enters wraparound
//! mode, where every candidate is probed against the caller's in-use
//! predicate so a long-lived subscription is never handed out twice.
//!
//! Provider sessions count down from zero (`-1, -2, ...`) and reuse returned
//! ids first.

use std::collections::VecDeque;
use std::sync::Mutex;

use omm_core::error::{OmmError, OmmResult, UsageErrorCode};
use omm_core::types::Role;
use tracing::debug;

pub const LOGIN_STREAM_ID: i32 = 1;
pub const DIRECTORY_STREAM_ID: i32 = 2;
pub const FIELD_DICTIONARY_STREAM_ID: i32 = 3;
pub const ENUM_DICTIONARY_STREAM_ID: i32 = 4;

/// Last reserved consumer id; the first allocated id is one above.
pub const CONSUMER_STARTING_STREAM_ID: i32 = 4;
pub const PROVIDER_STARTING_STREAM_ID: i32 = 0;
pub const MAX_STREAM_ID_MINUS_ONE: i32 = i32::MAX - 1;

#[derive(Debug)]
struct AllocState {
    next: i32,
    wrapped: bool,
    returned: VecDeque<i32>,
}

/// Issues and reclaims stream ids for one session.
///
/// # Thread safety
///
/// All state sits behind one mutex; concurrent `next_stream_id` calls from
/// different application threads never return the same id.
#[derive(Debug)]
pub struct StreamIdAllocator {
    role: Role,
    starting: i32,
    ceiling: i32,
    state: Mutex<AllocState>,
}

impl StreamIdAllocator {
    pub fn new(role: Role) -> Self {
        Self::with_ceiling(role, MAX_STREAM_ID_MINUS_ONE)
    }

    /// Allocator whose consumer range ends at `ceiling` instead of
    /// `i32::MAX - 1`.
    pub fn with_ceiling(role: Role, ceiling: i32) -> Self {
        let starting = match role {
            Role::Consumer => CONSUMER_STARTING_STREAM_ID,
            Role::NiProvider => PROVIDER_STARTING_STREAM_ID,
        };
        Self {
            role,
            starting,
            ceiling: ceiling.max(starting + 1),
            state: Mutex::new(AllocState {
                next: starting,
                wrapped: false,
                returned: VecDeque::new(),
            }),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Next free stream id.
    ///
    /// `children` additional ids directly after the returned one are reserved
    /// too (batch children). In wraparound mode only the returned id is
    /// guaranteed free, which is why batches are split before they get here.
    ///
    /// `in_use` reports ids still held by live items; it is only consulted in
    /// wraparound mode.
    pub fn next_stream_id(&self, children: usize, in_use: impl Fn(i32) -> bool) -> OmmResult<i32> {
        let mut st = self.lock();
        match self.role {
            Role::Consumer => self.next_consumer_id(&mut st, children, in_use),
            Role::NiProvider => Self::next_provider_id(&mut st),
        }
    }

    /// `true` if a block of `children + 1` ids cannot be handed out
    /// contiguously.
    pub fn would_wrap(&self, children: usize) -> bool {
        let st = self.lock();
        st.wrapped || i64::from(st.next) > i64::from(self.ceiling) - children as i64 - 1
    }

    pub fn is_wrapped(&self) -> bool {
        self.lock().wrapped
    }

    /// Give a provider stream id back for reuse. Ignored for consumers.
    pub fn return_stream_id(&self, stream_id: i32) {
        if self.role == Role::NiProvider && stream_id < 0 {
            self.lock().returned.push_back(stream_id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AllocState> {
        // A poisoned allocator still holds consistent integers.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_consumer_id(
        &self,
        st: &mut AllocState,
        children: usize,
        in_use: impl Fn(i32) -> bool,
    ) -> OmmResult<i32> {
        let block = children.min(i32::MAX as usize) as i64;

        if !st.wrapped && i64::from(st.next) > i64::from(self.ceiling) - block - 1 {
            debug!("[stream_id] Reach max number available for next stream id, will wrap around");
            st.next = self.starting;
            st.wrapped = true;
        }

        if !st.wrapped {
            st.next += 1;
            let ret = st.next;
            st.next += block as i32;
            return Ok(ret);
        }

        // Probe one full cycle of the range starting after the last id handed out.
        let span = (self.ceiling - self.starting) as i64;
        let mut candidate = st.next;
        for _ in 0..span {
            candidate = if candidate >= self.ceiling { self.starting + 1 } else { candidate + 1 };
            if !in_use(candidate) {
                st.next = candidate;
                return Ok(candidate);
            }
        }

        Err(OmmError::usage(
            "Unable to obtain next available stream id for item request.",
            UsageErrorCode::InternalError,
        ))
    }

    fn next_provider_id(st: &mut AllocState) -> OmmResult<i32> {
        if let Some(id) = st.returned.pop_front() {
            return Ok(id);
        }
        if st.next == i32::MIN {
            return Err(OmmError::usage(
                "Unable to obtain next available stream id for submitting item.",
                UsageErrorCode::InternalError,
            ));
        }
        st.next -= 1;
        Ok(st.next)
    }
}
