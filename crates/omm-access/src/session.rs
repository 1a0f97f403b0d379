//! Application-facing session.
//!
//! [`OmmSession`] puts the dispatcher behind the session's user lock and
//! drives it from the transport event channel:
//!
//! ```text
//! app threads ──register/reissue/unregister──► Mutex<ItemCallbackClient>
//!                                                    ▲
//! transport ──TransportEvent──► crossbeam ──► dispatch() ──► callbacks (lock released)
//! ```
//!
//! Callbacks run on the thread calling [`OmmSession::dispatch`], after the
//! lock is dropped, so they may call back into the session.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use omm_core::config::AppConfig;
use omm_core::error::OmmResult;
use omm_core::types::{GenericMsg, PostMsg, ReqMsg, TunnelStreamRequest};
use tracing::{debug, info};

use crate::callback::ItemCallbackClient;
use crate::client::{Closure, SharedClient};
use crate::context::SessionContext;
use crate::item::ItemHandle;
use crate::transport::{Transport, TransportEvent, TransportEventReceiver};

/// Outcome of one [`OmmSession::dispatch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// At least one callback was delivered.
    Dispatched(usize),
    /// The timeout elapsed with nothing to deliver.
    TimedOut,
}

pub struct OmmSession {
    inner: Mutex<ItemCallbackClient>,
    events: TransportEventReceiver,
    max_dispatch: usize,
}

impl OmmSession {
    pub fn new(config: &AppConfig, transport: Box<dyn Transport>, events: TransportEventReceiver) -> Self {
        let ctx = SessionContext::new(config, transport);
        let max_dispatch = ctx.session.effective_max_dispatch_count();
        info!(
            "[session] '{}' created (role={:?}, max_dispatch={max_dispatch})",
            ctx.instance_name(),
            ctx.role()
        );
        Self {
            inner: Mutex::new(ItemCallbackClient::new(ctx)),
            events,
            max_dispatch,
        }
    }

    /// A poisoned lock is recovered; the dispatcher is never left mid-update.
    fn lock(&self) -> MutexGuard<'_, ItemCallbackClient> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn instance_name(&self) -> String {
        self.lock().context().instance_name().to_string()
    }

    pub fn register_client(
        &self,
        req: ReqMsg,
        client: SharedClient,
        closure: Closure,
        parent: Option<ItemHandle>,
    ) -> OmmResult<ItemHandle> {
        self.lock().register_client(req, client, closure, parent)
    }

    pub fn register_tunnel(
        &self,
        req: TunnelStreamRequest,
        client: SharedClient,
        closure: Closure,
    ) -> OmmResult<ItemHandle> {
        self.lock().register_tunnel(req, client, closure)
    }

    pub fn reissue(&self, req: ReqMsg, handle: ItemHandle) -> OmmResult<()> {
        self.lock().reissue(req, handle)
    }

    pub fn unregister(&self, handle: ItemHandle) -> OmmResult<()> {
        self.lock().unregister(handle)
    }

    pub fn submit_post(&self, post: PostMsg, handle: ItemHandle) -> OmmResult<()> {
        self.lock().submit_post(post, handle)
    }

    pub fn submit_generic(&self, generic: GenericMsg, handle: ItemHandle) -> OmmResult<()> {
        self.lock().submit_generic(generic, handle)
    }

    /// Run `f` against the dispatcher under the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&ItemCallbackClient) -> R) -> R {
        f(&self.lock())
    }

    /// Wait up to `timeout` for work, then deliver every callback it produced.
    ///
    /// At most `max_dispatch_count` transport events are drained per round.
    /// Due timer tasks are always serviced.
    pub fn dispatch(&self, timeout: Duration) -> DispatchResult {
        let deadline = Instant::now() + timeout;
        let mut batch: Vec<TransportEvent> = Vec::with_capacity(self.max_dispatch);
        loop {
            let wake = match self.lock().next_deadline() {
                Some(timer) => timer.min(deadline),
                None => deadline,
            };

            match self.events.recv_deadline(wake) {
                Ok(event) => {
                    batch.push(event);
                    while batch.len() < self.max_dispatch {
                        match self.events.try_recv() {
                            Ok(event) => batch.push(event),
                            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // No transport left; only timers can produce work.
                    let now = Instant::now();
                    if wake > now {
                        std::thread::sleep(wake - now);
                    }
                }
            }

            let notifications = {
                let mut dispatcher = self.lock();
                for event in batch.drain(..) {
                    dispatcher.process_event(event);
                }
                dispatcher.process_timeouts(Instant::now());
                dispatcher.take_notifications()
            };

            let delivered = notifications.len();
            for notification in notifications {
                notification.deliver();
            }
            if delivered > 0 {
                debug!("[session] dispatched {delivered} callback(s)");
                return DispatchResult::Dispatched(delivered);
            }
            if Instant::now() >= deadline {
                return DispatchResult::TimedOut;
            }
        }
    }
}

impl std::fmt::Debug for OmmSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmmSession")
            .field("dispatcher", &*self.lock())
            .field("pending_events", &self.events.len())
            .field("max_dispatch", &self.max_dispatch)
            .finish()
    }
}
