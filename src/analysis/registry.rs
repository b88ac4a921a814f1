//! Single-slot ownership of the live session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, info};

use super::cancel::{CancelReason, CancelSignal};
use super::session::{AnalysisSession, SessionContext, SessionDeps};
use super::status::SessionId;

type Slot = Mutex<Option<SessionHandle>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<SessionHandle>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Control handle for a started session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    cancel: CancelSignal,
    done: watch::Receiver<bool>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns false if the session was already cancelled.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.cancel.cancel(reason)
    }

    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait until the session has emitted its terminal status.
    pub async fn wait(&self) {
        let mut done = self.done.clone();
        // A dropped sender also means the task is gone.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Lets a session check whether it still owns the registry slot.
#[derive(Debug, Clone)]
pub struct SessionGate {
    slot: Weak<Slot>,
    id: SessionId,
}

impl SessionGate {
    pub fn is_current(&self) -> bool {
        self.slot
            .upgrade()
            .is_some_and(|slot| lock(&slot).as_ref().map(|h| h.id) == Some(self.id))
    }
}

/// Holds at most one live session. Starting a new one supersedes the old.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    slot: Arc<Slot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the current session (reason superseded), then build and spawn
    /// a new one from `factory`. Must be called inside a tokio runtime.
    pub fn start<F>(&self, factory: F) -> SessionHandle
    where
        F: FnOnce(SessionContext) -> AnalysisSession,
    {
        let previous = lock(&self.slot).take();
        if let Some(previous) = previous {
            info!("Session {} superseded", previous.id);
            previous.cancel(CancelReason::Superseded);
        }

        let id = SessionId::new();
        let cancel = CancelSignal::new();
        let (done_tx, done_rx) = watch::channel(false);
        let handle = SessionHandle {
            id,
            cancel: cancel.clone(),
            done: done_rx,
        };

        let session = factory(SessionContext {
            id,
            cancel,
            gate: Some(SessionGate {
                slot: Arc::downgrade(&self.slot),
                id,
            }),
        });

        // Another start may have slipped in; the newest one wins.
        if let Some(raced) = lock(&self.slot).replace(handle.clone()) {
            raced.cancel(CancelReason::Superseded);
        }

        let slot = self.slot.clone();
        tokio::spawn(async move {
            let _ = session.run().await;
            {
                let mut current = lock(&slot);
                if current.as_ref().map(|h| h.id) == Some(id) {
                    *current = None;
                }
            }
            debug!("Session {} released", id);
            let _ = done_tx.send(true);
        });

        handle
    }

    /// Start analyzing `source` with the given collaborators.
    pub fn start_analysis(&self, source: impl Into<String>, deps: SessionDeps) -> SessionHandle {
        let source = source.into();
        self.start(move |ctx| AnalysisSession::new(ctx, source, deps))
    }

    /// Cancel the live session on behalf of the user.
    pub fn cancel_active(&self) -> bool {
        match self.current() {
            Some(handle) => {
                info!("Cancelling session {}", handle.id);
                handle.cancel(CancelReason::User)
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<SessionHandle> {
        lock(&self.slot).clone()
    }
}
