//! Session registry: maps session ids to running sessions.
//!
//! The registry is the only structure shared by every task.  Its lock guards
//! nothing but the map itself and is held for a single lookup, insert or
//! delete; session work always happens after the lock is released, so one
//! busy session never stalls another.
//!
//! The registry decides nothing about wire replies.  It reports
//! [`SessionError::NotFound`] and leaves the Close reply to the dispatcher.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::config::SessionConfig;
use crate::packet::SessionId;
use crate::session::{Outbox, SessionError, SessionHandle};

type SessionMap = HashMap<SessionId, Arc<SessionHandle>>;

struct Inner {
    sessions: Mutex<SessionMap>,
    next_serial: AtomicU64,
    outbox: Outbox,
    config: SessionConfig,
}

impl Inner {
    fn sessions(&self) -> MutexGuard<'_, SessionMap> {
        // The map is never left half-updated, so a poisoned lock is usable.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `id` only if it still names the session with `serial`.
    fn evict(&self, id: &SessionId, serial: u64) {
        let removed = {
            let mut sessions = self.sessions();
            let current = sessions.get(id).is_some_and(|s| s.serial() == serial);
            if current {
                sessions.remove(id)
            } else {
                None
            }
        };
        if let Some(session) = removed {
            session.close();
            log::info!("[registry] evicted session {id}");
        }
    }
}

/// Cloneable handle to the set of live sessions.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// Create an empty registry.  Sessions it creates send through `outbox`.
    pub fn new(outbox: Outbox, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                next_serial: AtomicU64::new(1),
                outbox,
                config,
            }),
        }
    }

    /// Return the session for `id`, creating it (bound to `peer`) if none
    /// exists.  Creation and lookup are atomic: concurrent callers always get
    /// the same session.  A session that closed itself but has not been
    /// evicted yet is replaced.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, id: SessionId, peer: SocketAddr) -> Arc<SessionHandle> {
        let mut sessions = self.inner.sessions();
        if let Some(session) = sessions.get(&id).filter(|s| !s.is_closed()) {
            return Arc::clone(session);
        }

        let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let evict_id = id.clone();
        let session = SessionHandle::spawn(
            id.clone(),
            serial,
            peer,
            &self.inner.config,
            self.inner.outbox.clone(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.evict(&evict_id, serial);
                }
            }),
        );
        sessions.insert(id, Arc::clone(&session));
        session
    }

    /// Look up a live session.
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.inner.sessions().get(id).cloned()
    }

    /// Detach and close the session for `id`.  Returns `false` if there was
    /// none; removing an absent id is not an error.
    pub fn remove(&self, id: &SessionId) -> bool {
        let removed = self.inner.sessions().remove(id);
        match removed {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Apply a Data payload to session `id`; returns the cursor for the Ack.
    pub async fn dispatch_data(
        &self,
        id: &SessionId,
        position: u64,
        payload: &[u8],
    ) -> Result<u64, SessionError> {
        let session = self.lookup(id)?;
        session.on_data(position, payload).await
    }

    /// Forward an Ack to session `id`.
    pub fn dispatch_ack(&self, id: &SessionId, length: u64) -> Result<(), SessionError> {
        self.lookup(id)?.on_ack(length)
    }

    /// Cursor of session `id`, or 0 if there is no such session.
    pub async fn received_len(&self, id: &SessionId) -> u64 {
        match self.get(id) {
            Some(session) => session.received_len().await,
            None => 0,
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.inner.sessions().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every live session, sorted.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.inner.sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close and forget every session.
    pub fn shutdown(&self) {
        let drained: Vec<Arc<SessionHandle>> =
            self.inner.sessions().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        if !drained.is_empty() {
            log::info!("[registry] closed {} session(s)", drained.len());
        }
    }

    fn lookup(&self, id: &SessionId) -> Result<Arc<SessionHandle>, SessionError> {
        self.get(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sessions", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
