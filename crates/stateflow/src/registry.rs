//! Process-local registry mapping session ids (and, for `send_to`
//! fallback lookups, actor ids) to live actor handles.
//!
//! `SPEC_FULL.md` §5 calls this out as the *only* cross-interpreter shared
//! mutable resource: every other access pattern is add/remove/lookup, never
//! a read-modify-write, so a `parking_lot::RwLock`-guarded map is
//! sufficient even though interpreters living on different Tokio worker
//! threads may touch it concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use stateflow_core::SessionId;

use crate::actor::ActorRef;

type Map<K> = HashMap<K, Weak<dyn ActorRef>, ahash::RandomState>;

pub struct Registry {
    by_session: RwLock<Map<SessionId>>,
    by_id: RwLock<Map<String>>,
    counter: AtomicU64,
    nonce: u64,
}

impl Registry {
    /// The single process-wide registry. Every `Interpreter::start()` call
    /// registers into this instance; there is no way to construct a
    /// private one, matching the spec's "process registry" (not
    /// per-interpreter) model.
    pub fn global() -> &'static Registry {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(Registry::new)
    }

    fn new() -> Self {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        Self {
            by_session: RwLock::new(Map::default()),
            by_id: RwLock::new(Map::default()),
            counter: AtomicU64::new(0),
            nonce,
        }
    }

    /// Allocate a process-unique session id: a monotonic counter XORed
    /// with a process-start nonce. The counter alone guarantees
    /// uniqueness; the nonce just avoids small, guessable ids leaking
    /// implementation detail across process restarts.
    pub fn alloc_session_id(&self) -> SessionId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        n ^ self.nonce
    }

    pub fn register(&self, session_id: SessionId, actor: &Arc<dyn ActorRef>) {
        self.by_session.write().insert(session_id, Arc::downgrade(actor));
        self.by_id.write().insert(actor.id().to_string(), Arc::downgrade(actor));
    }

    pub fn unregister(&self, session_id: SessionId, id: &str) {
        self.by_session.write().remove(&session_id);
        self.by_id.write().remove(id);
    }

    pub fn lookup_by_session(&self, session_id: SessionId) -> Option<Arc<dyn ActorRef>> {
        self.by_session.read().get(&session_id).and_then(Weak::upgrade)
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<Arc<dyn ActorRef>> {
        self.by_id.read().get(id).and_then(Weak::upgrade)
    }
}
