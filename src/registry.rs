//! Process-wide accounting of live worker sessions.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Process-unique identifier for one worker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static REGISTRY: Mutex<Vec<SessionId>> = Mutex::new(Vec::new());

/// Allocate an id and record the session as live.
pub fn register() -> SessionId {
    let id = SessionId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    REGISTRY.lock().push(id);
    id
}

/// Forget a session. Tolerates double deregistration.
pub fn deregister(id: SessionId) {
    REGISTRY.lock().retain(|s| *s != id);
}

/// Number of sessions currently live in this process.
pub fn active_sessions() -> usize {
    REGISTRY.lock().len()
}

/// Whether `id` is still registered.
pub fn is_active(id: SessionId) -> bool {
    REGISTRY.lock().contains(&id)
}
