//! Per-lobby creation lock.
//!
//! At most one provisioning pass runs per lobby. The lock is a set of lobby
//! ids; membership means `Provisioning`, absence means `Idle`. Acquisition is
//! a synchronous check-and-insert, and the returned guard releases on drop so
//! every exit path of a pass frees the lobby.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone, Default)]
pub struct CreationLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl CreationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `lobby_id`, or `None` if a pass already holds it.
    pub fn try_acquire(&self, lobby_id: &str) -> Option<CreationGuard> {
        let mut held = self.held.lock();
        if !held.insert(lobby_id.to_string()) {
            return None;
        }
        Some(CreationGuard {
            held: Arc::clone(&self.held),
            lobby_id: lobby_id.to_string(),
        })
    }

    pub fn is_held(&self, lobby_id: &str) -> bool {
        self.held.lock().contains(lobby_id)
    }
}

/// Proof of holding one lobby's lock.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct CreationGuard {
    held: Arc<Mutex<HashSet<String>>>,
    lobby_id: String,
}

impl CreationGuard {
    pub fn lobby_id(&self) -> &str {
        &self.lobby_id
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.lobby_id);
    }
}

impl std::fmt::Debug for CreationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreationGuard")
            .field("lobby_id", &self.lobby_id)
            .finish()
    }
}
