//! Live auth state shared by concurrent requests of one browser context
//!
//! The encrypted cookie is the persisted copy of a browser's
//! [`StoredAuthState`]. While requests for a context are in flight they all
//! work on one shared copy instead, so a session installed by one request is
//! visible to another that is still waiting for it. The entry is dropped
//! when the last request holding it finishes.

use crate::provider::StoredAuthState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) type SharedState = Arc<Mutex<StoredAuthState>>;

struct Entry {
    state: SharedState,
    holders: usize,
}

#[derive(Default)]
pub struct AuthStateStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl AuthStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the live state for `context`, seeding it from `persisted` if no
    /// other request holds it
    #[must_use]
    pub fn attach(self: &Arc<Self>, context: &str, persisted: StoredAuthState) -> Attachment {
        let mut entries = self.lock_entries();
        let entry = entries.entry(context.to_string()).or_insert_with(|| Entry {
            state: Arc::new(Mutex::new(persisted)),
            holders: 0,
        });
        entry.holders += 1;
        Attachment {
            store: Arc::clone(self),
            context: context.to_string(),
            state: Arc::clone(&entry.state),
        }
    }

    /// Number of contexts with requests in flight
    #[must_use]
    pub fn live_contexts(&self) -> usize {
        self.lock_entries().len()
    }

    fn detach(&self, context: &str) {
        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get_mut(context) {
            entry.holders = entry.holders.saturating_sub(1);
            if entry.holders == 0 {
                entries.remove(context);
            }
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One request's hold on a context's live state; released on drop
pub struct Attachment {
    store: Arc<AuthStateStore>,
    context: String,
    state: SharedState,
}

impl Attachment {
    pub(crate) fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.store.detach(&self.context);
    }
}
