//! Per-endpoint session-token cache.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use dcstat_core::EndpointId;

use crate::session::SessionToken;

/// Storage for reusable session tokens, keyed by endpoint.
pub trait SessionStore: Send + Sync {
    /// Cached token for `endpoint`, or `None` if absent or expired.
    fn load(&self, endpoint: EndpointId) -> Option<SessionToken>;

    /// Cache `token` for `endpoint` for at most `ttl`.
    fn store(&self, endpoint: EndpointId, token: SessionToken, ttl: Duration);
}

struct Entry {
    token: SessionToken,
    deadline: Instant,
}

/// In-memory [`SessionStore`]; contents are lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<EndpointId, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, endpoint: EndpointId) -> Option<SessionToken> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&endpoint) {
            None => return None,
            Some(entry) if !entry.token.0.is_empty() && Instant::now() < entry.deadline => {
                return Some(entry.token.clone());
            }
            Some(_) => {}
        }
        entries.remove(&endpoint);
        None
    }

    fn store(&self, endpoint: EndpointId, token: SessionToken, ttl: Duration) {
        let deadline = Instant::now() + ttl;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint, Entry { token, deadline });
    }
}
