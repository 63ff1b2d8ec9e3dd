//! In-memory session store.
//!
//! Maps an opaque [`SessionId`] to an ordered, append-only list of
//! [`Turn`]s. Sessions are created lazily on first access and live for
//! the process lifetime; `clear` replaces a session's list with a fresh
//! empty one rather than mutating it in place.
//!
//! Each session owns an independent lock, so concurrent requests against
//! different sessions never contend. Two in-flight requests carrying the
//! same session id may interleave their appends in either order; that
//! race is accepted.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use relayguard_types::chat::{SessionId, Turn};

/// The shared, independently-lockable turn list for one session.
pub type TurnList = Arc<Mutex<Vec<Turn>>>;

/// Concurrency-safe map from session id to turn history.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, TurnList>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Return the turn list for a session, creating an empty one on
    /// first access. Repeated calls for the same id return the same
    /// underlying list.
    pub fn get_or_create(&self, id: &SessionId) -> TurnList {
        self.sessions.entry(*id).or_default().clone()
    }

    /// Replace the session's history with an empty list.
    ///
    /// A session that was never created is implicitly already cleared,
    /// so this also works as a no-op for unknown ids.
    pub fn clear(&self, id: &SessionId) {
        self.sessions.insert(*id, TurnList::default());
    }

    /// Snapshot the session's transcript in chronological order.
    pub async fn transcript(&self, id: &SessionId) -> Vec<Turn> {
        let turns = match self.sessions.get(id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Vec::new(),
        };
        turns.lock().await.clone()
    }

    /// Number of sessions ever touched (cleared sessions included).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
