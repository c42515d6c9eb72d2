// Token -> pending request context
//
// Entries are created on a successful submit and removed when a run reaches a
// terminal state, on explicit cancel, or by the expiry sweep. A token maps to
// at most one in-flight run.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::errors::{LeechError, LeechResult};
use super::models::{RequesterId, Session};

#[derive(Debug)]
struct Entry {
    session: Session,
    in_flight: bool,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    entries: Mutex<HashMap<String, Entry>>,
}

/// Handle returned when a run claims its session
#[derive(Debug, Clone)]
pub struct ClaimedSession {
    pub session: Session,
    pub cancel: CancellationToken,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and return its token
    pub fn create(
        &self,
        source_url: &str,
        requester: RequesterId,
        offered_formats: Vec<String>,
    ) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let session = Session {
            token: token.clone(),
            source_url: source_url.to_string(),
            requester,
            created_at: Utc::now(),
            offered_formats,
        };
        self.entries.lock().insert(
            token.clone(),
            Entry {
                session,
                in_flight: false,
                cancel: CancellationToken::new(),
            },
        );
        debug!(token = %token, requester = %requester, "session created");
        token
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.entries.lock().get(token).map(|e| e.session.clone())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.lock().contains_key(token)
    }

    /// Mark the session as running; fails if missing or already running
    pub fn claim(&self, token: &str) -> LeechResult<ClaimedSession> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(token)
            .ok_or_else(|| LeechError::SessionNotFound(token.to_string()))?;
        if entry.in_flight {
            return Err(LeechError::SessionBusy(token.to_string()));
        }
        entry.in_flight = true;
        Ok(ClaimedSession {
            session: entry.session.clone(),
            cancel: entry.cancel.clone(),
        })
    }

    /// Remove the entry after its run reached a terminal state
    pub fn finish(&self, token: &str) {
        self.entries.lock().remove(token);
    }

    /// Remove the entry and signal any in-flight run. Returns false if unknown.
    pub fn cancel(&self, token: &str) -> bool {
        match self.entries.lock().remove(token) {
            Some(entry) => {
                entry.cancel.cancel();
                info!(token = %token, "session cancelled");
                true
            }
            None => false,
        }
    }

    /// Drop idle sessions older than `ttl`; running sessions are cancelled too
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let ttl =
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - ttl;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            let keep = entry.session.created_at > cutoff;
            if !keep {
                entry.cancel.cancel();
            }
            keep
        });
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, "expired sessions swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_session() -> (SessionStore, String) {
        let store = SessionStore::new();
        let token = store.create(
            "https://example.com/v",
            RequesterId(7),
            vec!["137".to_string()],
        );
        (store, token)
    }

    #[test]
    fn tokens_are_unique() {
        let store = SessionStore::new();
        let a = store.create("u", RequesterId(1), vec![]);
        let b = store.create("u", RequesterId(1), vec![]);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn claim_is_exclusive() {
        let (store, token) = store_with_session();

        let claimed = store.claim(&token).expect("first claim");
        assert_eq!(claimed.session.source_url, "https://example.com/v");
        assert!(claimed.session.offers("137"));
        assert!(matches!(store.claim(&token), Err(LeechError::SessionBusy(_))));
    }

    #[test]
    fn finished_session_is_unresolvable() {
        let (store, token) = store_with_session();
        store.claim(&token).expect("claim");

        store.finish(&token);

        assert!(store.get(&token).is_none());
        assert!(matches!(store.claim(&token), Err(LeechError::SessionNotFound(_))));
    }

    #[test]
    fn cancel_fires_the_run_token() {
        let (store, token) = store_with_session();
        let claimed = store.claim(&token).expect("claim");

        assert!(store.cancel(&token));
        assert!(claimed.cancel.is_cancelled());
        assert!(!store.contains(&token));
        assert!(!store.cancel(&token));
    }

    #[test]
    fn sweep_removes_only_stale_sessions() {
        let (store, token) = store_with_session();

        assert_eq!(store.sweep_expired(Duration::from_secs(3600)), 0);
        assert!(store.contains(&token));

        assert_eq!(store.sweep_expired(Duration::ZERO), 1);
        assert!(store.is_empty());
    }
}
