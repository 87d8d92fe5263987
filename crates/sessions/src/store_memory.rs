//! In-memory session store for testing.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    Error, Result,
    store::{InsertOutcome, SessionStore},
    types::ConversationSession,
};

/// In-memory store backed by `HashMap`. No persistence — for tests only.
///
/// The interior mutex gives the same atomicity the SQLite store gets from
/// single-statement guarded inserts, so tracker race tests behave the same
/// against either backend.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, ConversationSession>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_active(
        &self,
        tenant_id: &str,
        counterparty_id: &str,
        now_ms: u64,
    ) -> Result<Option<ConversationSession>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let found = sessions
            .values()
            .filter(|s| {
                s.tenant_id == tenant_id
                    && s.counterparty_id == counterparty_id
                    && s.window_end_ms >= now_ms
            })
            .max_by_key(|s| s.window_start_ms)
            .cloned();
        Ok(found)
    }

    async fn try_insert(&self, session: &ConversationSession) -> Result<InsertOutcome> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let overlapping = sessions.values().any(|s| {
            s.tenant_id == session.tenant_id
                && s.counterparty_id == session.counterparty_id
                && s.window_end_ms >= session.window_start_ms
        });
        if overlapping {
            return Ok(InsertOutcome::Conflict);
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn extend(
        &self,
        session_id: &str,
        window_end_ms: u64,
        now_ms: u64,
    ) -> Result<ConversationSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::session_not_found(session_id))?;
        session.message_count += 1;
        session.window_end_ms = session.window_end_ms.max(window_end_ms);
        session.updated_at_ms = now_ms;
        Ok(session.clone())
    }

    async fn get(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sessions.get(session_id).cloned())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::SESSION_WINDOW_MS};

    #[tokio::test]
    async fn test_insert_and_find_active() {
        let store = InMemorySessionStore::new();
        let s = ConversationSession::open("t1", "c1", 1_000);
        assert_eq!(store.try_insert(&s).await.unwrap(), InsertOutcome::Inserted);

        let found = store.find_active("t1", "c1", 2_000).await.unwrap().unwrap();
        assert_eq!(found.id, s.id);
    }

    #[tokio::test]
    async fn test_expired_window_not_active() {
        let store = InMemorySessionStore::new();
        let s = ConversationSession::open("t1", "c1", 1_000);
        store.try_insert(&s).await.unwrap();

        let later = 1_000 + SESSION_WINDOW_MS + 1;
        assert!(store.find_active("t1", "c1", later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_insert_conflicts() {
        let store = InMemorySessionStore::new();
        store
            .try_insert(&ConversationSession::open("t1", "c1", 1_000))
            .await
            .unwrap();

        let racer = ConversationSession::open("t1", "c1", 1_005);
        assert_eq!(
            store.try_insert(&racer).await.unwrap(),
            InsertOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn test_insert_after_expiry_succeeds() {
        let store = InMemorySessionStore::new();
        store
            .try_insert(&ConversationSession::open("t1", "c1", 1_000))
            .await
            .unwrap();

        let later = 1_000 + SESSION_WINDOW_MS + 1;
        let next = ConversationSession::open("t1", "c1", later);
        assert_eq!(
            store.try_insert(&next).await.unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn test_other_pair_does_not_conflict() {
        let store = InMemorySessionStore::new();
        store
            .try_insert(&ConversationSession::open("t1", "c1", 1_000))
            .await
            .unwrap();
        assert_eq!(
            store
                .try_insert(&ConversationSession::open("t1", "c2", 1_000))
                .await
                .unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store
                .try_insert(&ConversationSession::open("t2", "c1", 1_000))
                .await
                .unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn test_extend_slides_end_and_counts() {
        let store = InMemorySessionStore::new();
        let s = ConversationSession::open("t1", "c1", 1_000);
        store.try_insert(&s).await.unwrap();

        let extended = store
            .extend(&s.id, 5_000 + SESSION_WINDOW_MS, 5_000)
            .await
            .unwrap();
        assert_eq!(extended.message_count, 2);
        assert_eq!(extended.window_end_ms, 5_000 + SESSION_WINDOW_MS);
        assert_eq!(extended.window_start_ms, 1_000);
    }

    #[tokio::test]
    async fn test_extend_never_shrinks_window() {
        let store = InMemorySessionStore::new();
        let s = ConversationSession::open("t1", "c1", 10_000);
        store.try_insert(&s).await.unwrap();

        // An earlier-timestamped message must not pull the end backwards.
        let extended = store
            .extend(&s.id, 500 + SESSION_WINDOW_MS, 500)
            .await
            .unwrap();
        assert_eq!(extended.window_end_ms, 10_000 + SESSION_WINDOW_MS);
    }

    #[tokio::test]
    async fn test_extend_missing_session() {
        let store = InMemorySessionStore::new();
        assert!(store.extend("nope", 1_000, 1_000).await.is_err());
    }
}
