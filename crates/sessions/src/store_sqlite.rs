//! SQLite-backed session store using sqlx.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use crate::{
    Error, Result,
    store::{InsertOutcome, SessionStore},
    types::ConversationSession,
};

/// SQLite-backed persistence for conversation windows.
///
/// The window-creation race is resolved inside the database: the insert is a
/// single guarded statement that refuses to create a window overlapping an
/// active one, with the unique index on (tenant, counterparty, window start)
/// as a backstop. No application-level locking.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Create a store using an existing pool (migrations must already be run).
    ///
    /// Call [`crate::run_migrations`] before using this constructor.
    #[must_use]
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: &SqliteRow) -> ConversationSession {
    ConversationSession {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        counterparty_id: row.get("counterparty_id"),
        window_start_ms: row.get::<i64, _>("window_start_ms") as u64,
        window_end_ms: row.get::<i64, _>("window_end_ms") as u64,
        message_count: row.get::<i64, _>("message_count") as u64,
        created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
        updated_at_ms: row.get::<i64, _>("updated_at_ms") as u64,
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn find_active(
        &self,
        tenant_id: &str,
        counterparty_id: &str,
        now_ms: u64,
    ) -> Result<Option<ConversationSession>> {
        let row = sqlx::query(
            "SELECT * FROM conversation_sessions
             WHERE tenant_id = ? AND counterparty_id = ? AND window_end_ms >= ?
             ORDER BY window_start_ms DESC
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(counterparty_id)
        .bind(now_ms as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn try_insert(&self, session: &ConversationSession) -> Result<InsertOutcome> {
        let result = sqlx::query(
            "INSERT INTO conversation_sessions
                 (id, tenant_id, counterparty_id, window_start_ms, window_end_ms,
                  message_count, created_at_ms, updated_at_ms)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?
             WHERE NOT EXISTS (
                 SELECT 1 FROM conversation_sessions
                 WHERE tenant_id = ? AND counterparty_id = ? AND window_end_ms >= ?
             )",
        )
        .bind(&session.id)
        .bind(&session.tenant_id)
        .bind(&session.counterparty_id)
        .bind(session.window_start_ms as i64)
        .bind(session.window_end_ms as i64)
        .bind(session.message_count as i64)
        .bind(session.created_at_ms as i64)
        .bind(session.updated_at_ms as i64)
        .bind(&session.tenant_id)
        .bind(&session.counterparty_id)
        .bind(session.window_start_ms as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Ok(InsertOutcome::Conflict),
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(InsertOutcome::Conflict)
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn extend(
        &self,
        session_id: &str,
        window_end_ms: u64,
        now_ms: u64,
    ) -> Result<ConversationSession> {
        let result = sqlx::query(
            "UPDATE conversation_sessions
             SET message_count = message_count + 1,
                 window_end_ms = MAX(window_end_ms, ?),
                 updated_at_ms = ?
             WHERE id = ?",
        )
        .bind(window_end_ms as i64)
        .bind(now_ms as i64)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::session_not_found(session_id));
        }

        self.get(session_id)
            .await?
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    async fn get(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        let row = sqlx::query("SELECT * FROM conversation_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(session_from_row))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::SESSION_WINDOW_MS,
        sqlx::sqlite::SqlitePoolOptions,
    };

    async fn make_store() -> SqliteSessionStore {
        // One connection: `sqlite::memory:` is a distinct database per
        // connection, so the pool must not open a second one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteSessionStore::with_pool(pool)
    }

    #[tokio::test]
    async fn test_insert_find_roundtrip() {
        let store = make_store().await;
        let s = ConversationSession::open("t1", "c1", 1_000);
        assert_eq!(store.try_insert(&s).await.unwrap(), InsertOutcome::Inserted);

        let found = store.find_active("t1", "c1", 2_000).await.unwrap().unwrap();
        assert_eq!(found, s);
    }

    #[tokio::test]
    async fn test_overlapping_insert_conflicts() {
        let store = make_store().await;
        store
            .try_insert(&ConversationSession::open("t1", "c1", 1_000))
            .await
            .unwrap();

        let racer = ConversationSession::open("t1", "c1", 1_003);
        assert_eq!(
            store.try_insert(&racer).await.unwrap(),
            InsertOutcome::Conflict
        );
        // The losing row must not have been written.
        assert!(store.get(&racer.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_window_after_expiry() {
        let store = make_store().await;
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

        // find_active picks the newest window.
        let found = store.find_active("t1", "c1", later).await.unwrap().unwrap();
        assert_eq!(found.id, next.id);
    }

    #[tokio::test]
    async fn test_extend_increments_and_slides() {
        let store = make_store().await;
        let s = ConversationSession::open("t1", "c1", 1_000);
        store.try_insert(&s).await.unwrap();

        let extended = store
            .extend(&s.id, 9_000 + SESSION_WINDOW_MS, 9_000)
            .await
            .unwrap();
        assert_eq!(extended.message_count, 2);
        assert_eq!(extended.window_end_ms, 9_000 + SESSION_WINDOW_MS);
        assert_eq!(extended.window_start_ms, 1_000);
        assert_eq!(extended.updated_at_ms, 9_000);
    }

    #[tokio::test]
    async fn test_extend_missing_session() {
        let store = make_store().await;
        assert!(matches!(
            store.extend("nope", 1_000, 1_000).await,
            Err(Error::SessionNotFound { .. })
        ));
    }
}
