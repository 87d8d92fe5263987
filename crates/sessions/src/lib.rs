//! 24-hour conversation window tracking per (tenant, counterparty) pair.
//! Windows slide forward on activity; first contact opens a new window.
//! Creation races are resolved at the store level, not with locks.

pub mod error;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod tracker;
pub mod types;

pub use {
    error::{Error, Result},
    store::{InsertOutcome, SessionStore},
    store_memory::InMemorySessionStore,
    store_sqlite::SqliteSessionStore,
    tracker::SessionTracker,
    types::{ConversationSession, SESSION_WINDOW_MS, SessionTouch},
};

/// Run database migrations for the sessions crate.
///
/// Creates the `conversation_sessions` table. Call at application startup
/// when using [`store_sqlite::SqliteSessionStore`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
