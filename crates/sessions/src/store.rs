//! Persistence trait for conversation session windows.

use async_trait::async_trait;

use crate::{Result, types::ConversationSession};

/// Outcome of an optimistic window insert.
///
/// `Conflict` means another writer created an overlapping window first; the
/// caller re-reads and extends the surviving row instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Conflict,
}

/// Persistence backend for conversation windows.
///
/// Implementations must make `try_insert` atomic with respect to concurrent
/// inserts for the same (tenant, counterparty) pair: exactly one of N
/// simultaneous first-contact inserts may return `Inserted`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Most recent window for the pair whose end is at or after `now_ms`.
    async fn find_active(
        &self,
        tenant_id: &str,
        counterparty_id: &str,
        now_ms: u64,
    ) -> Result<Option<ConversationSession>>;

    /// Insert a new window unless an overlapping one already exists.
    async fn try_insert(&self, session: &ConversationSession) -> Result<InsertOutcome>;

    /// Record one message against an existing window: increment the message
    /// count and slide the end to `max(current end, window_end_ms)`. The
    /// window start never moves.
    async fn extend(
        &self,
        session_id: &str,
        window_end_ms: u64,
        now_ms: u64,
    ) -> Result<ConversationSession>;

    async fn get(&self, session_id: &str) -> Result<Option<ConversationSession>>;
}
