//! Window detection: find-or-create with store-level conflict resolution.

use std::sync::Arc;

use tracing::{debug, info};

#[cfg(feature = "metrics")]
use tavolo_metrics::{counter, session as session_metrics};

use crate::{
    Error, Result,
    store::{InsertOutcome, SessionStore},
    types::{ConversationSession, SESSION_WINDOW_MS, SessionTouch},
};

/// Detects and maintains conversation windows.
///
/// `touch` is safe to call from any number of processes at once: the create
/// path is an optimistic insert, and a conflict means a concurrent caller
/// won the race, so the loser re-reads and extends the winner's window.
pub struct SessionTracker {
    store: Arc<dyn SessionStore>,
}

impl SessionTracker {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Record one message for (tenant, counterparty) at `now_ms`.
    ///
    /// Returns whether the message opened a new window, plus the window it
    /// landed in. Every call either creates a window with `message_count = 1`
    /// or bumps an existing window's count by exactly one.
    pub async fn touch(
        &self,
        tenant_id: &str,
        counterparty_id: &str,
        now_ms: u64,
    ) -> Result<SessionTouch> {
        if let Some(existing) = self
            .store
            .find_active(tenant_id, counterparty_id, now_ms)
            .await?
        {
            return self.extend(&existing, now_ms).await;
        }

        let candidate = ConversationSession::open(tenant_id, counterparty_id, now_ms);
        match self.store.try_insert(&candidate).await? {
            InsertOutcome::Inserted => {
                info!(
                    tenant_id,
                    counterparty_id,
                    session_id = %candidate.id,
                    "conversation window opened"
                );
                #[cfg(feature = "metrics")]
                counter!(session_metrics::WINDOWS_OPENED_TOTAL).increment(1);
                Ok(SessionTouch::from_session(&candidate, true))
            },
            InsertOutcome::Conflict => {
                // A concurrent first message created the window; fold this
                // message into it. If the winner is gone, something is wrong
                // with the store and the caller must hear about it.
                debug!(tenant_id, counterparty_id, "window insert lost race");
                let winner = self
                    .store
                    .find_active(tenant_id, counterparty_id, now_ms)
                    .await?
                    .ok_or_else(|| Error::ConflictWinnerMissing {
                        tenant_id: tenant_id.to_string(),
                        counterparty_id: counterparty_id.to_string(),
                    })?;
                self.extend(&winner, now_ms).await
            },
        }
    }

    async fn extend(&self, session: &ConversationSession, now_ms: u64) -> Result<SessionTouch> {
        let updated = self
            .store
            .extend(&session.id, now_ms + SESSION_WINDOW_MS, now_ms)
            .await?;
        #[cfg(feature = "metrics")]
        counter!(session_metrics::WINDOWS_EXTENDED_TOTAL).increment(1);
        Ok(SessionTouch::from_session(&updated, false))
    }
}
