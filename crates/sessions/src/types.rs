//! Core data types for conversation window tracking.

use serde::{Deserialize, Serialize};

/// Length of a conversation window: 24 hours of rolling activity.
pub const SESSION_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// One conversational window between a tenant and a counterparty.
///
/// The window start is fixed at first contact; the end slides forward to
/// `activity + 24h` on every message, so an active conversation keeps a
/// single window alive indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub id: String,
    pub tenant_id: String,
    pub counterparty_id: String,
    pub window_start_ms: u64,
    pub window_end_ms: u64,
    pub message_count: u64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl ConversationSession {
    /// Build a fresh window opening at `now_ms` with one message counted.
    #[must_use]
    pub fn open(tenant_id: &str, counterparty_id: &str, now_ms: u64) -> Self {
        Self {
            id: tavolo_common::new_id(),
            tenant_id: tenant_id.to_string(),
            counterparty_id: counterparty_id.to_string(),
            window_start_ms: now_ms,
            window_end_ms: now_ms + SESSION_WINDOW_MS,
            message_count: 1,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Whether this window is still open at `now_ms`.
    #[must_use]
    pub fn is_active_at(&self, now_ms: u64) -> bool {
        self.window_end_ms >= now_ms
    }
}

/// Result of recording one message against the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTouch {
    /// True when this message opened a new window (a billable conversation).
    pub is_new_session: bool,
    pub session_id: String,
    pub window_start_ms: u64,
    pub window_end_ms: u64,
    pub message_count: u64,
}

impl SessionTouch {
    #[must_use]
    pub fn from_session(session: &ConversationSession, is_new_session: bool) -> Self {
        Self {
            is_new_session,
            session_id: session.id.clone(),
            window_start_ms: session.window_start_ms,
            window_end_ms: session.window_end_ms,
            message_count: session.message_count,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_spans_24h() {
        let s = ConversationSession::open("t1", "c1", 1_000);
        assert_eq!(s.window_start_ms, 1_000);
        assert_eq!(s.window_end_ms, 1_000 + SESSION_WINDOW_MS);
        assert_eq!(s.message_count, 1);
        assert!(s.is_active_at(1_000));
        assert!(s.is_active_at(s.window_end_ms));
        assert!(!s.is_active_at(s.window_end_ms + 1));
    }

    #[test]
    fn test_touch_serializes_camel_case() {
        let s = ConversationSession::open("t1", "c1", 1_000);
        let touch = SessionTouch::from_session(&s, true);
        let v = serde_json::to_value(&touch).unwrap();
        assert_eq!(v["isNewSession"], true);
        assert_eq!(v["windowStartMs"], 1_000);
    }
}
