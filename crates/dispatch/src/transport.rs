//! The outbound transport seam.
//!
//! The actual message delivery (provider API calls, template rendering,
//! phone-number routing) lives outside this core; the worker only needs a
//! way to hand a payload over and learn which class of failure it hit.

use {async_trait::async_trait, thiserror::Error};

/// Delivery failure classes, which drive the retry policy.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Worth retrying: timeouts, upstream throttling, flaky networks.
    #[error("transient transport failure: {0}")]
    Transient(String),

    /// Not worth retrying: the upstream rejected the send outright.
    #[error("permanent transport failure: {0}")]
    Permanent(String),

    /// The payload itself is malformed; fails on first attempt, never retried.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl TransportError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Delivers one payload to a counterparty on behalf of a tenant.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), TransportError>;
}
