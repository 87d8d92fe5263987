//! Core data types for the dispatch queue.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued job.
///
/// Transitions are monotonic except `delayed → waiting` (requeue) and the
/// retry path `active → delayed`. `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Delayed => "delayed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "delayed" => Some(Self::Delayed),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states see no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One outbound send request in the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    pub id: String,
    /// Store-assigned creation order; the FIFO key within a conversation.
    pub seq: i64,
    pub tenant_id: String,
    pub conversation_id: String,
    /// Opaque to the queue; handed to the transport verbatim.
    pub payload: serde_json::Value,
    /// Higher dispatches first across conversations; never reorders within one.
    pub priority: i32,
    /// Delivery attempts consumed so far.
    pub attempts: u32,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Earliest instant the job may be claimed (backoff / backpressure).
    pub available_at_ms: u64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl DispatchJob {
    /// Grouping key within which dispatch order is strict FIFO.
    #[must_use]
    pub fn concurrency_key(&self) -> String {
        format!("{}:{}", self.tenant_id, self.conversation_id)
    }
}

/// Input for enqueueing a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreate {
    pub tenant_id: String,
    pub conversation_id: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
}

/// Completion/failure notification for the observability collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEvent {
    pub job_id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    pub status: JobStatus,
    pub timestamp_ms: u64,
}

/// Queue depth snapshot by status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Scheduling and retry knobs for the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Max simultaneously active jobs per tenant.
    pub tenant_max_active: u32,
    /// Max simultaneously active jobs across all tenants.
    pub global_max_active: u32,
    /// Max claims per second across all tenants.
    pub global_rate_per_second: u32,
    /// Total delivery attempts before a transient failure becomes terminal.
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub base_backoff_ms: u64,
    /// Ceiling for the doubling backoff.
    pub max_backoff_ms: u64,
    /// Park time when a concurrency ceiling bounces a claimed job.
    /// Does not consume an attempt.
    pub cap_delay_ms: u64,
    /// Per-attempt delivery timeout; expiry counts as a transient failure.
    pub attempt_timeout_ms: u64,
    /// Active jobs older than this are presumed orphaned and requeued.
    pub stall_timeout_ms: u64,
    /// Idle poll interval of the pull loop.
    pub poll_interval_ms: u64,
    /// How often the stall sweep runs.
    pub stall_sweep_interval_ms: u64,
    /// Terminal jobs are kept this long for inspection, then purged.
    pub terminal_retention_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tenant_max_active: 5,
            global_max_active: 20,
            global_rate_per_second: 80,
            max_attempts: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            cap_delay_ms: 1_000,
            attempt_timeout_ms: 30_000,
            stall_timeout_ms: 120_000,
            poll_interval_ms: 250,
            stall_sweep_interval_ms: 30_000,
            terminal_retention_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl DispatchConfig {
    /// Retry delay before attempt `attempt + 1`, doubling per failed attempt
    /// and capped at `max_backoff_ms`.
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_backoff_ms
            .saturating_mul(1 << exp)
            .min(self.max_backoff_ms)
    }
}
