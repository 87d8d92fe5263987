//! Persistence trait for dispatch jobs.

use async_trait::async_trait;

use crate::{
    Result,
    types::{DispatchJob, JobCreate, QueueStatus},
};

/// Durable job store with claim-based dequeue.
///
/// `claim_next` embeds the two ordering rules the queue guarantees:
/// only the oldest non-terminal job of a (tenant, conversation) key is ever
/// eligible, and among eligible jobs higher priority wins, then creation
/// order. Claiming marks the job `active` atomically, so concurrent workers
/// never double-claim.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Append a job in `waiting` state. The store assigns `seq`.
    async fn enqueue(&self, create: JobCreate, now_ms: u64) -> Result<DispatchJob>;

    /// Claim the next eligible job (available and head of its key), marking
    /// it `active`. Returns `None` when nothing is claimable.
    async fn claim_next(&self, now_ms: u64) -> Result<Option<DispatchJob>>;

    /// Park a claimed job until `available_at_ms` (ceiling backpressure).
    /// Leaves the attempt counter untouched.
    async fn delay(&self, job_id: &str, available_at_ms: u64, now_ms: u64) -> Result<()>;

    /// Schedule a retry after a transient failure: record the consumed
    /// attempt and the error, and park until `available_at_ms`.
    async fn retry(
        &self,
        job_id: &str,
        attempts: u32,
        available_at_ms: u64,
        error: &str,
        now_ms: u64,
    ) -> Result<()>;

    async fn complete(&self, job_id: &str, now_ms: u64) -> Result<()>;

    /// Terminal failure.
    async fn fail(&self, job_id: &str, error: &str, now_ms: u64) -> Result<()>;

    /// Return `active` jobs untouched for longer than `stall_timeout_ms` to
    /// `waiting` so another worker can redeliver them. Returns how many.
    async fn requeue_stalled(&self, now_ms: u64, stall_timeout_ms: u64) -> Result<u64>;

    /// Delete terminal jobs finished more than `retention_ms` ago.
    async fn purge_terminal(&self, now_ms: u64, retention_ms: u64) -> Result<u64>;

    async fn get(&self, job_id: &str) -> Result<Option<DispatchJob>>;

    /// Queue depth by status.
    async fn counts(&self) -> Result<QueueStatus>;
}
