//! Durable outbound dispatch: a FIFO-per-conversation job queue with
//! per-tenant concurrency caps, global rate/concurrency ceilings, retry with
//! exponential backoff, and stall-timeout redelivery (at-least-once).

pub mod error;
pub mod limits;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod transport;
pub mod types;
pub mod worker;

pub use {
    error::{Error, Result},
    limits::DispatchLimits,
    store::JobStore,
    store_memory::InMemoryJobStore,
    store_sqlite::SqliteJobStore,
    transport::{Transport, TransportError},
    types::{DispatchConfig, DispatchEvent, DispatchJob, JobCreate, JobStatus, QueueStatus},
    worker::{DeliveredFn, DispatchWorker, EventFn},
};

/// Run database migrations for the dispatch crate.
///
/// Creates the `dispatch_jobs` table. Call at application startup when using
/// [`store_sqlite::SqliteJobStore`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
