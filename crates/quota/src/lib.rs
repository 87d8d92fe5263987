//! Monthly conversation quotas: usage counters, plan limits, manual top-ups,
//! and the admission decision made before every outbound send.

pub mod admission;
pub mod error;
pub mod ledger;
pub mod period;
pub mod plan;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    admission::{AdmissionDecision, AdmissionGate},
    error::{Error, Result},
    ledger::QuotaLedger,
    period::BillingPeriod,
    plan::{PlanLimit, PlanResolver, StaticPlanResolver},
    store::UsageStore,
    store_memory::InMemoryUsageStore,
    store_sqlite::SqliteUsageStore,
    types::{MonthlyUsage, NEARING_QUOTA_PERCENT, QUOTA_EXCEEDED, QuotaStatus},
};

/// Run database migrations for the quota crate.
///
/// Creates the `monthly_usage` and `quota_counted_sessions` tables. Call at
/// application startup when using [`store_sqlite::SqliteUsageStore`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
