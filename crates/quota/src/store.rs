//! Persistence trait for monthly usage rows.

use async_trait::async_trait;

use crate::{Result, period::BillingPeriod, types::MonthlyUsage};

/// Persistence backend for monthly usage accounting.
///
/// Counter mutations happen inside the store (upsert-increment), never as a
/// read-modify-write in the caller, so concurrent writers cannot lose
/// updates.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Count one conversation for the tenant's period, at most once per
    /// `session_id`. Returns false when the session was already counted
    /// (by this or any other reporting path).
    async fn record_conversation(
        &self,
        tenant_id: &str,
        period: BillingPeriod,
        session_id: &str,
        now_ms: u64,
    ) -> Result<bool>;

    /// Add a manual top-up to the period's `adjusted_by`, creating the row
    /// if absent. Returns the updated row.
    async fn add_adjustment(
        &self,
        tenant_id: &str,
        period: BillingPeriod,
        amount: u64,
        now_ms: u64,
    ) -> Result<MonthlyUsage>;

    async fn get(&self, tenant_id: &str, period: BillingPeriod) -> Result<Option<MonthlyUsage>>;

    /// All tenants' rows for one period (admin listings).
    async fn list_for_period(&self, period: BillingPeriod) -> Result<Vec<MonthlyUsage>>;
}
