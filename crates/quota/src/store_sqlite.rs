//! SQLite-backed usage store using sqlx.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use crate::{
    Error, Result, period::BillingPeriod, store::UsageStore, types::MonthlyUsage,
};

/// SQLite-backed persistence for monthly usage rows.
///
/// Counter increments run as upserts inside the database, so concurrent
/// writers from any number of processes serialize on the row rather than
/// racing in application code.
pub struct SqliteUsageStore {
    pool: SqlitePool,
}

impl SqliteUsageStore {
    /// Create a store using an existing pool (migrations must already be run).
    ///
    /// Call [`crate::run_migrations`] before using this constructor.
    #[must_use]
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn usage_from_row(row: &SqliteRow) -> MonthlyUsage {
    MonthlyUsage {
        tenant_id: row.get("tenant_id"),
        month: row.get::<i64, _>("month") as u32,
        year: row.get::<i64, _>("year") as i32,
        conversation_count: row.get::<i64, _>("conversation_count") as u64,
        adjusted_by: row.get::<i64, _>("adjusted_by") as u64,
        last_conversation_at_ms: row
            .get::<Option<i64>, _>("last_conversation_at_ms")
            .map(|v| v as u64),
        created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
        updated_at_ms: row.get::<i64, _>("updated_at_ms") as u64,
    }
}

#[async_trait]
impl UsageStore for SqliteUsageStore {
    async fn record_conversation(
        &self,
        tenant_id: &str,
        period: BillingPeriod,
        session_id: &str,
        now_ms: u64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "INSERT INTO quota_counted_sessions (session_id, tenant_id)
             VALUES (?, ?)
             ON CONFLICT (session_id) DO NOTHING",
        )
        .bind(session_id)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO monthly_usage
                 (tenant_id, month, year, conversation_count, adjusted_by,
                  last_conversation_at_ms, created_at_ms, updated_at_ms)
             VALUES (?, ?, ?, 1, 0, ?, ?, ?)
             ON CONFLICT (tenant_id, month, year) DO UPDATE SET
                 conversation_count = conversation_count + 1,
                 last_conversation_at_ms = excluded.last_conversation_at_ms,
                 updated_at_ms = excluded.updated_at_ms",
        )
        .bind(tenant_id)
        .bind(period.month as i64)
        .bind(period.year as i64)
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn add_adjustment(
        &self,
        tenant_id: &str,
        period: BillingPeriod,
        amount: u64,
        now_ms: u64,
    ) -> Result<MonthlyUsage> {
        sqlx::query(
            "INSERT INTO monthly_usage
                 (tenant_id, month, year, conversation_count, adjusted_by,
                  last_conversation_at_ms, created_at_ms, updated_at_ms)
             VALUES (?, ?, ?, 0, ?, NULL, ?, ?)
             ON CONFLICT (tenant_id, month, year) DO UPDATE SET
                 adjusted_by = adjusted_by + excluded.adjusted_by,
                 updated_at_ms = excluded.updated_at_ms",
        )
        .bind(tenant_id)
        .bind(period.month as i64)
        .bind(period.year as i64)
        .bind(amount as i64)
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await?;

        self.get(tenant_id, period).await?.ok_or_else(|| {
            Error::message(format!(
                "usage row missing after adjustment for tenant {tenant_id}"
            ))
        })
    }

    async fn get(&self, tenant_id: &str, period: BillingPeriod) -> Result<Option<MonthlyUsage>> {
        let row = sqlx::query(
            "SELECT * FROM monthly_usage WHERE tenant_id = ? AND month = ? AND year = ?",
        )
        .bind(tenant_id)
        .bind(period.month as i64)
        .bind(period.year as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(usage_from_row))
    }

    async fn list_for_period(&self, period: BillingPeriod) -> Result<Vec<MonthlyUsage>> {
        let rows = sqlx::query(
            "SELECT * FROM monthly_usage WHERE month = ? AND year = ? ORDER BY tenant_id",
        )
        .bind(period.month as i64)
        .bind(period.year as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(usage_from_row).collect())
    }
}
