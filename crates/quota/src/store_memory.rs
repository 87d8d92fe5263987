//! In-memory usage store for testing.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{Result, period::BillingPeriod, store::UsageStore, types::MonthlyUsage};

/// In-memory store backed by `HashMap`. No persistence — for tests only.
pub struct InMemoryUsageStore {
    rows: Mutex<HashMap<(String, u32, i32), MonthlyUsage>>,
    counted: Mutex<HashSet<String>>,
}

impl InMemoryUsageStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            counted: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for InMemoryUsageStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key(tenant_id: &str, period: BillingPeriod) -> (String, u32, i32) {
    (tenant_id.to_string(), period.month, period.year)
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn record_conversation(
        &self,
        tenant_id: &str,
        period: BillingPeriod,
        session_id: &str,
        now_ms: u64,
    ) -> Result<bool> {
        {
            let mut counted = self.counted.lock().unwrap_or_else(|e| e.into_inner());
            if !counted.insert(session_id.to_string()) {
                return Ok(false);
            }
        }

        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let row = rows
            .entry(key(tenant_id, period))
            .or_insert_with(|| MonthlyUsage::empty(tenant_id, period, now_ms));
        row.conversation_count += 1;
        row.last_conversation_at_ms = Some(now_ms);
        row.updated_at_ms = now_ms;
        Ok(true)
    }

    async fn add_adjustment(
        &self,
        tenant_id: &str,
        period: BillingPeriod,
        amount: u64,
        now_ms: u64,
    ) -> Result<MonthlyUsage> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let row = rows
            .entry(key(tenant_id, period))
            .or_insert_with(|| MonthlyUsage::empty(tenant_id, period, now_ms));
        row.adjusted_by += amount;
        row.updated_at_ms = now_ms;
        Ok(row.clone())
    }

    async fn get(&self, tenant_id: &str, period: BillingPeriod) -> Result<Option<MonthlyUsage>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.get(&key(tenant_id, period)).cloned())
    }

    async fn list_for_period(&self, period: BillingPeriod) -> Result<Vec<MonthlyUsage>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<MonthlyUsage> = rows
            .values()
            .filter(|r| r.month == period.month && r.year == period.year)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(out)
    }
}
