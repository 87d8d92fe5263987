//! Core data types for quota accounting.

use serde::{Deserialize, Serialize};

use crate::period::BillingPeriod;

/// Usage percentage at which a tenant is flagged as nearing its quota.
pub const NEARING_QUOTA_PERCENT: f64 = 90.0;

/// Stable, machine-readable code carried by admission denials.
pub const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";

/// One tenant's usage row for one calendar month.
///
/// `conversation_count` counts 24h windows, never individual messages.
/// `adjusted_by` is the sum of manual top-ups this month; it only grows and
/// resets implicitly when the next month starts a fresh row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUsage {
    pub tenant_id: String,
    pub month: u32,
    pub year: i32,
    pub conversation_count: u64,
    pub adjusted_by: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_conversation_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl MonthlyUsage {
    /// A zeroed row for a tenant that has no usage yet this period.
    #[must_use]
    pub fn empty(tenant_id: &str, period: BillingPeriod, now_ms: u64) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            month: period.month,
            year: period.year,
            conversation_count: 0,
            adjusted_by: 0,
            last_conversation_at_ms: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    #[must_use]
    pub fn period(&self) -> BillingPeriod {
        BillingPeriod {
            month: self.month,
            year: self.year,
        }
    }
}

/// Derived quota snapshot for one tenant, suitable for direct display.
///
/// `limit`, `remaining` and `usage_percent` are absent for unlimited plans;
/// the reset date is always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub tenant_id: String,
    pub used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<f64>,
    pub nearing_quota: bool,
    pub reset_at_ms: u64,
    pub days_until_reset: u32,
}
