//! The monthly usage ledger: counting, status derivation, top-ups.

use std::sync::Arc;

use tracing::{debug, info};

#[cfg(feature = "metrics")]
use tavolo_metrics::{counter, quota as quota_metrics};

use crate::{
    Result,
    period::BillingPeriod,
    plan::{PlanLimit, PlanResolver},
    store::UsageStore,
    types::{MonthlyUsage, NEARING_QUOTA_PERCENT, QuotaStatus},
};

/// Bookkeeping over the usage store plus plan resolution.
///
/// Counting is idempotent per session id: any number of reporting paths
/// (admission-time tracking, worker confirmation) may report the same
/// session, and exactly one of them lands.
pub struct QuotaLedger {
    store: Arc<dyn UsageStore>,
    plans: Arc<dyn PlanResolver>,
}

impl QuotaLedger {
    #[must_use]
    pub fn new(store: Arc<dyn UsageStore>, plans: Arc<dyn PlanResolver>) -> Self {
        Self { store, plans }
    }

    /// Record a usage event. Only new sessions count; repeated reports for
    /// the same session id are no-ops. Returns whether this call counted.
    pub async fn track_usage(
        &self,
        tenant_id: &str,
        is_new_session: bool,
        session_id: &str,
        now_ms: u64,
    ) -> Result<bool> {
        if !is_new_session {
            return Ok(false);
        }

        let period = BillingPeriod::from_ms(now_ms);
        let counted = self
            .store
            .record_conversation(tenant_id, period, session_id, now_ms)
            .await?;

        if counted {
            info!(tenant_id, session_id, "conversation counted against quota");
            #[cfg(feature = "metrics")]
            counter!(quota_metrics::CONVERSATIONS_COUNTED_TOTAL).increment(1);
        } else {
            debug!(tenant_id, session_id, "conversation already counted");
        }
        Ok(counted)
    }

    /// Derived quota snapshot for a tenant at `now_ms`.
    pub async fn status(&self, tenant_id: &str, now_ms: u64) -> Result<QuotaStatus> {
        let period = BillingPeriod::from_ms(now_ms);
        let usage = self
            .store
            .get(tenant_id, period)
            .await?
            .unwrap_or_else(|| MonthlyUsage::empty(tenant_id, period, now_ms));
        let plan = self.plans.plan_limit(tenant_id).await?;
        Ok(build_status(&usage, plan, now_ms))
    }

    /// Add a manual top-up to the current month's allowance.
    pub async fn renew(
        &self,
        tenant_id: &str,
        amount: u64,
        reason: &str,
        now_ms: u64,
    ) -> Result<MonthlyUsage> {
        let period = BillingPeriod::from_ms(now_ms);
        let row = self
            .store
            .add_adjustment(tenant_id, period, amount, now_ms)
            .await?;
        info!(
            tenant_id,
            amount,
            reason,
            adjusted_by = row.adjusted_by,
            "quota topped up"
        );
        #[cfg(feature = "metrics")]
        counter!(quota_metrics::TOPUPS_TOTAL).increment(1);
        Ok(row)
    }

    /// Statuses for every tenant with a current-month row at or above
    /// `threshold_percent` usage. Unlimited tenants never appear.
    pub async fn list_nearing(
        &self,
        threshold_percent: f64,
        now_ms: u64,
    ) -> Result<Vec<QuotaStatus>> {
        let period = BillingPeriod::from_ms(now_ms);
        let rows = self.store.list_for_period(period).await?;

        let mut out = Vec::new();
        for usage in rows {
            let plan = self.plans.plan_limit(&usage.tenant_id).await?;
            let status = build_status(&usage, plan, now_ms);
            if status
                .usage_percent
                .is_some_and(|pct| pct >= threshold_percent)
            {
                out.push(status);
            }
        }
        Ok(out)
    }
}

/// Derive a status snapshot from a usage row and a plan allowance.
fn build_status(usage: &MonthlyUsage, plan: PlanLimit, now_ms: u64) -> QuotaStatus {
    let period = usage.period();
    let used = usage.conversation_count;
    let (limit, remaining, usage_percent, nearing_quota) = match plan {
        PlanLimit::Unlimited => (None, None, None, false),
        PlanLimit::Limited(base) => {
            let limit = base + usage.adjusted_by;
            let remaining = limit.saturating_sub(used);
            let percent = if limit == 0 {
                100.0
            } else {
                used as f64 * 100.0 / limit as f64
            };
            (
                Some(limit),
                Some(remaining),
                Some(percent),
                percent >= NEARING_QUOTA_PERCENT,
            )
        },
    };

    QuotaStatus {
        tenant_id: usage.tenant_id.clone(),
        used,
        limit,
        remaining,
        usage_percent,
        nearing_quota,
        reset_at_ms: period.reset_at_ms(),
        days_until_reset: period.days_until_reset(now_ms),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{plan::StaticPlanResolver, store_memory::InMemoryUsageStore},
    };

    // 2025-06-15T12:00:00Z
    const NOW: u64 = 1_749_988_800_000;

    fn make_ledger(limit: PlanLimit) -> QuotaLedger {
        QuotaLedger::new(
            Arc::new(InMemoryUsageStore::new()),
            Arc::new(StaticPlanResolver::new(limit)),
        )
    }

    #[tokio::test]
    async fn test_only_new_sessions_count() {
        let ledger = make_ledger(PlanLimit::Limited(1_000));
        assert!(ledger.track_usage("t1", true, "s1", NOW).await.unwrap());
        assert!(!ledger.track_usage("t1", false, "s1", NOW).await.unwrap());
        assert!(!ledger.track_usage("t1", false, "s2", NOW).await.unwrap());

        let status = ledger.status("t1", NOW).await.unwrap();
        assert_eq!(status.used, 1);
    }

    #[tokio::test]
    async fn test_double_report_of_same_session_counts_once() {
        let ledger = make_ledger(PlanLimit::Limited(1_000));
        // Admission path and worker path both report the same session.
        assert!(ledger.track_usage("t1", true, "s1", NOW).await.unwrap());
        assert!(!ledger.track_usage("t1", true, "s1", NOW).await.unwrap());

        assert_eq!(ledger.status("t1", NOW).await.unwrap().used, 1);
    }

    #[tokio::test]
    async fn test_status_math() {
        let ledger = make_ledger(PlanLimit::Limited(1_000));
        for i in 0..250 {
            ledger
                .track_usage("t1", true, &format!("s{i}"), NOW)
                .await
                .unwrap();
        }

        let status = ledger.status("t1", NOW).await.unwrap();
        assert_eq!(status.used, 250);
        assert_eq!(status.limit, Some(1_000));
        assert_eq!(status.remaining, Some(750));
        assert_eq!(status.usage_percent, Some(25.0));
        assert!(!status.nearing_quota);
        assert_eq!(status.days_until_reset, 16);
    }

    #[tokio::test]
    async fn test_nearing_quota_at_ninety_percent() {
        let ledger = make_ledger(PlanLimit::Limited(10));
        for i in 0..9 {
            ledger
                .track_usage("t1", true, &format!("s{i}"), NOW)
                .await
                .unwrap();
        }
        let status = ledger.status("t1", NOW).await.unwrap();
        assert_eq!(status.usage_percent, Some(90.0));
        assert!(status.nearing_quota);
    }

    #[tokio::test]
    async fn test_unlimited_plan_omits_percentages() {
        let ledger = make_ledger(PlanLimit::Unlimited);
        ledger.track_usage("t1", true, "s1", NOW).await.unwrap();

        let status = ledger.status("t1", NOW).await.unwrap();
        assert_eq!(status.used, 1);
        assert!(status.limit.is_none());
        assert!(status.remaining.is_none());
        assert!(status.usage_percent.is_none());
        assert!(!status.nearing_quota);
        // The reset date is still computed.
        assert!(status.reset_at_ms > NOW);
        assert_eq!(status.days_until_reset, 16);
    }

    #[tokio::test]
    async fn test_renew_twice_accumulates_and_raises_limit() {
        let ledger = make_ledger(PlanLimit::Limited(1_000));
        ledger.renew("t1", 1_000, "promo", NOW).await.unwrap();
        let row = ledger.renew("t1", 1_000, "promo", NOW).await.unwrap();
        assert_eq!(row.adjusted_by, 2_000);

        let status = ledger.status("t1", NOW).await.unwrap();
        assert_eq!(status.limit, Some(3_000));
    }

    #[tokio::test]
    async fn test_status_for_untracked_tenant_is_zeroed() {
        let ledger = make_ledger(PlanLimit::Limited(100));
        let status = ledger.status("nobody", NOW).await.unwrap();
        assert_eq!(status.used, 0);
        assert_eq!(status.remaining, Some(100));
        assert_eq!(status.usage_percent, Some(0.0));
    }

    #[tokio::test]
    async fn test_list_nearing_filters_by_threshold() {
        let store = Arc::new(InMemoryUsageStore::new());
        let plans = Arc::new(
            StaticPlanResolver::new(PlanLimit::Limited(10)).with_override("vip", PlanLimit::Unlimited),
        );
        let ledger = QuotaLedger::new(store, plans);

        for i in 0..9 {
            ledger
                .track_usage("hot", true, &format!("h{i}"), NOW)
                .await
                .unwrap();
        }
        ledger.track_usage("cold", true, "c1", NOW).await.unwrap();
        for i in 0..50 {
            ledger
                .track_usage("vip", true, &format!("v{i}"), NOW)
                .await
                .unwrap();
        }

        let nearing = ledger.list_nearing(90.0, NOW).await.unwrap();
        assert_eq!(nearing.len(), 1);
        assert_eq!(nearing[0].tenant_id, "hot");
    }

    #[tokio::test]
    async fn test_month_rollover_starts_fresh_row() {
        let ledger = make_ledger(PlanLimit::Limited(1_000));
        ledger.track_usage("t1", true, "s1", NOW).await.unwrap();
        ledger.renew("t1", 500, "promo", NOW).await.unwrap();

        let next_month = BillingPeriod::from_ms(NOW).reset_at_ms() + 1;
        let status = ledger.status("t1", next_month).await.unwrap();
        assert_eq!(status.used, 0);
        // Top-ups do not carry over.
        assert_eq!(status.limit, Some(1_000));
    }
}
