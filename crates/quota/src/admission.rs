//! The admission gate: may this tenant send another message right now?

use std::sync::Arc;

use tracing::warn;

#[cfg(feature = "metrics")]
use tavolo_metrics::{counter, quota as quota_metrics};

use crate::{
    Result,
    ledger::QuotaLedger,
    types::{QUOTA_EXCEEDED, QuotaStatus},
};

/// Outcome of an admission check.
///
/// A denial carries the full status snapshot so callers can render
/// "limit reached, resets in N days" without a second lookup.
#[derive(Debug, Clone)]
pub enum AdmissionDecision {
    Allowed {
        /// True when usage is at or past the nearing-quota threshold; the
        /// send still proceeds, but callers should surface a warning.
        nearing_quota: bool,
        status: QuotaStatus,
    },
    Denied {
        /// Stable machine-readable code, always [`QUOTA_EXCEEDED`].
        code: &'static str,
        status: QuotaStatus,
    },
}

impl AdmissionDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    #[must_use]
    pub fn status(&self) -> &QuotaStatus {
        match self {
            Self::Allowed { status, .. } | Self::Denied { status, .. } => status,
        }
    }
}

/// Stateless admission checks against the ledger.
///
/// Every outbound-send path must call [`AdmissionGate::check`] before
/// sending or enqueueing; a denied tenant's message must go nowhere.
pub struct AdmissionGate {
    ledger: Arc<QuotaLedger>,
}

impl AdmissionGate {
    #[must_use]
    pub fn new(ledger: Arc<QuotaLedger>) -> Self {
        Self { ledger }
    }

    pub async fn check(&self, tenant_id: &str, now_ms: u64) -> Result<AdmissionDecision> {
        let status = self.ledger.status(tenant_id, now_ms).await?;

        match status.remaining {
            // Unlimited plan: always admitted, never nearing.
            None => Ok(AdmissionDecision::Allowed {
                nearing_quota: false,
                status,
            }),
            Some(0) => {
                warn!(
                    tenant_id,
                    used = status.used,
                    limit = status.limit,
                    days_until_reset = status.days_until_reset,
                    "send denied: monthly conversation quota exhausted"
                );
                #[cfg(feature = "metrics")]
                counter!(quota_metrics::ADMISSIONS_DENIED_TOTAL).increment(1);
                Ok(AdmissionDecision::Denied {
                    code: QUOTA_EXCEEDED,
                    status,
                })
            },
            Some(_) => {
                let nearing_quota = status.nearing_quota;
                if nearing_quota {
                    warn!(
                        tenant_id,
                        used = status.used,
                        limit = status.limit,
                        "tenant nearing monthly conversation quota"
                    );
                }
                Ok(AdmissionDecision::Allowed {
                    nearing_quota,
                    status,
                })
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            plan::{PlanLimit, StaticPlanResolver},
            store_memory::InMemoryUsageStore,
        },
    };

    // 2025-06-15T12:00:00Z
    const NOW: u64 = 1_749_988_800_000;

    fn make_gate(limit: PlanLimit) -> (Arc<QuotaLedger>, AdmissionGate) {
        let ledger = Arc::new(QuotaLedger::new(
            Arc::new(InMemoryUsageStore::new()),
            Arc::new(StaticPlanResolver::new(limit)),
        ));
        (Arc::clone(&ledger), AdmissionGate::new(ledger))
    }

    async fn use_up(ledger: &QuotaLedger, tenant: &str, n: usize) {
        for i in 0..n {
            ledger
                .track_usage(tenant, true, &format!("{tenant}-s{i}"), NOW)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_allowed_below_limit() {
        let (ledger, gate) = make_gate(PlanLimit::Limited(1_000));
        use_up(&ledger, "t1", 999).await;

        let decision = gate.check("t1", NOW).await.unwrap();
        match decision {
            AdmissionDecision::Allowed {
                nearing_quota,
                status,
            } => {
                assert!(nearing_quota);
                assert_eq!(status.remaining, Some(1));
            },
            AdmissionDecision::Denied { .. } => panic!("expected allowed at 999/1000"),
        }
    }

    #[tokio::test]
    async fn test_denied_at_limit() {
        let (ledger, gate) = make_gate(PlanLimit::Limited(1_000));
        use_up(&ledger, "t1", 1_000).await;

        let decision = gate.check("t1", NOW).await.unwrap();
        match decision {
            AdmissionDecision::Denied { code, status } => {
                assert_eq!(code, QUOTA_EXCEEDED);
                assert_eq!(status.remaining, Some(0));
                assert_eq!(status.usage_percent, Some(100.0));
                assert!(status.days_until_reset > 0);
            },
            AdmissionDecision::Allowed { .. } => panic!("expected denial at 1000/1000"),
        }
    }

    #[tokio::test]
    async fn test_topup_reopens_admission() {
        let (ledger, gate) = make_gate(PlanLimit::Limited(10));
        use_up(&ledger, "t1", 10).await;
        assert!(!gate.check("t1", NOW).await.unwrap().is_allowed());

        ledger.renew("t1", 5, "support top-up", NOW).await.unwrap();
        assert!(gate.check("t1", NOW).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_unlimited_never_denied() {
        let (ledger, gate) = make_gate(PlanLimit::Unlimited);
        use_up(&ledger, "t1", 500).await;

        let decision = gate.check("t1", NOW).await.unwrap();
        assert!(decision.is_allowed());
        assert!(decision.status().limit.is_none());
    }

    #[tokio::test]
    async fn test_not_nearing_below_threshold() {
        let (ledger, gate) = make_gate(PlanLimit::Limited(10));
        use_up(&ledger, "t1", 8).await;

        match gate.check("t1", NOW).await.unwrap() {
            AdmissionDecision::Allowed { nearing_quota, .. } => assert!(!nearing_quota),
            AdmissionDecision::Denied { .. } => panic!("expected allowed at 8/10"),
        }
    }
}
