//! Plan limit resolution.
//!
//! Plan configuration lives outside this core; the ledger only needs the
//! monthly conversation allowance for a tenant, resolved through this seam.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::Result;

/// Monthly conversation allowance granted by a tenant's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanLimit {
    /// Allowance of this many conversations per month, before top-ups.
    Limited(u64),
    /// No cap; usage percentages are not computed.
    Unlimited,
}

impl PlanLimit {
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

/// Resolves the plan allowance for a tenant.
#[async_trait]
pub trait PlanResolver: Send + Sync {
    async fn plan_limit(&self, tenant_id: &str) -> Result<PlanLimit>;
}

/// Fixed in-process resolver: one default allowance plus per-tenant
/// overrides. Useful for tests and single-plan deployments.
pub struct StaticPlanResolver {
    default_limit: PlanLimit,
    overrides: HashMap<String, PlanLimit>,
}

impl StaticPlanResolver {
    #[must_use]
    pub fn new(default_limit: PlanLimit) -> Self {
        Self {
            default_limit,
            overrides: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_override(mut self, tenant_id: impl Into<String>, limit: PlanLimit) -> Self {
        self.overrides.insert(tenant_id.into(), limit);
        self
    }
}

#[async_trait]
impl PlanResolver for StaticPlanResolver {
    async fn plan_limit(&self, tenant_id: &str) -> Result<PlanLimit> {
        Ok(self
            .overrides
            .get(tenant_id)
            .copied()
            .unwrap_or(self.default_limit))
    }
}
