//! Scheduler-side ceilings: per-tenant concurrency, global concurrency, and
//! a global claim rate.
//!
//! Counters are mutated only through compare-and-swap, never read-then-write,
//! so the caps hold across any number of worker tasks sharing this state.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

use dashmap::DashMap;

use crate::types::DispatchConfig;

/// Shared counter state for the worker pool.
pub struct DispatchLimits {
    tenant_max_active: u32,
    global_max_active: u32,
    rate_per_second: u32,
    active_by_tenant: DashMap<String, AtomicU32>,
    global_active: AtomicU32,
    claim_times: Mutex<VecDeque<u64>>,
}

impl DispatchLimits {
    #[must_use]
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            tenant_max_active: config.tenant_max_active,
            global_max_active: config.global_max_active,
            rate_per_second: config.global_rate_per_second,
            active_by_tenant: DashMap::new(),
            global_active: AtomicU32::new(0),
            claim_times: Mutex::new(VecDeque::new()),
        }
    }

    /// Take an active slot for the tenant, unless it is at its cap.
    pub fn try_acquire_tenant(&self, tenant_id: &str) -> bool {
        let counter = self
            .active_by_tenant
            .entry(tenant_id.to_string())
            .or_default();
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.tenant_max_active).then_some(active + 1)
            })
            .is_ok()
    }

    pub fn release_tenant(&self, tenant_id: &str) {
        if let Some(counter) = self.active_by_tenant.get(tenant_id) {
            let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                Some(active.saturating_sub(1))
            });
        }
    }

    /// Take a slot against the global active ceiling.
    pub fn try_acquire_global(&self) -> bool {
        self.global_active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.global_max_active).then_some(active + 1)
            })
            .is_ok()
    }

    pub fn release_global(&self) {
        let _ = self
            .global_active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                Some(active.saturating_sub(1))
            });
    }

    /// Consume one claim token from the sliding one-second window.
    /// Returns false (consuming nothing) when the window is full.
    pub fn try_acquire_rate(&self, now_ms: u64) -> bool {
        let mut times = self.claim_times.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = now_ms.saturating_sub(1_000);
        while times.front().is_some_and(|&t| t < cutoff) {
            times.pop_front();
        }
        if times.len() >= self.rate_per_second as usize {
            return false;
        }
        times.push_back(now_ms);
        true
    }

    #[must_use]
    pub fn tenant_active(&self, tenant_id: &str) -> u32 {
        self.active_by_tenant
            .get(tenant_id)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn global_active(&self) -> u32 {
        self.global_active.load(Ordering::Acquire)
    }
}
