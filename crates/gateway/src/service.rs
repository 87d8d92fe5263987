//! Service wiring and the external send/inbound/admin operations.

use std::sync::Arc;

use {
    serde::{Deserialize, Serialize},
    tracing::{error, info},
};

use {
    tavolo_common::now_ms,
    tavolo_dispatch::{
        DeliveredFn, DispatchConfig, DispatchJob, DispatchWorker, EventFn, JobCreate, JobStore,
        QueueStatus, Transport,
    },
    tavolo_quota::{
        AdmissionDecision, AdmissionGate, MonthlyUsage, PlanResolver, QuotaLedger, QuotaStatus,
        UsageStore,
    },
    tavolo_sessions::{SessionStore, SessionTouch, SessionTracker},
};

use crate::Result;

/// What happened to a send request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum SendOutcome {
    /// Delivered synchronously; usage already tracked.
    Sent { session_id: String },
    /// Admitted and parked in the queue; the worker delivers it.
    Queued { job_id: String },
    /// Refused at admission; nothing was sent or enqueued.
    Denied { code: String, quota: QuotaStatus },
}

impl SendOutcome {
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

/// The metering and dispatch core, assembled.
///
/// Both send paths run the same admission check, and both report usage
/// through the same idempotent ledger call, so neither path can leak
/// unmetered traffic or double-count a conversation.
pub struct MessagingService {
    tracker: Arc<SessionTracker>,
    ledger: Arc<QuotaLedger>,
    gate: AdmissionGate,
    worker: Arc<DispatchWorker>,
    transport: Arc<dyn Transport>,
}

impl MessagingService {
    /// Wire the service from its stores and collaborators.
    ///
    /// The dispatch worker's delivered-hook is pointed at the session
    /// tracker and ledger here, which is what keeps queued sends metered
    /// without a second bookkeeping path.
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        usage_store: Arc<dyn UsageStore>,
        job_store: Arc<dyn JobStore>,
        plans: Arc<dyn PlanResolver>,
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
        on_event: Option<EventFn>,
    ) -> Arc<Self> {
        let tracker = Arc::new(SessionTracker::new(session_store));
        let ledger = Arc::new(QuotaLedger::new(usage_store, plans));
        let gate = AdmissionGate::new(Arc::clone(&ledger));

        let hook_tracker = Arc::clone(&tracker);
        let hook_ledger = Arc::clone(&ledger);
        let on_delivered: DeliveredFn = Arc::new(move |job: DispatchJob| {
            let tracker = Arc::clone(&hook_tracker);
            let ledger = Arc::clone(&hook_ledger);
            Box::pin(async move {
                track_delivery(&tracker, &ledger, &job).await;
            })
        });

        let worker = DispatchWorker::with_config(
            job_store,
            Arc::clone(&transport),
            config,
            Some(on_delivered),
            on_event,
        );

        Arc::new(Self {
            tracker,
            ledger,
            gate,
            worker,
            transport,
        })
    }

    /// Start the dispatch worker.
    pub async fn start(&self) -> Result<()> {
        self.worker.start().await?;
        Ok(())
    }

    /// Stop the dispatch worker.
    pub async fn stop(&self) {
        self.worker.stop().await;
    }

    /// Webhook trigger: a counterparty messaged the tenant.
    ///
    /// Detects or creates the conversation window and meters new windows
    /// against the tenant's monthly quota.
    pub async fn on_inbound_message(
        &self,
        tenant_id: &str,
        counterparty_id: &str,
        timestamp_ms: u64,
    ) -> Result<SessionTouch> {
        let touch = self
            .tracker
            .touch(tenant_id, counterparty_id, timestamp_ms)
            .await?;
        self.ledger
            .track_usage(
                tenant_id,
                touch.is_new_session,
                &touch.session_id,
                timestamp_ms,
            )
            .await?;
        Ok(touch)
    }

    /// API trigger: queue an outbound send for asynchronous dispatch.
    pub async fn request_send(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        payload: serde_json::Value,
        priority: i32,
        now_ms: u64,
    ) -> Result<SendOutcome> {
        match self.gate.check(tenant_id, now_ms).await? {
            AdmissionDecision::Denied { code, status } => Ok(SendOutcome::Denied {
                code: code.to_string(),
                quota: status,
            }),
            AdmissionDecision::Allowed { .. } => {
                let job = self
                    .worker
                    .enqueue(JobCreate {
                        tenant_id: tenant_id.to_string(),
                        conversation_id: conversation_id.to_string(),
                        payload,
                        priority,
                    })
                    .await?;
                Ok(SendOutcome::Queued { job_id: job.id })
            },
        }
    }

    /// API trigger: deliver an outbound send synchronously, bypassing the
    /// queue. The caller eats transport errors directly; on success the
    /// conversation is tracked immediately.
    pub async fn send_direct(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        payload: serde_json::Value,
        now_ms: u64,
    ) -> Result<SendOutcome> {
        match self.gate.check(tenant_id, now_ms).await? {
            AdmissionDecision::Denied { code, status } => Ok(SendOutcome::Denied {
                code: code.to_string(),
                quota: status,
            }),
            AdmissionDecision::Allowed { .. } => {
                self.transport
                    .deliver(tenant_id, conversation_id, &payload)
                    .await
                    .map_err(crate::Error::Transport)?;

                let touch = self.tracker.touch(tenant_id, conversation_id, now_ms).await?;
                self.ledger
                    .track_usage(tenant_id, touch.is_new_session, &touch.session_id, now_ms)
                    .await?;
                info!(tenant_id, conversation_id, "direct send delivered");
                Ok(SendOutcome::Sent {
                    session_id: touch.session_id,
                })
            },
        }
    }

    /// Admin trigger: add to the tenant's allowance for the current month.
    pub async fn renew_quota(
        &self,
        tenant_id: &str,
        amount: u64,
        reason: &str,
        now_ms: u64,
    ) -> Result<MonthlyUsage> {
        Ok(self.ledger.renew(tenant_id, amount, reason, now_ms).await?)
    }

    /// Admin trigger: current quota snapshot for one tenant.
    pub async fn quota_status(&self, tenant_id: &str, now_ms: u64) -> Result<QuotaStatus> {
        Ok(self.ledger.status(tenant_id, now_ms).await?)
    }

    /// Admin trigger: tenants at or above the usage threshold this month.
    pub async fn list_nearing_quota(
        &self,
        threshold_percent: f64,
        now_ms: u64,
    ) -> Result<Vec<QuotaStatus>> {
        Ok(self.ledger.list_nearing(threshold_percent, now_ms).await?)
    }

    /// Queue depth by status.
    pub async fn queue_status(&self) -> Result<QueueStatus> {
        Ok(self.worker.queue_status().await?)
    }
}

/// Post-delivery metering for the queued path. Failures here are logged and
/// swallowed: the message is already on the wire, and the stall sweep must
/// not re-send it over a bookkeeping error.
async fn track_delivery(tracker: &SessionTracker, ledger: &QuotaLedger, job: &DispatchJob) {
    let now = now_ms();
    match tracker.touch(&job.tenant_id, &job.conversation_id, now).await {
        Ok(touch) => {
            if let Err(err) = ledger
                .track_usage(&job.tenant_id, touch.is_new_session, &touch.session_id, now)
                .await
            {
                error!(
                    error = %err,
                    tenant_id = %job.tenant_id,
                    job_id = %job.id,
                    "usage tracking failed after delivery"
                );
            }
        },
        Err(err) => error!(
            error = %err,
            tenant_id = %job.tenant_id,
            job_id = %job.id,
            "session tracking failed after delivery"
        ),
    }
}
