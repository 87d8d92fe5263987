//! The dispatch worker: claim loop, delivery, retry, redelivery.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use {
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use tavolo_metrics::{counter, dispatch as dispatch_metrics, gauge, histogram};

use tavolo_common::now_ms;

use crate::{
    Result,
    limits::DispatchLimits,
    store::JobStore,
    transport::{Transport, TransportError},
    types::{DispatchConfig, DispatchEvent, DispatchJob, JobCreate, JobStatus, QueueStatus},
};

/// Callback invoked after a successful delivery, before the completion event.
/// The gateway wires this to session tracking and quota accounting.
pub type DeliveredFn =
    Arc<dyn Fn(DispatchJob) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for completion/failure events (dashboard fan-out and friends).
pub type EventFn = Arc<dyn Fn(DispatchEvent) + Send + Sync>;

/// Pause before re-polling when the global claim rate is exhausted.
const RATE_PAUSE_MS: u64 = 25;

/// The dispatch worker service.
///
/// One instance drives any number of in-flight deliveries: the pull loop
/// claims eligible jobs (respecting the global ceilings) and spawns one task
/// per job, so slow transport calls never block scheduling for other
/// tenants. Redelivery of orphaned jobs happens via the periodic stall
/// sweep, which gives the queue at-least-once semantics: a crashed worker's
/// jobs are picked up again, and the rare duplicate send is accepted.
pub struct DispatchWorker {
    store: Arc<dyn JobStore>,
    transport: Arc<dyn Transport>,
    limits: Arc<DispatchLimits>,
    config: DispatchConfig,
    on_delivered: Option<DeliveredFn>,
    on_event: Option<EventFn>,
    running: RwLock<bool>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
}

impl DispatchWorker {
    pub fn new(store: Arc<dyn JobStore>, transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::with_config(store, transport, DispatchConfig::default(), None, None)
    }

    /// Create a worker with explicit configuration and callbacks.
    pub fn with_config(
        store: Arc<dyn JobStore>,
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
        on_delivered: Option<DeliveredFn>,
        on_event: Option<EventFn>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            transport,
            limits: Arc::new(DispatchLimits::new(&config)),
            config,
            on_delivered,
            on_event,
            running: RwLock::new(false),
            worker_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
        })
    }

    /// Accept a job into the queue and nudge the pull loop.
    ///
    /// Enqueueing is quota-agnostic; admission happens in front of this call.
    pub async fn enqueue(&self, create: JobCreate) -> Result<DispatchJob> {
        let job = self.store.enqueue(create, now_ms()).await?;
        debug!(
            job_id = %job.id,
            tenant_id = %job.tenant_id,
            conversation_id = %job.conversation_id,
            priority = job.priority,
            "job enqueued"
        );
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::JOBS_ENQUEUED_TOTAL).increment(1);
        self.wake_notify.notify_one();
        Ok(job)
    }

    /// Start the pull loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        *self.running.write().await = true;

        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move {
            svc.pull_loop().await;
        });

        *self.worker_handle.lock().await = Some(handle);
        info!("dispatch worker started");
        Ok(())
    }

    /// Stop the pull loop. In-flight deliveries finish on their own tasks.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();

        let mut handle = self.worker_handle.lock().await;
        if let Some(h) = handle.take() {
            h.abort();
        }
        info!("dispatch worker stopped");
    }

    /// Queue depth by status.
    pub async fn queue_status(&self) -> Result<QueueStatus> {
        self.store.counts().await
    }

    /// Current active-delivery count for a tenant (bounded by the cap).
    #[must_use]
    pub fn tenant_active(&self, tenant_id: &str) -> u32 {
        self.limits.tenant_active(tenant_id)
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn pull_loop(self: &Arc<Self>) {
        let mut last_sweep = now_ms();
        loop {
            if !*self.running.read().await {
                break;
            }

            let now = now_ms();

            if now.saturating_sub(last_sweep) >= self.config.stall_sweep_interval_ms {
                match self
                    .store
                    .requeue_stalled(now, self.config.stall_timeout_ms)
                    .await
                {
                    Ok(0) => {},
                    Ok(count) => {
                        warn!(count, "requeued stalled jobs for redelivery");
                        #[cfg(feature = "metrics")]
                        counter!(dispatch_metrics::JOBS_REQUEUED_TOTAL).increment(count);
                    },
                    Err(err) => error!(error = %err, "stall sweep failed"),
                }
                match self
                    .store
                    .purge_terminal(now, self.config.terminal_retention_ms)
                    .await
                {
                    Ok(0) => {},
                    Ok(count) => debug!(count, "purged terminal jobs past retention"),
                    Err(err) => error!(error = %err, "terminal purge failed"),
                }
                last_sweep = now;
            }

            // Ceilings gate claiming: never pull work there is no slot for.
            if !self.limits.try_acquire_global() {
                self.idle_wait().await;
                continue;
            }
            if !self.limits.try_acquire_rate(now) {
                self.limits.release_global();
                tokio::time::sleep(Duration::from_millis(RATE_PAUSE_MS)).await;
                continue;
            }

            match self.store.claim_next(now).await {
                Err(err) => {
                    self.limits.release_global();
                    error!(error = %err, "failed to claim next job");
                    self.idle_wait().await;
                },
                Ok(None) => {
                    self.limits.release_global();
                    self.idle_wait().await;
                },
                Ok(Some(job)) => {
                    if !self.limits.try_acquire_tenant(&job.tenant_id) {
                        self.limits.release_global();
                        // Tenant at cap: park briefly and retry. Costs no
                        // attempt.
                        let until = now + self.config.cap_delay_ms;
                        if let Err(err) = self.store.delay(&job.id, until, now).await {
                            error!(error = %err, job_id = %job.id, "failed to park job");
                        }
                        debug!(
                            job_id = %job.id,
                            tenant_id = %job.tenant_id,
                            "tenant concurrency cap reached; job parked"
                        );
                        #[cfg(feature = "metrics")]
                        counter!(dispatch_metrics::JOBS_DELAYED_TOTAL).increment(1);
                        continue;
                    }

                    let svc = Arc::clone(self);
                    tokio::spawn(svc.process_job(job));
                },
            }
        }
    }

    async fn idle_wait(&self) {
        let notify = Arc::clone(&self.wake_notify);
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {},
            () = notify.notified() => {},
        }
    }

    async fn process_job(self: Arc<Self>, job: DispatchJob) {
        let attempt = job.attempts + 1;
        let started = now_ms();
        debug!(
            job_id = %job.id,
            tenant_id = %job.tenant_id,
            attempt,
            "delivering job"
        );
        #[cfg(feature = "metrics")]
        gauge!(dispatch_metrics::JOBS_ACTIVE).increment(1.0);

        let timeout = Duration::from_millis(self.config.attempt_timeout_ms);
        let delivery = tokio::time::timeout(
            timeout,
            self.transport
                .deliver(&job.tenant_id, &job.conversation_id, &job.payload),
        )
        .await;
        let outcome = match delivery {
            Ok(result) => result,
            Err(_) => Err(TransportError::Transient(format!(
                "delivery timed out after {}ms",
                self.config.attempt_timeout_ms
            ))),
        };

        self.limits.release_tenant(&job.tenant_id);
        self.limits.release_global();

        let finished = now_ms();
        #[cfg(feature = "metrics")]
        {
            gauge!(dispatch_metrics::JOBS_ACTIVE).decrement(1.0);
            histogram!(dispatch_metrics::DELIVERY_DURATION_SECONDS)
                .record(finished.saturating_sub(started) as f64 / 1000.0);
        }

        match outcome {
            Ok(()) => {
                if let Err(err) = self.store.complete(&job.id, finished).await {
                    error!(error = %err, job_id = %job.id, "failed to mark job completed");
                }
                info!(
                    job_id = %job.id,
                    tenant_id = %job.tenant_id,
                    attempt,
                    duration_ms = finished.saturating_sub(started),
                    "job delivered"
                );
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::JOBS_COMPLETED_TOTAL).increment(1);
                if let Some(hook) = &self.on_delivered {
                    hook(job.clone()).await;
                }
                self.emit(&job, JobStatus::Completed, finished);
            },
            Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                let backoff = self.config.backoff_for_attempt(attempt);
                warn!(
                    job_id = %job.id,
                    attempt,
                    backoff_ms = backoff,
                    error = %err,
                    "delivery failed; retrying"
                );
                if let Err(store_err) = self
                    .store
                    .retry(
                        &job.id,
                        attempt,
                        finished + backoff,
                        &err.to_string(),
                        finished,
                    )
                    .await
                {
                    error!(error = %store_err, job_id = %job.id, "failed to schedule retry");
                }
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::JOBS_RETRIED_TOTAL).increment(1);
            },
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    attempt,
                    error = %err,
                    "job failed terminally"
                );
                if let Err(store_err) = self.store.fail(&job.id, &err.to_string(), finished).await
                {
                    error!(error = %store_err, job_id = %job.id, "failed to mark job failed");
                }
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::JOBS_FAILED_TOTAL).increment(1);
                self.emit(&job, JobStatus::Failed, finished);
            },
        }

        // A slot freed up; let the pull loop claim again immediately.
        self.wake_notify.notify_one();
    }

    fn emit(&self, job: &DispatchJob, status: JobStatus, timestamp_ms: u64) {
        if let Some(on_event) = &self.on_event {
            on_event(DispatchEvent {
                job_id: job.id.clone(),
                tenant_id: job.tenant_id.clone(),
                conversation_id: job.conversation_id.clone(),
                status,
                timestamp_ms,
            });
        }
    }
}
