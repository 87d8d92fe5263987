//! In-memory job store for testing.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    Error, Result,
    store::JobStore,
    types::{DispatchJob, JobCreate, JobStatus, QueueStatus},
};

/// In-memory store backed by `HashMap`. No persistence — for tests only.
///
/// The interior mutex makes `claim_next` atomic, matching the transactional
/// claim of the SQLite store, so worker tests exercise the same ordering
/// guarantees against either backend.
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, DispatchJob>>,
    next_seq: AtomicI64,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            next_seq: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_claimable(job: &DispatchJob, now_ms: u64) -> bool {
    matches!(job.status, JobStatus::Waiting | JobStatus::Delayed) && job.available_at_ms <= now_ms
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, create: JobCreate, now_ms: u64) -> Result<DispatchJob> {
        let job = DispatchJob {
            id: tavolo_common::new_id(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            tenant_id: create.tenant_id,
            conversation_id: create.conversation_id,
            payload: create.payload,
            priority: create.priority,
            attempts: 0,
            status: JobStatus::Waiting,
            last_error: None,
            available_at_ms: now_ms,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn claim_next(&self, now_ms: u64) -> Result<Option<DispatchJob>> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());

        let picked_id = {
            let mut best: Option<&DispatchJob> = None;
            for job in jobs.values() {
                if !is_claimable(job, now_ms) {
                    continue;
                }
                // Only the head of its key is eligible: any older
                // non-terminal sibling (active, parked, or waiting) blocks it.
                let blocked = jobs.values().any(|other| {
                    other.tenant_id == job.tenant_id
                        && other.conversation_id == job.conversation_id
                        && other.seq < job.seq
                        && !other.status.is_terminal()
                });
                if blocked {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some(b) => (job.priority, -job.seq) > (b.priority, -b.seq),
                };
                if better {
                    best = Some(job);
                }
            }
            best.map(|j| j.id.clone())
        };

        Ok(picked_id.map(|id| {
            let job = jobs
                .get_mut(&id)
                .unwrap_or_else(|| unreachable!("picked id is present"));
            job.status = JobStatus::Active;
            job.updated_at_ms = now_ms;
            job.clone()
        }))
    }

    async fn delay(&self, job_id: &str, available_at_ms: u64, now_ms: u64) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::job_not_found(job_id))?;
        job.status = JobStatus::Delayed;
        job.available_at_ms = available_at_ms;
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn retry(
        &self,
        job_id: &str,
        attempts: u32,
        available_at_ms: u64,
        error: &str,
        now_ms: u64,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::job_not_found(job_id))?;
        job.status = JobStatus::Delayed;
        job.attempts = attempts;
        job.last_error = Some(error.to_string());
        job.available_at_ms = available_at_ms;
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn complete(&self, job_id: &str, now_ms: u64) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::job_not_found(job_id))?;
        job.status = JobStatus::Completed;
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str, now_ms: u64) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::job_not_found(job_id))?;
        job.status = JobStatus::Failed;
        job.last_error = Some(error.to_string());
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn requeue_stalled(&self, now_ms: u64, stall_timeout_ms: u64) -> Result<u64> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut requeued = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Active
                && now_ms.saturating_sub(job.updated_at_ms) >= stall_timeout_ms
            {
                job.status = JobStatus::Waiting;
                job.available_at_ms = now_ms;
                job.updated_at_ms = now_ms;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn purge_terminal(&self, now_ms: u64, retention_ms: u64) -> Result<u64> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_terminal()
                && now_ms.saturating_sub(job.updated_at_ms) >= retention_ms)
        });
        Ok((before - jobs.len()) as u64)
    }

    async fn get(&self, job_id: &str) -> Result<Option<DispatchJob>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(job_id).cloned())
    }

    async fn counts(&self) -> Result<QueueStatus> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut counts = QueueStatus::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Waiting => counts.waiting += 1,
                JobStatus::Active => counts.active += 1,
                JobStatus::Delayed => counts.delayed += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}
