//! Metric name definitions.
//!
//! All metric names used throughout tavolo live here so that dashboards and
//! alerts have a single place to look.

/// Conversation window metrics
pub mod session {
    /// Total number of conversation windows opened (billable conversations)
    pub const WINDOWS_OPENED_TOTAL: &str = "tavolo_session_windows_opened_total";
    /// Total number of messages folded into an existing window
    pub const WINDOWS_EXTENDED_TOTAL: &str = "tavolo_session_windows_extended_total";
}

/// Quota accounting metrics
pub mod quota {
    /// Total conversations counted against monthly quotas
    pub const CONVERSATIONS_COUNTED_TOTAL: &str = "tavolo_quota_conversations_counted_total";
    /// Total manual allowance top-ups applied
    pub const TOPUPS_TOTAL: &str = "tavolo_quota_topups_total";
    /// Total sends denied at admission for exhausted quota
    pub const ADMISSIONS_DENIED_TOTAL: &str = "tavolo_quota_admissions_denied_total";
}

/// Dispatch queue metrics
pub mod dispatch {
    /// Total jobs accepted into the queue
    pub const JOBS_ENQUEUED_TOTAL: &str = "tavolo_dispatch_jobs_enqueued_total";
    /// Number of jobs currently being delivered
    pub const JOBS_ACTIVE: &str = "tavolo_dispatch_jobs_active";
    /// Total jobs delivered successfully
    pub const JOBS_COMPLETED_TOTAL: &str = "tavolo_dispatch_jobs_completed_total";
    /// Total jobs that failed terminally
    pub const JOBS_FAILED_TOTAL: &str = "tavolo_dispatch_jobs_failed_total";
    /// Total delivery attempts that were retried after a transient failure
    pub const JOBS_RETRIED_TOTAL: &str = "tavolo_dispatch_jobs_retried_total";
    /// Total jobs parked because a concurrency or rate ceiling was reached
    pub const JOBS_DELAYED_TOTAL: &str = "tavolo_dispatch_jobs_delayed_total";
    /// Total stalled active jobs returned to the queue for redelivery
    pub const JOBS_REQUEUED_TOTAL: &str = "tavolo_dispatch_jobs_requeued_total";
    /// Delivery attempt duration in seconds
    pub const DELIVERY_DURATION_SECONDS: &str = "tavolo_dispatch_delivery_duration_seconds";
}
