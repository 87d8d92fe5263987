//! End-to-end scenarios across the assembled service: monthly quota
//! exhaustion and queue drain under the per-tenant concurrency cap.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use {
    tavolo_dispatch::{DispatchConfig, DispatchEvent, InMemoryJobStore, Transport, TransportError},
    tavolo_gateway::{MessagingService, SendOutcome},
    tavolo_quota::{InMemoryUsageStore, PlanLimit, QUOTA_EXCEEDED, StaticPlanResolver},
    tavolo_sessions::InMemorySessionStore,
};

// 2025-06-15T12:00:00Z
const NOW: u64 = 1_749_988_800_000;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counts concurrent deliveries and records the high-water mark.
struct SamplingTransport {
    active: AtomicU32,
    max_active: AtomicU32,
    delivered: AtomicU32,
}

impl SamplingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicU32::new(0),
            max_active: AtomicU32::new(0),
            delivered: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Transport for SamplingTransport {
    async fn deliver(
        &self,
        _tenant_id: &str,
        _conversation_id: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), TransportError> {
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(4)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_config() -> DispatchConfig {
    DispatchConfig {
        base_backoff_ms: 2,
        max_backoff_ms: 10,
        cap_delay_ms: 2,
        poll_interval_ms: 2,
        global_rate_per_second: 10_000,
        ..Default::default()
    }
}

fn make_service(
    limit: PlanLimit,
    transport: Arc<dyn Transport>,
    on_event: Option<tavolo_dispatch::EventFn>,
) -> Arc<MessagingService> {
    MessagingService::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryUsageStore::new()),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(StaticPlanResolver::new(limit)),
        transport,
        fast_config(),
        on_event,
    )
}

#[tokio::test]
async fn free_plan_exhausts_after_one_thousand_conversations() {
    init_logging();
    let service = make_service(PlanLimit::Limited(1_000), SamplingTransport::new(), None);

    // A month's worth of distinct customer conversations.
    for i in 0..1_000 {
        let touch = service
            .on_inbound_message("resto", &format!("customer-{i}"), NOW)
            .await
            .unwrap();
        assert!(touch.is_new_session);
    }

    let status = service.quota_status("resto", NOW).await.unwrap();
    assert_eq!(status.used, 1_000);
    assert_eq!(status.usage_percent, Some(100.0));
    assert!(status.nearing_quota);

    // The 1001st send is refused with display-ready details.
    let outcome = service
        .request_send("resto", "customer-0", serde_json::json!({"text": "promo"}), 0, NOW)
        .await
        .unwrap();
    match outcome {
        SendOutcome::Denied { code, quota } => {
            assert_eq!(code, QUOTA_EXCEEDED);
            assert_eq!(quota.used, 1_000);
            assert_eq!(quota.remaining, Some(0));
            assert_eq!(quota.usage_percent, Some(100.0));
            // June 15 noon → July 1, rounded up.
            assert_eq!(quota.days_until_reset, 16);
        },
        other => panic!("expected denial, got {other:?}"),
    }

    // A top-up reopens sends within the same month.
    service.renew_quota("resto", 50, "month-end promo", NOW).await.unwrap();
    let outcome = service
        .request_send("resto", "customer-0", serde_json::json!({"text": "promo"}), 0, NOW)
        .await
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Queued { .. }));
}

#[tokio::test]
async fn burst_drains_within_tenant_cap() {
    init_logging();
    let transport = SamplingTransport::new();
    let events: Arc<Mutex<Vec<DispatchEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let events_sink = Arc::clone(&events);
    let service = make_service(
        PlanLimit::Limited(1_000),
        transport.clone(),
        Some(Arc::new(move |event: DispatchEvent| {
            events_sink.lock().unwrap().push(event);
        })),
    );
    service.start().await.unwrap();

    // 10 sends for one tenant across 2 conversations.
    for i in 0..10 {
        let outcome = service
            .request_send(
                "resto",
                if i % 2 == 0 { "table-a" } else { "table-b" },
                serde_json::json!({"n": i}),
                0,
                NOW,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Queued { .. }));
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let counts = service.queue_status().await.unwrap();
            if counts.completed + counts.failed == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue did not drain");
    service.stop().await;

    // Every job reached a terminal state, the cap was never exceeded, and
    // every terminal transition produced an observability event.
    let counts = service.queue_status().await.unwrap();
    assert_eq!(counts.completed, 10);
    assert_eq!(counts.failed, 0);
    assert!(transport.max_active.load(Ordering::SeqCst) <= 5);
    assert_eq!(transport.delivered.load(Ordering::SeqCst), 10);
    assert_eq!(events.lock().unwrap().len(), 10);

    // Ten deliveries into two conversations in one window: two counted.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let status = service
                .quota_status("resto", tavolo_common::now_ms())
                .await
                .unwrap();
            if status.used == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("deliveries were not metered");
}
