//! Integration tests for the projection manager: catch-up, resumption,
//! rebuild, and failure isolation.

#![allow(clippy::expect_used)] // Panics: Test will fail if preconditions don't hold.
#![allow(clippy::unwrap_used)] // Panics: Test will fail if preconditions don't hold.
#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use strata_core::event::{DomainEvent, EventMetadata, NewEvent};
use strata_core::projection::{CheckpointStore, Projection, ProjectionError, ReadModelStore};
use strata_core::store::EventStore;
use strata_core::stream::{ExpectedVersion, GlobalPosition, StreamId, Version};
use strata_memory::{InMemoryCheckpointStore, InMemoryEventStore, InMemoryReadModelStore};
use strata_projections::ProjectionManager;

#[derive(Clone, Debug, Serialize, Deserialize)]
enum OrderEvent {
    Placed { total: i64 },
    Cancelled,
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "Placed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Keeps a running total of placed orders per stream. Fails on demand
/// to exercise the manager's error handling.
struct OrderTotals {
    read_models: Arc<InMemoryReadModelStore>,
    applied: AtomicU32,
    fail_on_cancelled: bool,
}

impl OrderTotals {
    fn new(read_models: Arc<InMemoryReadModelStore>) -> Self {
        Self {
            read_models,
            applied: AtomicU32::new(0),
            fail_on_cancelled: false,
        }
    }

    fn failing_on_cancelled(read_models: Arc<InMemoryReadModelStore>) -> Self {
        Self {
            fail_on_cancelled: true,
            ..Self::new(read_models)
        }
    }
}

impl Projection for OrderTotals {
    fn name(&self) -> &str {
        "order_totals"
    }

    async fn apply(&self, event: &strata_core::event::RecordedEvent) -> Result<(), ProjectionError> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        match event.decode::<OrderEvent>()? {
            OrderEvent::Placed { total } => {
                let key = event.stream_id.as_str();
                let current = self
                    .read_models
                    .get(key)
                    .await?
                    .and_then(|value| value.as_i64())
                    .unwrap_or(0);
                self.read_models
                    .upsert(key, &serde_json::json!(current + total))
                    .await?;
                Ok(())
            }
            OrderEvent::Cancelled if self.fail_on_cancelled => Err(ProjectionError::Handler(
                "cannot handle cancellations".to_string(),
            )),
            OrderEvent::Cancelled => Ok(()),
        }
    }

    async fn reset(&self) -> Result<(), ProjectionError> {
        self.read_models.clear().await
    }
}

async fn seed_orders(store: &InMemoryEventStore, stream: &str, events: &[OrderEvent]) {
    let stream_id = StreamId::new(stream);
    let existing = store
        .read_stream(stream_id.clone(), Version::INITIAL)
        .await
        .expect("read succeeds");
    let expected = ExpectedVersion::from(existing.last().map(|e| e.stream_version));
    let batch: Vec<_> = events
        .iter()
        .map(|event| NewEvent::from_domain(event, EventMetadata::new()).expect("serializes"))
        .collect();
    store
        .append(stream_id, "order".to_string(), expected, batch)
        .await
        .expect("append succeeds");
}

#[tokio::test]
async fn catch_up_applies_events_and_checkpoints() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let read_models = Arc::new(InMemoryReadModelStore::new());

    seed_orders(&store, "order-1", &[OrderEvent::Placed { total: 10 }]).await;
    seed_orders(&store, "order-2", &[OrderEvent::Placed { total: 25 }]).await;
    seed_orders(&store, "order-1", &[OrderEvent::Placed { total: 5 }]).await;

    let projection = Arc::new(OrderTotals::new(read_models.clone()));
    let (manager, _shutdown) =
        ProjectionManager::new(projection, store, checkpoints.clone());
    manager.catch_up().await.expect("catch up succeeds");

    assert_eq!(
        read_models.get("order-1").await.expect("get"),
        Some(serde_json::json!(15))
    );
    assert_eq!(
        read_models.get("order-2").await.expect("get"),
        Some(serde_json::json!(25))
    );
    assert_eq!(
        checkpoints.load("order_totals").await.expect("load"),
        Some(GlobalPosition::new(3))
    );
}

#[tokio::test]
async fn restart_resumes_from_checkpoint() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let read_models = Arc::new(InMemoryReadModelStore::new());

    seed_orders(&store, "order-1", &[OrderEvent::Placed { total: 10 }]).await;

    let projection = Arc::new(OrderTotals::new(read_models.clone()));
    let (manager, _shutdown) =
        ProjectionManager::new(projection.clone(), store.clone(), checkpoints.clone());
    manager.catch_up().await.expect("first catch up");
    assert_eq!(projection.applied.load(Ordering::SeqCst), 1);

    seed_orders(&store, "order-1", &[OrderEvent::Placed { total: 7 }]).await;

    // A fresh manager over the same checkpoint store sees only the new
    // event; the old one is not redelivered.
    let resumed = Arc::new(OrderTotals::new(read_models.clone()));
    let (manager, _shutdown) = ProjectionManager::new(resumed.clone(), store, checkpoints);
    manager.catch_up().await.expect("second catch up");

    assert_eq!(resumed.applied.load(Ordering::SeqCst), 1);
    assert_eq!(
        read_models.get("order-1").await.expect("get"),
        Some(serde_json::json!(17))
    );
}

#[tokio::test]
async fn rebuild_resets_and_replays() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let read_models = Arc::new(InMemoryReadModelStore::new());

    seed_orders(
        &store,
        "order-1",
        &[OrderEvent::Placed { total: 10 }, OrderEvent::Placed { total: 20 }],
    )
    .await;

    let projection = Arc::new(OrderTotals::new(read_models.clone()));
    let (manager, _shutdown) = ProjectionManager::new(projection, store, checkpoints.clone());
    manager.catch_up().await.expect("catch up");

    // Corrupt the read model, then rebuild from the log.
    read_models
        .upsert("order-1", &serde_json::json!(-999))
        .await
        .expect("upsert");
    manager.rebuild().await.expect("rebuild");

    assert_eq!(
        read_models.get("order-1").await.expect("get"),
        Some(serde_json::json!(30))
    );
    assert_eq!(
        checkpoints.load("order_totals").await.expect("load"),
        Some(GlobalPosition::new(2))
    );
}

#[tokio::test]
async fn handler_error_stops_checkpoint_and_spares_other_projections() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());

    seed_orders(&store, "order-1", &[OrderEvent::Placed { total: 10 }]).await;
    seed_orders(&store, "order-1", &[OrderEvent::Cancelled]).await;
    seed_orders(&store, "order-2", &[OrderEvent::Placed { total: 5 }]).await;

    let failing_models = Arc::new(InMemoryReadModelStore::new());
    let failing = Arc::new(OrderTotals::failing_on_cancelled(failing_models));
    let (manager, _shutdown) =
        ProjectionManager::new(failing, store.clone(), checkpoints.clone());
    let error = manager.catch_up().await.expect_err("handler fails");
    assert!(matches!(error, ProjectionError::Handler(_)));

    // Checkpoint stops before the poison event.
    assert_eq!(
        checkpoints.load("order_totals").await.expect("load"),
        Some(GlobalPosition::new(1))
    );

    // A healthy projection over the same log is unaffected.
    let healthy = Arc::new(HealthyCounter {
        applied: AtomicU32::new(0),
    });
    let (manager, _shutdown) = ProjectionManager::new(healthy.clone(), store, checkpoints);
    manager.catch_up().await.expect("healthy projection runs");
    assert_eq!(healthy.applied.load(Ordering::SeqCst), 3);
}

struct HealthyCounter {
    applied: AtomicU32,
}

impl Projection for HealthyCounter {
    fn name(&self) -> &str {
        "healthy_counter"
    }

    async fn apply(&self, _event: &strata_core::event::RecordedEvent) -> Result<(), ProjectionError> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn handler_logic_can_be_tested_without_a_store() {
    use strata_testing::{ProjectionTestHarness, RecordedEventBuilder};

    let read_models = Arc::new(InMemoryReadModelStore::new());
    let mut harness = ProjectionTestHarness::new(OrderTotals::new(read_models.clone()));

    harness
        .given_events(vec![
            RecordedEventBuilder::new("order-1", "Placed")
                .stream_type("order")
                .payload(serde_json::json!({"Placed": {"total": 12}}))
                .global_position(1)
                .build(),
            RecordedEventBuilder::new("order-1", "Placed")
                .stream_type("order")
                .payload(serde_json::json!({"Placed": {"total": 8}}))
                .stream_version(1)
                .global_position(2)
                .build(),
        ])
        .await
        .expect("events apply");

    assert_eq!(harness.applied(), 2);
    assert_eq!(
        read_models.get("order-1").await.expect("get"),
        Some(serde_json::json!(20))
    );
}

/// Upsert-style projection: the read model row is derived entirely from
/// the event, so redelivery after a crash-restart is harmless.
struct OrderStatus {
    read_models: Arc<InMemoryReadModelStore>,
}

impl Projection for OrderStatus {
    fn name(&self) -> &str {
        "order_status"
    }

    async fn apply(&self, event: &strata_core::event::RecordedEvent) -> Result<(), ProjectionError> {
        let status = match event.decode::<OrderEvent>()? {
            OrderEvent::Placed { .. } => "placed",
            OrderEvent::Cancelled => "cancelled",
        };
        self.read_models
            .upsert(
                event.stream_id.as_str(),
                &serde_json::json!({
                    "status": status,
                    "as_of": event.stream_version.value(),
                }),
            )
            .await
    }
}

#[tokio::test]
async fn redelivered_event_leaves_read_model_unchanged() {
    use strata_testing::RecordedEventBuilder;

    let read_models = Arc::new(InMemoryReadModelStore::new());
    let projection = OrderStatus {
        read_models: read_models.clone(),
    };

    let event = RecordedEventBuilder::new("order-1", "Placed")
        .stream_type("order")
        .payload(serde_json::json!({"Placed": {"total": 12}}))
        .global_position(1)
        .build();

    projection.apply(&event).await.expect("first delivery");
    let once = read_models.get("order-1").await.expect("get");

    projection.apply(&event).await.expect("redelivery");
    let twice = read_models.get("order-1").await.expect("get");

    assert_eq!(once, twice);
    assert_eq!(
        twice,
        Some(serde_json::json!({"status": "placed", "as_of": 0}))
    );
}

#[tokio::test]
async fn run_tails_the_log_until_shutdown() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let read_models = Arc::new(InMemoryReadModelStore::new());

    seed_orders(&store, "order-1", &[OrderEvent::Placed { total: 10 }]).await;

    let projection = Arc::new(OrderTotals::new(read_models.clone()));
    let (manager, shutdown) = ProjectionManager::new(projection, store.clone(), checkpoints);
    let manager = manager.with_poll_interval(Duration::from_millis(5));
    let handle = tokio::spawn(async move { manager.run().await });

    // Append while the manager is tailing.
    tokio::time::sleep(Duration::from_millis(20)).await;
    seed_orders(&store, "order-1", &[OrderEvent::Placed { total: 30 }]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown.send(true).expect("send shutdown");
    handle
        .await
        .expect("task joins")
        .expect("run exits cleanly");

    assert_eq!(
        read_models.get("order-1").await.expect("get"),
        Some(serde_json::json!(40))
    );
}
