//! Integration tests for the in-memory event store and the aggregate
//! repository built on top of it.

#![allow(clippy::expect_used)] // Panics: Test will fail if preconditions don't hold.
#![allow(clippy::unwrap_used)] // Panics: Test will fail if preconditions don't hold.
#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_core::aggregate::{Aggregate, AggregateRepository, DomainError};
use strata_core::event::{DomainEvent, EventMetadata, NewEvent};
use strata_core::store::{EventStore, EventStoreError};
use strata_core::stream::{ExpectedVersion, GlobalPosition, StreamId, Version};
use strata_memory::{InMemoryEventStore, InMemorySnapshotStore};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum AccountEvent {
    Opened,
    Deposited { amount: i64 },
    Withdrawn { amount: i64 },
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Opened => "Opened",
            Self::Deposited { .. } => "Deposited",
            Self::Withdrawn { .. } => "Withdrawn",
        }
    }
}

enum AccountCommand {
    Open,
    Deposit { amount: i64 },
    Withdraw { amount: i64 },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Account {
    open: bool,
    balance: i64,
}

impl Aggregate for Account {
    type Command = AccountCommand;
    type Event = AccountEvent;

    fn aggregate_type() -> &'static str {
        "account"
    }

    fn apply(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::Opened => self.open = true,
            AccountEvent::Deposited { amount } => self.balance += amount,
            AccountEvent::Withdrawn { amount } => self.balance -= amount,
        }
    }

    fn handle(&self, command: AccountCommand) -> Result<Vec<AccountEvent>, DomainError> {
        match command {
            AccountCommand::Open if self.open => Err(DomainError::NotApplicable(
                "account is already open".to_string(),
            )),
            AccountCommand::Open => Ok(vec![AccountEvent::Opened]),
            AccountCommand::Deposit { amount } | AccountCommand::Withdraw { amount }
                if !self.open =>
            {
                let _ = amount;
                Err(DomainError::NotApplicable("account is not open".to_string()))
            }
            AccountCommand::Deposit { amount } if amount <= 0 => Err(DomainError::Validation(
                "deposit must be positive".to_string(),
            )),
            AccountCommand::Deposit { amount } => Ok(vec![AccountEvent::Deposited { amount }]),
            AccountCommand::Withdraw { amount } if amount > self.balance => Err(
                DomainError::Validation("insufficient balance".to_string()),
            ),
            AccountCommand::Withdraw { amount } => Ok(vec![AccountEvent::Withdrawn { amount }]),
        }
    }
}

fn new_events(events: &[AccountEvent]) -> Vec<NewEvent> {
    events
        .iter()
        .map(|event| NewEvent::from_domain(event, EventMetadata::new()).expect("serializes"))
        .collect()
}

#[tokio::test]
async fn append_then_read_round_trips() {
    let store = InMemoryEventStore::new();
    let stream_id = StreamId::new("account-1");

    let version = store
        .append(
            stream_id.clone(),
            "account".to_string(),
            ExpectedVersion::NoStream,
            new_events(&[AccountEvent::Opened, AccountEvent::Deposited { amount: 50 }]),
        )
        .await
        .expect("append succeeds");
    assert_eq!(version, Version::new(1));

    let events = store
        .read_stream(stream_id, Version::INITIAL)
        .await
        .expect("read succeeds");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].stream_version, Version::new(0));
    assert_eq!(events[1].stream_version, Version::new(1));
    assert_eq!(events[0].stream_type, "account");

    let decoded: AccountEvent = events[1].decode().expect("decodes");
    assert_eq!(decoded, AccountEvent::Deposited { amount: 50 });
}

#[tokio::test]
async fn stale_expected_version_conflicts() {
    let store = InMemoryEventStore::new();
    let stream_id = StreamId::new("account-1");

    store
        .append(
            stream_id.clone(),
            "account".to_string(),
            ExpectedVersion::NoStream,
            new_events(&[AccountEvent::Opened]),
        )
        .await
        .expect("first append succeeds");

    // Two writers both loaded at version 0; the first wins.
    store
        .append(
            stream_id.clone(),
            "account".to_string(),
            ExpectedVersion::Exact(Version::new(0)),
            new_events(&[AccountEvent::Deposited { amount: 10 }]),
        )
        .await
        .expect("winner appends");

    let error = store
        .append(
            stream_id.clone(),
            "account".to_string(),
            ExpectedVersion::Exact(Version::new(0)),
            new_events(&[AccountEvent::Deposited { amount: 20 }]),
        )
        .await
        .expect_err("loser conflicts");

    assert!(matches!(
        &error,
        EventStoreError::ConcurrencyConflict { expected, actual, .. }
            if *expected == ExpectedVersion::Exact(Version::new(0))
                && *actual == ExpectedVersion::Exact(Version::new(1))
    ));

    // The losing batch left no trace.
    let events = store
        .read_stream(stream_id, Version::INITIAL)
        .await
        .expect("read succeeds");
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn appending_to_existing_stream_with_no_stream_conflicts() {
    let store = InMemoryEventStore::new();
    let stream_id = StreamId::new("account-1");

    store
        .append(
            stream_id.clone(),
            "account".to_string(),
            ExpectedVersion::NoStream,
            new_events(&[AccountEvent::Opened]),
        )
        .await
        .expect("first append succeeds");

    let error = store
        .append(
            stream_id,
            "account".to_string(),
            ExpectedVersion::NoStream,
            new_events(&[AccountEvent::Opened]),
        )
        .await
        .expect_err("stream already exists");
    assert!(matches!(error, EventStoreError::ConcurrencyConflict { .. }));
}

#[tokio::test]
async fn empty_append_is_rejected() {
    let store = InMemoryEventStore::new();

    let error = store
        .append(
            StreamId::new("account-1"),
            "account".to_string(),
            ExpectedVersion::NoStream,
            Vec::new(),
        )
        .await
        .expect_err("empty batch rejected");
    assert!(matches!(error, EventStoreError::EmptyAppend(_)));
}

#[tokio::test]
async fn store_debug_reports_event_count() {
    let store = InMemoryEventStore::new();
    store
        .append(
            StreamId::new("account-1"),
            "account".to_string(),
            ExpectedVersion::NoStream,
            new_events(&[AccountEvent::Opened]),
        )
        .await
        .expect("append succeeds");

    let rendered = format!("{store:?}");
    assert!(rendered.contains("InMemoryEventStore"));
    assert!(rendered.contains("events: 1"));
}

#[tokio::test]
async fn missing_stream_reads_empty() {
    let store = InMemoryEventStore::new();
    let events = store
        .read_stream(StreamId::new("account-404"), Version::INITIAL)
        .await
        .expect("read succeeds");
    assert!(events.is_empty());
}

#[tokio::test]
async fn global_positions_are_dense_across_streams() {
    let store = InMemoryEventStore::new();

    for stream in ["account-1", "account-2", "account-1", "account-3"] {
        let stream_id = StreamId::new(stream);
        let existing = store
            .read_stream(stream_id.clone(), Version::INITIAL)
            .await
            .expect("read succeeds");
        let expected = ExpectedVersion::from(existing.last().map(|e| e.stream_version));
        store
            .append(
                stream_id,
                "account".to_string(),
                expected,
                new_events(&[AccountEvent::Deposited { amount: 1 }]),
            )
            .await
            .expect("append succeeds");
    }

    let all = store
        .read_all(GlobalPosition::START, 100)
        .await
        .expect("read_all succeeds");
    assert_eq!(all.len(), 4);
    for (index, event) in all.iter().enumerate() {
        assert_eq!(event.global_position, GlobalPosition::new(index as u64 + 1));
    }

    // Stream versions stay gapless per stream.
    let first = store
        .read_stream(StreamId::new("account-1"), Version::INITIAL)
        .await
        .expect("read succeeds");
    let versions: Vec<_> = first.iter().map(|e| e.stream_version.value()).collect();
    assert_eq!(versions, [0, 1]);
}

#[tokio::test]
async fn read_all_pages_with_exclusive_lower_bound() {
    let store = InMemoryEventStore::new();
    let stream_id = StreamId::new("account-1");

    let batch: Vec<_> = (0..5).map(|_| AccountEvent::Deposited { amount: 1 }).collect();
    store
        .append(
            stream_id,
            "account".to_string(),
            ExpectedVersion::NoStream,
            new_events(&batch),
        )
        .await
        .expect("append succeeds");

    let page1 = store
        .read_all(GlobalPosition::START, 2)
        .await
        .expect("page 1");
    assert_eq!(page1.len(), 2);
    assert_eq!(page1[1].global_position, GlobalPosition::new(2));

    // Resume from the last processed position.
    let page2 = store
        .read_all(page1[1].global_position, 2)
        .await
        .expect("page 2");
    assert_eq!(page2[0].global_position, GlobalPosition::new(3));

    let page3 = store
        .read_all(page2[1].global_position, 2)
        .await
        .expect("page 3");
    assert_eq!(page3.len(), 1);

    let empty = store
        .read_all(page3[0].global_position, 2)
        .await
        .expect("empty page");
    assert!(empty.is_empty());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Any interleaving of appends keeps global positions dense and
        /// per-stream versions gapless.
        #[test]
        fn ordering_invariants_hold(batches in prop::collection::vec((0u8..4, 1usize..4), 1..20)) {
            tokio_test::block_on(async move {
                let store = InMemoryEventStore::new();

                for (stream_index, batch_size) in batches {
                    let stream_id = StreamId::new(format!("account-{stream_index}"));
                    let existing = store
                        .read_stream(stream_id.clone(), Version::INITIAL)
                        .await
                        .expect("read succeeds");
                    let expected = ExpectedVersion::from(existing.last().map(|e| e.stream_version));
                    let batch: Vec<_> =
                        (0..batch_size).map(|_| AccountEvent::Deposited { amount: 1 }).collect();
                    store
                        .append(stream_id, "account".to_string(), expected, new_events(&batch))
                        .await
                        .expect("append succeeds");
                }

                let all = store
                    .read_all(GlobalPosition::START, 1000)
                    .await
                    .expect("read_all succeeds");
                for (index, event) in all.iter().enumerate() {
                    prop_assert_eq!(event.global_position, GlobalPosition::new(index as u64 + 1));
                }

                for stream_index in 0u8..4 {
                    let events = store
                        .read_stream(StreamId::new(format!("account-{stream_index}")), Version::INITIAL)
                        .await
                        .expect("read succeeds");
                    for (index, event) in events.iter().enumerate() {
                        prop_assert_eq!(event.stream_version, Version::new(index as u64));
                    }
                }
                Ok(())
            })?;
        }
    }
}

#[tokio::test]
async fn repository_executes_commands_and_replays() {
    let store = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repository = AggregateRepository::<Account>::new(store, snapshots);
    let stream_id = StreamId::new("account-1");

    repository
        .execute(&stream_id, AccountCommand::Open, EventMetadata::new())
        .await
        .expect("open succeeds");
    repository
        .execute(
            &stream_id,
            AccountCommand::Deposit { amount: 100 },
            EventMetadata::new(),
        )
        .await
        .expect("deposit succeeds");
    repository
        .execute(
            &stream_id,
            AccountCommand::Withdraw { amount: 30 },
            EventMetadata::new(),
        )
        .await
        .expect("withdraw succeeds");

    let (account, version) = repository.load(&stream_id).await.expect("load succeeds");
    assert!(account.open);
    assert_eq!(account.balance, 70);
    assert_eq!(version, ExpectedVersion::Exact(Version::new(2)));
}

#[tokio::test]
async fn repository_surfaces_domain_errors_without_writing() {
    let store = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repository = AggregateRepository::<Account>::new(store.clone(), snapshots);
    let stream_id = StreamId::new("account-1");

    repository
        .execute(&stream_id, AccountCommand::Open, EventMetadata::new())
        .await
        .expect("open succeeds");

    let error = repository
        .execute(
            &stream_id,
            AccountCommand::Withdraw { amount: 10 },
            EventMetadata::new(),
        )
        .await
        .expect_err("overdraft rejected");
    assert!(matches!(
        error,
        strata_core::aggregate::AggregateError::Domain(DomainError::Validation(_))
    ));

    assert_eq!(store.len().expect("len"), 1);
}

#[tokio::test]
async fn snapshot_timestamps_come_from_the_injected_clock() {
    use strata_core::clock::Clock;
    use strata_core::snapshot::SnapshotStore;
    use strata_testing::test_clock;

    let clock = test_clock();
    let store = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repository = AggregateRepository::<Account>::new(store, snapshots.clone())
        .with_snapshot_every(2)
        .with_clock(Arc::new(clock.clone()));
    let stream_id = StreamId::new("account-1");

    repository
        .execute(&stream_id, AccountCommand::Open, EventMetadata::new())
        .await
        .expect("open succeeds");
    repository
        .execute(
            &stream_id,
            AccountCommand::Deposit { amount: 5 },
            EventMetadata::new(),
        )
        .await
        .expect("deposit succeeds");

    let snapshot = snapshots
        .load(stream_id)
        .await
        .expect("load succeeds")
        .expect("snapshot taken");
    assert_eq!(snapshot.taken_at, clock.now());
}

#[tokio::test]
async fn snapshotted_replay_matches_full_replay() {
    let store = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let snapshotting = AggregateRepository::<Account>::new(store.clone(), snapshots.clone())
        .with_snapshot_every(3);
    let stream_id = StreamId::new("account-1");

    snapshotting
        .execute(&stream_id, AccountCommand::Open, EventMetadata::new())
        .await
        .expect("open succeeds");
    for amount in 1..=7 {
        snapshotting
            .execute(
                &stream_id,
                AccountCommand::Deposit { amount },
                EventMetadata::new(),
            )
            .await
            .expect("deposit succeeds");
    }
    assert!(!snapshots.is_empty().expect("snapshot taken"));

    // A repository with no snapshots must reconstruct the same state.
    let fresh = AggregateRepository::<Account>::new(store, Arc::new(InMemorySnapshotStore::new()));
    let (from_snapshot, v1) = snapshotting.load(&stream_id).await.expect("load");
    let (from_scratch, v2) = fresh.load(&stream_id).await.expect("load");

    assert_eq!(from_snapshot.balance, from_scratch.balance);
    assert_eq!(from_snapshot.balance, 28);
    assert_eq!(v1, v2);
}
