use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use super::*;
use crate::config::SyncConfig;
use crate::models::{
    ConflictChoice, EntityPayload, EntityType, LocalId, PaymentMethod, Product, Sale, ServerId,
    SyncOperation, SyncStatus,
};
use crate::services::{DeleteOutcome, LocalStore};
use crate::state::SyncState;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Create(EntityPayload),
    Update(ServerId, EntityPayload),
    Delete(EntityType, ServerId),
    Get(EntityType, ServerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Create,
    Update,
    Delete,
    Get,
}

/// In-memory server with scripted failures.
struct FakeRemote {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Kind, VecDeque<RemoteError>>>,
    server: Mutex<HashMap<i64, RemoteSnapshot>>,
    /// Acks already issued, by idempotency key
    created: Mutex<HashMap<LocalId, RemoteAck>>,
    stalls: Mutex<VecDeque<Duration>>,
    late_acks: Mutex<VecDeque<Duration>>,
    latency: Mutex<Duration>,
    next_id: AtomicI64,
    clock: AtomicI64,
}

impl FakeRemote {
    fn new() -> Arc<Self> {
        Self::with_clock(1_000)
    }

    fn with_clock(start: i64) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            server: Mutex::new(HashMap::new()),
            created: Mutex::new(HashMap::new()),
            stalls: Mutex::new(VecDeque::new()),
            late_acks: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            next_id: AtomicI64::new(501),
            clock: AtomicI64::new(start),
        })
    }

    fn fail_next(&self, kind: Kind, error: RemoteError) {
        self.failures
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(error);
    }

    /// Delay only the next call
    fn stall_next(&self, delay: Duration) {
        self.stalls.lock().unwrap().push_back(delay);
    }

    /// Commit the next create, then delay its acknowledgement
    fn ack_late(&self, delay: Duration) {
        self.late_acks.lock().unwrap().push_back(delay);
    }

    /// Simulate the server dropping a record on its own
    fn forget(&self, server_id: ServerId) {
        self.server.lock().unwrap().remove(&server_id.0);
    }

    fn record_count(&self) -> usize {
        self.server.lock().unwrap().len()
    }

    fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Simulate an edit made on the server by someone else
    fn set_server_version(&self, server_id: ServerId, payload: EntityPayload, modified_at: i64) {
        self.server.lock().unwrap().insert(
            server_id.0,
            RemoteSnapshot {
                server_id,
                payload,
                last_modified_at: modified_at,
            },
        );
    }

    fn server_version(&self, server_id: ServerId) -> Option<RemoteSnapshot> {
        self.server.lock().unwrap().get(&server_id.0).cloned()
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, kind: Kind) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    (call, kind),
                    (Call::Create(_), Kind::Create)
                        | (Call::Update(..), Kind::Update)
                        | (Call::Delete(..), Kind::Delete)
                        | (Call::Get(..), Kind::Get)
                )
            })
            .count()
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn enter(&self, call: Call, kind: Kind) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(call);
        let delay = self
            .stalls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.latency.lock().unwrap());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        failure.map_or(Ok(()), Err)
    }
}

fn not_found() -> RemoteError {
    RemoteError::status(404, "not found (404)")
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn create(
        &self,
        local_id: &LocalId,
        payload: &EntityPayload,
    ) -> RemoteResult<RemoteAck> {
        self.enter(Call::Create(payload.clone()), Kind::Create).await?;
        if let Some(ack) = self.created.lock().unwrap().get(local_id).copied() {
            return Ok(ack);
        }

        let server_id = ServerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let last_modified_at = self.tick();
        self.set_server_version(server_id, payload.clone(), last_modified_at);
        let ack = RemoteAck {
            server_id,
            last_modified_at,
        };
        self.created.lock().unwrap().insert(*local_id, ack);

        let late = self.late_acks.lock().unwrap().pop_front();
        if let Some(delay) = late {
            tokio::time::sleep(delay).await;
        }
        Ok(ack)
    }

    async fn update(
        &self,
        server_id: ServerId,
        payload: &EntityPayload,
    ) -> RemoteResult<RemoteAck> {
        self.enter(Call::Update(server_id, payload.clone()), Kind::Update)
            .await?;
        if self.server_version(server_id).is_none() {
            return Err(not_found());
        }
        let last_modified_at = self.tick();
        self.set_server_version(server_id, payload.clone(), last_modified_at);
        Ok(RemoteAck {
            server_id,
            last_modified_at,
        })
    }

    async fn delete(&self, entity_type: EntityType, server_id: ServerId) -> RemoteResult<()> {
        self.enter(Call::Delete(entity_type, server_id), Kind::Delete)
            .await?;
        self.server
            .lock()
            .unwrap()
            .remove(&server_id.0)
            .map(|_| ())
            .ok_or_else(not_found)
    }

    async fn get(
        &self,
        entity_type: EntityType,
        server_id: ServerId,
    ) -> RemoteResult<RemoteSnapshot> {
        self.enter(Call::Get(entity_type, server_id), Kind::Get)
            .await?;
        self.server_version(server_id).ok_or_else(not_found)
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        base_delay_ms: 0,
        max_delay_ms: 0,
        jitter_ms: 0,
        request_timeout_ms: 2_000,
        ..SyncConfig::default()
    }
}

async fn engine_with(
    remote: &Arc<FakeRemote>,
    connectivity: Arc<dyn Connectivity>,
    config: SyncConfig,
) -> SyncEngine {
    let store = LocalStore::open_in_memory().await.unwrap();
    SyncEngine::new(store, remote.clone(), connectivity, config).unwrap()
}

async fn engine(remote: &Arc<FakeRemote>) -> SyncEngine {
    engine_with(remote, Arc::new(AssumeOnline::default()), fast_config()).await
}

fn sale() -> Sale {
    Sale::new("SKU-1", 2, 60, PaymentMethod::Cash).unwrap()
}

fn soap(price: i64) -> Product {
    Product::new("Soap", "SOAP-1", price)
}

// ---------------------------------------------------------------------------
// Cycle basics
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn empty_queue_sync_changes_nothing() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;

    let result = engine.sync_all().await;

    assert_eq!(result.status, SyncStatus::Completed);
    assert_eq!((result.synced, result.failed, result.deferred), (0, 0, 0));
    assert!(result.errors.is_empty());
    assert!(remote.calls().is_empty());
    assert!(engine
        .store()
        .list_records(None, true, 100, 0)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(engine.get_pending_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn simple_sale_sync_assigns_server_id() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = engine.record_create(sale()).await.unwrap();
    assert_eq!(engine.get_pending_count().await.unwrap(), 1);

    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert_eq!(engine.get_pending_count().await.unwrap(), 0);
    let stored = engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.server_id, Some(ServerId(501)));
    assert!(stored.synced);
    let EntityPayload::Sale(pushed) = stored.payload else {
        panic!("expected a sale payload");
    };
    assert_eq!(pushed.total_amount, 120);
    assert!(engine.last_sync_at().await.unwrap().is_some());
    assert_eq!(engine.state(), SyncState::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_sync_runs_exactly_once() {
    let remote = FakeRemote::new();
    remote.set_latency(Duration::from_millis(100));
    let engine = engine(&remote).await;
    engine.record_create(sale()).await.unwrap();

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    engine.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (first, second) = tokio::join!(engine.sync_all(), engine.sync_all());

    assert!(first.is_completed());
    assert_eq!(first.synced, 1);
    assert!(second.already_running());
    assert_eq!(second.synced, 0);
    assert_eq!(remote.count(Kind::Create), 1);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(!engine.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn entries_of_equal_priority_push_in_enqueue_order() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    for sku in ["A", "B", "C"] {
        engine
            .record_create(Product::new("Item", sku, 100))
            .await
            .unwrap();
    }

    engine.sync_all().await;

    let pushed: Vec<String> = remote
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Create(EntityPayload::Product(product)) => Some(product.sku),
            _ => None,
        })
        .collect();
    assert_eq!(pushed, vec!["A", "B", "C"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn sales_drain_before_catalog_changes() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    engine.record_create(soap(100)).await.unwrap();
    engine.record_create(sale()).await.unwrap();

    engine.sync_all().await;

    assert!(matches!(
        remote.calls().first(),
        Some(Call::Create(EntityPayload::Sale(_)))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn mid_cycle_enqueue_waits_for_next_cycle() {
    let remote = FakeRemote::new();
    remote.set_latency(Duration::from_millis(100));
    let engine = engine(&remote).await;
    engine.record_create(sale()).await.unwrap();

    let (first, late) = tokio::join!(engine.sync_all(), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.record_create(soap(100)).await.unwrap()
    });

    assert_eq!(first.synced, 1);
    assert_eq!(remote.count(Kind::Create), 1);
    let queue = engine.store().list_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].local_id, late.local_id);
    assert_eq!(queue[0].attempts, 0);

    let second = engine.sync_all().await;
    assert_eq!(second.synced, 1);
    assert_eq!(engine.get_pending_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_sync_returns_without_spending_budget() {
    let remote = FakeRemote::new();
    let connectivity = Arc::new(ManualConnectivity::new(false));
    let engine = engine_with(&remote, connectivity.clone(), fast_config()).await;
    engine.record_create(sale()).await.unwrap();

    let result = engine.sync_all().await;

    assert_eq!(result.status, SyncStatus::Offline);
    assert!(!result.errors.is_empty());
    assert!(remote.calls().is_empty());
    let queue = engine.store().list_queue().await.unwrap();
    assert_eq!(queue[0].attempts, 0);
    assert_eq!(engine.state(), SyncState::Offline);
    assert_eq!(engine.last_sync_at().await.unwrap(), None);
}

// ---------------------------------------------------------------------------
// Failures and retry budget
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn retryable_failure_then_success_within_one_cycle() {
    let remote = FakeRemote::new();
    remote.fail_next(Kind::Create, RemoteError::Timeout);
    let engine = engine(&remote).await;
    let record = engine.record_create(sale()).await.unwrap();

    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert_eq!(result.deferred, 0);
    assert_eq!(remote.count(Kind::Create), 2);
    assert_eq!(engine.get_pending_count().await.unwrap(), 0);
    let stored = engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_call_times_out_and_is_retried() {
    let remote = FakeRemote::new();
    remote.stall_next(Duration::from_millis(500));
    let config = SyncConfig {
        request_timeout_ms: 50,
        ..fast_config()
    };
    let engine = engine_with(&remote, Arc::new(AssumeOnline::default()), config).await;
    engine.record_create(sale()).await.unwrap();

    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert_eq!(remote.count(Kind::Create), 2);
    // The timed-out call never reached the server
    assert!(remote.server_version(ServerId(502)).is_none());
    assert!(remote.server_version(ServerId(501)).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn create_committed_before_a_timeout_is_not_duplicated() {
    let remote = FakeRemote::new();
    remote.ack_late(Duration::from_millis(500));
    let config = SyncConfig {
        request_timeout_ms: 50,
        ..fast_config()
    };
    let engine = engine_with(&remote, Arc::new(AssumeOnline::default()), config).await;
    let record = engine.record_create(sale()).await.unwrap();

    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert_eq!(remote.count(Kind::Create), 2);
    assert_eq!(remote.record_count(), 1);
    let stored = engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.server_id, Some(ServerId(501)));
    assert!(stored.synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn retryable_failure_stays_queued_with_one_attempt() {
    let remote = FakeRemote::new();
    remote.fail_next(Kind::Create, RemoteError::status(503, "HTTP 503"));
    let config = SyncConfig {
        inner_retries: 1,
        ..fast_config()
    };
    let engine = engine_with(&remote, Arc::new(AssumeOnline::default()), config).await;
    let record = engine.record_create(sale()).await.unwrap();

    let first = engine.sync_all().await;

    assert_eq!(first.deferred, 1);
    assert_eq!(first.failed, 0);
    assert!(first.errors[0].contains("will retry"));
    let queue = engine.store().list_queue().await.unwrap();
    assert_eq!(queue[0].attempts, 1);
    assert_eq!(queue[0].last_error.as_deref(), Some("HTTP 503"));
    assert_eq!(engine.state(), SyncState::Error);

    let second = engine.sync_all().await;

    assert_eq!(second.synced, 1);
    let stored = engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn attempts_accumulate_across_cycles_up_to_the_maximum() {
    let remote = FakeRemote::new();
    for _ in 0..4 {
        remote.fail_next(Kind::Create, RemoteError::Network("refused".into()));
    }
    let config = SyncConfig {
        max_attempts: 4,
        inner_retries: 3,
        ..fast_config()
    };
    let engine = engine_with(&remote, Arc::new(AssumeOnline::default()), config).await;
    engine.record_create(sale()).await.unwrap();

    let first = engine.sync_all().await;
    assert_eq!(first.deferred, 1);
    let queue = engine.store().list_queue().await.unwrap();
    assert_eq!(queue[0].attempts, 3);

    // Only one attempt of budget is left, not a fresh inner loop
    let second = engine.sync_all().await;
    assert_eq!(second.failed, 1);
    assert_eq!(remote.count(Kind::Create), 4);
    assert_eq!(engine.get_pending_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_are_reported_as_failures() {
    let remote = FakeRemote::new();
    remote.fail_next(Kind::Create, RemoteError::status(503, "HTTP 503"));
    let engine = engine(&remote).await;
    let record = engine.record_create(sale()).await.unwrap();
    let entry = engine.store().list_queue().await.unwrap().remove(0);
    for _ in 0..4 {
        engine
            .store()
            .increment_attempt(entry.id, Some("earlier"))
            .await
            .unwrap();
    }

    let result = engine.sync_all().await;

    assert_eq!(result.failed, 1);
    assert_eq!(result.synced, 0);
    assert!(result.conflicts.is_empty());
    assert!(result.errors[0].contains("gave up after 5 attempts"));
    assert_eq!(engine.get_pending_count().await.unwrap(), 0);
    // The sale itself survives, flagged for attention
    let attention = engine.needs_attention().await.unwrap();
    assert_eq!(attention.len(), 1);
    assert_eq!(attention[0].local_id, record.local_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn entries_at_the_maximum_are_discarded_at_cycle_start() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    engine.record_create(sale()).await.unwrap();
    let entry = engine.store().list_queue().await.unwrap().remove(0);
    for _ in 0..5 {
        engine
            .store()
            .increment_attempt(entry.id, None)
            .await
            .unwrap();
    }

    let result = engine.sync_all().await;

    assert_eq!(result.failed, 1);
    assert!(result.errors[0].contains("discarded after 5 attempts"));
    assert!(remote.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn permanent_create_failure_keeps_the_sale() {
    let remote = FakeRemote::new();
    remote.fail_next(
        Kind::Create,
        RemoteError::status(422, "insufficient stock (422)"),
    );
    let engine = engine(&remote).await;
    let record = engine.record_create(sale()).await.unwrap();

    let result = engine.sync_all().await;

    assert_eq!(result.failed, 1);
    assert!(result.errors[0].contains("insufficient stock"));
    assert_eq!(remote.count(Kind::Create), 1);
    assert_eq!(engine.get_pending_count().await.unwrap(), 0);
    let stored = engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.synced);
    assert_eq!(stored.server_id, None);
    assert_eq!(engine.needs_attention().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn later_changes_wait_behind_a_deferred_create() {
    let remote = FakeRemote::new();
    remote.fail_next(Kind::Create, RemoteError::Timeout);
    let config = SyncConfig {
        inner_retries: 1,
        ..fast_config()
    };
    let engine = engine_with(&remote, Arc::new(AssumeOnline::default()), config).await;
    let record = engine.record_create(soap(100)).await.unwrap();
    engine
        .record_update(&record.local_id, soap(110))
        .await
        .unwrap();

    let first = engine.sync_all().await;

    assert_eq!(first.deferred, 2);
    let queue = engine.store().list_queue().await.unwrap();
    assert_eq!(queue[0].attempts, 1);
    assert_eq!(queue[1].attempts, 0);
    assert_eq!(remote.count(Kind::Update), 0);

    let second = engine.sync_all().await;

    assert_eq!(second.synced, 2);
    assert_eq!(
        remote.server_version(ServerId(501)).unwrap().payload,
        EntityPayload::from(soap(110))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn update_of_a_record_the_server_rejected_fails() {
    let remote = FakeRemote::new();
    remote.fail_next(Kind::Create, RemoteError::status(400, "bad sku (400)"));
    let engine = engine(&remote).await;
    let record = engine.record_create(soap(100)).await.unwrap();
    engine
        .record_update(&record.local_id, soap(110))
        .await
        .unwrap();

    let result = engine.sync_all().await;

    assert_eq!(result.failed, 2);
    assert_eq!(remote.count(Kind::Update), 0);
    assert!(result.errors[1].contains("never created on the server"));
}

// ---------------------------------------------------------------------------
// Updates and conflicts
// ---------------------------------------------------------------------------

async fn synced_soap(engine: &SyncEngine) -> crate::models::LocalRecord {
    let record = engine.record_create(soap(120)).await.unwrap();
    let result = engine.sync_all().await;
    assert_eq!(result.synced, 1);
    record
}

#[tokio::test(flavor = "multi_thread")]
async fn conflict_resolved_in_favor_of_newer_server_version() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = synced_soap(&engine).await;

    engine
        .record_update(&record.local_id, soap(130))
        .await
        .unwrap();
    let entry = engine.store().list_queue().await.unwrap().remove(0);
    let theirs = EntityPayload::from(Product::new("Soap bar", "SOAP-1", 150));
    remote.set_server_version(ServerId(501), theirs.clone(), entry.modified_at + 10);

    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert_eq!(result.conflicts_resolved, 1);
    assert!(result.conflicts.is_empty());
    assert_eq!(remote.count(Kind::Update), 0);
    let stored = engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payload, theirs);
    assert!(stored.synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn conflict_resolved_in_favor_of_newer_local_change() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = synced_soap(&engine).await;

    engine
        .record_update(&record.local_id, soap(130))
        .await
        .unwrap();
    // Someone edited the server after our base, but before our local edit
    remote.set_server_version(
        ServerId(501),
        Product::new("Soap bar", "SOAP-1", 150).into(),
        1_500,
    );

    let result = engine.sync_all().await;

    assert_eq!(result.conflicts_resolved, 1);
    assert_eq!(
        remote.server_version(ServerId(501)).unwrap().payload,
        EntityPayload::from(soap(130))
    );
    let stored = engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_server_version_is_updated_directly() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = synced_soap(&engine).await;

    engine
        .record_update(&record.local_id, soap(130))
        .await
        .unwrap();
    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert_eq!(result.conflicts_resolved, 0);
    assert_eq!(
        remote.calls()[1..],
        [
            Call::Get(EntityType::Product, ServerId(501)),
            Call::Update(ServerId(501), soap(130).into()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn chained_offline_edits_do_not_conflict_with_our_own_pushes() {
    // Server clock well ahead of the device clock
    let remote = FakeRemote::with_clock(crate::util::now_millis() + 86_400_000);
    let engine = engine(&remote).await;
    let record = engine.record_create(soap(100)).await.unwrap();
    engine
        .record_update(&record.local_id, soap(110))
        .await
        .unwrap();
    engine
        .record_update(&record.local_id, soap(120))
        .await
        .unwrap();

    let result = engine.sync_all().await;

    assert_eq!(result.synced, 3);
    assert_eq!(result.conflicts_resolved, 0);
    assert_eq!(remote.count(Kind::Update), 2);
    let stored = engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payload, EntityPayload::from(soap(120)));
    assert!(stored.synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_conflict_on_update_goes_through_the_resolver() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = synced_soap(&engine).await;

    engine
        .record_update(&record.local_id, soap(130))
        .await
        .unwrap();
    remote.fail_next(Kind::Update, RemoteError::status(409, "stale (409)"));

    let result = engine.sync_all().await;

    // Local edit is newer than the server's stored timestamp, so it is pushed again
    assert_eq!(result.conflicts_resolved, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(remote.count(Kind::Update), 2);
    assert_eq!(
        remote.server_version(ServerId(501)).unwrap().payload,
        EntityPayload::from(soap(130))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn conflicting_delete_is_held_until_resolved() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = synced_soap(&engine).await;

    engine.record_delete(&record.local_id).await.unwrap();
    remote.fail_next(Kind::Delete, RemoteError::status(409, "in use (409)"));

    let result = engine.sync_all().await;

    assert_eq!(result.failed, 0);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(engine.get_pending_count().await.unwrap(), 0);
    let conflict = engine.get_conflicts().remove(0);
    assert_eq!(conflict.operation, SyncOperation::Delete);
    assert_eq!(conflict.remote, Some(soap(120).into()));

    let resolved = engine
        .resolve_conflict(conflict.id, ConflictChoice::Server)
        .await
        .unwrap();

    assert_eq!(resolved.state, crate::models::ConflictState::Server);
    assert!(engine.get_conflicts().is_empty());
    let stored = engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_deleted);
    assert!(stored.synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn keeping_the_local_side_requeues_the_change() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = synced_soap(&engine).await;

    engine.record_delete(&record.local_id).await.unwrap();
    remote.fail_next(Kind::Delete, RemoteError::status(409, "in use (409)"));
    engine.sync_all().await;
    let conflict = engine.get_conflicts().remove(0);

    engine
        .resolve_conflict(conflict.id, ConflictChoice::Local)
        .await
        .unwrap();
    assert_eq!(engine.get_pending_count().await.unwrap(), 1);

    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert!(remote.server_version(ServerId(501)).is_none());
    assert!(engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn resolving_an_unknown_conflict_is_not_found() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;

    let result = engine
        .resolve_conflict(crate::models::ConflictId::new(), ConflictChoice::Local)
        .await;

    assert!(matches!(result, Err(crate::Error::NotFound(_))));
}

// ---------------------------------------------------------------------------
// Deletes and maintenance
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn delete_before_first_sync_never_reaches_the_server() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = engine.record_create(soap(100)).await.unwrap();

    let outcome = engine.record_delete(&record.local_id).await.unwrap();
    let result = engine.sync_all().await;

    assert_eq!(outcome, DeleteOutcome::Collapsed { removed_entries: 1 });
    assert_eq!(result.synced, 0);
    assert!(remote.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_of_synced_record_purges_after_push() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = synced_soap(&engine).await;

    let outcome = engine.record_delete(&record.local_id).await.unwrap();
    assert!(matches!(outcome, DeleteOutcome::Queued(_)));
    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert!(remote
        .calls()
        .contains(&Call::Delete(EntityType::Product, ServerId(501))));
    assert!(engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_of_a_record_already_gone_remotely_purges_it() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = synced_soap(&engine).await;
    remote.forget(ServerId(501));

    engine.record_delete(&record.local_id).await.unwrap();
    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert_eq!(result.failed, 0);
    assert!(result.errors.is_empty());
    assert!(engine
        .store()
        .get_record(&record.local_id)
        .await
        .unwrap()
        .is_none());
    assert!(engine.needs_attention().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_failed_items_keeps_entries_within_budget() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    engine.record_create(sale()).await.unwrap();
    engine.record_create(soap(100)).await.unwrap();
    let queue = engine.store().list_queue().await.unwrap();
    for _ in 0..5 {
        engine
            .store()
            .increment_attempt(queue[0].id, None)
            .await
            .unwrap();
    }
    engine
        .store()
        .increment_attempt(queue[1].id, None)
        .await
        .unwrap();

    assert_eq!(engine.clear_failed_items().await.unwrap(), 1);
    let remaining = engine.store().list_queue().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, queue[1].id);
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_for_sync_stamps_the_entry() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let record = synced_soap(&engine).await;
    let before = crate::util::now_millis();

    let entry_id = engine
        .queue_for_sync(SyncOperation::Update, record.local_id, soap(125).into())
        .await
        .unwrap();

    let entry = engine.store().queue_entry(entry_id).await.unwrap().unwrap();
    assert!(entry.modified_at >= before);
    assert_eq!(entry.server_id, Some(ServerId(501)));
    assert_eq!(entry.base_modified_at, Some(1_001));
}

// ---------------------------------------------------------------------------
// Observers and scheduling
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn panicking_listener_does_not_break_the_cycle() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    engine.record_create(sale()).await.unwrap();

    engine.subscribe(|_| panic!("badge renderer crashed"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.subscribe(move |result| sink.lock().unwrap().push(result.synced));

    let result = engine.sync_all().await;

    assert_eq!(result.synced, 1);
    assert_eq!(*seen.lock().unwrap(), vec![1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unsubscribed_listener_is_not_called() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let subscription = engine.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    engine.sync_all().await;
    subscription.unsubscribe();
    engine.sync_all().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn auto_sync_runs_when_connectivity_returns() {
    let remote = FakeRemote::new();
    let connectivity = Arc::new(ManualConnectivity::new(false));
    let engine = engine_with(&remote, connectivity.clone(), fast_config()).await;
    engine.record_create(sale()).await.unwrap();

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    engine.subscribe(move |result| {
        sender.send(result.clone()).ok();
    });

    engine.start_auto_sync(Duration::from_secs(3_600)).unwrap();
    connectivity.set_online(true);

    let result = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.synced, 1);

    assert!(engine.stop_auto_sync());
    assert!(!engine.stop_auto_sync());
}

#[tokio::test(flavor = "multi_thread")]
async fn auto_sync_runs_on_its_interval() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    engine.record_create(sale()).await.unwrap();

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    engine.subscribe(move |result| {
        sender.send(result.synced).ok();
    });

    engine.start_auto_sync(Duration::from_millis(20)).unwrap();
    // Restarting replaces the schedule instead of adding a second one
    engine.start_auto_sync(Duration::from_millis(20)).unwrap();
    assert!(engine.is_auto_syncing());

    let synced = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(synced, 1);
    engine.stop_auto_sync();
    assert!(!engine.is_auto_syncing());
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_auto_sync_prevents_further_cycles() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;
    let cycles = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cycles);
    engine.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    engine.start_auto_sync(Duration::from_millis(10)).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while cycles.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(engine.stop_auto_sync());
    // Let a cycle that was already running finish
    tokio::time::sleep(Duration::from_millis(50)).await;
    let at_stop = cycles.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cycles.load(Ordering::SeqCst), at_stop);
    assert!(!engine.is_auto_syncing());
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_auto_sync_interval_is_rejected() {
    let remote = FakeRemote::new();
    let engine = engine(&remote).await;

    assert!(engine.start_auto_sync(Duration::ZERO).is_err());
    assert!(!engine.is_auto_syncing());
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_config_is_rejected_at_construction() {
    let remote = FakeRemote::new();
    let store = LocalStore::open_in_memory().await.unwrap();
    let config = SyncConfig {
        max_attempts: 0,
        ..fast_config()
    };

    let result = SyncEngine::new(store, remote, Arc::new(AssumeOnline::default()), config);

    assert!(result.is_err());
}
