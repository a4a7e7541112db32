//! Sync engine: drains the queue against the remote API.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::backoff::Backoff;
use super::conflict::{resolve, Decision, VersionedPayload};
use super::connectivity::Connectivity;
use super::observer::{Observers, Subscription};
use super::remote::{FailureClass, RemoteApi, RemoteError, RemoteResult, RemoteSnapshot};
use crate::config::SyncConfig;
use crate::models::{
    ConflictChoice, ConflictId, ConflictRecord, ConflictState, EntityPayload, LocalId,
    LocalRecord, NewQueueEntry, Priority, QueueEntry, QueueEntryId, ServerId, SyncOperation,
    SyncResult, SyncStatus,
};
use crate::services::{DeleteOutcome, LocalStore};
use crate::state::SyncState;
use crate::util::now_millis;
use crate::{Error, Result};

/// Orchestrates sync cycles over a [`LocalStore`] and a [`RemoteApi`].
///
/// Cheap to clone; clones share the busy flag, observers and conflicts.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

struct Shared {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    connectivity: Arc<dyn Connectivity>,
    config: SyncConfig,
    backoff: Backoff,
    observers: Observers,
    conflicts: Mutex<Vec<ConflictRecord>>,
    running: AtomicBool,
    last_state: Mutex<Option<SyncState>>,
    auto_sync: Mutex<Option<AutoSync>>,
}

struct AutoSync {
    shutdown: oneshot::Sender<()>,
    _task: JoinHandle<()>,
}

/// Clears the busy flag when the cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// How a single entry was settled
enum Pushed {
    Synced,
    Resolved(Decision),
    /// Cannot be pushed, ever
    Rejected(String),
    /// An earlier create for the same record is still queued
    Waiting,
    Held(ConflictRecord),
}

enum EntryOutcome {
    Settled,
    Deferred,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn describe(entry: &QueueEntry) -> String {
    format!("{} {} {}", entry.operation, entry.entity_type, entry.local_id)
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn Connectivity>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                store,
                remote,
                connectivity,
                backoff: Backoff::from_config(&config),
                config,
                observers: Observers::default(),
                conflicts: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                last_state: Mutex::new(None),
                auto_sync: Mutex::new(None),
            }),
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.shared.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Record a new entity locally and queue its create.
    pub async fn record_create(&self, payload: impl Into<EntityPayload>) -> Result<LocalRecord> {
        let record = LocalRecord::new(payload.into());
        let priority = Priority::default_for(record.entity_type());
        let entry_id = self
            .shared
            .store
            .insert_and_enqueue(&record, priority)
            .await?;
        tracing::debug!(
            local_id = %record.local_id,
            entry_id = %entry_id,
            "Recorded {} locally",
            record.entity_type()
        );
        Ok(record)
    }

    /// Replace a record's payload and queue the update.
    pub async fn record_update(
        &self,
        id: &LocalId,
        payload: impl Into<EntityPayload>,
    ) -> Result<LocalRecord> {
        let payload = payload.into();
        let priority = Priority::default_for(payload.entity_type());
        let (record, _) = self
            .shared
            .store
            .update_and_enqueue(id, &payload, now_millis(), priority)
            .await?;
        Ok(record)
    }

    /// Delete a record locally; queue the remote delete if the server knows it.
    pub async fn record_delete(&self, id: &LocalId) -> Result<DeleteOutcome> {
        let record = self
            .shared
            .store
            .get_record(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("record {id}")))?;
        self.shared
            .store
            .delete_and_enqueue(id, now_millis(), Priority::default_for(record.entity_type()))
            .await
    }

    /// Queue a mutation for an existing record, stamped with the current time.
    pub async fn queue_for_sync(
        &self,
        operation: SyncOperation,
        local_id: LocalId,
        payload: EntityPayload,
    ) -> Result<QueueEntryId> {
        let record = self.shared.store.get_record(&local_id).await?;
        let priority = Priority::default_for(payload.entity_type());
        self.shared
            .store
            .enqueue(&NewQueueEntry {
                operation,
                local_id,
                server_id: record.as_ref().and_then(|record| record.server_id),
                payload,
                modified_at: now_millis(),
                base_modified_at: record.and_then(|record| record.remote_modified_at),
                priority,
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Reads and maintenance
    // -----------------------------------------------------------------------

    /// Queue entries waiting to be pushed, read from storage.
    pub async fn get_pending_count(&self) -> Result<u64> {
        self.shared.store.queue_count().await
    }

    /// Conflicts held for manual resolution.
    pub fn get_conflicts(&self) -> Vec<ConflictRecord> {
        lock(&self.shared.conflicts)
            .iter()
            .filter(|conflict| conflict.is_pending())
            .cloned()
            .collect()
    }

    /// Drop entries that used up their retry budget. Entries within budget stay.
    pub async fn clear_failed_items(&self) -> Result<u64> {
        let removed = self
            .shared
            .store
            .clear_exhausted(self.shared.config.max_attempts)
            .await?;
        if removed > 0 {
            tracing::info!(removed, "Cleared failed sync entries");
        }
        Ok(removed)
    }

    pub async fn last_sync_at(&self) -> Result<Option<i64>> {
        self.shared.store.last_sync_at().await
    }

    /// Unsynced records no queue entry will push.
    pub async fn needs_attention(&self) -> Result<Vec<LocalRecord>> {
        self.shared.store.needs_attention().await
    }

    /// Current indicator state. `Synced` until the first cycle says otherwise.
    pub fn state(&self) -> SyncState {
        if self.shared.running.load(Ordering::Acquire) {
            return SyncState::Syncing;
        }
        if !self.shared.connectivity.is_online() {
            return SyncState::Offline;
        }
        lock(&self.shared.last_state).unwrap_or(SyncState::Synced)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Register a listener invoked once per finished cycle.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SyncResult) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.observers.subscribe(listener)
    }

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------

    /// Settle a held conflict and discard it.
    pub async fn resolve_conflict(
        &self,
        id: ConflictId,
        choice: ConflictChoice,
    ) -> Result<ConflictRecord> {
        let conflict = lock(&self.shared.conflicts)
            .iter()
            .find(|conflict| conflict.id == id && conflict.is_pending())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("conflict {id}")))?;

        match choice {
            ConflictChoice::Local => self.requeue_local(&conflict).await?,
            ConflictChoice::Server => self.adopt_server(&conflict).await?,
        }

        lock(&self.shared.conflicts).retain(|held| held.id != id);
        tracing::info!(
            conflict_id = %id,
            local_id = %conflict.local_id,
            ?choice,
            "Resolved {} conflict",
            conflict.entity_type
        );

        Ok(ConflictRecord {
            state: choice.into(),
            ..conflict
        })
    }

    async fn requeue_local(&self, conflict: &ConflictRecord) -> Result<()> {
        let record = self.shared.store.get_record(&conflict.local_id).await?;
        self.shared
            .store
            .enqueue(&NewQueueEntry {
                operation: conflict.operation,
                local_id: conflict.local_id,
                server_id: conflict
                    .server_id
                    .or_else(|| record.as_ref().and_then(|record| record.server_id)),
                payload: conflict.local.clone(),
                modified_at: now_millis(),
                base_modified_at: conflict
                    .remote_modified_at
                    .or_else(|| record.and_then(|record| record.remote_modified_at)),
                priority: Priority::default_for(conflict.entity_type),
            })
            .await?;
        Ok(())
    }

    async fn adopt_server(&self, conflict: &ConflictRecord) -> Result<()> {
        let Some(server_id) = conflict.server_id else {
            // The server holds no version of a record it never acknowledged
            return self.shared.store.purge_record(&conflict.local_id).await;
        };

        let (payload, remote_modified_at) = match (&conflict.remote, conflict.remote_modified_at)
        {
            (Some(payload), Some(remote_modified_at)) => (payload.clone(), remote_modified_at),
            _ => {
                let snapshot = self
                    .call(self.shared.remote.get(conflict.entity_type, server_id))
                    .await?;
                (snapshot.payload, snapshot.last_modified_at)
            }
        };

        self.shared
            .store
            .apply_remote(&conflict.local_id, server_id, &payload, remote_modified_at)
            .await
    }

    // -----------------------------------------------------------------------
    // Sync cycle
    // -----------------------------------------------------------------------

    /// Run one sync cycle over a snapshot of the queue.
    ///
    /// Returns immediately with [`SyncStatus::AlreadyRunning`] if a cycle is
    /// in flight, and with [`SyncStatus::Offline`] without touching the queue
    /// when there is no connectivity.
    pub async fn sync_all(&self) -> SyncResult {
        let started_at = now_millis();
        let Some(_guard) = RunningGuard::acquire(&self.shared.running) else {
            tracing::debug!("Sync already in progress");
            return SyncResult::empty(SyncStatus::AlreadyRunning, started_at, now_millis());
        };

        let mut result = SyncResult::empty(SyncStatus::Completed, started_at, started_at);

        if self.shared.connectivity.is_online() {
            if let Err(error) = self.run_cycle(&mut result).await {
                tracing::error!("Sync cycle aborted: {}", error);
                result.status = SyncStatus::Aborted {
                    reason: error.to_string(),
                };
            }
        } else {
            tracing::debug!("Skipping sync while offline");
            result.status = SyncStatus::Offline;
            result.errors.push("device is offline".to_string());
        }

        result.conflicts = self.get_conflicts();
        result.finished_at = now_millis();

        if result.is_completed() {
            if let Err(error) = self.shared.store.set_last_sync_at(result.finished_at).await {
                tracing::warn!("Failed to persist last sync time: {}", error);
            }
            tracing::info!(
                synced = result.synced,
                failed = result.failed,
                deferred = result.deferred,
                conflicts_resolved = result.conflicts_resolved,
                pending_conflicts = result.conflicts.len(),
                "Sync cycle finished"
            );
        }

        *lock(&self.shared.last_state) = Some(SyncState::after(&result));
        self.shared.observers.notify(&result);
        result
    }

    async fn run_cycle(&self, result: &mut SyncResult) -> Result<()> {
        let store = &self.shared.store;
        let max_attempts = self.shared.config.max_attempts;

        for entry in store.list_exhausted(max_attempts).await? {
            store.remove_entry(entry.id).await?;
            tracing::warn!(
                entry_id = %entry.id,
                attempts = entry.attempts,
                "Discarding exhausted sync entry"
            );
            result.failed += 1;
            result.errors.push(format!(
                "{}: discarded after {} attempts",
                describe(&entry),
                entry.attempts
            ));
        }

        let snapshot = store.list_pending(max_attempts).await?;
        tracing::debug!(entries = snapshot.len(), "Starting sync cycle");

        let mut blocked: HashSet<LocalId> = HashSet::new();
        for entry in snapshot {
            if blocked.contains(&entry.local_id) {
                result.deferred += 1;
                result.errors.push(format!(
                    "{}: deferred behind an earlier change to the same record",
                    describe(&entry)
                ));
                continue;
            }

            // Entries can vanish mid-cycle (a local delete collapses them)
            let Some(entry) = store.queue_entry(entry.id).await? else {
                continue;
            };

            if let EntryOutcome::Deferred = self.process_entry(&entry, result).await? {
                blocked.insert(entry.local_id);
            }
        }

        let reconciled = store.reconcile_unsynced().await?;
        if reconciled > 0 {
            tracing::debug!(reconciled, "Reconciled synced flags");
        }
        Ok(())
    }

    /// Push one entry with a bounded inner retry loop.
    ///
    /// Remote failures are settled here; local store failures abort the cycle.
    async fn process_entry(
        &self,
        entry: &QueueEntry,
        result: &mut SyncResult,
    ) -> Result<EntryOutcome> {
        let store = &self.shared.store;
        let max_attempts = self.shared.config.max_attempts;
        let tries = entry
            .remaining_attempts(max_attempts)
            .min(self.shared.config.inner_retries);
        let mut failed_tries = 0;

        loop {
            let error = match self.push(entry).await {
                Ok(pushed) => return self.settle(entry, pushed, result).await,
                Err(Error::Remote(error)) => error,
                Err(error) => return Err(error),
            };

            match error.classify() {
                FailureClass::Retryable => {
                    let attempts = store
                        .increment_attempt(entry.id, Some(&error.to_string()))
                        .await?;
                    failed_tries += 1;

                    if attempts >= max_attempts {
                        store.remove_entry(entry.id).await?;
                        tracing::warn!(
                            entry_id = %entry.id,
                            attempts,
                            "Sync entry exhausted its retries: {}",
                            error
                        );
                        result.failed += 1;
                        result.errors.push(format!(
                            "{}: gave up after {attempts} attempts: {error}",
                            describe(entry)
                        ));
                        return Ok(EntryOutcome::Settled);
                    }

                    if failed_tries >= tries {
                        tracing::warn!(
                            entry_id = %entry.id,
                            attempts,
                            "Sync entry left queued: {}",
                            error
                        );
                        result.deferred += 1;
                        result
                            .errors
                            .push(format!("{}: will retry: {error}", describe(entry)));
                        return Ok(EntryOutcome::Deferred);
                    }

                    tokio::time::sleep(self.shared.backoff.delay(attempts.saturating_sub(1)))
                        .await;
                }
                FailureClass::Permanent => {
                    store.remove_entry(entry.id).await?;
                    tracing::warn!(entry_id = %entry.id, "Sync entry rejected: {}", error);
                    result.failed += 1;
                    result
                        .errors
                        .push(format!("{}: rejected: {error}", describe(entry)));
                    return Ok(EntryOutcome::Settled);
                }
                FailureClass::Conflict => {
                    let conflict = self.hold_conflict(entry).await?;
                    return self.settle(entry, Pushed::Held(conflict), result).await;
                }
            }
        }
    }

    async fn settle(
        &self,
        entry: &QueueEntry,
        pushed: Pushed,
        result: &mut SyncResult,
    ) -> Result<EntryOutcome> {
        let store = &self.shared.store;
        match pushed {
            Pushed::Waiting => {
                result.deferred += 1;
                result.errors.push(format!(
                    "{}: waiting for the record's create",
                    describe(entry)
                ));
                return Ok(EntryOutcome::Deferred);
            }
            Pushed::Synced => {
                result.synced += 1;
                tracing::debug!(entry_id = %entry.id, "Pushed {}", describe(entry));
            }
            Pushed::Resolved(decision) => {
                result.synced += 1;
                result.conflicts_resolved += 1;
                tracing::info!(
                    entry_id = %entry.id,
                    ?decision,
                    "Resolved conflict for {}",
                    describe(entry)
                );
            }
            Pushed::Rejected(reason) => {
                result.failed += 1;
                tracing::warn!(entry_id = %entry.id, "Sync entry rejected: {}", reason);
                result
                    .errors
                    .push(format!("{}: rejected: {reason}", describe(entry)));
            }
            Pushed::Held(conflict) => {
                tracing::warn!(
                    entry_id = %entry.id,
                    conflict_id = %conflict.id,
                    "Conflict held for manual resolution"
                );
                lock(&self.shared.conflicts).push(conflict);
            }
        }
        store.remove_entry(entry.id).await?;
        Ok(EntryOutcome::Settled)
    }

    async fn push(&self, entry: &QueueEntry) -> Result<Pushed> {
        match entry.operation {
            SyncOperation::Create => self.push_create(entry).await,
            SyncOperation::Update => self.push_update(entry).await,
            SyncOperation::Delete => self.push_delete(entry).await,
        }
    }

    async fn push_create(&self, entry: &QueueEntry) -> Result<Pushed> {
        let store = &self.shared.store;
        let Some(record) = store.get_record(&entry.local_id).await? else {
            return Ok(Pushed::Rejected("record no longer exists locally".into()));
        };
        if record.server_id.is_some() {
            // Already acknowledged; pushing again would duplicate it remotely
            return Ok(Pushed::Synced);
        }

        // Retries after a timeout reuse the local id, so a create the server
        // already committed is acknowledged again rather than duplicated
        let ack = self
            .call(self.shared.remote.create(&entry.local_id, &entry.payload))
            .await?;

        if store.get_record(&entry.local_id).await?.is_none() {
            tracing::warn!(
                local_id = %entry.local_id,
                server_id = %ack.server_id,
                "Record deleted while its create was in flight; removing remote copy"
            );
            if let Err(error) = self
                .call(self.shared.remote.delete(entry.entity_type, ack.server_id))
                .await
            {
                tracing::warn!("Failed to remove orphaned remote copy: {}", error);
            }
            return Ok(Pushed::Synced);
        }

        store
            .mark_pushed(
                &entry.local_id,
                ack.server_id,
                entry.modified_at,
                ack.last_modified_at,
                None,
            )
            .await?;
        store
            .rebase_after(&entry.local_id, entry.id, ack.server_id, ack.last_modified_at)
            .await?;
        Ok(Pushed::Synced)
    }

    async fn push_update(&self, entry: &QueueEntry) -> Result<Pushed> {
        let Some(server_id) = self.server_id_for(entry).await? else {
            return if self.create_pending(entry).await? {
                Ok(Pushed::Waiting)
            } else {
                Ok(Pushed::Rejected(
                    "record was never created on the server".into(),
                ))
            };
        };

        let remote = self
            .call(self.shared.remote.get(entry.entity_type, server_id))
            .await?;
        if remote.last_modified_at > entry.base_modified_at.unwrap_or(0) {
            return self.resolve_update(entry, server_id, remote).await;
        }

        match self
            .call(self.shared.remote.update(server_id, &entry.payload))
            .await
        {
            Ok(ack) => {
                self.mark_update_pushed(entry, ack.server_id, ack.last_modified_at, None)
                    .await?;
                Ok(Pushed::Synced)
            }
            Err(error) if error.classify() == FailureClass::Conflict => {
                let remote = self
                    .call(self.shared.remote.get(entry.entity_type, server_id))
                    .await?;
                self.resolve_update(entry, server_id, remote).await
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Last-writer-wins between the queued snapshot and the server's version.
    async fn resolve_update(
        &self,
        entry: &QueueEntry,
        server_id: ServerId,
        remote: RemoteSnapshot,
    ) -> Result<Pushed> {
        let resolution = resolve(
            &VersionedPayload {
                payload: entry.payload.clone(),
                last_modified_at: entry.modified_at,
                server_id: Some(server_id),
            },
            &VersionedPayload {
                payload: remote.payload.clone(),
                last_modified_at: remote.last_modified_at,
                server_id: Some(remote.server_id),
            },
        )?;

        match resolution.decision {
            Decision::Server => {
                self.shared
                    .store
                    .apply_remote(
                        &entry.local_id,
                        remote.server_id,
                        &remote.payload,
                        remote.last_modified_at,
                    )
                    .await?;
            }
            Decision::Local | Decision::Merged => {
                let ack = self
                    .call(self.shared.remote.update(server_id, &resolution.winning))
                    .await?;
                self.mark_update_pushed(
                    entry,
                    ack.server_id,
                    ack.last_modified_at,
                    Some(&resolution.winning),
                )
                .await?;
            }
        }
        Ok(Pushed::Resolved(resolution.decision))
    }

    async fn mark_update_pushed(
        &self,
        entry: &QueueEntry,
        server_id: ServerId,
        remote_modified_at: i64,
        payload: Option<&EntityPayload>,
    ) -> Result<()> {
        let store = &self.shared.store;
        store
            .mark_pushed(
                &entry.local_id,
                server_id,
                entry.modified_at,
                remote_modified_at,
                payload,
            )
            .await?;
        store
            .rebase_after(&entry.local_id, entry.id, server_id, remote_modified_at)
            .await?;
        Ok(())
    }

    async fn push_delete(&self, entry: &QueueEntry) -> Result<Pushed> {
        let Some(server_id) = self.server_id_for(entry).await? else {
            if self.create_pending(entry).await? {
                return Ok(Pushed::Waiting);
            }
            // Nothing exists remotely, so the delete is already satisfied
            self.shared.store.purge_record(&entry.local_id).await?;
            return Ok(Pushed::Synced);
        };

        match self
            .call(self.shared.remote.delete(entry.entity_type, server_id))
            .await
        {
            Ok(()) => {}
            Err(RemoteError::Status { status: 404, .. }) => {
                tracing::debug!(
                    local_id = %entry.local_id,
                    server_id = %server_id,
                    "Record already gone remotely"
                );
            }
            Err(error) => return Err(error.into()),
        }
        self.shared.store.purge_record(&entry.local_id).await?;
        Ok(Pushed::Synced)
    }

    /// Whether another queued entry still has to create this record remotely.
    async fn create_pending(&self, entry: &QueueEntry) -> Result<bool> {
        Ok(self
            .shared
            .store
            .pending_for(&entry.local_id)
            .await?
            .iter()
            .any(|other| other.id != entry.id && other.operation == SyncOperation::Create))
    }

    async fn server_id_for(&self, entry: &QueueEntry) -> Result<Option<ServerId>> {
        if entry.server_id.is_some() {
            return Ok(entry.server_id);
        }
        Ok(self
            .shared
            .store
            .get_record(&entry.local_id)
            .await?
            .and_then(|record| record.server_id))
    }

    /// Capture a server-reported conflict for manual resolution.
    async fn hold_conflict(&self, entry: &QueueEntry) -> Result<ConflictRecord> {
        let server_id = self.server_id_for(entry).await?;
        let remote = match server_id {
            Some(server_id) => match self
                .call(self.shared.remote.get(entry.entity_type, server_id))
                .await
            {
                Ok(snapshot) => Some(snapshot),
                Err(error) => {
                    tracing::warn!(
                        local_id = %entry.local_id,
                        "Could not fetch remote version for conflict: {}",
                        error
                    );
                    None
                }
            },
            None => None,
        };

        Ok(ConflictRecord {
            id: ConflictId::new(),
            entity_type: entry.entity_type,
            local_id: entry.local_id,
            server_id,
            operation: entry.operation,
            local: entry.payload.clone(),
            local_modified_at: entry.modified_at,
            remote_modified_at: remote.as_ref().map(|snapshot| snapshot.last_modified_at),
            remote: remote.map(|snapshot| snapshot.payload),
            state: ConflictState::Pending,
            detected_at: now_millis(),
        })
    }

    /// Bound a remote call by the configured request timeout.
    async fn call<T>(&self, request: impl Future<Output = RemoteResult<T>> + Send) -> RemoteResult<T> {
        tokio::time::timeout(self.shared.config.request_timeout(), request)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Run `sync_all` every `interval` and whenever connectivity returns.
    ///
    /// Replaces any running schedule. Must be called from within a tokio runtime.
    pub fn start_auto_sync(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::InvalidInput(
                "auto-sync interval must be positive".into(),
            ));
        }
        self.stop_auto_sync();

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_auto_sync(
            Arc::downgrade(&self.shared),
            interval,
            self.shared.connectivity.subscribe(),
            shutdown_rx,
        ));
        *lock(&self.shared.auto_sync) = Some(AutoSync {
            shutdown,
            _task: task,
        });

        tracing::info!(interval_secs = interval.as_secs(), "Auto-sync started");
        Ok(())
    }

    /// Cancel future automatic cycles. An in-flight cycle runs to completion.
    ///
    /// Returns whether a schedule was running.
    pub fn stop_auto_sync(&self) -> bool {
        let Some(auto_sync) = lock(&self.shared.auto_sync).take() else {
            return false;
        };
        auto_sync.shutdown.send(()).ok();
        tracing::info!("Auto-sync stopped");
        true
    }

    pub fn is_auto_syncing(&self) -> bool {
        lock(&self.shared.auto_sync).is_some()
    }
}

async fn run_auto_sync(
    shared: Weak<Shared>,
    interval: Duration,
    mut online: watch::Receiver<bool>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut watching = true;

    loop {
        let trigger = tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => "interval",
            changed = online.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                if !*online.borrow_and_update() {
                    continue;
                }
                "connectivity"
            }
        };

        let Some(shared) = shared.upgrade() else {
            break;
        };
        let result = SyncEngine { shared }.sync_all().await;
        tracing::debug!(trigger, status = ?result.status, "Automatic sync finished");
    }

    tracing::debug!("Auto-sync task exited");
}
