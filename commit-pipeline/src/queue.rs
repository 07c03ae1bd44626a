//! Bounded commit queue
//!
//! Pending ledger operations in arrival order, with retried items returned to
//! the head. Many producers, one consumer; a single mutex guards the deque
//! and the counters. Producers never wait on the worker: at capacity the
//! oldest pending item is evicted and counted.
//!
//! # States
//!
//! ```text
//! Pending ──pop──▶ InFlight ──▶ Committed      (complete)
//!                     │    ──▶ Rejected        (reject / audit failure)
//!                     │    ──▶ DeadLettered    (attempts exhausted)
//!                     └──────▶ Pending         (requeue_front, attempts + 1)
//! ```
//!
//! Operations on one record key are delivered in queue order. A key with
//! pending or in-flight work is "outstanding"; ingress for it joins the
//! tail instead of racing ahead, and a dead-lettered initialize takes the
//! key's pending updates with it.

use chrono::{DateTime, Utc};
use civic_core::{DerivedAddress, LedgerPayload, LogicalRecordKey, OperationKind, Pubkey};
use ledger_adapter::Receipt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Pending ledger operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Operation id
    pub id: Uuid,
    /// Initialize or update
    pub kind: OperationKind,
    /// Logical record key
    pub key: LogicalRecordKey,
    /// Address derived at admission (audited before every submission)
    pub address: DerivedAddress,
    /// Record data
    pub payload: LedgerPayload,
    /// When the operation entered the queue
    pub enqueued_at: DateTime<Utc>,
    /// Worker attempts so far
    pub attempts: u32,
    /// Attempt budget
    pub max_attempts: u32,
    /// Last transient error
    pub last_error: Option<String>,
}

impl QueuedOperation {
    /// Create new operation with no attempts yet
    pub fn new(
        kind: OperationKind,
        key: LogicalRecordKey,
        address: DerivedAddress,
        payload: LedgerPayload,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            key,
            address,
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
            max_attempts,
            last_error: None,
        }
    }

    /// Reporting category
    pub fn category(&self) -> &'static str {
        self.key.namespace().category()
    }

    /// Whether the attempt budget is spent
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Operation that left the queue without committing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedOperation {
    /// The operation as it was last attempted
    pub operation: QueuedOperation,
    /// Why it failed
    pub reason: String,
    /// When
    pub failed_at: DateTime<Utc>,
}

/// Operation the ledger accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Reporting category
    pub category: String,
    /// Initialize or update
    pub kind: OperationKind,
    /// Record address
    pub address: Pubkey,
    /// Ledger receipt
    pub receipt: Receipt,
    /// When
    pub committed_at: DateTime<Utc>,
}

/// Historical queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    /// Operations accepted into the queue
    pub enqueued: u64,
    /// Pending operations evicted at capacity
    pub evicted: u64,
    /// Transient failures sent back to the head
    pub retries: u64,
    /// Update commits by category
    pub commits_by_category: BTreeMap<String, u64>,
    /// Initializations that created the account
    pub initialized: u64,
    /// Initializations that found the account in place
    pub already_existed: u64,
    /// Permanent rejections
    pub rejected: u64,
    /// Operations out of attempts
    pub dead_lettered: u64,
    /// Operations whose stored address failed its audit
    pub audit_failures: u64,
}

impl QueueCounters {
    /// Commits over all categories
    pub fn total_commits(&self) -> u64 {
        self.commits_by_category.values().sum()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueuedOperation>,
    in_flight: Vec<LogicalRecordKey>,
    counters: QueueCounters,
    dead_letters: VecDeque<FailedOperation>,
    rejections: VecDeque<FailedOperation>,
    recent_commits: VecDeque<CommitRecord>,
}

impl QueueState {
    fn release(&mut self, key: &LogicalRecordKey) {
        if let Some(i) = self.in_flight.iter().position(|k| k == key) {
            self.in_flight.swap_remove(i);
        }
    }
}

fn push_bounded<T>(items: &mut VecDeque<T>, item: T, limit: usize) {
    if limit == 0 {
        return;
    }
    while items.len() >= limit {
        items.pop_front();
    }
    items.push_back(item);
}

/// Bounded, ordered, in-process queue of ledger operations
#[derive(Debug)]
pub struct CommitQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    paused: AtomicBool,
    capacity: usize,
    history_limit: usize,
}

impl CommitQueue {
    /// Create new queue
    pub fn new(capacity: usize, history_limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            paused: AtomicBool::new(false),
            capacity: capacity.max(1),
            history_limit,
        }
    }

    /// Maximum pending operations
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append to the tail; at capacity the oldest pending operation is evicted and returned
    pub fn enqueue(&self, operation: QueuedOperation) -> Option<QueuedOperation> {
        let evicted = {
            let mut state = self.state.lock();
            let evicted = if state.pending.len() >= self.capacity {
                state.counters.evicted += 1;
                state.pending.pop_front()
            } else {
                None
            };

            debug!(
                id = %operation.id,
                kind = %operation.kind,
                key = %operation.key,
                depth = state.pending.len() + 1,
                "Operation enqueued"
            );
            state.pending.push_back(operation);
            state.counters.enqueued += 1;
            evicted
        };

        if let Some(op) = &evicted {
            warn!(id = %op.id, key = %op.key, kind = %op.kind, "Queue at capacity, evicted oldest operation");
        }
        self.notify.notify_one();
        evicted
    }

    /// Take the head for delivery; `None` when empty or paused
    pub fn pop(&self) -> Option<QueuedOperation> {
        if self.paused.load(Ordering::SeqCst) {
            return None;
        }
        let mut state = self.state.lock();
        let operation = state.pending.pop_front()?;
        state.in_flight.push(operation.key.clone());
        Some(operation)
    }

    /// Return an in-flight operation to the head after a transient failure
    ///
    /// When the queue filled up meanwhile, the returned operation is the
    /// oldest candidate and is evicted instead; it is handed back.
    pub fn requeue_front(&self, operation: QueuedOperation) -> Option<QueuedOperation> {
        let mut state = self.state.lock();
        state.release(&operation.key);
        state.counters.retries += 1;

        if state.pending.len() >= self.capacity {
            state.counters.evicted += 1;
            warn!(id = %operation.id, key = %operation.key, "Queue at capacity, evicted retried operation");
            return Some(operation);
        }

        info!(
            id = %operation.id,
            key = %operation.key,
            kind = %operation.kind,
            attempts = operation.attempts,
            max_attempts = operation.max_attempts,
            "Operation returned to queue head"
        );
        state.pending.push_front(operation);
        None
    }

    /// In-flight operation committed
    pub fn complete(&self, operation: &QueuedOperation, receipt: &Receipt) {
        {
            self.state.lock().release(&operation.key);
        }
        self.record_commit(&operation.key, operation.kind, receipt);
    }

    /// In-flight operation permanently rejected
    pub fn reject(&self, operation: QueuedOperation, reason: impl Into<String>) {
        {
            self.state.lock().release(&operation.key);
        }
        self.record_rejection(operation, reason);
    }

    /// In-flight operation out of attempts
    pub fn dead_letter(&self, operation: QueuedOperation, reason: impl Into<String>) {
        let reason = reason.into();
        error!(
            id = %operation.id,
            key = %operation.key,
            kind = %operation.kind,
            attempts = operation.attempts,
            %reason,
            "Operation dead-lettered"
        );

        let mut state = self.state.lock();
        state.release(&operation.key);
        state.counters.dead_lettered += 1;
        let limit = self.history_limit;
        push_bounded(
            &mut state.dead_letters,
            FailedOperation {
                operation,
                reason,
                failed_at: Utc::now(),
            },
            limit,
        );
    }

    /// Dead-letter the pending updates of a key whose initialize was dead-lettered
    ///
    /// Returns how many were removed.
    pub fn dead_letter_dependents(&self, key: &LogicalRecordKey, reason: &str) -> usize {
        let mut state = self.state.lock();
        let (dependents, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|op| op.key == *key && op.kind == OperationKind::Update);
        state.pending = kept;

        let count = dependents.len();
        let limit = self.history_limit;
        for operation in dependents {
            error!(
                id = %operation.id,
                key = %operation.key,
                %reason,
                "Dependent update dead-lettered"
            );
            state.counters.dead_lettered += 1;
            push_bounded(
                &mut state.dead_letters,
                FailedOperation {
                    operation,
                    reason: format!("account initialize dead-lettered: {}", reason),
                    failed_at: Utc::now(),
                },
                limit,
            );
        }
        count
    }

    /// In-flight operation whose stored address failed its audit
    pub fn audit_failed(&self, operation: QueuedOperation, reason: impl Into<String>) {
        let reason = reason.into();
        error!(id = %operation.id, key = %operation.key, %reason, "Operation failed address audit");

        let mut state = self.state.lock();
        state.release(&operation.key);
        state.counters.audit_failures += 1;
        let limit = self.history_limit;
        push_bounded(
            &mut state.rejections,
            FailedOperation {
                operation,
                reason,
                failed_at: Utc::now(),
            },
            limit,
        );
    }

    /// Count a commit (queued or immediate)
    pub fn record_commit(&self, key: &LogicalRecordKey, kind: OperationKind, receipt: &Receipt) {
        let category = key.namespace().category();
        let mut state = self.state.lock();

        match (kind, receipt.already_existed) {
            (OperationKind::Update, _) => {
                *state
                    .counters
                    .commits_by_category
                    .entry(category.to_string())
                    .or_insert(0) += 1;
                info!(key = %key, address = %receipt.address, signature = ?receipt.signature, "Record committed");
            }
            (OperationKind::Initialize, false) => {
                state.counters.initialized += 1;
                info!(key = %key, address = %receipt.address, "Record account initialized");
            }
            (OperationKind::Initialize, true) => {
                state.counters.already_existed += 1;
                debug!(key = %key, address = %receipt.address, "Record account already existed");
            }
        }

        let limit = self.history_limit;
        push_bounded(
            &mut state.recent_commits,
            CommitRecord {
                category: category.to_string(),
                kind,
                address: receipt.address,
                receipt: receipt.clone(),
                committed_at: Utc::now(),
            },
            limit,
        );
    }

    /// Count a permanent rejection (queued or immediate)
    pub fn record_rejection(&self, operation: QueuedOperation, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(
            id = %operation.id,
            key = %operation.key,
            kind = %operation.kind,
            %reason,
            "Operation rejected by ledger"
        );

        let mut state = self.state.lock();
        state.counters.rejected += 1;
        let limit = self.history_limit;
        push_bounded(
            &mut state.rejections,
            FailedOperation {
                operation,
                reason,
                failed_at: Utc::now(),
            },
            limit,
        );
    }

    /// Stop handing out operations (enqueue keeps working)
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume handing out operations
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Whether the queue is paused
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Wait until something is enqueued or the queue resumes
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    /// Pending operations
    pub fn depth(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Operations currently being delivered by the worker
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Whether the key has pending or in-flight operations
    pub fn is_outstanding(&self, key: &LogicalRecordKey) -> bool {
        let state = self.state.lock();
        state.in_flight.contains(key) || state.pending.iter().any(|op| op.key == *key)
    }

    /// Counter snapshot
    pub fn counters(&self) -> QueueCounters {
        self.state.lock().counters.clone()
    }

    /// Pending operations, head first
    pub fn pending(&self) -> Vec<QueuedOperation> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// Most recent dead letters, oldest first
    pub fn dead_letters(&self) -> Vec<FailedOperation> {
        self.state.lock().dead_letters.iter().cloned().collect()
    }

    /// Most recent rejections and audit failures, oldest first
    pub fn rejections(&self) -> Vec<FailedOperation> {
        self.state.lock().rejections.iter().cloned().collect()
    }

    /// Up to `limit` most recent commits, newest first
    pub fn recent_commits(&self, limit: usize) -> Vec<CommitRecord> {
        self.state
            .lock()
            .recent_commits
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}
