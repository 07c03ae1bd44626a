//! Background commit worker
//!
//! The single consumer of the commit queue. Each iteration pops the head,
//! audits its stored address, delivers it and files the outcome. The stop
//! signal is checked between iterations; a delivery in progress completes
//! or hits its call bound.

use crate::delivery::{Delivery, DeliveryOutcome};
use crate::metrics::PipelineMetrics;
use crate::queue::CommitQueue;
use crate::{Error, Result};
use civic_core::{AddressDeriver, OperationKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What one worker iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStep {
    /// Queue empty or paused
    Idle,
    /// Operation committed
    Committed,
    /// Operation permanently rejected
    Rejected,
    /// Transient failure, operation back at the head
    Retried,
    /// Transient failure with the attempt budget spent
    DeadLettered,
    /// Stored address failed its audit
    AuditFailed,
}

/// Commit queue consumer
#[derive(Debug, Clone)]
pub struct CommitWorker {
    queue: Arc<CommitQueue>,
    delivery: Delivery,
    deriver: AddressDeriver,
    metrics: PipelineMetrics,
    idle_interval: Duration,
    retry_pause: Duration,
}

impl CommitWorker {
    /// Create new worker
    pub fn new(
        queue: Arc<CommitQueue>,
        delivery: Delivery,
        deriver: AddressDeriver,
        metrics: PipelineMetrics,
        idle_interval: Duration,
        retry_pause: Duration,
    ) -> Self {
        Self {
            queue,
            delivery,
            deriver,
            metrics,
            idle_interval,
            retry_pause,
        }
    }

    /// Process at most one operation
    pub async fn run_once(&self) -> WorkerStep {
        let Some(mut operation) = self.queue.pop() else {
            return WorkerStep::Idle;
        };
        self.metrics.queue_depth.set(self.queue.depth() as i64);

        if let Err(e) = self.deriver.audit(&operation.key, &operation.address) {
            self.metrics.audit_failures.inc();
            self.queue.audit_failed(operation, e.to_string());
            return WorkerStep::AuditFailed;
        }

        operation.attempts += 1;
        let outcome = self
            .delivery
            .deliver(operation.kind, &operation.key, &operation.address, &operation.payload)
            .await;

        match outcome {
            DeliveryOutcome::Committed(receipt) => {
                self.metrics
                    .record_commit(operation.kind, operation.category(), &receipt);
                self.queue.complete(&operation, &receipt);
                WorkerStep::Committed
            }
            DeliveryOutcome::Rejected(reason) => {
                self.metrics.rejections.inc();
                self.queue.reject(operation, reason);
                WorkerStep::Rejected
            }
            DeliveryOutcome::Transient(reason) => {
                operation.last_error = Some(reason.clone());
                if operation.is_exhausted() {
                    self.metrics.dead_letters.inc();
                    let key = operation.key.clone();
                    let kind = operation.kind;
                    self.queue.dead_letter(operation, reason.clone());
                    // Updates behind a dead initialize have no account to land in
                    if kind == OperationKind::Initialize {
                        let dependents = self.queue.dead_letter_dependents(&key, &reason);
                        self.metrics.dead_letters.inc_by(dependents as u64);
                        self.metrics.queue_depth.set(self.queue.depth() as i64);
                    }
                    WorkerStep::DeadLettered
                } else {
                    self.metrics.retries.inc();
                    if self.queue.requeue_front(operation).is_some() {
                        self.metrics.evictions.inc();
                    }
                    self.metrics.queue_depth.set(self.queue.depth() as i64);
                    WorkerStep::Retried
                }
            }
        }
    }

    /// Drain the queue until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            client = self.delivery.client().name(),
            idle_ms = self.idle_interval.as_millis() as u64,
            retry_pause_ms = self.retry_pause.as_millis() as u64,
            "Commit worker started"
        );

        while !cancel.is_cancelled() {
            let (pause, wake_on_enqueue) = match self.run_once().await {
                WorkerStep::Idle => (self.idle_interval, true),
                WorkerStep::Retried => (self.retry_pause, false),
                _ => continue,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.queue.notified(), if wake_on_enqueue => {}
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(
            pending = self.queue.depth(),
            "Commit worker stopped"
        );
    }
}

/// Running worker task
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.handle.await.map_err(|e| {
            warn!(error = %e, "Commit worker task failed");
            Error::Worker(e.to_string())
        })
    }
}

/// Spawn the worker on the current runtime
pub fn spawn_commit_worker(worker: CommitWorker, cancel: CancellationToken) -> WorkerHandle {
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        worker.run(token).await;
    });
    WorkerHandle { cancel, handle }
}
