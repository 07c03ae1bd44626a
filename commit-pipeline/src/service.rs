//! Commit service
//!
//! Explicitly constructed owner of the queue, the ledger client handle and
//! the pure components. Ingress validates, classifies and derives
//! synchronously, then makes one immediate delivery attempt; transient
//! failures are handed to the queue for the worker.

use crate::config::Config;
use crate::delivery::{Delivery, DeliveryOutcome};
use crate::metrics::PipelineMetrics;
use crate::queue::{CommitQueue, QueuedOperation};
use crate::report::{TransparencyReport, TransparencyReporter};
use crate::worker::{spawn_commit_worker, CommitWorker, WorkerHandle};
use crate::Result;
use civic_core::{
    estimated_update_cost, AddressDeriver, DerivedAddress, EligibilityClassifier,
    GovernanceAction, LedgerPayload, LogicalRecordKey, OperationKind, Pubkey, ReadingType,
    RecordValidator, SensorPayload, ValidationErrors,
};
use ledger_adapter::{HealthMonitor, HealthSnapshot, LedgerClient, Receipt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Synchronous outcome of an ingress call
#[derive(Debug, Clone, PartialEq)]
pub enum IngressOutcome {
    /// Validated and committed by the immediate attempt
    Committed(Receipt),
    /// Validated, immediate attempt failed transiently, handed to the worker
    Queued,
    /// Validated, retained locally
    LocalOnly {
        /// Why it stays off the ledger
        reason: String,
    },
    /// Validated, refused by the ledger
    LedgerRejected(String),
    /// Refused by validation
    RejectedValidation(ValidationErrors),
}

/// Ingestion counters and cost accounting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressCounters {
    /// Readings and actions received
    pub total: u64,
    /// Sent towards the ledger
    pub ledger_worthy: u64,
    /// Retained locally (below thresholds or unmapped)
    pub local_only: u64,
    /// Ledger-worthy readings with no on-ledger record layout
    pub unmapped: u64,
    /// Refused by validation
    pub validation_rejections: u64,
    /// Estimated compute units saved by local retention
    pub compute_units_avoided: u64,
}

/// Record data written on the ledger for a reading, when its type has a layout
fn ledger_payload(payload: &SensorPayload) -> Option<LedgerPayload> {
    match payload {
        SensorPayload::AirQuality(reading) => Some(LedgerPayload::AirQuality(*reading)),
        _ => None,
    }
}

/// Ledger commit pipeline
#[derive(Debug)]
pub struct CommitService {
    queue: Arc<CommitQueue>,
    delivery: Delivery,
    validator: RecordValidator,
    classifier: EligibilityClassifier,
    deriver: AddressDeriver,
    reporter: TransparencyReporter,
    metrics: PipelineMetrics,
    counters: Mutex<IngressCounters>,
    authority: Pubkey,
    max_attempts: u32,
    idle_interval: Duration,
    retry_pause: Duration,
}

impl CommitService {
    /// Build a service around a ledger client
    pub fn new(config: &Config, client: Arc<dyn LedgerClient>, authority: Pubkey) -> Result<Self> {
        config.validate()?;

        let metrics = PipelineMetrics::new()?;
        let health = Arc::new(HealthMonitor::new(config.health.degraded_threshold));
        let delivery = Delivery::new(client, health, metrics.clone(), config.call_timeout());

        info!(
            service = %config.service_name,
            client = delivery.client().name(),
            authority = %authority,
            capacity = config.queue.capacity,
            max_attempts = config.queue.max_attempts,
            "Commit service created"
        );

        Ok(Self {
            queue: Arc::new(CommitQueue::new(config.queue.capacity, config.queue.history_limit)),
            delivery,
            validator: RecordValidator::new(),
            classifier: EligibilityClassifier::new(),
            deriver: AddressDeriver::new(config.program_id()?),
            reporter: TransparencyReporter::new(config.explorer.clone()),
            metrics,
            counters: Mutex::new(IngressCounters::default()),
            authority,
            max_attempts: config.queue.max_attempts,
            idle_interval: config.queue.idle_interval(),
            retry_pause: config.queue.retry_pause(),
        })
    }

    /// Commit queue
    pub fn queue(&self) -> &Arc<CommitQueue> {
        &self.queue
    }

    /// Metrics
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Authority identity signing ledger writes
    pub fn authority(&self) -> Pubkey {
        self.authority
    }

    /// Address deriver
    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    /// Ingestion counters
    pub fn ingress_counters(&self) -> IngressCounters {
        self.counters.lock().clone()
    }

    /// Ingest a sensor reading
    ///
    /// Derivation errors are fatal to the reading and returned as `Err`;
    /// every other result is an [`IngressOutcome`].
    pub async fn submit_reading(
        &self,
        reading_type: ReadingType,
        raw: &serde_json::Value,
        location: &str,
        sensor_id: &str,
    ) -> Result<IngressOutcome> {
        self.counters.lock().total += 1;
        self.metrics.ingested.with_label_values(&["reading"]).inc();

        let payload = match self
            .validator
            .validate_reading(reading_type, raw, location, sensor_id)
        {
            Ok(payload) => payload,
            Err(errors) => {
                info!(%reading_type, location, sensor_id, violations = %errors, "Reading failed validation");
                self.counters.lock().validation_rejections += 1;
                self.metrics.validation_rejections.inc();
                return Ok(IngressOutcome::RejectedValidation(errors));
            }
        };

        let eligibility = self.classifier.classify_payload(&payload);
        if !eligibility.ledger_worthy {
            debug!(%reading_type, location, sensor_id, reason = %eligibility.reason, "Reading kept local");
            {
                let mut counters = self.counters.lock();
                counters.local_only += 1;
                counters.compute_units_avoided += estimated_update_cost(payload.encoded_len());
            }
            self.metrics.local_only.inc();
            return Ok(IngressOutcome::LocalOnly {
                reason: eligibility.reason,
            });
        }

        let Some(record) = ledger_payload(&payload) else {
            let reason = format!("{}; no ledger record layout for {}", eligibility.reason, reading_type);
            info!(%reading_type, location, sensor_id, %reason, "Ledger-worthy reading kept local");
            {
                let mut counters = self.counters.lock();
                counters.local_only += 1;
                counters.unmapped += 1;
            }
            self.metrics.local_only.inc();
            return Ok(IngressOutcome::LocalOnly { reason });
        };

        self.counters.lock().ledger_worthy += 1;
        self.metrics.ledger_worthy.inc();

        let key = LogicalRecordKey::air_quality(location, sensor_id, self.authority);
        let address = self.deriver.derive_key(&key)?;
        info!(key = %key, address = %address, reason = %eligibility.reason, "Reading is ledger-worthy");

        Ok(self.deliver_record(key, address, record).await)
    }

    /// Ingest a governance action (always ledger-worthy)
    pub async fn submit_action(
        &self,
        action_name: &str,
        actor_id: &str,
        details: &str,
    ) -> Result<IngressOutcome> {
        self.counters.lock().total += 1;
        self.metrics.ingested.with_label_values(&["action"]).inc();

        let action = GovernanceAction {
            action_name: action_name.to_string(),
            actor_id: actor_id.to_string(),
            details: details.to_string(),
        };
        let contract = action.to_contract_payload();

        if let Err(errors) = self.validator.validate_contract(&contract) {
            info!(action = action_name, actor = actor_id, violations = %errors, "Action failed validation");
            self.counters.lock().validation_rejections += 1;
            self.metrics.validation_rejections.inc();
            return Ok(IngressOutcome::RejectedValidation(errors));
        }

        let eligibility = self.classifier.governance(action_name);
        self.counters.lock().ledger_worthy += 1;
        self.metrics.ledger_worthy.inc();

        let key = LogicalRecordKey::contract(&contract.name, self.authority);
        let address = self.deriver.derive_key(&key)?;
        info!(key = %key, address = %address, actor = actor_id, reason = %eligibility.reason, "Recording governance action");

        Ok(self
            .deliver_record(key, address, LedgerPayload::Contract(contract))
            .await)
    }

    /// Immediate delivery: initialize, then update
    ///
    /// A key with queued work keeps its order: the update joins the tail
    /// behind the earlier operations, which include the key's initialize.
    async fn deliver_record(
        &self,
        key: LogicalRecordKey,
        address: DerivedAddress,
        payload: LedgerPayload,
    ) -> IngressOutcome {
        let category = key.namespace().category();

        if self.queue.is_outstanding(&key) {
            debug!(key = %key, "Earlier operations pending for key, queueing behind them");
            self.enqueue(OperationKind::Update, key, address, payload, None);
            return IngressOutcome::Queued;
        }

        match self
            .delivery
            .deliver(OperationKind::Initialize, &key, &address, &payload)
            .await
        {
            DeliveryOutcome::Committed(receipt) => {
                self.metrics
                    .record_commit(OperationKind::Initialize, category, &receipt);
                self.queue
                    .record_commit(&key, OperationKind::Initialize, &receipt);
            }
            DeliveryOutcome::Rejected(reason) => {
                return self.rejected(OperationKind::Initialize, key, address, payload, reason);
            }
            DeliveryOutcome::Transient(reason) => {
                self.enqueue(OperationKind::Initialize, key.clone(), address, payload.clone(), Some(reason.as_str()));
                self.enqueue(OperationKind::Update, key, address, payload, Some(reason.as_str()));
                return IngressOutcome::Queued;
            }
        }

        match self
            .delivery
            .deliver(OperationKind::Update, &key, &address, &payload)
            .await
        {
            DeliveryOutcome::Committed(receipt) => {
                self.metrics
                    .record_commit(OperationKind::Update, category, &receipt);
                self.queue.record_commit(&key, OperationKind::Update, &receipt);
                IngressOutcome::Committed(receipt)
            }
            DeliveryOutcome::Rejected(reason) => {
                self.rejected(OperationKind::Update, key, address, payload, reason)
            }
            DeliveryOutcome::Transient(reason) => {
                self.enqueue(OperationKind::Update, key, address, payload, Some(reason.as_str()));
                IngressOutcome::Queued
            }
        }
    }

    fn rejected(
        &self,
        kind: OperationKind,
        key: LogicalRecordKey,
        address: DerivedAddress,
        payload: LedgerPayload,
        reason: String,
    ) -> IngressOutcome {
        self.metrics.rejections.inc();
        let operation = QueuedOperation::new(kind, key, address, payload, self.max_attempts);
        self.queue.record_rejection(operation, reason.clone());
        IngressOutcome::LedgerRejected(reason)
    }

    fn enqueue(
        &self,
        kind: OperationKind,
        key: LogicalRecordKey,
        address: DerivedAddress,
        payload: LedgerPayload,
        last_error: Option<&str>,
    ) {
        let mut operation = QueuedOperation::new(kind, key, address, payload, self.max_attempts);
        operation.last_error = last_error.map(str::to_string);

        if self.queue.enqueue(operation).is_some() {
            self.metrics.evictions.inc();
        }
        self.metrics.queue_depth.set(self.queue.depth() as i64);
    }

    /// Probe the ledger and return the resulting health
    pub async fn check_ledger_health(&self) -> HealthSnapshot {
        let snapshot = self.delivery.check_health().await;
        if snapshot.consecutive_failures > 0 {
            warn!(status = ?snapshot.status, error = ?snapshot.last_error, "Ledger health check failed");
        } else {
            info!(status = ?snapshot.status, "Ledger health check passed");
        }
        snapshot
    }

    /// Current transparency report
    pub fn report(&self) -> TransparencyReport {
        self.reporter
            .report(&self.queue, self.delivery.health(), self.ingress_counters())
    }

    /// Worker draining this service's queue
    pub fn worker(&self) -> CommitWorker {
        CommitWorker::new(
            self.queue.clone(),
            self.delivery.clone(),
            self.deriver,
            self.metrics.clone(),
            self.idle_interval,
            self.retry_pause,
        )
    }

    /// Spawn the worker on the current runtime
    pub fn spawn_worker(&self, cancel: CancellationToken) -> WorkerHandle {
        spawn_commit_worker(self.worker(), cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_adapter::{ScriptedFailure, SimulatedLedgerClient};
    use serde_json::json;

    fn service() -> (CommitService, Arc<SimulatedLedgerClient>) {
        let client = Arc::new(SimulatedLedgerClient::default());
        let service = CommitService::new(&Config::default(), client.clone(), Pubkey::new([1u8; 32])).unwrap();
        (service, client)
    }

    #[tokio::test]
    async fn test_traffic_reading_unmapped() {
        let (service, client) = service();
        let raw = json!({"congestion_level": 97.0, "vehicle_count": 400, "average_speed": 8.0});

        let outcome = service
            .submit_reading(ReadingType::Traffic, &raw, "Main_St", "TRF_01")
            .await
            .unwrap();

        assert!(matches!(outcome, IngressOutcome::LocalOnly { ref reason } if reason.contains("no ledger record layout")));
        assert_eq!(service.ingress_counters().unmapped, 1);
        assert_eq!(client.call_counts().account_exists, 0);
    }

    #[tokio::test]
    async fn test_local_only_cost_accounted() {
        let (service, _) = service();
        let raw = json!({"aqi": 60, "pm25": 12.0, "pm10": 20.0, "co2": 410.0, "humidity": 40.0, "temperature": 18.0});

        service
            .submit_reading(ReadingType::AirQuality, &raw, "Park", "ENV_009")
            .await
            .unwrap();

        assert_eq!(service.ingress_counters().compute_units_avoided, 3000 + 5 * 22);
    }

    #[tokio::test]
    async fn test_update_failure_queues_only_update() {
        let (service, client) = service();
        let raw = json!({"aqi": 220, "pm25": 90.0, "pm10": 120.0, "co2": 700.0, "humidity": 55.0, "temperature": 30.0});
        // account_exists and send_initialize succeed, update fails
        client.fail_next(ScriptedFailure::Stall(Duration::from_millis(1)));
        client.fail_next(ScriptedFailure::Stall(Duration::from_millis(1)));
        client.fail_next(ScriptedFailure::Network);

        let outcome = service
            .submit_reading(ReadingType::AirQuality, &raw, "Port", "ENV_010")
            .await
            .unwrap();

        assert_eq!(outcome, IngressOutcome::Queued);
        let pending = service.queue().pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, OperationKind::Update);
        assert_eq!(pending[0].attempts, 0);
        assert_eq!(service.queue().counters().initialized, 1);
    }

    #[tokio::test]
    async fn test_reading_waits_behind_queued_key() {
        let (service, client) = service();
        let raw = json!({"aqi": 220, "pm25": 90.0, "pm10": 120.0, "co2": 700.0, "humidity": 55.0, "temperature": 30.0});
        client.fail_next(ScriptedFailure::Network);

        for _ in 0..2 {
            let outcome = service
                .submit_reading(ReadingType::AirQuality, &raw, "Port", "ENV_010")
                .await
                .unwrap();
            assert_eq!(outcome, IngressOutcome::Queued);
        }

        let kinds: Vec<OperationKind> = service.queue().pending().iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::Initialize, OperationKind::Update, OperationKind::Update]);
        assert!(service.queue().pending()[2].last_error.is_none());
        // Only the first reading reached the ledger client
        assert_eq!(client.call_counts().account_exists, 1);

        // Other keys are unaffected
        let outcome = service
            .submit_reading(ReadingType::AirQuality, &raw, "Port", "ENV_011")
            .await
            .unwrap();
        assert!(matches!(outcome, IngressOutcome::Committed(_)));
    }

    #[tokio::test]
    async fn test_ledger_rejection_surfaced() {
        let (service, client) = service();
        client.fail_next(ScriptedFailure::Reject("custom program error: 0x1".to_string()));

        let outcome = service.submit_action("close_budget", "admin", "fy2025").await.unwrap();

        assert!(matches!(outcome, IngressOutcome::LedgerRejected(ref r) if r.contains("0x1")));
        assert_eq!(service.queue().counters().rejected, 1);
        assert_eq!(service.queue().depth(), 0);
    }

    #[tokio::test]
    async fn test_health_check_seeds_status() {
        let (service, client) = service();
        client.set_healthy(false);
        let snapshot = service.check_ledger_health().await;
        assert_eq!(snapshot.consecutive_failures, 1);

        client.set_healthy(true);
        let snapshot = service.check_ledger_health().await;
        assert_eq!(snapshot.status, ledger_adapter::ServiceHealth::Operational);
    }
}
