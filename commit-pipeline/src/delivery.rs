//! Bounded delivery of one operation to the ledger
//!
//! Shared by the immediate ingress attempt and the worker. Every call runs
//! under a fixed upper bound; exceeding it is a transient failure. The
//! outcome is folded into the health monitor and the latency histogram.

use crate::metrics::PipelineMetrics;
use civic_core::{DerivedAddress, LedgerPayload, LogicalRecordKey, OperationKind};
use ledger_adapter::{HealthMonitor, HealthSnapshot, LedgerClient, Receipt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Ledger accepted the operation
    Committed(Receipt),
    /// Ledger refused the operation (terminal)
    Rejected(String),
    /// Network-class failure (retryable)
    Transient(String),
}

/// Ledger client wrapped with a call bound, health tracking and metrics
#[derive(Clone)]
pub struct Delivery {
    client: Arc<dyn LedgerClient>,
    health: Arc<HealthMonitor>,
    metrics: PipelineMetrics,
    timeout: Duration,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("client", &self.client.name())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Delivery {
    /// Create new delivery
    pub fn new(
        client: Arc<dyn LedgerClient>,
        health: Arc<HealthMonitor>,
        metrics: PipelineMetrics,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            health,
            metrics,
            timeout,
        }
    }

    /// Underlying client
    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    /// Current health view
    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Attempt one operation
    pub async fn deliver(
        &self,
        kind: OperationKind,
        key: &LogicalRecordKey,
        address: &DerivedAddress,
        payload: &LedgerPayload,
    ) -> DeliveryOutcome {
        let started = Instant::now();
        let call = async {
            match kind {
                OperationKind::Initialize => self.client.submit_initialize(key, address, payload).await,
                OperationKind::Update => self.client.submit_update(key, address, payload).await,
            }
        };
        let result = tokio::time::timeout(self.timeout, call).await;
        self.metrics
            .delivery_duration
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(receipt)) => {
                self.health.record_success();
                debug!(client = self.client.name(), %kind, key = %key, "Delivery committed");
                DeliveryOutcome::Committed(receipt)
            }
            Ok(Err(e)) if e.is_transient() => {
                let message = e.to_string();
                self.health.record_transient_failure(&message);
                warn!(client = self.client.name(), %kind, key = %key, error = %message, "Transient ledger failure");
                DeliveryOutcome::Transient(message)
            }
            Ok(Err(e)) => {
                self.health.record_rejection();
                DeliveryOutcome::Rejected(e.to_string())
            }
            Err(_) => {
                let message = format!(
                    "{} {} exceeded {}s",
                    kind,
                    key,
                    self.timeout.as_secs_f64()
                );
                self.health.record_transient_failure(&message);
                warn!(client = self.client.name(), %kind, key = %key, "Ledger call timed out");
                DeliveryOutcome::Transient(message)
            }
        }
    }

    /// Probe the ledger and fold the answer into the health monitor
    pub async fn check_health(&self) -> HealthSnapshot {
        match tokio::time::timeout(self.timeout, self.client.health_check()).await {
            Ok(Ok(())) => self.health.record_success(),
            Ok(Err(e)) => self.health.record_transient_failure(&e.to_string()),
            Err(_) => self.health.record_transient_failure("health check timed out"),
        }
        self.health.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::{AddressDeriver, AirQualityReading, Pubkey};
    use ledger_adapter::{ScriptedFailure, ServiceHealth, SimulatedLedgerClient};

    fn record() -> (LogicalRecordKey, DerivedAddress, LedgerPayload) {
        let key = LogicalRecordKey::air_quality("Harbor", "S1", Pubkey::new([1u8; 32]));
        let address = AddressDeriver::default().derive_key(&key).unwrap();
        let payload = LedgerPayload::AirQuality(AirQualityReading {
            aqi: 200,
            pm25: 80.0,
            pm10: 90.0,
            co2: 600.0,
            humidity: 50.0,
            temperature: 20.0,
        });
        (key, address, payload)
    }

    fn delivery(client: Arc<SimulatedLedgerClient>, timeout: Duration) -> Delivery {
        Delivery::new(
            client,
            Arc::new(HealthMonitor::new(2)),
            PipelineMetrics::new().unwrap(),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_initialize_then_update() {
        let client = Arc::new(SimulatedLedgerClient::default());
        let delivery = delivery(client.clone(), Duration::from_secs(5));
        let (key, address, payload) = record();

        let init = delivery.deliver(OperationKind::Initialize, &key, &address, &payload).await;
        assert!(matches!(init, DeliveryOutcome::Committed(ref r) if !r.already_existed));
        let update = delivery.deliver(OperationKind::Update, &key, &address, &payload).await;
        assert!(matches!(update, DeliveryOutcome::Committed(_)));

        assert_eq!(client.account(&address.address()).unwrap().updates, 1);
        assert_eq!(delivery.health().status, ServiceHealth::Operational);
    }

    #[tokio::test]
    async fn test_update_without_account_rejected() {
        let client = Arc::new(SimulatedLedgerClient::default());
        let delivery = delivery(client, Duration::from_secs(5));
        let (key, address, payload) = record();

        let outcome = delivery.deliver(OperationKind::Update, &key, &address, &payload).await;
        assert!(matches!(outcome, DeliveryOutcome::Rejected(_)));
        assert_eq!(delivery.health().status, ServiceHealth::Operational);
    }

    #[tokio::test]
    async fn test_network_failures_degrade_health() {
        let client = Arc::new(SimulatedLedgerClient::default());
        client.fail_always(ScriptedFailure::Network);
        let delivery = delivery(client, Duration::from_secs(5));
        let (key, address, payload) = record();

        for _ in 0..2 {
            let outcome = delivery.deliver(OperationKind::Initialize, &key, &address, &payload).await;
            assert!(matches!(outcome, DeliveryOutcome::Transient(_)));
        }
        assert_eq!(delivery.health().status, ServiceHealth::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_call_times_out() {
        let client = Arc::new(SimulatedLedgerClient::default());
        client.fail_next(ScriptedFailure::Stall(Duration::from_secs(60)));
        let delivery = delivery(client, Duration::from_secs(1));
        let (key, address, payload) = record();

        let outcome = delivery.deliver(OperationKind::Initialize, &key, &address, &payload).await;
        assert!(matches!(outcome, DeliveryOutcome::Transient(ref m) if m.contains("exceeded")));
    }
}
