//! End-to-end pipeline scenarios against the simulated ledger

use civic_core::{AddressDeriver, LedgerPayload, LogicalRecordKey, OperationKind, Pubkey, ReadingType};
use commit_pipeline::{CommitService, Config, IngressOutcome, WorkerStep};
use ledger_adapter::{ScriptedFailure, ServiceHealth, SimulatedLedgerClient};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const AUTHORITY: [u8; 32] = [1u8; 32];

fn fast_config() -> Config {
    let mut config = Config::default();
    config.queue.idle_interval_ms = 10;
    config.queue.retry_pause_ms = 10;
    config
}

fn setup(config: Config) -> (CommitService, Arc<SimulatedLedgerClient>) {
    let client = Arc::new(SimulatedLedgerClient::default());
    let service = CommitService::new(&config, client.clone(), Pubkey::new(AUTHORITY)).unwrap();
    (service, client)
}

fn air_quality(aqi: u64) -> Value {
    json!({
        "aqi": aqi,
        "pm25": 45.2,
        "pm10": 62.8,
        "co2": 520,
        "humidity": 68,
        "temperature": 26.5
    })
}

#[tokio::test]
async fn test_extreme_reading_committed() {
    let (service, client) = setup(fast_config());

    let outcome = service
        .submit_reading(ReadingType::AirQuality, &air_quality(185), "Business_District", "ENV_001")
        .await
        .unwrap();

    let expected: Pubkey = "B5bAwaot3pCf8WC87AS56B61hoqcLbACUDbK6JHKbgov".parse().unwrap();
    match outcome {
        IngressOutcome::Committed(receipt) => {
            assert_eq!(receipt.address, expected);
            assert!(receipt.signature.is_some());
        }
        other => panic!("expected commit, got {:?}", other),
    }

    let calls = client.call_counts();
    assert_eq!(calls.account_exists, 1);
    assert_eq!(calls.initialize, 1);
    assert_eq!(calls.update, 1);

    let account = client.account(&expected).unwrap();
    assert_eq!(account.updates, 1);
    match account.last_payload {
        Some(LedgerPayload::AirQuality(reading)) => assert_eq!(reading.aqi, 185),
        other => panic!("unexpected payload {:?}", other),
    }

    let report = service.report();
    assert_eq!(report.commits_by_category.get("air_quality"), Some(&1));
    assert_eq!(report.total_commits(), 1);
    assert_eq!(report.accounts_initialized, 1);
    assert_eq!(report.queue_depth, 0);
    assert_eq!(report.service_health, ServiceHealth::Operational);
    assert_eq!(report.ingress.ledger_worthy, 1);
    assert_eq!(report.recent_commits[0].kind, OperationKind::Update);
    assert_eq!(
        report.recent_commits[0].address_url,
        format!("https://explorer.solana.com/address/{}?cluster=devnet", expected)
    );
}

#[tokio::test]
async fn test_ordinary_reading_stays_local() {
    let (service, client) = setup(fast_config());

    let outcome = service
        .submit_reading(ReadingType::AirQuality, &air_quality(60), "Business_District", "ENV_001")
        .await
        .unwrap();

    assert!(matches!(outcome, IngressOutcome::LocalOnly { .. }));
    assert_eq!(client.call_counts(), Default::default());
    assert_eq!(client.account_count(), 0);

    let report = service.report();
    assert_eq!(report.queue_depth, 0);
    assert_eq!(report.total_commits(), 0);
    assert_eq!(report.ingress.local_only, 1);
    assert_eq!(report.service_health, ServiceHealth::Uninitialized);
}

#[tokio::test]
async fn test_invalid_reading_rejected_synchronously() {
    let (service, client) = setup(fast_config());
    let mut raw = air_quality(185);
    raw["aqi"] = json!("very high");

    let outcome = service
        .submit_reading(ReadingType::AirQuality, &raw, "Business_District", "ENV_001")
        .await
        .unwrap();

    match outcome {
        IngressOutcome::RejectedValidation(errors) => assert_eq!(errors.fields(), vec!["aqi"]),
        other => panic!("expected validation rejection, got {:?}", other),
    }
    assert_eq!(client.call_counts(), Default::default());
    assert_eq!(service.queue().depth(), 0);
    assert_eq!(service.report().ingress.validation_rejections, 1);
}

#[tokio::test]
async fn test_repeat_initialize_is_idempotent() {
    let (service, client) = setup(fast_config());

    for aqi in [185, 190] {
        let outcome = service
            .submit_reading(ReadingType::AirQuality, &air_quality(aqi), "Business_District", "ENV_001")
            .await
            .unwrap();
        assert!(matches!(outcome, IngressOutcome::Committed(_)));
    }

    assert_eq!(client.account_count(), 1);
    assert_eq!(client.call_counts().initialize, 1);

    let report = service.report();
    assert_eq!(report.accounts_initialized, 1);
    assert_eq!(report.accounts_already_existed, 1);
    assert_eq!(report.commits_by_category.get("air_quality"), Some(&2));
}

#[tokio::test]
async fn test_retry_bound_then_dead_letter() {
    let (service, client) = setup(fast_config());
    client.fail_always(ScriptedFailure::Network);

    let outcome = service
        .submit_reading(ReadingType::AirQuality, &air_quality(185), "Business_District", "ENV_002")
        .await
        .unwrap();
    assert_eq!(outcome, IngressOutcome::Queued);

    let pending = service.queue().pending();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].kind, OperationKind::Initialize);
    assert_eq!(pending[1].kind, OperationKind::Update);

    let worker = service.worker();
    let mut steps = Vec::new();
    loop {
        let step = worker.run_once().await;
        if step == WorkerStep::Idle {
            break;
        }
        steps.push(step);
    }

    // The update goes down with its initialize
    assert_eq!(
        steps,
        vec![WorkerStep::Retried, WorkerStep::Retried, WorkerStep::DeadLettered]
    );

    // One immediate lookup plus three worker attempts for the initialize
    let calls = client.call_counts();
    assert_eq!(calls.account_exists, 4);
    assert_eq!(calls.update, 0);

    let report = service.report();
    assert_eq!(report.dead_letter_count, 2);
    assert_eq!(report.queue_depth, 0);
    assert_eq!(report.total_commits(), 0);
    assert_eq!(service.queue().counters().rejected, 0);
    assert_eq!(report.service_health, ServiceHealth::Degraded);

    let dead = service.queue().dead_letters();
    assert_eq!(dead[0].operation.kind, OperationKind::Initialize);
    assert_eq!(dead[0].operation.attempts, 3);
    assert_eq!(dead[1].operation.kind, OperationKind::Update);
}

#[tokio::test]
async fn test_newer_reading_not_overwritten_by_queued_one() {
    let (service, client) = setup(fast_config());
    client.fail_next(ScriptedFailure::Network);

    for aqi in [185, 300] {
        let outcome = service
            .submit_reading(ReadingType::AirQuality, &air_quality(aqi), "Business_District", "ENV_001")
            .await
            .unwrap();
        assert_eq!(outcome, IngressOutcome::Queued);
    }

    let worker = service.worker();
    while worker.run_once().await != WorkerStep::Idle {}

    let expected: Pubkey = "B5bAwaot3pCf8WC87AS56B61hoqcLbACUDbK6JHKbgov".parse().unwrap();
    let account = client.account(&expected).unwrap();
    assert_eq!(account.updates, 2);
    match account.last_payload {
        Some(LedgerPayload::AirQuality(reading)) => assert_eq!(reading.aqi, 300),
        other => panic!("unexpected payload {:?}", other),
    }

    let report = service.report();
    assert_eq!(report.commits_by_category.get("air_quality"), Some(&2));
    assert_eq!(report.queue_depth, 0);
}

#[tokio::test]
async fn test_capacity_evicts_oldest() {
    let mut config = fast_config();
    config.queue.capacity = 4;
    let (service, client) = setup(config);
    client.fail_always(ScriptedFailure::Network);
    service.queue().pause();

    for sensor in ["ENV_001", "ENV_002", "ENV_003"] {
        let outcome = service
            .submit_reading(ReadingType::AirQuality, &air_quality(185), "Business_District", sensor)
            .await
            .unwrap();
        assert_eq!(outcome, IngressOutcome::Queued);
    }

    let pending = service.queue().pending();
    assert_eq!(pending.len(), 4);
    assert_eq!(pending[0].key.secondary(), "ENV_002");
    assert_eq!(pending[0].kind, OperationKind::Initialize);
    assert_eq!(pending[3].key.secondary(), "ENV_003");

    let report = service.report();
    assert_eq!(report.eviction_count, 2);
    assert_eq!(report.queue_depth, 4);
}

#[tokio::test]
async fn test_worker_recovers_queued_operations() {
    let (service, client) = setup(fast_config());
    client.fail_always(ScriptedFailure::Network);

    let outcome = service
        .submit_reading(ReadingType::AirQuality, &air_quality(200), "Harbor", "ENV_006")
        .await
        .unwrap();
    assert_eq!(outcome, IngressOutcome::Queued);

    client.clear_failures();
    let worker = service.spawn_worker(CancellationToken::new());
    for _ in 0..200 {
        if service.report().total_commits() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    worker.shutdown().await.unwrap();

    let report = service.report();
    assert_eq!(report.total_commits(), 1);
    assert_eq!(report.queue_depth, 0);
    assert_eq!(report.dead_letter_count, 0);
    assert_eq!(client.account_count(), 1);

    // Stopped worker leaves new work pending
    client.fail_always(ScriptedFailure::Network);
    service
        .submit_reading(ReadingType::AirQuality, &air_quality(200), "Harbor", "ENV_007")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.queue().depth(), 2);
}

#[tokio::test]
async fn test_governance_action_recorded() {
    let (service, client) = setup(fast_config());

    let outcome = service
        .submit_action("approve_budget", "council", "FY2025 budget")
        .await
        .unwrap();
    assert!(matches!(outcome, IngressOutcome::Committed(_)));

    let key = LogicalRecordKey::contract("approve_budget", Pubkey::new(AUTHORITY));
    let address = AddressDeriver::default().derive_key(&key).unwrap();
    let account = client.account(&address.address()).unwrap();

    match account.last_payload {
        Some(LedgerPayload::Contract(contract)) => {
            assert_eq!(contract.name, "approve_budget");
            assert_eq!(contract.description, "council: FY2025 budget");
            assert_eq!(contract.contract_type, "governance");
            assert!(contract.is_active);
        }
        other => panic!("unexpected payload {:?}", other),
    }

    let report = service.report();
    assert_eq!(report.commits_by_category.get("contract"), Some(&1));
    assert_eq!(report.ingress.ledger_worthy, 1);
}

#[tokio::test]
async fn test_metrics_follow_outcomes() {
    let (service, _) = setup(fast_config());

    service
        .submit_reading(ReadingType::AirQuality, &air_quality(185), "Business_District", "ENV_001")
        .await
        .unwrap();
    service
        .submit_reading(ReadingType::AirQuality, &air_quality(60), "Business_District", "ENV_002")
        .await
        .unwrap();

    let metrics = service.metrics();
    assert_eq!(metrics.ingested.with_label_values(&["reading"]).get(), 2);
    assert_eq!(metrics.ledger_worthy.get(), 1);
    assert_eq!(metrics.local_only.get(), 1);
    assert_eq!(metrics.commits.with_label_values(&["air_quality"]).get(), 1);
    assert_eq!(metrics.initializations.with_label_values(&["new"]).get(), 1);
}
