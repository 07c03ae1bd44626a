//! Commit pipeline binary
//!
//! Reads newline-delimited JSON records from stdin:
//!
//! ```text
//! {"reading_type":"air_quality","location":"Business_District","sensor_id":"ENV_001","payload":{"aqi":185,...}}
//! {"action_name":"approve_budget","actor_id":"council","details":"FY2025 budget"}
//! ```
//!
//! and logs the outcome of each, plus a transparency report at a fixed
//! interval. Stops on Ctrl-C or end of input.

use anyhow::Context;
use civic_core::{Keypair, ReadingType};
use commit_pipeline::{ClientMode, CommitService, Config, IngressOutcome};
use ledger_adapter::{LedgerClient, RpcLedgerClient, SimulatedLedgerClient};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngressLine {
    Reading {
        reading_type: String,
        location: String,
        sensor_id: String,
        payload: serde_json::Value,
    },
    Action {
        action_name: String,
        actor_id: String,
        #[serde(default)]
        details: String,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("CIVIC_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = match std::env::var("CIVIC_CONFIG") {
        Ok(path) => {
            let mut config = Config::from_file(&path)
                .with_context(|| format!("loading config from {}", path))?;
            config.apply_env(|name| std::env::var(name).ok())?;
            config
        }
        Err(_) => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn load_authority(config: &Config) -> anyhow::Result<Keypair> {
    match &config.authority_keypair_path {
        Some(path) => Keypair::read_from_file(path)
            .with_context(|| format!("reading authority keypair {}", path.display())),
        None => {
            let keypair = Keypair::generate();
            warn!(authority = %keypair.pubkey(), "No authority keypair configured, generated an ephemeral one");
            Ok(keypair)
        }
    }
}

fn build_client(config: &Config, authority: Arc<Keypair>) -> anyhow::Result<Arc<dyn LedgerClient>> {
    Ok(match config.client_mode {
        ClientMode::Simulated => Arc::new(SimulatedLedgerClient::new(config.program_id()?)),
        ClientMode::Rpc => Arc::new(RpcLedgerClient::new(config.rpc_config()?, authority)?),
    })
}

async fn ingest(service: &CommitService, line: &str) {
    let record: IngressLine = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "Skipping malformed input line");
            return;
        }
    };

    let result = match &record {
        IngressLine::Reading {
            reading_type,
            location,
            sensor_id,
            payload,
        } => {
            service
                .submit_reading(ReadingType::from_label(reading_type), payload, location, sensor_id)
                .await
        }
        IngressLine::Action {
            action_name,
            actor_id,
            details,
        } => service.submit_action(action_name, actor_id, details).await,
    };

    match result {
        Ok(IngressOutcome::Committed(receipt)) => {
            info!(address = %receipt.address, signature = ?receipt.signature, "Committed")
        }
        Ok(IngressOutcome::Queued) => info!("Queued for retry"),
        Ok(IngressOutcome::LocalOnly { reason }) => info!(%reason, "Kept local"),
        Ok(IngressOutcome::LedgerRejected(reason)) => warn!(%reason, "Rejected by ledger"),
        Ok(IngressOutcome::RejectedValidation(errors)) => warn!(violations = %errors, "Rejected by validation"),
        Err(e) => error!(error = %e, "Ingress failed"),
    }
}

fn log_report(service: &CommitService) {
    let report = service.report();
    match serde_json::to_string(&report) {
        Ok(json) => info!(
            queue_depth = report.queue_depth,
            dead_letters = report.dead_letter_count,
            commits = report.total_commits(),
            health = ?report.service_health,
            report = %json,
            "Transparency report"
        ),
        Err(e) => warn!(error = %e, "Failed to serialize report"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    info!(
        service = %config.service_name,
        mode = ?config.client_mode,
        program_id = %config.ledger.program_id,
        "Commit pipeline starting"
    );

    let authority = Arc::new(load_authority(&config)?);
    let client = build_client(&config, authority.clone())?;
    let service = CommitService::new(&config, client, authority.pubkey())?;

    service.check_ledger_health().await;

    let cancel = CancellationToken::new();
    let worker = service.spawn_worker(cancel.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut report_tick =
        tokio::time::interval(Duration::from_secs(config.report_interval_seconds.max(1)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = report_tick.tick() => log_report(&service),
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => ingest(&service, &line).await,
                None => {
                    info!("Input closed");
                    break;
                }
            },
        }
    }

    worker.shutdown().await?;
    log_report(&service);
    info!("Commit pipeline stopped");

    Ok(())
}
