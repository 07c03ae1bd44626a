//! JSON-RPC ledger client

use crate::client::{AccountState, LedgerClient, Receipt};
use crate::transaction::{initialize_instruction, update_instruction, Instruction, Message, Transaction};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use civic_core::address::DEFAULT_PROGRAM_KEY;
use civic_core::{DerivedAddress, Keypair, LedgerPayload, LogicalRecordKey, Pubkey};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// RPC client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint
    pub url: String,
    /// Civic program identifier
    pub program_id: Pubkey,
    /// Commitment level (processed / confirmed / finalized)
    pub commitment: String,
    /// Per-request timeout (seconds)
    pub timeout_seconds: u64,
    /// Confirmation polling window (seconds)
    pub confirmation_timeout_seconds: u64,
    /// Interval between confirmation polls (milliseconds)
    pub confirmation_poll_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: crate::DEFAULT_RPC_URL.to_string(),
            program_id: Pubkey::new(DEFAULT_PROGRAM_KEY),
            commitment: "confirmed".to_string(),
            timeout_seconds: crate::DEFAULT_REQUEST_TIMEOUT_SECONDS,
            confirmation_timeout_seconds: crate::DEFAULT_CONFIRMATION_TIMEOUT_SECONDS,
            confirmation_poll_ms: crate::DEFAULT_CONFIRMATION_POLL_MS,
        }
    }
}

fn commitment_rank(level: &str) -> Option<u8> {
    match level {
        "processed" => Some(0),
        "confirmed" => Some(1),
        "finalized" => Some(2),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorObject {
    /// Fold simulation details (program error, logs) into the message
    fn into_error(self) -> Error {
        let mut message = self.message;
        if let Some(data) = &self.data {
            if let Some(err) = data.get("err").filter(|e| !e.is_null()) {
                message.push_str(&format!(" (err: {})", err));
            }
            if let Some(logs) = data.get("logs").and_then(Value::as_array) {
                let lines: Vec<&str> = logs.iter().filter_map(Value::as_str).collect();
                if !lines.is_empty() {
                    message.push_str(&format!(" logs: {}", lines.join(" | ")));
                }
            }
        }
        Error::Rpc {
            code: self.code,
            message,
        }
    }
}

/// Ledger client over JSON-RPC
pub struct RpcLedgerClient {
    config: RpcConfig,
    client: Client,
    authority: Arc<Keypair>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("url", &self.config.url)
            .field("program_id", &self.config.program_id)
            .field("authority", &self.authority.pubkey())
            .finish()
    }
}

impl RpcLedgerClient {
    /// Create new RPC client signing with `authority`
    pub fn new(config: RpcConfig, authority: Arc<Keypair>) -> Result<Self> {
        if commitment_rank(&config.commitment).is_none() {
            return Err(Error::Config(format!("unknown commitment '{}'", config.commitment)));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self {
            config,
            client,
            authority,
            next_id: AtomicU64::new(1),
        })
    }

    /// Configuration
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        seconds: self.config.timeout_seconds,
                        operation: method.to_string(),
                    }
                } else if e.is_connect() {
                    Error::Connection(e.to_string())
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!("{} throttled by {}", method, self.config.url)));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: RpcEnvelope = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(error.into_error());
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    async fn latest_blockhash(&self) -> Result<[u8; 32]> {
        let result = self
            .call("getLatestBlockhash", json!([{ "commitment": self.config.commitment }]))
            .await?;

        let blockhash = result["value"]["blockhash"].as_str().ok_or_else(|| Error::InvalidResponse {
            method: "getLatestBlockhash".to_string(),
            message: "missing value.blockhash".to_string(),
        })?;
        Ok(blockhash.parse::<Pubkey>()?.to_bytes())
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<String> {
        let encoded = BASE64.encode(tx.serialize()?);
        let result = self
            .call(
                "sendTransaction",
                json!([encoded, {
                    "encoding": "base64",
                    "preflightCommitment": self.config.commitment,
                }]),
            )
            .await?;

        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidResponse {
                method: "sendTransaction".to_string(),
                message: format!("expected signature string, got {}", result),
            })
    }

    /// Poll until the signature reaches the configured commitment
    async fn confirm(&self, signature: &str) -> Result<Option<u64>> {
        let required = commitment_rank(&self.config.commitment).unwrap_or(1);
        let deadline = Instant::now() + Duration::from_secs(self.config.confirmation_timeout_seconds);
        let poll = Duration::from_millis(self.config.confirmation_poll_ms);

        loop {
            let result = self
                .call(
                    "getSignatureStatuses",
                    json!([[signature], { "searchTransactionHistory": false }]),
                )
                .await?;

            let status = &result["value"][0];
            if !status.is_null() {
                if !status["err"].is_null() {
                    return Err(Error::Rejected(format!(
                        "transaction {} failed: {}",
                        signature, status["err"]
                    )));
                }
                let reached = status["confirmationStatus"]
                    .as_str()
                    .and_then(commitment_rank)
                    .unwrap_or(0);
                if reached >= required {
                    return Ok(status["slot"].as_u64());
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::Unconfirmed {
                    signature: signature.to_string(),
                    seconds: self.config.confirmation_timeout_seconds,
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn submit(&self, instruction: Instruction, address: &DerivedAddress, operation: &str) -> Result<Receipt> {
        let blockhash = self.latest_blockhash().await?;
        let message = Message::compile(&[instruction], &self.authority.pubkey(), blockhash)?;
        let tx = Transaction::sign(&message, &self.authority)?;

        let signature = self.send_transaction(&tx).await?;
        debug!(%signature, address = %address, operation, "Transaction sent, awaiting confirmation");

        match self.confirm(&signature).await {
            Ok(slot) => {
                info!(%signature, address = %address, operation, ?slot, "Transaction confirmed");
                Ok(Receipt::confirmed(address.address(), signature, slot))
            }
            Err(e) => {
                warn!(%signature, address = %address, operation, error = %e, "Transaction not confirmed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<AccountState> {
        let result = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), {
                    "encoding": "base64",
                    "commitment": self.config.commitment,
                }]),
            )
            .await?;

        let value = &result["value"];
        if value.is_null() {
            return Ok(AccountState::missing());
        }

        let owner = value["owner"].as_str().map(str::parse::<Pubkey>).transpose()?;
        let size_bytes = match value["space"].as_u64() {
            Some(space) => space as usize,
            None => match value["data"][0].as_str() {
                Some(data) => BASE64
                    .decode(data)
                    .map_err(|e| Error::InvalidResponse {
                        method: "getAccountInfo".to_string(),
                        message: e.to_string(),
                    })?
                    .len(),
                None => 0,
            },
        };

        Ok(AccountState {
            exists: true,
            owner,
            size_bytes,
        })
    }

    async fn send_initialize(
        &self,
        key: &LogicalRecordKey,
        address: &DerivedAddress,
        payload: &LedgerPayload,
    ) -> Result<Receipt> {
        let instruction = initialize_instruction(
            &self.config.program_id,
            key,
            address,
            payload,
            &self.authority.pubkey(),
        )?;
        self.submit(instruction, address, "initialize").await
    }

    async fn submit_update(
        &self,
        key: &LogicalRecordKey,
        address: &DerivedAddress,
        payload: &LedgerPayload,
    ) -> Result<Receipt> {
        let instruction = update_instruction(
            &self.config.program_id,
            key,
            address,
            payload,
            &self.authority.pubkey(),
        )?;
        self.submit(instruction, address, "update").await
    }

    async fn health_check(&self) -> Result<()> {
        let result = self.call("getHealth", json!([])).await?;
        match result.as_str() {
            Some("ok") => Ok(()),
            _ => Err(Error::InvalidResponse {
                method: "getHealth".to_string(),
                message: format!("unexpected health {}", result),
            }),
        }
    }
}
