//! Ledger client interface

use crate::{Error, Result};
use async_trait::async_trait;
use civic_core::{DerivedAddress, LedgerPayload, LogicalRecordKey, Pubkey};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Read-only projection of an on-ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Whether the account exists
    pub exists: bool,
    /// Owning program
    pub owner: Option<Pubkey>,
    /// Data size in bytes
    pub size_bytes: usize,
}

impl AccountState {
    /// State of an address with no account
    pub fn missing() -> Self {
        Self {
            exists: false,
            owner: None,
            size_bytes: 0,
        }
    }
}

/// Proof that an operation took effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Record address
    pub address: Pubkey,
    /// Transaction signature (base58); none when nothing was sent
    pub signature: Option<String>,
    /// Slot the transaction landed in, when known
    pub slot: Option<u64>,
    /// Initialize found the account already present
    pub already_existed: bool,
}

impl Receipt {
    /// Receipt of a confirmed transaction
    pub fn confirmed(address: Pubkey, signature: impl Into<String>, slot: Option<u64>) -> Self {
        Self {
            address,
            signature: Some(signature.into()),
            slot,
            already_existed: false,
        }
    }

    /// Receipt of an initialize that found the account in place
    pub fn already_existed(address: Pubkey) -> Self {
        Self {
            address,
            signature: None,
            slot: None,
            already_existed: true,
        }
    }
}

/// Ledger client trait
///
/// Every method returns either success, [`Error::Rejected`] (terminal) or a
/// transient error; callers tell them apart with [`Error::is_transient`].
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Client name (for logs)
    fn name(&self) -> &str;

    /// Look up the account at an address
    async fn account_exists(&self, address: &Pubkey) -> Result<AccountState>;

    /// Send an initialize instruction without checking for the account first
    async fn send_initialize(
        &self,
        key: &LogicalRecordKey,
        address: &DerivedAddress,
        payload: &LedgerPayload,
    ) -> Result<Receipt>;

    /// Write record data to an existing account
    async fn submit_update(
        &self,
        key: &LogicalRecordKey,
        address: &DerivedAddress,
        payload: &LedgerPayload,
    ) -> Result<Receipt>;

    /// Ledger service health
    async fn health_check(&self) -> Result<()>;

    /// Create the record account unless it already exists
    ///
    /// Re-running after a crash or timeout is safe: an existing account, or a
    /// race lost to another writer, yields a receipt with `already_existed`.
    async fn submit_initialize(
        &self,
        key: &LogicalRecordKey,
        address: &DerivedAddress,
        payload: &LedgerPayload,
    ) -> Result<Receipt> {
        let state = self.account_exists(&address.address()).await?;
        if state.exists {
            debug!(client = self.name(), address = %address, "Account already exists, skipping initialize");
            return Ok(Receipt::already_existed(address.address()));
        }

        match self.send_initialize(key, address, payload).await {
            Err(e) if e.is_already_in_use() => {
                debug!(client = self.name(), address = %address, "Initialize raced an existing account");
                Ok(Receipt::already_existed(address.address()))
            }
            other => other,
        }
    }
}

/// Shorthand used when a payload does not fit the record's namespace
pub(crate) fn namespace_mismatch(key: &LogicalRecordKey, payload: &LedgerPayload) -> Error {
    Error::Encoding(format!(
        "{} payload cannot be written to {} record {}",
        payload.namespace(),
        key.namespace(),
        key
    ))
}
