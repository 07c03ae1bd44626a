//! In-memory ledger simulation
//!
//! Keeps accounts in a map, fabricates deterministic receipts and lets
//! callers script failures. Used by the binary in `simulated` mode and by
//! tests.

use crate::client::{namespace_mismatch, AccountState, LedgerClient, Receipt};
use crate::transaction::account_size;
use crate::{Error, Result};
use async_trait::async_trait;
use civic_core::crypto::sha256;
use civic_core::{DerivedAddress, LedgerPayload, LogicalRecordKey, Pubkey};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Failure injected into the next ledger call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Transient network failure
    Network,
    /// Permanent rejection with a reason
    Reject(String),
    /// Hang for a while before answering normally
    Stall(Duration),
}

/// Simulated on-ledger account
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedAccount {
    /// Record key the account was created for
    pub key: LogicalRecordKey,
    /// Allocated size
    pub size_bytes: usize,
    /// Updates applied
    pub updates: u64,
    /// Last written payload
    pub last_payload: Option<LedgerPayload>,
}

/// Calls made to the simulation, by method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `account_exists`
    pub account_exists: u64,
    /// `send_initialize`
    pub initialize: u64,
    /// `submit_update`
    pub update: u64,
    /// `health_check`
    pub health: u64,
}

/// Simulated ledger client
#[derive(Debug)]
pub struct SimulatedLedgerClient {
    program_id: Pubkey,
    accounts: Mutex<HashMap<Pubkey, SimulatedAccount>>,
    script: Mutex<VecDeque<ScriptedFailure>>,
    always: Mutex<Option<ScriptedFailure>>,
    calls: Mutex<CallCounts>,
    sequence: AtomicU64,
    healthy: AtomicBool,
}

impl Default for SimulatedLedgerClient {
    fn default() -> Self {
        Self::new(Pubkey::new(civic_core::address::DEFAULT_PROGRAM_KEY))
    }
}

impl SimulatedLedgerClient {
    /// Create an empty simulated ledger for a program
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            accounts: Mutex::new(HashMap::new()),
            script: Mutex::new(VecDeque::new()),
            always: Mutex::new(None),
            calls: Mutex::new(CallCounts::default()),
            sequence: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Fail the next ledger call (queued behind earlier scripted failures)
    pub fn fail_next(&self, failure: ScriptedFailure) {
        self.script.lock().push_back(failure);
    }

    /// Fail every ledger call until cleared
    pub fn fail_always(&self, failure: ScriptedFailure) {
        *self.always.lock() = Some(failure);
    }

    /// Drop every scripted failure
    pub fn clear_failures(&self) {
        self.script.lock().clear();
        *self.always.lock() = None;
    }

    /// Answer health checks as healthy or not
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Account at an address
    pub fn account(&self, address: &Pubkey) -> Option<SimulatedAccount> {
        self.accounts.lock().get(address).cloned()
    }

    /// Number of accounts
    pub fn account_count(&self) -> usize {
        self.accounts.lock().len()
    }

    /// Calls made so far
    pub fn call_counts(&self) -> CallCounts {
        *self.calls.lock()
    }

    async fn inject(&self) -> Result<()> {
        let failure = {
            let scripted = self.script.lock().pop_front();
            scripted.or_else(|| self.always.lock().clone())
        };

        match failure {
            None => Ok(()),
            Some(ScriptedFailure::Network) => {
                Err(Error::Connection("simulated network failure".to_string()))
            }
            Some(ScriptedFailure::Reject(reason)) => Err(Error::Rejected(reason)),
            Some(ScriptedFailure::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }

    /// 64 deterministic bytes per call, base58 like a real signature
    fn next_signature(&self, address: &Pubkey) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut seed = address.to_bytes().to_vec();
        seed.extend_from_slice(&seq.to_le_bytes());

        let first = sha256(&seed);
        let second = sha256(&first);
        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(&first);
        signature[32..].copy_from_slice(&second);
        bs58::encode(signature).into_string()
    }

    fn slot(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedgerClient {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<AccountState> {
        self.calls.lock().account_exists += 1;
        self.inject().await?;

        Ok(match self.accounts.lock().get(address) {
            Some(account) => AccountState {
                exists: true,
                owner: Some(self.program_id),
                size_bytes: account.size_bytes,
            },
            None => AccountState::missing(),
        })
    }

    async fn send_initialize(
        &self,
        key: &LogicalRecordKey,
        address: &DerivedAddress,
        payload: &LedgerPayload,
    ) -> Result<Receipt> {
        self.calls.lock().initialize += 1;
        self.inject().await?;

        if key.namespace() != payload.namespace() {
            return Err(namespace_mismatch(key, payload));
        }

        {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&address.address()) {
                return Err(Error::Rejected(format!(
                    "Allocate: account {} already in use",
                    address
                )));
            }
            accounts.insert(
                address.address(),
                SimulatedAccount {
                    key: key.clone(),
                    size_bytes: account_size(key.namespace()),
                    updates: 0,
                    last_payload: None,
                },
            );
        }

        let signature = self.next_signature(&address.address());
        debug!(address = %address, %signature, "Simulated initialize");
        Ok(Receipt::confirmed(address.address(), signature, Some(self.slot())))
    }

    async fn submit_update(
        &self,
        key: &LogicalRecordKey,
        address: &DerivedAddress,
        payload: &LedgerPayload,
    ) -> Result<Receipt> {
        self.calls.lock().update += 1;
        self.inject().await?;

        if key.namespace() != payload.namespace() {
            return Err(namespace_mismatch(key, payload));
        }

        {
            let mut accounts = self.accounts.lock();
            let account = accounts.get_mut(&address.address()).ok_or_else(|| {
                Error::Rejected(format!("AccountNotInitialized: no account at {}", address))
            })?;
            account.updates += 1;
            account.last_payload = Some(payload.clone());
        }

        let signature = self.next_signature(&address.address());
        debug!(address = %address, %signature, "Simulated update");
        Ok(Receipt::confirmed(address.address(), signature, Some(self.slot())))
    }

    async fn health_check(&self) -> Result<()> {
        self.calls.lock().health += 1;
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Rpc {
                code: -32005,
                message: "Node is unhealthy".to_string(),
            })
        }
    }
}
