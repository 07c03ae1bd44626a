//! Transparency reporting
//!
//! Read-only aggregation of queue counters, ingestion counters and the
//! ledger's last-known health. Recomputed on every call, never persisted,
//! no I/O; safe to call while the worker runs.

use crate::config::ExplorerConfig;
use crate::queue::{CommitQueue, CommitRecord};
use crate::service::IngressCounters;
use chrono::{DateTime, Utc};
use civic_core::{OperationKind, Pubkey, VALIDATION_TABLE_VERSION};
use ledger_adapter::{HealthSnapshot, ServiceHealth};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Commits listed in a report by default
pub const DEFAULT_RECENT_COMMITS: usize = 10;

/// Committed operation with explorer links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitLink {
    /// Reporting category
    pub category: String,
    /// Initialize or update
    pub kind: OperationKind,
    /// Record address
    pub address: Pubkey,
    /// Transaction signature, when one was sent
    pub signature: Option<String>,
    /// Slot, when known
    pub slot: Option<u64>,
    /// Explorer page of the record
    pub address_url: String,
    /// Explorer page of the transaction
    pub transaction_url: Option<String>,
    /// When
    pub committed_at: DateTime<Utc>,
}

/// Point-in-time pipeline report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransparencyReport {
    /// When the report was computed
    pub generated_at: DateTime<Utc>,
    /// Pending operations
    pub queue_depth: usize,
    /// Operations being delivered
    pub in_flight: usize,
    /// Operations out of attempts
    pub dead_letter_count: u64,
    /// Permanent rejections
    pub rejection_count: u64,
    /// Operations evicted at capacity
    pub eviction_count: u64,
    /// Stored addresses that failed their audit
    pub audit_failure_count: u64,
    /// Update commits by category
    pub commits_by_category: BTreeMap<String, u64>,
    /// Initializations that created the account
    pub accounts_initialized: u64,
    /// Initializations that found the account in place
    pub accounts_already_existed: u64,
    /// Ledger service health
    pub service_health: ServiceHealth,
    /// Health details
    pub health: HealthSnapshot,
    /// Ingestion counts and cost accounting
    pub ingress: IngressCounters,
    /// Version of the numeric validation table in force
    pub validation_table_version: u32,
    /// Most recent commits, newest first
    pub recent_commits: Vec<CommitLink>,
}

impl TransparencyReport {
    /// Commits over all categories
    pub fn total_commits(&self) -> u64 {
        self.commits_by_category.values().sum()
    }
}

/// Builds transparency reports
#[derive(Debug, Clone)]
pub struct TransparencyReporter {
    explorer: ExplorerConfig,
    recent_limit: usize,
}

impl TransparencyReporter {
    /// Create new reporter
    pub fn new(explorer: ExplorerConfig) -> Self {
        Self {
            explorer,
            recent_limit: DEFAULT_RECENT_COMMITS,
        }
    }

    /// Number of recent commits listed
    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    /// Explorer page of an address
    pub fn address_url(&self, address: &Pubkey) -> String {
        format!(
            "https://{}/address/{}?cluster={}",
            self.explorer.host, address, self.explorer.cluster
        )
    }

    /// Explorer page of a transaction
    pub fn transaction_url(&self, signature: &str) -> String {
        format!(
            "https://{}/tx/{}?cluster={}",
            self.explorer.host, signature, self.explorer.cluster
        )
    }

    fn link(&self, record: CommitRecord) -> CommitLink {
        let transaction_url = record
            .receipt
            .signature
            .as_deref()
            .map(|sig| self.transaction_url(sig));
        CommitLink {
            address_url: self.address_url(&record.address),
            transaction_url,
            category: record.category,
            kind: record.kind,
            address: record.address,
            signature: record.receipt.signature,
            slot: record.receipt.slot,
            committed_at: record.committed_at,
        }
    }

    /// Aggregate the current state
    pub fn report(
        &self,
        queue: &CommitQueue,
        health: HealthSnapshot,
        ingress: IngressCounters,
    ) -> TransparencyReport {
        let counters = queue.counters();
        let recent_commits = queue
            .recent_commits(self.recent_limit)
            .into_iter()
            .map(|record| self.link(record))
            .collect();

        TransparencyReport {
            generated_at: Utc::now(),
            queue_depth: queue.depth(),
            in_flight: queue.in_flight(),
            dead_letter_count: counters.dead_lettered,
            rejection_count: counters.rejected,
            eviction_count: counters.evicted,
            audit_failure_count: counters.audit_failures,
            commits_by_category: counters.commits_by_category,
            accounts_initialized: counters.initialized,
            accounts_already_existed: counters.already_existed,
            service_health: health.status,
            health,
            ingress,
            validation_table_version: VALIDATION_TABLE_VERSION,
            recent_commits,
        }
    }
}
