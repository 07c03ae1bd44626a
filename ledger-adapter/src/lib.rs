//! # Ledger Adapter
//!
//! The only network-facing layer of the commit pipeline:
//! - `LedgerClient` trait: account lookup, idempotent initialize, update, health
//! - JSON-RPC implementation (signed legacy transactions, confirmation polling)
//! - Simulation implementation (in-memory accounts, scripted failures)
//! - Health monitor (Uninitialized / Operational / Degraded)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        CommitQueue worker / ingress          │
//! └──────────────────────┬───────────────────────┘
//!                        │ dyn LedgerClient
//!             ┌──────────┴──────────┐
//!        ┌────▼─────┐        ┌──────▼──────┐
//!        │   RPC    │        │  Simulated  │
//!        │  client  │        │   client    │
//!        └────┬─────┘        └─────────────┘
//!             │ instructions → message → signed tx
//!        ┌────▼──────────────┐
//!        │  ledger JSON-RPC  │
//!        └───────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod client;
pub mod error;
pub mod health;
pub mod rpc;
pub mod simulated;
pub mod transaction;

pub use client::{AccountState, LedgerClient, Receipt};
pub use error::{Error, Result};
pub use health::{HealthMonitor, HealthSnapshot, ServiceHealth};
pub use rpc::{RpcConfig, RpcLedgerClient};
pub use simulated::{CallCounts, ScriptedFailure, SimulatedLedgerClient};

/// Default upper bound of a single ledger call (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 20;

/// Default window for a submitted transaction to confirm (seconds)
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECONDS: u64 = 15;

/// Default interval between confirmation polls (milliseconds)
pub const DEFAULT_CONFIRMATION_POLL_MS: u64 = 500;

/// Default consecutive transient failures before the service is Degraded
pub const DEFAULT_DEGRADED_THRESHOLD: u32 = 3;

/// Default RPC endpoint
pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";
