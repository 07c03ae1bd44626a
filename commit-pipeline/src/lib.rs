//! Civic Ledger Commit Pipeline
//!
//! Decides which observations are recorded on the public ledger, computes
//! their addresses, and delivers them reliably over an unreliable ledger
//! service.
//!
//! # Flow
//!
//! ```text
//! reading / governance action
//!        │
//!        ▼
//! RecordValidator ──✗──▶ RejectedValidation
//!        │
//!        ▼
//! EligibilityClassifier ──not worthy──▶ LocalOnly
//!        │
//!        ▼
//! AddressDeriver ──▶ immediate delivery (Initialize, then Update)
//!        │                    │ transient failure
//!        │                    ▼
//!        │            CommitQueue ◀── retry at head ──┐
//!        │                    │                       │
//!        │                    ▼                       │
//!        │              CommitWorker ─────────────────┘
//!        │                    │ commit / reject / dead-letter
//!        ▼                    ▼
//!          TransparencyReporter
//! ```
//!
//! # Invariants
//!
//! - Enqueue never blocks on the worker
//! - At most `capacity` operations are pending; overflow evicts the oldest
//! - A queued operation is attempted at most `max_attempts` times
//! - Nothing is dropped silently: every exit path is counted

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod config;
pub mod delivery;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod report;
pub mod service;
pub mod worker;

pub use config::{ClientMode, Config};
pub use delivery::{Delivery, DeliveryOutcome};
pub use error::{Error, Result};
pub use metrics::PipelineMetrics;
pub use queue::{CommitQueue, CommitRecord, FailedOperation, QueueCounters, QueuedOperation};
pub use report::{CommitLink, TransparencyReport, TransparencyReporter};
pub use service::{CommitService, IngressCounters, IngressOutcome};
pub use worker::{spawn_commit_worker, CommitWorker, WorkerHandle, WorkerStep};
