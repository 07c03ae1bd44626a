//! Civic Ledger Core
//!
//! Pure building blocks of the ledger commit pipeline. Nothing in this crate
//! performs I/O or holds shared mutable state.
//!
//! # Components
//!
//! - **Address derivation**: program-derived record addresses, with an audit mode
//! - **Record validation**: closed numeric ranges per payload type
//! - **Eligibility**: the "post only if extreme" cost gate
//! - **Authority keypair**: the single signing identity of the process
//!
//! # Invariants
//!
//! - Same key fields → same address, from any process, with no coordination
//! - Every derived address is off the ed25519 curve (never a signing key)
//! - Out-of-range payloads are never admitted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod address;
pub mod crypto;
pub mod eligibility;
pub mod error;
pub mod types;
pub mod validation;

// Re-exports
pub use address::AddressDeriver;
pub use crypto::Keypair;
pub use eligibility::{estimated_update_cost, Eligibility, EligibilityClassifier, Thresholds};
pub use error::{AddressError, Error, Result};
pub use types::{
    AirQualityReading, ContractPayload, DerivedAddress, GovernanceAction, LedgerPayload,
    LogicalRecordKey, Namespace, OperationKind, Pubkey, ReadingType, SensorPayload,
};
pub use validation::{
    FieldRange, FieldViolation, RecordValidator, ValidationErrors, ViolationKind,
    VALIDATION_TABLE_VERSION,
};

/// Default identifier of the on-ledger civic program.
///
/// Seeds every derived address; changing it changes every address.
pub const DEFAULT_PROGRAM_ID: &str = "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS";

/// Version of the derivation seed layout (namespace strings and seed order)
pub const SEED_LAYOUT_VERSION: u32 = 1;
