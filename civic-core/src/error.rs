//! Error types for the core components

use crate::types::Pubkey;
use crate::validation::ValidationErrors;
use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Payload outside its declared ranges (never queued)
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Address derivation failed (programming-error class, never retried)
    #[error("Address derivation failed: {0}")]
    AddressDerivation(#[from] AddressError),

    /// Malformed identity (address, public key, keypair bytes)
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

/// Address derivation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A single seed exceeds the 32-byte limit
    #[error("seed {index} is {len} bytes (max 32)")]
    SeedTooLong {
        /// Seed position
        index: usize,
        /// Seed length in bytes
        len: usize,
    },

    /// More than 16 seeds (bump included)
    #[error("{0} seeds supplied (max 16)")]
    TooManySeeds(usize),

    /// Identifier missing or unusable as a seed
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Every bump candidate landed on the curve
    #[error("no off-curve bump found")]
    NoViableBump,

    /// Re-derivation disagrees with the stored address
    #[error("audit mismatch: stored {stored} (bump {stored_bump}), derived {derived} (bump {derived_bump})")]
    AuditMismatch {
        /// Address on record
        stored: Pubkey,
        /// Bump on record
        stored_bump: u8,
        /// Freshly derived address
        derived: Pubkey,
        /// Freshly derived bump
        derived_bump: u8,
    },

    /// Address is a valid curve point, i.e. could be a signing key
    #[error("address {0} lies on the ed25519 curve")]
    OnCurve(Pubkey),
}
