//! Error types for the commit pipeline

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum Error {
    /// Core error (identities, keypair files)
    #[error(transparent)]
    Core(#[from] civic_core::Error),

    /// Address derivation failed (fatal to the operation)
    #[error("Address derivation failed: {0}")]
    AddressDerivation(#[from] civic_core::AddressError),

    /// Ledger client error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_adapter::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker error
    #[error("Worker error: {0}")]
    Worker(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
