//! Error types for ledger access

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// RPC error codes that indicate a temporarily unavailable node or slot
const TRANSIENT_RPC_CODES: &[i64] = &[
    -32004, // block not available for slot
    -32005, // node is unhealthy / behind
    -32007, // slot skipped
    -32014, // block status not yet available
    -32603, // internal error
];

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger refused the operation (terminal, never retried)
    #[error("Rejected by ledger: {0}")]
    Rejected(String),

    /// Call exceeded its upper bound
    #[error("Timeout after {seconds}s: {operation}")]
    Timeout {
        /// Bound that was exceeded
        seconds: u64,
        /// Operation
        operation: String,
    },

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Rate limited by the RPC provider
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Response body
        message: String,
    },

    /// JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Error code
        code: i64,
        /// Message (with simulation details when present)
        message: String,
    },

    /// Transaction sent but not confirmed within the polling window
    #[error("Transaction {signature} not confirmed within {seconds}s")]
    Unconfirmed {
        /// Transaction signature
        signature: String,
        /// Polling window
        seconds: u64,
    },

    /// Response did not have the expected shape
    #[error("Invalid response to {method}: {message}")]
    InvalidResponse {
        /// RPC method
        method: String,
        /// What was wrong
        message: String,
    },

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Instruction or transaction could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Core error (identities, keypair)
    #[error(transparent)]
    Core(#[from] civic_core::Error),
}

impl Error {
    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout { .. }
            | Error::Connection(_)
            | Error::RateLimited(_)
            | Error::Unconfirmed { .. } => true,
            Error::HttpStatus { status, .. } => *status == 408 || *status >= 500,
            Error::Rpc { code, message } => {
                TRANSIENT_RPC_CODES.contains(code) || is_blockhash_expired(message)
            }
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Rejected(_)
            | Error::InvalidResponse { .. }
            | Error::Json(_)
            | Error::Encoding(_)
            | Error::Config(_)
            | Error::Core(_) => false,
        }
    }

    /// Whether the ledger reports that the target account already exists
    pub fn is_already_in_use(&self) -> bool {
        match self {
            Error::Rejected(message) | Error::Rpc { message, .. } => {
                message.contains("already in use")
            }
            _ => false,
        }
    }
}

fn is_blockhash_expired(message: &str) -> bool {
    message.contains("Blockhash not found") || message.contains("BlockhashNotFound")
}
