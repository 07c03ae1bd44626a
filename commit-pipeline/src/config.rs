//! Configuration for the commit pipeline

use civic_core::Pubkey;
use ledger_adapter::RpcConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which ledger client to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMode {
    /// In-memory simulation
    Simulated,
    /// JSON-RPC ledger endpoint
    Rpc,
}

impl std::str::FromStr for ClientMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(ClientMode::Simulated),
            "rpc" => Ok(ClientMode::Rpc),
            other => Err(crate::Error::Config(format!("unknown client mode '{}'", other))),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Ledger client implementation
    pub client_mode: ClientMode,

    /// Authority keypair file (JSON array of 64 bytes); required in RPC mode
    pub authority_keypair_path: Option<PathBuf>,

    /// Report log interval (seconds)
    pub report_interval_seconds: u64,

    /// Ledger access
    pub ledger: LedgerConfig,

    /// Commit queue
    pub queue: QueueConfig,

    /// Explorer links
    pub explorer: ExplorerConfig,

    /// Health tracking
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "commit-pipeline".to_string(),
            client_mode: ClientMode::Simulated,
            authority_keypair_path: None,
            report_interval_seconds: 60,
            ledger: LedgerConfig::default(),
            queue: QueueConfig::default(),
            explorer: ExplorerConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Ledger access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Civic program identifier (base58)
    pub program_id: String,

    /// Commitment level
    pub commitment: String,

    /// Upper bound of one ledger call, lookup and submission included (seconds)
    pub call_timeout_seconds: u64,

    /// Confirmation polling window (seconds)
    pub confirmation_timeout_seconds: u64,

    /// Confirmation poll interval (milliseconds)
    pub confirmation_poll_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: ledger_adapter::DEFAULT_RPC_URL.to_string(),
            program_id: civic_core::DEFAULT_PROGRAM_ID.to_string(),
            commitment: "confirmed".to_string(),
            call_timeout_seconds: ledger_adapter::DEFAULT_REQUEST_TIMEOUT_SECONDS,
            confirmation_timeout_seconds: ledger_adapter::DEFAULT_CONFIRMATION_TIMEOUT_SECONDS,
            confirmation_poll_ms: ledger_adapter::DEFAULT_CONFIRMATION_POLL_MS,
        }
    }
}

/// Commit queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum pending operations
    pub capacity: usize,

    /// Worker attempts per queued operation
    pub max_attempts: u32,

    /// Worker sleep when the queue is empty (milliseconds)
    pub idle_interval_ms: u64,

    /// Pause after a transient failure (milliseconds)
    pub retry_pause_ms: u64,

    /// Dead letters, rejections and commits kept for inspection
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_attempts: 3,
            idle_interval_ms: 1000,
            retry_pause_ms: 500,
            history_limit: 100,
        }
    }
}

impl QueueConfig {
    /// Idle interval
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Retry pause
    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }
}

/// Explorer link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Explorer host
    pub host: String,

    /// Network name
    pub cluster: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            host: "explorer.solana.com".to_string(),
            cluster: "devnet".to_string(),
        }
    }
}

/// Health tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive transient failures before Degraded
    pub degraded_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: ledger_adapter::DEFAULT_DEGRADED_THRESHOLD,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("{}={}: {}", name, value, e)))
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables over defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `CIVIC_*` overrides from a variable lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> crate::Result<()> {
        if let Some(mode) = lookup("CIVIC_CLIENT_MODE") {
            self.client_mode = mode.parse()?;
        }

        if let Some(path) = lookup("CIVIC_AUTHORITY_KEYPAIR") {
            self.authority_keypair_path = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("CIVIC_RPC_URL") {
            self.ledger.rpc_url = url;
        }

        if let Some(program_id) = lookup("CIVIC_PROGRAM_ID") {
            self.ledger.program_id = program_id;
        }

        if let Some(commitment) = lookup("CIVIC_COMMITMENT") {
            self.ledger.commitment = commitment;
        }

        if let Some(value) = lookup("CIVIC_CALL_TIMEOUT_SECONDS") {
            self.ledger.call_timeout_seconds = parse_var("CIVIC_CALL_TIMEOUT_SECONDS", &value)?;
        }

        if let Some(value) = lookup("CIVIC_QUEUE_CAPACITY") {
            self.queue.capacity = parse_var("CIVIC_QUEUE_CAPACITY", &value)?;
        }

        if let Some(value) = lookup("CIVIC_MAX_ATTEMPTS") {
            self.queue.max_attempts = parse_var("CIVIC_MAX_ATTEMPTS", &value)?;
        }

        if let Some(host) = lookup("CIVIC_EXPLORER_HOST") {
            self.explorer.host = host;
        }

        if let Some(cluster) = lookup("CIVIC_CLUSTER") {
            self.explorer.cluster = cluster;
        }

        if let Some(value) = lookup("CIVIC_REPORT_INTERVAL_SECONDS") {
            self.report_interval_seconds = parse_var("CIVIC_REPORT_INTERVAL_SECONDS", &value)?;
        }

        Ok(())
    }

    /// Check value ranges and cross-field requirements
    pub fn validate(&self) -> crate::Result<()> {
        if self.queue.capacity == 0 {
            return Err(crate::Error::Config("queue.capacity must be positive".to_string()));
        }
        if self.queue.max_attempts == 0 {
            return Err(crate::Error::Config("queue.max_attempts must be at least 1".to_string()));
        }
        if !(1..=60).contains(&self.ledger.call_timeout_seconds) {
            return Err(crate::Error::Config(format!(
                "ledger.call_timeout_seconds must be within 1..=60, got {}",
                self.ledger.call_timeout_seconds
            )));
        }
        if !matches!(self.ledger.commitment.as_str(), "processed" | "confirmed" | "finalized") {
            return Err(crate::Error::Config(format!(
                "unknown commitment '{}'",
                self.ledger.commitment
            )));
        }
        self.program_id()?;
        if self.client_mode == ClientMode::Rpc && self.authority_keypair_path.is_none() {
            return Err(crate::Error::Config(
                "rpc mode needs authority_keypair_path".to_string(),
            ));
        }
        Ok(())
    }

    /// Program identifier
    pub fn program_id(&self) -> crate::Result<Pubkey> {
        self.ledger
            .program_id
            .parse()
            .map_err(|e| crate::Error::Config(format!("ledger.program_id: {}", e)))
    }

    /// Upper bound of one ledger call
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.call_timeout_seconds)
    }

    /// Settings for the JSON-RPC client
    pub fn rpc_config(&self) -> crate::Result<RpcConfig> {
        Ok(RpcConfig {
            url: self.ledger.rpc_url.clone(),
            program_id: self.program_id()?,
            commitment: self.ledger.commitment.clone(),
            timeout_seconds: self.ledger.call_timeout_seconds,
            confirmation_timeout_seconds: self.ledger.confirmation_timeout_seconds,
            confirmation_poll_ms: self.ledger.confirmation_poll_ms,
        })
    }
}
