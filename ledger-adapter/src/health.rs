//! Ledger service health tracking
//!
//! Uninitialized until the first ledger interaction. Any answer from the
//! ledger (success or rejection) makes it Operational; a run of consecutive
//! transient failures makes it Degraded.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Last-known ledger service health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealth {
    /// No interaction yet
    Uninitialized,
    /// Ledger answering
    Operational,
    /// Consecutive transient failures reached the threshold
    Degraded,
}

/// Point-in-time health view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Status
    pub status: ServiceHealth,
    /// Transient failures since the last answer
    pub consecutive_failures: u32,
    /// Last successful interaction
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last transient failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Last transient error message
    pub last_error: Option<String>,
}

/// Health monitor shared by every ledger caller
#[derive(Debug)]
pub struct HealthMonitor {
    state: Mutex<HealthSnapshot>,
    degraded_threshold: u32,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DEGRADED_THRESHOLD)
    }
}

impl HealthMonitor {
    /// Create new monitor
    pub fn new(degraded_threshold: u32) -> Self {
        Self {
            state: Mutex::new(HealthSnapshot {
                status: ServiceHealth::Uninitialized,
                consecutive_failures: 0,
                last_success_at: None,
                last_failure_at: None,
                last_error: None,
            }),
            degraded_threshold: degraded_threshold.max(1),
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.status != ServiceHealth::Operational {
            info!(previous = ?state.status, "Ledger service operational");
        }
        state.status = ServiceHealth::Operational;
        state.consecutive_failures = 0;
        state.last_success_at = Some(Utc::now());
    }

    /// Record a permanent rejection (the ledger answered)
    pub fn record_rejection(&self) {
        let mut state = self.state.lock();
        state.status = ServiceHealth::Operational;
        state.consecutive_failures = 0;
    }

    /// Record a transient failure
    pub fn record_transient_failure(&self, error: &str) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        state.last_failure_at = Some(Utc::now());
        state.last_error = Some(error.to_string());

        if state.consecutive_failures >= self.degraded_threshold && state.status != ServiceHealth::Degraded {
            warn!(
                failures = state.consecutive_failures,
                error, "Ledger service degraded"
            );
            state.status = ServiceHealth::Degraded;
        }
    }

    /// Current status
    pub fn status(&self) -> ServiceHealth {
        self.state.lock().status
    }

    /// Full snapshot
    pub fn snapshot(&self) -> HealthSnapshot {
        self.state.lock().clone()
    }
}
