//! Application state for API handlers

use std::sync::Arc;

use ode_feed::LiveFeed;
use ode_ledger::Ledger;
use ode_runner::RunnerStatus;
use tokio::sync::watch;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The ledger served by this daemon
    pub ledger: Arc<Ledger>,

    /// Live feed behind `/ws`
    pub feed: Arc<LiveFeed>,

    /// Status snapshots from the autonomous runner, if one is running
    pub runner_status: Option<watch::Receiver<RunnerStatus>>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        ledger: Arc<Ledger>,
        feed: Arc<LiveFeed>,
        runner_status: Option<watch::Receiver<RunnerStatus>>,
    ) -> Self {
        Self {
            ledger,
            feed,
            runner_status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
