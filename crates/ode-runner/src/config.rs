//! Runner configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// Autonomous runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Agent id stamped on every entry this runner records
    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    /// Maximum successfully recorded entries per calendar day
    #[serde(default = "default_max_actions_per_day")]
    pub max_actions_per_day: u32,

    /// Seconds between cycle attempts
    #[serde(default = "default_observation_interval")]
    pub observation_interval_secs: u64,

    /// Upper bound on a single producer call, in seconds
    #[serde(default = "default_producer_timeout")]
    pub producer_timeout_secs: u64,

    /// Extra wait past local midnight once the quota is spent
    #[serde(default = "default_midnight_buffer")]
    pub midnight_buffer_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            max_actions_per_day: default_max_actions_per_day(),
            observation_interval_secs: default_observation_interval(),
            producer_timeout_secs: default_producer_timeout(),
            midnight_buffer_secs: default_midnight_buffer(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.agent_id.trim().is_empty() {
            return Err(RunnerError::Config("agent_id must not be empty".into()));
        }
        if self.max_actions_per_day < 1 {
            return Err(RunnerError::Config(
                "max_actions_per_day must be at least 1".into(),
            ));
        }
        if self.observation_interval_secs < 1 {
            return Err(RunnerError::Config(
                "observation_interval_secs must be at least 1".into(),
            ));
        }
        if self.producer_timeout_secs < 1 {
            return Err(RunnerError::Config(
                "producer_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.observation_interval_secs)
    }

    pub fn producer_timeout(&self) -> Duration {
        Duration::from_secs(self.producer_timeout_secs)
    }

    pub fn midnight_buffer(&self) -> Duration {
        Duration::from_secs(self.midnight_buffer_secs)
    }
}

fn default_agent_id() -> String {
    "obs_auto".to_string()
}

fn default_max_actions_per_day() -> u32 {
    3
}

// 24h spread over the default quota of 3.
fn default_observation_interval() -> u64 {
    8 * 60 * 60
}

fn default_producer_timeout() -> u64 {
    30
}

fn default_midnight_buffer() -> u64 {
    60
}
