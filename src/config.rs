use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MINING_POLL_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_CODE_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatcherConfig {
    /// How often the mining wait ticks
    pub mining_poll_interval_ms: u64,
    /// How often the code at the deployed address is checked
    pub code_poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mining_poll_interval_ms: DEFAULT_MINING_POLL_INTERVAL_MS,
            code_poll_interval_ms: DEFAULT_CODE_POLL_INTERVAL_MS,
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.mining_poll_interval_ms == 0 {
            eyre::bail!("miningPollIntervalMs must be greater than zero");
        }

        if self.code_poll_interval_ms == 0 {
            eyre::bail!("codePollIntervalMs must be greater than zero");
        }

        Ok(())
    }

    pub fn mining_poll_interval(&self) -> Duration {
        Duration::from_millis(self.mining_poll_interval_ms.max(1))
    }

    pub fn code_poll_interval(&self) -> Duration {
        Duration::from_millis(self.code_poll_interval_ms.max(1))
    }
}
