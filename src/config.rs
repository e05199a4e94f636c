use std::time::Duration;

use crate::error::WatchError;

/// Per-chain tracking parameters.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Adapter-reported chain identity, also the storage namespace.
    pub chain: String,
    /// Blocks required before finality, inclusive of the observation block.
    /// A value of 1 would confirm immediately; anything below 2 is invalid.
    pub confirm_times: i64,
    /// How long a hash stays in the duplicate-suppression window.
    pub seen_ttl: Duration,
    /// How often the window is pruned.
    pub prune_interval: Duration,
}

impl ChainConfig {
    pub fn new(chain: impl Into<String>, confirm_times: i64) -> Self {
        Self {
            chain: chain.into(),
            confirm_times,
            seen_ttl: Duration::from_secs(180),
            prune_interval: Duration::from_secs(180),
        }
    }

    pub fn validate(&self) -> Result<(), WatchError> {
        if self.confirm_times < 2 {
            return Err(WatchError::InvalidConfirmTimes(self.confirm_times));
        }
        Ok(())
    }
}
