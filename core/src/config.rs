use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_CHUNK_SIZE: u64 = 512 * 1024;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chunk_size: u64,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
    /// Length of one backoff step; the first retry waits one unit.
    pub backoff_unit: Duration,
    pub backoff_ceiling_units: u32,
    /// `None` retries a failing chunk forever.
    pub max_attempts: Option<u32>,
    pub sample_interval: Duration,
    /// Where `.part` files go. Defaults to the destination's directory.
    pub temp_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            user_agent: "mfetch/0.1".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            backoff_unit: Duration::from_secs(1),
            backoff_ceiling_units: 32,
            max_attempts: None,
            sample_interval: Duration::from_secs(2),
            temp_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.chunk_size == 0 {
            return Err(CoreError::InvalidConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.backoff_ceiling_units == 0 {
            return Err(CoreError::InvalidConfig(
                "backoff ceiling must be at least one unit".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(CoreError::InvalidConfig(
                "max attempts must be at least one".to_string(),
            ));
        }
        if self.sample_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "sample interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
