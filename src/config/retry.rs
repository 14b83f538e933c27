use std::time::Duration;

use config::ConfigError;
use rand::Rng;
use serde::Deserialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (0 means unlimited retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single attempt timeout (unit: milliseconds, 0 disables it)
    #[serde(default)]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: 0,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    /// Policy used for the first poll performed while the watcher starts.
    pub fn startup() -> Self {
        Self {
            max_retries: 5,
            timeout_ms: 0,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }

    /// Policy used between failed background poll cycles.
    pub fn error_backoff() -> Self {
        Self {
            max_retries: 0,
            timeout_ms: 0,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }

    /// Exponential delay before retry number `attempt + 1`: base * 2^attempt, capped.
    pub fn delay_for(
        &self,
        attempt: u32,
    ) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay_ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// [`Self::delay_for`] plus up to 10% random jitter.
    pub fn jittered_delay_for(
        &self,
        attempt: u32,
    ) -> Duration {
        let delay = self.delay_for(attempt);
        let spread_ms = (delay.as_millis() / 10) as u64;
        if spread_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread_ms))
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub(crate) fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}.base_delay_ms must be greater than 0"
            ))));
        }

        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}.base_delay_ms ({}) cannot exceed max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ))));
        }

        Ok(())
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
