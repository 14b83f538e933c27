//! Configuration management for the key-value watcher.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. `config/kv_watch` file in the working directory (optional)
//! 3. Explicit config file passed to [`WatchConfig::load`]
//! 4. Environment variables prefixed with `KV_WATCH__` (highest priority)

mod retry;
pub use retry::*;


//---
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Error;
use crate::Result;

const DEFAULT_CONFIG_FILE: &str = "config/kv_watch";
const ENV_PREFIX: &str = "KV_WATCH";

/// Slack added on top of the long-poll wait before a listing call is
/// considered hung.
const LIST_DEADLINE_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Watched key prefix, without trailing separator (e.g. `my-app/config`)
    #[serde(default)]
    pub root_path: String,

    /// Upper bound between two poll cycles; doubles as the long-poll wait
    /// handed to the store when `blocking` is set
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    /// Ask the store to hold the listing until something changes
    #[serde(default = "default_blocking")]
    pub blocking: bool,

    /// Give up after a single failed first poll during `start`
    #[serde(default)]
    pub fail_fast: bool,

    /// Treat a fetch failure while running as terminal
    #[serde(default)]
    pub fatal_fetch_errors: bool,

    /// Retries of the first poll when not failing fast
    #[serde(default = "BackoffPolicy::startup")]
    pub startup_retry: BackoffPolicy,

    /// Delay schedule after failed background cycles
    #[serde(default = "BackoffPolicy::error_backoff")]
    pub error_backoff: BackoffPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root_path: String::new(),
            watch_interval_ms: default_watch_interval_ms(),
            blocking: default_blocking(),
            fail_fast: false,
            fatal_fetch_errors: false,
            startup_retry: BackoffPolicy::startup(),
            error_backoff: BackoffPolicy::error_backoff(),
        }
    }
}

impl WatchConfig {
    /// Creates a validated configuration watching `root_path` with default
    /// settings otherwise.
    pub fn new(root_path: impl Into<String>) -> Result<Self> {
        Self {
            root_path: root_path.into(),
            ..Self::default()
        }
        .into_validated()
    }

    /// Load configuration from multiple sources with priority:
    /// 1. Serde defaults
    /// 2. `config/kv_watch.*` (optional)
    /// 3. `path`, when given (required)
    /// 4. Environment variables, e.g. `KV_WATCH__ROOT_PATH`,
    ///    `KV_WATCH__STARTUP_RETRY__MAX_RETRIES`
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.into_validated()
    }

    pub fn with_watch_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.watch_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_blocking(
        mut self,
        blocking: bool,
    ) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_fail_fast(
        mut self,
        fail_fast: bool,
    ) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_fatal_fetch_errors(
        mut self,
        fatal: bool,
    ) -> Self {
        self.fatal_fetch_errors = fatal;
        self
    }

    pub fn with_startup_retry(
        mut self,
        policy: BackoffPolicy,
    ) -> Self {
        self.startup_retry = policy;
        self
    }

    pub fn with_error_backoff(
        mut self,
        policy: BackoffPolicy,
    ) -> Self {
        self.error_backoff = policy;
        self
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    /// Wait handed to the listing client, `None` for non-blocking polling.
    pub fn long_poll_wait(&self) -> Option<Duration> {
        self.blocking.then(|| self.watch_interval())
    }

    /// Hard deadline for one listing call. Stores add up to wait/16 of
    /// jitter to a blocking query, plus a fixed slack for the round trip.
    pub fn list_deadline(&self) -> Duration {
        let interval = self.watch_interval();
        interval
            .saturating_add(interval / 16)
            .saturating_add(LIST_DEADLINE_SLACK)
    }

    /// Retry policy of the first poll, honouring `fail_fast`.
    pub fn effective_startup_retry(&self) -> BackoffPolicy {
        if self.fail_fast {
            BackoffPolicy {
                max_retries: 1,
                ..self.startup_retry
            }
        } else {
            self.startup_retry
        }
    }

    /// Validates the watcher configuration
    pub fn validate(&self) -> Result<()> {
        if self.root_path.trim_end_matches('/').is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "root_path cannot be empty".into(),
            )));
        }

        if self.watch_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch_interval_ms must be at least 1ms".into(),
            )));
        }

        self.startup_retry.validate("startup_retry")?;
        self.error_backoff.validate("error_backoff")?;

        Ok(())
    }

    fn normalized(mut self) -> Self {
        let trimmed = self.root_path.trim_end_matches('/').len();
        self.root_path.truncate(trimmed);
        self
    }

    /// Trims trailing separators from `root_path`, then validates.
    pub(crate) fn into_validated(self) -> Result<Self> {
        self.normalized().validated()
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }
}

fn default_watch_interval_ms() -> u64 {
    10_000
}
fn default_blocking() -> bool {
    true
}
