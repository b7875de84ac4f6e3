//! Session layer configuration.

use std::time::Duration;

use sqlsession_pool::PoolConfig;

use crate::error::{Error, Result};
use crate::instrumentation::SanitizationConfig;

/// Configuration for a [`Db`](crate::Db).
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Value and object pool settings.
    pub pool: PoolConfig,

    /// Deadline applied to driver calls whose context carries none.
    ///
    /// `None` leaves such calls unbounded.
    pub command_timeout: Option<Duration>,

    /// Whether each query text gets its own timer.
    pub query_timers: bool,

    /// How statements are recorded on tracing spans.
    pub sanitization: SanitizationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            command_timeout: None,
            query_timers: true,
            sanitization: SanitizationConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the default command timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Enable or disable per-query timers.
    #[must_use]
    pub fn query_timers(mut self, enabled: bool) -> Self {
        self.query_timers = enabled;
        self
    }

    /// Set statement sanitization for tracing.
    #[must_use]
    pub fn sanitization(mut self, sanitization: SanitizationConfig) -> Self {
        self.sanitization = sanitization;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.pool
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        if self.command_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "command_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
