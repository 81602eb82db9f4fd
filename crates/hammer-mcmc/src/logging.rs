//! Run-scoped logging.
//!
//! A run never touches the process-wide logger: when a level is configured a
//! fmt subscriber is installed for the calling thread and removed when the run
//! returns. [`WorkerPool`](crate::pool::WorkerPool) carries it onto its workers.

use hammer_core::errors::{ErrorInfo, HammerError};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Logging options carried by a run configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive such as `info` or `hammer_mcmc=debug`.
    ///
    /// `None` leaves the caller's dispatcher in place.
    #[serde(default)]
    pub level: Option<String>,
    /// Include event targets in formatted output.
    #[serde(default)]
    pub with_target: bool,
}

impl LogConfig {
    /// Configuration emitting events at `level` and above.
    pub fn at_level(level: impl Into<String>) -> Self {
        Self {
            level: Some(level.into()),
            with_target: false,
        }
    }

    /// Parses the configured directive, if any.
    pub fn filter(&self) -> Result<Option<EnvFilter>, HammerError> {
        self.level
            .as_deref()
            .map(|level| {
                EnvFilter::try_new(level).map_err(|err| {
                    HammerError::Config(
                        ErrorInfo::new("log-level", err.to_string()).with_context("level", level),
                    )
                })
            })
            .transpose()
    }
}

/// Runs `body` with the subscriber described by `config` as the thread default.
pub fn in_log_scope<T>(config: &LogConfig, body: impl FnOnce() -> T) -> Result<T, HammerError> {
    let Some(filter) = config.filter()? else {
        return Ok(body());
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_writer(std::io::stderr)
        .finish();
    Ok(tracing::subscriber::with_default(subscriber, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_directive_is_a_config_error() {
        let config = LogConfig::at_level("hammer=notalevel");
        let err = in_log_scope(&config, || ()).unwrap_err();
        assert_eq!(err.info().code, "log-level");
    }

    #[test]
    fn scope_returns_body_value() {
        assert_eq!(in_log_scope(&LogConfig::default(), || 7).unwrap(), 7);
        assert_eq!(in_log_scope(&LogConfig::at_level("debug"), || 8).unwrap(), 8);
    }
}
