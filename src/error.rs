//! Error types for the pipeline core.

use std::time::Duration;
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline error types.
///
/// Per-stream and per-channel failures (`Probe`, `Repository`) are
/// absorbed close to where they occur and never halt the scheduling
/// loop; only `Config` and `Conflict` are surfaced synchronously to
/// callers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("global action already in progress")]
    Conflict,

    #[error("service is not running")]
    NotRunning,

    #[error("invalid schedule: {0}")]
    Scheduling(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    pub fn scheduling(msg: impl Into<String>) -> Self {
        Self::Scheduling(msg.into())
    }

    /// True for errors that are absorbed by the loops rather than
    /// returned to API callers.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Probe(_) | Self::ProbeTimeout(_) | Self::Repository(_) | Self::Scheduling(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Probe("decode".into()).is_transient());
        assert!(Error::ProbeTimeout(Duration::from_secs(30)).is_transient());
        assert!(Error::repository("listing failed").is_transient());
        assert!(!Error::Conflict.is_transient());
        assert!(!Error::config("bad weights").is_transient());
    }
}
