use std::time::Duration;

use referrer_model::{ErrorKind, Failure};
use thiserror::Error;

/// Error returned to callers of the resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferrerError {
    /// The query resolved to a cached failure.
    #[error("{0}")]
    Resolved(Failure),

    #[error("install referrer did not resolve within {0:?}")]
    TimedOut(Duration),

    /// The resolver was torn down while this caller was queued.
    #[error("install referrer session was torn down before resolving")]
    Abandoned,
}

impl ReferrerError {
    /// Category callers branch on. Caller-side conditions report `Unknown`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReferrerError::Resolved(failure) => failure.kind,
            ReferrerError::TimedOut(_) | ReferrerError::Abandoned => {
                ErrorKind::Unknown
            }
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Collapse into the `(kind, message)` pair exposed across the plugin
    /// boundary.
    pub fn to_failure(&self) -> Failure {
        match self {
            ReferrerError::Resolved(failure) => failure.clone(),
            ReferrerError::TimedOut(_) => {
                Failure::new(ErrorKind::Unknown, self.to_string())
            }
            ReferrerError::Abandoned => Failure::unexpected_state(),
        }
    }
}

impl From<Failure> for ReferrerError {
    fn from(failure: Failure) -> Self {
        ReferrerError::Resolved(failure)
    }
}

pub type Result<T> = std::result::Result<T, ReferrerError>;
