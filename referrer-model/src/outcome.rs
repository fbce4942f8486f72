use std::fmt::{self, Display};

use crate::{payload::AttributionPayload, status::StatusCode};

/// Failure categories a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ErrorKind {
    /// The service connection died while reading the payload.
    DeadObject,
    /// The payload read failed on the remote side.
    RemoteError,
    /// The connection was already released when the payload was due.
    BadState,
    ServiceDisconnected,
    ServiceUnavailable,
    FeatureNotSupported,
    DeveloperError,
    PermissionError,
    Unknown,
}

impl ErrorKind {
    /// Stable string code surfaced to callers.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::DeadObject => "DEAD_OBJECT",
            ErrorKind::RemoteError => "REMOTE_ERROR",
            ErrorKind::BadState => "BAD_STATE",
            ErrorKind::ServiceDisconnected => "SERVICE_DISCONNECTED",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::FeatureNotSupported => "FEATURE_NOT_SUPPORTED",
            ErrorKind::DeveloperError => "DEVELOPER_ERROR",
            ErrorKind::PermissionError => "PERMISSION_ERROR",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A categorized failure together with its human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure for a non-OK completion status.
    ///
    /// Returns `None` for [`StatusCode::Ok`], which is resolved by reading
    /// the payload instead.
    pub fn for_status(status: StatusCode) -> Option<Self> {
        let (kind, message) = match status {
            StatusCode::Ok => return None,
            StatusCode::ServiceDisconnected => (
                ErrorKind::ServiceDisconnected,
                "service not connected, potentially transient",
            ),
            StatusCode::ServiceUnavailable => (
                ErrorKind::ServiceUnavailable,
                "connection couldn't be established",
            ),
            StatusCode::FeatureNotSupported => (
                ErrorKind::FeatureNotSupported,
                "API not available on current service version",
            ),
            StatusCode::DeveloperError => {
                (ErrorKind::DeveloperError, "incorrect usage")
            }
            StatusCode::PermissionError => {
                (ErrorKind::PermissionError, "not allowed to bind to service")
            }
            StatusCode::Other(_) => (ErrorKind::Unknown, "unknown response code"),
        };
        Some(Self::new(kind, message))
    }

    /// Fallback for a caller whose result vanished without being resolved.
    pub fn unexpected_state() -> Self {
        Self::new(ErrorKind::Unknown, "Unexpected null state")
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

/// Resolved result of the one-shot attribution query.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "outcome", rename_all = "lowercase"))]
pub enum Outcome {
    Success(AttributionPayload),
    Failure(Failure),
}

impl Outcome {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Outcome::Failure(Failure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Error kind for a failure, `None` on success.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure.kind),
        }
    }

    pub fn into_result(self) -> Result<AttributionPayload, Failure> {
        match self {
            Outcome::Success(payload) => Ok(payload),
            Outcome::Failure(failure) => Err(failure),
        }
    }
}

impl From<Failure> for Outcome {
    fn from(failure: Failure) -> Self {
        Outcome::Failure(failure)
    }
}
