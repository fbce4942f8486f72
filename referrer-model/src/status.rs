use std::fmt::{self, Display};

/// Response code delivered by the referrer service when a connection
/// attempt finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusCode {
    /// Connection established; the payload can be read.
    Ok,
    ServiceDisconnected,
    ServiceUnavailable,
    FeatureNotSupported,
    DeveloperError,
    PermissionError,
    /// A code this model does not know about.
    Other(i32),
}

impl StatusCode {
    /// Decode the service's integer response code.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => StatusCode::Ok,
            1 => StatusCode::ServiceUnavailable,
            2 => StatusCode::FeatureNotSupported,
            3 => StatusCode::DeveloperError,
            4 => StatusCode::PermissionError,
            -1 => StatusCode::ServiceDisconnected,
            other => StatusCode::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::ServiceUnavailable => 1,
            StatusCode::FeatureNotSupported => 2,
            StatusCode::DeveloperError => 3,
            StatusCode::PermissionError => 4,
            StatusCode::ServiceDisconnected => -1,
            StatusCode::Other(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        StatusCode::from_raw(code)
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "OK"),
            StatusCode::ServiceDisconnected => write!(f, "SERVICE_DISCONNECTED"),
            StatusCode::ServiceUnavailable => write!(f, "SERVICE_UNAVAILABLE"),
            StatusCode::FeatureNotSupported => {
                write!(f, "FEATURE_NOT_SUPPORTED")
            }
            StatusCode::DeveloperError => write!(f, "DEVELOPER_ERROR"),
            StatusCode::PermissionError => write!(f, "PERMISSION_ERROR"),
            StatusCode::Other(code) => write!(f, "UNRECOGNIZED({code})"),
        }
    }
}
