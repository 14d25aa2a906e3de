//! Error types for minizero

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Validation Errors ===
    #[error("Invalid server id")]
    InvalidId,

    #[error("Invalid address")]
    InvalidAddress,

    // === Network Errors ===
    #[error("Unreachable address {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    /// The coordinator refused the request itself; resending it cannot help
    #[error("Request rejected: {0}")]
    Rejected(String),

    // === Caller Errors ===
    #[error("Request cancelled or deadline exceeded")]
    Cancelled,

    // === Durability Errors ===
    #[error("Commit log rejected proposal: {0}")]
    CommitLog(String),

    #[error("WAL error: {0}")]
    Wal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable short name, used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidId => "invalid_id",
            Error::InvalidAddress => "invalid_address",
            Error::Unreachable { .. } => "unreachable",
            Error::Http(_) => "http",
            Error::Rejected(_) => "rejected",
            Error::Cancelled => "cancelled",
            Error::CommitLog(_) => "commit_log",
            Error::Wal(_) => "wal",
            Error::Io(_) => "io",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Internal(_) => "internal",
        }
    }

    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Unreachable { .. } | Error::CommitLog(_) | Error::Http(_)
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::InvalidId
            | Error::InvalidAddress
            | Error::InvalidConfig(_)
            | Error::Rejected(_) => StatusCode::BAD_REQUEST,
            Error::Unreachable { .. } => StatusCode::BAD_GATEWAY,
            Error::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Error::CommitLog(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rebuild an error from the `kind` and message of an HTTP error body
    pub fn from_kind(kind: &str, message: String) -> Self {
        match kind {
            "invalid_id" => Error::InvalidId,
            "invalid_address" => Error::InvalidAddress,
            "unreachable" => Error::Unreachable {
                address: String::new(),
                reason: message,
            },
            "cancelled" => Error::Cancelled,
            "commit_log" => Error::CommitLog(message),
            "invalid_config" => Error::InvalidConfig(message),
            "http" => Error::Http(message),
            "rejected" => Error::Rejected(message),
            // Server-side faults (wal, io, internal) and kinds this client
            // does not know are not worth resending
            _ => Error::Internal(message),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Wal(format!("Codec error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_from_kind_retryability() {
        assert!(Error::from_kind("unreachable", "refused".into()).is_retryable());
        assert!(Error::from_kind("commit_log", "full".into()).is_retryable());
        assert!(Error::from_kind("http", "reset".into()).is_retryable());

        for kind in ["wal", "io", "internal", "rejected", "something_new"] {
            let err = Error::from_kind(kind, "boom".into());
            assert!(!err.is_retryable(), "{} should not be retried", kind);
        }
        assert!(matches!(
            Error::from_kind("invalid_id", String::new()),
            Error::InvalidId
        ));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::InvalidId.to_http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::InvalidAddress.to_http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::Cancelled.to_http_status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            Error::CommitLog("full".into()).to_http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_kind_roundtrips_through_http_body() {
        for err in [Error::InvalidId, Error::InvalidAddress, Error::Cancelled] {
            let rebuilt = Error::from_kind(err.kind(), err.to_string());
            assert_eq!(rebuilt.kind(), err.kind());
        }
        assert!(matches!(
            Error::from_kind("something_else", "boom".into()),
            Error::Http(_)
        ));
    }
}
