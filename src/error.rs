//! Error types for filevine-dl
//!
//! The taxonomy follows how far a failure is allowed to propagate:
//! - [`Error::Auth`] and [`Error::Destination`] abort the whole run
//! - [`Error::Structural`] abandons one sub-tree (fatal only at the project root)
//! - [`Error::Transient`] is retried and becomes a per-item failure when exhausted
//! - [`Error::Request`] and filesystem errors become per-item failures

use crate::report::RunReport;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for filevine-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for filevine-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.workers")
        key: Option<String>,
    },

    /// Token exchange or authorization failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The remote tree is malformed (cycle, unknown parent, duplicate id)
    #[error("malformed folder tree: {0}")]
    Structural(String),

    /// Rate limiting, server error or network failure; retried by the client
    #[error("transient failure: {message}")]
    Transient {
        /// HTTP status, when the failure was a response rather than a network error
        status: Option<u16>,
        /// Human-readable description
        message: String,
    },

    /// Non-retryable API rejection (400, 403, 404, ...)
    #[error("request to {path} rejected with {status}: {message}")]
    Request {
        /// HTTP status code returned by the API
        status: u16,
        /// The API path or URL that was requested
        path: String,
        /// Response body excerpt or reason
        message: String,
    },

    /// The destination root could not be created or written
    #[error("cannot use destination {path}: {source}")]
    Destination {
        /// The destination root
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error that is not classified as transient
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Downloads were stopped by an authentication failure
    ///
    /// Carries the report of everything that finished before the stop.
    #[error("downloads aborted: {cause}")]
    Aborted {
        /// Outcomes of the documents handled before the stop
        report: Box<RunReport>,
        /// The authentication failure that stopped dispatch
        #[source]
        cause: AuthError,
    },

    /// The run was cancelled before the operation could start
    #[error("cancelled")]
    Cancelled,
}

/// Authentication failure
///
/// `Clone` so that a single in-flight token exchange can hand the same failure
/// to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication failed: {message}")]
pub struct AuthError {
    /// HTTP status returned by the auth or API endpoint, if any
    pub status: Option<u16>,
    /// Human-readable reason
    pub message: String,
}

impl AuthError {
    /// Create an auth error without an HTTP status
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Create an auth error carrying the HTTP status that caused it
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl Error {
    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error must abort the whole run rather than a single item
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Auth(_)
                | Error::Aborted { .. }
                | Error::Destination { .. }
                | Error::Config { .. }
        )
    }

    /// The partial report carried by an aborted run
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Error::Aborted { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Classify a reqwest error: timeouts and connection failures are transient
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            Error::Transient {
                status: None,
                message: e.to_string(),
            }
        } else {
            Error::Network(e)
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_destination_errors_are_fatal() {
        assert!(Error::Auth(AuthError::new("bad pat")).is_fatal());
        assert!(
            Error::Destination {
                path: PathBuf::from("/nope"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            }
            .is_fatal()
        );
        assert!(Error::config("download.workers", "must be at least 1").is_fatal());
    }

    #[test]
    fn aborted_run_keeps_its_report() {
        let e = Error::Aborted {
            report: Box::new(RunReport::summarize(Vec::new(), Vec::new())),
            cause: AuthError::with_status(401, "revoked"),
        };
        assert!(e.is_fatal());
        assert_eq!(e.report().map(|r| r.outcomes.len()), Some(0));
        assert_eq!(
            e.to_string(),
            "downloads aborted: authentication failed: revoked"
        );
        assert!(Error::Cancelled.report().is_none());
    }

    #[test]
    fn per_item_errors_are_not_fatal() {
        let errors = vec![
            Error::Structural("cycle".into()),
            Error::Transient {
                status: Some(503),
                message: "unavailable".into(),
            },
            Error::Request {
                status: 404,
                path: "Documents/1/locator".into(),
                message: "not found".into(),
            },
            Error::Io(std::io::Error::other("disk full")),
            Error::Cancelled,
        ];
        for e in errors {
            assert!(!e.is_fatal(), "{e} should not be fatal");
        }
    }

    #[test]
    fn auth_error_display_includes_reason() {
        let e = Error::from(AuthError::with_status(400, "invalid_grant"));
        assert_eq!(e.to_string(), "authentication failed: invalid_grant");
    }

    #[test]
    fn request_error_display_names_path_and_status() {
        let e = Error::Request {
            status: 403,
            path: "Folders/7/children".into(),
            message: "forbidden".into(),
        };
        assert_eq!(
            e.to_string(),
            "request to Folders/7/children rejected with 403: forbidden"
        );
    }
}
