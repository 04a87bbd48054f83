//! Stream Errors
//!
//! Every failure a chat turn can run into. None of these are returned from
//! [`StreamController::start_stream`](crate::streaming::StreamController::start_stream);
//! they are captured into the observable `error` state and the exchange is
//! stopped. Callers observe rather than await a rejection.

use thiserror::Error;

/// Errors surfaced by a streaming chat turn
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// No bearer token is persisted. Terminal for the attempted turn: the
    /// user has to sign in again, nothing is retried.
    #[error("no login token found, please sign in again")]
    MissingCredential,

    /// The server answered the open request with a non-success status
    #[error("HTTP {status}")]
    OpenRejected {
        /// HTTP status code of the open acknowledgement
        status: u16,
    },

    /// The exchange failed after it was opened (network failure, malformed event)
    #[error("stream connection failed: {0}")]
    Transport(String),

    /// Persisted tenant data could not be parsed. Never fatal: the turn
    /// proceeds against the caller's default tenant.
    #[error("malformed tenant state: {0}")]
    MalformedTenantState(String),
}

impl StreamError {
    /// Whether this error ends the turn
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedTenantState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StreamError::OpenRejected { status: 401 }.to_string(), "HTTP 401");
        assert!(StreamError::Transport("reset".into())
            .to_string()
            .contains("reset"));
        assert!(StreamError::MissingCredential.to_string().contains("sign in"));
    }

    #[test]
    fn test_malformed_tenant_is_not_fatal() {
        assert!(!StreamError::MalformedTenantState("x".into()).is_fatal());
        assert!(StreamError::MissingCredential.is_fatal());
        assert!(StreamError::OpenRejected { status: 500 }.is_fatal());
    }
}
