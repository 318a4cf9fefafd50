//! Session service error types.

use thiserror::Error;

use crate::service::SessionId;

/// Errors returned by the LedgerDB session service.
///
/// The variants mirror the status classes the service actually distinguishes:
/// a session the server no longer knows, a transient outage, a rejected
/// request, and a transport failure. Callers that only care about the
/// classification should use [`is_session_not_found`](RpcError::is_session_not_found)
/// and [`is_retryable`](RpcError::is_retryable) rather than matching variants.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The referenced session does not exist on the server (expired, deleted,
    /// or never created).
    #[error("session not found: {id}")]
    SessionNotFound {
        /// The session the server rejected.
        id: SessionId,
    },

    /// The service is temporarily unable to handle the request.
    #[error("service unavailable: {reason}")]
    Unavailable {
        /// Server-provided detail.
        reason: String,
    },

    /// The request was malformed or rejected outright.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Server-provided detail.
        reason: String,
    },

    /// Transport-level failure before a response was received.
    #[error("transport error: {reason}")]
    Transport {
        /// Underlying failure description.
        reason: String,
    },
}

impl RpcError {
    /// Build a [`RpcError::SessionNotFound`] for `id`.
    #[must_use]
    pub fn session_not_found(id: SessionId) -> Self {
        Self::SessionNotFound { id }
    }

    /// Build a [`RpcError::Unavailable`] with the given reason.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Build a [`RpcError::Transport`] with the given reason.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Whether this error means the session is gone on the server.
    #[must_use]
    pub fn is_session_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound { .. })
    }

    /// Whether the request may be retried as-is with a chance of success.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let gone = RpcError::session_not_found(SessionId::new("sessions/42"));
        assert!(gone.is_session_not_found());
        assert!(!gone.is_retryable());

        let busy = RpcError::unavailable("try later");
        assert!(busy.is_retryable());
        assert!(!busy.is_session_not_found());

        let broken = RpcError::transport("connection reset");
        assert!(!broken.is_retryable());
    }

    #[test]
    fn test_error_display_includes_detail() {
        let err = RpcError::unavailable("overloaded");
        assert_eq!(err.to_string(), "service unavailable: overloaded");
    }
}
