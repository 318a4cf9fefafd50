//! The session service contract.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::RpcError;

/// Opaque identifier of a server-side session.
///
/// The server assigns ids at creation time and they never change afterwards.
/// The driver treats the content as opaque; it only ever echoes ids back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a server-assigned session id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a transaction begun on a session.
///
/// Returned by [`SessionService::begin_transaction`] and attached to the
/// first write the caller performs. Opaque bytes, cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionId(Bytes);

impl TransactionId {
    /// Wrap a server-assigned transaction id.
    #[must_use]
    pub fn new(id: impl Into<Bytes>) -> Self {
        Self(id.into())
    }

    /// The raw id bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Operations the session pool requires from the backend.
///
/// All methods map one-to-one onto service RPCs. Implementations must be
/// safe to call concurrently; the pool issues creations, pings, and
/// deletions from multiple tasks at once.
#[async_trait]
pub trait SessionService: Send + Sync + 'static {
    /// Create `count` sessions in one request and return their ids.
    ///
    /// Creating a session is the expensive round trip the pool exists to
    /// amortize; callers batch wherever possible.
    async fn batch_create_sessions(&self, count: usize) -> Result<Vec<SessionId>, RpcError>;

    /// Verify that `session` is still alive on the server.
    ///
    /// Returns [`RpcError::SessionNotFound`] once the server has dropped it.
    async fn ping_session(&self, session: &SessionId) -> Result<(), RpcError>;

    /// Begin a read-write transaction on `session`.
    async fn begin_transaction(&self, session: &SessionId) -> Result<TransactionId, RpcError>;

    /// Delete `session` on the server.
    ///
    /// The pool calls this best-effort; failures are logged and dropped.
    async fn delete_session(&self, session: &SessionId) -> Result<(), RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new("sessions/abc");
        assert_eq!(id.as_str(), "sessions/abc");
        assert_eq!(id.to_string(), "sessions/abc");
    }

    #[test]
    fn test_transaction_id_bytes() {
        let txn = TransactionId::new(Bytes::from_static(b"txn-1"));
        assert_eq!(txn.as_bytes(), b"txn-1");
    }
}
