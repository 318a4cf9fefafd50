//! # ledgerdb-testing
//!
//! Test infrastructure for LedgerDB driver development.
//!
//! The centerpiece is [`MockSessionService`], an in-memory implementation of
//! the session service contract with journals and fault injection. It keeps
//! enough bookkeeping for tests to assert exactly which sessions exist on
//! the "server", which were pinged, and which were deleted, and it can fail
//! any method once or persistently.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ledgerdb_rpc::RpcError;
//! use ledgerdb_testing::MockSessionService;
//!
//! let mock = Arc::new(MockSessionService::new());
//! mock.inject_create_error(RpcError::unavailable("try later"), true);
//! // ... drive the pool against `mock` ...
//! mock.clear_create_error();
//! assert_eq!(mock.session_count(), 3);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

use ledgerdb_rpc::{RpcError, SessionId, SessionService, TransactionId};

/// An error armed on one mock method.
struct InjectedError {
    error: RpcError,
    /// Sticky errors fail every call until cleared; one-shot errors fail the
    /// next call only.
    sticky: bool,
}

fn take_injected(slot: &mut Option<InjectedError>) -> Option<RpcError> {
    let injected = slot.as_ref()?;
    let error = injected.error.clone();
    if !injected.sticky {
        *slot = None;
    }
    Some(error)
}

#[derive(Default)]
struct MockState {
    /// Sessions alive on the mock server, in creation order.
    sessions: Vec<SessionId>,
    /// Successful pings, in order.
    pings: Vec<SessionId>,
    /// Deleted sessions, in order.
    deletes: Vec<SessionId>,
    /// Requested size of every creation RPC.
    batch_sizes: Vec<usize>,
    next_txn: u64,
    create_error: Option<InjectedError>,
    ping_error: Option<InjectedError>,
    begin_error: Option<InjectedError>,
}

/// In-memory session service with journals and fault injection.
#[derive(Default)]
pub struct MockSessionService {
    state: Mutex<MockState>,
}

impl MockSessionService {
    /// Create an empty mock server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently alive on the mock server.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Sessions currently alive, in creation order.
    #[must_use]
    pub fn dump_sessions(&self) -> Vec<SessionId> {
        self.state.lock().sessions.clone()
    }

    /// Number of creation RPCs received.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.state.lock().batch_sizes.len()
    }

    /// Requested size of each creation RPC, in order.
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().batch_sizes.clone()
    }

    /// Sessions successfully pinged, in order.
    #[must_use]
    pub fn dump_pings(&self) -> Vec<SessionId> {
        self.state.lock().pings.clone()
    }

    /// Successful pings recorded for one session.
    #[must_use]
    pub fn ping_count(&self, session: &SessionId) -> usize {
        self.state
            .lock()
            .pings
            .iter()
            .filter(|pinged| *pinged == session)
            .count()
    }

    /// Forget all recorded pings.
    pub fn clear_pings(&self) {
        self.state.lock().pings.clear();
    }

    /// Sessions deleted via the service, in order.
    #[must_use]
    pub fn deleted_sessions(&self) -> Vec<SessionId> {
        self.state.lock().deletes.clone()
    }

    /// Drop `session` server-side without a delete RPC, as an expired
    /// session would be. Later pings and transactions on it fail with
    /// `SessionNotFound`. Returns false if the session was not alive.
    pub fn expire_session(&self, session: &SessionId) -> bool {
        let mut state = self.state.lock();
        match state.sessions.iter().position(|alive| alive == session) {
            Some(position) => {
                state.sessions.remove(position);
                true
            }
            None => false,
        }
    }

    /// Fail creation RPCs with `error`; persistently when `sticky`.
    pub fn inject_create_error(&self, error: RpcError, sticky: bool) {
        self.state.lock().create_error = Some(InjectedError { error, sticky });
    }

    /// Stop failing creation RPCs.
    pub fn clear_create_error(&self) {
        self.state.lock().create_error = None;
    }

    /// Fail ping RPCs with `error`; persistently when `sticky`.
    pub fn inject_ping_error(&self, error: RpcError, sticky: bool) {
        self.state.lock().ping_error = Some(InjectedError { error, sticky });
    }

    /// Stop failing ping RPCs.
    pub fn clear_ping_error(&self) {
        self.state.lock().ping_error = None;
    }

    /// Fail begin-transaction RPCs with `error`; persistently when `sticky`.
    pub fn inject_begin_error(&self, error: RpcError, sticky: bool) {
        self.state.lock().begin_error = Some(InjectedError { error, sticky });
    }

    /// Stop failing begin-transaction RPCs.
    pub fn clear_begin_error(&self) {
        self.state.lock().begin_error = None;
    }
}

#[async_trait]
impl SessionService for MockSessionService {
    async fn batch_create_sessions(&self, count: usize) -> Result<Vec<SessionId>, RpcError> {
        let mut state = self.state.lock();
        if let Some(error) = take_injected(&mut state.create_error) {
            tracing::debug!(%error, "mock failing batch_create_sessions");
            return Err(error);
        }
        state.batch_sizes.push(count);
        let ids: Vec<SessionId> = (0..count)
            .map(|_| SessionId::new(format!("sessions/{}", Uuid::new_v4().simple())))
            .collect();
        state.sessions.extend(ids.iter().cloned());
        Ok(ids)
    }

    async fn ping_session(&self, session: &SessionId) -> Result<(), RpcError> {
        let mut state = self.state.lock();
        if let Some(error) = take_injected(&mut state.ping_error) {
            tracing::debug!(%error, "mock failing ping_session");
            return Err(error);
        }
        if !state.sessions.contains(session) {
            return Err(RpcError::session_not_found(session.clone()));
        }
        state.pings.push(session.clone());
        Ok(())
    }

    async fn begin_transaction(&self, session: &SessionId) -> Result<TransactionId, RpcError> {
        let mut state = self.state.lock();
        if let Some(error) = take_injected(&mut state.begin_error) {
            tracing::debug!(%error, "mock failing begin_transaction");
            return Err(error);
        }
        if !state.sessions.contains(session) {
            return Err(RpcError::session_not_found(session.clone()));
        }
        state.next_txn += 1;
        Ok(TransactionId::new(Bytes::from(format!(
            "txn-{}",
            state.next_txn
        ))))
    }

    async fn delete_session(&self, session: &SessionId) -> Result<(), RpcError> {
        let mut state = self.state.lock();
        match state.sessions.iter().position(|alive| alive == session) {
            Some(position) => {
                state.sessions.remove(position);
                state.deletes.push(session.clone());
                Ok(())
            }
            None => Err(RpcError::session_not_found(session.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_create_ping_delete_roundtrip() {
        let mock = MockSessionService::new();
        let ids = mock.batch_create_sessions(3).await.unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(mock.session_count(), 3);
        assert_eq!(mock.batch_sizes(), vec![3]);

        mock.ping_session(&ids[0]).await.unwrap();
        assert_eq!(mock.ping_count(&ids[0]), 1);

        mock.delete_session(&ids[0]).await.unwrap();
        assert_eq!(mock.session_count(), 2);
        assert!(mock.ping_session(&ids[0]).await.unwrap_err().is_session_not_found());
    }

    #[tokio::test]
    async fn test_expired_session_is_not_found() {
        let mock = MockSessionService::new();
        let ids = mock.batch_create_sessions(1).await.unwrap();
        assert!(mock.expire_session(&ids[0]));
        assert!(!mock.expire_session(&ids[0]));
        assert!(mock.ping_session(&ids[0]).await.unwrap_err().is_session_not_found());
        assert!(
            mock.begin_transaction(&ids[0])
                .await
                .unwrap_err()
                .is_session_not_found()
        );
    }

    #[tokio::test]
    async fn test_one_shot_and_sticky_injection() {
        let mock = MockSessionService::new();
        mock.inject_create_error(RpcError::unavailable("try later"), false);
        assert!(mock.batch_create_sessions(1).await.unwrap_err().is_retryable());
        assert!(mock.batch_create_sessions(1).await.is_ok());

        mock.inject_create_error(RpcError::unavailable("down"), true);
        assert!(mock.batch_create_sessions(1).await.is_err());
        assert!(mock.batch_create_sessions(1).await.is_err());
        mock.clear_create_error();
        assert!(mock.batch_create_sessions(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_transactions_are_unique() {
        let mock = MockSessionService::new();
        let ids = mock.batch_create_sessions(1).await.unwrap();
        let first = mock.begin_transaction(&ids[0]).await.unwrap();
        let second = mock.begin_transaction(&ids[0]).await.unwrap();
        assert_ne!(first, second);
    }
}
