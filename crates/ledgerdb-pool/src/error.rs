//! Pool error types.

use ledgerdb_rpc::RpcError;
use thiserror::Error;

/// Errors surfaced by the session pool.
///
/// Configuration variants are fatal at construction and never retried.
/// [`GetSessionTimeout`](PoolError::GetSessionTimeout) is the only error a
/// healthy pool returns from `take`; callers may retry it.
/// [`InvalidPool`](PoolError::InvalidPool) is terminal: the pool has been
/// closed. Internal maintenance and health-check failures are logged and
/// absorbed rather than surfaced here.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `min_opened` exceeds a bounded `max_opened`.
    #[error("min_opened ({min_opened}) must not exceed max_opened ({max_opened})")]
    MinOpenedGreaterThanMaxOpened {
        /// Configured floor.
        min_opened: u64,
        /// Configured ceiling.
        max_opened: u64,
    },

    /// `write_sessions` is outside `[0.0, 1.0]`.
    #[error("write_sessions must be within [0.0, 1.0], got {0}")]
    WriteFractionOutOfRange(f64),

    /// No session became available before the acquisition deadline.
    #[error("timed out waiting for a session")]
    GetSessionTimeout,

    /// The pool has been closed.
    #[error("session pool is invalid")]
    InvalidPool,

    /// A backend RPC on the caller's path failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_names_fields() {
        let err = PoolError::MinOpenedGreaterThanMaxOpened {
            min_opened: 10,
            max_opened: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("min_opened (10)"));
        assert!(msg.contains("max_opened (5)"));
    }

    #[test]
    fn test_rpc_error_is_transparent() {
        let err: PoolError = RpcError::unavailable("try later").into();
        assert_eq!(err.to_string(), "service unavailable: try later");
    }
}
