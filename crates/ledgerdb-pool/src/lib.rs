//! # ledgerdb-pool
//!
//! Session pool for the LedgerDB driver.
//!
//! LedgerDB requires a server-side session for every operation. Sessions are
//! expensive to create, expire when unused, and the server caps how many a
//! client may hold. This crate keeps a bounded, warm, partially
//! write-prepared set of sessions ready for callers:
//!
//! - `take`/`take_write_session` hand out checked sessions with bounded
//!   latency and never return a session that failed its most recent check
//! - a scheduler pings every live session on a deadline heap, evicting the
//!   ones the server has dropped and pre-preparing a configurable fraction
//!   for write transactions
//! - a maintainer samples checkout pressure and grows or shrinks the pool
//!   with hysteresis, so a traffic spike is not followed by a delete storm
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ledgerdb_pool::{SessionPool, SessionPoolConfig};
//!
//! let config = SessionPoolConfig::new()
//!     .min_opened(25)
//!     .max_opened(100)
//!     .write_sessions(0.2);
//!
//! let pool = SessionPool::new(backend, config).await?;
//!
//! let session = pool.take().await?;
//! // ... run reads with session.id() ...
//! session.recycle();
//!
//! let writer = pool.take_write_session().await?;
//! // writer.transaction_id() is already populated
//! writer.recycle();
//!
//! pool.close().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
mod healthcheck;
mod maintainer;
pub mod pool;
pub mod session;

// Configuration
pub use config::SessionPoolConfig;

// Error types
pub use error::PoolError;

// Pool types
pub use pool::{PoolMetrics, PoolStatus, SessionPool};

// Checkout token
pub use session::SessionHandle;

// Re-export the backend contract so consumers only need this crate.
pub use ledgerdb_rpc::{RpcError, SessionId, SessionService, TransactionId};
