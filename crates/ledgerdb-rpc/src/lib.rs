//! # ledgerdb-rpc
//!
//! Abstract RPC contract between the LedgerDB driver and the session
//! service.
//!
//! The driver never talks to a transport directly; everything it needs from
//! the backend is expressed by the [`SessionService`] trait. Production
//! builds implement it over the wire protocol, tests implement it in memory.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledgerdb_rpc::{RpcError, SessionId, SessionService};
//!
//! async fn roll_call(svc: &dyn SessionService, id: &SessionId) -> Result<(), RpcError> {
//!     svc.ping_session(id).await
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod service;

pub use error::RpcError;
pub use service::{SessionId, SessionService, TransactionId};
