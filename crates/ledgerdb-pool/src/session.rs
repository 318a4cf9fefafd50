//! Session entity and checkout handle.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use ledgerdb_rpc::{SessionId, TransactionId};

use crate::pool::SessionPool;

/// Which idle registry currently holds a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdleKind {
    /// The read-ready registry.
    Read,
    /// The write-ready registry (session carries an open transaction).
    Write,
}

/// One server-side session tracked by the pool.
///
/// Shared via `Arc` between the pool's registries, the health-check heap,
/// and at most one outstanding [`SessionHandle`]. All mutable state sits
/// behind one small mutex; the lock is only ever held for field access,
/// never across an await point, and never while another session's lock or
/// a pool-level lock is being taken.
pub(crate) struct Session {
    id: SessionId,
    created_at: Instant,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    /// False permanently once the session is destroyed or found broken.
    valid: bool,
    /// Present iff the session is write-prepared.
    transaction: Option<TransactionId>,
    /// Next scheduled health check.
    next_check: Instant,
    /// Position in the scheduler heap, -1 when not enqueued.
    heap_index: i64,
    /// Guards against concurrent duplicate pings.
    checking_health: bool,
    /// Idle-registry membership token, `None` while checked out.
    idle: Option<IdleKind>,
}

impl Session {
    pub(crate) fn new(id: SessionId, now: Instant) -> Self {
        Self {
            id,
            created_at: now,
            inner: Mutex::new(SessionInner {
                valid: true,
                transaction: None,
                next_check: now,
                heap_index: -1,
                checking_health: false,
                idle: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> &SessionId {
        &self.id
    }

    pub(crate) fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.inner.lock().valid
    }

    /// Mark the session permanently invalid, clearing any open transaction.
    ///
    /// Returns false if it was already invalid, making destruction
    /// idempotent: only the first caller gets to adjust pool counters.
    pub(crate) fn invalidate(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.valid {
            return false;
        }
        inner.valid = false;
        inner.transaction = None;
        true
    }

    pub(crate) fn transaction(&self) -> Option<TransactionId> {
        self.inner.lock().transaction.clone()
    }

    pub(crate) fn set_transaction(&self, txn: TransactionId) {
        self.inner.lock().transaction = Some(txn);
    }

    pub(crate) fn is_write_prepared(&self) -> bool {
        self.inner.lock().transaction.is_some()
    }

    pub(crate) fn next_check(&self) -> Instant {
        self.inner.lock().next_check
    }

    pub(crate) fn set_next_check(&self, at: Instant) {
        self.inner.lock().next_check = at;
    }

    pub(crate) fn is_check_due(&self, now: Instant) -> bool {
        self.inner.lock().next_check <= now
    }

    pub(crate) fn heap_index(&self) -> i64 {
        self.inner.lock().heap_index
    }

    pub(crate) fn set_heap_index(&self, index: i64) {
        self.inner.lock().heap_index = index;
    }

    /// Claim the right to ping this session. Returns false if another
    /// worker (or a racing `take`) is already checking it.
    pub(crate) fn claim_health_check(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.checking_health {
            return false;
        }
        inner.checking_health = true;
        true
    }

    pub(crate) fn finish_health_check(&self) {
        self.inner.lock().checking_health = false;
    }

    pub(crate) fn set_idle(&self, kind: Option<IdleKind>) {
        self.inner.lock().idle = kind;
    }

    pub(crate) fn take_idle(&self) -> Option<IdleKind> {
        self.inner.lock().idle.take()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("valid", &inner.valid)
            .field("write_prepared", &inner.transaction.is_some())
            .field("heap_index", &inner.heap_index)
            .finish()
    }
}

enum DropAction {
    Recycle,
    Destroy { expire: bool },
}

/// A session checked out of the pool.
///
/// Exactly one handle exists per checked-out session. Consuming it with
/// [`recycle`](SessionHandle::recycle) returns the session to the idle pool;
/// [`destroy`](SessionHandle::destroy) removes it permanently. Dropping the
/// handle without consuming it recycles, so a leaked handle cannot leak pool
/// capacity.
pub struct SessionHandle {
    pool: SessionPool,
    session: Arc<Session>,
    action: DropAction,
}

impl SessionHandle {
    pub(crate) fn new(pool: SessionPool, session: Arc<Session>) -> Self {
        Self {
            pool,
            session,
            action: DropAction::Recycle,
        }
    }

    /// The server-side id of the checked-out session.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        self.session.id()
    }

    /// The open transaction id, present iff the session is write-prepared.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.session.transaction()
    }

    /// Whether the session is still valid. A handle observes invalidity
    /// when the scheduler evicts a broken session or the pool is closed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.session.is_valid()
    }

    /// Return the session to the pool.
    pub fn recycle(self) {
        // Drop performs the recycle.
    }

    /// Permanently remove the session from the pool and, best-effort, from
    /// the server.
    pub fn destroy(mut self) {
        self.action = DropAction::Destroy { expire: false };
    }

    /// Report the session as already expired server-side and remove it.
    ///
    /// Unlike [`destroy`](SessionHandle::destroy), the pool may decline the
    /// removal when it would drop below `min_opened`; the session then
    /// returns to the idle pool and the scheduler re-verifies it.
    pub fn destroy_expired(mut self) {
        self.action = DropAction::Destroy { expire: true };
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        match self.action {
            DropAction::Recycle => {
                tracing::trace!(session = %self.session.id(), "returning session to pool");
                self.pool.recycle_session(&self.session);
            }
            DropAction::Destroy { expire } => {
                if !self.pool.destroy_session(&self.session, expire) && self.session.is_valid() {
                    // Removal declined at the min_opened floor; keep the
                    // session available rather than stranding it.
                    self.pool.recycle_session(&self.session);
                }
            }
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session", &self.session)
            .finish()
    }
}
