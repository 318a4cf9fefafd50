//! Session pool implementation.
//!
//! The pool hands out server-side sessions through [`SessionHandle`]s,
//! creates new ones on demand behind a burst limiter, and shares its state
//! with the health-check scheduler and the maintainer. One mutex guards the
//! registries and counters; it is only ever held for pointer and counter
//! manipulation, never across a network call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use ledgerdb_rpc::{RpcError, SessionId, SessionService};

use crate::config::SessionPoolConfig;
use crate::error::PoolError;
use crate::healthcheck::{HealthChecker, run_worker};
use crate::maintainer::{MaintenanceWindow, run_maintainer};
use crate::session::{IdleKind, Session, SessionHandle};

/// First retry delay when session creation hits a transient outage.
const CREATE_RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Ceiling on the creation retry delay.
const CREATE_RETRY_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// A pool of LedgerDB sessions.
///
/// Cheap to clone; all clones share one pool. Construct with
/// [`SessionPool::new`], hand out sessions with [`take`](SessionPool::take)
/// and [`take_write_session`](SessionPool::take_write_session), and shut
/// down with [`close`](SessionPool::close).
#[derive(Clone)]
pub struct SessionPool {
    pub(crate) inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    pub(crate) config: SessionPoolConfig,
    pub(crate) backend: Arc<dyn SessionService>,
    pub(crate) state: Mutex<PoolState>,
    /// Broadcast to blocked takers whenever capacity or an idle session
    /// frees up, and on close.
    pub(crate) wake: Notify,
    /// Single-consumer shutdown signal for the maintainer; `notify_one`
    /// stores a permit so a close racing a maintenance cycle is never lost.
    pub(crate) shutdown: Notify,
    /// Creation burst limiter, `None` when `max_burst` is 0 (unbounded).
    pub(crate) burst: Option<Semaphore>,
    pub(crate) hc: HealthChecker,
    pub(crate) metrics: Mutex<PoolMetricsInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    created_at: Instant,
}

/// Mutable pool state behind the single exclusion lock.
pub(crate) struct PoolState {
    pub(crate) valid: bool,
    /// Sessions that exist: idle + checked out + in-flight creation.
    pub(crate) num_opened: u64,
    pub(crate) pending_creates: u64,
    pub(crate) pending_prepares: u64,
    /// Read-ready idle sessions; front is most recently used.
    pub(crate) idle_read: VecDeque<Arc<Session>>,
    /// Write-prepared idle sessions; front is most recently used.
    pub(crate) idle_write: VecDeque<Arc<Session>>,
    pub(crate) window: MaintenanceWindow,
}

impl PoolState {
    /// Sessions currently held by callers.
    pub(crate) fn checked_out(&self) -> u64 {
        self.num_opened
            .saturating_sub(self.idle_read.len() as u64)
            .saturating_sub(self.idle_write.len() as u64)
            .saturating_sub(self.pending_creates)
            .saturating_sub(self.pending_prepares)
    }

    fn record_checkout(&mut self) {
        let checked_out = self.checked_out();
        self.window.update_max(checked_out);
    }
}

#[derive(Debug, Default)]
pub(crate) struct PoolMetricsInner {
    pub(crate) sessions_created: u64,
    pub(crate) sessions_destroyed: u64,
    pub(crate) checkouts_successful: u64,
    pub(crate) checkouts_timed_out: u64,
    pub(crate) health_checks_performed: u64,
    pub(crate) health_checks_failed: u64,
    pub(crate) prepares_performed: u64,
    pub(crate) prepares_failed: u64,
}

/// What `take` decided to do under the state lock.
enum Plan {
    Idle(Arc<Session>),
    Create,
    Wait,
}

/// Rolls a reserved creation slot back if the caller's future is dropped
/// mid-creation (deadline expiry or cancellation).
struct CreateReservation {
    pool: Arc<PoolInner>,
    armed: bool,
}

impl CreateReservation {
    fn complete(mut self) {
        self.armed = false;
        self.pool.state.lock().pending_creates -= 1;
        self.pool.wake.notify_waiters();
    }
}

impl Drop for CreateReservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.pool.state.lock();
            state.num_opened -= 1;
            state.pending_creates -= 1;
        }
        self.pool.wake.notify_waiters();
    }
}

/// Returns a session to the pool if the caller's future is dropped between
/// checkout and handle construction.
struct CheckoutRollback {
    pool: SessionPool,
    session: Arc<Session>,
    armed: bool,
    /// Whether this checkout currently holds the session's checking claim.
    claimed_check: bool,
}

impl CheckoutRollback {
    fn new(pool: &SessionPool, session: Arc<Session>) -> Self {
        Self {
            pool: pool.clone(),
            session,
            armed: true,
            claimed_check: false,
        }
    }

    fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Hand ownership to the caller; the rollback becomes a no-op.
    fn disarm(mut self) -> Arc<Session> {
        self.armed = false;
        Arc::clone(&self.session)
    }

    /// The session was dealt with explicitly; the rollback becomes a no-op.
    fn cancel(&mut self) {
        self.armed = false;
    }
}

impl Drop for CheckoutRollback {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.claimed_check {
            self.session.finish_health_check();
        }
        self.pool.recycle_session(&self.session);
    }
}

impl SessionPool {
    /// Create a session pool over `backend` and start its background tasks.
    ///
    /// Fails without side effects if `config` is invalid. The maintainer
    /// begins replenishing towards `min_opened` immediately.
    pub async fn new(
        backend: Arc<dyn SessionService>,
        config: SessionPoolConfig,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let burst = (config.max_burst > 0).then(|| Semaphore::new(config.max_burst));
        let workers = config.health_check_workers;
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                valid: true,
                num_opened: 0,
                pending_creates: 0,
                pending_prepares: 0,
                idle_read: VecDeque::new(),
                idle_write: VecDeque::new(),
                window: MaintenanceWindow::new(),
            }),
            wake: Notify::new(),
            shutdown: Notify::new(),
            burst,
            hc: HealthChecker::new(),
            metrics: Mutex::new(PoolMetricsInner::default()),
            tasks: Mutex::new(Vec::new()),
            created_at: Instant::now(),
            backend,
            config,
        });
        let pool = Self { inner };

        let mut tasks = Vec::with_capacity(workers + 1);
        for worker in 0..workers {
            tasks.push(tokio::spawn(run_worker(pool.clone(), worker)));
        }
        tasks.push(tokio::spawn(run_maintainer(pool.clone())));
        *pool.inner.tasks.lock() = tasks;

        tracing::info!(
            min_opened = pool.inner.config.min_opened,
            max_opened = pool.inner.config.max_opened,
            write_sessions = pool.inner.config.write_sessions,
            workers,
            "session pool created"
        );
        Ok(pool)
    }

    /// Take a read-capable session, applying the configured
    /// `acquire_timeout`.
    pub async fn take(&self) -> Result<SessionHandle, PoolError> {
        self.take_with_deadline(false, self.default_deadline()).await
    }

    /// Take a read-capable session with a per-call deadline.
    pub async fn take_with_timeout(&self, timeout: Duration) -> Result<SessionHandle, PoolError> {
        self.take_with_deadline(false, Some(Instant::now() + timeout))
            .await
    }

    /// Take a write-prepared session, applying the configured
    /// `acquire_timeout`.
    ///
    /// Prefers the write-ready registry; otherwise takes a read session and
    /// begins a transaction on it synchronously.
    pub async fn take_write_session(&self) -> Result<SessionHandle, PoolError> {
        self.take_with_deadline(true, self.default_deadline()).await
    }

    /// Take a write-prepared session with a per-call deadline.
    pub async fn take_write_session_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<SessionHandle, PoolError> {
        self.take_with_deadline(true, Some(Instant::now() + timeout))
            .await
    }

    fn default_deadline(&self) -> Option<Instant> {
        self.inner
            .config
            .acquire_timeout
            .map(|timeout| Instant::now() + timeout)
    }

    async fn take_with_deadline(
        &self,
        want_write: bool,
        deadline: Option<Instant>,
    ) -> Result<SessionHandle, PoolError> {
        let result = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, self.acquire(want_write)).await
            {
                Ok(result) => result,
                Err(_) => Err(PoolError::GetSessionTimeout),
            },
            None => self.acquire(want_write).await,
        };
        match &result {
            Ok(_) => self.inner.metrics.lock().checkouts_successful += 1,
            Err(PoolError::GetSessionTimeout) => {
                self.inner.metrics.lock().checkouts_timed_out += 1;
            }
            Err(_) => {}
        }
        result
    }

    async fn acquire(&self, want_write: bool) -> Result<SessionHandle, PoolError> {
        tracing::trace!(want_write, "acquiring session from pool");
        loop {
            // Register for wakeups before inspecting state so a recycle
            // between the check and the await cannot be lost.
            let notified = self.inner.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let plan = {
                let mut state = self.inner.state.lock();
                if !state.valid {
                    return Err(PoolError::InvalidPool);
                }
                let popped = if want_write {
                    state
                        .idle_write
                        .pop_front()
                        .or_else(|| state.idle_read.pop_front())
                } else {
                    state
                        .idle_read
                        .pop_front()
                        .or_else(|| state.idle_write.pop_front())
                };
                match popped {
                    Some(session) => {
                        session.take_idle();
                        state.record_checkout();
                        Plan::Idle(session)
                    }
                    None => {
                        let at_capacity = self.inner.config.max_opened > 0
                            && state.num_opened >= self.inner.config.max_opened;
                        if at_capacity {
                            Plan::Wait
                        } else {
                            state.num_opened += 1;
                            state.pending_creates += 1;
                            Plan::Create
                        }
                    }
                }
            };

            match plan {
                Plan::Idle(session) => {
                    let mut checkout = CheckoutRollback::new(self, session);
                    if self.verify_before_checkout(&mut checkout).await {
                        return self.finish_checkout(checkout, want_write).await;
                    }
                    // Broken session evicted; go around again.
                }
                Plan::Create => {
                    let checkout = self.create_session_checked_out().await?;
                    return self.finish_checkout(checkout, want_write).await;
                }
                Plan::Wait => {
                    notified.await;
                }
            }
        }
    }

    /// Ping an idle session that is overdue for a health check before
    /// handing it out. Returns false if it was broken and has been evicted.
    async fn verify_before_checkout(&self, checkout: &mut CheckoutRollback) -> bool {
        let session = Arc::clone(checkout.session());
        if !session.is_check_due(Instant::now()) || !session.claim_health_check() {
            // Fresh enough, or a worker's in-flight ping covers it.
            return true;
        }
        checkout.claimed_check = true;
        self.inner.metrics.lock().health_checks_performed += 1;
        match self.inner.backend.ping_session(session.id()).await {
            Ok(()) => {
                self.reschedule_session(&session);
                checkout.claimed_check = false;
                true
            }
            Err(e) => {
                self.inner.metrics.lock().health_checks_failed += 1;
                tracing::debug!(
                    session = %session.id(),
                    error = %e,
                    "idle session failed pre-checkout ping, evicting"
                );
                session.finish_health_check();
                checkout.claimed_check = false;
                checkout.cancel();
                self.destroy_session(&session, false);
                false
            }
        }
    }

    /// Begin a transaction when the caller asked for a write session and the
    /// one checked out is not prepared yet, then wrap it in a handle.
    async fn finish_checkout(
        &self,
        checkout: CheckoutRollback,
        want_write: bool,
    ) -> Result<SessionHandle, PoolError> {
        let session = Arc::clone(checkout.session());
        if want_write && !session.is_write_prepared() {
            match self.inner.backend.begin_transaction(session.id()).await {
                Ok(txn) => session.set_transaction(txn),
                Err(e) => {
                    let session = checkout.disarm();
                    if e.is_session_not_found() {
                        self.destroy_session(&session, false);
                    } else {
                        self.recycle_session(&session);
                    }
                    return Err(e.into());
                }
            }
        }
        let session = checkout.disarm();
        tracing::trace!(session = %session.id(), "session checked out");
        Ok(SessionHandle::new(self.clone(), session))
    }

    /// Reserve capacity was already taken by the caller; create one session
    /// and return it checked out.
    async fn create_session_checked_out(&self) -> Result<CheckoutRollback, PoolError> {
        let reservation = CreateReservation {
            pool: Arc::clone(&self.inner),
            armed: true,
        };
        let permit = self.acquire_burst_permit().await?;
        let id = self.create_one_with_retry().await?;
        drop(permit);
        reservation.complete();

        let now = Instant::now();
        let session = Arc::new(Session::new(id, now));
        self.inner.hc.schedule(&session, now + self.ping_spacing());
        self.inner.metrics.lock().sessions_created += 1;

        let closed = {
            let mut state = self.inner.state.lock();
            state.record_checkout();
            !state.valid
        };
        if closed {
            // The pool closed while we were creating; clean up and report.
            self.destroy_session(&session, false);
            return Err(PoolError::InvalidPool);
        }
        tracing::debug!(session = %session.id(), "created session on demand");
        Ok(CheckoutRollback::new(self, session))
    }

    /// Create one session, retrying transient outages for as long as the
    /// caller's deadline allows.
    async fn create_one_with_retry(&self) -> Result<SessionId, PoolError> {
        let mut backoff = CREATE_RETRY_BACKOFF;
        loop {
            if !self.is_valid() {
                return Err(PoolError::InvalidPool);
            }
            match self.inner.backend.batch_create_sessions(1).await {
                Ok(ids) => {
                    return ids.into_iter().next().ok_or_else(|| {
                        PoolError::Rpc(RpcError::transport("backend returned no session ids"))
                    });
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(error = %e, "session creation unavailable, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(CREATE_RETRY_BACKOFF_MAX);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub(crate) async fn acquire_burst_permit(
        &self,
    ) -> Result<Option<SemaphorePermit<'_>>, PoolError> {
        match &self.inner.burst {
            Some(semaphore) => semaphore
                .acquire()
                .await
                .map(Some)
                .map_err(|_| PoolError::InvalidPool),
            None => Ok(None),
        }
    }

    /// Return a session to the idle registries; a session that is invalid,
    /// or recycled into a closed pool, is destroyed instead.
    pub(crate) fn recycle_session(&self, session: &Arc<Session>) {
        let returned = {
            let mut state = self.inner.state.lock();
            if !state.valid || !session.is_valid() {
                false
            } else {
                if session.is_write_prepared() {
                    session.set_idle(Some(IdleKind::Write));
                    state.idle_write.push_front(Arc::clone(session));
                } else {
                    session.set_idle(Some(IdleKind::Read));
                    state.idle_read.push_front(Arc::clone(session));
                }
                true
            }
        };
        if returned {
            self.inner.wake.notify_waiters();
            self.inner.hc.wake_workers();
        } else {
            self.destroy_session(session, false);
        }
    }

    /// Remove a session from the pool and, best-effort, from the server.
    ///
    /// With `expire` set the removal is declined when it would drop the pool
    /// below `min_opened`; the caller decides what to do with the survivor.
    /// Destroying an already-invalid session is a no-op, so racing
    /// destroyers settle on exactly one counter decrement.
    pub(crate) fn destroy_session(&self, session: &Arc<Session>, expire: bool) -> bool {
        {
            let mut state = self.inner.state.lock();
            if expire && state.num_opened <= self.inner.config.min_opened {
                return false;
            }
            if let Some(kind) = session.take_idle() {
                let list = match kind {
                    IdleKind::Read => &mut state.idle_read,
                    IdleKind::Write => &mut state.idle_write,
                };
                if let Some(position) = list.iter().position(|s| Arc::ptr_eq(s, session)) {
                    list.remove(position);
                }
            }
            if !session.invalidate() {
                return false;
            }
            state.num_opened -= 1;
        }
        self.inner.wake.notify_waiters();
        self.inner.hc.unregister(session);
        self.inner.metrics.lock().sessions_destroyed += 1;
        tracing::debug!(
            session = %session.id(),
            age = ?session.created_at().elapsed(),
            "destroying session"
        );

        let backend = Arc::clone(&self.inner.backend);
        let id = session.id().clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = backend.delete_session(&id).await {
                    tracing::debug!(session = %id, error = %e, "best-effort session deletion failed");
                }
            });
        }
        true
    }

    /// Whether the pool is open for business.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.state.lock().valid
    }

    /// Close the pool: stop the background tasks and destroy every tracked
    /// session, including checked-out ones (their handles observe
    /// invalidity). Idempotent. Teardown runs on a detached task, so it
    /// completes even if this future is dropped mid-close.
    pub async fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.valid {
                return;
            }
            state.valid = false;
        }
        tracing::info!("closing session pool");
        self.inner.shutdown.notify_one();
        self.inner.hc.close();
        if let Some(semaphore) = &self.inner.burst {
            semaphore.close();
        }
        self.inner.wake.notify_waiters();

        let pool = self.clone();
        let teardown = tokio::spawn(async move {
            let tasks: Vec<JoinHandle<()>> = pool.inner.tasks.lock().drain(..).collect();
            for task in tasks {
                let _ = task.await;
            }
            for session in pool.inner.hc.tracked_sessions() {
                pool.destroy_session(&session, false);
            }
            tracing::info!("session pool closed");
        });
        let _ = teardown.await;
    }

    /// A point-in-time snapshot of pool occupancy.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            opened: state.num_opened,
            idle_read: state.idle_read.len(),
            idle_write: state.idle_write.len(),
            checked_out: state.checked_out(),
            pending_creates: state.pending_creates,
            pending_prepares: state.pending_prepares,
            max_opened: self.inner.config.max_opened,
            valid: state.valid,
        }
    }

    /// Cumulative pool metrics since construction.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            sessions_created: inner.sessions_created,
            sessions_destroyed: inner.sessions_destroyed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_timed_out: inner.checkouts_timed_out,
            health_checks_performed: inner.health_checks_performed,
            health_checks_failed: inner.health_checks_failed,
            prepares_performed: inner.prepares_performed,
            prepares_failed: inner.prepares_failed,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Ids of every session currently enqueued with the health-check
    /// scheduler (idle and checked out alike).
    #[must_use]
    pub fn scheduled_sessions(&self) -> Vec<SessionId> {
        self.inner
            .hc
            .tracked_sessions()
            .iter()
            .map(|session| session.id().clone())
            .collect()
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &SessionPoolConfig {
        &self.inner.config
    }
}

/// Occupancy snapshot returned by [`SessionPool::status`].
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Sessions that exist: idle + checked out + in-flight creation.
    pub opened: u64,
    /// Read-ready idle sessions.
    pub idle_read: usize,
    /// Write-prepared idle sessions.
    pub idle_write: usize,
    /// Sessions currently held by callers.
    pub checked_out: u64,
    /// Creation RPCs in flight.
    pub pending_creates: u64,
    /// Sessions being write-prepared by the scheduler.
    pub pending_prepares: u64,
    /// Configured ceiling (0 = unbounded).
    pub max_opened: u64,
    /// False once the pool has been closed.
    pub valid: bool,
}

impl PoolStatus {
    /// Occupancy as a percentage of `max_opened` (0.0 when unbounded).
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max_opened == 0 {
            return 0.0;
        }
        (self.opened as f64 / self.max_opened as f64) * 100.0
    }

    /// Whether a further `take` would have to wait for capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.max_opened > 0 && self.opened >= self.max_opened
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Sessions created since pool start.
    pub sessions_created: u64,
    /// Sessions destroyed since pool start.
    pub sessions_destroyed: u64,
    /// Successful session checkouts.
    pub checkouts_successful: u64,
    /// Checkouts that hit their acquisition deadline.
    pub checkouts_timed_out: u64,
    /// Health-check pings performed.
    pub health_checks_performed: u64,
    /// Health-check pings that failed.
    pub health_checks_failed: u64,
    /// Write preparations performed.
    pub prepares_performed: u64,
    /// Write preparations that failed.
    pub prepares_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Checkout success rate in `[0.0, 1.0]`.
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_timed_out;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Health-check success rate in `[0.0, 1.0]`.
    #[must_use]
    pub fn health_check_success_rate(&self) -> f64 {
        if self.health_checks_performed == 0 {
            return 1.0;
        }
        let successful = self
            .health_checks_performed
            .saturating_sub(self.health_checks_failed);
        successful as f64 / self.health_checks_performed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_utilization() {
        let status = PoolStatus {
            opened: 10,
            idle_read: 5,
            idle_write: 0,
            checked_out: 5,
            pending_creates: 0,
            pending_prepares: 0,
            max_opened: 40,
            valid: true,
        };
        assert!((status.utilization() - 25.0).abs() < f64::EPSILON);
        assert!(!status.is_at_capacity());
    }

    #[test]
    fn test_status_at_capacity_and_unbounded() {
        let status = PoolStatus {
            opened: 10,
            idle_read: 0,
            idle_write: 0,
            checked_out: 10,
            pending_creates: 0,
            pending_prepares: 0,
            max_opened: 10,
            valid: true,
        };
        assert!(status.is_at_capacity());

        let unbounded = PoolStatus {
            max_opened: 0,
            ..status
        };
        assert!(!unbounded.is_at_capacity());
        assert!((unbounded.utilization() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_success_rates() {
        let metrics = PoolMetrics {
            sessions_created: 12,
            sessions_destroyed: 2,
            checkouts_successful: 90,
            checkouts_timed_out: 10,
            health_checks_performed: 100,
            health_checks_failed: 5,
            prepares_performed: 20,
            prepares_failed: 1,
            uptime: Duration::from_secs(3600),
        };
        assert!((metrics.checkout_success_rate() - 0.9).abs() < f64::EPSILON);
        assert!((metrics.health_check_success_rate() - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_rates_with_no_activity() {
        let metrics = PoolMetrics {
            sessions_created: 0,
            sessions_destroyed: 0,
            checkouts_successful: 0,
            checkouts_timed_out: 0,
            health_checks_performed: 0,
            health_checks_failed: 0,
            prepares_performed: 0,
            prepares_failed: 0,
            uptime: Duration::ZERO,
        };
        assert!((metrics.checkout_success_rate() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.health_check_success_rate() - 1.0).abs() < f64::EPSILON);
    }
}
