//! Background health checking.
//!
//! Every live session, idle or checked out, is tracked on a min-heap keyed
//! by its next-check deadline. A fixed set of workers pops the earliest due
//! session, pings it, and either reschedules it or evicts it when the server
//! no longer knows it. Workers also opportunistically prepare read-idle
//! sessions for writes while the write-prepared fraction is below target.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::pool::SessionPool;
use crate::session::{IdleKind, Session};

/// Array-backed binary min-heap over sessions, keyed by `next_check`.
///
/// Each session stores its own heap index, so a deadline change anywhere in
/// the heap is an O(log n) `fix` instead of a scan. A session that is not
/// enqueued carries index -1.
pub(crate) struct HcQueue {
    sessions: Vec<Arc<Session>>,
}

impl HcQueue {
    pub(crate) fn new() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }

    pub(crate) fn peek(&self) -> Option<&Arc<Session>> {
        self.sessions.first()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.clone()
    }

    pub(crate) fn push(&mut self, session: Arc<Session>) {
        let index = self.sessions.len();
        session.set_heap_index(index as i64);
        self.sessions.push(session);
        self.sift_up(index);
    }

    pub(crate) fn pop(&mut self) -> Option<Arc<Session>> {
        if self.sessions.is_empty() {
            return None;
        }
        let session = self.sessions.swap_remove(0);
        session.set_heap_index(-1);
        if !self.sessions.is_empty() {
            self.sessions[0].set_heap_index(0);
            self.sift_down(0);
        }
        Some(session)
    }

    /// Remove `session` wherever it sits in the heap. Returns false if it
    /// was not enqueued.
    pub(crate) fn remove(&mut self, session: &Arc<Session>) -> bool {
        let index = session.heap_index();
        if index < 0 {
            return false;
        }
        let index = index as usize;
        if index >= self.sessions.len() || !Arc::ptr_eq(&self.sessions[index], session) {
            return false;
        }
        let removed = self.sessions.swap_remove(index);
        removed.set_heap_index(-1);
        if index < self.sessions.len() {
            self.sessions[index].set_heap_index(index as i64);
            self.fix(index);
        }
        true
    }

    /// Restore heap order after the key of the session at `index` changed.
    pub(crate) fn fix(&mut self, index: usize) {
        let moved_to = self.sift_up(index);
        if moved_to == index {
            self.sift_down(index);
        }
    }

    fn key(&self, index: usize) -> Instant {
        self.sessions[index].next_check()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.sessions.swap(a, b);
        self.sessions[a].set_heap_index(a as i64);
        self.sessions[b].set_heap_index(b as i64);
    }

    fn sift_up(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.key(index) < self.key(parent) {
                self.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
        index
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.sessions.len();
        loop {
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            let mut smallest = index;
            if left < len && self.key(left) < self.key(smallest) {
                smallest = left;
            }
            if right < len && self.key(right) < self.key(smallest) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.swap(index, smallest);
            index = smallest;
        }
    }
}

/// Shared scheduler state: the deadline heap plus worker signalling.
pub(crate) struct HealthChecker {
    pub(crate) queue: Mutex<HcQueue>,
    /// Wakes workers when an earlier deadline is enqueued, a session becomes
    /// available for write preparation, or the scheduler closes.
    pub(crate) wake: Notify,
    closed: AtomicBool,
}

impl HealthChecker {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(HcQueue::new()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Set `session`'s next deadline and (re-)enqueue it.
    pub(crate) fn schedule(&self, session: &Arc<Session>, next_check: Instant) {
        let mut queue = self.queue.lock();
        session.set_next_check(next_check);
        let index = session.heap_index();
        if index >= 0 {
            queue.fix(index as usize);
        } else {
            queue.push(session.clone());
        }
        let became_top = queue
            .peek()
            .is_some_and(|top| Arc::ptr_eq(top, session));
        drop(queue);
        if became_top {
            // A sleeping worker may be waiting on a later deadline.
            self.wake.notify_waiters();
        }
    }

    pub(crate) fn unregister(&self, session: &Arc<Session>) -> bool {
        self.queue.lock().remove(session)
    }

    pub(crate) fn tracked_sessions(&self) -> Vec<Arc<Session>> {
        self.queue.lock().snapshot()
    }

    /// Nudge workers to look for write-preparation work.
    pub(crate) fn wake_workers(&self) {
        self.wake.notify_waiters();
    }

    /// Stop accepting work. In-flight pings finish; sessions are not
    /// destroyed here.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.notify_waiters();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// What a worker found at the top of the heap.
pub(crate) enum PingWork {
    /// This session is due; it has been popped and claimed.
    Due(Arc<Session>),
    /// Nothing due before this deadline.
    Sleep(Instant),
    /// The heap is empty.
    Empty,
}

/// One background health-check worker.
pub(crate) async fn run_worker(pool: SessionPool, worker: usize) {
    tracing::debug!(worker, "health-check worker started");
    loop {
        if pool.inner.hc.is_closed() {
            break;
        }
        if let Some(session) = pool.next_for_prepare() {
            if pool.prepare_for_write(&session).await {
                continue;
            }
            // On failure fall through to the timed wait so a struggling
            // backend is retried at ping cadence, not in a hot loop.
        }
        let notified = pool.inner.hc.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if pool.inner.hc.is_closed() {
            break;
        }
        match pool.next_for_ping() {
            PingWork::Due(session) => {
                pool.health_check_session(&session).await;
            }
            PingWork::Sleep(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = &mut notified => {}
                }
            }
            PingWork::Empty => {
                notified.await;
            }
        }
    }
    tracing::debug!(worker, "health-check worker stopped");
}

impl SessionPool {
    /// Pop a read-idle session for write preparation while the prepared
    /// fraction is below target.
    pub(crate) fn next_for_prepare(&self) -> Option<Arc<Session>> {
        let mut state = self.inner.state.lock();
        if !state.valid {
            return None;
        }
        let target = state.num_opened as f64 * self.inner.config.write_sessions;
        let prepared = state.idle_write.len() as u64 + state.pending_prepares;
        if prepared as f64 >= target {
            return None;
        }
        let session = state.idle_read.pop_front()?;
        session.take_idle();
        state.pending_prepares += 1;
        Some(session)
    }

    /// Begin a transaction on `session` and move it to the write registry.
    /// Returns true when the worker made progress (including evicting a
    /// session the server no longer knows).
    pub(crate) async fn prepare_for_write(&self, session: &Arc<Session>) -> bool {
        tracing::trace!(session = %session.id(), "preparing session for write");
        match self.inner.backend.begin_transaction(session.id()).await {
            Ok(txn) => {
                session.set_transaction(txn);
                self.inner.metrics.lock().prepares_performed += 1;
                self.finish_prepare(session, true);
                true
            }
            Err(e) if e.is_session_not_found() => {
                self.inner.metrics.lock().prepares_failed += 1;
                tracing::debug!(session = %session.id(), "session gone during prepare, evicting");
                self.inner.state.lock().pending_prepares -= 1;
                self.destroy_session(session, false);
                true
            }
            Err(e) => {
                self.inner.metrics.lock().prepares_failed += 1;
                tracing::warn!(session = %session.id(), error = %e, "failed to prepare session for write");
                self.finish_prepare(session, false);
                false
            }
        }
    }

    /// Return a session popped for preparation to the appropriate registry.
    fn finish_prepare(&self, session: &Arc<Session>, prepared: bool) {
        let mut state = self.inner.state.lock();
        state.pending_prepares -= 1;
        if !state.valid || !session.is_valid() {
            drop(state);
            self.destroy_session(session, false);
            return;
        }
        if prepared {
            session.set_idle(Some(IdleKind::Write));
            state.idle_write.push_front(session.clone());
        } else {
            session.set_idle(Some(IdleKind::Read));
            state.idle_read.push_front(session.clone());
        }
        drop(state);
        self.inner.wake.notify_waiters();
    }

    /// Inspect the top of the heap: pop and claim the earliest session if it
    /// is due, otherwise report how long to sleep.
    pub(crate) fn next_for_ping(&self) -> PingWork {
        let mut queue = self.inner.hc.queue.lock();
        let now = Instant::now();
        loop {
            let Some(top) = queue.peek() else {
                return PingWork::Empty;
            };
            let due_at = top.next_check();
            if due_at > now {
                return PingWork::Sleep(due_at);
            }
            let Some(session) = queue.pop() else {
                return PingWork::Empty;
            };
            if !session.is_valid() {
                continue;
            }
            if !session.claim_health_check() {
                // A racing `take` is pinging it and will re-enqueue it.
                continue;
            }
            return PingWork::Due(session);
        }
    }

    /// Ping `session` and reschedule or evict it based on the outcome.
    pub(crate) async fn health_check_session(&self, session: &Arc<Session>) {
        if !session.is_valid() {
            session.finish_health_check();
            return;
        }
        self.inner.metrics.lock().health_checks_performed += 1;
        match self.inner.backend.ping_session(session.id()).await {
            Ok(()) => {
                self.reschedule_session(session);
            }
            Err(e) if e.is_session_not_found() => {
                self.inner.metrics.lock().health_checks_failed += 1;
                tracing::debug!(session = %session.id(), "session gone on server, evicting");
                session.finish_health_check();
                self.destroy_session(session, false);
            }
            Err(e) => {
                self.inner.metrics.lock().health_checks_failed += 1;
                tracing::warn!(session = %session.id(), error = %e, "health check failed, will retry");
                self.reschedule_session(session);
            }
        }
    }

    /// Clear the checking flag and re-enqueue with a fresh deadline.
    ///
    /// A session destroyed while its ping was in flight stays out of the
    /// heap; re-enqueueing it would keep a dead entry alive until its next
    /// deadline.
    pub(crate) fn reschedule_session(&self, session: &Arc<Session>) {
        let next = Instant::now() + self.ping_spacing();
        session.finish_health_check();
        if !session.is_valid() {
            return;
        }
        self.inner.hc.schedule(session, next);
    }

    /// Spacing between checks: the configured interval divided across all
    /// open sessions, so checks spread out instead of landing at once.
    pub(crate) fn ping_spacing(&self) -> Duration {
        let opened = self.inner.state.lock().num_opened.max(1);
        let divisor = u32::try_from(opened).unwrap_or(u32::MAX);
        self.inner.config.health_check_interval / divisor
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use ledgerdb_rpc::SessionId;
    use proptest::prelude::*;

    use super::*;

    fn session_at(name: &str, base: Instant, offset_ms: u64) -> Arc<Session> {
        let session = Arc::new(Session::new(SessionId::new(name), base));
        session.set_next_check(base + Duration::from_millis(offset_ms));
        session
    }

    #[tokio::test]
    async fn test_heap_pops_in_deadline_order() {
        let base = Instant::now();
        let offsets = [1000u64, 5, 180, 1100, 630];
        let mut queue = HcQueue::new();
        for (i, offset) in offsets.iter().enumerate() {
            queue.push(session_at(&format!("sessions/{i}"), base, *offset));
        }

        // Every enqueued session must know its own position.
        for session in queue.snapshot() {
            let index = session.heap_index();
            assert!(index >= 0);
            assert!(Arc::ptr_eq(&queue.snapshot()[index as usize], &session));
        }

        let mut popped = Vec::new();
        while let Some(session) = queue.pop() {
            assert_eq!(session.heap_index(), -1);
            popped.push(session.next_check());
        }
        let mut sorted = popped.clone();
        sorted.sort();
        assert_eq!(popped, sorted);
        assert_eq!(popped.len(), offsets.len());
    }

    #[tokio::test]
    async fn test_heap_fix_after_key_change() {
        let base = Instant::now();
        let mut queue = HcQueue::new();
        for (i, offset) in [1000u64, 5, 180, 1100, 630].iter().enumerate() {
            queue.push(session_at(&format!("sessions/{i}"), base, *offset));
        }

        // Push the current minimum towards the middle and fix it up.
        let top = queue.peek().unwrap().clone();
        top.set_next_check(base + Duration::from_millis(820));
        queue.fix(top.heap_index() as usize);

        let mut previous = None;
        while let Some(session) = queue.pop() {
            let at = session.next_check();
            if let Some(prev) = previous {
                assert!(prev <= at, "heap order violated after fix");
            }
            previous = Some(at);
        }
    }

    #[tokio::test]
    async fn test_heap_remove_mid_element() {
        let base = Instant::now();
        let mut queue = HcQueue::new();
        let sessions: Vec<_> = [40u64, 10, 30, 20, 50]
            .iter()
            .enumerate()
            .map(|(i, offset)| session_at(&format!("sessions/{i}"), base, *offset))
            .collect();
        for session in &sessions {
            queue.push(session.clone());
        }

        assert!(queue.remove(&sessions[2]));
        assert_eq!(sessions[2].heap_index(), -1);
        // Removing again is a no-op.
        assert!(!queue.remove(&sessions[2]));

        let mut remaining = Vec::new();
        while let Some(session) = queue.pop() {
            remaining.push(session.id().clone());
        }
        assert_eq!(remaining.len(), 4);
        assert!(!remaining.contains(sessions[2].id()));
    }

    #[tokio::test]
    async fn test_checking_claim_is_exclusive() {
        let base = Instant::now();
        let session = session_at("sessions/0", base, 0);
        assert!(session.claim_health_check());
        assert!(!session.claim_health_check());
        session.finish_health_check();
        assert!(session.claim_health_check());
    }

    proptest! {
        #[test]
        fn prop_heap_pops_sorted(offsets in prop::collection::vec(0u64..10_000, 1..50)) {
            let base = Instant::now();
            let mut queue = HcQueue::new();
            for (i, offset) in offsets.iter().enumerate() {
                queue.push(session_at(&format!("sessions/{i}"), base, *offset));
            }
            let mut popped = Vec::new();
            while let Some(session) = queue.pop() {
                prop_assert_eq!(session.heap_index(), -1);
                popped.push(session.next_check());
            }
            prop_assert_eq!(popped.len(), offsets.len());
            prop_assert!(popped.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }
}
