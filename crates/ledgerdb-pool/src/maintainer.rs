//! Demand-based pool sizing.
//!
//! The maintainer runs on a fixed sampling cadence, independent of caller
//! activity. Each cycle it records how many sessions are checked out, then
//! grows the pool towards `min_opened` (or provisions idle headroom after
//! breakage) and shrinks surplus idle capacity, but only once a full
//! maintenance window of real samples confirms the demand has passed.

use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};

use ledgerdb_rpc::SessionId;

use crate::pool::SessionPool;
use crate::session::{IdleKind, Session};

/// Number of sampling cycles a demand observation stays relevant.
pub(crate) const MAINTENANCE_WINDOW_SIZE: usize = 10;

/// Upper bound on session ids requested in a single creation RPC.
const MAX_SESSIONS_PER_BATCH: usize = 100;

/// Ring of per-cycle checkout high-water marks.
///
/// Slots start at `u64::MAX`, meaning "no data, never shrink on this
/// cycle". Only once a full window of real samples has rotated through can
/// the window max drop, which is exactly the hysteresis that keeps the pool
/// from deleting sessions right after a traffic spike.
pub(crate) struct MaintenanceWindow {
    /// Index 0 is the current cycle, higher indices are older.
    max_checked_out: [u64; MAINTENANCE_WINDOW_SIZE],
}

impl MaintenanceWindow {
    pub(crate) fn new() -> Self {
        Self {
            max_checked_out: [u64::MAX; MAINTENANCE_WINDOW_SIZE],
        }
    }

    /// Rotate the ring by one cycle, seeding the new slot with the number of
    /// sessions currently checked out.
    pub(crate) fn start_new_cycle(&mut self, current_checked_out: u64) {
        self.max_checked_out
            .copy_within(0..MAINTENANCE_WINDOW_SIZE - 1, 1);
        self.max_checked_out[0] = current_checked_out;
    }

    /// Raise the current cycle's high-water mark.
    pub(crate) fn update_max(&mut self, current_checked_out: u64) {
        if current_checked_out > self.max_checked_out[0] {
            self.max_checked_out[0] = current_checked_out;
        }
    }

    /// Maximum number of concurrently checked-out sessions observed across
    /// the window; `u64::MAX` while any slot is still unseeded.
    pub(crate) fn max_checked_out_during_window(&self) -> u64 {
        // The array is never empty.
        self.max_checked_out.iter().copied().max().unwrap_or(u64::MAX)
    }
}

/// The maintainer loop, one per pool.
pub(crate) async fn run_maintainer(pool: SessionPool) {
    tracing::debug!("maintainer started");
    let mut ticker = tokio::time::interval(pool.inner.config.health_check_sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = pool.inner.shutdown.notified() => break,
        }
        if !pool.is_valid() {
            break;
        }
        pool.maintain().await;
    }
    tracing::debug!("maintainer stopped");
}

impl SessionPool {
    /// One maintenance cycle: sample demand, then resize.
    pub(crate) async fn maintain(&self) {
        let config = &self.inner.config;
        let (num_opened, num_idle, window_max) = {
            let mut state = self.inner.state.lock();
            let checked_out = state.checked_out();
            state.window.start_new_cycle(checked_out);
            (
                state.num_opened,
                (state.idle_read.len() + state.idle_write.len()) as u64,
                state.window.max_checked_out_during_window(),
            )
        };

        if num_opened < config.min_opened {
            self.grow_pool(config.min_opened - num_opened).await;
        } else if config.max_idle > 0
            && window_max < u64::MAX
            && window_max > num_opened
            && num_idle < config.max_idle
        {
            // Demand during the window outstripped what is open now (sessions
            // broke since the spike); provision idle headroom back.
            let shortfall = (config.max_idle - num_idle).min(window_max - num_opened);
            self.grow_pool(shortfall).await;
        } else if window_max < num_opened && num_opened > config.min_opened {
            let target = config.min_opened.max(window_max);
            self.shrink_pool(num_opened - target);
        }
    }

    /// Create up to `count` sessions and park them in the read registry.
    ///
    /// Creation is reserved against `max_opened` up front, burst-gated, and
    /// batched. Unlike caller-driven creation this is single-attempt: a
    /// failed cycle just leaves the work for the next one.
    pub(crate) async fn grow_pool(&self, count: u64) {
        let reserved = {
            let mut state = self.inner.state.lock();
            if !state.valid {
                return;
            }
            let headroom = if self.inner.config.max_opened == 0 {
                count
            } else {
                self.inner.config.max_opened.saturating_sub(state.num_opened)
            };
            let reserved = count.min(headroom);
            if reserved == 0 {
                return;
            }
            state.num_opened += reserved;
            state.pending_creates += reserved;
            reserved
        };
        tracing::debug!(count = reserved, "growing pool");

        let mut unresolved = reserved;
        let mut remaining = reserved as usize;
        while remaining > 0 {
            let batch = remaining.min(MAX_SESSIONS_PER_BATCH);
            let Ok(permit) = self.acquire_burst_permit().await else {
                break;
            };
            let result = self.inner.backend.batch_create_sessions(batch).await;
            drop(permit);
            match result {
                Ok(ids) => {
                    let created = ids.len();
                    unresolved -= self.register_idle_sessions(ids);
                    if created < batch {
                        break;
                    }
                    remaining -= batch;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "session creation failed, retrying next cycle");
                    break;
                }
            }
        }

        if unresolved > 0 {
            let mut state = self.inner.state.lock();
            state.pending_creates -= unresolved;
            state.num_opened -= unresolved;
        }
        self.inner.wake.notify_waiters();
        self.inner.hc.wake_workers();
    }

    /// Turn freshly created ids into idle, scheduler-tracked sessions.
    /// Returns how many reservations were consumed.
    fn register_idle_sessions(&self, ids: Vec<SessionId>) -> u64 {
        let now = Instant::now();
        let spacing = self.ping_spacing();
        let sessions: Vec<Arc<Session>> = ids
            .into_iter()
            .map(|id| Arc::new(Session::new(id, now)))
            .collect();
        let consumed = sessions.len() as u64;

        let mut doomed = Vec::new();
        {
            let mut state = self.inner.state.lock();
            state.pending_creates -= consumed;
            for session in &sessions {
                if state.valid {
                    session.set_idle(Some(IdleKind::Read));
                    state.idle_read.push_back(session.clone());
                } else {
                    doomed.push(session.clone());
                }
            }
        }
        self.inner.metrics.lock().sessions_created += consumed - doomed.len() as u64;

        // Stagger initial deadlines so a burst of creations does not produce
        // a burst of pings.
        for (i, session) in sessions.iter().enumerate() {
            if doomed.iter().any(|d| Arc::ptr_eq(d, session)) {
                continue;
            }
            self.inner
                .hc
                .schedule(session, now + spacing * (i as u32 + 1));
        }
        // The pool closed while we were creating; clean up what we made.
        for session in doomed {
            self.destroy_session(&session, false);
        }
        consumed
    }

    /// Destroy `count` oldest-idle sessions.
    pub(crate) fn shrink_pool(&self, count: u64) {
        let victims = {
            let mut state = self.inner.state.lock();
            let mut victims = Vec::new();
            for _ in 0..count {
                let session = state
                    .idle_read
                    .pop_back()
                    .or_else(|| state.idle_write.pop_back());
                match session {
                    Some(session) => {
                        session.take_idle();
                        victims.push(session);
                    }
                    None => break,
                }
            }
            victims
        };
        if victims.is_empty() {
            return;
        }
        tracing::debug!(count = victims.len(), "shrinking pool");
        for session in victims {
            self.destroy_session(&session, false);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_window_starts_unknown() {
        let window = MaintenanceWindow::new();
        assert_eq!(window.max_checked_out_during_window(), u64::MAX);
    }

    #[test]
    fn test_window_cycle_and_update_max() {
        let mut window = MaintenanceWindow::new();

        // One cycle with nothing checked out: the current slot is real data,
        // the rest of the window still reports "unknown".
        window.start_new_cycle(0);
        assert_eq!(window.max_checked_out[0], 0);
        for slot in &window.max_checked_out[1..] {
            assert_eq!(*slot, u64::MAX);
        }
        assert_eq!(window.max_checked_out_during_window(), u64::MAX);

        // Raising the current cycle's high-water mark leaves the window max
        // untouched while unseeded slots remain.
        window.update_max(10);
        assert_eq!(window.max_checked_out[0], 10);
        assert_eq!(window.max_checked_out_during_window(), u64::MAX);

        // Complete the window with idle cycles; the spike is now the oldest
        // slot and the window max finally becomes real.
        for _ in 1..MAINTENANCE_WINDOW_SIZE {
            window.start_new_cycle(0);
        }
        for slot in &window.max_checked_out[..MAINTENANCE_WINDOW_SIZE - 1] {
            assert_eq!(*slot, 0);
        }
        assert_eq!(window.max_checked_out[MAINTENANCE_WINDOW_SIZE - 1], 10);
        assert_eq!(window.max_checked_out_during_window(), 10);

        // One more idle cycle rotates the spike out entirely.
        window.start_new_cycle(0);
        assert_eq!(window.max_checked_out_during_window(), 0);

        // A fresh smaller spike becomes the new window max and survives half
        // a window of idle cycles.
        window.start_new_cycle(5);
        assert_eq!(window.max_checked_out_during_window(), 5);
        for _ in 0..MAINTENANCE_WINDOW_SIZE / 2 {
            window.start_new_cycle(0);
        }
        assert_eq!(window.max_checked_out_during_window(), 5);
    }

    #[test]
    fn test_update_max_never_lowers() {
        let mut window = MaintenanceWindow::new();
        window.start_new_cycle(7);
        window.update_max(3);
        assert_eq!(window.max_checked_out[0], 7);
    }

    proptest! {
        #[test]
        fn prop_window_max_matches_recent_cycles(values in prop::collection::vec(0u64..1_000, 1..40)) {
            let mut window = MaintenanceWindow::new();
            for value in &values {
                window.start_new_cycle(*value);
            }
            let expected = if values.len() < MAINTENANCE_WINDOW_SIZE {
                // Unseeded slots dominate until the window fills.
                u64::MAX
            } else {
                values[values.len() - MAINTENANCE_WINDOW_SIZE..]
                    .iter()
                    .copied()
                    .max()
                    .unwrap_or(0)
            };
            prop_assert_eq!(window.max_checked_out_during_window(), expected);
        }
    }
}
