//! Counting admission limiter.
//!
//! An [`AdmissionLimiter`] hands out permits from a pool. Acquirers block
//! while the pool is short; releases refill it. In fair mode blocked
//! acquirers are admitted strictly in arrival order, otherwise any waiter
//! that fits may go first.
//!
//! Releases are not bounded by the initial capacity: releasing more than
//! was acquired grows the pool.

use std::collections::VecDeque;
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::errors::{SyncError, SyncResult};
use crate::monitor::{deadline_after, Monitor, WaitOutcome};

#[derive(Debug, Clone, Copy)]
struct Ticket {
    id: u64,
    wanted: usize,
}

struct LimiterState {
    permits: usize,
    queue: VecDeque<Ticket>,
    next_ticket: u64,
}

impl LimiterState {
    fn enqueue(&mut self, wanted: usize) -> u64 {
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.queue.push_back(Ticket { id, wanted });
        id
    }

    fn dequeue(&mut self, id: u64) {
        if let Some(position) = self.queue.iter().position(|ticket| ticket.id == id) {
            self.queue.remove(position);
        }
    }

    fn is_head(&self, id: u64) -> bool {
        self.queue.front().is_some_and(|ticket| ticket.id == id)
    }
}

/// Counting permit pool bounding the number of concurrent holders.
///
/// # Examples
///
/// ```
/// use foundation_sync::{AdmissionLimiter, CancellationToken};
///
/// let limiter = AdmissionLimiter::new(2, true);
/// let token = CancellationToken::new();
///
/// limiter.acquire(&token).unwrap();
/// assert_eq!(limiter.available_permits(), 1);
/// assert!(limiter.try_acquire().unwrap());
/// assert!(!limiter.try_acquire().unwrap());
///
/// limiter.release();
/// limiter.release();
/// assert_eq!(limiter.available_permits(), 2);
/// ```
#[derive(Clone)]
pub struct AdmissionLimiter {
    state: Arc<Monitor<LimiterState>>,
    fair: bool,
}

impl std::fmt::Debug for AdmissionLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AdmissionLimiter")
            .field("permits", &state.permits)
            .field("queued", &state.queue.len())
            .field("fair", &self.fair)
            .finish()
    }
}

impl AdmissionLimiter {
    /// Creates a limiter holding `permits` permits. With `fair` set, blocked
    /// acquirers are admitted in FIFO order.
    #[must_use]
    pub fn new(permits: usize, fair: bool) -> Self {
        Self {
            state: Arc::new(Monitor::new(LimiterState {
                permits,
                queue: VecDeque::new(),
                next_ticket: 0,
            })),
            fair,
        }
    }

    #[must_use]
    pub fn is_fair(&self) -> bool {
        self.fair
    }

    /// Permits currently in the pool.
    ///
    /// This is a snapshot. Read right after a `release` it may already
    /// reflect a concurrent acquire, since the two are not one atomic step.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.state.lock().permits
    }

    /// Number of acquirers currently blocked. Advisory.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.state.lock().queue.len()
    }

    #[must_use]
    pub fn has_queued_threads(&self) -> bool {
        self.queue_length() > 0
    }

    /// Takes every available permit, returning how many were taken.
    pub fn drain_permits(&self) -> usize {
        let mut state = self.state.lock();
        std::mem::take(&mut state.permits)
    }

    /// Blocks until one permit is available and takes it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Interrupted`] if `cancel` fires while blocked.
    pub fn acquire(&self, cancel: &CancellationToken) -> SyncResult<()> {
        self.acquire_many(1, cancel)
    }

    /// Blocks until `count` permits are available and takes them at once.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidArgument`] if `count` is 0.
    /// - [`SyncError::Interrupted`] if `cancel` fires while blocked.
    pub fn acquire_many(&self, count: usize, cancel: &CancellationToken) -> SyncResult<()> {
        if self.acquire_deadline(count, None, cancel)? {
            Ok(())
        } else {
            // without a deadline the wait can only end admitted or cancelled
            Err(SyncError::Interrupted)
        }
    }

    /// Like [`AdmissionLimiter::acquire`] but returns a guard that puts the
    /// permit back when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Interrupted`] if `cancel` fires while blocked.
    pub fn acquire_permit(&self, cancel: &CancellationToken) -> SyncResult<AdmissionPermit<'_>> {
        self.acquire_many(1, cancel)?;
        Ok(AdmissionPermit {
            limiter: self,
            count: 1,
        })
    }

    /// Takes one permit if one is available right now.
    ///
    /// # Errors
    ///
    /// Never fails for a single permit; see [`AdmissionLimiter::try_acquire_many`].
    pub fn try_acquire(&self) -> SyncResult<bool> {
        self.try_acquire_many(1)
    }

    /// Takes `count` permits if they are available right now. This barges
    /// ahead of queued acquirers even in fair mode.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `count` is 0.
    pub fn try_acquire_many(&self, count: usize) -> SyncResult<bool> {
        if count == 0 {
            return Err(SyncError::InvalidArgument("acquire count must be > 0"));
        }

        let mut state = self.state.lock();
        if state.permits < count {
            return Ok(false);
        }
        state.permits -= count;
        Ok(true)
    }

    /// Waits up to `timeout` for `count` permits, honoring fairness.
    /// Returns `false` if the timeout elapsed first.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidArgument`] if `count` is 0.
    /// - [`SyncError::Interrupted`] if `cancel` fires while blocked.
    pub fn try_acquire_timeout(
        &self,
        count: usize,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> SyncResult<bool> {
        self.acquire_deadline(count, deadline_after(timeout), cancel)
    }

    /// Returns one permit to the pool. Saturates at `usize::MAX`.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.permits == usize::MAX {
            tracing::warn!("AdmissionLimiter permit count saturated, release dropped");
            return;
        }
        state.permits += 1;
        self.wake_waiters(state);
    }

    /// Returns `count` permits to the pool. Releasing 0 permits does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if the pool would overflow.
    pub fn release_many(&self, count: usize) -> SyncResult<()> {
        if count == 0 {
            return Ok(());
        }

        let mut state = self.state.lock();
        state.permits = state
            .permits
            .checked_add(count)
            .ok_or(SyncError::InvalidArgument("permit count overflow"))?;
        self.wake_waiters(state);
        Ok(())
    }

    fn wake_waiters(&self, state: MutexGuard<'_, LimiterState>) {
        let has_waiters = !state.queue.is_empty();
        drop(state);
        if has_waiters {
            self.state.notify_all();
        }
    }

    fn acquire_deadline(
        &self,
        count: usize,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> SyncResult<bool> {
        if count == 0 {
            return Err(SyncError::InvalidArgument("acquire count must be > 0"));
        }

        let mut state = self.state.lock();
        if state.permits >= count && (!self.fair || state.queue.is_empty()) {
            state.permits -= count;
            return Ok(true);
        }

        let ticket = state.enqueue(count);
        let fair = self.fair;
        let (mut state, outcome) = self.state.wait_until(state, deadline, cancel, |state| {
            state.permits >= count && (!fair || state.is_head(ticket))
        });

        state.dequeue(ticket);
        let admitted = outcome == WaitOutcome::Ready;
        if admitted {
            state.permits -= count;
        }

        // the queue head changed or permits are left over, let the rest re-check
        let wake_others = !state.queue.is_empty() && (state.permits > 0 || !admitted);
        drop(state);
        if wake_others {
            self.state.notify_all();
        }

        match outcome {
            WaitOutcome::Ready => Ok(true),
            WaitOutcome::TimedOut => Ok(false),
            WaitOutcome::Cancelled => Err(SyncError::Interrupted),
        }
    }
}

/// Permit held from an [`AdmissionLimiter`], returned to the pool on drop.
#[must_use = "dropping the permit releases it immediately"]
pub struct AdmissionPermit<'a> {
    limiter: &'a AdmissionLimiter,
    count: usize,
}

impl AdmissionPermit<'_> {
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Keeps the permit acquired without returning it to the pool.
    pub fn forget(mut self) {
        self.count = 0;
    }
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        if self.count > 0 {
            self.limiter.release();
        }
    }
}
