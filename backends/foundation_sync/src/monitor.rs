//! Mutex and condition variable pair guarding the state of one primitive.
//!
//! Every primitive in this crate keeps all of its counters behind a single
//! [`Monitor`], so each state transition happens under one lock and each
//! waiter re-checks its predicate in a loop after waking.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::cancel::{CancellationToken, Waker};

/// How a [`Monitor::wait_until`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    /// The predicate holds.
    Ready,
    /// The deadline passed before the predicate held.
    TimedOut,
    /// The token was cancelled before the predicate held.
    Cancelled,
}

pub(crate) struct Monitor<T> {
    state: Mutex<T>,
    condvar: Condvar,
}

impl<T> Monitor<T> {
    pub(crate) fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            condvar: Condvar::new(),
        }
    }

    /// Locks the state. Poisoning is ignored: the state is only mutated in
    /// whole transitions, so a panic elsewhere never leaves it half written.
    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        match self.state.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    pub(crate) fn notify_all(&self) {
        self.condvar.notify_all();
    }

    /// One uninterruptible condvar wait. Callers loop on their own predicate.
    pub(crate) fn wait<'a>(&'a self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        match self.condvar.wait(guard) {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }
}

impl<T: Send + 'static> Monitor<T> {
    /// Blocks on the condition variable until `ready` holds for the guarded
    /// state, the `deadline` passes or `cancel` fires.
    ///
    /// The predicate is checked first, so an already satisfied wait never
    /// consults the token or the clock.
    pub(crate) fn wait_until<'a, F>(
        self: &'a Arc<Self>,
        mut guard: MutexGuard<'a, T>,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
        mut ready: F,
    ) -> (MutexGuard<'a, T>, WaitOutcome)
    where
        F: FnMut(&T) -> bool,
    {
        if ready(&guard) {
            return (guard, WaitOutcome::Ready);
        }

        let waker: Arc<dyn Waker> = self.clone();
        let Some(_registration) = cancel.register(waker) else {
            return (guard, WaitOutcome::Cancelled);
        };

        loop {
            if ready(&guard) {
                return (guard, WaitOutcome::Ready);
            }
            if cancel.is_cancelled() {
                return (guard, WaitOutcome::Cancelled);
            }

            match deadline {
                None => {
                    guard = match self.condvar.wait(guard) {
                        Ok(g) => g,
                        Err(e) => e.into_inner(),
                    };
                }
                Some(deadline) => {
                    let Some(remaining) = remaining_until(deadline) else {
                        return (guard, WaitOutcome::TimedOut);
                    };
                    guard = match self.condvar.wait_timeout(guard, remaining) {
                        Ok((g, _)) => g,
                        Err(e) => e.into_inner().0,
                    };
                }
            }
        }
    }
}

impl<T: Send> Waker for Monitor<T> {
    fn wake(&self) {
        // taking the lock orders this notify after the waiter's predicate check
        drop(self.lock());
        self.notify_all();
    }
}

/// Converts a relative timeout into an absolute deadline. A timeout too
/// large to represent means "no deadline".
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn remaining_until(deadline: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        None
    } else {
        Some(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// WHY: A satisfied predicate must not block or touch the token
    /// WHAT: wait_until returns Ready even when the token is cancelled
    #[test]
    fn ready_predicate_short_circuits() {
        let monitor = Arc::new(Monitor::new(true));
        let token = CancellationToken::new();
        token.cancel();

        let guard = monitor.lock();
        let (_guard, outcome) = monitor.wait_until(guard, None, &token, |ready| *ready);
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    /// WHY: Deadlines bound the wait
    /// WHAT: An unsatisfiable predicate with a short deadline times out
    #[test]
    fn deadline_times_out() {
        let monitor = Arc::new(Monitor::new(false));
        let token = CancellationToken::new();

        let guard = monitor.lock();
        let deadline = deadline_after(Duration::from_millis(20));
        let (_guard, outcome) = monitor.wait_until(guard, deadline, &token, |ready| *ready);
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(token.parked_waiters(), 0);
    }

    /// WHY: Cancellation must unblock an indefinite wait
    /// WHAT: Cancelling from another thread yields Cancelled
    #[test]
    fn cancel_unblocks_wait() {
        let monitor = Arc::new(Monitor::new(false));
        let token = CancellationToken::new();

        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });

        let guard = monitor.lock();
        let (_guard, outcome) = monitor.wait_until(guard, None, &token, |ready| *ready);
        assert_eq!(outcome, WaitOutcome::Cancelled);
        handle.join().unwrap();
    }

    /// WHY: State changes must be observed by blocked waiters
    /// WHAT: Flipping the state and notifying yields Ready
    #[test]
    fn notify_wakes_waiter() {
        let monitor = Arc::new(Monitor::new(false));
        let token = CancellationToken::new();

        let setter = Arc::clone(&monitor);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            *setter.lock() = true;
            setter.notify_all();
        });

        let guard = monitor.lock();
        let (guard, outcome) = monitor.wait_until(guard, None, &token, |ready| *ready);
        assert_eq!(outcome, WaitOutcome::Ready);
        assert!(*guard);
        drop(guard);
        handle.join().unwrap();
    }
}
