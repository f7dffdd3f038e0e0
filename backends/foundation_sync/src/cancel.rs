//! Cooperative cancellation for blocking waits.
//!
//! A [`CancellationToken`] is handed to every blocking call of the
//! primitives in this crate. While a call is blocked it parks a [`Waker`]
//! on the token; cancelling the token flips the flag and wakes every parked
//! waiter so it can observe the cancellation and fail with
//! [`crate::SyncError::Interrupted`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::entrylist::{Entry, EntryList};

/// Something that can be poked out of a blocking wait.
pub(crate) trait Waker: Send + Sync {
    fn wake(&self);
}

type SharedWaker = Arc<dyn Waker>;

struct TokenState {
    cancelled: AtomicBool,
    wakers: Mutex<EntryList<SharedWaker>>,
}

impl TokenState {
    fn wakers(&self) -> MutexGuard<'_, EntryList<SharedWaker>> {
        match self.wakers.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }
}

/// Shared cancellation flag. Clones observe and trigger the same signal.
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                wakers: Mutex::new(EntryList::new()),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Cancels the token and wakes every waiter currently parked on it.
    ///
    /// Calling `cancel` more than once is a no-op.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        // wakers lock the waiter's monitor, so they must run without the list lock held
        let wakers = self.state.wakers().drain();
        tracing::debug!("Cancellation token fired, waking {} waiters", wakers.len());
        for waker in wakers {
            waker.wake();
        }
    }

    /// Number of waiters currently parked on this token.
    #[must_use]
    pub fn parked_waiters(&self) -> usize {
        self.state.wakers().active_slots()
    }

    /// Parks `waker` on the token until the returned [`Registration`] is
    /// dropped.
    ///
    /// Returns `None` when the token is already cancelled, the caller must
    /// then treat the wait as cancelled right away.
    pub(crate) fn register(&self, waker: SharedWaker) -> Option<Registration> {
        let mut wakers = self.state.wakers();
        if self.is_cancelled() {
            return None;
        }
        let entry = wakers.insert(waker);
        drop(wakers);

        Some(Registration {
            token: self.clone(),
            entry,
        })
    }
}

/// Removes a parked waker from its token when dropped.
pub(crate) struct Registration {
    token: CancellationToken,
    entry: Entry,
}

impl Drop for Registration {
    fn drop(&mut self) {
        // a drained (cancelled) entry is already gone, take() then returns None
        let _ = self.token.state.wakers().take(&self.entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingWaker(AtomicUsize);

    impl Waker for CountingWaker {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// WHY: Clones must share the same signal
    /// WHAT: Cancelling a clone is visible through the original
    #[test]
    fn clones_share_cancellation() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());

        clone.cancel();
        assert!(token.is_cancelled());
    }

    /// WHY: Parked waiters must be woken exactly once on cancel
    /// WHAT: cancel wakes registered wakers and repeated cancels do nothing
    #[test]
    fn cancel_wakes_registered_wakers_once() {
        let token = CancellationToken::new();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));

        let registration = token.register(waker.clone());
        assert!(registration.is_some());
        assert_eq!(token.parked_waiters(), 1);

        token.cancel();
        token.cancel();
        assert_eq!(waker.0.load(Ordering::SeqCst), 1);
        assert_eq!(token.parked_waiters(), 0);

        drop(registration);
        assert_eq!(token.parked_waiters(), 0);
    }

    /// WHY: A finished wait must not leave its waker behind
    /// WHAT: Dropping the registration unparks the waker
    #[test]
    fn dropping_registration_unparks() {
        let token = CancellationToken::new();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));

        let registration = token.register(waker.clone());
        drop(registration);
        assert_eq!(token.parked_waiters(), 0);

        token.cancel();
        assert_eq!(waker.0.load(Ordering::SeqCst), 0);
    }

    /// WHY: Registering after cancellation would park forever
    /// WHAT: register refuses once the token is cancelled
    #[test]
    fn register_refuses_after_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));
        assert!(token.register(waker).is_none());
    }
}
