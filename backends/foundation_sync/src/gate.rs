//! One-shot countdown gate.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::errors::{SyncError, SyncResult};
use crate::monitor::{deadline_after, Monitor, WaitOutcome};

/// `CountdownGate` releases every waiter once it has been counted down a
/// fixed number of times.
///
/// The gate is one-shot: when `remaining` reaches zero it stays there,
/// further [`CountdownGate::count_down`] calls do nothing and every present
/// and future wait returns immediately. Clones share the same gate.
///
/// # Examples
///
/// ```
/// use foundation_sync::{CancellationToken, CountdownGate};
/// use std::thread;
///
/// let gate = CountdownGate::new(2);
/// let token = CancellationToken::new();
///
/// let handles: Vec<_> = (0..2)
///     .map(|_| {
///         let gate = gate.clone();
///         thread::spawn(move || gate.count_down())
///     })
///     .collect();
///
/// gate.wait(&token).unwrap();
/// assert_eq!(gate.count(), 0);
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// ```
#[derive(Clone)]
pub struct CountdownGate {
    remaining: Arc<Monitor<usize>>,
}

impl std::fmt::Debug for CountdownGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownGate")
            .field("remaining", &self.count())
            .finish()
    }
}

impl CountdownGate {
    /// Creates a gate that opens after `count` calls to `count_down`.
    /// A gate created with zero is already open.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Arc::new(Monitor::new(count)),
        }
    }

    /// Current remaining count, advisory only.
    #[must_use]
    pub fn count(&self) -> usize {
        *self.remaining.lock()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.count() == 0
    }

    /// Decrements the count, opening the gate when it reaches zero.
    /// Never blocks; a no-op on an open gate.
    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        if *remaining == 0 {
            return;
        }

        *remaining -= 1;
        if *remaining == 0 {
            drop(remaining);
            tracing::debug!("CountdownGate reached zero, releasing waiters");
            self.remaining.notify_all();
        }
    }

    /// Blocks until the gate opens.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Interrupted`] if `cancel` fires while blocked.
    pub fn wait(&self, cancel: &CancellationToken) -> SyncResult<()> {
        self.wait_deadline(None, cancel).map(|_| ())
    }

    /// Blocks until the gate opens or `timeout` elapses.
    ///
    /// Returns `true` if the gate opened and `false` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Interrupted`] if `cancel` fires while blocked.
    pub fn wait_timeout(&self, timeout: Duration, cancel: &CancellationToken) -> SyncResult<bool> {
        self.wait_deadline(deadline_after(timeout), cancel)
    }

    fn wait_deadline(
        &self,
        deadline: Option<std::time::Instant>,
        cancel: &CancellationToken,
    ) -> SyncResult<bool> {
        let guard = self.remaining.lock();
        let (_guard, outcome) =
            self.remaining
                .wait_until(guard, deadline, cancel, |remaining| *remaining == 0);

        match outcome {
            WaitOutcome::Ready => Ok(true),
            WaitOutcome::TimedOut => Ok(false),
            WaitOutcome::Cancelled => Err(SyncError::Interrupted),
        }
    }
}
