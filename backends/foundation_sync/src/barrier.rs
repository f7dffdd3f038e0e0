//! Reusable multi-party rendezvous barrier.
//!
//! A [`PhaseBarrier`] blocks `parties` threads until all of them have
//! arrived, then releases them together and starts a new generation. A
//! generation that cannot complete (a party timed out, was cancelled, the
//! barrier was reset or the trip action panicked) is broken: all of its
//! waiters fail with [`SyncError::BrokenBarrier`] instead of hanging, and
//! the barrier refuses new arrivals until [`PhaseBarrier::reset`].
//!
//! The trip action runs without the barrier lock held. While it runs the
//! generation is committed: its parties are released once the action
//! returns even if their tokens fire meanwhile, and parties of the next
//! generation wait for the action to finish before they arrive.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::errors::{SyncError, SyncResult};
use crate::monitor::{deadline_after, Monitor, WaitOutcome};

type TripAction = dyn Fn() + Send + Sync;

/// One round of the barrier. Waiters keep a handle to the generation they
/// arrived in and judge their outcome by it, never by the current one.
#[derive(Debug)]
struct Generation {
    id: u64,
    // only touched under the barrier lock
    broken: AtomicBool,
}

impl Generation {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            broken: AtomicBool::new(false),
        })
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Relaxed)
    }
}

struct BarrierState {
    arrived: usize,
    current: Arc<Generation>,
    // the trip action of `current` is running outside the lock
    tripping: bool,
}

impl BarrierState {
    /// Breaks the current generation. The caller notifies the waiters.
    fn break_current(&mut self) {
        self.current.broken.store(true, Ordering::Relaxed);
        self.arrived = 0;
    }

    fn next_generation(&mut self) {
        self.arrived = 0;
        self.current = Generation::new(self.current.id + 1);
    }
}

/// Reusable rendezvous point for a fixed number of parties.
///
/// [`PhaseBarrier::wait`] returns the caller's arrival index within the
/// generation: the first arriver gets `parties - 1` and the last arriver,
/// which trips the barrier, gets `0`.
///
/// # Examples
///
/// ```
/// use foundation_sync::{CancellationToken, PhaseBarrier};
/// use std::thread;
///
/// let barrier = PhaseBarrier::new(3).unwrap();
/// let handles: Vec<_> = (0..3)
///     .map(|_| {
///         let barrier = barrier.clone();
///         thread::spawn(move || barrier.wait(&CancellationToken::new()).unwrap())
///     })
///     .collect();
///
/// let mut indices: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
/// indices.sort_unstable();
/// assert_eq!(indices, vec![0, 1, 2]);
/// assert_eq!(barrier.generation(), 1);
/// ```
#[derive(Clone)]
pub struct PhaseBarrier {
    state: Arc<Monitor<BarrierState>>,
    parties: usize,
    on_full: Option<Arc<TripAction>>,
}

impl std::fmt::Debug for PhaseBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PhaseBarrier")
            .field("parties", &self.parties)
            .field("arrived", &state.arrived)
            .field("generation", &state.current.id)
            .field("broken", &state.current.is_broken())
            .field("tripping", &state.tripping)
            .finish_non_exhaustive()
    }
}

impl PhaseBarrier {
    /// Creates a barrier for `parties` threads.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `parties` is 0.
    pub fn new(parties: usize) -> SyncResult<Self> {
        Self::build(parties, None)
    }

    /// Creates a barrier that runs `on_full` once per generation, in the
    /// thread that trips it, before any party is released.
    ///
    /// The action runs outside the barrier lock, so it may cancel tokens
    /// the parties wait with. It must not wait on or reset this barrier.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `parties` is 0.
    pub fn with_action<F>(parties: usize, on_full: F) -> SyncResult<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(parties, Some(Arc::new(on_full)))
    }

    fn build(parties: usize, on_full: Option<Arc<TripAction>>) -> SyncResult<Self> {
        if parties == 0 {
            return Err(SyncError::InvalidArgument("barrier parties must be > 0"));
        }

        Ok(Self {
            state: Arc::new(Monitor::new(BarrierState {
                arrived: 0,
                current: Generation::new(0),
                tripping: false,
            })),
            parties,
            on_full,
        })
    }

    #[must_use]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of parties currently blocked in this generation. Advisory.
    #[must_use]
    pub fn number_waiting(&self) -> usize {
        self.state.lock().arrived
    }

    /// Id of the current generation. Advances on every trip and reset.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().current.id
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.state.lock().current.is_broken()
    }

    /// Waits until all parties have arrived, returning the arrival index.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BrokenBarrier`] if the generation was broken by
    ///   another party or by [`PhaseBarrier::reset`], or already was broken
    ///   on arrival.
    /// - [`SyncError::Interrupted`] if `cancel` fired, which also breaks the
    ///   generation for every other waiter.
    pub fn wait(&self, cancel: &CancellationToken) -> SyncResult<usize> {
        self.arrive(None, cancel)
    }

    /// Like [`PhaseBarrier::wait`] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// As [`PhaseBarrier::wait`], plus [`SyncError::TimedOut`] for the
    /// caller whose timeout elapsed. The timeout breaks the generation, so
    /// every other waiter fails with [`SyncError::BrokenBarrier`].
    pub fn wait_timeout(&self, timeout: Duration, cancel: &CancellationToken) -> SyncResult<usize> {
        self.arrive(deadline_after(timeout), cancel)
    }

    /// Breaks the current generation, failing anyone blocked in it with
    /// [`SyncError::BrokenBarrier`], and starts a fresh one.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        while state.tripping {
            state = self.state.wait(state);
        }
        if state.arrived > 0 {
            tracing::warn!(
                "PhaseBarrier reset with {} parties waiting in generation {}",
                state.arrived,
                state.current.id
            );
        }
        state.break_current();
        state.next_generation();
        drop(state);
        self.state.notify_all();
    }

    fn arrive(&self, deadline: Option<Instant>, cancel: &CancellationToken) -> SyncResult<usize> {
        let mut state = self.state.lock();
        if state.tripping {
            // the running trip owns the current generation, join the next one
            let (resumed, outcome) =
                self.state.wait_until(state, deadline, cancel, |state| !state.tripping);
            state = resumed;
            match outcome {
                WaitOutcome::Ready => {}
                WaitOutcome::Cancelled => return Err(SyncError::Interrupted),
                WaitOutcome::TimedOut => return Err(SyncError::TimedOut),
            }
        }
        let generation = Arc::clone(&state.current);

        if generation.is_broken() {
            return Err(SyncError::BrokenBarrier);
        }

        if cancel.is_cancelled() {
            self.break_generation(state, "cancelled on arrival");
            return Err(SyncError::Interrupted);
        }

        state.arrived += 1;
        let index = self.parties - state.arrived;

        if index == 0 {
            return self.trip(state);
        }

        let (mut state, outcome) = self.state.wait_until(state, deadline, cancel, |state| {
            generation.is_broken() || !Arc::ptr_eq(&state.current, &generation)
        });

        if outcome != WaitOutcome::Ready {
            // a committed trip completes regardless of this party's token or deadline
            while state.tripping && Arc::ptr_eq(&state.current, &generation) {
                state = self.state.wait(state);
            }
        }

        if generation.is_broken() {
            return Err(SyncError::BrokenBarrier);
        }
        if !Arc::ptr_eq(&state.current, &generation) {
            // tripped, even if a cancel or timeout raced with the trip
            return Ok(index);
        }

        match outcome {
            WaitOutcome::Cancelled => {
                self.break_generation(state, "waiter cancelled");
                Err(SyncError::Interrupted)
            }
            WaitOutcome::TimedOut => {
                self.break_generation(state, "waiter timed out");
                Err(SyncError::TimedOut)
            }
            WaitOutcome::Ready => Err(SyncError::BrokenBarrier),
        }
    }

    fn trip<'a>(&'a self, mut state: MutexGuard<'a, BarrierState>) -> SyncResult<usize> {
        if let Some(action) = &self.on_full {
            state.tripping = true;
            drop(state);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| action()));

            state = self.state.lock();
            state.tripping = false;
            if let Err(payload) = outcome {
                self.break_generation(state, "trip action panicked");
                panic::resume_unwind(payload);
            }
        }

        tracing::debug!(
            "PhaseBarrier generation {} tripped with {} parties",
            state.current.id,
            self.parties
        );
        state.next_generation();
        drop(state);
        self.state.notify_all();
        Ok(0)
    }

    fn break_generation(&self, mut state: MutexGuard<'_, BarrierState>, reason: &str) {
        tracing::warn!(
            "PhaseBarrier generation {} broken: {}",
            state.current.id,
            reason
        );
        state.break_current();
        drop(state);
        self.state.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::timeout;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn spawn_waiters(
        barrier: &PhaseBarrier,
        count: usize,
    ) -> Vec<thread::JoinHandle<SyncResult<usize>>> {
        (0..count)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.wait(&CancellationToken::new()))
            })
            .collect()
    }

    fn wait_for_arrivals(barrier: &PhaseBarrier, count: usize) {
        while barrier.number_waiting() < count {
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// WHY: Validates barrier construction rejects zero parties
    /// WHAT: new(0) returns InvalidArgument
    #[test]
    fn zero_parties_rejected() {
        assert!(matches!(
            PhaseBarrier::new(0),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    /// WHY: Validates single party barrier
    /// WHAT: A barrier of one trips on every call and is reusable
    #[test]
    fn single_party_trips_immediately() {
        let barrier = PhaseBarrier::new(1).unwrap();
        let token = CancellationToken::new();
        assert_eq!(barrier.wait(&token), Ok(0));
        assert_eq!(barrier.wait(&token), Ok(0));
        assert_eq!(barrier.generation(), 2);
    }

    /// WHY: The trip action runs exactly once per generation
    /// WHAT: Three rounds of three parties run the action three times
    #[test]
    #[timeout(10000)]
    fn action_runs_once_per_generation() {
        let trips = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&trips);
        let barrier = PhaseBarrier::with_action(3, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let token = CancellationToken::new();
                    for _ in 0..3 {
                        barrier.wait(&token).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(trips.load(Ordering::SeqCst), 3);
        assert_eq!(barrier.generation(), 3);
        assert_eq!(barrier.number_waiting(), 0);
    }

    /// WHY: Arrival indices identify the trigger
    /// WHAT: Indices of one generation are a permutation of 0..parties
    #[test]
    #[timeout(5000)]
    fn arrival_indices_cover_all_parties() {
        let barrier = PhaseBarrier::new(4).unwrap();
        let mut indices: Vec<usize> = spawn_waiters(&barrier, 4)
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    /// WHY: A timed out party must not leave the others hanging
    /// WHAT: The timing-out party gets TimedOut, the other waiter BrokenBarrier
    #[test]
    #[timeout(5000)]
    fn timeout_breaks_generation() {
        let barrier = PhaseBarrier::new(3).unwrap();
        let waiters = spawn_waiters(&barrier, 1);
        wait_for_arrivals(&barrier, 1);

        let result = barrier.wait_timeout(Duration::from_millis(30), &CancellationToken::new());
        assert_eq!(result, Err(SyncError::TimedOut));

        for handle in waiters {
            assert_eq!(handle.join().unwrap(), Err(SyncError::BrokenBarrier));
        }
        assert!(barrier.is_broken());
        assert_eq!(
            barrier.wait(&CancellationToken::new()),
            Err(SyncError::BrokenBarrier)
        );
    }

    /// WHY: Cancellation of one party propagates as breakage
    /// WHAT: The cancelled party gets Interrupted, co-waiters BrokenBarrier
    #[test]
    #[timeout(5000)]
    fn cancel_breaks_generation() {
        let barrier = PhaseBarrier::new(3).unwrap();
        let waiters = spawn_waiters(&barrier, 1);
        wait_for_arrivals(&barrier, 1);

        let token = CancellationToken::new();
        let canceller = token.clone();
        let cancel_handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        assert_eq!(barrier.wait(&token), Err(SyncError::Interrupted));
        for handle in waiters {
            assert_eq!(handle.join().unwrap(), Err(SyncError::BrokenBarrier));
        }
        cancel_handle.join().unwrap();
    }

    /// WHY: reset must release blocked parties and make the barrier usable
    /// WHAT: Waiters fail with BrokenBarrier, then a full round succeeds
    #[test]
    #[timeout(5000)]
    fn reset_breaks_waiters_and_restores_barrier() {
        let barrier = PhaseBarrier::new(2).unwrap();
        let waiters = spawn_waiters(&barrier, 1);
        wait_for_arrivals(&barrier, 1);

        barrier.reset();
        for handle in waiters {
            assert_eq!(handle.join().unwrap(), Err(SyncError::BrokenBarrier));
        }

        assert!(!barrier.is_broken());
        assert_eq!(barrier.number_waiting(), 0);
        for handle in spawn_waiters(&barrier, 2) {
            assert!(handle.join().unwrap().is_ok());
        }
    }

    /// WHY: A cancelled party must not trip or join a generation
    /// WHAT: A pre-cancelled token breaks the barrier on arrival
    #[test]
    fn cancelled_on_arrival_breaks() {
        let barrier = PhaseBarrier::new(1).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(barrier.wait(&token), Err(SyncError::Interrupted));
        assert!(barrier.is_broken());
        assert_eq!(barrier.generation(), 0);
    }

    /// WHY: A panicking trip action must not strand the other parties
    /// WHAT: The tripping thread panics and the co-waiter sees BrokenBarrier
    #[test]
    #[timeout(5000)]
    fn panicking_action_breaks_generation() {
        let barrier = PhaseBarrier::with_action(2, || panic!("trip action failed")).unwrap();
        let waiters = spawn_waiters(&barrier, 1);
        wait_for_arrivals(&barrier, 1);

        let tripper = barrier.clone();
        let result = thread::spawn(move || tripper.wait(&CancellationToken::new())).join();
        assert!(result.is_err());

        for handle in waiters {
            assert_eq!(handle.join().unwrap(), Err(SyncError::BrokenBarrier));
        }
        assert!(barrier.is_broken());
    }

    /// WHY: The trip action may cancel a token a co-waiter is parked on
    /// WHAT: Both parties pass; the cancelled one still gets its index
    #[test]
    #[timeout(5000)]
    fn action_cancelling_a_co_waiter_does_not_hang() {
        let token = CancellationToken::new();
        let target = token.clone();
        let barrier = PhaseBarrier::with_action(2, move || target.cancel()).unwrap();

        let waiter = {
            let barrier = barrier.clone();
            let token = token.clone();
            thread::spawn(move || barrier.wait(&token))
        };
        wait_for_arrivals(&barrier, 1);

        assert_eq!(barrier.wait(&CancellationToken::new()), Ok(0));
        assert_eq!(waiter.join().unwrap(), Ok(1));
        assert!(token.is_cancelled());
        assert_eq!(barrier.generation(), 1);
        assert!(!barrier.is_broken());
    }

    /// WHY: A party arriving while the action runs belongs to the next round
    /// WHAT: It waits for the action, then trips the next generation itself
    #[test]
    #[timeout(5000)]
    fn arrival_during_action_joins_next_generation() {
        let started = crate::CountdownGate::new(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = {
            let started = started.clone();
            let runs = Arc::clone(&runs);
            PhaseBarrier::with_action(1, move || {
                started.count_down();
                thread::sleep(Duration::from_millis(50));
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };

        let first = {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.wait(&CancellationToken::new()))
        };
        started.wait(&CancellationToken::new()).unwrap();

        assert_eq!(barrier.wait(&CancellationToken::new()), Ok(0));
        assert_eq!(first.join().unwrap(), Ok(0));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(barrier.generation(), 2);
    }

    /// WHY: A timed wait that completes in time must trip like an untimed one
    /// WHAT: Two parties with generous timeouts get indices {0, 1}
    #[test]
    #[timeout(10000)]
    fn timed_wait_trips_within_deadline() {
        let barrier = PhaseBarrier::new(2).unwrap();
        let other = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait_timeout(Duration::from_secs(5), &CancellationToken::new())
            })
        };
        wait_for_arrivals(&barrier, 1);

        let mine = barrier
            .wait_timeout(Duration::from_secs(5), &CancellationToken::new())
            .unwrap();
        let theirs = other.join().unwrap().unwrap();

        let mut indices = vec![mine, theirs];
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(barrier.generation(), 1);
        assert!(!barrier.is_broken());
    }
}
