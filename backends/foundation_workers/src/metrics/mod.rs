//! Observable side effects of the scenarios: a concurrency gauge and an
//! ordered event log.

pub mod reporter;

pub use reporter::ScenarioReport;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Counts holders of a guarded section and remembers the highest count
/// ever observed.
///
/// # Examples
///
/// ```
/// use foundation_workers::metrics::ConcurrencyGauge;
///
/// let gauge = ConcurrencyGauge::new();
/// assert_eq!(gauge.enter(), 1);
/// assert_eq!(gauge.enter(), 2);
/// gauge.leave();
/// assert_eq!(gauge.current(), 1);
/// assert_eq!(gauge.peak(), 2);
/// assert_eq!(gauge.total(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl ConcurrencyGauge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an entry and returns the number of holders including it.
    pub fn enter(&self) -> usize {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::Relaxed);
        now
    }

    pub fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of entries recorded so far.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Worker started and is about to wait for the command.
    Ready,
    /// Dispatcher opened the command gate.
    Dispatched,
    /// Worker passed the command gate.
    CommandReceived,
    /// Worker counted down the acknowledgment gate.
    Acknowledged,
    /// Dispatcher saw every acknowledgment.
    AllAcknowledged,
    /// Worker is about to wait at meeting point `point`; `waiting` parties
    /// were already there (advisory).
    Arriving { point: usize, waiting: usize },
    /// Worker passed meeting point `point`.
    Passed { point: usize },
    /// Worker got a permit; `concurrent` holders including itself.
    Admitted { concurrent: usize },
    /// Worker returned its permit; `available` is a racy snapshot taken
    /// after the release.
    Left { available: usize },
}

/// One recorded event. `worker` is `None` for the coordinating thread.
#[derive(Debug, Clone, Copy)]
pub struct WorkerEvent {
    pub worker: Option<usize>,
    pub kind: EventKind,
    pub at: Instant,
}

/// Append-only, shareable event log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<WorkerEvent>>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> MutexGuard<'_, Vec<WorkerEvent>> {
        match self.events.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    pub fn record(&self, worker: Option<usize>, kind: EventKind) {
        self.events().push(WorkerEvent {
            worker,
            kind,
            at: Instant::now(),
        });
    }

    /// Events in recording order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<WorkerEvent> {
        self.events().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    #[must_use]
    pub fn count(&self, matches: impl Fn(&EventKind) -> bool) -> usize {
        self.events().iter().filter(|event| matches(&event.kind)).count()
    }

    /// Position of the first event matching `matches`.
    #[must_use]
    pub fn position(&self, matches: impl Fn(&EventKind) -> bool) -> Option<usize> {
        self.events().iter().position(|event| matches(&event.kind))
    }

    /// Position of the last event matching `matches`.
    #[must_use]
    pub fn last_position(&self, matches: impl Fn(&EventKind) -> bool) -> Option<usize> {
        self.events().iter().rposition(|event| matches(&event.kind))
    }
}
