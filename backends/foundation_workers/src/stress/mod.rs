//! High-contention runs over the coordinator.
//!
//! A [`StressHarness`] drives an operation closure from every worker for a
//! fixed number of iterations or until a deadline passes, counting how many
//! calls reported success.

use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use foundation_sync::AdmissionLimiter;

use crate::coordinator::{WorkerContext, WorkerCoordinator};
use crate::errors::{CoordinatorError, CoordinatorResult};
use crate::metrics::ConcurrencyGauge;

pub mod config;

pub use config::StressConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct StressResult {
    pub successes: usize,
    pub failures: usize,
    pub duration: Duration,
    pub thread_count: usize,
}

impl StressResult {
    #[must_use]
    pub const fn total_operations(&self) -> usize {
        self.successes + self.failures
    }

    /// Between 0.0 and 1.0; 0.0 when nothing ran.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_operations() == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_operations() as f64
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn operations_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.total_operations() as f64 / secs
        }
    }
}

pub struct StressHarness {
    config: StressConfig,
}

impl StressHarness {
    #[must_use]
    pub const fn new(config: StressConfig) -> Self {
        Self { config }
    }

    /// Runs `operation(thread_id, iteration)` on every worker. A `true`
    /// return counts as a success.
    ///
    /// # Examples
    ///
    /// ```
    /// use foundation_workers::stress::{StressConfig, StressHarness};
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// let harness = StressHarness::new(StressConfig::new().threads(4).iterations(100));
    ///
    /// let seen = Arc::clone(&counter);
    /// let result = harness
    ///     .run(move |_thread_id, _iteration| {
    ///         seen.fetch_add(1, Ordering::Relaxed);
    ///         true
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(counter.load(Ordering::Relaxed), 400);
    /// assert_eq!(result.successes, 400);
    /// ```
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::InvalidConfig`] for zero threads.
    /// - [`CoordinatorError::WorkerPanicked`] if `operation` panicked.
    pub fn run<F>(self, operation: F) -> CoordinatorResult<StressResult>
    where
        F: Fn(usize, usize) -> bool + Send + Sync + 'static,
    {
        self.run_with_context(move |ctx, iteration| operation(ctx.id, iteration))
    }

    /// Like [`StressHarness::run`] but hands the operation the worker's
    /// context, so blocking calls can use the shared cancellation token and
    /// get released when a co-worker panics.
    ///
    /// # Errors
    ///
    /// See [`StressHarness::run`].
    pub fn run_with_context<F>(self, operation: F) -> CoordinatorResult<StressResult>
    where
        F: Fn(&WorkerContext, usize) -> bool + Send + Sync + 'static,
    {
        let coordinator = WorkerCoordinator::new("stress", self.config.thread_count())?;
        let started = Instant::now();
        let deadline = self
            .config
            .max_duration()
            .and_then(|limit| started.checked_add(limit));

        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        {
            let successes = Arc::clone(&successes);
            let failures = Arc::clone(&failures);
            let iterations = self.config.iteration_count();

            coordinator.run(move |ctx| {
                for iteration in 0..iterations {
                    if ctx.cancel.is_cancelled() || deadline.is_some_and(|at| Instant::now() >= at) {
                        break;
                    }
                    if operation(&ctx, iteration) {
                        successes.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })?;
        }

        let result = StressResult {
            successes: successes.load(Ordering::Relaxed),
            failures: failures.load(Ordering::Relaxed),
            duration: started.elapsed(),
            thread_count: self.config.thread_count(),
        };
        tracing::debug!(
            "stress run finished: {} ok, {} failed in {:?}",
            result.successes,
            result.failures,
            result.duration
        );
        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimiterStressResult {
    pub stress: StressResult,
    /// Most holders ever seen inside the limiter at once.
    pub peak_holders: usize,
    /// Permits left once every thread finished.
    pub final_permits: usize,
}

/// Hammers one limiter of `capacity` permits. An iteration fails if it
/// observed more holders than `capacity`.
///
/// # Errors
///
/// - [`CoordinatorError::InvalidConfig`] for zero capacity or threads.
/// - [`CoordinatorError::WorkerPanicked`] if a thread died.
pub fn run_limiter_stress(
    config: StressConfig,
    capacity: usize,
    fair: bool,
) -> CoordinatorResult<LimiterStressResult> {
    if capacity == 0 {
        return Err(CoordinatorError::InvalidConfig("capacity must be > 0"));
    }

    let limiter = Arc::new(AdmissionLimiter::new(capacity, fair));
    let gauge = Arc::new(ConcurrencyGauge::new());

    let stress = {
        let limiter = Arc::clone(&limiter);
        let gauge = Arc::clone(&gauge);
        StressHarness::new(config).run_with_context(move |ctx, _iteration| {
            let Ok(_permit) = limiter.acquire_permit(&ctx.cancel) else {
                return false;
            };
            let holders = gauge.enter();
            std::thread::yield_now();
            gauge.leave();
            holders <= capacity
        })?
    };

    Ok(LimiterStressResult {
        stress,
        peak_holders: gauge.peak(),
        final_permits: limiter.available_permits(),
    })
}
