//! Bounded admission: more workers than permits compete for a limiter, and
//! at most `capacity` of them are ever inside the guarded section.

use std::sync::Arc;
use std::time::{Duration, Instant};

use foundation_sync::AdmissionLimiter;
use serde::Deserialize;

use crate::coordinator::WorkerCoordinator;
use crate::errors::{CoordinatorError, CoordinatorResult};
use crate::metrics::{ConcurrencyGauge, EventKind, EventLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BoundedConfig {
    pub workers: usize,
    pub capacity: usize,
    /// How long a worker keeps its permit.
    pub hold_ms: u64,
    /// FIFO admission instead of barging.
    pub fair: bool,
}

impl Default for BoundedConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            capacity: 2,
            hold_ms: 100,
            fair: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedReport {
    pub workers: usize,
    pub capacity: usize,
    /// Highest number of workers holding a permit at once.
    pub max_concurrent: usize,
    pub admissions: usize,
    /// Permits available once every worker left; equals `capacity`.
    pub final_permits: usize,
    pub elapsed: Duration,
}

impl BoundedReport {
    #[must_use]
    pub fn within_capacity(&self) -> bool {
        self.max_concurrent <= self.capacity
    }
}

/// Runs the bounded admission scenario.
///
/// # Errors
///
/// - [`CoordinatorError::InvalidConfig`] for zero workers or zero capacity.
/// - [`CoordinatorError::Sync`] if an acquire was interrupted.
/// - [`CoordinatorError::WorkerPanicked`] if a worker died.
pub fn run_bounded(config: &BoundedConfig, log: &EventLog) -> CoordinatorResult<BoundedReport> {
    if config.capacity == 0 {
        return Err(CoordinatorError::InvalidConfig("capacity must be > 0"));
    }
    if config.capacity >= config.workers {
        tracing::warn!(
            "capacity {} admits all {} workers, nothing will contend",
            config.capacity,
            config.workers
        );
    }

    let coordinator = WorkerCoordinator::new("bounded", config.workers)?;
    let started = Instant::now();

    let limiter = Arc::new(AdmissionLimiter::new(config.capacity, config.fair));
    let gauge = Arc::new(ConcurrencyGauge::new());

    let results = {
        let limiter = Arc::clone(&limiter);
        let gauge = Arc::clone(&gauge);
        let log = log.clone();
        let hold = Duration::from_millis(config.hold_ms);

        coordinator.run(move |ctx| -> CoordinatorResult<()> {
            tracing::debug!("{} asks for a permit", ctx.name);
            let permit = limiter.acquire_permit(&ctx.cancel)?;

            let concurrent = gauge.enter();
            log.record(Some(ctx.id), EventKind::Admitted { concurrent });
            tracing::info!("{} entered, {} inside", ctx.name, concurrent);

            std::thread::sleep(hold);

            gauge.leave();
            drop(permit);

            let available = limiter.available_permits();
            log.record(Some(ctx.id), EventKind::Left { available });
            tracing::info!("{} left, {} permits available", ctx.name, available);
            Ok(())
        })?
    };
    results
        .into_iter()
        .collect::<CoordinatorResult<Vec<()>>>()?;

    Ok(BoundedReport {
        workers: config.workers,
        capacity: config.capacity,
        max_concurrent: gauge.peak(),
        admissions: gauge.total(),
        final_permits: limiter.available_permits(),
        elapsed: started.elapsed(),
    })
}

impl From<BoundedReport> for crate::metrics::ScenarioReport {
    fn from(report: BoundedReport) -> Self {
        Self::Bounded(report)
    }
}
