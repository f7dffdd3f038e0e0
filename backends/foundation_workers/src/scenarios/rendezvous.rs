//! Multi-stage rendezvous: every worker passes the same barrier at each of
//! a sequence of meeting points, reusing one barrier across generations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use foundation_sync::PhaseBarrier;
use serde::Deserialize;

use crate::coordinator::WorkerCoordinator;
use crate::errors::{CoordinatorError, CoordinatorResult};
use crate::metrics::{EventKind, EventLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    pub workers: usize,
    pub meeting_points: usize,
    /// Upper bound of the random travel time between meeting points.
    pub max_travel_ms: u64,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            meeting_points: 2,
            max_travel_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousReport {
    pub workers: usize,
    /// Times the barrier released its parties, counted by its trip action.
    pub releases: usize,
    /// Barrier generations consumed by the run.
    pub generations: u64,
    /// Workers that passed each meeting point, indexed by point.
    pub passes: Vec<usize>,
    /// Arrival index 0 holders per meeting point; always one per point.
    pub triggers: Vec<usize>,
    pub elapsed: Duration,
}

/// Runs the rendezvous scenario.
///
/// # Errors
///
/// - [`CoordinatorError::InvalidConfig`] for zero workers or meeting points.
/// - [`CoordinatorError::Sync`] if the barrier broke.
/// - [`CoordinatorError::WorkerPanicked`] if a worker died.
pub fn run_rendezvous(config: &RendezvousConfig, log: &EventLog) -> CoordinatorResult<RendezvousReport> {
    if config.meeting_points == 0 {
        return Err(CoordinatorError::InvalidConfig("meeting points must be > 0"));
    }
    let coordinator = WorkerCoordinator::new("rendezvous", config.workers)?;
    let started = Instant::now();

    let releases = Arc::new(AtomicUsize::new(0));
    let barrier = {
        let releases = Arc::clone(&releases);
        PhaseBarrier::with_action(config.workers, move || {
            let released = releases.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!("Everyone arrived, releasing meeting point {}", released);
        })?
    };

    let passes: Arc<Vec<AtomicUsize>> =
        Arc::new((0..config.meeting_points).map(|_| AtomicUsize::new(0)).collect());
    let triggers: Arc<Vec<AtomicUsize>> =
        Arc::new((0..config.meeting_points).map(|_| AtomicUsize::new(0)).collect());

    let results = {
        let barrier = barrier.clone();
        let passes = Arc::clone(&passes);
        let triggers = Arc::clone(&triggers);
        let log = log.clone();
        let config = *config;

        coordinator.run(move |ctx| -> CoordinatorResult<()> {
            for point in 0..config.meeting_points {
                std::thread::sleep(Duration::from_millis(fastrand::u64(
                    0..=config.max_travel_ms,
                )));

                let waiting = barrier.number_waiting();
                tracing::info!(
                    "{} is about to reach meeting point {}, {} already waiting",
                    ctx.name,
                    point + 1,
                    waiting
                );
                log.record(Some(ctx.id), EventKind::Arriving { point, waiting });

                if barrier.wait(&ctx.cancel)? == 0 {
                    triggers[point].fetch_add(1, Ordering::SeqCst);
                }

                passes[point].fetch_add(1, Ordering::SeqCst);
                log.record(Some(ctx.id), EventKind::Passed { point });
                tracing::info!("{} passed meeting point {}", ctx.name, point + 1);
            }
            Ok(())
        })?
    };
    results
        .into_iter()
        .collect::<CoordinatorResult<Vec<()>>>()?;

    Ok(RendezvousReport {
        workers: config.workers,
        releases: releases.load(Ordering::SeqCst),
        generations: barrier.generation(),
        passes: passes.iter().map(|count| count.load(Ordering::SeqCst)).collect(),
        triggers: triggers
            .iter()
            .map(|count| count.load(Ordering::SeqCst))
            .collect(),
        elapsed: started.elapsed(),
    })
}

impl From<RendezvousReport> for crate::metrics::ScenarioReport {
    fn from(report: RendezvousReport) -> Self {
        Self::Rendezvous(report)
    }
}
