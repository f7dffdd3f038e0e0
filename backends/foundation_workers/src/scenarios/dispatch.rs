//! Dispatch a command to every worker, then wait for all acknowledgments.
//!
//! One gate of count 1 holds the workers until the dispatcher says "go";
//! a second gate of count `workers` lets the dispatcher block until every
//! worker has acknowledged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use foundation_sync::CountdownGate;
use serde::Deserialize;

use crate::coordinator::WorkerCoordinator;
use crate::errors::CoordinatorResult;
use crate::metrics::{EventKind, EventLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchAckConfig {
    pub workers: usize,
    /// Upper bound of the random delay before the dispatcher sends "go".
    pub dispatch_delay_ms: u64,
    /// Upper bound of the random work each worker does before acknowledging.
    pub max_work_ms: u64,
}

impl Default for DispatchAckConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            dispatch_delay_ms: 100,
            max_work_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAckReport {
    pub workers: usize,
    /// Workers that passed the command gate.
    pub commands_received: usize,
    /// Acknowledgments counted when the dispatcher resumed.
    pub acknowledgments: usize,
    pub elapsed: Duration,
}

impl DispatchAckReport {
    /// True when the dispatcher only resumed after every worker acknowledged.
    #[must_use]
    pub fn all_acknowledged(&self) -> bool {
        self.acknowledgments == self.workers
    }
}

fn random_delay(max_ms: u64) -> Duration {
    Duration::from_millis(fastrand::u64(0..=max_ms))
}

/// Runs the dispatch/acknowledge protocol.
///
/// # Errors
///
/// - [`crate::CoordinatorError::InvalidConfig`] for zero workers.
/// - [`crate::CoordinatorError::WorkerPanicked`] if a worker died.
/// - [`crate::CoordinatorError::Sync`] if a wait was interrupted.
pub fn run_dispatch_ack(
    config: &DispatchAckConfig,
    log: &EventLog,
) -> CoordinatorResult<DispatchAckReport> {
    let coordinator = WorkerCoordinator::new("dispatch", config.workers)?;
    let started = Instant::now();

    let command = CountdownGate::new(1);
    let acks = CountdownGate::new(config.workers);
    let received = Arc::new(AtomicUsize::new(0));
    let acknowledged = Arc::new(AtomicUsize::new(0));

    let workers = {
        let command = command.clone();
        let acks = acks.clone();
        let received = Arc::clone(&received);
        let acknowledged = Arc::clone(&acknowledged);
        let log = log.clone();
        let max_work_ms = config.max_work_ms;

        coordinator.spawn(move |ctx| -> CoordinatorResult<()> {
            tracing::info!("{} is ready to receive the command", ctx.name);
            log.record(Some(ctx.id), EventKind::Ready);
            command.wait(&ctx.cancel)?;

            received.fetch_add(1, Ordering::SeqCst);
            log.record(Some(ctx.id), EventKind::CommandReceived);
            tracing::info!("{} received the command", ctx.name);

            std::thread::sleep(random_delay(max_work_ms));

            acknowledged.fetch_add(1, Ordering::SeqCst);
            log.record(Some(ctx.id), EventKind::Acknowledged);
            tracing::info!("{} acknowledges the command", ctx.name);
            acks.count_down();
            Ok(())
        })?
    };

    std::thread::sleep(random_delay(config.dispatch_delay_ms));
    tracing::info!("Dispatcher sends the command to {} workers", config.workers);
    log.record(None, EventKind::Dispatched);
    command.count_down();

    let waited = acks.wait(workers.cancel_token());
    let acknowledgments = acknowledged.load(Ordering::SeqCst);
    if waited.is_ok() {
        log.record(None, EventKind::AllAcknowledged);
        tracing::info!("Dispatcher received all {} acknowledgments", acknowledgments);
    }

    // a panicked worker explains an interrupted wait better than the wait itself
    let results = workers.join()?;
    waited?;
    results
        .into_iter()
        .collect::<CoordinatorResult<Vec<()>>>()?;

    Ok(DispatchAckReport {
        workers: config.workers,
        commands_received: received.load(Ordering::SeqCst),
        acknowledgments,
        elapsed: started.elapsed(),
    })
}

impl From<DispatchAckReport> for crate::metrics::ScenarioReport {
    fn from(report: DispatchAckReport) -> Self {
        Self::DispatchAck(report)
    }
}
