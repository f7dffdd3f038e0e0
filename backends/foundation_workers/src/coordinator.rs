//! Spawns a fixed set of named worker threads sharing one cancellation token.

use std::thread;

use foundation_sync::CancellationToken;

use crate::errors::{CoordinatorError, CoordinatorResult};

/// What a worker gets to know about itself.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub id: usize,
    pub name: String,
    pub cancel: CancellationToken,
}

/// Cancels the shared token if the worker unwinds, so co-workers blocked on
/// a primitive are released instead of waiting for a party that is gone.
struct CancelOnPanic(CancellationToken);

impl Drop for CancelOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::debug!("worker panicked, cancelling co-workers");
            self.0.cancel();
        }
    }
}

/// `WorkerCoordinator` runs `workers` independent threads named
/// `<name>-worker-<id>` and collects their results.
///
/// # Examples
///
/// ```
/// use foundation_workers::WorkerCoordinator;
///
/// let coordinator = WorkerCoordinator::new("doc", 3).unwrap();
/// let mut ids = coordinator.run(|ctx| ctx.id).unwrap();
/// ids.sort_unstable();
/// assert_eq!(ids, vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct WorkerCoordinator {
    name: &'static str,
    workers: usize,
}

impl WorkerCoordinator {
    /// # Errors
    ///
    /// Returns [`CoordinatorError::InvalidConfig`] when `workers` is 0.
    pub fn new(name: &'static str, workers: usize) -> CoordinatorResult<Self> {
        if workers == 0 {
            return Err(CoordinatorError::InvalidConfig("worker count must be > 0"));
        }
        Ok(Self { name, workers })
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Starts all workers and returns without waiting for them.
    ///
    /// If a spawn fails, the workers already started are cancelled and
    /// joined before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Spawn`] if the OS refuses a thread.
    pub fn spawn<F, R>(&self, work: F) -> CoordinatorResult<WorkerSet<R>>
    where
        F: Fn(WorkerContext) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let work = std::sync::Arc::new(work);
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.workers);

        for id in 0..self.workers {
            let name = format!("{}-worker-{}", self.name, id);
            let ctx = WorkerContext {
                id,
                name: name.clone(),
                cancel: cancel.clone(),
            };
            let work = std::sync::Arc::clone(&work);

            let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                let _guard = CancelOnPanic(ctx.cancel.clone());
                work(ctx)
            });

            match spawned {
                Ok(handle) => handles.push((name, handle)),
                Err(err) => {
                    tracing::error!("Failed to spawn {}: {}", name, err);
                    cancel.cancel();
                    let partial = WorkerSet { handles, cancel };
                    // the spawn error is what the caller needs to see
                    let _ = partial.join();
                    return Err(CoordinatorError::Spawn(err));
                }
            }
        }

        tracing::debug!("Spawned {} workers for {}", self.workers, self.name);
        Ok(WorkerSet { handles, cancel })
    }

    /// Spawns all workers and waits for every one of them.
    ///
    /// # Errors
    ///
    /// See [`WorkerCoordinator::spawn`] and [`WorkerSet::join`].
    pub fn run<F, R>(&self, work: F) -> CoordinatorResult<Vec<R>>
    where
        F: Fn(WorkerContext) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.spawn(work)?.join()
    }
}

/// Handles of running workers.
pub struct WorkerSet<R> {
    handles: Vec<(String, thread::JoinHandle<R>)>,
    cancel: CancellationToken,
}

impl<R> WorkerSet<R> {
    /// Token shared by every worker in the set. Cancelled automatically when
    /// a worker panics.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Joins every worker, returning results in worker id order.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::WorkerPanicked`] naming the first worker
    /// that panicked. All workers are joined regardless.
    pub fn join(self) -> CoordinatorResult<Vec<R>> {
        let mut results = Vec::with_capacity(self.handles.len());
        let mut panicked = None;

        for (name, handle) in self.handles {
            match handle.join() {
                Ok(result) => results.push(result),
                Err(_) => {
                    tracing::error!("Worker {} panicked", name);
                    panicked.get_or_insert(name);
                }
            }
        }

        match panicked {
            Some(name) => Err(CoordinatorError::WorkerPanicked(name)),
            None => Ok(results),
        }
    }
}
