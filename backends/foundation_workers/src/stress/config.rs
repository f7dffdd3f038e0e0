use core::time::Duration;

/// Shape of a stress run: how many threads, how many iterations each, and
/// an optional wall-clock cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    thread_count: usize,
    iterations: usize,
    duration: Option<Duration>,
}

impl StressConfig {
    /// Four threads, 1000 iterations each, no time cap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            thread_count: 4,
            iterations: 1000,
            duration: None,
        }
    }

    #[must_use]
    pub const fn threads(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    #[must_use]
    pub const fn iterations(mut self, count: usize) -> Self {
        self.iterations = count;
        self
    }

    /// Threads stop at the first iteration boundary past `duration`.
    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub const fn thread_count(&self) -> usize {
        self.thread_count
    }

    #[must_use]
    pub const fn iteration_count(&self) -> usize {
        self.iterations
    }

    #[must_use]
    pub const fn max_duration(&self) -> Option<Duration> {
        self.duration
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self::new()
    }
}
