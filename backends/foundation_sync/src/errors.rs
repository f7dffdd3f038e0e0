use thiserror::Error;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Failures a caller of the blocking primitives can observe.
///
/// Timeouts of a [`crate::CountdownGate`] or [`crate::AdmissionLimiter`]
/// are not errors, they are reported as `false` by the timed variants.
/// Only the [`crate::PhaseBarrier`] turns a timeout into a failure since a
/// partial rendezvous cannot silently proceed.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("wait was cancelled while blocked")]
    Interrupted,

    #[error("barrier generation is broken")]
    BrokenBarrier,

    #[error("timed out waiting for the barrier to trip")]
    TimedOut,
}

impl SyncError {
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        matches!(self, Self::BrokenBarrier)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}
