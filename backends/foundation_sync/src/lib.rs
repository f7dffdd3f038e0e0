//! Blocking synchronization primitives for coordinating OS threads.
//!
//! - [`CountdownGate`]: one-shot "wait until K events happened".
//! - [`PhaseBarrier`]: reusable "wait until all N parties arrive" with
//!   generation reset and broken-generation propagation.
//! - [`AdmissionLimiter`]: counting permits, "at most N holders at once".
//!
//! Every blocking call takes a [`CancellationToken`]; cancelling it unblocks
//! the call with [`SyncError::Interrupted`]. Each primitive guards its whole
//! state with one mutex and condition variable, and handles are cheap to
//! clone and share between threads.

mod barrier;
mod cancel;
mod entrylist;
mod errors;
mod gate;
mod limiter;
mod monitor;

pub use barrier::PhaseBarrier;
pub use cancel::CancellationToken;
pub use errors::{SyncError, SyncResult};
pub use gate::CountdownGate;
pub use limiter::{AdmissionLimiter, AdmissionPermit};
