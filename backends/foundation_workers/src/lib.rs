//! Worker threads that coordinate through `foundation_sync` primitives.
//!
//! This crate provides:
//! - **Coordinator**: named worker threads sharing one cancellation token
//! - **Scenarios**: dispatch/acknowledge, multi-stage rendezvous and bounded
//!   admission, each returning a report
//! - **Metrics**: an event log and a concurrency gauge the scenarios record into
//! - **Stress**: a harness for high-contention runs
//!
//! # Examples
//!
//! ```rust
//! use foundation_workers::metrics::EventLog;
//! use foundation_workers::scenarios::{run_bounded, BoundedConfig};
//!
//! let config = BoundedConfig {
//!     workers: 4,
//!     capacity: 2,
//!     hold_ms: 5,
//!     fair: true,
//! };
//! let report = run_bounded(&config, &EventLog::new()).unwrap();
//! assert!(report.max_concurrent <= 2);
//! assert_eq!(report.final_permits, 2);
//! ```

#![allow(clippy::module_name_repetitions)]

mod coordinator;
mod errors;

pub mod metrics;
pub mod scenarios;
pub mod stress;

pub use coordinator::{WorkerContext, WorkerCoordinator, WorkerSet};
pub use errors::{CoordinatorError, CoordinatorResult};
pub use metrics::{EventKind, EventLog, ScenarioReport};
