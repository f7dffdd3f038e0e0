//! Human readable scenario reports.

use std::fmt;

use crate::scenarios::{BoundedReport, DispatchAckReport, RendezvousReport};

/// Outcome of one scenario run, printable as a short report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioReport {
    DispatchAck(DispatchAckReport),
    Rendezvous(RendezvousReport),
    Bounded(BoundedReport),
}

impl ScenarioReport {
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::DispatchAck(_) => "Dispatch and acknowledge",
            Self::Rendezvous(_) => "Multi-stage rendezvous",
            Self::Bounded(_) => "Bounded admission",
        }
    }

    /// Whether the run upheld the guarantee its primitive exists for.
    #[must_use]
    pub fn passed(&self) -> bool {
        match self {
            Self::DispatchAck(report) => report.all_acknowledged(),
            Self::Rendezvous(report) => {
                report.passes.iter().all(|count| *count == report.workers)
                    && report.triggers.iter().all(|count| *count == 1)
            }
            Self::Bounded(report) => {
                report.within_capacity() && report.final_permits == report.capacity
            }
        }
    }

    #[must_use]
    pub fn to_string_pretty(&self) -> String {
        let mut report = format!("=== {} ===\n", self.title());

        match self {
            Self::DispatchAck(r) => {
                report.push_str(&format!("Workers: {}\n", r.workers));
                report.push_str(&format!("Commands received: {}\n", r.commands_received));
                report.push_str(&format!("Acknowledgments: {}\n", r.acknowledgments));
                report.push_str(&format!("Duration: {:?}\n", r.elapsed));
            }
            Self::Rendezvous(r) => {
                report.push_str(&format!("Workers: {}\n", r.workers));
                report.push_str(&format!("Releases: {}\n", r.releases));
                report.push_str(&format!("Generations: {}\n", r.generations));
                for (point, passes) in r.passes.iter().enumerate() {
                    report.push_str(&format!("  Point {}: {} passed\n", point + 1, passes));
                }
                report.push_str(&format!("Duration: {:?}\n", r.elapsed));
            }
            Self::Bounded(r) => {
                report.push_str(&format!("Workers: {}\n", r.workers));
                report.push_str(&format!("Capacity: {}\n", r.capacity));
                report.push_str(&format!("Max concurrent: {}\n", r.max_concurrent));
                report.push_str(&format!("Admissions: {}\n", r.admissions));
                report.push_str(&format!("Final permits: {}\n", r.final_permits));
                report.push_str(&format!("Duration: {:?}\n", r.elapsed));
            }
        }

        report.push_str(if self.passed() { "Result: ok\n" } else { "Result: FAILED\n" });
        report
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_pretty())
    }
}
