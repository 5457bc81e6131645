//! Progress reporting hooks.
//!
//! The engine never prints; it calls a [`ProgressSink`] and lets the caller
//! decide between a progress display and silence.

use std::fmt;

use crate::plan::PlanSummary;

/// A unit of parallel work reported as "completed / total".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Per-tag and per-system membership listing during the fetch.
    Memberships,
    /// Create / restore / update calls.
    Experiences,
    /// Test-suite revisions.
    TestSuites,
    /// Tag additions and removals, system additions.
    TagsAndSystems,
    /// The bulk archive call.
    Archive,
}

impl Phase {
    /// The four apply phases, in execution order.
    pub const APPLY: [Phase; 4] = [
        Phase::Experiences,
        Phase::TestSuites,
        Phase::TagsAndSystems,
        Phase::Archive,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Memberships => write!(f, "memberships"),
            Phase::Experiences => write!(f, "experiences"),
            Phase::TestSuites => write!(f, "test suites"),
            Phase::TagsAndSystems => write!(f, "tags and systems"),
            Phase::Archive => write!(f, "archive"),
        }
    }
}

/// Receives progress callbacks. Every method defaults to a no-op.
pub trait ProgressSink: Send + Sync {
    fn plan_ready(&self, _summary: &PlanSummary) {}

    fn phase_started(&self, _phase: Phase, _total: usize) {}

    fn item_completed(&self, _phase: Phase, _completed: usize, _total: usize) {}

    fn phase_finished(&self, _phase: Phase, _completed: usize, _failed: usize) {}
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quiet;

impl ProgressSink for Quiet {}
