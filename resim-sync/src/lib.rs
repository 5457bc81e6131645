//! # resim-sync
//!
//! Reconciles a project's experiences, tags, systems and managed test suites
//! with a declarative [`SyncConfig`](resim_core::SyncConfig).
//!
//! ## Stages
//!
//! ```text
//! config (resim-core) ─▶ state::fetch_state ─▶ plan::compute_plan ─▶ apply::Applier
//! ```
//!
//! [`pipeline::run`] chains them. The backend is reached only through
//! [`resim_api::ExperienceApi`], so every stage can run against an
//! in-memory fake.

pub mod apply;
pub mod clone;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod pool;
pub mod progress;
pub mod state;

pub use apply::{ApplyReport, Applier, PhaseReport};
pub use error::{
    ApplyError, PlanError, SyncError, EXIT_APPLY_FAILED, EXIT_CANCELLED, EXIT_OK, EXIT_REJECTED,
};
pub use pipeline::{SyncOptions, SyncReport};
pub use plan::{compute_plan, ExperienceMatch, MatchIndex, MatchState, PlanSummary, UpdatePlan};
pub use pool::{WorkerPool, DEFAULT_WORKERS};
pub use progress::{Phase, ProgressSink, Quiet};
pub use state::{fetch_state, DatabaseState};
