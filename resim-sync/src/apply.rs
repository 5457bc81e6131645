//! Applier: execute an [`UpdatePlan`] against the backend.
//!
//! ## Phases
//!
//! 1. **Experiences**: create, restore+update, update. Created ids are
//!    written back into the plan once the phase has drained.
//! 2. **Test suites**: one revision per managed suite.
//! 3. **Tags and systems**: bulk tag additions, per-experience tag removals,
//!    bulk system additions.
//! 4. **Archive**: a single bulk call.
//!
//! A failed item never aborts its phase, and later phases still run. Items
//! that depend on an experience whose creation failed are reported without
//! a backend call. Bulk tag and system additions still go out for the
//! members that do have ids; a suite revision is all or nothing.
//! Cancellation stops the run at the current phase.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use resim_api::{ApiError, ExperienceApi};
use resim_core::types::ExperienceId;

use crate::error::{ApplyError, SyncError};
use crate::plan::{MatchIndex, MatchState, SystemUpdates, TagUpdates, TestSuiteUpdate, UpdatePlan};
use crate::pool::{PoolOutcome, WorkerPool};
use crate::progress::{Phase, ProgressSink};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one apply phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub total: usize,
    /// Items that ran to completion, successful or not.
    pub completed: usize,
    /// Failures in completion order.
    pub errors: Vec<ApplyError>,
}

impl PhaseReport {
    pub fn succeeded(&self) -> usize {
        self.completed - self.errors.len()
    }
}

/// Outcome of a whole apply run.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub phases: Vec<PhaseReport>,
}

impl ApplyReport {
    fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            duration: Duration::ZERO,
            phases: Vec::with_capacity(Phase::APPLY.len()),
        }
    }

    pub fn completed(&self) -> usize {
        self.phases.iter().map(|p| p.completed).sum()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ApplyError> {
        self.phases.iter().flat_map(|p| p.errors.iter())
    }

    pub fn failed(&self) -> usize {
        self.phases.iter().map(|p| p.errors.len()).sum()
    }

    /// `Ok(self)` when nothing failed, otherwise [`SyncError::Apply`] carrying
    /// the first error.
    pub fn into_result(self) -> Result<Self, SyncError> {
        let first = self.errors().next().cloned();
        match first {
            None => Ok(self),
            Some(first) => Err(SyncError::Apply {
                first,
                failed: self.failed(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum ExperienceWork {
    Create(MatchIndex),
    Update { index: MatchIndex, restore: bool },
}

#[derive(Debug, Clone)]
enum MembershipWork<'p> {
    AddTags(&'p TagUpdates, Vec<ExperienceId>),
    RemoveTag(&'p TagUpdates, MatchIndex),
    AddSystems(&'p SystemUpdates, Vec<ExperienceId>),
    /// Additions left without an id by a failed create.
    Unresolved {
        operation: &'static str,
        entity: &'p str,
        missing: Vec<String>,
    },
}

impl<'p> MembershipWork<'p> {
    /// A bulk addition for the resolved ids plus, when some members have
    /// no id, an item reporting them.
    fn additions(
        plan: &UpdatePlan,
        operation: &'static str,
        entity: &'p str,
        additions: &[MatchIndex],
        bulk: impl FnOnce(Vec<ExperienceId>) -> Self,
    ) -> Vec<Self> {
        if additions.is_empty() {
            return Vec::new();
        }
        let (ids, missing) = plan.resolve_ids(additions);
        let mut work = Vec::with_capacity(2);
        if !ids.is_empty() {
            work.push(bulk(ids));
        }
        if !missing.is_empty() {
            work.push(Self::Unresolved {
                operation,
                entity,
                missing,
            });
        }
        work
    }
}

// ---------------------------------------------------------------------------
// Applier
// ---------------------------------------------------------------------------

/// Executes plans through an [`ExperienceApi`] with bounded concurrency.
pub struct Applier<'a> {
    api: &'a dyn ExperienceApi,
    pool: &'a WorkerPool,
    progress: &'a dyn ProgressSink,
}

impl<'a> Applier<'a> {
    pub fn new(api: &'a dyn ExperienceApi, pool: &'a WorkerPool, progress: &'a dyn ProgressSink) -> Self {
        Self {
            api,
            pool,
            progress,
        }
    }

    /// Run all four phases.
    ///
    /// Returns the report when every item succeeded, [`SyncError::Apply`]
    /// when any item failed, and [`SyncError::Cancelled`] with the number of
    /// completed items when the pool's token fired.
    pub async fn apply(&self, plan: &mut UpdatePlan) -> Result<ApplyReport, SyncError> {
        let clock = Instant::now();
        let mut report = ApplyReport::begin();

        // ---- 1. Experiences ----
        let created = self.apply_experiences(plan, &mut report).await?;
        for (index, id) in created {
            plan.assign_id(index, id);
        }

        // ---- 2. Test suites ----
        self.apply_test_suites(plan, &mut report).await?;

        // ---- 3. Tags and systems ----
        self.apply_memberships(plan, &mut report).await?;

        // ---- 4. Archive ----
        self.apply_archive(plan, &mut report).await?;

        report.duration = clock.elapsed();
        tracing::info!(
            completed = report.completed(),
            failed = report.failed(),
            elapsed_ms = report.duration.as_millis() as u64,
            "apply finished",
        );
        report.into_result()
    }

    async fn apply_experiences(
        &self,
        plan: &UpdatePlan,
        report: &mut ApplyReport,
    ) -> Result<Vec<(MatchIndex, ExperienceId)>, SyncError> {
        let work: Vec<ExperienceWork> = plan
            .matches
            .iter()
            .enumerate()
            .filter_map(|(i, m)| {
                let index = MatchIndex(i);
                match m.state() {
                    MatchState::New => Some(ExperienceWork::Create(index)),
                    MatchState::RestoreUpdate => Some(ExperienceWork::Update { index, restore: true }),
                    MatchState::Update if m.needs_update() => {
                        Some(ExperienceWork::Update { index, restore: false })
                    }
                    _ => None,
                }
            })
            .collect();

        let outcome = self
            .pool
            .run(Phase::Experiences, &work, self.progress, |item| {
                self.apply_experience(plan, *item)
            })
            .await;

        let results = self.finish(Phase::Experiences, outcome, report)?;
        Ok(results
            .into_iter()
            .filter_map(|(i, id)| match (work[i], id) {
                (ExperienceWork::Create(index), Some(id)) => Some((index, id)),
                _ => None,
            })
            .collect())
    }

    async fn apply_experience(
        &self,
        plan: &UpdatePlan,
        work: ExperienceWork,
    ) -> Result<Option<ExperienceId>, ApplyError> {
        match work {
            ExperienceWork::Create(index) => {
                let new = &plan.get(index).new;
                let id = self
                    .api
                    .create_experience(new)
                    .await
                    .map_err(|e| failed("create_experience", &new.name, &e))?;
                tracing::info!(experience = %new.name, %id, "created experience");
                Ok(Some(id))
            }
            ExperienceWork::Update { index, restore } => {
                let m = plan.get(index);
                let name = m.new.name.as_str();
                let Some(id) = m.new.experience_id else {
                    return Err(unresolved("update_experience", name, &[name.to_string()]));
                };
                if restore {
                    self.api
                        .restore_experience(id)
                        .await
                        .map_err(|e| failed("restore_experience", name, &e))?;
                    tracing::info!(experience = name, %id, "restored experience");
                }
                self.api
                    .update_experience(id, &m.new, &m.update_mask())
                    .await
                    .map_err(|e| failed("update_experience", name, &e))?;
                tracing::debug!(experience = name, %id, "updated experience");
                Ok(None)
            }
        }
    }

    async fn apply_test_suites(&self, plan: &UpdatePlan, report: &mut ApplyReport) -> Result<(), SyncError> {
        let suites: Vec<&TestSuiteUpdate> = plan.test_suite_updates.values().collect();
        let outcome = self
            .pool
            .run(Phase::TestSuites, &suites, self.progress, |suite| {
                self.revise_test_suite(plan, suite)
            })
            .await;
        self.finish(Phase::TestSuites, outcome, report)?;
        Ok(())
    }

    async fn revise_test_suite(&self, plan: &UpdatePlan, suite: &TestSuiteUpdate) -> Result<(), ApplyError> {
        let (ids, missing) = plan.resolve_ids(&suite.experiences);
        if !missing.is_empty() {
            return Err(unresolved("revise_test_suite", &suite.name, &missing));
        }
        self.api
            .revise_test_suite(suite.test_suite_id, &ids)
            .await
            .map_err(|e| failed("revise_test_suite", &suite.name, &e))?;
        tracing::info!(suite = %suite.name, experiences = ids.len(), "revised test suite");
        Ok(())
    }

    async fn apply_memberships(&self, plan: &UpdatePlan, report: &mut ApplyReport) -> Result<(), SyncError> {
        let mut work = Vec::new();
        for tag in plan.tag_updates.values() {
            work.extend(MembershipWork::additions(
                plan,
                "add_tags_to_experiences",
                &tag.name,
                &tag.additions,
                |ids| MembershipWork::AddTags(tag, ids),
            ));
            work.extend(tag.removals.iter().map(|&i| MembershipWork::RemoveTag(tag, i)));
        }
        for system in plan.system_updates.values() {
            work.extend(MembershipWork::additions(
                plan,
                "add_systems_to_experiences",
                &system.name,
                &system.additions,
                |ids| MembershipWork::AddSystems(system, ids),
            ));
        }

        let outcome = self
            .pool
            .run(Phase::TagsAndSystems, &work, self.progress, |item| {
                self.apply_membership(plan, item)
            })
            .await;
        self.finish(Phase::TagsAndSystems, outcome, report)?;
        Ok(())
    }

    async fn apply_membership(&self, plan: &UpdatePlan, work: &MembershipWork<'_>) -> Result<(), ApplyError> {
        match work {
            MembershipWork::AddTags(tag, ids) => {
                self.api
                    .add_tags_to_experiences(&[tag.tag_id], ids)
                    .await
                    .map_err(|e| failed("add_tags_to_experiences", &tag.name, &e))?;
                tracing::debug!(tag = %tag.name, added = ids.len(), "tagged experiences");
            }
            MembershipWork::RemoveTag(tag, index) => {
                let m = plan.get(*index);
                let entity = format!("{} on {}", tag.name, m.new.name);
                let Some(id) = m.new.experience_id else {
                    return Err(unresolved("remove_tag_from_experience", entity, &[m.new.name.clone()]));
                };
                self.api
                    .remove_tag_from_experience(tag.tag_id, id)
                    .await
                    .map_err(|e| failed("remove_tag_from_experience", entity, &e))?;
                tracing::debug!(tag = %tag.name, experience = %m.new.name, "untagged experience");
            }
            MembershipWork::AddSystems(system, ids) => {
                self.api
                    .add_systems_to_experiences(&[system.system_id], ids)
                    .await
                    .map_err(|e| failed("add_systems_to_experiences", &system.name, &e))?;
                tracing::debug!(system = %system.name, added = ids.len(), "added experiences to system");
            }
            MembershipWork::Unresolved {
                operation,
                entity,
                missing,
            } => return Err(unresolved(*operation, *entity, missing)),
        }
        Ok(())
    }

    async fn apply_archive(&self, plan: &UpdatePlan, report: &mut ApplyReport) -> Result<(), SyncError> {
        let to_archive = plan.indices_in(MatchState::Archive);
        let batches: Vec<Vec<MatchIndex>> = if to_archive.is_empty() {
            Vec::new()
        } else {
            vec![to_archive]
        };
        let outcome = self
            .pool
            .run(Phase::Archive, &batches, self.progress, |batch| async move {
                let entity = format!("{} experience(s)", batch.len());
                let (ids, missing) = plan.resolve_ids(batch);
                if !missing.is_empty() {
                    return Err(unresolved("archive_experiences", entity, &missing));
                }
                self.api
                    .archive_experiences(&ids)
                    .await
                    .map_err(|e| failed("archive_experiences", entity, &e))?;
                tracing::info!(archived = ids.len(), "archived experiences");
                Ok::<(), ApplyError>(())
            })
            .await;
        self.finish(Phase::Archive, outcome, report)?;
        Ok(())
    }

    /// Fold a pool outcome into the report. Returns the successful results
    /// keyed by item index, or `Cancelled` with the cumulative count.
    fn finish<R>(
        &self,
        phase: Phase,
        outcome: PoolOutcome<Result<R, ApplyError>>,
        report: &mut ApplyReport,
    ) -> Result<Vec<(usize, R)>, SyncError> {
        let mut phase_report = PhaseReport {
            phase,
            total: outcome.total,
            completed: outcome.completed(),
            errors: Vec::new(),
        };
        let mut ok = Vec::with_capacity(outcome.results.len());
        for (index, result) in outcome.results {
            match result {
                Ok(value) => ok.push((index, value)),
                Err(err) => phase_report.errors.push(err),
            }
        }
        self.progress
            .phase_finished(phase, phase_report.completed, phase_report.errors.len());
        report.phases.push(phase_report);

        if outcome.cancelled {
            tracing::warn!(%phase, completed = report.completed(), "apply cancelled");
            return Err(SyncError::Cancelled {
                completed: report.completed(),
            });
        }
        Ok(ok)
    }
}

fn failed(operation: &'static str, entity: impl Into<String>, err: &ApiError) -> ApplyError {
    let err = ApplyError::from_api(operation, entity, err);
    tracing::error!(
        operation,
        entity = %err.entity,
        status = err.http_status,
        body = %err.body,
        "backend call failed",
    );
    err
}

fn unresolved(operation: &'static str, entity: impl Into<String>, missing: &[String]) -> ApplyError {
    let err = ApplyError::unresolved(operation, entity, missing);
    tracing::error!(operation, entity = %err.entity, body = %err.body, "skipped backend call");
    err
}
