//! Planner: diff a [`SyncConfig`] against a [`DatabaseState`].
//!
//! Pure and single-threaded. The output is an [`UpdatePlan`] whose matches
//! live in one owning `Vec`; tag, system and suite updates refer to them by
//! [`MatchIndex`], so the id assigned to a created experience during apply
//! is visible to every later phase.
//!
//! ## Matching
//!
//! Configured experiences are matched in input order, by name first and
//! then by explicit id. Each current record can be claimed once. Current
//! records nobody claimed are archived. Renaming is therefore just a match
//! by id whose name differs.
//!
//! Refused configurations:
//!
//! - two entries with the same name, or a name whose current owner was
//!   already claimed by id ([`PlanError::NameCollision`]);
//! - a name whose current owner is claimed (explicitly) under another name
//!   ([`PlanError::AmbiguousRename`]), which would transiently break name
//!   uniqueness;
//! - an explicit id that is absent or already claimed
//!   ([`PlanError::UnknownOrDuplicateId`]).

use std::collections::{BTreeMap, HashMap, HashSet};

use resim_api::{UpdateField, UpdateMask};
use resim_core::types::{Experience, ExperienceId, SyncConfig, SystemId, TagId, TestSuiteId};

use crate::error::PlanError;
use crate::state::{DatabaseState, SystemSet, TagSet};

// ---------------------------------------------------------------------------
// Plan entities
// ---------------------------------------------------------------------------

/// Handle to an [`ExperienceMatch`] inside [`UpdatePlan::matches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchIndex(pub usize);

/// What applying a match does to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchState {
    /// No current record: create it.
    New,
    /// Active before and after: update in place.
    Update,
    /// Archived now, active afterwards: restore, then update.
    RestoreUpdate,
    /// Active now, archived afterwards.
    Archive,
    /// Archived before and after, or an archived entry with no current
    /// record. Nothing to do.
    NoOp,
}

/// A desired experience paired with the current record it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperienceMatch {
    pub original: Option<Experience>,
    pub new: Experience,
}

impl ExperienceMatch {
    pub fn state(&self) -> MatchState {
        match &self.original {
            None if self.new.archived => MatchState::NoOp,
            None => MatchState::New,
            Some(original) => match (original.archived, self.new.archived) {
                (true, false) => MatchState::RestoreUpdate,
                (false, false) => MatchState::Update,
                (false, true) => MatchState::Archive,
                (true, true) => MatchState::NoOp,
            },
        }
    }

    /// Fields `update_experience` overwrites for this match. Optional fields
    /// join the mask only when the config mentions them.
    pub fn update_mask(&self) -> UpdateMask {
        let new = &self.new;
        let mut mask = UpdateMask::new()
            .with(UpdateField::Name)
            .with(UpdateField::Description)
            .with(UpdateField::CacheExempt)
            .with(UpdateField::Locations);
        if new.container_timeout_seconds.is_some() {
            mask.insert(UpdateField::ContainerTimeoutSeconds);
        }
        if new.profile.is_some() {
            mask.insert(UpdateField::Profile);
        }
        if new.environment_variables.is_some() {
            mask.insert(UpdateField::EnvironmentVariables);
        }
        if new.custom_fields.is_some() {
            mask.insert(UpdateField::CustomFields);
        }
        mask
    }

    /// Whether an in-place update would change anything on the backend.
    /// Restores always update.
    pub fn needs_update(&self) -> bool {
        let Some(original) = &self.original else {
            return false;
        };
        if self.new.archived {
            return false;
        }
        if original.archived {
            return true;
        }
        let new = &self.new;
        self.update_mask().iter().any(|field| match field {
            UpdateField::Name => new.name != original.name,
            UpdateField::Description => new.description != original.description,
            UpdateField::CacheExempt => new.cache_exempt != original.cache_exempt,
            UpdateField::Locations => new.locations != original.locations,
            UpdateField::ContainerTimeoutSeconds => {
                new.container_timeout_seconds != original.container_timeout_seconds
            }
            UpdateField::Profile => new.profile != original.profile,
            UpdateField::EnvironmentVariables => {
                new.environment_variables.as_deref().unwrap_or_default()
                    != original.environment_variables.as_deref().unwrap_or_default()
            }
            UpdateField::CustomFields => {
                new.custom_fields.as_deref().unwrap_or_default()
                    != original.custom_fields.as_deref().unwrap_or_default()
            }
        })
    }
}

/// Membership changes for one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdates {
    pub name: String,
    pub tag_id: TagId,
    pub additions: Vec<MatchIndex>,
    pub removals: Vec<MatchIndex>,
}

impl TagUpdates {
    fn for_set(set: &TagSet) -> Self {
        Self {
            name: set.name.clone(),
            tag_id: set.id,
            additions: Vec::new(),
            removals: Vec::new(),
        }
    }
}

/// Membership additions for one system. Systems are never pruned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemUpdates {
    pub name: String,
    pub system_id: SystemId,
    pub additions: Vec<MatchIndex>,
}

impl SystemUpdates {
    fn for_set(set: &SystemSet) -> Self {
        Self {
            name: set.name.clone(),
            system_id: set.id,
            additions: Vec::new(),
        }
    }
}

/// The exact, ordered membership of a managed suite's next revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSuiteUpdate {
    pub name: String,
    pub test_suite_id: TestSuiteId,
    pub experiences: Vec<MatchIndex>,
}

/// Everything the applier needs, keyed by entity name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    pub matches: Vec<ExperienceMatch>,
    pub tag_updates: BTreeMap<String, TagUpdates>,
    pub system_updates: BTreeMap<String, SystemUpdates>,
    pub test_suite_updates: BTreeMap<String, TestSuiteUpdate>,
}

impl UpdatePlan {
    pub fn get(&self, index: MatchIndex) -> &ExperienceMatch {
        &self.matches[index.0]
    }

    /// Record the id the backend assigned to a created experience.
    pub fn assign_id(&mut self, index: MatchIndex, id: ExperienceId) {
        self.matches[index.0].new.experience_id = Some(id);
    }

    /// Indices of the matches in `state`.
    pub fn indices_in(&self, state: MatchState) -> Vec<MatchIndex> {
        self.matches
            .iter()
            .enumerate()
            .filter(|(_, m)| m.state() == state)
            .map(|(i, _)| MatchIndex(i))
            .collect()
    }

    /// Resolve match handles to experience ids. Names of matches still
    /// lacking an id (a failed creation) are returned separately.
    pub fn resolve_ids(&self, indices: &[MatchIndex]) -> (Vec<ExperienceId>, Vec<String>) {
        let mut ids = Vec::with_capacity(indices.len());
        let mut missing = Vec::new();
        for &index in indices {
            let m = self.get(index);
            match m.new.experience_id {
                Some(id) => ids.push(id),
                None => missing.push(m.new.name.clone()),
            }
        }
        (ids, missing)
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for m in &self.matches {
            match m.state() {
                MatchState::New => summary.creates += 1,
                MatchState::RestoreUpdate => summary.restores += 1,
                MatchState::Update if m.needs_update() => summary.updates += 1,
                MatchState::Update => summary.unchanged += 1,
                MatchState::Archive => summary.archives += 1,
                MatchState::NoOp => summary.unchanged += 1,
            }
        }
        for t in self.tag_updates.values() {
            summary.tag_additions += t.additions.len();
            summary.tag_removals += t.removals.len();
        }
        summary.system_additions = self.system_updates.values().map(|s| s.additions.len()).sum();
        summary.test_suite_revisions = self.test_suite_updates.len();
        summary
    }
}

/// Operation counts for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub creates: usize,
    pub updates: usize,
    pub restores: usize,
    pub archives: usize,
    pub unchanged: usize,
    pub tag_additions: usize,
    pub tag_removals: usize,
    pub system_additions: usize,
    pub test_suite_revisions: usize,
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Compute the plan, or refuse the configuration.
pub fn compute_plan(config: &SyncConfig, state: &DatabaseState) -> Result<UpdatePlan, PlanError> {
    let matches = match_experiences(config, state)?;
    let tag_updates = plan_tags(&matches, config, state)?;
    let system_updates = plan_systems(&matches, state)?;
    let test_suite_updates = plan_test_suites(&matches, config, state)?;
    Ok(UpdatePlan {
        matches,
        tag_updates,
        system_updates,
        test_suite_updates,
    })
}

fn match_experiences(
    config: &SyncConfig,
    state: &DatabaseState,
) -> Result<Vec<ExperienceMatch>, PlanError> {
    let mut remaining_by_id: HashMap<ExperienceId, &Experience> = state
        .experiences_by_name
        .values()
        .filter_map(|e| e.experience_id.map(|id| (id, e)))
        .collect();

    // Which configured name explicitly asks for each id.
    let explicit_claims: HashMap<ExperienceId, &str> = config
        .experiences
        .iter()
        .filter_map(|c| c.experience_id.map(|id| (id, c.name.as_str())))
        .collect();

    let mut seen_names = HashSet::new();
    let mut matches = Vec::with_capacity(config.experiences.len());

    for configured in &config.experiences {
        let name = &configured.name;
        if !seen_names.insert(name.as_str()) {
            return Err(PlanError::NameCollision(name.clone()));
        }
        let mut new = configured.clone();

        if let Some(existing) = state.experiences_by_name.get(name) {
            let existing_id = existing.experience_id;
            if configured.experience_id.is_some() && configured.experience_id != existing_id {
                return Err(PlanError::AmbiguousRename(name.clone()));
            }
            if let Some(claimant) = existing_id.and_then(|id| explicit_claims.get(&id)) {
                if *claimant != name.as_str() {
                    return Err(PlanError::AmbiguousRename(name.clone()));
                }
            }
            let claimed = existing_id
                .filter(|id| remaining_by_id.contains_key(id))
                .ok_or_else(|| PlanError::NameCollision(name.clone()))?;
            remaining_by_id.remove(&claimed);
            new.experience_id = Some(claimed);
            matches.push(ExperienceMatch {
                original: Some(existing.clone()),
                new,
            });
        } else if let Some(id) = configured.experience_id {
            let existing = remaining_by_id
                .remove(&id)
                .ok_or(PlanError::UnknownOrDuplicateId(id))?;
            matches.push(ExperienceMatch {
                original: Some(existing.clone()),
                new,
            });
        } else {
            matches.push(ExperienceMatch {
                original: None,
                new,
            });
        }
    }

    // Leftovers, in name order so plans are deterministic.
    for existing in state.experiences_by_name.values() {
        let Some(id) = existing.experience_id else { continue };
        if existing.archived || !remaining_by_id.contains_key(&id) {
            continue;
        }
        let mut new = existing.clone();
        new.archived = true;
        matches.push(ExperienceMatch {
            original: Some(existing.clone()),
            new,
        });
    }

    Ok(matches)
}

fn plan_tags(
    matches: &[ExperienceMatch],
    config: &SyncConfig,
    state: &DatabaseState,
) -> Result<BTreeMap<String, TagUpdates>, PlanError> {
    let mut updates: BTreeMap<String, TagUpdates> = state
        .tag_sets_by_name
        .values()
        .map(|set| (set.name.clone(), TagUpdates::for_set(set)))
        .collect();
    if let Some(unknown) = config
        .managed_experience_tags
        .iter()
        .find(|t| !state.tag_sets_by_name.contains_key(*t))
    {
        return Err(PlanError::UnknownManagedTag(unknown.clone()));
    }

    for (i, m) in matches.iter().enumerate() {
        if m.new.archived {
            continue;
        }
        let original_id = m.original.as_ref().and_then(|o| o.experience_id);
        for tag in &m.new.tags {
            let set = state
                .tag_sets_by_name
                .get(tag)
                .ok_or_else(|| PlanError::UnknownTag(tag.clone()))?;
            if original_id.is_some_and(|id| set.contains(id)) {
                continue;
            }
            updates
                .entry(tag.clone())
                .or_insert_with(|| TagUpdates::for_set(set))
                .additions
                .push(MatchIndex(i));
        }
        let Some(original) = &m.original else { continue };
        for managed in &config.managed_experience_tags {
            if original.tags.contains(managed) && !m.new.tags.contains(managed) {
                if let Some(update) = updates.get_mut(managed) {
                    update.removals.push(MatchIndex(i));
                }
            }
        }
    }

    Ok(updates)
}

fn plan_systems(
    matches: &[ExperienceMatch],
    state: &DatabaseState,
) -> Result<BTreeMap<String, SystemUpdates>, PlanError> {
    let mut updates: BTreeMap<String, SystemUpdates> = state
        .system_sets_by_name
        .values()
        .map(|set| (set.name.clone(), SystemUpdates::for_set(set)))
        .collect();

    for (i, m) in matches.iter().enumerate() {
        if m.new.archived {
            continue;
        }
        let original_id = m.original.as_ref().and_then(|o| o.experience_id);
        for system in &m.new.systems {
            let set = state
                .system_sets_by_name
                .get(system)
                .ok_or_else(|| PlanError::UnknownSystem(system.clone()))?;
            if original_id.is_some_and(|id| set.contains(id)) {
                continue;
            }
            updates
                .entry(system.clone())
                .or_insert_with(|| SystemUpdates::for_set(set))
                .additions
                .push(MatchIndex(i));
        }
    }

    Ok(updates)
}

fn plan_test_suites(
    matches: &[ExperienceMatch],
    config: &SyncConfig,
    state: &DatabaseState,
) -> Result<BTreeMap<String, TestSuiteUpdate>, PlanError> {
    let by_new_name: HashMap<&str, MatchIndex> = matches
        .iter()
        .enumerate()
        .map(|(i, m)| (m.new.name.as_str(), MatchIndex(i)))
        .collect();

    let mut updates = BTreeMap::new();
    for suite in &config.managed_test_suites {
        let test_suite_id = *state
            .test_suite_ids_by_name
            .get(&suite.name)
            .ok_or_else(|| PlanError::UnknownTestSuite(suite.name.clone()))?;

        let mut experiences = Vec::with_capacity(suite.experiences.len());
        for name in &suite.experiences {
            let index = by_new_name
                .get(name.as_str())
                .copied()
                .filter(|i| !matches[i.0].new.archived)
                .ok_or_else(|| PlanError::TestSuiteReferencesMissingExperience {
                    suite: suite.name.clone(),
                    experience: name.clone(),
                })?;
            experiences.push(index);
        }

        updates.insert(
            suite.name.clone(),
            TestSuiteUpdate {
                name: suite.name.clone(),
                test_suite_id,
                experiences,
            },
        );
    }
    Ok(updates)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
