//! Current-state snapshot of a project.
//!
//! ## Fetch order
//!
//! 1. Five independent listings run concurrently: active experiences,
//!    archived experiences, tags, systems, test suites.
//! 2. Membership of every tag and system is listed through the worker pool.
//!    Pages of one tag are fetched sequentially (archived then active);
//!    different tags run in parallel.
//! 3. The pieces are joined by [`DatabaseState::from_parts`], which also
//!    copies memberships back onto each experience's `tags` / `systems`.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;

use resim_api::{ApiError, ExperienceApi, Page, SystemRef, TagRef, TestSuiteRef};
use resim_core::types::{Experience, ExperienceId, SystemId, TagId, TestSuiteId};

use crate::error::SyncError;
use crate::pool::WorkerPool;
use crate::progress::{Phase, ProgressSink};

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// A named entity with a stable id and the experiences that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSet<Id> {
    pub name: String,
    pub id: Id,
    pub experience_ids: HashSet<ExperienceId>,
}

impl<Id> MembershipSet<Id> {
    pub fn new(name: impl Into<String>, id: Id) -> Self {
        Self {
            name: name.into(),
            id,
            experience_ids: HashSet::new(),
        }
    }

    pub fn with_members(mut self, ids: impl IntoIterator<Item = ExperienceId>) -> Self {
        self.experience_ids.extend(ids);
        self
    }

    pub fn contains(&self, id: ExperienceId) -> bool {
        self.experience_ids.contains(&id)
    }
}

pub type TagSet = MembershipSet<TagId>;
pub type SystemSet = MembershipSet<SystemId>;

/// Everything the planner needs to know about the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseState {
    /// Active and archived experiences, keyed by name. Each carries its
    /// effective `tags` and `systems`.
    pub experiences_by_name: BTreeMap<String, Experience>,
    pub tag_sets_by_name: BTreeMap<String, TagSet>,
    pub system_sets_by_name: BTreeMap<String, SystemSet>,
    pub test_suite_ids_by_name: BTreeMap<String, TestSuiteId>,
}

impl DatabaseState {
    /// Join fetched pieces into a snapshot.
    ///
    /// Archived experiences are inserted first so that an active experience
    /// with the same name replaces them. Records without an id are skipped.
    pub fn from_parts(
        archived: Vec<Experience>,
        active: Vec<Experience>,
        tag_sets: Vec<TagSet>,
        system_sets: Vec<SystemSet>,
        test_suites: Vec<TestSuiteRef>,
    ) -> Self {
        let mut experiences_by_name = BTreeMap::new();
        for experience in archived.into_iter().chain(active) {
            if experience.experience_id.is_none() {
                tracing::warn!(name = %experience.name, "skipping experience without id");
                continue;
            }
            if let Some(replaced) = experiences_by_name.insert(experience.name.clone(), experience)
            {
                tracing::warn!(
                    name = %replaced.name,
                    archived = replaced.archived,
                    "duplicate experience name in backend listing; keeping the active record",
                );
            }
        }

        for experience in experiences_by_name.values_mut() {
            let Some(id) = experience.experience_id else { continue };
            for set in &tag_sets {
                if set.contains(id) {
                    experience.tags.insert(set.name.clone());
                }
            }
            for set in &system_sets {
                if set.contains(id) {
                    experience.systems.insert(set.name.clone());
                }
            }
        }

        Self {
            experiences_by_name,
            tag_sets_by_name: tag_sets.into_iter().map(|s| (s.name.clone(), s)).collect(),
            system_sets_by_name: system_sets.into_iter().map(|s| (s.name.clone(), s)).collect(),
            test_suite_ids_by_name: test_suites
                .into_iter()
                .map(|s| (s.name, s.test_suite_id))
                .collect(),
        }
    }

    pub fn active_experiences(&self) -> impl Iterator<Item = &Experience> {
        self.experiences_by_name.values().filter(|e| !e.archived)
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Build a [`DatabaseState`] from the backend.
///
/// Any failed list call aborts the fetch with [`SyncError::Fetch`].
pub async fn fetch_state(
    api: &dyn ExperienceApi,
    pool: &WorkerPool,
    progress: &dyn ProgressSink,
) -> Result<DatabaseState, SyncError> {
    let listings = async {
        tokio::try_join!(
            collect_pages("list_experiences", |token| async move {
                api.list_experiences(false, token.as_deref()).await
            }),
            collect_pages("list_experiences", |token| async move {
                api.list_experiences(true, token.as_deref()).await
            }),
            collect_pages("list_experience_tags", |token| async move {
                api.list_experience_tags(token.as_deref()).await
            }),
            collect_pages("list_systems", |token| async move {
                api.list_systems(token.as_deref()).await
            }),
            collect_pages("list_test_suites", |token| async move {
                api.list_test_suites(token.as_deref()).await
            }),
        )
    };
    let (mut active, mut archived, tags, systems, suites) = tokio::select! {
        biased;
        _ = pool.cancel_token().cancelled() => return Err(SyncError::Cancelled { completed: 0 }),
        listed = listings => listed?,
    };
    // The listing a record came from decides its archived flag.
    active.iter_mut().for_each(|e| e.archived = false);
    archived.iter_mut().for_each(|e| e.archived = true);
    tracing::debug!(
        active = active.len(),
        archived = archived.len(),
        tags = tags.len(),
        systems = systems.len(),
        suites = suites.len(),
        "listed top-level entities",
    );

    let targets: Vec<MembershipTarget> = tags
        .into_iter()
        .map(MembershipTarget::Tag)
        .chain(systems.into_iter().map(MembershipTarget::System))
        .collect();
    let outcome = pool
        .run(Phase::Memberships, &targets, progress, |target| {
            fetch_membership(api, target)
        })
        .await;
    progress.phase_finished(Phase::Memberships, outcome.completed(), 0);
    if outcome.cancelled {
        return Err(SyncError::Cancelled { completed: 0 });
    }

    let mut tag_sets = Vec::new();
    let mut system_sets = Vec::new();
    for (_, result) in outcome.results {
        match result? {
            Membership::Tag(set) => tag_sets.push(set),
            Membership::System(set) => system_sets.push(set),
        }
    }

    Ok(DatabaseState::from_parts(
        archived,
        active,
        tag_sets,
        system_sets,
        suites,
    ))
}

enum MembershipTarget {
    Tag(TagRef),
    System(SystemRef),
}

enum Membership {
    Tag(TagSet),
    System(SystemSet),
}

async fn fetch_membership(
    api: &dyn ExperienceApi,
    target: &MembershipTarget,
) -> Result<Membership, SyncError> {
    match target {
        MembershipTarget::Tag(tag) => {
            let mut set = TagSet::new(tag.name.clone(), tag.tag_id);
            for archived in [true, false] {
                let ids = collect_pages("list_experiences_for_tag", |token| async move {
                    api.list_experiences_for_tag(tag.tag_id, archived, token.as_deref())
                        .await
                })
                .await?;
                set.experience_ids.extend(ids);
            }
            Ok(Membership::Tag(set))
        }
        MembershipTarget::System(system) => {
            let mut set = SystemSet::new(system.name.clone(), system.system_id);
            for archived in [true, false] {
                let ids = collect_pages("list_experiences_for_system", |token| async move {
                    api.list_experiences_for_system(system.system_id, archived, token.as_deref())
                        .await
                })
                .await?;
                set.experience_ids.extend(ids);
            }
            Ok(Membership::System(set))
        }
    }
}

/// Follow `next_page_token` until it is absent or empty.
async fn collect_pages<T, F, Fut>(operation: &'static str, mut fetch: F) -> Result<Vec<T>, SyncError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = fetch(token.take())
            .await
            .map_err(|source| SyncError::Fetch { operation, source })?;
        let next = page.next_token().map(str::to_owned);
        items.extend(page.items);
        match next {
            Some(next) => token = Some(next),
            None => return Ok(items),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
