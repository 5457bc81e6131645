//! In-memory backend implementing [`ExperienceApi`] for integration tests.
//!
//! Behaves like the real service where the engine can observe it: names are
//! unique, list calls paginate, membership is stored per tag/system, suite
//! revisions count up. Every call is logged; failures and cancellation can
//! be injected.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use resim_api::{
    ApiError, ExperienceApi, Page, SystemRef, TagRef, TestSuiteRef, UpdateField, UpdateMask,
};
use resim_core::types::{Experience, ExperienceId, SystemId, TagId, TestSuiteId};

#[derive(Default)]
struct Inner {
    experiences: BTreeMap<ExperienceId, Experience>,
    tags: Vec<(TagRef, BTreeSet<ExperienceId>)>,
    systems: Vec<(SystemRef, BTreeSet<ExperienceId>)>,
    suites: Vec<(TestSuiteRef, Vec<ExperienceId>)>,
    calls: Vec<&'static str>,
    /// `(operation, experience or entity name)`; `None` fails every call.
    failures: HashSet<(&'static str, Option<String>)>,
    mutations: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

pub struct FakeBackend {
    inner: Mutex<Inner>,
    page_size: usize,
    /// Whether experience listings carry the `archived` field.
    echo_archived: bool,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: 100,
            echo_archived: true,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Experience listings leave `archived` at its default.
    pub fn without_archived_flag(mut self) -> Self {
        self.echo_archived = false;
        self
    }

    // -- seeding ------------------------------------------------------------

    pub fn seed_experience(&self, experience: Experience) -> ExperienceId {
        let id = experience.experience_id.unwrap_or_else(ExperienceId::new_v4);
        let stored = stored(experience, id);
        self.inner.lock().unwrap().experiences.insert(id, stored);
        id
    }

    pub fn seed_tag(&self, name: &str, members: &[ExperienceId]) -> TagId {
        let tag_id = TagId::new_v4();
        let tag = TagRef {
            name: name.to_string(),
            tag_id,
        };
        self.inner
            .lock()
            .unwrap()
            .tags
            .push((tag, members.iter().copied().collect()));
        tag_id
    }

    pub fn seed_system(&self, name: &str, members: &[ExperienceId]) -> SystemId {
        let system_id = SystemId::new_v4();
        let system = SystemRef {
            name: name.to_string(),
            system_id,
        };
        self.inner
            .lock()
            .unwrap()
            .systems
            .push((system, members.iter().copied().collect()));
        system_id
    }

    pub fn seed_suite(&self, name: &str) -> TestSuiteId {
        let test_suite_id = TestSuiteId::new_v4();
        let suite = TestSuiteRef {
            name: name.to_string(),
            test_suite_id,
            revision: 0,
        };
        self.inner.lock().unwrap().suites.push((suite, Vec::new()));
        test_suite_id
    }

    // -- injection ----------------------------------------------------------

    /// Fail every `operation` call, or only those about `name`.
    pub fn fail(&self, operation: &'static str, name: Option<&str>) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert((operation, name.map(str::to_string)));
    }

    /// Cancel `token` once `n` mutating calls have completed.
    pub fn cancel_after(&self, n: usize, token: CancellationToken) {
        self.inner.lock().unwrap().cancel_after = Some((n, token));
    }

    // -- inspection ---------------------------------------------------------

    pub fn calls(&self) -> Vec<&'static str> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|op| !op.starts_with("list_"))
            .collect()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|op| **op == operation).count()
    }

    pub fn experience(&self, name: &str) -> Option<Experience> {
        self.inner
            .lock()
            .unwrap()
            .experiences
            .values()
            .find(|e| e.name == name)
            .cloned()
    }

    pub fn experience_count(&self) -> usize {
        self.inner.lock().unwrap().experiences.len()
    }

    pub fn tag_members(&self, tag: &str) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        let (_, members) = inner
            .tags
            .iter()
            .find(|(t, _)| t.name == tag)
            .expect("tag exists");
        names_of(&inner, members.iter())
    }

    pub fn system_members(&self, system: &str) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        let (_, members) = inner
            .systems
            .iter()
            .find(|(s, _)| s.name == system)
            .expect("system exists");
        names_of(&inner, members.iter())
    }

    /// `(revision, member names in order)`.
    pub fn suite(&self, name: &str) -> (u32, Vec<String>) {
        let inner = self.inner.lock().unwrap();
        let (suite, members) = inner
            .suites
            .iter()
            .find(|(s, _)| s.name == name)
            .expect("suite exists");
        let names = members
            .iter()
            .map(|id| inner.experiences[id].name.clone())
            .collect();
        (suite.revision, names)
    }

    // -- internals ----------------------------------------------------------

    fn begin(&self, operation: &'static str, name: Option<&str>) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(operation);
        let fails = inner.failures.contains(&(operation, None))
            || name.is_some_and(|n| inner.failures.contains(&(operation, Some(n.to_string()))));
        if fails {
            return Err(status(operation, 500, "injected failure"));
        }
        Ok(())
    }

    fn mutated(inner: &mut Inner) {
        inner.mutations += 1;
        if let Some((n, token)) = &inner.cancel_after {
            if inner.mutations >= *n {
                token.cancel();
            }
        }
    }

    fn page<T: Clone>(&self, items: Vec<T>, token: Option<&str>) -> Page<T> {
        let start: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + self.page_size).min(items.len());
        let page_items = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        Page {
            items: page_items,
            next_page_token: (end < items.len()).then(|| end.to_string()),
        }
    }
}

fn status(operation: &'static str, status: u16, body: &str) -> ApiError {
    ApiError::Status {
        operation,
        status,
        body: body.to_string(),
    }
}

/// What the backend would return for `experience`: id assigned, list-valued
/// fields present, memberships held elsewhere.
fn stored(mut experience: Experience, id: ExperienceId) -> Experience {
    experience.experience_id = Some(id);
    experience.environment_variables.get_or_insert_with(Vec::new);
    experience.custom_fields.get_or_insert_with(Vec::new);
    experience.tags.clear();
    experience.systems.clear();
    experience
}

fn names_of<'a>(inner: &Inner, ids: impl Iterator<Item = &'a ExperienceId>) -> BTreeSet<String> {
    ids.filter_map(|id| inner.experiences.get(id))
        .map(|e| e.name.clone())
        .collect()
}

fn name_taken(inner: &Inner, name: &str, except: Option<ExperienceId>) -> bool {
    inner
        .experiences
        .values()
        .any(|e| e.name == name && e.experience_id != except)
}

#[async_trait]
impl ExperienceApi for FakeBackend {
    async fn list_experiences(
        &self,
        archived: bool,
        page_token: Option<&str>,
    ) -> Result<Page<Experience>, ApiError> {
        self.begin("list_experiences", None)?;
        let items: Vec<Experience> = {
            let inner = self.inner.lock().unwrap();
            inner
                .experiences
                .values()
                .filter(|e| e.archived == archived)
                .map(|e| Experience {
                    archived: e.archived && self.echo_archived,
                    ..e.clone()
                })
                .collect()
        };
        Ok(self.page(items, page_token))
    }

    async fn list_experience_tags(&self, page_token: Option<&str>) -> Result<Page<TagRef>, ApiError> {
        self.begin("list_experience_tags", None)?;
        let items: Vec<TagRef> = self.inner.lock().unwrap().tags.iter().map(|(t, _)| t.clone()).collect();
        Ok(self.page(items, page_token))
    }

    async fn list_experiences_for_tag(
        &self,
        tag_id: TagId,
        archived: bool,
        page_token: Option<&str>,
    ) -> Result<Page<ExperienceId>, ApiError> {
        self.begin("list_experiences_for_tag", None)?;
        let items: Vec<ExperienceId> = {
            let inner = self.inner.lock().unwrap();
            let (_, members) = inner
                .tags
                .iter()
                .find(|(t, _)| t.tag_id == tag_id)
                .ok_or_else(|| status("list_experiences_for_tag", 404, "no such tag"))?;
            members
                .iter()
                .filter(|id| inner.experiences.get(id).is_some_and(|e| e.archived == archived))
                .copied()
                .collect()
        };
        Ok(self.page(items, page_token))
    }

    async fn list_systems(&self, page_token: Option<&str>) -> Result<Page<SystemRef>, ApiError> {
        self.begin("list_systems", None)?;
        let items: Vec<SystemRef> = self
            .inner
            .lock()
            .unwrap()
            .systems
            .iter()
            .map(|(s, _)| s.clone())
            .collect();
        Ok(self.page(items, page_token))
    }

    async fn list_experiences_for_system(
        &self,
        system_id: SystemId,
        archived: bool,
        page_token: Option<&str>,
    ) -> Result<Page<ExperienceId>, ApiError> {
        self.begin("list_experiences_for_system", None)?;
        let items: Vec<ExperienceId> = {
            let inner = self.inner.lock().unwrap();
            let (_, members) = inner
                .systems
                .iter()
                .find(|(s, _)| s.system_id == system_id)
                .ok_or_else(|| status("list_experiences_for_system", 404, "no such system"))?;
            members
                .iter()
                .filter(|id| inner.experiences.get(id).is_some_and(|e| e.archived == archived))
                .copied()
                .collect()
        };
        Ok(self.page(items, page_token))
    }

    async fn list_test_suites(&self, page_token: Option<&str>) -> Result<Page<TestSuiteRef>, ApiError> {
        self.begin("list_test_suites", None)?;
        let items: Vec<TestSuiteRef> = self
            .inner
            .lock()
            .unwrap()
            .suites
            .iter()
            .map(|(s, _)| s.clone())
            .collect();
        Ok(self.page(items, page_token))
    }

    async fn create_experience(&self, experience: &Experience) -> Result<ExperienceId, ApiError> {
        self.begin("create_experience", Some(&experience.name))?;
        let mut inner = self.inner.lock().unwrap();
        if name_taken(&inner, &experience.name, None) {
            return Err(status("create_experience", 409, "name already exists"));
        }
        let id = ExperienceId::new_v4();
        let mut record = stored(experience.clone(), id);
        record.archived = false;
        inner.experiences.insert(id, record);
        Self::mutated(&mut inner);
        Ok(id)
    }

    async fn update_experience(
        &self,
        experience_id: ExperienceId,
        experience: &Experience,
        mask: &UpdateMask,
    ) -> Result<(), ApiError> {
        self.begin("update_experience", Some(&experience.name))?;
        let mut inner = self.inner.lock().unwrap();
        if mask.contains(UpdateField::Name) && name_taken(&inner, &experience.name, Some(experience_id)) {
            return Err(status("update_experience", 409, "name already exists"));
        }
        let record = inner
            .experiences
            .get_mut(&experience_id)
            .ok_or_else(|| status("update_experience", 404, "no such experience"))?;
        for field in mask.iter() {
            match field {
                UpdateField::Name => record.name = experience.name.clone(),
                UpdateField::Description => record.description = experience.description.clone(),
                UpdateField::CacheExempt => record.cache_exempt = experience.cache_exempt,
                UpdateField::Locations => record.locations = experience.locations.clone(),
                UpdateField::ContainerTimeoutSeconds => {
                    record.container_timeout_seconds = experience.container_timeout_seconds
                }
                UpdateField::Profile => record.profile = experience.profile.clone(),
                UpdateField::EnvironmentVariables => {
                    record.environment_variables =
                        Some(experience.environment_variables.clone().unwrap_or_default())
                }
                UpdateField::CustomFields => {
                    record.custom_fields = Some(experience.custom_fields.clone().unwrap_or_default())
                }
            }
        }
        Self::mutated(&mut inner);
        Ok(())
    }

    async fn restore_experience(&self, experience_id: ExperienceId) -> Result<(), ApiError> {
        self.begin("restore_experience", None)?;
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .experiences
            .get_mut(&experience_id)
            .ok_or_else(|| status("restore_experience", 404, "no such experience"))?;
        record.archived = false;
        Self::mutated(&mut inner);
        Ok(())
    }

    async fn archive_experiences(&self, experience_ids: &[ExperienceId]) -> Result<(), ApiError> {
        self.begin("archive_experiences", None)?;
        let mut inner = self.inner.lock().unwrap();
        if experience_ids.iter().any(|id| !inner.experiences.contains_key(id)) {
            return Err(status("archive_experiences", 404, "no such experience"));
        }
        for id in experience_ids {
            if let Some(record) = inner.experiences.get_mut(id) {
                record.archived = true;
            }
        }
        Self::mutated(&mut inner);
        Ok(())
    }

    async fn add_tags_to_experiences(
        &self,
        tag_ids: &[TagId],
        experience_ids: &[ExperienceId],
    ) -> Result<(), ApiError> {
        self.begin("add_tags_to_experiences", None)?;
        let mut inner = self.inner.lock().unwrap();
        for tag_id in tag_ids {
            let (_, members) = inner
                .tags
                .iter_mut()
                .find(|(t, _)| t.tag_id == *tag_id)
                .ok_or_else(|| status("add_tags_to_experiences", 404, "no such tag"))?;
            members.extend(experience_ids.iter().copied());
        }
        Self::mutated(&mut inner);
        Ok(())
    }

    async fn remove_tag_from_experience(
        &self,
        tag_id: TagId,
        experience_id: ExperienceId,
    ) -> Result<(), ApiError> {
        self.begin("remove_tag_from_experience", None)?;
        let mut inner = self.inner.lock().unwrap();
        let (_, members) = inner
            .tags
            .iter_mut()
            .find(|(t, _)| t.tag_id == tag_id)
            .ok_or_else(|| status("remove_tag_from_experience", 404, "no such tag"))?;
        members.remove(&experience_id);
        Self::mutated(&mut inner);
        Ok(())
    }

    async fn add_systems_to_experiences(
        &self,
        system_ids: &[SystemId],
        experience_ids: &[ExperienceId],
    ) -> Result<(), ApiError> {
        self.begin("add_systems_to_experiences", None)?;
        let mut inner = self.inner.lock().unwrap();
        for system_id in system_ids {
            let (_, members) = inner
                .systems
                .iter_mut()
                .find(|(s, _)| s.system_id == *system_id)
                .ok_or_else(|| status("add_systems_to_experiences", 404, "no such system"))?;
            members.extend(experience_ids.iter().copied());
        }
        Self::mutated(&mut inner);
        Ok(())
    }

    async fn revise_test_suite(
        &self,
        test_suite_id: TestSuiteId,
        experience_ids: &[ExperienceId],
    ) -> Result<(), ApiError> {
        self.begin("revise_test_suite", None)?;
        let mut inner = self.inner.lock().unwrap();
        let (suite, members) = inner
            .suites
            .iter_mut()
            .find(|(s, _)| s.test_suite_id == test_suite_id)
            .ok_or_else(|| status("revise_test_suite", 404, "no such suite"))?;
        suite.revision += 1;
        *members = experience_ids.to_vec();
        Self::mutated(&mut inner);
        Ok(())
    }
}
