//! The abstract REST surface the sync engine depends on.
//!
//! Production code talks to [`crate::HttpClient`]; tests substitute a
//! scripted or in-memory implementation. List calls return a single page so
//! that callers own the pagination loop.

use async_trait::async_trait;

use resim_core::types::{Experience, ExperienceId, SystemId, TagId, TestSuiteId};

use crate::error::ApiError;
use crate::types::{Page, SystemRef, TagRef, TestSuiteRef, UpdateMask};

/// Operations on one project's experiences, tags, systems and test suites.
#[async_trait]
pub trait ExperienceApi: Send + Sync {
    /// Experiences come back without `tags`/`systems`; membership is
    /// listed separately.
    async fn list_experiences(
        &self,
        archived: bool,
        page_token: Option<&str>,
    ) -> Result<Page<Experience>, ApiError>;

    async fn list_experience_tags(&self, page_token: Option<&str>)
        -> Result<Page<TagRef>, ApiError>;

    async fn list_experiences_for_tag(
        &self,
        tag_id: TagId,
        archived: bool,
        page_token: Option<&str>,
    ) -> Result<Page<ExperienceId>, ApiError>;

    async fn list_systems(&self, page_token: Option<&str>) -> Result<Page<SystemRef>, ApiError>;

    async fn list_experiences_for_system(
        &self,
        system_id: SystemId,
        archived: bool,
        page_token: Option<&str>,
    ) -> Result<Page<ExperienceId>, ApiError>;

    async fn list_test_suites(&self, page_token: Option<&str>)
        -> Result<Page<TestSuiteRef>, ApiError>;

    /// Returns the id the backend assigned.
    async fn create_experience(&self, experience: &Experience) -> Result<ExperienceId, ApiError>;

    async fn update_experience(
        &self,
        experience_id: ExperienceId,
        experience: &Experience,
        mask: &UpdateMask,
    ) -> Result<(), ApiError>;

    async fn restore_experience(&self, experience_id: ExperienceId) -> Result<(), ApiError>;

    async fn archive_experiences(&self, experience_ids: &[ExperienceId]) -> Result<(), ApiError>;

    async fn add_tags_to_experiences(
        &self,
        tag_ids: &[TagId],
        experience_ids: &[ExperienceId],
    ) -> Result<(), ApiError>;

    async fn remove_tag_from_experience(
        &self,
        tag_id: TagId,
        experience_id: ExperienceId,
    ) -> Result<(), ApiError>;

    async fn add_systems_to_experiences(
        &self,
        system_ids: &[SystemId],
        experience_ids: &[ExperienceId],
    ) -> Result<(), ApiError>;

    /// Produces a new revision whose membership is exactly `experience_ids`,
    /// in order.
    async fn revise_test_suite(
        &self,
        test_suite_id: TestSuiteId,
        experience_ids: &[ExperienceId],
    ) -> Result<(), ApiError>;
}
