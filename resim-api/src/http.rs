//! `reqwest`-backed implementation of [`ExperienceApi`].
//!
//! A [`Connection`] holds the authenticated client and base URL; once the
//! target project is resolved it is narrowed into an [`HttpClient`] that
//! scopes every call to `/projects/{projectID}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use resim_core::types::{
    CustomField, EnvironmentVariable, Experience, ExperienceId, ProjectId, SystemId, TagId,
    TestSuiteId,
};

use crate::client::ExperienceApi;
use crate::error::ApiError;
use crate::types::{Page, SystemRef, TagRef, TestSuiteRef, UpdateField, UpdateMask};

const PAGE_SIZE: &str = "100";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An authenticated client not yet bound to a project.
#[derive(Debug, Clone)]
pub struct Connection {
    client: reqwest::Client,
    base_url: String,
}

impl Connection {
    /// Build a client with per-request timeouts and an optional bearer token.
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidConfig(format!(
                "API URL must start with http:// or https://, got '{base_url}'"
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::InvalidConfig(format!("bad token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| ApiError::Transport {
                operation: "build_client",
                source,
            })?;
        Ok(Self { client, base_url })
    }

    /// Resolve a project given either its id or its name.
    pub async fn resolve_project(&self, name_or_id: &str) -> Result<ProjectId, ApiError> {
        if let Ok(id) = Uuid::parse_str(name_or_id) {
            return Ok(ProjectId(id));
        }

        let url = format!("{}/projects", self.base_url);
        let mut token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(t) = token.as_ref() {
                query.push(("pageToken", t.clone()));
            }
            let request = self.client.get(&url).query(&query);
            let page: WireList<WireProject> =
                decode(send("list_projects", request, StatusCode::OK).await?, "list_projects")
                    .await?;
            if let Some(project) = page.items.iter().find(|p| p.name == name_or_id) {
                return Ok(ProjectId(project.project_id));
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => token = Some(next),
                None => return Err(ApiError::ProjectNotFound(name_or_id.to_string())),
            }
        }
    }

    /// Narrow this connection to a single project.
    pub fn for_project(self, project: ProjectId) -> HttpClient {
        HttpClient {
            conn: self,
            project,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpClient
// ---------------------------------------------------------------------------

/// [`ExperienceApi`] over HTTP for one project.
#[derive(Debug, Clone)]
pub struct HttpClient {
    conn: Connection,
    project: ProjectId,
}

impl HttpClient {
    fn url(&self, path: &str) -> String {
        format!("{}/projects/{}{}", self.conn.base_url, self.project, path)
    }

    async fn get_page<W: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        archived: Option<bool>,
        page_token: Option<&str>,
    ) -> Result<WireList<W>, ApiError> {
        let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
        if let Some(archived) = archived {
            query.push(("archived", archived.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let request = self.conn.client.get(self.url(path)).query(&query);
        decode(send(operation, request, StatusCode::OK).await?, operation).await
    }
}

#[async_trait]
impl ExperienceApi for HttpClient {
    async fn list_experiences(
        &self,
        archived: bool,
        page_token: Option<&str>,
    ) -> Result<Page<Experience>, ApiError> {
        let page: WireList<WireExperience> = self
            .get_page("list_experiences", "/experiences", Some(archived), page_token)
            .await?;
        Ok(page.map(Experience::from))
    }

    async fn list_experience_tags(
        &self,
        page_token: Option<&str>,
    ) -> Result<Page<TagRef>, ApiError> {
        let page: WireList<WireTag> = self
            .get_page("list_experience_tags", "/experienceTags", None, page_token)
            .await?;
        Ok(page.map(|t| TagRef {
            name: t.name,
            tag_id: TagId(t.experience_tag_id),
        }))
    }

    async fn list_experiences_for_tag(
        &self,
        tag_id: TagId,
        archived: bool,
        page_token: Option<&str>,
    ) -> Result<Page<ExperienceId>, ApiError> {
        let path = format!("/experienceTags/{tag_id}/experiences");
        let page: WireList<WireExperienceRef> = self
            .get_page("list_experiences_for_tag", &path, Some(archived), page_token)
            .await?;
        Ok(page.map(|e| ExperienceId(e.experience_id)))
    }

    async fn list_systems(&self, page_token: Option<&str>) -> Result<Page<SystemRef>, ApiError> {
        let page: WireList<WireSystem> = self
            .get_page("list_systems", "/systems", None, page_token)
            .await?;
        Ok(page.map(|s| SystemRef {
            name: s.name,
            system_id: SystemId(s.system_id),
        }))
    }

    async fn list_experiences_for_system(
        &self,
        system_id: SystemId,
        archived: bool,
        page_token: Option<&str>,
    ) -> Result<Page<ExperienceId>, ApiError> {
        let path = format!("/systems/{system_id}/experiences");
        let page: WireList<WireExperienceRef> = self
            .get_page("list_experiences_for_system", &path, Some(archived), page_token)
            .await?;
        Ok(page.map(|e| ExperienceId(e.experience_id)))
    }

    async fn list_test_suites(
        &self,
        page_token: Option<&str>,
    ) -> Result<Page<TestSuiteRef>, ApiError> {
        let page: WireList<WireTestSuite> = self
            .get_page("list_test_suites", "/suites", None, page_token)
            .await?;
        Ok(page.map(|s| TestSuiteRef {
            name: s.name,
            test_suite_id: TestSuiteId(s.test_suite_id),
            revision: s.test_suite_revision,
        }))
    }

    async fn create_experience(&self, experience: &Experience) -> Result<ExperienceId, ApiError> {
        let body = WireExperienceInput::from(experience);
        let request = self.conn.client.post(self.url("/experiences")).json(&body);
        let created: WireExperienceRef = decode(
            send("create_experience", request, StatusCode::CREATED).await?,
            "create_experience",
        )
        .await?;
        Ok(ExperienceId(created.experience_id))
    }

    async fn update_experience(
        &self,
        experience_id: ExperienceId,
        experience: &Experience,
        mask: &UpdateMask,
    ) -> Result<(), ApiError> {
        let body = WireUpdateExperience {
            experience: WireExperienceInput::masked(experience, mask),
            update_mask: mask.wire_paths(),
        };
        let request = self
            .conn
            .client
            .patch(self.url(&format!("/experiences/{experience_id}")))
            .json(&body);
        send("update_experience", request, StatusCode::OK).await?;
        Ok(())
    }

    async fn restore_experience(&self, experience_id: ExperienceId) -> Result<(), ApiError> {
        let request = self
            .conn
            .client
            .post(self.url(&format!("/experiences/{experience_id}/restore")));
        send("restore_experience", request, StatusCode::NO_CONTENT).await?;
        Ok(())
    }

    async fn archive_experiences(&self, experience_ids: &[ExperienceId]) -> Result<(), ApiError> {
        let body = WireExperienceIds {
            experience_ids: experience_ids.iter().map(|id| id.0).collect(),
        };
        let request = self
            .conn
            .client
            .post(self.url("/experiences/archive"))
            .json(&body);
        send("archive_experiences", request, StatusCode::OK).await?;
        Ok(())
    }

    async fn add_tags_to_experiences(
        &self,
        tag_ids: &[TagId],
        experience_ids: &[ExperienceId],
    ) -> Result<(), ApiError> {
        let body = WireTagAssignment {
            experience_tag_ids: tag_ids.iter().map(|id| id.0).collect(),
            experience_ids: experience_ids.iter().map(|id| id.0).collect(),
        };
        let request = self
            .conn
            .client
            .post(self.url("/experienceTags/experiences"))
            .json(&body);
        send("add_tags_to_experiences", request, StatusCode::CREATED).await?;
        Ok(())
    }

    async fn remove_tag_from_experience(
        &self,
        tag_id: TagId,
        experience_id: ExperienceId,
    ) -> Result<(), ApiError> {
        let request = self.conn.client.delete(
            self.url(&format!("/experienceTags/{tag_id}/experiences/{experience_id}")),
        );
        send("remove_tag_from_experience", request, StatusCode::NO_CONTENT).await?;
        Ok(())
    }

    async fn add_systems_to_experiences(
        &self,
        system_ids: &[SystemId],
        experience_ids: &[ExperienceId],
    ) -> Result<(), ApiError> {
        let body = WireSystemAssignment {
            system_ids: system_ids.iter().map(|id| id.0).collect(),
            experience_ids: experience_ids.iter().map(|id| id.0).collect(),
        };
        let request = self
            .conn
            .client
            .post(self.url("/systems/experiences"))
            .json(&body);
        send("add_systems_to_experiences", request, StatusCode::CREATED).await?;
        Ok(())
    }

    async fn revise_test_suite(
        &self,
        test_suite_id: TestSuiteId,
        experience_ids: &[ExperienceId],
    ) -> Result<(), ApiError> {
        let body = WireReviseSuite {
            experiences: experience_ids.iter().map(|id| id.0).collect(),
        };
        let request = self
            .conn
            .client
            .post(self.url(&format!("/suites/{test_suite_id}/revise")))
            .json(&body);
        send("revise_test_suite", request, StatusCode::OK).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(
    operation: &'static str,
    request: RequestBuilder,
    expected: StatusCode,
) -> Result<reqwest::Response, ApiError> {
    let response = request
        .send()
        .await
        .map_err(|source| ApiError::Transport { operation, source })?;
    let status = response.status();
    tracing::debug!(operation, status = status.as_u16(), "api call");
    if status != expected {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            operation,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<T, ApiError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|source| ApiError::Transport { operation, source })?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
        operation,
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Every list endpoint answers `{<items>: [...], nextPageToken}`; the item
/// key varies, so it is matched by alias.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
struct WireList<T> {
    #[serde(
        default,
        alias = "experiences",
        alias = "experienceTags",
        alias = "systems",
        alias = "testSuites",
        alias = "projects"
    )]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl<T> WireList<T> {
    fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_token: self.next_page_token,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProject {
    #[serde(rename = "projectID")]
    project_id: Uuid,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireTag {
    #[serde(rename = "experienceTagID")]
    experience_tag_id: Uuid,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireSystem {
    #[serde(rename = "systemID")]
    system_id: Uuid,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTestSuite {
    #[serde(rename = "testSuiteID")]
    test_suite_id: Uuid,
    name: String,
    #[serde(default)]
    test_suite_revision: u32,
}

#[derive(Debug, Deserialize)]
struct WireExperienceRef {
    #[serde(rename = "experienceID")]
    experience_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireExperience {
    #[serde(rename = "experienceID")]
    experience_id: Uuid,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    locations: Vec<String>,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    environment_variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    cache_exempt: bool,
    #[serde(default)]
    container_timeout_seconds: Option<u32>,
    #[serde(default)]
    custom_fields: Vec<CustomField>,
    #[serde(default)]
    archived: bool,
}

impl From<WireExperience> for Experience {
    fn from(w: WireExperience) -> Self {
        Experience {
            name: w.name,
            experience_id: Some(ExperienceId(w.experience_id)),
            description: w.description,
            locations: w.locations,
            profile: w.profile.filter(|p| !p.is_empty()),
            environment_variables: Some(w.environment_variables),
            cache_exempt: w.cache_exempt,
            container_timeout_seconds: w.container_timeout_seconds,
            custom_fields: Some(w.custom_fields),
            tags: Default::default(),
            systems: Default::default(),
            archived: w.archived,
        }
    }
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireExperienceInput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locations: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment_variables: Option<&'a [EnvironmentVariable]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_exempt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_timeout_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_fields: Option<&'a [CustomField]>,
}

impl<'a> From<&'a Experience> for WireExperienceInput<'a> {
    fn from(e: &'a Experience) -> Self {
        Self {
            name: Some(&e.name),
            description: Some(&e.description),
            locations: Some(&e.locations),
            profile: e.profile.as_deref(),
            environment_variables: e.environment_variables.as_deref(),
            cache_exempt: Some(e.cache_exempt),
            container_timeout_seconds: e.container_timeout_seconds,
            custom_fields: e.custom_fields.as_deref(),
        }
    }
}

impl<'a> WireExperienceInput<'a> {
    /// Only the masked fields are sent.
    fn masked(e: &'a Experience, mask: &UpdateMask) -> Self {
        let full = Self::from(e);
        let mut out = Self::default();
        for field in mask.iter() {
            match field {
                UpdateField::Name => out.name = full.name,
                UpdateField::Description => out.description = full.description,
                UpdateField::CacheExempt => out.cache_exempt = full.cache_exempt,
                UpdateField::Locations => out.locations = full.locations,
                UpdateField::ContainerTimeoutSeconds => {
                    out.container_timeout_seconds = full.container_timeout_seconds
                }
                UpdateField::Profile => out.profile = full.profile,
                UpdateField::EnvironmentVariables => {
                    out.environment_variables = full.environment_variables
                }
                UpdateField::CustomFields => out.custom_fields = full.custom_fields,
            }
        }
        out
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireUpdateExperience<'a> {
    experience: WireExperienceInput<'a>,
    update_mask: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct WireExperienceIds {
    #[serde(rename = "experienceIDs")]
    experience_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
struct WireTagAssignment {
    #[serde(rename = "experienceTagIDs")]
    experience_tag_ids: Vec<Uuid>,
    #[serde(rename = "experienceIDs")]
    experience_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
struct WireSystemAssignment {
    #[serde(rename = "systemIDs")]
    system_ids: Vec<Uuid>,
    #[serde(rename = "experienceIDs")]
    experience_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
struct WireReviseSuite {
    experiences: Vec<Uuid>,
}
