//! Values exchanged with the REST collaborator that are not experiences.

use std::collections::BTreeSet;
use std::fmt;

use resim_core::types::{SystemId, TagId, TestSuiteId};

/// One page of a paginated list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// The token to request next; `None` once the listing is exhausted.
    /// An empty token also ends the listing.
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// `{name, tag_id}` as returned by the tag listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
    pub tag_id: TagId,
}

/// `{name, system_id}` as returned by the system listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRef {
    pub name: String,
    pub system_id: SystemId,
}

/// `{name, id, revision}` as returned by the test-suite listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSuiteRef {
    pub name: String,
    pub test_suite_id: TestSuiteId,
    pub revision: u32,
}

/// A field that `update_experience` may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateField {
    Name,
    Description,
    CacheExempt,
    Locations,
    ContainerTimeoutSeconds,
    Profile,
    EnvironmentVariables,
    CustomFields,
}

impl UpdateField {
    /// Path name used in the wire-level update mask.
    pub fn wire_name(self) -> &'static str {
        match self {
            UpdateField::Name => "name",
            UpdateField::Description => "description",
            UpdateField::CacheExempt => "cacheExempt",
            UpdateField::Locations => "locations",
            UpdateField::ContainerTimeoutSeconds => "containerTimeoutSeconds",
            UpdateField::Profile => "profile",
            UpdateField::EnvironmentVariables => "environmentVariables",
            UpdateField::CustomFields => "customFields",
        }
    }
}

impl fmt::Display for UpdateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// The set of fields an update overwrites; everything else keeps its prior
/// value on the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateMask(BTreeSet<UpdateField>);

impl UpdateMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: UpdateField) -> Self {
        self.0.insert(field);
        self
    }

    pub fn insert(&mut self, field: UpdateField) {
        self.0.insert(field);
    }

    pub fn contains(&self, field: UpdateField) -> bool {
        self.0.contains(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = UpdateField> + '_ {
        self.0.iter().copied()
    }

    pub fn wire_paths(&self) -> Vec<&'static str> {
        self.iter().map(UpdateField::wire_name).collect()
    }
}

impl FromIterator<UpdateField> for UpdateMask {
    fn from_iter<I: IntoIterator<Item = UpdateField>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_ends_listing() {
        let page = Page {
            items: vec![1],
            next_page_token: Some(String::new()),
        };
        assert_eq!(page.next_token(), None);
        let page = Page {
            items: vec![1],
            next_page_token: Some("abc".to_string()),
        };
        assert_eq!(page.next_token(), Some("abc"));
    }

    #[test]
    fn mask_paths_are_sorted_and_unique() {
        let mask: UpdateMask = [UpdateField::Locations, UpdateField::Name, UpdateField::Name]
            .into_iter()
            .collect();
        assert_eq!(mask.wire_paths(), vec!["name", "locations"]);
    }
}
