//! Domain types for experience sync.
//!
//! Every type here round-trips through `serde_yaml`: the same `Experience`
//! struct describes a configured entry, a record fetched from the backend,
//! and an entry written out by clone mode.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifier newtypes
// ---------------------------------------------------------------------------

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// A fresh random identifier. Backends assign real ids; this is
            /// for fakes and tests.
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_newtype!(
    /// Stable identifier of an experience; immutable once assigned.
    ExperienceId
);
uuid_newtype!(
    /// Identifier of an experience tag.
    TagId
);
uuid_newtype!(
    /// Identifier of a system.
    SystemId
);
uuid_newtype!(
    /// Identifier of a test suite.
    TestSuiteId
);
uuid_newtype!(
    /// Identifier of the project whose namespace is reconciled.
    ProjectId
);

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Value type of a custom field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CustomFieldType {
    #[default]
    Text,
    Number,
    Timestamp,
    Json,
}

impl fmt::Display for CustomFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomFieldType::Text => write!(f, "text"),
            CustomFieldType::Number => write!(f, "number"),
            CustomFieldType::Timestamp => write!(f, "timestamp"),
            CustomFieldType::Json => write!(f, "json"),
        }
    }
}

// ---------------------------------------------------------------------------
// Experience
// ---------------------------------------------------------------------------

/// A `{name, value}` pair exported into the experience's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// A typed, multi-valued piece of user metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: CustomFieldType,
    #[serde(default)]
    pub values: Vec<String>,
}

/// A test scenario: input locations, runtime parameters, and metadata.
///
/// `environment_variables` and `custom_fields` distinguish "not mentioned"
/// (`None`, prior value kept on update) from "explicitly empty"
/// (`Some(vec![])`, cleared on update).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Experience {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_id: Option<ExperienceId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_or_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub environment_variables: Option<Vec<EnvironmentVariable>>,
    #[serde(default)]
    pub cache_exempt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_timeout_seconds: Option<u32>,
    #[serde(
        default,
        deserialize_with = "present_or_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_fields: Option<Vec<CustomField>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub systems: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
}

impl Experience {
    /// An active experience with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style id assignment, mostly for tests and fakes.
    pub fn with_id(mut self, id: ExperienceId) -> Self {
        self.experience_id = Some(id);
        self
    }

    pub fn with_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations = locations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_systems<I, S>(mut self, systems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.systems = systems.into_iter().map(Into::into).collect();
        self
    }

    pub fn archived(mut self) -> Self {
        self.archived = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Sync configuration
// ---------------------------------------------------------------------------

/// Desired membership of one managed test suite, in revision order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSuiteConfig {
    pub name: String,
    #[serde(default)]
    pub experiences: Vec<String>,
}

/// Root of an experience sync YAML document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub experiences: Vec<Experience>,
    /// Tags whose membership the config controls exclusively.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub managed_experience_tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_test_suites: Vec<TestSuiteConfig>,
}

// ---------------------------------------------------------------------------
// serde helpers
// ---------------------------------------------------------------------------

/// Only invoked when the key is present, so `null` maps to `Some(vec![])`.
fn present_or_empty<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default()))
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
