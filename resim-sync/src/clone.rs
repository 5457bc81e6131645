//! Reverse direction: turn a [`DatabaseState`] into a [`SyncConfig`] that
//! reproduces it.

use resim_core::types::{Experience, SyncConfig};

use crate::state::DatabaseState;

/// Active experiences sorted by name, with ids, tags and systems.
///
/// Suite membership is not part of the snapshot, so the result manages no
/// test suites and no tags.
pub fn clone_config(state: &DatabaseState) -> SyncConfig {
    SyncConfig {
        experiences: state.active_experiences().map(cloned_entry).collect(),
        ..SyncConfig::default()
    }
}

fn cloned_entry(experience: &Experience) -> Experience {
    let mut entry = experience.clone();
    if entry.environment_variables.as_ref().is_some_and(Vec::is_empty) {
        entry.environment_variables = None;
    }
    if entry.custom_fields.as_ref().is_some_and(Vec::is_empty) {
        entry.custom_fields = None;
    }
    entry.profile = entry.profile.filter(|p| !p.is_empty());
    entry
}
