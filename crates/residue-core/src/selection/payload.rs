//! Selection file payload.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Host-approved ids. No other properties are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SelectionPayload {
    pub selected_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub deselected_ids: BTreeSet<String>,
}

impl SelectionPayload {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// `selectedIds` minus `deselectedIds`.
    pub fn effective_ids(&self) -> BTreeSet<&str> {
        self.selected_ids
            .difference(&self.deselected_ids)
            .map(String::as_str)
            .collect()
    }
}
