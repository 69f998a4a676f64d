//! Watch configuration.
//!
//! Adding a monitored object type is a configuration change, not a code
//! change: each type declares its reconciliation allow-list and label field
//! here and the engine treats all types uniformly.

use crate::types::ObjectType;
use serde::Deserialize;
use std::path::PathBuf;

/// Configuration for one monitored object type.
#[derive(Clone, Debug, Deserialize)]
pub struct ObjectTypeConfig {
    /// Type name, matching what the fetch collaborator is asked for.
    pub name: ObjectType,

    /// Fields compared during reconciliation. Fields outside this list
    /// never produce change records.
    pub tracked_fields: Vec<String>,

    /// Field used for best-effort display labels on Added/Removed records.
    #[serde(default = "default_label_field")]
    pub label_field: String,
}

fn default_label_field() -> String {
    "displayName".to_string()
}

impl ObjectTypeConfig {
    pub fn new(
        name: impl Into<String>,
        tracked_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: ObjectType::new(name),
            tracked_fields: tracked_fields.into_iter().map(Into::into).collect(),
            label_field: default_label_field(),
        }
    }
}

/// Monitor configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Base path for the snapshot store.
    pub path: PathBuf,

    /// Decoded-state cache size (number of snapshot states).
    pub state_cache_size: usize,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Object types to monitor. Declaration order is the output order of
    /// change records.
    pub object_types: Vec<ObjectTypeConfig>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./driftwatch"),
            state_cache_size: 64,
            create_if_missing: true,
            object_types: vec![
                ObjectTypeConfig::new(
                    "user",
                    ["displayName", "userPrincipalName", "accountEnabled"],
                ),
                ObjectTypeConfig::new("group", ["displayName", "description", "securityEnabled"]),
                ObjectTypeConfig::new(
                    "policy",
                    ["displayName", "state", "conditions", "grantControls"],
                ),
            ],
        }
    }
}

impl WatchConfig {
    /// Tracked-field allow-list for a type; empty for undeclared types.
    pub fn tracked_fields(&self, object_type: &ObjectType) -> &[String] {
        self.object_types
            .iter()
            .find(|t| &t.name == object_type)
            .map(|t| t.tracked_fields.as_slice())
            .unwrap_or(&[])
    }

    /// Label field for a type; undeclared types fall back to the default.
    pub fn label_field(&self, object_type: &ObjectType) -> &str {
        self.object_types
            .iter()
            .find(|t| &t.name == object_type)
            .map(|t| t.label_field.as_str())
            .unwrap_or("displayName")
    }
}
