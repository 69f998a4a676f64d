//! Core types for the drift monitor.

use crate::error::{MonitorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Category of remote object being tracked (e.g. "user", "group", "policy").
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectType(pub String);

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectType({})", self.0)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ObjectType {
    fn from(s: &str) -> Self {
        ObjectType(s.to_string())
    }
}

/// Remote-assigned stable identifier of a tracked object.
///
/// The reconciliation key. Opaque: never ordered semantically, never reused
/// across distinct objects by the remote side.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        ObjectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a snapshot in the history (assigned by the store on append).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SequenceId(pub u64);

impl SequenceId {
    pub fn next(self) -> Self {
        SequenceId(self.0 + 1)
    }
}

impl fmt::Debug for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One remote entity as observed at a point in time.
///
/// `fields` holds everything the remote returned besides the id; values are
/// arbitrary JSON. Which fields participate in change detection is decided
/// by the per-type allow-list in [`crate::config::WatchConfig`], not here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: ObjectId,
    pub fields: serde_json::Map<String, Value>,
}

impl TrackedObject {
    pub fn new(id: impl Into<String>, fields: serde_json::Map<String, Value>) -> Self {
        Self {
            id: ObjectId::new(id),
            fields,
        }
    }

    /// Build from a raw JSON object as returned by a remote API.
    ///
    /// The `id` member must be a non-empty string; anything else is a
    /// malformed-input error, not a skipped record.
    pub fn from_value(object_type: &ObjectType, value: Value) -> Result<Self> {
        let mut fields = match value {
            Value::Object(map) => map,
            _ => {
                return Err(MonitorError::MissingObjectId {
                    object_type: object_type.clone(),
                })
            }
        };

        let id = match fields.remove("id") {
            Some(Value::String(s)) if !s.is_empty() => ObjectId(s),
            _ => {
                return Err(MonitorError::MissingObjectId {
                    object_type: object_type.clone(),
                })
            }
        };

        Ok(Self { id, fields })
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Best-effort display name: the given label field if it is a string,
    /// otherwise the id.
    pub fn label(&self, label_field: &str) -> String {
        match self.fields.get(label_field) {
            Some(Value::String(s)) => s.clone(),
            _ => self.id.0.clone(),
        }
    }
}

/// Full observed state at one instant: every tracked type, all its objects.
pub type ObservedState = BTreeMap<ObjectType, Vec<TrackedObject>>;

/// One detected difference between consecutive observations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeRecord {
    Added {
        object_type: ObjectType,
        object_id: ObjectId,
        label: String,
    },
    Removed {
        object_type: ObjectType,
        object_id: ObjectId,
        label: String,
    },
    Modified {
        object_type: ObjectType,
        object_id: ObjectId,
        field: String,
        old_value: Value,
        new_value: Value,
    },
}

impl ChangeRecord {
    pub fn object_type(&self) -> &ObjectType {
        match self {
            ChangeRecord::Added { object_type, .. }
            | ChangeRecord::Removed { object_type, .. }
            | ChangeRecord::Modified { object_type, .. } => object_type,
        }
    }

    pub fn object_id(&self) -> &ObjectId {
        match self {
            ChangeRecord::Added { object_id, .. }
            | ChangeRecord::Removed { object_id, .. }
            | ChangeRecord::Modified { object_id, .. } => object_id,
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeRecord::Added {
                object_type, label, ..
            } => write!(f, "{} created: '{}'", object_type, label),
            ChangeRecord::Removed {
                object_type, label, ..
            } => write!(f, "{} deleted: '{}'", object_type, label),
            ChangeRecord::Modified {
                object_type,
                object_id,
                field,
                old_value,
                new_value,
            } => write!(
                f,
                "{} {}: '{}' changed from {} to {}",
                object_type, object_id, field, old_value, new_value
            ),
        }
    }
}

/// Result of one reconciliation pass, tagged so bootstrap is structurally
/// distinguishable from steady-state drift (no string matching).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeSet {
    /// First observation ever; there was no prior state to compare against.
    InitialCapture,

    /// Per-object differences relative to the previous snapshot.
    Delta { records: Vec<ChangeRecord> },
}

impl ChangeSet {
    pub fn is_initial(&self) -> bool {
        matches!(self, ChangeSet::InitialCapture)
    }

    /// True only for a delta with no records. An initial capture is never
    /// empty: it always warrants a snapshot.
    pub fn is_empty_delta(&self) -> bool {
        matches!(self, ChangeSet::Delta { records } if records.is_empty())
    }

    pub fn records(&self) -> &[ChangeRecord] {
        match self {
            ChangeSet::InitialCapture => &[],
            ChangeSet::Delta { records } => records,
        }
    }
}

/// One durable, immutable capture of full state plus the change-set that
/// produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sequence_id: SequenceId,
    pub observed_at: DateTime<Utc>,
    pub state: ObservedState,
    pub change_set: ChangeSet,
    pub explanation: String,
}

/// Listing entry: enough to render a timeline without decoding state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub sequence_id: SequenceId,
    pub observed_at: DateTime<Utc>,
}

/// Full detail of one snapshot, with the state of the immediately preceding
/// snapshot for side-by-side comparison (absent for the first snapshot).
#[derive(Clone, Debug, Serialize)]
pub struct SnapshotDetail {
    pub sequence_id: SequenceId,
    pub observed_at: DateTime<Utc>,
    pub change_set: ChangeSet,
    pub explanation: String,
    pub current_state: ObservedState,
    pub previous_state: Option<ObservedState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tracked_object_from_value() {
        let obj = TrackedObject::from_value(
            &ObjectType::from("user"),
            json!({"id": "u1", "displayName": "Alice"}),
        )
        .unwrap();

        assert_eq!(obj.id.as_str(), "u1");
        assert_eq!(obj.field("displayName"), Some(&json!("Alice")));
        assert!(obj.field("id").is_none());
    }

    #[test]
    fn test_tracked_object_rejects_missing_id() {
        let ty = ObjectType::from("user");

        for bad in [
            json!({"displayName": "Alice"}),
            json!({"id": 42}),
            json!({"id": ""}),
            json!("not an object"),
        ] {
            let err = TrackedObject::from_value(&ty, bad).unwrap_err();
            assert!(err.is_malformed_input());
        }
    }

    #[test]
    fn test_label_fallback() {
        let obj = TrackedObject::from_value(
            &ObjectType::from("policy"),
            json!({"id": "p1", "state": "enabled"}),
        )
        .unwrap();

        assert_eq!(obj.label("displayName"), "p1");
    }

    #[test]
    fn test_change_record_display() {
        let rec = ChangeRecord::Modified {
            object_type: ObjectType::from("user"),
            object_id: ObjectId::new("u1"),
            field: "displayName".into(),
            old_value: json!("A"),
            new_value: json!("B"),
        };
        assert_eq!(
            rec.to_string(),
            "user u1: 'displayName' changed from \"A\" to \"B\""
        );

        let rec = ChangeRecord::Added {
            object_type: ObjectType::from("group"),
            object_id: ObjectId::new("g1"),
            label: "Admins".into(),
        };
        assert_eq!(rec.to_string(), "group created: 'Admins'");
    }

    #[test]
    fn test_change_set_tagging() {
        let initial = serde_json::to_value(&ChangeSet::InitialCapture).unwrap();
        assert_eq!(initial["type"], "initial_capture");

        let delta = serde_json::to_value(&ChangeSet::Delta { records: vec![] }).unwrap();
        assert_eq!(delta["type"], "delta");

        assert!(ChangeSet::Delta { records: vec![] }.is_empty_delta());
        assert!(!ChangeSet::InitialCapture.is_empty_delta());
        assert!(ChangeSet::InitialCapture.is_initial());
    }
}
