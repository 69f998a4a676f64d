//! Change detection between two observed states.

use crate::config::WatchConfig;
use crate::error::{MonitorError, Result};
use crate::types::{ChangeRecord, ChangeSet, ObjectId, ObjectType, ObservedState, TrackedObject};
use serde_json::Value;
use std::collections::BTreeMap;

/// Compare the previous observation against the current one.
///
/// With no previous state at all this is the bootstrap case and returns
/// [`ChangeSet::InitialCapture`]; per-object records would be meaningless
/// noise on a first capture.
///
/// Otherwise, each object type known to either side is reconciled
/// independently: objects are indexed by id, set differences become
/// `Added`/`Removed` records, and objects present on both sides are
/// compared field-by-field against the type's tracked-field allow-list.
/// Untracked fields never produce records. Value comparison is structural
/// JSON equality, so serialization order is irrelevant.
///
/// Output ordering is deterministic: types in config declaration order
/// (undeclared types after, in name order), and within a type Added, then
/// Removed, then Modified, each ascending by id.
pub fn reconcile(
    previous: Option<&ObservedState>,
    current: &ObservedState,
    config: &WatchConfig,
) -> Result<ChangeSet> {
    // Duplicate ids are rejected even on bootstrap; persisting a malformed
    // collection would poison every later comparison.
    for (object_type, objects) in current {
        index_by_id(object_type, objects)?;
    }

    let Some(previous) = previous else {
        return Ok(ChangeSet::InitialCapture);
    };

    let mut records = Vec::new();

    for object_type in types_in_order(previous, current, config) {
        let prev_index = index_by_id(&object_type, objects_of(previous, &object_type))?;
        let cur_index = index_by_id(&object_type, objects_of(current, &object_type))?;

        diff_type(
            &object_type,
            &prev_index,
            &cur_index,
            config,
            &mut records,
        );
    }

    Ok(ChangeSet::Delta { records })
}

fn objects_of<'a>(state: &'a ObservedState, object_type: &ObjectType) -> &'a [TrackedObject] {
    state.get(object_type).map(Vec::as_slice).unwrap_or(&[])
}

/// Declared types first, in declaration order; any type present in the data
/// but absent from the config follows in name order. Undeclared types still
/// surface Added/Removed drift instead of vanishing.
fn types_in_order(
    previous: &ObservedState,
    current: &ObservedState,
    config: &WatchConfig,
) -> Vec<ObjectType> {
    let mut order: Vec<ObjectType> = config
        .object_types
        .iter()
        .map(|t| t.name.clone())
        .collect();

    for object_type in previous.keys().chain(current.keys()) {
        if !order.contains(object_type) {
            order.push(object_type.clone());
        }
    }

    order
}

/// Index a collection by id. A duplicate id within one collection is an
/// upstream data-shape violation and fails the whole pass.
fn index_by_id<'a>(
    object_type: &ObjectType,
    objects: &'a [TrackedObject],
) -> Result<BTreeMap<&'a ObjectId, &'a TrackedObject>> {
    let mut index = BTreeMap::new();

    for object in objects {
        if index.insert(&object.id, object).is_some() {
            return Err(MonitorError::DuplicateObjectId {
                object_type: object_type.clone(),
                id: object.id.clone(),
            });
        }
    }

    Ok(index)
}

fn diff_type(
    object_type: &ObjectType,
    previous: &BTreeMap<&ObjectId, &TrackedObject>,
    current: &BTreeMap<&ObjectId, &TrackedObject>,
    config: &WatchConfig,
    records: &mut Vec<ChangeRecord>,
) {
    let label_field = config.label_field(object_type);

    for (id, object) in current {
        if !previous.contains_key(*id) {
            records.push(ChangeRecord::Added {
                object_type: object_type.clone(),
                object_id: (*id).clone(),
                label: object.label(label_field),
            });
        }
    }

    for (id, object) in previous {
        if !current.contains_key(*id) {
            records.push(ChangeRecord::Removed {
                object_type: object_type.clone(),
                object_id: (*id).clone(),
                label: object.label(label_field),
            });
        }
    }

    for (id, cur_object) in current {
        let Some(prev_object) = previous.get(*id) else {
            continue;
        };

        for field in config.tracked_fields(object_type) {
            let old = prev_object.field(field);
            let new = cur_object.field(field);

            if old != new {
                records.push(ChangeRecord::Modified {
                    object_type: object_type.clone(),
                    object_id: (*id).clone(),
                    field: field.clone(),
                    old_value: old.cloned().unwrap_or(Value::Null),
                    new_value: new.cloned().unwrap_or(Value::Null),
                });
            }
        }
    }
}
