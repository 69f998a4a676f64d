//! Error handling and edge case tests.

use driftwatch::{
    ChangeExplainer, ChangeRecord, CheckOutcome, Monitor, MonitorError, ObjectType, Result,
    SequenceId, SnapshotStore, StateSource, TrackedObject, WatchConfig,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

struct ScriptedSource {
    /// `None` entries simulate a transport failure for that type.
    objects: Mutex<HashMap<String, Option<Vec<Value>>>>,
}

impl ScriptedSource {
    fn new() -> Self {
        let mut objects = HashMap::new();
        for name in ["user", "group", "policy"] {
            objects.insert(name.to_string(), Some(vec![]));
        }
        Self {
            objects: Mutex::new(objects),
        }
    }

    fn set(&self, object_type: &str, values: Vec<Value>) {
        self.objects
            .lock()
            .insert(object_type.to_string(), Some(values));
    }

    fn fail(&self, object_type: &str) {
        self.objects.lock().insert(object_type.to_string(), None);
    }
}

impl StateSource for &ScriptedSource {
    fn fetch_objects(&self, object_type: &ObjectType) -> Result<Vec<TrackedObject>> {
        match self.objects.lock().get(object_type.as_str()) {
            Some(Some(values)) => values
                .iter()
                .map(|v| TrackedObject::from_value(object_type, v.clone()))
                .collect(),
            _ => Err(MonitorError::Fetch {
                object_type: object_type.clone(),
                reason: "503 from remote".into(),
            }),
        }
    }
}

struct NoopExplainer;

impl ChangeExplainer for NoopExplainer {
    fn explain(&self, _changes: &[ChangeRecord]) -> Result<String> {
        Ok(String::new())
    }
}

fn test_monitor<'a>(
    dir: &TempDir,
    source: &'a ScriptedSource,
) -> Monitor<&'a ScriptedSource, NoopExplainer> {
    let config = WatchConfig {
        path: dir.path().join("store"),
        ..Default::default()
    };
    let store = Arc::new(SnapshotStore::open_or_create(&config).unwrap());
    Monitor::new(config, store, source, NoopExplainer)
}

// --- Fetch Failures ---

#[test]
fn test_partial_fetch_leaves_history_untouched() {
    let dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    source.set("user", vec![json!({"id": "1", "displayName": "A"})]);

    let monitor = test_monitor(&dir, &source);
    monitor.run_check();
    let count_before = monitor.store().summaries().len();

    // One of the tracked types starts failing; the users fetch would
    // still succeed.
    source.fail("group");
    source.set("user", vec![json!({"id": "1", "displayName": "changed"})]);

    let outcome = monitor.run_check();
    assert!(matches!(
        outcome,
        CheckOutcome::Failed(MonitorError::Fetch { ref object_type, .. })
            if object_type.as_str() == "group"
    ));
    assert_eq!(monitor.store().summaries().len(), count_before);

    // History keeps serving after a failed check.
    let detail = monitor.store().detail(SequenceId(1)).unwrap().unwrap();
    assert_eq!(detail.current_state[&ObjectType::from("user")][0].label("displayName"), "A");

    // Once the remote recovers, the next check picks the drift up.
    source.set("group", vec![]);
    assert!(monitor.run_check().is_captured());
}

#[test]
fn test_fetch_failure_on_first_check() {
    let dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    source.fail("user");

    let monitor = test_monitor(&dir, &source);
    assert!(monitor.run_check().is_failed());
    assert!(monitor.store().is_empty());
}

// --- Malformed Input ---

#[test]
fn test_duplicate_ids_from_remote_fail_loudly() {
    let dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let monitor = test_monitor(&dir, &source);
    monitor.run_check();

    source.set(
        "user",
        vec![json!({"id": "dup"}), json!({"id": "dup"})],
    );

    let outcome = monitor.run_check();
    assert!(matches!(
        outcome,
        CheckOutcome::Failed(MonitorError::DuplicateObjectId { .. })
    ));
    assert_eq!(monitor.store().len(), 1);
}

#[test]
fn test_object_without_id_fails_loudly() {
    let dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    source.set("policy", vec![json!({"displayName": "nameless"})]);

    let monitor = test_monitor(&dir, &source);
    let outcome = monitor.run_check();

    match outcome {
        CheckOutcome::Failed(e) => {
            assert!(e.is_malformed_input());
            assert!(matches!(e, MonitorError::MissingObjectId { .. }));
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert!(monitor.store().is_empty());
}

// --- Store Errors ---

#[test]
fn test_two_monitors_cannot_share_a_store_directory() {
    let dir = TempDir::new().unwrap();
    let config = WatchConfig {
        path: dir.path().join("store"),
        ..Default::default()
    };

    let _first = SnapshotStore::open_or_create(&config).unwrap();
    let second = SnapshotStore::open_or_create(&config);
    assert!(matches!(second, Err(MonitorError::Locked)));
}

#[test]
fn test_detail_of_unknown_sequence_is_none() {
    let dir = TempDir::new().unwrap();
    let source = ScriptedSource::new();
    let monitor = test_monitor(&dir, &source);
    monitor.run_check();

    assert!(monitor.store().detail(SequenceId(42)).unwrap().is_none());
}

#[test]
fn test_corrupted_manifest_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = WatchConfig {
        path: dir.path().join("store"),
        ..Default::default()
    };

    {
        let _store = SnapshotStore::open_or_create(&config).unwrap();
    }
    std::fs::write(config.path.join("MANIFEST"), b"garbage").unwrap();

    let result = SnapshotStore::open_or_create(&config);
    assert!(matches!(result, Err(MonitorError::InvalidFormat(_))));
}
