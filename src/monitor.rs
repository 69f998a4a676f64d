//! Check orchestrator and collaborator contracts.
//!
//! The orchestrator composes one check: fetch every tracked type from the
//! [`StateSource`], load the latest stored state, reconcile, decide whether
//! the observation is worth persisting, and append it. Collaborators are
//! explicit dependencies passed in at construction, so the whole flow runs
//! against in-memory fakes in tests.

use crate::config::WatchConfig;
use crate::error::{MonitorError, Result};
use crate::reconcile::reconcile;
use crate::store::SnapshotStore;
use crate::types::{ChangeRecord, ChangeSet, ObjectType, ObservedState, SequenceId, TrackedObject};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Explanation stored with the bootstrap snapshot. Fixed text: spending an
/// explainer call on "everything is new" is a waste.
pub const INITIAL_CAPTURE_NOTICE: &str = "Initial state captured.";

/// Placeholder stored when the explainer fails. Losing the explanation is
/// acceptable; losing the audit record is not.
pub const EXPLANATION_UNAVAILABLE: &str = "Explanation unavailable.";

/// Retrieves the current remote objects of one type.
///
/// Any error (network, auth, rate limit, timeout) is fatal for the current
/// check; the orchestrator never persists a partial observation.
pub trait StateSource {
    fn fetch_objects(&self, object_type: &ObjectType) -> Result<Vec<TrackedObject>>;
}

/// Turns a change-set into free-form text for the operator.
///
/// Best-effort: errors degrade to a placeholder and never block the
/// snapshot write.
pub trait ChangeExplainer {
    fn explain(&self, changes: &[ChangeRecord]) -> Result<String>;
}

/// Result of one check.
#[derive(Debug)]
pub enum CheckOutcome {
    /// A new snapshot was persisted.
    Captured(SequenceId),

    /// Current state matches the latest snapshot; nothing written.
    NoChange,

    /// The check aborted; the store is unchanged.
    Failed(MonitorError),
}

impl CheckOutcome {
    pub fn is_captured(&self) -> bool {
        matches!(self, CheckOutcome::Captured(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CheckOutcome::Failed(_))
    }
}

/// Drift monitor: owns the check flow, shares the store with read-side
/// consumers.
pub struct Monitor<S, E> {
    config: WatchConfig,
    store: Arc<SnapshotStore>,
    source: S,
    explainer: E,

    /// Non-blocking overlap guard. An invocation that arrives while a check
    /// is running fails immediately rather than queueing; by the time the
    /// running check finishes, the overlapping one would be stale anyway.
    run_guard: Mutex<()>,
}

impl<S: StateSource, E: ChangeExplainer> Monitor<S, E> {
    pub fn new(config: WatchConfig, store: Arc<SnapshotStore>, source: S, explainer: E) -> Self {
        Self {
            config,
            store,
            source,
            explainer,
            run_guard: Mutex::new(()),
        }
    }

    /// The snapshot store, for read-side consumers (listing, detail).
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Run one check. Idempotent against an unchanged remote: the second
    /// run returns [`CheckOutcome::NoChange`] and writes nothing.
    ///
    /// Never panics and never returns `Err`; every failure mode is folded
    /// into [`CheckOutcome::Failed`] for the scheduler to log and retry on
    /// the next interval.
    pub fn run_check(&self) -> CheckOutcome {
        let Some(_guard) = self.run_guard.try_lock() else {
            return CheckOutcome::Failed(MonitorError::CheckInProgress);
        };

        match self.check_once() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "check failed");
                CheckOutcome::Failed(e)
            }
        }
    }

    fn check_once(&self) -> Result<CheckOutcome> {
        debug!("starting check");

        let current = self.fetch_all()?;
        let previous = self.store.latest_state()?;
        let change_set = reconcile(previous.as_ref(), &current, &self.config)?;

        let explanation = match &change_set {
            ChangeSet::InitialCapture => {
                info!("first observation, capturing initial state");
                INITIAL_CAPTURE_NOTICE.to_string()
            }
            ChangeSet::Delta { records } if records.is_empty() => {
                debug!("no drift detected, skipping snapshot");
                return Ok(CheckOutcome::NoChange);
            }
            ChangeSet::Delta { records } => {
                info!(changes = records.len(), "drift detected");
                match self.explainer.explain(records) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "explainer failed, storing placeholder");
                        EXPLANATION_UNAVAILABLE.to_string()
                    }
                }
            }
        };

        let sequence = self.store.append(current, change_set, explanation)?;
        Ok(CheckOutcome::Captured(sequence))
    }

    /// Fetch every configured type. All-or-nothing: one failed type aborts
    /// the whole observation.
    fn fetch_all(&self) -> Result<ObservedState> {
        let mut state = ObservedState::new();

        for type_config in &self.config.object_types {
            let objects = self.source.fetch_objects(&type_config.name)?;
            debug!(
                object_type = type_config.name.as_str(),
                count = objects.len(),
                "fetched objects"
            );
            state.insert(type_config.name.clone(), objects);
        }

        Ok(state)
    }
}
