//! # Driftwatch
//!
//! Append-only snapshot history and drift detection for remote directory
//! state (users, groups, access policies).
//!
//! ## Core Concepts
//!
//! - **Reconciliation**: pure comparison of two keyed object collections
//!   into Added/Removed/Modified records, per-type allow-lists
//! - **Snapshots**: durable, immutable captures of full state plus the
//!   change-set that produced them
//! - **Checks**: one fetch-reconcile-persist pass; no-op observations are
//!   never persisted
//!
//! ## Example
//!
//! ```ignore
//! use driftwatch::{Monitor, SnapshotStore, WatchConfig};
//! use std::sync::Arc;
//!
//! let config = WatchConfig::default();
//! let store = Arc::new(SnapshotStore::open_or_create(&config)?);
//! let monitor = Monitor::new(config, store.clone(), graph_source, gpt_explainer);
//!
//! // Invoked by a scheduler on an interval
//! let outcome = monitor.run_check();
//!
//! // Read paths for an API layer
//! let timeline = store.summaries();
//! let detail = store.detail(timeline[0].sequence_id)?;
//! ```

pub mod config;
pub mod error;
pub mod monitor;
pub mod reconcile;
pub mod store;
pub mod types;

// Re-exports
pub use config::{ObjectTypeConfig, WatchConfig};
pub use error::{MonitorError, Result};
pub use monitor::{
    ChangeExplainer, CheckOutcome, Monitor, StateSource, EXPLANATION_UNAVAILABLE,
    INITIAL_CAPTURE_NOTICE,
};
pub use reconcile::reconcile;
pub use store::SnapshotStore;
pub use types::*;
