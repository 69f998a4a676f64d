//! Reconciliation engine.
//!
//! Pure comparison of two keyed object collections into a structured
//! change-set. No I/O, no side effects; malformed input is a hard error
//! rather than a silently dropped record.

mod engine;

pub use engine::reconcile;
