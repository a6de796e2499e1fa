//! # labelflow-session
//!
//! The per-dataset session context.
//!
//! A `LabelSession` owns one instance of each core component (label store,
//! propagation engine, embedding cache, selection broadcaster) plus the
//! immutable feature matrix, and exposes the command surface the
//! application drives: handle a selection, spread labels, color by
//! distance, re-embed, undo.
//!
//! All store mutations happen on the caller's thread; only graph builds,
//! spreads, diffusions, and reducer fits run on blocking workers. Results
//! from those workers are stamped with the store generation they observed
//! and discarded when marks changed underneath them.

pub mod error;
pub mod session;

pub use error::SessionError;
pub use session::{CommandStatus, LabelSession};
