//! # labelflow-broadcast
//!
//! Fans selection and classification updates out to every registered view.
//!
//! Views never hold references to each other; a selection in any view is
//! published here and delivered to all listeners in registration order,
//! tagged with the originating view so listeners can suppress their own
//! echo. A failing listener is logged and skipped; delivery always reaches
//! the remaining listeners.

pub mod broadcaster;
pub mod error;
pub mod listener;

pub use broadcaster::SelectionBroadcaster;
pub use error::ListenerError;
pub use listener::ViewListener;
