//! Selection events fanned out to registered views.

use serde::{Deserialize, Serialize};

use crate::{ClassId, SampleId};

/// A selection or mark originating in one view.
///
/// The originating view is included so a listener can suppress re-processing
/// its own echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEvent {
    /// Name of the view the selection came from
    pub source_view: String,
    /// Selected sample ids
    pub sample_ids: Vec<SampleId>,
    /// Class to mark the selection into; `None` for a plain highlight
    pub class_id: Option<ClassId>,
}

impl SelectionEvent {
    /// A plain highlight selection (no class assignment).
    pub fn select(source_view: impl Into<String>, sample_ids: Vec<SampleId>) -> Self {
        Self {
            source_view: source_view.into(),
            sample_ids,
            class_id: None,
        }
    }

    /// A selection that marks the samples into a class.
    pub fn mark(source_view: impl Into<String>, sample_ids: Vec<SampleId>, class_id: ClassId) -> Self {
        Self {
            source_view: source_view.into(),
            sample_ids,
            class_id: Some(class_id),
        }
    }

    /// True when the event came from the given view.
    pub fn is_from(&self, view: &str) -> bool {
        self.source_view == view
    }
}
