//! Project state persistence.
//!
//! The persisted form is a flat keyed record with keys `classes`,
//! `assignment`, `markers`, and `action_log`; the surrounding application
//! decides where the JSON lands.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use labelflow_types::{Action, ClassId, ClassLabel, Marker};

use crate::error::StoreError;
use crate::store::LabelStore;

/// Flat keyed record of one project's labeling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub classes: Vec<ClassLabel>,
    pub assignment: Vec<ClassId>,
    pub markers: Vec<Marker>,
    pub action_log: Vec<Action>,
}

impl ProjectRecord {
    /// Snapshot a store into a record.
    pub fn from_store(store: &LabelStore) -> Self {
        let (classes, assignment, markers, actions) = store.parts();
        Self {
            classes: classes.to_vec(),
            assignment: assignment.to_vec(),
            markers: markers.to_vec(),
            action_log: actions.to_vec(),
        }
    }

    /// Rebuild a store from a record, validating internal consistency.
    pub fn into_store(self) -> Result<LabelStore, StoreError> {
        LabelStore::from_parts(self.classes, self.assignment, self.markers, self.action_log)
    }

    /// Write the record as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = ?path, samples = self.assignment.len(), "Saved project record");
        Ok(())
    }

    /// Read a record back from JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
