//! Class labels and markers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::color::Rgba;
use crate::{ClassId, SampleId};

/// The reserved id of the "unclassified" class.
pub const UNCLASSIFIED: ClassId = 0;

/// One entry of the immutable per-session class list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassLabel {
    /// Class id; equals the index in the class list
    pub id: ClassId,
    /// Display name
    pub name: String,
    /// Display color
    pub color: Rgba,
}

impl ClassLabel {
    pub fn new(id: ClassId, name: impl Into<String>, color: Rgba) -> Self {
        Self {
            id,
            name: name.into(),
            color,
        }
    }

    /// Build a full class list from user-defined classes, inserting the
    /// reserved "Unlabeled" class at id 0.
    pub fn build_list(classes: &[(&str, Rgba)], unlabeled_color: Option<Rgba>) -> Vec<ClassLabel> {
        let mut list = Vec::with_capacity(classes.len() + 1);
        list.push(ClassLabel::new(
            UNCLASSIFIED,
            "Unlabeled",
            unlabeled_color.unwrap_or_default(),
        ));
        for (i, (name, color)) in classes.iter().enumerate() {
            list.push(ClassLabel::new(i as ClassId + 1, *name, *color));
        }
        list
    }
}

/// The set of sample ids currently highlighted under one class.
///
/// At most one marker per class is live at a time; class-0 markers are
/// transient and replaced on every new selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub class_id: ClassId,
    pub sample_ids: BTreeSet<SampleId>,
}

impl Marker {
    pub fn new(class_id: ClassId, sample_ids: impl IntoIterator<Item = SampleId>) -> Self {
        Self {
            class_id,
            sample_ids: sample_ids.into_iter().collect(),
        }
    }

    /// Transient markers carry the reserved unclassified id.
    pub fn is_transient(&self) -> bool {
        self.class_id == UNCLASSIFIED
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    pub fn contains(&self, pid: SampleId) -> bool {
        self.sample_ids.contains(&pid)
    }

    /// Remove one sample id. Returns true if it was present.
    pub fn remove(&mut self, pid: SampleId) -> bool {
        self.sample_ids.remove(&pid)
    }

    /// Remove a set of sample ids. Returns the number removed.
    pub fn remove_many(&mut self, pids: &BTreeSet<SampleId>) -> usize {
        let before = self.sample_ids.len();
        for pid in pids {
            self.sample_ids.remove(pid);
        }
        before - self.sample_ids.len()
    }
}
