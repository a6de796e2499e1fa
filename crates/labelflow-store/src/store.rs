//! The label store.

use std::collections::BTreeSet;

use tracing::debug;

use labelflow_types::{
    Action, ActionKind, ClassId, ClassLabel, Marker, SampleId, UNCLASSIFIED,
};

use crate::error::StoreError;

/// Holds class definitions, the per-sample class assignment, the live
/// marker set, and the undo-able action log for one dataset.
#[derive(Debug)]
pub struct LabelStore {
    classes: Vec<ClassLabel>,
    assignment: Vec<ClassId>,
    markers: Vec<Marker>,
    actions: Vec<Action>,
    selected_class: ClassId,
    activation: Option<Vec<f32>>,
    generation: u64,
}

impl LabelStore {
    /// Create a store for `sample_count` samples.
    ///
    /// The class list is immutable for the session; entry `i` must carry
    /// id `i`, and entry 0 is the reserved "unclassified" class.
    pub fn new(sample_count: usize, classes: Vec<ClassLabel>) -> Result<Self, StoreError> {
        if classes.is_empty() {
            return Err(StoreError::InvalidClassList(
                "class list must at least contain the unclassified class".to_string(),
            ));
        }
        for (i, label) in classes.iter().enumerate() {
            if label.id != i as ClassId {
                return Err(StoreError::InvalidClassList(format!(
                    "class at index {} carries id {}",
                    i, label.id
                )));
            }
        }
        Ok(Self {
            classes,
            assignment: vec![UNCLASSIFIED; sample_count],
            markers: Vec::new(),
            actions: Vec::new(),
            selected_class: UNCLASSIFIED,
            activation: None,
            generation: 0,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.assignment.len()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[ClassLabel] {
        &self.classes
    }

    pub fn class_label(&self, class_id: ClassId) -> Option<&ClassLabel> {
        self.classes.get(class_id as usize)
    }

    /// Monotonically increasing counter, bumped by every mutation.
    ///
    /// Long-running spread/refine callers stamp results with the generation
    /// they observed and discard stale deliveries.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selected_class(&self) -> ClassId {
        self.selected_class
    }

    pub fn set_selected_class(&mut self, class_id: ClassId) -> Result<(), StoreError> {
        self.check_class(class_id)?;
        self.selected_class = class_id;
        Ok(())
    }

    /// Current per-sample class assignment, used for display and as the
    /// propagation seed vector.
    pub fn classification(&self) -> Vec<ClassId> {
        self.assignment.clone()
    }

    pub fn assignment_of(&self, pid: SampleId) -> Result<ClassId, StoreError> {
        self.assignment
            .get(pid)
            .copied()
            .ok_or(StoreError::SampleOutOfRange {
                pid,
                len: self.assignment.len(),
            })
    }

    /// Live markers, oldest first.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// The most recently placed marker.
    pub fn current_marker(&self) -> Option<&Marker> {
        self.markers.last()
    }

    /// The marker containing `pid`, if any.
    pub fn marker_for(&self, pid: SampleId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.contains(pid))
    }

    /// The current activation-distance overlay, if one is set.
    pub fn activation(&self) -> Option<&[f32]> {
        self.activation.as_deref()
    }

    /// Mark samples into a class.
    ///
    /// Replaces any transient (class-0) marker, removes the samples from
    /// every other class's marker, updates the assignment, and appends a
    /// coalesced `Mark` action.
    pub fn mark(
        &mut self,
        actor: &str,
        sample_ids: &BTreeSet<SampleId>,
        class_id: ClassId,
    ) -> Result<(), StoreError> {
        self.check_class(class_id)?;
        self.check_pids(sample_ids)?;
        if sample_ids.is_empty() {
            return Ok(());
        }
        self.generation += 1;

        self.clear_transient();
        for marker in &mut self.markers {
            marker.remove_many(sample_ids);
        }
        self.markers.retain(|m| !m.is_empty());
        self.markers
            .push(Marker::new(class_id, sample_ids.iter().copied()));

        for &pid in sample_ids {
            self.assignment[pid] = class_id;
        }

        self.push_action(Action::new(
            ActionKind::Mark,
            actor,
            sample_ids.iter().copied(),
            class_id,
        ));
        Ok(())
    }

    /// Mark samples into the currently selected class.
    pub fn mark_selected(
        &mut self,
        actor: &str,
        sample_ids: &BTreeSet<SampleId>,
    ) -> Result<(), StoreError> {
        self.mark(actor, sample_ids, self.selected_class)
    }

    /// Clear a class's assignment, either entirely or for the given samples.
    pub fn clear_class(
        &mut self,
        class_id: ClassId,
        sample_ids: Option<&BTreeSet<SampleId>>,
    ) -> Result<(), StoreError> {
        self.check_class(class_id)?;
        if let Some(pids) = sample_ids {
            self.check_pids(pids)?;
        }
        self.generation += 1;

        match sample_ids {
            None => {
                for value in &mut self.assignment {
                    if *value == class_id {
                        *value = UNCLASSIFIED;
                    }
                }
                self.markers.retain(|m| m.class_id != class_id);
            }
            Some(pids) => {
                for &pid in pids {
                    if self.assignment[pid] == class_id {
                        self.assignment[pid] = UNCLASSIFIED;
                    }
                }
                for marker in &mut self.markers {
                    if marker.class_id == class_id {
                        marker.remove_many(pids);
                    }
                }
                self.markers.retain(|m| !m.is_empty());
            }
        }
        debug!(class_id, "Cleared class");
        Ok(())
    }

    /// Drop all markers without touching the assignment.
    pub fn clear_markers(&mut self) {
        self.markers.clear();
    }

    /// Merge a propagation result into the assignment.
    ///
    /// Only unlabeled samples adopt a propagated class; user marks always
    /// win. Returns the number of samples that adopted a class.
    pub fn apply_propagation(&mut self, classes: &[ClassId]) -> Result<usize, StoreError> {
        if classes.len() != self.assignment.len() {
            return Err(StoreError::LengthMismatch {
                expected: self.assignment.len(),
                actual: classes.len(),
            });
        }
        for &class_id in classes {
            self.check_class(class_id)?;
        }
        self.generation += 1;

        let mut adopted = 0;
        for (current, &new) in self.assignment.iter_mut().zip(classes.iter()) {
            if *current == UNCLASSIFIED && new != UNCLASSIFIED {
                *current = new;
                adopted += 1;
            }
        }
        debug!(adopted, "Merged propagation result");
        Ok(adopted)
    }

    /// Set the activation-distance overlay and log it as an undo-able
    /// action.
    pub fn set_activation(&mut self, actor: &str, field: Vec<f32>) -> Result<(), StoreError> {
        if field.len() != self.assignment.len() {
            return Err(StoreError::LengthMismatch {
                expected: self.assignment.len(),
                actual: field.len(),
            });
        }
        self.generation += 1;
        self.activation = Some(field);
        self.push_action(Action::new(
            ActionKind::ColorByDistance,
            actor,
            std::iter::empty(),
            UNCLASSIFIED,
        ));
        Ok(())
    }

    /// Pop the action log's tail and reverse its effect.
    ///
    /// Returns `None` on an empty log; callers treat that as a no-op
    /// signal, not an error.
    pub fn undo(&mut self) -> Option<Action> {
        let action = self.actions.pop()?;
        self.generation += 1;
        debug!(action = %action, "Undoing action");

        match action.kind {
            ActionKind::Mark => {
                let pids: BTreeSet<SampleId> = action.sample_ids.iter().copied().collect();
                for &pid in &pids {
                    if self.assignment[pid] == action.class_id {
                        self.assignment[pid] = UNCLASSIFIED;
                    }
                }
                for marker in &mut self.markers {
                    if marker.class_id == action.class_id {
                        marker.remove_many(&pids);
                    }
                }
                self.markers.retain(|m| !m.is_empty());
            }
            ActionKind::ColorByDistance => {
                self.activation = None;
            }
        }
        Some(action)
    }

    /// The action log, oldest first.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    fn clear_transient(&mut self) {
        if self
            .markers
            .last()
            .is_some_and(|m| m.is_transient())
        {
            self.markers.pop();
        }
    }

    /// Append an action unless it equals the log's tail.
    fn push_action(&mut self, action: Action) {
        if self.actions.last() == Some(&action) {
            debug!(action = %action, "Coalesced duplicate action");
            return;
        }
        debug!(action = %action, "Recorded action");
        self.actions.push(action);
    }

    fn check_class(&self, class_id: ClassId) -> Result<(), StoreError> {
        if (class_id as usize) < self.classes.len() {
            Ok(())
        } else {
            Err(StoreError::UnknownClass {
                class_id,
                count: self.classes.len(),
            })
        }
    }

    fn check_pids(&self, pids: &BTreeSet<SampleId>) -> Result<(), StoreError> {
        // BTreeSet iterates in ascending order; checking the maximum is enough
        if let Some(&max) = pids.iter().next_back() {
            if max >= self.assignment.len() {
                return Err(StoreError::SampleOutOfRange {
                    pid: max,
                    len: self.assignment.len(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn parts(
        &self,
    ) -> (&[ClassLabel], &[ClassId], &[Marker], &[Action]) {
        (&self.classes, &self.assignment, &self.markers, &self.actions)
    }

    pub(crate) fn from_parts(
        classes: Vec<ClassLabel>,
        assignment: Vec<ClassId>,
        markers: Vec<Marker>,
        actions: Vec<Action>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(assignment.len(), classes)?;
        for (pid, &class_id) in assignment.iter().enumerate() {
            if (class_id as usize) >= store.classes.len() {
                return Err(StoreError::CorruptRecord(format!(
                    "sample {} assigned to unknown class {}",
                    pid, class_id
                )));
            }
        }
        for marker in &markers {
            if (marker.class_id as usize) >= store.classes.len() {
                return Err(StoreError::CorruptRecord(format!(
                    "marker for unknown class {}",
                    marker.class_id
                )));
            }
            if let Some(&max) = marker.sample_ids.iter().next_back() {
                if max >= assignment.len() {
                    return Err(StoreError::CorruptRecord(format!(
                        "marker for class {} references sample {} of {}",
                        marker.class_id,
                        max,
                        assignment.len()
                    )));
                }
            }
        }
        store.assignment = assignment;
        store.markers = markers;
        store.actions = actions;
        Ok(store)
    }
}
