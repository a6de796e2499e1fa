//! The undo-able action log record.
//!
//! Every label mutation appends an `Action` carrying exactly the data needed
//! to reverse it. Consecutive duplicates are coalesced by the store, so
//! equality deliberately ignores the creation timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ClassId, SampleId};

/// The kind of a logged action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Samples were marked into a class
    Mark,
    /// The activation-distance overlay was set
    ColorByDistance,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Mark => write!(f, "mark"),
            ActionKind::ColorByDistance => write!(f, "color_by_distance"),
        }
    }
}

/// One entry of the LIFO action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// What happened
    pub kind: ActionKind,
    /// Which view or component initiated it
    pub actor: String,
    /// Affected sample ids, sorted and deduplicated
    pub sample_ids: Vec<SampleId>,
    /// The class involved (0 for transient selections and overlays)
    pub class_id: ClassId,
    /// When the action was recorded (ignored by equality)
    pub created_at: DateTime<Utc>,
}

impl Action {
    pub fn new(
        kind: ActionKind,
        actor: impl Into<String>,
        sample_ids: impl IntoIterator<Item = SampleId>,
        class_id: ClassId,
    ) -> Self {
        let mut pids: Vec<SampleId> = sample_ids.into_iter().collect();
        pids.sort_unstable();
        pids.dedup();
        Self {
            kind,
            actor: actor.into(),
            sample_ids: pids,
            class_id,
            created_at: Utc::now(),
        }
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.actor == other.actor
            && self.class_id == other.class_id
            && self.sample_ids == other.sample_ids
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} class:{} pids:{:?}",
            self.kind, self.actor, self.class_id, self.sample_ids
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_and_dedups() {
        let a = Action::new(ActionKind::Mark, "table", [5, 1, 5, 3], 2);
        assert_eq!(a.sample_ids, vec![1, 3, 5]);
    }

    #[test]
    fn test_equality_ignores_timestamp() {
        let a = Action::new(ActionKind::Mark, "table", [1, 2], 1);
        let mut b = Action::new(ActionKind::Mark, "table", [2, 1], 1);
        b.created_at = a.created_at + chrono::Duration::seconds(30);
        assert_eq!(a, b);
    }

    #[test]
    fn test_inequality_on_fields() {
        let a = Action::new(ActionKind::Mark, "table", [1], 1);
        assert_ne!(a, Action::new(ActionKind::Mark, "points", [1], 1));
        assert_ne!(a, Action::new(ActionKind::Mark, "table", [2], 1));
        assert_ne!(a, Action::new(ActionKind::Mark, "table", [1], 2));
        assert_ne!(a, Action::new(ActionKind::ColorByDistance, "table", [1], 1));
    }
}
