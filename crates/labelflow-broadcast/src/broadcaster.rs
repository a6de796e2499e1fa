//! The selection broadcaster.

use std::sync::Arc;

use tracing::{debug, warn};

use labelflow_types::{ClassId, SelectionEvent};

use crate::listener::ViewListener;

/// Delivers selection and classification updates to registered views.
///
/// Delivery order is registration order, so test runs are reproducible.
/// Re-registering an id replaces the listener in place, keeping its slot.
#[derive(Default)]
pub struct SelectionBroadcaster {
    listeners: Vec<(String, Arc<dyn ViewListener>)>,
}

impl SelectionBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a view to the fan-out list.
    pub fn register_listener(&mut self, id: impl Into<String>, listener: Arc<dyn ViewListener>) {
        let id = id.into();
        if let Some(slot) = self.listeners.iter_mut().find(|(name, _)| *name == id) {
            debug!(listener = %id, "Replacing registered listener");
            slot.1 = listener;
        } else {
            debug!(listener = %id, "Registered listener");
            self.listeners.push((id, listener));
        }
    }

    /// Remove a view. Returns true if it was registered.
    pub fn remove_listener(&mut self, id: &str) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(name, _)| name != id);
        before != self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver a selection event to every listener in order.
    ///
    /// Listener errors are logged and skipped; returns how many listeners
    /// accepted the event.
    pub fn publish(&self, event: &SelectionEvent) -> usize {
        let mut delivered = 0;
        for (id, listener) in &self.listeners {
            match listener.on_selection(event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(listener = %id, error = %e, "Listener failed on selection event");
                }
            }
        }
        delivered
    }

    /// Deliver a classification update to every listener in order.
    pub fn publish_classification(
        &self,
        classes: &[ClassId],
        activation: Option<&[f32]>,
    ) -> usize {
        let mut delivered = 0;
        for (id, listener) in &self.listeners {
            match listener.on_classification_updated(classes, activation) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(listener = %id, error = %e, "Listener failed on classification update");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::ListenerError;

    /// Records delivered events; fails on demand.
    struct Probe {
        name: &'static str,
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl Probe {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ViewListener for Probe {
        fn on_selection(&self, event: &SelectionEvent) -> Result<(), ListenerError> {
            if self.fail {
                return Err(ListenerError::failed(format!("{} exploded", self.name)));
            }
            self.seen
                .lock()
                .unwrap()
                .push(format!("sel:{}", event.source_view));
            Ok(())
        }

        fn on_classification_updated(
            &self,
            classes: &[ClassId],
            _activation: Option<&[f32]>,
        ) -> Result<(), ListenerError> {
            if self.fail {
                return Err(ListenerError::failed(format!("{} exploded", self.name)));
            }
            self.seen
                .lock()
                .unwrap()
                .push(format!("cls:{}", classes.len()));
            Ok(())
        }
    }

    #[test]
    fn test_failing_listener_does_not_stop_delivery() {
        let a = Probe::new("a", false);
        let b = Probe::new("b", true);
        let c = Probe::new("c", false);

        let mut bus = SelectionBroadcaster::new();
        bus.register_listener("a", a.clone());
        bus.register_listener("b", b.clone());
        bus.register_listener("c", c.clone());

        let event = SelectionEvent::select("table", vec![1, 2]);
        let delivered = bus.publish(&event);

        assert_eq!(delivered, 2);
        assert_eq!(a.seen(), vec!["sel:table"]);
        assert!(b.seen().is_empty());
        assert_eq!(c.seen(), vec!["sel:table"]);
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let a = Probe::new("a", false);
        let b = Probe::new("b", false);

        let mut bus = SelectionBroadcaster::new();
        bus.register_listener("a", a.clone());
        bus.register_listener("b", b.clone());

        bus.publish(&SelectionEvent::select("points", vec![3]));
        bus.publish_classification(&[0, 1], None);

        assert_eq!(a.seen(), vec!["sel:points", "cls:2"]);
        assert_eq!(b.seen(), vec!["sel:points", "cls:2"]);
    }

    #[test]
    fn test_reregistration_replaces_in_place() {
        let first = Probe::new("first", false);
        let second = Probe::new("second", false);

        let mut bus = SelectionBroadcaster::new();
        bus.register_listener("table", first.clone());
        bus.register_listener("table", second.clone());
        assert_eq!(bus.listener_count(), 1);

        bus.publish(&SelectionEvent::select("graph", vec![]));
        assert!(first.seen().is_empty());
        assert_eq!(second.seen(), vec!["sel:graph"]);
    }

    #[test]
    fn test_remove_listener() {
        let a = Probe::new("a", false);
        let mut bus = SelectionBroadcaster::new();
        bus.register_listener("a", a.clone());
        assert!(bus.remove_listener("a"));
        assert!(!bus.remove_listener("a"));
        assert_eq!(bus.publish(&SelectionEvent::select("table", vec![])), 0);
    }
}
