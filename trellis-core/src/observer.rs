//! Change notifications for scene mutations.

use crate::element::ElementId;

/// A typed notification emitted after a scene mutation completes.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A property that moves or resizes the entity's box changed.
    GeometryChanged {
        /// The entity.
        entity: ElementId,
        /// camelCase property name.
        property: String,
    },
    /// A non-geometric property changed.
    PropertyChanged {
        /// The entity.
        entity: ElementId,
        /// camelCase property name.
        property: String,
    },
    /// A group recomputed its size and position.
    LayoutChanged {
        /// The group.
        group: ElementId,
    },
    /// An entity was attached to a group.
    ChildAdded {
        /// The group.
        group: ElementId,
        /// The new child.
        child: ElementId,
    },
    /// An entity was detached from a group.
    ChildRemoved {
        /// The group.
        group: ElementId,
        /// The former child.
        child: ElementId,
    },
    /// An entity was disposed.
    Disposed(ElementId),
}

/// Receives [`SceneEvent`]s.
pub trait SceneObserver: Send {
    /// Called once per event, in mutation order.
    fn on_event(&mut self, event: &SceneEvent);
}

impl<F> SceneObserver for F
where
    F: FnMut(&SceneEvent) + Send,
{
    fn on_event(&mut self, event: &SceneEvent) {
        self(event);
    }
}
