//! Group containers and their layout strategies.

use serde::{Deserialize, Serialize};

use crate::element::ElementId;

/// How a group derives its own size and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutStrategy {
    /// Size and position track the union of the children's boxes.
    #[default]
    FitContent,
    /// Size and position are set explicitly and never recomputed.
    Fixed,
    /// Size and position track the group's clip path.
    ClipPath,
}

impl LayoutStrategy {
    /// Whether the group re-lays out when its children change.
    #[must_use]
    pub const fn is_auto(self) -> bool {
        !matches!(self, Self::Fixed)
    }
}

/// Child list and layout of a group entity.
///
/// Children are stored by id in paint order; index 0 paints first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Group {
    /// Layout strategy.
    pub layout: LayoutStrategy,
    pub(crate) children: Vec<ElementId>,
}

impl Group {
    /// An empty group.
    #[must_use]
    pub fn new(layout: LayoutStrategy) -> Self {
        Self {
            layout,
            children: Vec::new(),
        }
    }
}

/// Read access to a container's children.
pub trait Container {
    /// Children in paint order (back to front).
    fn children(&self) -> &[ElementId];

    /// The active layout strategy.
    fn layout(&self) -> LayoutStrategy;

    /// Position of `child` in paint order.
    fn child_index(&self, child: ElementId) -> Option<usize> {
        self.children().iter().position(|c| *c == child)
    }

    /// Whether `child` is a direct child.
    fn contains_child(&self, child: ElementId) -> bool {
        self.child_index(child).is_some()
    }

    /// Children front-most first, the order hit testing uses.
    fn front_to_back(&self) -> std::iter::Rev<std::slice::Iter<'_, ElementId>> {
        self.children().iter().rev()
    }

    /// Number of children.
    fn len(&self) -> usize {
        self.children().len()
    }

    /// Whether the container has no children.
    fn is_empty(&self) -> bool {
        self.children().is_empty()
    }
}

impl Container for Group {
    fn children(&self) -> &[ElementId] {
        &self.children
    }

    fn layout(&self) -> LayoutStrategy {
        self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_serialization() {
        assert_eq!(
            serde_json::to_string(&LayoutStrategy::ClipPath).expect("ser"),
            "\"clip-path\""
        );
        let fit: LayoutStrategy = serde_json::from_str("\"fit-content\"").expect("de");
        assert_eq!(fit, LayoutStrategy::FitContent);
        assert!(!LayoutStrategy::Fixed.is_auto());
    }

    #[test]
    fn test_front_to_back_reverses_paint_order() {
        let ids = [ElementId::new(), ElementId::new(), ElementId::new()];
        let group = Group {
            layout: LayoutStrategy::Fixed,
            children: ids.to_vec(),
        };
        let order: Vec<_> = group.front_to_back().copied().collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);
        assert_eq!(group.child_index(ids[1]), Some(1));
        assert!(!group.contains_child(ElementId::new()));
    }
}
