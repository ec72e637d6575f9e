//! Group layout: recomputing a group's box from its children or clip path.
//!
//! Both automatic strategies work in the group's own plane, so the group's
//! rotation, skew and scale never leak into its width and height. After a
//! layout the group's box is centered on the measured extent and every
//! child (and a relative clip path) is shifted so nothing moves on the
//! canvas.

use crate::element::{Cacheable, ElementId, Transformable};
use crate::geometry::{bounding_box_from_points, BoundingBox, Point};
use crate::group::{Container, LayoutStrategy};
use crate::matrix::{invert, multiply};
use crate::observer::SceneEvent;
use crate::scene::Scene;
use crate::{SceneError, SceneResult};

const EPSILON: f64 = 1e-9;

impl Scene {
    /// Recompute the size and position of `group` according to its layout
    /// strategy. Returns whether anything changed.
    ///
    /// A fit-content group with no children keeps its last size. A
    /// clip-path group without a clip path is left alone.
    ///
    /// When the group's center moves, its children's `left`/`top` (and a
    /// relative clip path's) are shifted by the opposite amount: their local
    /// coordinates change, their canvas placement does not.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotAGroup`], [`SceneError::ElementNotFound`],
    /// or [`SceneError::NonInvertible`] for an absolutely positioned clip
    /// under a degenerate transform.
    pub fn recompute_layout(&mut self, group: ElementId) -> SceneResult<bool> {
        let extent = match self.group(group)?.layout() {
            LayoutStrategy::Fixed => None,
            LayoutStrategy::FitContent => self.children_extent(group)?,
            LayoutStrategy::ClipPath => self.clip_extent(group)?,
        };
        let Some(extent) = extent else {
            return Ok(false);
        };
        let changed = self.apply_extent(group, &extent)?;
        if changed {
            tracing::debug!(
                "Layout of {group}: {}x{} centered at ({}, {})",
                extent.width,
                extent.height,
                extent.center().x,
                extent.center().y
            );
            self.emit(&SceneEvent::LayoutChanged { group });
        }
        Ok(changed)
    }

    /// Union of the children's boxes in the group's plane.
    fn children_extent(&self, group: ElementId) -> SceneResult<Option<BoundingBox>> {
        let children = self.group(group)?.children();
        if children.is_empty() {
            return Ok(None);
        }
        let mut points = Vec::with_capacity(children.len() * 4);
        for child in children {
            points.extend(self.entity(*child)?.local_corners().to_array());
        }
        bounding_box_from_points(&points).map(Some)
    }

    /// Extent of the clip path's box in the group's plane.
    fn clip_extent(&self, group: ElementId) -> SceneResult<Option<BoundingBox>> {
        let Some(clip) = self.entity(group)?.clip_path() else {
            return Ok(None);
        };
        let corners = if clip.absolute_positioned {
            let inverse = invert(&self.full_matrix(group)?)?;
            clip.corners_under(&multiply(&inverse, &clip.local_matrix()))
        } else {
            clip.local_corners()
        };
        bounding_box_from_points(&corners.to_array()).map(Some)
    }

    /// Resize `group` to `extent` and center it there, shifting children
    /// and a relative clip path so they keep their canvas positions.
    fn apply_extent(&mut self, group: ElementId, extent: &BoundingBox) -> SceneResult<bool> {
        let entity = self.entity(group)?;
        let shift = extent.center();
        let new_center = entity.local_matrix().apply(shift);
        let old = *entity.geometry();
        let children = entity
            .as_group()
            .ok_or(SceneError::NotAGroup(group))?
            .children()
            .to_vec();

        let moved = !shift.approx_eq(Point::ZERO, EPSILON);
        if !moved
            && (extent.width - old.width).abs() <= EPSILON
            && (extent.height - old.height).abs() <= EPSILON
        {
            return Ok(false);
        }
        if moved {
            for child in children {
                let g = self.entity_mut(child)?.geometry_mut_unmarked();
                g.left -= shift.x;
                g.top -= shift.y;
            }
        }

        let entity = self.entity_mut(group)?;
        if moved {
            if let Some(clip) = entity.clip_path_mut().filter(|c| !c.absolute_positioned) {
                let g = clip.geometry_mut_unmarked();
                g.left -= shift.x;
                g.top -= shift.y;
            }
        }
        let g = entity.geometry_mut_unmarked();
        g.width = extent.width;
        g.height = extent.height;
        g.set_position_by_origin(new_center);

        let new = *g;
        let changed = moved
            || (new.width - old.width).abs() > EPSILON
            || (new.height - old.height).abs() > EPSILON
            || (new.left - old.left).abs() > EPSILON
            || (new.top - old.top).abs() > EPSILON;
        if changed {
            entity.mark_dirty();
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use crate::element::{Entity, OriginX, OriginY, Transformable};
    use crate::geometry::Point;
    use crate::group::LayoutStrategy;
    use crate::property::Property;
    use crate::scene::Scene;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_fit_content_wraps_children() {
        let mut scene = Scene::new();
        let group = scene.add(Entity::group(LayoutStrategy::FitContent));
        let a = scene.add(Entity::rect(100.0, 100.0));
        let b = scene.add(Entity::rect(100.0, 100.0).with_position(50.0, 50.0));
        scene.add_child(group, a).expect("a");
        scene.add_child(group, b).expect("b");

        let g = *scene.entity(group).expect("group").geometry();
        assert_close(g.left, 0.0);
        assert_close(g.top, 0.0);
        assert_close(g.width, 150.0);
        assert_close(g.height, 150.0);

        let corners = scene.corners(b).expect("corners");
        assert!(corners.top_left.approx_eq(Point::new(50.0, 50.0), 1e-9));
    }

    #[test]
    fn test_fit_content_is_idempotent() {
        let mut scene = Scene::new();
        let group = scene.add(Entity::group(LayoutStrategy::FitContent));
        let a = scene.add(Entity::rect(30.0, 10.0).with_position(5.0, 5.0));
        scene.add_child(group, a).expect("a");
        let before = *scene.entity(group).expect("group").geometry();
        assert!(!scene.recompute_layout(group).expect("layout"));
        assert_eq!(*scene.entity(group).expect("group").geometry(), before);
    }

    #[test]
    fn test_rotated_fit_content_relayout_is_exact() {
        let mut scene = Scene::new();
        let group = scene.add(
            Entity::group(LayoutStrategy::FitContent)
                .with(Property::Angle(30.0))
                .and_then(|g| g.with(Property::ScaleX(2.0)))
                .expect("transform"),
        );
        let a = scene.add(Entity::rect(10.0, 10.0).with_position(5.0, 5.0));
        let b = scene.add(Entity::rect(20.0, 5.0).with_position(40.0, 30.0));
        scene.add_child(group, a).expect("a");
        scene.add_child(group, b).expect("b");

        let before = *scene.entity(group).expect("group").geometry();
        assert!(!scene.recompute_layout(group).expect("first"));
        assert!(!scene.recompute_layout(group).expect("second"));
        assert_eq!(*scene.entity(group).expect("group").geometry(), before);
    }

    #[test]
    fn test_fit_content_ignores_group_scale() {
        let mut scene = Scene::new();
        let group = scene.add(
            Entity::group(LayoutStrategy::FitContent)
                .with(Property::ScaleX(2.0))
                .expect("scale"),
        );
        let a = scene.add(Entity::rect(10.0, 10.0));
        scene.add_child(group, a).expect("a");
        let g = *scene.entity(group).expect("group").geometry();
        // the child was re-based to scale 0.5 inside a scale 2 group
        assert_close(g.width, 5.0);
        assert_close(g.height, 10.0);
        let corners = scene.corners(group).expect("corners");
        assert!(corners.top_left.approx_eq(Point::ZERO, 1e-9));
        assert!(corners.bottom_right.approx_eq(Point::new(10.0, 10.0), 1e-9));
    }

    #[test]
    fn test_empty_fit_content_keeps_size() {
        let mut scene = Scene::new();
        let group = scene.add(Entity::group(LayoutStrategy::FitContent).with_size(7.0, 9.0));
        assert!(!scene.recompute_layout(group).expect("layout"));
        let g = scene.entity(group).expect("group").geometry();
        assert_eq!((g.width, g.height), (7.0, 9.0));
    }

    #[test]
    fn test_child_mutation_relayouts_parent_chain() {
        let mut scene = Scene::new();
        let outer = scene.add(Entity::group(LayoutStrategy::FitContent));
        let inner = scene.add(Entity::group(LayoutStrategy::FitContent));
        let rect = scene.add(Entity::rect(10.0, 10.0));
        scene.add_child(inner, rect).expect("inner");
        scene.add_child(outer, inner).expect("outer");

        scene.set(rect, Property::Width(40.0)).expect("width");
        assert_close(scene.entity(inner).expect("inner").geometry().width, 40.0);
        assert_close(scene.entity(outer).expect("outer").geometry().width, 40.0);
    }

    #[test]
    fn test_fixed_group_never_resizes() {
        let mut scene = Scene::new();
        let group = scene.add(Entity::group(LayoutStrategy::Fixed).with_size(5.0, 5.0));
        let rect = scene.add(Entity::rect(50.0, 50.0));
        scene.add_child(group, rect).expect("add");
        let g = scene.entity(group).expect("group").geometry();
        assert_eq!((g.width, g.height), (5.0, 5.0));
    }

    #[test]
    fn test_batch_defers_until_flush() {
        let mut scene = Scene::new();
        let group = scene.add(Entity::group(LayoutStrategy::FitContent));
        let rect = scene.add(Entity::rect(10.0, 10.0));
        scene.add_child(group, rect).expect("add");

        scene.begin_batch();
        scene.set(rect, Property::Width(30.0)).expect("width");
        scene.set(rect, Property::Height(20.0)).expect("height");
        assert_close(scene.entity(group).expect("group").geometry().width, 10.0);
        scene.flush_layout().expect("flush");
        let g = scene.entity(group).expect("group").geometry();
        assert_close(g.width, 30.0);
        assert_close(g.height, 20.0);
        assert!(!scene.is_batching());
    }

    #[test]
    fn test_clip_path_layout_tracks_clip() {
        let mut scene = Scene::new();
        let group = scene.add(Entity::group(LayoutStrategy::ClipPath));
        let rect = scene.add(Entity::rect(200.0, 200.0));
        scene.add_child(group, rect).expect("add");
        let rect_before = scene.corners(rect).expect("corners");
        let local_before = *scene.entity(rect).expect("rect").geometry();

        let clip = Entity::rect(40.0, 20.0)
            .with_origin(OriginX::Center, OriginY::Center)
            .with_position(10.0, 10.0);
        scene.set_clip_path(group, Some(clip)).expect("clip");

        let g = *scene.entity(group).expect("group").geometry();
        assert_close(g.width, 40.0);
        assert_close(g.height, 20.0);
        // group center moved onto the clip center
        let center = scene.center_point(group).expect("center");
        assert!(center.approx_eq(Point::new(10.0, 10.0), 1e-9));
        // clip re-centered in the group plane
        let clip = scene.entity(group).expect("group").clip_path().expect("clip");
        assert!(clip
            .geometry()
            .center_point()
            .approx_eq(Point::ZERO, 1e-9));
        // children move in the group plane but stay put on the canvas
        let local_after = *scene.entity(rect).expect("rect").geometry();
        assert_close(local_before.left - local_after.left, 10.0);
        assert_close(local_before.top - local_after.top, 10.0);
        let rect_after = scene.corners(rect).expect("corners");
        assert!(rect_before
            .top_left
            .approx_eq(rect_after.top_left, 1e-9));
        assert!(!scene.recompute_layout(group).expect("again"));
    }

    #[test]
    fn test_absolute_clip_is_not_shifted() {
        let mut scene = Scene::new();
        let group = scene.add(Entity::group(LayoutStrategy::ClipPath).with_position(100.0, 0.0));
        let rect = scene.add(Entity::rect(10.0, 10.0).with_position(100.0, 0.0));
        scene.add_child(group, rect).expect("add");
        let mut clip = Entity::rect(50.0, 50.0);
        clip.absolute_positioned = true;
        scene.set_clip_path(group, Some(clip)).expect("clip");

        let clip = scene.entity(group).expect("group").clip_path().expect("clip");
        assert_eq!((clip.geometry().left, clip.geometry().top), (0.0, 0.0));
        let corners = scene.corners(group).expect("corners");
        assert!(corners.top_left.approx_eq(Point::ZERO, 1e-9));
        assert!(corners.bottom_right.approx_eq(Point::new(50.0, 50.0), 1e-9));
    }
}
