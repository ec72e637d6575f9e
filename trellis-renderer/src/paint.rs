//! Scene traversal and the paint driver.
//!
//! Roots are painted back to front. Each entity is drawn inside its own
//! save/restore scope: its local matrix is multiplied onto the surface
//! transform, its clip path (if any) is intersected, its opacity multiplies
//! the global alpha, and then either its children or its own content are
//! drawn. The transform in effect while an entity draws is therefore the
//! surface's starting transform composed with the entity's full matrix.

use trellis_core::{
    Container, Drawable, ElementId, Entity, Matrix, Scene, SceneError, SceneResult, Surface,
    Transformable,
};

use crate::cache::{CacheController, CacheOutcome, FallbackReason};
use crate::PaintConfig;

/// A cacheable entity that was drawn directly. Informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheFallback {
    /// The entity.
    pub entity: ElementId,
    /// Why its cache was not used.
    pub reason: FallbackReason,
}

/// An entity whose painting failed. Its siblings were still painted.
#[derive(Debug)]
pub struct PaintFailure {
    /// The entity.
    pub entity: ElementId,
    /// What went wrong.
    pub error: SceneError,
}

/// Summary of one paint pass.
#[derive(Debug, Default)]
pub struct PaintReport {
    /// Leaves that put content on the surface.
    pub painted: usize,
    /// Groups traversed.
    pub groups: usize,
    /// Entities skipped as invisible or empty.
    pub skipped: usize,
    /// Leaves blitted from a valid cache.
    pub cache_hits: usize,
    /// Leaves whose cache was rebuilt.
    pub regenerated: usize,
    /// Cacheable leaves drawn directly instead.
    pub fallbacks: Vec<CacheFallback>,
    /// Entities that failed to paint.
    pub failures: Vec<PaintFailure>,
}

impl PaintReport {
    /// Whether every entity painted without error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Paints scenes onto surfaces, maintaining entity render caches.
#[derive(Debug, Clone, Default)]
pub struct Painter {
    config: PaintConfig,
    cache: CacheController,
}

impl Painter {
    /// Create a painter with the given configuration.
    #[must_use]
    pub fn new(config: PaintConfig) -> Self {
        let cache =
            CacheController::new(config.cache.clone()).with_gpu_filtering(config.gpu_filtering);
        Self { config, cache }
    }

    /// Get the paint configuration.
    #[must_use]
    pub fn config(&self) -> &PaintConfig {
        &self.config
    }

    /// The render-cache controller.
    #[must_use]
    pub fn cache(&self) -> &CacheController {
        &self.cache
    }

    /// Paint every root of `scene` onto `surface`, back to front.
    ///
    /// Failures are contained per entity and reported; they never abort
    /// the pass. The surface's save depth is unchanged afterwards.
    pub fn paint(&mut self, scene: &mut Scene, surface: &mut dyn Surface) -> PaintReport {
        let mut report = PaintReport::default();
        let base = surface.current_transform();
        let roots = scene.roots().to_vec();
        for id in roots {
            self.paint_entity(scene, id, surface, &base, &mut report);
        }
        tracing::trace!(
            "Painted {} leaves ({} cached, {} rebuilt, {} fallbacks, {} failures)",
            report.painted,
            report.cache_hits,
            report.regenerated,
            report.fallbacks.len(),
            report.failures.len()
        );
        report
    }

    /// Paint one entity and its subtree. `base` is the surface transform the
    /// pass started with; absolutely positioned clip paths are placed in it.
    pub fn paint_entity(
        &mut self,
        scene: &mut Scene,
        id: ElementId,
        surface: &mut dyn Surface,
        base: &Matrix,
        report: &mut PaintReport,
    ) {
        surface.save();
        if let Err(error) = self.paint_scoped(scene, id, surface, base, report) {
            tracing::warn!("Failed to paint {id}: {error}");
            report.failures.push(PaintFailure { entity: id, error });
        }
        surface.restore();
    }

    fn paint_scoped(
        &mut self,
        scene: &mut Scene,
        id: ElementId,
        surface: &mut dyn Surface,
        base: &Matrix,
        report: &mut PaintReport,
    ) -> SceneResult<()> {
        let entity = scene.entity(id)?;
        if !entity.style.visible || entity.style.opacity <= 0.0 {
            report.skipped += 1;
            return Ok(());
        }
        surface.transform(&entity.local_matrix());
        if let Some(clip) = entity.clip_path() {
            apply_clip(surface, clip, base);
        }
        let alpha = surface.global_alpha() * entity.style.opacity;
        surface.set_global_alpha(alpha);

        if let Some(group) = entity.as_group() {
            let children = group.children().to_vec();
            report.groups += 1;
            for child in children {
                self.paint_entity(scene, child, surface, base, report);
            }
            return Ok(());
        }

        match self.cache.draw(scene, id, surface)? {
            CacheOutcome::Empty => {
                report.skipped += 1;
                return Ok(());
            }
            CacheOutcome::Direct => {}
            CacheOutcome::Hit => report.cache_hits += 1,
            CacheOutcome::Regenerated => report.regenerated += 1,
            CacheOutcome::Fallback(reason) => {
                tracing::warn!("Drawing {id} without cache: {reason:?}");
                report.fallbacks.push(CacheFallback { entity: id, reason });
            }
        }
        report.painted += 1;
        Ok(())
    }
}

/// Intersect the surface clip with the silhouette of `clip`.
///
/// A relative clip lives in the plane of the entity being painted; an
/// absolutely positioned one lives in canvas space.
fn apply_clip(surface: &mut dyn Surface, clip: &Entity, base: &Matrix) {
    let current = surface.current_transform();
    if clip.absolute_positioned {
        surface.set_transform(&base.multiply(&clip.local_matrix()));
    } else {
        surface.transform(&clip.local_matrix());
    }
    let g = clip.geometry();
    surface.begin_path();
    clip.kind.trace(surface, g.width, g.height);
    surface.set_transform(&current);
    surface.clip(clip.style.fill_rule);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{DrawOp, RecordingSurface};
    use crate::cache::CacheConfig;
    use trellis_core::{LayoutStrategy, Paint, Property};

    fn direct() -> Painter {
        Painter::new(PaintConfig {
            cache: CacheConfig {
                object_caching: false,
                ..CacheConfig::default()
            },
            ..PaintConfig::default()
        })
    }

    #[test]
    fn test_paint_order_back_to_front() {
        let mut scene = Scene::new();
        scene.add(Entity::rect(10.0, 10.0).with_fill(Paint::color("red")));
        scene.add(Entity::rect(10.0, 10.0).with_fill(Paint::color("blue")));
        let mut surface = RecordingSurface::new(50, 50);
        let report = direct().paint(&mut scene, &mut surface);
        assert_eq!(report.painted, 2);

        let colors: Vec<_> = surface
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Fill { paint, .. } => Some(paint.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(colors.len(), 2);
        assert_eq!(
            colors[0],
            Paint::color("red").resolve().expect("red").expect("visible")
        );
        assert_eq!(surface.save_depth(), 0);
    }

    #[test]
    fn test_opacity_multiplies_through_groups() {
        let mut scene = Scene::new();
        let group = scene.add(
            Entity::group(LayoutStrategy::FitContent)
                .with(Property::Opacity(0.5))
                .expect("opacity"),
        );
        let rect = scene.add(
            Entity::rect(10.0, 10.0)
                .with(Property::Opacity(0.5))
                .expect("opacity"),
        );
        scene.add_child(group, rect).expect("add");
        let mut surface = RecordingSurface::new(50, 50);
        direct().paint(&mut scene, &mut surface);
        let DrawOp::Fill { alpha, .. } = &surface.ops()[0] else {
            panic!("expected a fill");
        };
        assert!((alpha - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_invisible_entities_skipped() {
        let mut scene = Scene::new();
        scene.add(
            Entity::rect(10.0, 10.0)
                .with(Property::Visible(false))
                .expect("visible"),
        );
        scene.add(Entity::rect(10.0, 10.0).with_fill(Paint::None));
        let mut surface = RecordingSurface::new(50, 50);
        let report = direct().paint(&mut scene, &mut surface);
        assert_eq!(report.skipped, 2);
        assert!(surface.ops().is_empty());
    }

    #[test]
    fn test_clip_scoped_to_subtree() {
        let mut scene = Scene::new();
        let clip = Entity::rect(5.0, 5.0);
        let clipped = scene.add(Entity::rect(10.0, 10.0).with_clip_path(clip));
        scene.add(Entity::rect(10.0, 10.0).with_position(20.0, 0.0));
        let mut surface = RecordingSurface::new(50, 50);
        direct().paint(&mut scene, &mut surface);

        let names: Vec<_> = surface.ops().iter().map(DrawOp::name).collect();
        assert_eq!(names, ["clip", "fill", "fill"]);
        assert_eq!(surface.clip_depth(), 0);
        assert!(scene.entity(clipped).expect("clipped").clip_path().is_some());
    }
}
