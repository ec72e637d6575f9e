//! Render-cache controller.
//!
//! Leaf entities can be painted through an offscreen raster they own. The
//! controller decides per paint whether that raster is used, whether it is
//! still current, and rebuilds it when it is not. Anything it cannot cache
//! is drawn straight onto the target surface.

use serde::{Deserialize, Serialize};
use trellis_core::matrix::decompose;
use trellis_core::{
    Cacheable, DirtyState, Drawable, ElementId, Entity, EntityKind, Matrix, RenderCache, Scene,
    SceneResult, Surface, Transformable,
};

/// Configuration for the render cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Maximum pixel area of one cache buffer.
    pub perf_limit_size_total: u64,
    /// Maximum width or height of one cache buffer.
    pub max_cache_side: u32,
    /// Buffers are padded up to this side so small size changes reuse them.
    pub min_cache_side: u32,
    /// Relative on-screen scale change tolerated before a cache is redrawn.
    pub scale_tolerance: f64,
    /// Master switch; when off every entity is drawn directly.
    pub object_caching: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            perf_limit_size_total: 2_097_152,
            max_cache_side: 4096,
            min_cache_side: 256,
            scale_tolerance: 0.05,
            object_caching: true,
        }
    }
}

/// On-screen scale of an entity, per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom {
    /// Horizontal scale.
    pub x: f64,
    /// Vertical scale.
    pub y: f64,
}

impl Zoom {
    /// Unscaled.
    pub const ONE: Self = Self { x: 1.0, y: 1.0 };

    /// Scale carried by `matrix`, ignoring rotation, skew and reflection.
    #[must_use]
    pub fn of(matrix: &Matrix) -> Self {
        let components = decompose(matrix);
        Self {
            x: components.scale_x.abs(),
            y: components.scale_y.abs(),
        }
    }

    fn is_usable(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x > 0.0 && self.y > 0.0
    }

    fn within(self, other: Self, tolerance: f64) -> bool {
        relative_difference(self.x, other.x) <= tolerance
            && relative_difference(self.y, other.y) <= tolerance
    }
}

fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

/// Why a cacheable entity was drawn directly instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The buffer would exceed the configured size limits.
    Oversize {
        /// Required width in pixels.
        width: u32,
        /// Required height in pixels.
        height: u32,
    },
    /// The surface could not allocate an offscreen buffer.
    AllocationFailed {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },
}

/// What the controller decides for one entity at one zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePlan {
    /// Nothing would be drawn.
    Empty,
    /// Caching is off for this entity; draw directly.
    Direct,
    /// Too large to cache; draw directly.
    Oversize {
        /// Required width in pixels.
        width: u32,
        /// Required height in pixels.
        height: u32,
    },
    /// Cache in a buffer of this size.
    Cached {
        /// Buffer width in pixels.
        width: u32,
        /// Buffer height in pixels.
        height: u32,
    },
}

/// How one leaf was put on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Nothing to draw.
    Empty,
    /// Drawn directly; caching is off for it.
    Direct,
    /// Blitted from a still valid cache.
    Hit,
    /// Cache rebuilt, then blitted.
    Regenerated,
    /// Cacheable, but drawn directly.
    Fallback(FallbackReason),
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache rebuilds.
    pub regenerations: u64,
    /// Number of policy or allocation fallbacks.
    pub fallbacks: u64,
    /// Number of caches dropped because the entity stopped caching.
    pub released: u64,
    /// Total bytes of rebuilt buffers.
    pub bytes_allocated: u64,
}

/// Decides and maintains per-entity render caches.
#[derive(Debug, Clone, Default)]
pub struct CacheController {
    config: CacheConfig,
    gpu_filtering: bool,
    stats: CacheStats,
}

impl CacheController {
    /// Create a controller with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            gpu_filtering: false,
            stats: CacheStats::default(),
        }
    }

    /// Never cache images; their filtered pixels live on the GPU.
    #[must_use]
    pub fn with_gpu_filtering(mut self, enabled: bool) -> Self {
        self.gpu_filtering = enabled;
        self
    }

    /// Get the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get cache statistics.
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Reset statistics to zero.
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Pixel size needed to hold `entity` at `zoom`, stroke and a one
    /// pixel margin on each side included.
    #[must_use]
    pub fn required_size(entity: &Entity, zoom: Zoom) -> (u32, u32) {
        let g = entity.geometry();
        let stroke = if entity.style.has_stroke() {
            entity.style.stroke_width
        } else {
            0.0
        };
        (
            pixel_side(g.width + stroke, zoom.x),
            pixel_side(g.height + stroke, zoom.y),
        )
    }

    /// Decide how `entity` is painted at `zoom`.
    #[must_use]
    pub fn plan(&self, entity: &Entity, zoom: Zoom) -> CachePlan {
        if !entity.has_paintable_content() {
            return CachePlan::Empty;
        }
        if !self.caching_allowed(entity) || !zoom.is_usable() {
            return CachePlan::Direct;
        }
        let (width, height) = Self::required_size(entity, zoom);
        let max_side = self.config.max_cache_side;
        if width > max_side
            || height > max_side
            || u64::from(width) * u64::from(height) > self.config.perf_limit_size_total
        {
            return CachePlan::Oversize { width, height };
        }
        CachePlan::Cached {
            width: width.max(self.config.min_cache_side).min(max_side),
            height: height.max(self.config.min_cache_side).min(max_side),
        }
    }

    /// Whether `entity` would be painted through its cache at `zoom`.
    #[must_use]
    pub fn should_cache(&self, entity: &Entity, zoom: Zoom) -> bool {
        matches!(self.plan(entity, zoom), CachePlan::Cached { .. })
    }

    /// Whether the cache `entity` holds can be blitted as is at `zoom`.
    ///
    /// False when the entity changed since the cache was drawn, when there
    /// is no cache, when caching does not apply, or when the pixel size the
    /// cache was drawn at differs from the current one by more than the
    /// configured tolerance.
    #[must_use]
    pub fn is_cache_valid(&self, entity: &Entity, zoom: Zoom) -> bool {
        if entity.dirty_state() != DirtyState::Clean {
            return false;
        }
        let Some(cache) = entity.render_cache() else {
            return false;
        };
        cache.revision == entity.revision()
            && self.should_cache(entity, zoom)
            && Zoom {
                x: cache.zoom_x,
                y: cache.zoom_y,
            }
            .within(zoom, self.config.scale_tolerance)
    }

    /// Paint leaf `id` at the surface's current transform, through its
    /// cache when possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is missing or its draw logic fails.
    /// Allocation failures are not errors; they fall back to direct drawing.
    pub fn draw(
        &mut self,
        scene: &mut Scene,
        id: ElementId,
        surface: &mut dyn Surface,
    ) -> SceneResult<CacheOutcome> {
        let zoom = Zoom::of(&surface.current_transform());
        let plan = self.plan(scene.entity(id)?, zoom);
        tracing::trace!("Cache plan for {id}: {plan:?}");

        let (width, height) = match plan {
            CachePlan::Empty => {
                self.release(scene, id)?;
                return Ok(CacheOutcome::Empty);
            }
            CachePlan::Direct => {
                self.release(scene, id)?;
                draw_direct(scene.entity(id)?, surface)?;
                return Ok(CacheOutcome::Direct);
            }
            CachePlan::Oversize { width, height } => {
                self.release(scene, id)?;
                self.stats.fallbacks += 1;
                draw_direct(scene.entity(id)?, surface)?;
                return Ok(CacheOutcome::Fallback(FallbackReason::Oversize {
                    width,
                    height,
                }));
            }
            CachePlan::Cached { width, height } => (width, height),
        };

        if self.is_cache_valid(scene.entity(id)?, zoom) {
            self.stats.hits += 1;
            blit(scene.entity(id)?, surface);
            return Ok(CacheOutcome::Hit);
        }

        if let Some(reason) = self.regenerate(scene, id, &*surface, zoom, (width, height))? {
            self.stats.fallbacks += 1;
            draw_direct(scene.entity(id)?, surface)?;
            return Ok(CacheOutcome::Fallback(reason));
        }
        blit(scene.entity(id)?, surface);
        Ok(CacheOutcome::Regenerated)
    }

    /// Redraw the cache of `id` into a fresh `size` buffer at `zoom`.
    ///
    /// Returns a fallback reason instead of an error when the buffer cannot
    /// be allocated; the entity's state is then left untouched. The previous
    /// buffer is released as the new one is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is missing or its draw logic fails;
    /// the entity is left dirty.
    pub fn regenerate(
        &mut self,
        scene: &mut Scene,
        id: ElementId,
        surface: &dyn Surface,
        zoom: Zoom,
        size: (u32, u32),
    ) -> SceneResult<Option<FallbackReason>> {
        let (width, height) = size;
        let Some(mut offscreen) = surface.create_offscreen(width, height) else {
            tracing::warn!("Cache buffer {width}x{height} for {id} could not be allocated");
            return Ok(Some(FallbackReason::AllocationFailed { width, height }));
        };

        let revision = scene.cacheable_mut(id)?.begin_regeneration();
        offscreen.transform(&Matrix::translate(
            f64::from(width) / 2.0,
            f64::from(height) / 2.0,
        ));
        offscreen.transform(&Matrix::scale(zoom.x, zoom.y));
        if let Err(err) = draw_direct(scene.entity(id)?, offscreen.as_mut()) {
            scene.cacheable_mut(id)?.mark_dirty();
            return Err(err);
        }

        let buffer = offscreen.image_data();
        self.stats.regenerations += 1;
        self.stats.bytes_allocated += buffer.data.len() as u64;
        let current = scene.cacheable_mut(id)?.finish_regeneration(RenderCache {
            buffer,
            zoom_x: zoom.x,
            zoom_y: zoom.y,
            revision,
        });
        if !current {
            tracing::debug!("{id} changed while its cache was rebuilt; left dirty");
        }
        Ok(None)
    }

    fn caching_allowed(&self, entity: &Entity) -> bool {
        self.config.object_caching
            && entity.object_caching()
            && !entity.is_group()
            && !(self.gpu_filtering && matches!(entity.kind, EntityKind::Image(_)))
    }

    fn release(&mut self, scene: &mut Scene, id: ElementId) -> SceneResult<()> {
        if scene.entity(id)?.render_cache().is_some() {
            scene.cacheable_mut(id)?.release_cache();
            self.stats.released += 1;
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_side(extent: f64, zoom: f64) -> u32 {
    let side = (extent.abs() * zoom).ceil() + 2.0;
    if side.is_finite() && side < f64::from(u32::MAX) {
        side as u32
    } else {
        u32::MAX
    }
}

fn draw_direct(entity: &Entity, surface: &mut dyn Surface) -> SceneResult<()> {
    let g = entity.geometry();
    entity.kind.render(surface, g.width, g.height, &entity.style)
}

/// Blit the entity's cache centered on the current origin, undoing the zoom
/// it was drawn at.
fn blit(entity: &Entity, surface: &mut dyn Surface) {
    let Some(cache) = entity.render_cache() else {
        return;
    };
    let (w, h) = (f64::from(cache.width()), f64::from(cache.height()));
    surface.save();
    surface.transform(&Matrix::scale(1.0 / cache.zoom_x, 1.0 / cache.zoom_y));
    surface.draw_raster(&cache.buffer, -w / 2.0, -h / 2.0, w, h);
    surface.restore();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{DrawOp, RecordingSurface};
    use trellis_core::{Paint, Property};

    fn red_rect(width: f64, height: f64) -> Entity {
        Entity::rect(width, height).with_fill(Paint::color("red"))
    }

    #[test]
    fn test_required_size_includes_stroke_and_margin() {
        let entity = red_rect(100.0, 50.0).with_stroke(Paint::color("black"), 4.0);
        let size = CacheController::required_size(&entity, Zoom { x: 2.0, y: 1.0 });
        assert_eq!(size, (210, 56));
    }

    #[test]
    fn test_plan_pads_to_min_side() {
        let controller = CacheController::default();
        assert_eq!(
            controller.plan(&red_rect(10.0, 10.0), Zoom::ONE),
            CachePlan::Cached {
                width: 256,
                height: 256
            }
        );
    }

    #[test]
    fn test_plan_oversize() {
        let controller = CacheController::new(CacheConfig::default());
        let wide = red_rect(5000.0, 10.0);
        assert!(matches!(
            controller.plan(&wide, Zoom::ONE),
            CachePlan::Oversize { width: 5002, .. }
        ));
        // within each side limit but over the total area
        let big = red_rect(2000.0, 2000.0);
        assert!(matches!(
            controller.plan(&big, Zoom::ONE),
            CachePlan::Oversize { .. }
        ));
    }

    #[test]
    fn test_plan_respects_switches() {
        let entity = red_rect(10.0, 10.0);
        let off = CacheController::new(CacheConfig {
            object_caching: false,
            ..CacheConfig::default()
        });
        assert_eq!(off.plan(&entity, Zoom::ONE), CachePlan::Direct);

        let entity = entity.with(Property::ObjectCaching(false)).expect("caching");
        assert_eq!(
            CacheController::default().plan(&entity, Zoom::ONE),
            CachePlan::Direct
        );

        let transparent = Entity::rect(10.0, 10.0).with_fill(Paint::None);
        assert_eq!(
            CacheController::default().plan(&transparent, Zoom::ONE),
            CachePlan::Empty
        );
    }

    #[test]
    fn test_gpu_filtering_disables_image_cache() {
        let mut image = Entity::image("a.png").with_size(4.0, 4.0);
        image
            .set_image_element(trellis_core::RasterBuffer::new(4, 4))
            .expect("pixels");
        let controller = CacheController::default();
        assert!(controller.should_cache(&image, Zoom::ONE));
        let controller = controller.with_gpu_filtering(true);
        assert!(!controller.should_cache(&image, Zoom::ONE));
        assert!(controller.should_cache(&red_rect(4.0, 4.0), Zoom::ONE));
    }

    #[test]
    fn test_zoom_ignores_rotation() {
        let m = Matrix::rotate(30.0).multiply(&Matrix::scale(2.0, -3.0));
        let zoom = Zoom::of(&m);
        assert!((zoom.x - 2.0).abs() < 1e-9);
        assert!((zoom.y - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_draw_regenerates_then_hits() {
        let mut scene = Scene::new();
        let id = scene.add(red_rect(20.0, 10.0));
        let mut controller = CacheController::default();
        let mut surface = RecordingSurface::new(100, 100);

        let outcome = controller.draw(&mut scene, id, &mut surface).expect("draw");
        assert_eq!(outcome, CacheOutcome::Regenerated);
        assert!(controller.is_cache_valid(scene.entity(id).expect("entity"), Zoom::ONE));

        let outcome = controller.draw(&mut scene, id, &mut surface).expect("draw");
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(controller.stats().regenerations, 1);
        assert_eq!(controller.stats().hits, 1);
        assert!(surface
            .ops()
            .iter()
            .all(|op| matches!(op, DrawOp::DrawRaster { .. })));
    }

    #[test]
    fn test_zoom_change_beyond_tolerance_invalidates() {
        let mut scene = Scene::new();
        let id = scene.add(red_rect(20.0, 10.0));
        let mut controller = CacheController::default();
        let mut surface = RecordingSurface::new(100, 100);
        controller.draw(&mut scene, id, &mut surface).expect("draw");

        let entity = scene.entity(id).expect("entity");
        assert!(controller.is_cache_valid(entity, Zoom { x: 1.04, y: 1.0 }));
        assert!(!controller.is_cache_valid(entity, Zoom { x: 1.5, y: 1.0 }));
    }

    #[test]
    fn test_allocation_failure_falls_back() {
        let mut scene = Scene::new();
        let id = scene.add(red_rect(20.0, 10.0));
        let mut controller = CacheController::default();
        let mut surface = RecordingSurface::new(100, 100).with_offscreen_limit(16);

        let outcome = controller.draw(&mut scene, id, &mut surface).expect("draw");
        assert!(matches!(
            outcome,
            CacheOutcome::Fallback(FallbackReason::AllocationFailed { .. })
        ));
        assert_eq!(surface.ops()[0].name(), "fill");
        let entity = scene.entity(id).expect("entity");
        assert!(entity.render_cache().is_none());
        assert_eq!(entity.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn test_disabling_cache_releases_buffer() {
        let mut scene = Scene::new();
        let id = scene.add(red_rect(20.0, 10.0));
        let mut controller = CacheController::default();
        let mut surface = RecordingSurface::new(100, 100);
        controller.draw(&mut scene, id, &mut surface).expect("draw");
        assert!(scene.entity(id).expect("entity").render_cache().is_some());

        scene
            .set(id, Property::ObjectCaching(false))
            .expect("caching");
        let outcome = controller.draw(&mut scene, id, &mut surface).expect("draw");
        assert_eq!(outcome, CacheOutcome::Direct);
        assert!(scene.entity(id).expect("entity").render_cache().is_none());
        assert_eq!(controller.stats().released, 1);
    }
}
