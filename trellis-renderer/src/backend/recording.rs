//! Recording backend for devices without a rasterizer.
//!
//! Every fill, stroke, clip and blit is kept as a [`DrawOp`] together with
//! the transform and global alpha in effect, so callers can inspect exactly
//! what a paint pass issued. Nothing is rasterized: pixel readback returns a
//! transparent buffer of the surface's size.

use trellis_core::style::StrokeStyle;
use trellis_core::{FillRule, Matrix, RasterBuffer, ResolvedPaint, Surface};

use super::{PathRecorder, PathSegment, RenderBackend};
use crate::{BackendType, RenderResult};

/// A drawing operation captured by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Path fill.
    Fill {
        /// Device-space path.
        path: Vec<PathSegment>,
        /// Resolved paint.
        paint: ResolvedPaint,
        /// Interior rule.
        rule: FillRule,
        /// Transform in effect.
        transform: Matrix,
        /// Global alpha in effect.
        alpha: f64,
    },
    /// Path stroke.
    Stroke {
        /// Device-space path.
        path: Vec<PathSegment>,
        /// Resolved paint.
        paint: ResolvedPaint,
        /// Stroke parameters.
        style: StrokeStyle,
        /// Transform in effect.
        transform: Matrix,
        /// Global alpha in effect.
        alpha: f64,
    },
    /// Clip intersection.
    Clip {
        /// Device-space path.
        path: Vec<PathSegment>,
        /// Interior rule.
        rule: FillRule,
    },
    /// Raster blit.
    DrawRaster {
        /// Source width in pixels.
        width: u32,
        /// Source height in pixels.
        height: u32,
        /// Destination rectangle `[x, y, width, height]` in user space.
        rect: [f64; 4],
        /// Transform in effect.
        transform: Matrix,
        /// Global alpha in effect.
        alpha: f64,
    },
    /// Direct pixel write.
    PutImageData {
        /// Source width in pixels.
        width: u32,
        /// Source height in pixels.
        height: u32,
        /// Device x.
        x: i32,
        /// Device y.
        y: i32,
    },
}

impl DrawOp {
    /// Transform in effect when the operation was issued, for operations
    /// that use one.
    #[must_use]
    pub fn transform(&self) -> Option<Matrix> {
        match self {
            Self::Fill { transform, .. }
            | Self::Stroke { transform, .. }
            | Self::DrawRaster { transform, .. } => Some(*transform),
            Self::Clip { .. } | Self::PutImageData { .. } => None,
        }
    }

    /// Short name for logs and assertions.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fill { .. } => "fill",
            Self::Stroke { .. } => "stroke",
            Self::Clip { .. } => "clip",
            Self::DrawRaster { .. } => "draw_raster",
            Self::PutImageData { .. } => "put_image_data",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct State {
    transform: Matrix,
    alpha: f64,
    clip_depth: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            transform: Matrix::IDENTITY,
            alpha: 1.0,
            clip_depth: 0,
        }
    }
}

/// A [`Surface`] that records operations instead of drawing them.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    state: State,
    stack: Vec<State>,
    path: PathRecorder,
    ops: Vec<DrawOp>,
    max_offscreen_pixels: Option<u64>,
}

impl RecordingSurface {
    /// Create a new recording surface.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: State::default(),
            stack: Vec::new(),
            path: PathRecorder::default(),
            ops: Vec::new(),
            max_offscreen_pixels: None,
        }
    }

    /// Refuse offscreen surfaces larger than `pixels`, simulating a backend
    /// that runs out of buffer memory.
    #[must_use]
    pub fn with_offscreen_limit(mut self, pixels: u64) -> Self {
        self.max_offscreen_pixels = Some(pixels);
        self
    }

    /// Recorded operations, oldest first.
    #[must_use]
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Take the recorded operations, leaving the log empty.
    pub fn take_ops(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }

    /// Number of unmatched [`Surface::save`] calls.
    #[must_use]
    pub fn save_depth(&self) -> usize {
        self.stack.len()
    }

    /// Number of clips intersected into the current state.
    #[must_use]
    pub fn clip_depth(&self) -> usize {
        self.state.clip_depth
    }

    fn path_snapshot(&self) -> Vec<PathSegment> {
        self.path.segments().to_vec()
    }
}

impl Surface for RecordingSurface {
    fn save(&mut self) {
        self.stack.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn transform(&mut self, matrix: &Matrix) {
        self.state.transform = self.state.transform.multiply(matrix);
    }

    fn set_transform(&mut self, matrix: &Matrix) {
        self.state.transform = *matrix;
    }

    fn current_transform(&self) -> Matrix {
        self.state.transform
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    fn global_alpha(&self) -> f64 {
        self.state.alpha
    }

    fn begin_path(&mut self) {
        self.path.clear();
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.path.move_to(&self.state.transform, x, y);
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.path.line_to(&self.state.transform, x, y);
    }

    fn quadratic_curve_to(&mut self, cx: f64, cy: f64, x: f64, y: f64) {
        self.path.quad_to(&self.state.transform, cx, cy, x, y);
    }

    fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64) {
        self.path
            .cubic_to(&self.state.transform, (c1x, c1y), (c2x, c2y), (x, y));
    }

    fn close_path(&mut self) {
        self.path.close();
    }

    fn fill(&mut self, paint: &ResolvedPaint, rule: FillRule) {
        tracing::trace!("Recording fill of {} segments", self.path.segments().len());
        self.ops.push(DrawOp::Fill {
            path: self.path_snapshot(),
            paint: paint.clone(),
            rule,
            transform: self.state.transform,
            alpha: self.state.alpha,
        });
    }

    fn stroke(&mut self, paint: &ResolvedPaint, style: &StrokeStyle) {
        self.ops.push(DrawOp::Stroke {
            path: self.path_snapshot(),
            paint: paint.clone(),
            style: *style,
            transform: self.state.transform,
            alpha: self.state.alpha,
        });
    }

    fn clip(&mut self, rule: FillRule) {
        self.state.clip_depth += 1;
        self.ops.push(DrawOp::Clip {
            path: self.path_snapshot(),
            rule,
        });
    }

    fn draw_raster(&mut self, raster: &RasterBuffer, x: f64, y: f64, width: f64, height: f64) {
        self.ops.push(DrawOp::DrawRaster {
            width: raster.width,
            height: raster.height,
            rect: [x, y, width, height],
            transform: self.state.transform,
            alpha: self.state.alpha,
        });
    }

    fn image_data(&self) -> RasterBuffer {
        RasterBuffer::new(self.width, self.height)
    }

    fn put_image_data(&mut self, data: &RasterBuffer, x: i32, y: i32) {
        self.ops.push(DrawOp::PutImageData {
            width: data.width,
            height: data.height,
            x,
            y,
        });
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_offscreen(&self, width: u32, height: u32) -> Option<Box<dyn Surface>> {
        if width == 0 || height == 0 {
            return None;
        }
        if let Some(limit) = self.max_offscreen_pixels {
            if u64::from(width) * u64::from(height) > limit {
                tracing::debug!("Recording offscreen {width}x{height} exceeds limit {limit}");
                return None;
            }
        }
        let mut offscreen = Self::new(width, height);
        offscreen.max_offscreen_pixels = self.max_offscreen_pixels;
        Some(Box::new(offscreen))
    }
}

impl RenderBackend for RecordingSurface {
    fn backend_type(&self) -> BackendType {
        BackendType::Recording
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.width = width;
        self.height = height;
        self.clear();
        tracing::debug!("Recording surface resized to {}x{}", width, height);
        Ok(())
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.path.clear();
        self.stack.clear();
        self.state = State::default();
    }

    fn as_surface(&mut self) -> &mut dyn Surface {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Point, Rgba};

    fn red() -> ResolvedPaint {
        ResolvedPaint::Solid(Rgba::new(1.0, 0.0, 0.0, 1.0))
    }

    #[test]
    fn test_path_points_transformed_when_added() {
        let mut surface = RecordingSurface::new(100, 100);
        surface.transform(&Matrix::translate(10.0, 0.0));
        surface.begin_path();
        surface.move_to(0.0, 0.0);
        surface.set_transform(&Matrix::IDENTITY);
        surface.line_to(5.0, 5.0);
        surface.fill(&red(), FillRule::Nonzero);

        let DrawOp::Fill { path, .. } = &surface.ops()[0] else {
            panic!("expected a fill");
        };
        assert_eq!(path[0], PathSegment::MoveTo(Point::new(10.0, 0.0)));
        assert_eq!(path[1], PathSegment::LineTo(Point::new(5.0, 5.0)));
    }

    #[test]
    fn test_save_restore_scopes_state() {
        let mut surface = RecordingSurface::new(10, 10);
        surface.save();
        surface.transform(&Matrix::scale(2.0, 2.0));
        surface.set_global_alpha(0.5);
        surface.begin_path();
        surface.clip(FillRule::Nonzero);
        assert_eq!(surface.clip_depth(), 1);
        surface.restore();
        assert_eq!(surface.clip_depth(), 0);
        assert_eq!(surface.current_transform(), Matrix::IDENTITY);
        assert!((surface.global_alpha() - 1.0).abs() < f64::EPSILON);
        // unmatched restore is ignored
        surface.restore();
        assert_eq!(surface.save_depth(), 0);
    }

    #[test]
    fn test_offscreen_limit() {
        let surface = RecordingSurface::new(10, 10).with_offscreen_limit(100);
        assert!(surface.create_offscreen(10, 10).is_some());
        assert!(surface.create_offscreen(11, 10).is_none());
        assert!(surface.create_offscreen(0, 10).is_none());
    }

    #[test]
    fn test_clear_resets_frame() {
        let mut surface = RecordingSurface::new(10, 10);
        surface.save();
        surface.draw_raster(&RasterBuffer::new(1, 1), 0.0, 0.0, 1.0, 1.0);
        assert_eq!(surface.ops()[0].name(), "draw_raster");
        RenderBackend::clear(&mut surface);
        assert!(surface.ops().is_empty());
        assert_eq!(surface.save_depth(), 0);
    }
}
