//! Surface backends the paint driver draws onto.

#[cfg(feature = "raster")]
pub mod raster;
pub mod recording;

use trellis_core::{Matrix, Point, Surface};

use crate::{BackendType, RenderResult};

/// A drawing surface owned by a [`crate::Renderer`].
pub trait RenderBackend: Surface {
    /// Get the backend type.
    fn backend_type(&self) -> BackendType;

    /// Resize the surface, discarding its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the new size cannot be allocated.
    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()>;

    /// Clear to transparent and reset the drawing state for a new frame.
    fn clear(&mut self);

    /// This backend as a plain surface.
    fn as_surface(&mut self) -> &mut dyn Surface;
}

/// One segment of a path, in device space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    /// Start a subpath.
    MoveTo(Point),
    /// Straight segment.
    LineTo(Point),
    /// Quadratic Bézier: control, end.
    QuadTo(Point, Point),
    /// Cubic Bézier: two controls, end.
    CubicTo(Point, Point, Point),
    /// Close the subpath.
    Close,
}

/// Accumulates path segments, transforming each point when it is added.
///
/// A path built under one transform and filled or clipped under another
/// keeps the geometry it was built with.
#[derive(Debug, Clone, Default)]
pub(crate) struct PathRecorder {
    segments: Vec<PathSegment>,
}

impl PathRecorder {
    pub(crate) fn clear(&mut self) {
        self.segments.clear();
    }

    pub(crate) fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub(crate) fn move_to(&mut self, m: &Matrix, x: f64, y: f64) {
        self.segments
            .push(PathSegment::MoveTo(m.apply(Point::new(x, y))));
    }

    pub(crate) fn line_to(&mut self, m: &Matrix, x: f64, y: f64) {
        self.segments
            .push(PathSegment::LineTo(m.apply(Point::new(x, y))));
    }

    pub(crate) fn quad_to(&mut self, m: &Matrix, cx: f64, cy: f64, x: f64, y: f64) {
        self.segments.push(PathSegment::QuadTo(
            m.apply(Point::new(cx, cy)),
            m.apply(Point::new(x, y)),
        ));
    }

    pub(crate) fn cubic_to(&mut self, m: &Matrix, c1: (f64, f64), c2: (f64, f64), end: (f64, f64)) {
        self.segments.push(PathSegment::CubicTo(
            m.apply(Point::new(c1.0, c1.1)),
            m.apply(Point::new(c2.0, c2.1)),
            m.apply(Point::new(end.0, end.1)),
        ));
    }

    pub(crate) fn close(&mut self) {
        self.segments.push(PathSegment::Close);
    }
}
