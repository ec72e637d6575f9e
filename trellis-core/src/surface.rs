//! The immediate-mode drawing surface the scene paints onto.
//!
//! Implementations live outside this crate (see `trellis-renderer`). Entity
//! draw logic is expressed purely in terms of [`Surface`] calls.

use std::f64::consts::FRAC_PI_2;

use crate::matrix::Matrix;
use crate::style::{FillRule, ResolvedPaint, StrokeStyle};

/// Raw RGBA pixels, premultiplied, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel data, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl RasterBuffer {
    /// A transparent buffer.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; Self::byte_len(width, height)],
        }
    }

    /// Wrap existing pixel data. Returns `None` if the length does not match.
    #[must_use]
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == Self::byte_len(width, height)).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Number of pixels.
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// RGBA of the pixel at `(x, y)`, if in bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.data
            .get(idx..idx + 4)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }

    fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }
}

/// A 2D immediate-mode drawing context, analogous to a canvas 2D context.
///
/// Path coordinates are in the current user space, i.e. transformed by the
/// matrix set with [`Surface::set_transform`] / [`Surface::transform`] at the
/// time each segment is added. Changing the transform afterwards does not
/// move an already built path.
pub trait Surface {
    /// Push the current state (transform, clip, global alpha).
    fn save(&mut self);

    /// Pop the last saved state. A restore without a matching save is ignored.
    fn restore(&mut self);

    /// Multiply the current transform by `matrix` (`current ∘ matrix`).
    fn transform(&mut self, matrix: &Matrix);

    /// Replace the current transform.
    fn set_transform(&mut self, matrix: &Matrix);

    /// The current transform.
    fn current_transform(&self) -> Matrix;

    /// Set the global alpha applied to subsequent fills, strokes and blits.
    fn set_global_alpha(&mut self, alpha: f64);

    /// The current global alpha.
    fn global_alpha(&self) -> f64;

    /// Start a new path, discarding the current one.
    fn begin_path(&mut self);

    /// Start a subpath at `(x, y)`.
    fn move_to(&mut self, x: f64, y: f64);

    /// Straight segment to `(x, y)`.
    fn line_to(&mut self, x: f64, y: f64);

    /// Quadratic Bézier segment.
    fn quadratic_curve_to(&mut self, cx: f64, cy: f64, x: f64, y: f64);

    /// Cubic Bézier segment.
    fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64);

    /// Close the current subpath.
    fn close_path(&mut self);

    /// Fill the current path.
    fn fill(&mut self, paint: &ResolvedPaint, rule: FillRule);

    /// Stroke the current path.
    fn stroke(&mut self, paint: &ResolvedPaint, style: &StrokeStyle);

    /// Intersect the clip region with the current path.
    fn clip(&mut self, rule: FillRule);

    /// Draw a raster into the rectangle `(x, y, width, height)` of user space.
    fn draw_raster(&mut self, raster: &RasterBuffer, x: f64, y: f64, width: f64, height: f64);

    /// Read back the surface pixels.
    fn image_data(&self) -> RasterBuffer;

    /// Write pixels at device position `(x, y)`, ignoring transform and clip.
    fn put_image_data(&mut self, data: &RasterBuffer, x: i32, y: i32);

    /// Surface size in device pixels.
    fn size(&self) -> (u32, u32);

    /// Allocate an offscreen surface of the same kind.
    ///
    /// Returns `None` when the backend cannot allocate the buffer.
    fn create_offscreen(&self, width: u32, height: u32) -> Option<Box<dyn Surface>>;
}

/// Magic constant for approximating a quarter circle with one cubic.
const KAPPA: f64 = 0.552_284_749_830_793_4;

/// Trace an axis-aligned ellipse centered at `(cx, cy)` as four cubics.
pub fn trace_ellipse(surface: &mut dyn Surface, cx: f64, cy: f64, rx: f64, ry: f64) {
    let (ox, oy) = (rx * KAPPA, ry * KAPPA);
    surface.move_to(cx + rx, cy);
    surface.bezier_curve_to(cx + rx, cy + oy, cx + ox, cy + ry, cx, cy + ry);
    surface.bezier_curve_to(cx - ox, cy + ry, cx - rx, cy + oy, cx - rx, cy);
    surface.bezier_curve_to(cx - rx, cy - oy, cx - ox, cy - ry, cx, cy - ry);
    surface.bezier_curve_to(cx + ox, cy - ry, cx + rx, cy - oy, cx + rx, cy);
    surface.close_path();
}

/// Trace an elliptical arc from `start` to `end` (radians, clockwise in
/// y-down space) as cubics of at most a quarter turn each. Starts a new
/// subpath at the arc's first point when `move_first` is set.
pub fn trace_arc(
    surface: &mut dyn Surface,
    center: (f64, f64),
    radii: (f64, f64),
    start: f64,
    end: f64,
    move_first: bool,
) {
    let (cx, cy) = center;
    let (rx, ry) = radii;
    let sweep = end - start;
    if sweep == 0.0 {
        return;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let segments = (sweep.abs() / FRAC_PI_2).ceil().max(1.0) as usize;
    #[allow(clippy::cast_precision_loss)]
    let step = sweep / segments as f64;
    let k = 4.0 / 3.0 * (step / 4.0).tan();

    let point = |angle: f64| (cx + rx * angle.cos(), cy + ry * angle.sin());
    let (x0, y0) = point(start);
    if move_first {
        surface.move_to(x0, y0);
    } else {
        surface.line_to(x0, y0);
    }
    let mut angle = start;
    for _ in 0..segments {
        let next = angle + step;
        let (sin0, cos0) = angle.sin_cos();
        let (sin1, cos1) = next.sin_cos();
        surface.bezier_curve_to(
            cx + rx * (cos0 - k * sin0),
            cy + ry * (sin0 + k * cos0),
            cx + rx * (cos1 + k * sin1),
            cy + ry * (sin1 - k * cos1),
            cx + rx * cos1,
            cy + ry * sin1,
        );
        angle = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_buffer_pixels() {
        let mut buffer = RasterBuffer::new(2, 2);
        assert_eq!(buffer.data.len(), 16);
        buffer.data[12..16].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buffer.pixel(1, 1), Some([1, 2, 3, 4]));
        assert_eq!(buffer.pixel(2, 0), None);
        assert_eq!(buffer.pixel_count(), 4);
    }

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(RasterBuffer::from_rgba(1, 1, vec![0; 4]).is_some());
        assert!(RasterBuffer::from_rgba(1, 1, vec![0; 3]).is_none());
    }
}
