//! CPU raster backend built on tiny-skia.
//!
//! Paths are collected in device space, so fills use an identity transform
//! and strokes map the path back into the user space they were issued in to
//! get correctly transformed line widths.

use tiny_skia::{
    FillRule as SkFillRule, FilterQuality, GradientStop, IntSize, LinearGradient, Mask, Paint,
    PathBuilder, Pixmap, PixmapPaint, Shader, SpreadMode, Stroke, Transform,
};
use trellis_core::style::{LineCap, LineJoin, StrokeStyle};
use trellis_core::{FillRule, Matrix, RasterBuffer, ResolvedPaint, Rgba, Surface};

use super::{PathRecorder, PathSegment, RenderBackend};
use crate::{BackendType, RenderError, RenderResult};

#[derive(Clone)]
struct State {
    transform: Matrix,
    alpha: f64,
    clip: Option<Mask>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            transform: Matrix::IDENTITY,
            alpha: 1.0,
            clip: None,
        }
    }
}

/// A [`Surface`] rasterizing into a `tiny_skia::Pixmap`.
#[derive(Clone)]
pub struct RasterSurface {
    pixmap: Pixmap,
    state: State,
    stack: Vec<State>,
    path: PathRecorder,
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .field("transform", &self.state.transform)
            .field("clipped", &self.state.clip.is_some())
            .field("save_depth", &self.stack.len())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
impl RasterSurface {
    /// Create a transparent surface.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Surface`] for a zero or oversized dimension.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            RenderError::Surface(format!("cannot allocate {width}x{height} pixmap"))
        })?;
        Ok(Self::from_pixmap(pixmap))
    }

    fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            pixmap,
            state: State::default(),
            stack: Vec::new(),
            path: PathRecorder::default(),
        }
    }

    /// The underlying pixmap.
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Straight-alpha RGBA of the pixel at `(x, y)`.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    fn build_path(&self) -> Option<tiny_skia::Path> {
        let mut pb = PathBuilder::new();
        for segment in self.path.segments() {
            match *segment {
                PathSegment::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
                PathSegment::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
                PathSegment::QuadTo(c, p) => {
                    pb.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32);
                }
                PathSegment::CubicTo(c1, c2, p) => pb.cubic_to(
                    c1.x as f32,
                    c1.y as f32,
                    c2.x as f32,
                    c2.y as f32,
                    p.x as f32,
                    p.y as f32,
                ),
                PathSegment::Close => pb.close(),
            }
        }
        pb.finish()
    }

    fn paint(&self, paint: &ResolvedPaint, shader_transform: Transform) -> Option<Paint<'static>> {
        let alpha = self.state.alpha;
        let shader = match paint {
            ResolvedPaint::Solid(color) => Shader::SolidColor(sk_color(color, alpha)?),
            ResolvedPaint::LinearGradient { start, end, stops } => {
                let stops = stops
                    .iter()
                    .map(|(offset, color)| {
                        sk_color(color, alpha).map(|c| GradientStop::new(*offset as f32, c))
                    })
                    .collect::<Option<Vec<_>>>()?;
                LinearGradient::new(
                    tiny_skia::Point::from_xy(start.x as f32, start.y as f32),
                    tiny_skia::Point::from_xy(end.x as f32, end.y as f32),
                    stops,
                    SpreadMode::Pad,
                    shader_transform,
                )?
            }
        };
        Some(Paint {
            shader,
            anti_alias: true,
            ..Paint::default()
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn sk_transform(m: &Matrix) -> Transform {
    Transform::from_row(
        m.a as f32, m.b as f32, m.c as f32, m.d as f32, m.e as f32, m.f as f32,
    )
}

#[allow(clippy::cast_possible_truncation)]
fn sk_color(color: &Rgba, alpha: f64) -> Option<tiny_skia::Color> {
    tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0) as f32,
        color.g.clamp(0.0, 1.0) as f32,
        color.b.clamp(0.0, 1.0) as f32,
        (color.a * alpha).clamp(0.0, 1.0) as f32,
    )
}

fn sk_fill_rule(rule: FillRule) -> SkFillRule {
    match rule {
        FillRule::Nonzero => SkFillRule::Winding,
        FillRule::Evenodd => SkFillRule::EvenOdd,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn sk_stroke(style: &StrokeStyle) -> Stroke {
    Stroke {
        width: style.width as f32,
        miter_limit: style.miter_limit as f32,
        line_cap: match style.cap {
            LineCap::Butt => tiny_skia::LineCap::Butt,
            LineCap::Round => tiny_skia::LineCap::Round,
            LineCap::Square => tiny_skia::LineCap::Square,
        },
        line_join: match style.join {
            LineJoin::Miter => tiny_skia::LineJoin::Miter,
            LineJoin::Round => tiny_skia::LineJoin::Round,
            LineJoin::Bevel => tiny_skia::LineJoin::Bevel,
        },
        dash: None,
    }
}

#[allow(clippy::cast_possible_truncation)]
impl Surface for RasterSurface {
    fn save(&mut self) {
        self.stack.push(self.state.clone());
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
        let Some(path) = self.build_path() else {
            return;
        };
        let Some(paint) = self.paint(paint, sk_transform(&self.state.transform)) else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &paint,
            sk_fill_rule(rule),
            Transform::identity(),
            self.state.clip.as_ref(),
        );
    }

    fn stroke(&mut self, paint: &ResolvedPaint, style: &StrokeStyle) {
        let Ok(inverse) = self.state.transform.invert() else {
            return;
        };
        let Some(path) = self
            .build_path()
            .and_then(|p| p.transform(sk_transform(&inverse)))
        else {
            return;
        };
        let Some(paint) = self.paint(paint, Transform::identity()) else {
            return;
        };
        self.pixmap.stroke_path(
            &path,
            &paint,
            &sk_stroke(style),
            sk_transform(&self.state.transform),
            self.state.clip.as_ref(),
        );
    }

    fn clip(&mut self, rule: FillRule) {
        let rule = sk_fill_rule(rule);
        let Some(path) = self.build_path() else {
            // an empty clip path hides everything
            self.state.clip = Mask::new(self.pixmap.width(), self.pixmap.height());
            return;
        };
        match &mut self.state.clip {
            Some(mask) => mask.intersect_path(&path, rule, true, Transform::identity()),
            None => {
                if let Some(mut mask) = Mask::new(self.pixmap.width(), self.pixmap.height()) {
                    mask.fill_path(&path, rule, true, Transform::identity());
                    self.state.clip = Some(mask);
                }
            }
        }
    }

    fn draw_raster(&mut self, raster: &RasterBuffer, x: f64, y: f64, width: f64, height: f64) {
        let Some(size) = IntSize::from_wh(raster.width, raster.height) else {
            return;
        };
        let Some(source) = Pixmap::from_vec(raster.data.clone(), size) else {
            return;
        };
        let placement = Matrix::translate(x, y).multiply(&Matrix::scale(
            width / f64::from(raster.width),
            height / f64::from(raster.height),
        ));
        let paint = PixmapPaint {
            opacity: self.state.alpha as f32,
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &paint,
            sk_transform(&self.state.transform.multiply(&placement)),
            self.state.clip.as_ref(),
        );
    }

    fn image_data(&self) -> RasterBuffer {
        let (width, height) = (self.pixmap.width(), self.pixmap.height());
        RasterBuffer::from_rgba(width, height, self.pixmap.data().to_vec())
            .unwrap_or_else(|| RasterBuffer::new(width, height))
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    fn put_image_data(&mut self, data: &RasterBuffer, x: i32, y: i32) {
        let (dst_w, dst_h) = (
            i64::from(self.pixmap.width()),
            i64::from(self.pixmap.height()),
        );
        let row_bytes = data.width as usize * 4;
        let pixels = self.pixmap.data_mut();
        for row in 0..i64::from(data.height) {
            let dy = i64::from(y) + row;
            if dy < 0 || dy >= dst_h {
                continue;
            }
            let x0 = i64::from(x).max(0);
            let x1 = (i64::from(x) + i64::from(data.width)).min(dst_w);
            if x0 >= x1 {
                continue;
            }
            let src_start = row as usize * row_bytes + (x0 - i64::from(x)) as usize * 4;
            let dst_start = (dy * dst_w + x0) as usize * 4;
            let len = (x1 - x0) as usize * 4;
            if let (Some(src), Some(dst)) = (
                data.data.get(src_start..src_start + len),
                pixels.get_mut(dst_start..dst_start + len),
            ) {
                dst.copy_from_slice(src);
            }
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    fn create_offscreen(&self, width: u32, height: u32) -> Option<Box<dyn Surface>> {
        let pixmap = Pixmap::new(width, height)?;
        Some(Box::new(Self::from_pixmap(pixmap)))
    }
}

impl RenderBackend for RasterSurface {
    fn backend_type(&self) -> BackendType {
        BackendType::Raster
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        *self = Self::new(width, height)?;
        tracing::debug!("Raster surface resized to {}x{}", width, height);
        Ok(())
    }

    fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
        self.path.clear();
        self.stack.clear();
        self.state = State::default();
    }

    fn as_surface(&mut self) -> &mut dyn Surface {
        self
    }
}
