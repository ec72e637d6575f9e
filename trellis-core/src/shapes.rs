//! Concrete shapes and how they draw themselves.
//!
//! Every shape draws into its entity's centered local box: the box spans
//! `[-width/2, width/2] x [-height/2, height/2]` and the caller has already
//! applied the entity's transform to the surface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::element::EntityKind;
use crate::geometry::{bounding_box_from_points, BoundingBox, Point};
use crate::style::Style;
use crate::surface::{trace_arc, trace_ellipse, RasterBuffer, Surface};
use crate::SceneResult;

/// Draw logic for a shape.
pub trait Drawable {
    /// Emit the shape's outline as path commands, without filling.
    fn trace(&self, surface: &mut dyn Surface, width: f64, height: f64);

    /// Whether drawing with `style` would put anything on the surface.
    fn has_content(&self, style: &Style) -> bool {
        style.has_fill() || style.has_stroke()
    }

    /// Trace, then fill and stroke with `style`.
    ///
    /// # Errors
    ///
    /// Returns an error if a paint in `style` fails to resolve.
    fn render(
        &self,
        surface: &mut dyn Surface,
        width: f64,
        height: f64,
        style: &Style,
    ) -> SceneResult<()> {
        fill_and_stroke(self, surface, width, height, style)
    }
}

/// Trace `shape`, then fill and stroke it.
///
/// # Errors
///
/// Returns an error if a paint in `style` fails to resolve.
pub fn fill_and_stroke<D: Drawable + ?Sized>(
    shape: &D,
    surface: &mut dyn Surface,
    width: f64,
    height: f64,
    style: &Style,
) -> SceneResult<()> {
    let fill = style.fill.resolve()?;
    let stroke = if style.stroke_width > 0.0 {
        style.stroke.resolve()?
    } else {
        None
    };
    surface.begin_path();
    shape.trace(surface, width, height);
    if let Some(fill) = fill {
        surface.fill(&fill, style.fill_rule);
    }
    if let Some(stroke) = stroke {
        surface.stroke(&stroke, &style.stroke_style());
    }
    Ok(())
}

fn trace_box(surface: &mut dyn Surface, width: f64, height: f64) {
    let (hw, hh) = (width / 2.0, height / 2.0);
    surface.move_to(-hw, -hh);
    surface.line_to(hw, -hh);
    surface.line_to(hw, hh);
    surface.line_to(-hw, hh);
    surface.close_path();
}

/// Rectangle, optionally with rounded corners.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Horizontal corner radius.
    pub rx: f64,
    /// Vertical corner radius.
    pub ry: f64,
}

impl Drawable for Rect {
    fn trace(&self, surface: &mut dyn Surface, width: f64, height: f64) {
        let rx = self.rx.min(width / 2.0);
        let ry = self.ry.min(height / 2.0);
        if rx <= 0.0 || ry <= 0.0 {
            trace_box(surface, width, height);
            return;
        }
        let (hw, hh) = (width / 2.0, height / 2.0);
        let quarter = std::f64::consts::FRAC_PI_2;
        surface.move_to(-hw + rx, -hh);
        trace_arc(surface, (hw - rx, -hh + ry), (rx, ry), -quarter, 0.0, false);
        trace_arc(surface, (hw - rx, hh - ry), (rx, ry), 0.0, quarter, false);
        trace_arc(surface, (-hw + rx, hh - ry), (rx, ry), quarter, 2.0 * quarter, false);
        trace_arc(surface, (-hw + rx, -hh + ry), (rx, ry), 2.0 * quarter, 3.0 * quarter, false);
        surface.close_path();
    }
}

/// Circle or circular arc. Angles are in degrees, clockwise from +x.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Radius; the entity box is `2 * radius` square.
    pub radius: f64,
    /// Arc start.
    pub start_angle: f64,
    /// Arc end.
    pub end_angle: f64,
}

impl Circle {
    /// A full circle.
    #[must_use]
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            start_angle: 0.0,
            end_angle: 360.0,
        }
    }

    /// Whether the arc covers the whole circle.
    #[must_use]
    pub fn is_full(&self) -> bool {
        (self.end_angle - self.start_angle).abs() >= 360.0
    }
}

impl Drawable for Circle {
    fn trace(&self, surface: &mut dyn Surface, width: f64, height: f64) {
        let (rx, ry) = (width / 2.0, height / 2.0);
        if self.is_full() {
            trace_ellipse(surface, 0.0, 0.0, rx, ry);
        } else {
            trace_arc(
                surface,
                (0.0, 0.0),
                (rx, ry),
                self.start_angle.to_radians(),
                self.end_angle.to_radians(),
                true,
            );
        }
    }
}

/// Axis-aligned ellipse filling the entity box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    /// Horizontal radius.
    pub rx: f64,
    /// Vertical radius.
    pub ry: f64,
}

impl Drawable for Ellipse {
    fn trace(&self, surface: &mut dyn Surface, width: f64, height: f64) {
        trace_ellipse(surface, 0.0, 0.0, width / 2.0, height / 2.0);
    }
}

/// Straight segment between two points in the entity's parent space at
/// construction time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    /// Start x.
    pub x1: f64,
    /// Start y.
    pub y1: f64,
    /// End x.
    pub x2: f64,
    /// End y.
    pub y2: f64,
}

impl Line {
    /// Segment from `from` to `to`.
    #[must_use]
    pub fn new(from: Point, to: Point) -> Self {
        Self {
            x1: from.x,
            y1: from.y,
            x2: to.x,
            y2: to.y,
        }
    }

    /// Bounding size of the segment.
    #[must_use]
    pub fn size(&self) -> (f64, f64) {
        ((self.x2 - self.x1).abs(), (self.y2 - self.y1).abs())
    }

    /// Endpoints relative to the segment's midpoint.
    #[must_use]
    pub fn centered_points(&self) -> (Point, Point) {
        let half = Point::new((self.x2 - self.x1) / 2.0, (self.y2 - self.y1) / 2.0);
        (-half, half)
    }
}

impl Drawable for Line {
    fn trace(&self, surface: &mut dyn Surface, _width: f64, _height: f64) {
        let (from, to) = self.centered_points();
        surface.move_to(from.x, from.y);
        surface.line_to(to.x, to.y);
    }

    fn has_content(&self, style: &Style) -> bool {
        style.has_stroke()
    }
}

/// Points with the offset that centers them in the entity box.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointList {
    /// Points in their own coordinate space.
    pub points: Vec<Point>,
    /// Center of the points' bounds, subtracted when drawing.
    pub path_offset: Point,
}

impl PointList {
    /// Wrap points, computing the offset from their bounds.
    #[must_use]
    pub fn new(points: Vec<Point>) -> Self {
        let path_offset = bounding_box_from_points(&points)
            .map(|b| b.center())
            .unwrap_or_default();
        Self {
            points,
            path_offset,
        }
    }

    /// Bounds of the points; empty lists give a zero box.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        bounding_box_from_points(&self.points).unwrap_or_default()
    }

    /// Bounding size.
    #[must_use]
    pub fn size(&self) -> (f64, f64) {
        let b = self.bounds();
        (b.width, b.height)
    }

    fn trace(&self, surface: &mut dyn Surface, close: bool) {
        let mut iter = self.points.iter().map(|p| *p - self.path_offset);
        let Some(first) = iter.next() else {
            return;
        };
        surface.move_to(first.x, first.y);
        for p in iter {
            surface.line_to(p.x, p.y);
        }
        if close {
            surface.close_path();
        }
    }
}

/// Closed polygon.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    /// Vertices.
    pub points: PointList,
}

impl Polygon {
    /// Polygon through `points`.
    #[must_use]
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points: PointList::new(points),
        }
    }
}

impl Drawable for Polygon {
    fn trace(&self, surface: &mut dyn Surface, _width: f64, _height: f64) {
        self.points.trace(surface, true);
    }
}

/// Open polyline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polyline {
    /// Vertices.
    pub points: PointList,
}

impl Polyline {
    /// Polyline through `points`.
    #[must_use]
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points: PointList::new(points),
        }
    }
}

impl Drawable for Polyline {
    fn trace(&self, surface: &mut dyn Surface, _width: f64, _height: f64) {
        self.points.trace(surface, false);
    }
}

/// One absolute path command.
///
/// Serializes as a flat array: `["M", x, y]`, `["Q", cx, cy, x, y]`, ...
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<Value>", try_from = "Vec<Value>")]
pub enum PathCommand {
    /// Start a subpath.
    MoveTo(Point),
    /// Straight segment.
    LineTo(Point),
    /// Quadratic curve: control point, end point.
    QuadTo(Point, Point),
    /// Cubic curve: two control points, end point.
    CubicTo(Point, Point, Point),
    /// Close the subpath.
    Close,
}

impl PathCommand {
    fn letter(&self) -> &'static str {
        match self {
            Self::MoveTo(_) => "M",
            Self::LineTo(_) => "L",
            Self::QuadTo(..) => "Q",
            Self::CubicTo(..) => "C",
            Self::Close => "Z",
        }
    }

    /// All points the command references, control points included.
    #[must_use]
    pub fn points(&self) -> Vec<Point> {
        match *self {
            Self::MoveTo(p) | Self::LineTo(p) => vec![p],
            Self::QuadTo(c, p) => vec![c, p],
            Self::CubicTo(c1, c2, p) => vec![c1, c2, p],
            Self::Close => Vec::new(),
        }
    }
}

impl From<PathCommand> for Vec<Value> {
    fn from(command: PathCommand) -> Self {
        let mut out = vec![Value::from(command.letter())];
        out.extend(
            command
                .points()
                .into_iter()
                .flat_map(|p| [Value::from(p.x), Value::from(p.y)]),
        );
        out
    }
}

impl TryFrom<Vec<Value>> for PathCommand {
    type Error = String;

    fn try_from(raw: Vec<Value>) -> Result<Self, Self::Error> {
        let (letter, args) = raw
            .split_first()
            .ok_or_else(|| "empty path command".to_string())?;
        let letter = letter
            .as_str()
            .ok_or_else(|| "path command letter must be a string".to_string())?;
        let nums = args
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| format!("non-numeric argument in {letter}")))
            .collect::<Result<Vec<_>, _>>()?;
        let pts: Vec<Point> = nums.chunks_exact(2).map(|c| Point::new(c[0], c[1])).collect();
        let arity = |n: usize| {
            if nums.len() == n * 2 {
                Ok(())
            } else {
                Err(format!("{letter} takes {} numbers, got {}", n * 2, nums.len()))
            }
        };
        match letter {
            "M" => arity(1).map(|()| Self::MoveTo(pts[0])),
            "L" => arity(1).map(|()| Self::LineTo(pts[0])),
            "Q" => arity(2).map(|()| Self::QuadTo(pts[0], pts[1])),
            "C" => arity(3).map(|()| Self::CubicTo(pts[0], pts[1], pts[2])),
            "Z" | "z" => arity(0).map(|()| Self::Close),
            other => Err(format!("unsupported path command {other}")),
        }
    }
}

/// Free-form path of absolute commands.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    /// Commands in their own coordinate space.
    pub commands: Vec<PathCommand>,
    /// Center of the commands' bounds, subtracted when drawing.
    pub path_offset: Point,
}

impl Path {
    /// Path from commands, computing the offset from their bounds.
    #[must_use]
    pub fn new(commands: Vec<PathCommand>) -> Self {
        let mut path = Self {
            commands,
            path_offset: Point::ZERO,
        };
        path.path_offset = path.bounds().center();
        path
    }

    /// Bounds over every referenced point, control points included.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        let points: Vec<Point> = self.commands.iter().flat_map(PathCommand::points).collect();
        bounding_box_from_points(&points).unwrap_or_default()
    }

    /// Bounding size.
    #[must_use]
    pub fn size(&self) -> (f64, f64) {
        let b = self.bounds();
        (b.width, b.height)
    }
}

impl Drawable for Path {
    fn trace(&self, surface: &mut dyn Surface, _width: f64, _height: f64) {
        let o = self.path_offset;
        for command in &self.commands {
            match *command {
                PathCommand::MoveTo(p) => surface.move_to(p.x - o.x, p.y - o.y),
                PathCommand::LineTo(p) => surface.line_to(p.x - o.x, p.y - o.y),
                PathCommand::QuadTo(c, p) => {
                    surface.quadratic_curve_to(c.x - o.x, c.y - o.y, p.x - o.x, p.y - o.y);
                }
                PathCommand::CubicTo(c1, c2, p) => surface.bezier_curve_to(
                    c1.x - o.x,
                    c1.y - o.y,
                    c2.x - o.x,
                    c2.y - o.y,
                    p.x - o.x,
                    p.y - o.y,
                ),
                PathCommand::Close => surface.close_path(),
            }
        }
    }
}

/// Raster image. Pixels resolve asynchronously from `src`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Source URI.
    pub src: String,
    /// Decoded pixels, once loaded.
    pub element: Option<Arc<RasterBuffer>>,
}

impl Image {
    /// An unloaded image.
    #[must_use]
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            element: None,
        }
    }

    /// Whether pixels have been attached.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.element.is_some()
    }
}

impl Drawable for Image {
    fn trace(&self, surface: &mut dyn Surface, width: f64, height: f64) {
        trace_box(surface, width, height);
    }

    fn has_content(&self, style: &Style) -> bool {
        self.is_loaded() || style.has_stroke()
    }

    fn render(
        &self,
        surface: &mut dyn Surface,
        width: f64,
        height: f64,
        style: &Style,
    ) -> SceneResult<()> {
        if let Some(element) = &self.element {
            surface.draw_raster(element, -width / 2.0, -height / 2.0, width, height);
        }
        if style.stroke_width > 0.0 {
            if let Some(stroke) = style.stroke.resolve()? {
                surface.begin_path();
                self.trace(surface, width, height);
                surface.stroke(&stroke, &style.stroke_style());
            }
        }
        Ok(())
    }
}

impl Drawable for EntityKind {
    fn trace(&self, surface: &mut dyn Surface, width: f64, height: f64) {
        match self {
            Self::Rect(s) => s.trace(surface, width, height),
            Self::Circle(s) => s.trace(surface, width, height),
            Self::Ellipse(s) => s.trace(surface, width, height),
            Self::Line(s) => s.trace(surface, width, height),
            Self::Polygon(s) => s.trace(surface, width, height),
            Self::Polyline(s) => s.trace(surface, width, height),
            Self::Path(s) => s.trace(surface, width, height),
            Self::Image(s) => s.trace(surface, width, height),
            Self::Group(_) => trace_box(surface, width, height),
        }
    }

    fn has_content(&self, style: &Style) -> bool {
        match self {
            Self::Line(s) => s.has_content(style),
            Self::Image(s) => s.has_content(style),
            // children paint themselves
            Self::Group(_) => false,
            _ => style.has_fill() || style.has_stroke(),
        }
    }

    fn render(
        &self,
        surface: &mut dyn Surface,
        width: f64,
        height: f64,
        style: &Style,
    ) -> SceneResult<()> {
        match self {
            Self::Image(s) => s.render(surface, width, height, style),
            Self::Group(_) => Ok(()),
            _ => fill_and_stroke(self, surface, width, height, style),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_list_offset_is_bounds_center() {
        let list = PointList::new(vec![
            Point::new(10.0, 10.0),
            Point::new(30.0, 10.0),
            Point::new(20.0, 40.0),
        ]);
        assert_eq!(list.path_offset, Point::new(20.0, 25.0));
        assert_eq!(list.size(), (20.0, 30.0));
    }

    #[test]
    fn test_empty_point_list_is_zero_sized() {
        let list = PointList::new(Vec::new());
        assert_eq!(list.size(), (0.0, 0.0));
        assert_eq!(list.path_offset, Point::ZERO);
    }

    #[test]
    fn test_path_bounds_include_control_points() {
        let path = Path::new(vec![
            PathCommand::MoveTo(Point::new(0.0, 0.0)),
            PathCommand::QuadTo(Point::new(50.0, -20.0), Point::new(100.0, 0.0)),
            PathCommand::Close,
        ]);
        assert_eq!(path.size(), (100.0, 20.0));
        assert_eq!(path.path_offset, Point::new(50.0, -10.0));
    }

    #[test]
    fn test_path_command_serialization() {
        let cmd = PathCommand::CubicTo(
            Point::new(1.0, 2.0),
            Point::new(3.0, 4.0),
            Point::new(5.0, 6.0),
        );
        let value = serde_json::to_value(cmd).expect("ser");
        assert_eq!(value, json!(["C", 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let back: PathCommand = serde_json::from_value(value).expect("de");
        assert_eq!(back, cmd);
        assert!(serde_json::from_value::<PathCommand>(json!(["L", 1.0])).is_err());
        assert!(serde_json::from_value::<PathCommand>(json!(["A", 1.0, 2.0])).is_err());
    }

    #[test]
    fn test_line_centered_points() {
        let line = Line::new(Point::new(10.0, 20.0), Point::new(30.0, 0.0));
        assert_eq!(line.size(), (20.0, 20.0));
        let (a, b) = line.centered_points();
        assert_eq!(a, Point::new(-10.0, 10.0));
        assert_eq!(b, Point::new(10.0, -10.0));
    }

    #[test]
    fn test_line_needs_stroke() {
        let line = Line::new(Point::ZERO, Point::new(1.0, 1.0));
        let filled_only = Style::default();
        assert!(!line.has_content(&filled_only));
    }
}
