//! Scene entities - the building blocks of scenes.
//!
//! An [`Entity`] holds its geometry (position, size, scale, skew, rotation,
//! flip, origin anchor), its paint style, its shape ([`EntityKind`]), a
//! non-owning parent id and its render-cache state.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::geometry::{point_in_polygon, Point};
use crate::group::Group;
use crate::matrix::{compose, normalize_degrees, Matrix, TransformComponents};
use crate::property::Property;
use crate::shapes::{Circle, Ellipse, Image, Line, Path, PathCommand, Polygon, Polyline, Rect};
use crate::style::{Paint, Style};
use crate::surface::RasterBuffer;
use crate::{SceneError, SceneResult};

/// Unique identifier for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Create a new unique element ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from the hyphenated string form.
    ///
    /// # Errors
    ///
    /// Returns the UUID parse error if the string is malformed.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! origin_axis {
    ($(#[$doc:meta])* $name:ident { $low:ident = $low_str:literal, $high:ident = $high_str:literal }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub enum $name {
            #[doc = concat!("`\"", $low_str, "\"`, fraction 0.")]
            #[default]
            $low,
            /// `"center"`, fraction 0.5.
            Center,
            #[doc = concat!("`\"", $high_str, "\"`, fraction 1.")]
            $high,
            /// Arbitrary fraction of the size, serialized as a number.
            Fraction(f64),
        }

        impl $name {
            /// The anchor as a fraction of the size.
            #[must_use]
            pub fn fraction(self) -> f64 {
                match self {
                    Self::$low => 0.0,
                    Self::Center => 0.5,
                    Self::$high => 1.0,
                    Self::Fraction(v) => v,
                }
            }

            /// Parse a keyword.
            #[must_use]
            pub fn from_keyword(keyword: &str) -> Option<Self> {
                match keyword {
                    $low_str => Some(Self::$low),
                    "center" => Some(Self::Center),
                    $high_str => Some(Self::$high),
                    _ => None,
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self {
                    Self::$low => serializer.serialize_str($low_str),
                    Self::Center => serializer.serialize_str("center"),
                    Self::$high => serializer.serialize_str($high_str),
                    Self::Fraction(v) => serializer.serialize_f64(*v),
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Raw {
                    Keyword(String),
                    Number(f64),
                }
                match Raw::deserialize(deserializer)? {
                    Raw::Number(v) => Ok(Self::Fraction(v)),
                    Raw::Keyword(k) => Self::from_keyword(&k).ok_or_else(|| {
                        serde::de::Error::custom(format!(
                            concat!("invalid ", stringify!($name), " `{}`"),
                            k
                        ))
                    }),
                }
            }
        }
    };
}

origin_axis!(
    /// Horizontal origin anchor.
    OriginX { Left = "left", Right = "right" }
);
origin_axis!(
    /// Vertical origin anchor.
    OriginY { Top = "top", Bottom = "bottom" }
);

/// The four corners of an entity's box, in canvas space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
    /// Top-left corner.
    pub top_left: Point,
    /// Top-right corner.
    pub top_right: Point,
    /// Bottom-right corner.
    pub bottom_right: Point,
    /// Bottom-left corner.
    pub bottom_left: Point,
}

impl Corners {
    /// Map the corners of a `width` x `height` box centered on the origin.
    #[must_use]
    pub fn of_box(matrix: &Matrix, width: f64, height: f64) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        Self {
            top_left: matrix.apply(Point::new(-hw, -hh)),
            top_right: matrix.apply(Point::new(hw, -hh)),
            bottom_right: matrix.apply(Point::new(hw, hh)),
            bottom_left: matrix.apply(Point::new(-hw, hh)),
        }
    }

    /// Corners in clockwise order starting at top-left.
    #[must_use]
    pub fn to_array(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Point-in-quadrilateral test. Works for rotated and skewed quads.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point_in_polygon(point, &self.to_array())
    }
}

/// Position, size and transform attributes of an entity.
///
/// `left`/`top` is where the origin anchor lands in the parent space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Anchor x in parent space.
    pub left: f64,
    /// Anchor y in parent space.
    pub top: f64,
    /// Intrinsic width, before scale.
    pub width: f64,
    /// Intrinsic height, before scale.
    pub height: f64,
    /// Horizontal scale.
    pub scale_x: f64,
    /// Vertical scale.
    pub scale_y: f64,
    /// Horizontal skew in degrees.
    pub skew_x: f64,
    /// Vertical skew in degrees.
    pub skew_y: f64,
    /// Rotation in degrees.
    pub angle: f64,
    /// Mirror horizontally.
    pub flip_x: bool,
    /// Mirror vertically.
    pub flip_y: bool,
    /// Horizontal anchor.
    pub origin_x: OriginX,
    /// Vertical anchor.
    pub origin_y: OriginY,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: 0.0,
            height: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            skew_x: 0.0,
            skew_y: 0.0,
            angle: 0.0,
            flip_x: false,
            flip_y: false,
            origin_x: OriginX::Left,
            origin_y: OriginY::Top,
        }
    }
}

impl Geometry {
    /// Rotation, scale, flip and skew, without translation.
    #[must_use]
    pub fn linear_matrix(&self) -> Matrix {
        compose(&TransformComponents {
            translate_x: 0.0,
            translate_y: 0.0,
            ..self.components()
        })
    }

    /// Transform components with the box center as translation.
    #[must_use]
    pub fn components(&self) -> TransformComponents {
        let center = self.center_point();
        TransformComponents {
            translate_x: center.x,
            translate_y: center.y,
            angle: self.angle,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            skew_x: self.skew_x,
            skew_y: self.skew_y,
            flip_x: self.flip_x,
            flip_y: self.flip_y,
        }
    }

    /// The origin anchor in the centered local box.
    #[must_use]
    pub fn anchor(&self) -> Point {
        Point::new(
            (self.origin_x.fraction() - 0.5) * self.width,
            (self.origin_y.fraction() - 0.5) * self.height,
        )
    }

    /// Where the box center lands in parent space.
    #[must_use]
    pub fn center_point(&self) -> Point {
        let linear = self.linear_matrix_raw();
        Point::new(self.left, self.top) - linear.apply_vector(self.anchor())
    }

    /// Move so that the box center lands on `center`, keeping the anchor rule.
    pub fn set_position_by_origin(&mut self, center: Point) {
        let offset = self.linear_matrix_raw().apply_vector(self.anchor());
        let position = center + offset;
        self.left = position.x;
        self.top = position.y;
    }

    /// The local transform: centered box space to parent space.
    #[must_use]
    pub fn local_matrix(&self) -> Matrix {
        let mut m = self.linear_matrix_raw();
        let center = Point::new(self.left, self.top) - m.apply_vector(self.anchor());
        m.e = center.x;
        m.f = center.y;
        m
    }

    /// Set every transform attribute from a matrix in parent space.
    ///
    /// The matrix is decomposed in canonical form (no skew-y; a reflection
    /// becomes `flip_y`), then positioned so the box center matches.
    pub fn apply_matrix(&mut self, matrix: &Matrix) {
        let d = crate::matrix::decompose(matrix);
        self.angle = d.angle;
        self.scale_x = d.scale_x;
        self.flip_x = false;
        self.flip_y = d.scale_y < 0.0;
        self.scale_y = d.scale_y.abs();
        self.skew_x = d.skew_x;
        self.skew_y = 0.0;
        self.set_position_by_origin(Point::new(d.translate_x, d.translate_y));
    }

    fn linear_matrix_raw(&self) -> Matrix {
        compose(&TransformComponents {
            angle: self.angle,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            skew_x: self.skew_x,
            skew_y: self.skew_y,
            flip_x: self.flip_x,
            flip_y: self.flip_y,
            ..TransformComponents::default()
        })
    }
}

/// Round `angle` to the nearest multiple of `step` degrees, halves rounding
/// up (45 with step 90 gives 90). The result is wrapped into `[0, 360)`.
/// A non-positive step leaves the angle unchanged.
#[must_use]
pub fn straighten_angle(angle: f64, step: f64) -> f64 {
    if step <= 0.0 || !step.is_finite() {
        return angle;
    }
    normalize_degrees(((angle / step) + 0.5).floor() * step)
}

/// Set every transform attribute of `entity` so its local matrix equals
/// `matrix` (up to the canonical decomposition), then mark it dirty.
pub fn apply_transform_to_entity(entity: &mut Entity, matrix: &Matrix) {
    entity.geometry.apply_matrix(matrix);
    entity.mark_dirty();
}

/// Read and write access to an entity's geometry.
pub trait Transformable {
    /// Current geometry.
    fn geometry(&self) -> &Geometry;

    /// Mutable geometry. Callers are responsible for dirty marking.
    fn geometry_mut(&mut self) -> &mut Geometry;

    /// The local transform matrix.
    fn local_matrix(&self) -> Matrix {
        self.geometry().local_matrix()
    }

    /// Box corners under `matrix`.
    fn corners_under(&self, matrix: &Matrix) -> Corners {
        let g = self.geometry();
        Corners::of_box(matrix, g.width, g.height)
    }

    /// Box corners in parent space.
    fn local_corners(&self) -> Corners {
        self.corners_under(&self.local_matrix())
    }

    /// Angle this entity would straighten to.
    fn straightened_angle(&self, step: f64) -> f64 {
        straighten_angle(self.geometry().angle, step)
    }
}

/// Dirty lifecycle of an entity's derived state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyState {
    /// Cached raster matches current attributes.
    Clean,
    /// Some attribute changed since the cache was built.
    #[default]
    Dirty,
    /// A cache is being rebuilt from a snapshot of the attributes.
    Regenerating,
}

/// An offscreen raster of an entity, owned by the entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCache {
    /// The pixels.
    pub buffer: RasterBuffer,
    /// Horizontal on-screen scale the buffer was drawn at.
    pub zoom_x: f64,
    /// Vertical on-screen scale the buffer was drawn at.
    pub zoom_y: f64,
    /// Entity revision the buffer reflects.
    pub revision: u64,
}

impl RenderCache {
    /// Buffer width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    /// Buffer height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.buffer.height
    }
}

/// Dirty tracking and cache ownership.
pub trait Cacheable {
    /// Current dirty state.
    fn dirty_state(&self) -> DirtyState;

    /// Monotonic counter bumped by every mutation.
    fn revision(&self) -> u64;

    /// The cached raster, if any.
    fn render_cache(&self) -> Option<&RenderCache>;

    /// Whether caching is allowed for this entity.
    fn object_caching(&self) -> bool;

    /// Mark dirty and bump the revision.
    fn mark_dirty(&mut self);

    /// Enter `Regenerating`, returning the revision being rendered.
    fn begin_regeneration(&mut self) -> u64;

    /// Store a regenerated cache drawn at `revision`. The entity becomes
    /// clean only if nothing changed since; returns whether it did.
    fn finish_regeneration(&mut self, cache: RenderCache) -> bool;

    /// Drop the cached raster, returning it.
    fn release_cache(&mut self) -> Option<RenderCache>;
}

/// The shape of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    /// Rectangle with optional rounded corners.
    Rect(Rect),
    /// Circle or circular arc.
    Circle(Circle),
    /// Ellipse.
    Ellipse(Ellipse),
    /// Straight line segment.
    Line(Line),
    /// Closed polygon.
    Polygon(Polygon),
    /// Open polyline.
    Polyline(Polyline),
    /// Free-form path.
    Path(Path),
    /// Raster image.
    Image(Image),
    /// Container of other entities.
    Group(Group),
}

impl EntityKind {
    /// Serialized type discriminator.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Rect(_) => "rect",
            Self::Circle(_) => "circle",
            Self::Ellipse(_) => "ellipse",
            Self::Line(_) => "line",
            Self::Polygon(_) => "polygon",
            Self::Polyline(_) => "polyline",
            Self::Path(_) => "path",
            Self::Image(_) => "image",
            Self::Group(_) => "group",
        }
    }

    /// The group data, if this is a group.
    #[must_use]
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Mutable group data, if this is a group.
    pub fn as_group_mut(&mut self) -> Option<&mut Group> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Intrinsic size implied by the shape, if it defines one.
    #[must_use]
    pub fn intrinsic_size(&self) -> Option<(f64, f64)> {
        match self {
            Self::Circle(c) => Some((c.radius * 2.0, c.radius * 2.0)),
            Self::Ellipse(e) => Some((e.rx * 2.0, e.ry * 2.0)),
            Self::Line(l) => Some(l.size()),
            Self::Polygon(p) => Some(p.points.size()),
            Self::Polyline(p) => Some(p.points.size()),
            Self::Path(p) => Some(p.size()),
            Self::Image(i) => i.element.as_ref().map(|e| (f64::from(e.width), f64::from(e.height))),
            Self::Rect(_) | Self::Group(_) => None,
        }
    }
}

/// A drawable node in the scene graph.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Unique identifier.
    pub id: ElementId,
    /// Shape.
    pub kind: EntityKind,
    /// Paint attributes.
    pub style: Style,
    /// Containing group. Non-owning; maintained by the scene.
    pub(crate) parent: Option<ElementId>,
    /// Stencil restricting this entity's visible region. Never painted.
    pub(crate) clip_path: Option<Box<Entity>>,
    /// For clip paths: geometry is in canvas space rather than the owner's.
    pub absolute_positioned: bool,
    /// Opaque data for unrecognized properties.
    pub custom: serde_json::Map<String, serde_json::Value>,
    geometry: Geometry,
    object_caching: bool,
    dirty: DirtyState,
    revision: u64,
    cache: Option<RenderCache>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.style == other.style
            && self.geometry == other.geometry
            && self.clip_path == other.clip_path
            && self.absolute_positioned == other.absolute_positioned
            && self.custom == other.custom
            && self.object_caching == other.object_caching
    }
}

impl Entity {
    /// Create a new entity with the given shape and default attributes.
    ///
    /// Shapes that imply a size (circles, polygons, paths...) set
    /// `width`/`height` accordingly.
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        let mut geometry = Geometry::default();
        if let Some((w, h)) = kind.intrinsic_size() {
            geometry.width = w;
            geometry.height = h;
        }
        let style = match &kind {
            EntityKind::Line(_) | EntityKind::Polyline(_) => Style {
                stroke: Paint::color("rgb(0,0,0)"),
                fill: Paint::None,
                ..Style::default()
            },
            EntityKind::Image(_) | EntityKind::Group(_) => Style {
                fill: Paint::None,
                ..Style::default()
            },
            _ => Style::default(),
        };
        Self {
            id: ElementId::new(),
            kind,
            style,
            parent: None,
            clip_path: None,
            absolute_positioned: false,
            custom: serde_json::Map::new(),
            geometry,
            object_caching: true,
            dirty: DirtyState::Dirty,
            revision: 0,
            cache: None,
        }
    }

    /// A `width` x `height` rectangle.
    #[must_use]
    pub fn rect(width: f64, height: f64) -> Self {
        Self::new(EntityKind::Rect(Rect::default())).with_size(width, height)
    }

    /// A full circle of `radius`.
    #[must_use]
    pub fn circle(radius: f64) -> Self {
        Self::new(EntityKind::Circle(Circle::new(radius)))
    }

    /// An ellipse with radii `rx`, `ry`.
    #[must_use]
    pub fn ellipse(rx: f64, ry: f64) -> Self {
        Self::new(EntityKind::Ellipse(Ellipse { rx, ry }))
    }

    /// A line between two points. The entity is positioned at the top-left
    /// of the points' bounding box.
    #[must_use]
    pub fn line(from: Point, to: Point) -> Self {
        let min = from.min(to);
        Self::new(EntityKind::Line(Line::new(from, to))).with_position(min.x, min.y)
    }

    /// A closed polygon, positioned at the top-left of its points.
    #[must_use]
    pub fn polygon(points: Vec<Point>) -> Self {
        let polygon = Polygon::new(points);
        let min = polygon.points.bounds().min();
        Self::new(EntityKind::Polygon(polygon)).with_position(min.x, min.y)
    }

    /// An open polyline, positioned at the top-left of its points.
    #[must_use]
    pub fn polyline(points: Vec<Point>) -> Self {
        let polyline = Polyline::new(points);
        let min = polyline.points.bounds().min();
        Self::new(EntityKind::Polyline(polyline)).with_position(min.x, min.y)
    }

    /// A path, positioned at the top-left of its commands' bounds.
    #[must_use]
    pub fn path(commands: Vec<PathCommand>) -> Self {
        let path = Path::new(commands);
        let min = path.bounds().min();
        Self::new(EntityKind::Path(path)).with_position(min.x, min.y)
    }

    /// An image whose pixels resolve later from `src`.
    #[must_use]
    pub fn image(src: impl Into<String>) -> Self {
        Self::new(EntityKind::Image(Image::new(src)))
    }

    /// An empty group with the given layout.
    #[must_use]
    pub fn group(layout: crate::group::LayoutStrategy) -> Self {
        Self::new(EntityKind::Group(Group::new(layout)))
    }

    /// Set `left`/`top`.
    #[must_use]
    pub fn with_position(mut self, left: f64, top: f64) -> Self {
        self.geometry.left = left;
        self.geometry.top = top;
        self
    }

    /// Set `width`/`height`.
    #[must_use]
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.geometry.width = width;
        self.geometry.height = height;
        self
    }

    /// Set the origin anchor.
    #[must_use]
    pub fn with_origin(mut self, origin_x: OriginX, origin_y: OriginY) -> Self {
        self.geometry.origin_x = origin_x;
        self.geometry.origin_y = origin_y;
        self
    }

    /// Set the fill paint.
    #[must_use]
    pub fn with_fill(mut self, fill: Paint) -> Self {
        self.style.fill = fill;
        self
    }

    /// Set the stroke paint and width.
    #[must_use]
    pub fn with_stroke(mut self, stroke: Paint, width: f64) -> Self {
        self.style.stroke = stroke;
        self.style.stroke_width = width;
        self
    }

    /// Use a specific id (for reconstruction).
    #[must_use]
    pub fn with_id(mut self, id: ElementId) -> Self {
        self.id = id;
        self
    }

    /// Set the clip path of a detached entity. See
    /// [`Entity::check_clip_path`] for what may clip.
    #[must_use]
    pub fn with_clip_path(mut self, clip_path: Entity) -> Self {
        self.clip_path = Some(Box::new(clip_path));
        self
    }

    /// A clip path is a single shape: a group only traces its box, so its
    /// children would silently drop out of the silhouette.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidValue`] if `clip_path` is a group.
    pub fn check_clip_path(clip_path: &Entity) -> SceneResult<()> {
        if clip_path.is_group() {
            return Err(SceneError::invalid_value(
                "clipPath",
                "a group cannot be a clip path",
            ));
        }
        Ok(())
    }

    /// Builder form of [`Entity::set`].
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Entity::set`].
    pub fn with(mut self, property: Property) -> SceneResult<Self> {
        self.set(property)?;
        Ok(self)
    }

    /// The containing group, if any.
    #[must_use]
    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// The clip path, if any.
    #[must_use]
    pub fn clip_path(&self) -> Option<&Entity> {
        self.clip_path.as_deref()
    }

    /// Whether this entity is a group.
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self.kind, EntityKind::Group(_))
    }

    /// Group data, if this is a group.
    #[must_use]
    pub fn as_group(&self) -> Option<&Group> {
        self.kind.as_group()
    }

    /// Apply a property to this entity alone, marking it dirty.
    ///
    /// The scene-level [`crate::Scene::set`] also re-lays out the parent.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidValue`] when the property does not apply
    /// to this kind of entity or the value is out of range.
    pub fn set(&mut self, property: Property) -> SceneResult<()> {
        property.validate()?;
        let g = &mut self.geometry;
        match property {
            Property::Left(v) => g.left = v,
            Property::Top(v) => g.top = v,
            Property::Width(v) => self.set_width(v)?,
            Property::Height(v) => self.set_height(v)?,
            Property::ScaleX(v) => g.scale_x = v,
            Property::ScaleY(v) => g.scale_y = v,
            Property::SkewX(v) => g.skew_x = v,
            Property::SkewY(v) => g.skew_y = v,
            Property::Angle(v) => g.angle = v,
            Property::FlipX(v) => g.flip_x = v,
            Property::FlipY(v) => g.flip_y = v,
            Property::OriginX(v) => g.origin_x = v,
            Property::OriginY(v) => g.origin_y = v,
            Property::Opacity(v) => self.style.opacity = v,
            Property::Visible(v) => self.style.visible = v,
            Property::Fill(v) => self.style.fill = v,
            Property::Stroke(v) => self.style.stroke = v,
            Property::StrokeWidth(v) => self.style.stroke_width = v,
            Property::FillRule(v) => self.style.fill_rule = v,
            // The render cache controller releases the buffer on the next paint.
            Property::ObjectCaching(v) => self.object_caching = v,
            Property::AbsolutePositioned(v) => self.absolute_positioned = v,
            Property::Radius(_)
            | Property::StartAngle(_)
            | Property::EndAngle(_)
            | Property::Rx(_)
            | Property::Ry(_)
            | Property::Src(_)
            | Property::Layout(_) => self.set_shape_property(property)?,
            Property::Custom(name, value) => {
                self.custom.insert(name, value);
            }
        }
        self.mark_dirty();
        Ok(())
    }

    fn set_width(&mut self, width: f64) -> SceneResult<()> {
        match &mut self.kind {
            EntityKind::Circle(_) => {
                return Err(SceneError::invalid_value("width", "set radius on circles"));
            }
            EntityKind::Ellipse(e) => e.rx = width / 2.0,
            _ => {}
        }
        self.geometry.width = width;
        Ok(())
    }

    fn set_height(&mut self, height: f64) -> SceneResult<()> {
        match &mut self.kind {
            EntityKind::Circle(_) => {
                return Err(SceneError::invalid_value("height", "set radius on circles"));
            }
            EntityKind::Ellipse(e) => e.ry = height / 2.0,
            _ => {}
        }
        self.geometry.height = height;
        Ok(())
    }

    fn set_shape_property(&mut self, property: Property) -> SceneResult<()> {
        let name = property.name().to_string();
        let type_name = self.kind.type_name();
        let mismatch =
            || SceneError::invalid_value(&name, format!("not a property of {type_name}"));
        match (&mut self.kind, property) {
            (EntityKind::Circle(c), Property::Radius(r)) => {
                c.radius = r;
                self.geometry.width = r * 2.0;
                self.geometry.height = r * 2.0;
            }
            (EntityKind::Circle(c), Property::StartAngle(a)) => c.start_angle = a,
            (EntityKind::Circle(c), Property::EndAngle(a)) => c.end_angle = a,
            (EntityKind::Rect(r), Property::Rx(v)) => r.rx = v,
            (EntityKind::Rect(r), Property::Ry(v)) => r.ry = v,
            (EntityKind::Ellipse(e), Property::Rx(v)) => {
                e.rx = v;
                self.geometry.width = v * 2.0;
            }
            (EntityKind::Ellipse(e), Property::Ry(v)) => {
                e.ry = v;
                self.geometry.height = v * 2.0;
            }
            (EntityKind::Image(i), Property::Src(src)) => {
                i.src = src;
                i.element = None;
            }
            (EntityKind::Group(g), Property::Layout(layout)) => g.layout = layout,
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    /// Attach decoded pixels to an image entity. If the image has no size
    /// yet, it takes the pixel size.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidValue`] if this is not an image.
    pub fn set_image_element(&mut self, element: RasterBuffer) -> SceneResult<()> {
        let type_name = self.kind.type_name();
        let EntityKind::Image(image) = &mut self.kind else {
            return Err(SceneError::invalid_value(
                "src",
                format!("not a property of {type_name}"),
            ));
        };
        if self.geometry.width == 0.0 && self.geometry.height == 0.0 {
            self.geometry.width = f64::from(element.width);
            self.geometry.height = f64::from(element.height);
        }
        image.element = Some(std::sync::Arc::new(element));
        self.mark_dirty();
        Ok(())
    }

    /// Rotate to the nearest multiple of `step` degrees (half rounds up).
    pub fn straighten(&mut self, step: f64) {
        self.geometry.angle = self.straightened_angle(step);
        self.mark_dirty();
    }

    /// Whether drawing this entity would put anything on the surface.
    #[must_use]
    pub fn has_paintable_content(&self) -> bool {
        use crate::shapes::Drawable;
        self.style.visible && self.style.opacity > 0.0 && self.kind.has_content(&self.style)
    }

    /// Point-in-box test against corners computed under `full_matrix`.
    #[must_use]
    pub fn contains_point_under(&self, full_matrix: &Matrix, point: Point) -> bool {
        self.corners_under(full_matrix).contains(point)
    }

    pub(crate) fn geometry_mut_unmarked(&mut self) -> &mut Geometry {
        &mut self.geometry
    }

    pub(crate) fn clip_path_mut(&mut self) -> Option<&mut Entity> {
        self.clip_path.as_deref_mut()
    }
}

impl Transformable for Entity {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn geometry_mut(&mut self) -> &mut Geometry {
        self.mark_dirty();
        &mut self.geometry
    }
}

impl Cacheable for Entity {
    fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn render_cache(&self) -> Option<&RenderCache> {
        self.cache.as_ref()
    }

    fn object_caching(&self) -> bool {
        self.object_caching
    }

    fn mark_dirty(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        self.dirty = DirtyState::Dirty;
    }

    fn begin_regeneration(&mut self) -> u64 {
        self.dirty = DirtyState::Regenerating;
        self.revision
    }

    fn finish_regeneration(&mut self, cache: RenderCache) -> bool {
        let current = cache.revision == self.revision;
        // The previous buffer is dropped here, before the new one is kept.
        self.cache = None;
        self.cache = Some(cache);
        self.dirty = if current {
            DirtyState::Clean
        } else {
            DirtyState::Dirty
        };
        current
    }

    fn release_cache(&mut self) -> Option<RenderCache> {
        self.cache.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_left_top_origin() {
        let entity = Entity::rect(100.0, 50.0).with_position(10.0, 20.0);
        let c = entity.local_corners();
        assert!(c.top_left.approx_eq(Point::new(10.0, 20.0), 1e-12));
        assert!(c.top_right.approx_eq(Point::new(110.0, 20.0), 1e-12));
        assert!(c.bottom_right.approx_eq(Point::new(110.0, 70.0), 1e-12));
        assert!(c.bottom_left.approx_eq(Point::new(10.0, 70.0), 1e-12));
    }

    #[test]
    fn test_center_origin_rotates_about_center() {
        let mut entity = Entity::rect(100.0, 50.0)
            .with_origin(OriginX::Center, OriginY::Center)
            .with_position(0.0, 0.0);
        entity.set(Property::Angle(90.0)).expect("angle");
        let c = entity.local_corners();
        assert!(c.top_left.approx_eq(Point::new(25.0, -50.0), 1e-9));
        assert!(c.bottom_right.approx_eq(Point::new(-25.0, 50.0), 1e-9));
        assert!(entity.geometry().center_point().approx_eq(Point::ZERO, 1e-12));
    }

    #[test]
    fn test_anchor_lands_on_left_top_under_rotation() {
        let mut entity = Entity::rect(40.0, 20.0)
            .with_origin(OriginX::Right, OriginY::Bottom)
            .with_position(7.0, 9.0);
        entity.set(Property::Angle(33.0)).expect("angle");
        entity.set(Property::ScaleX(2.0)).expect("scale");
        let anchor = entity.geometry().anchor();
        let landed = entity.local_matrix().apply(anchor);
        assert!(landed.approx_eq(Point::new(7.0, 9.0), 1e-9));
    }

    #[test]
    fn test_set_position_by_origin_round_trip() {
        let mut g = Geometry {
            width: 30.0,
            height: 10.0,
            angle: 20.0,
            skew_x: 10.0,
            origin_x: OriginX::Fraction(0.25),
            origin_y: OriginY::Bottom,
            ..Geometry::default()
        };
        g.set_position_by_origin(Point::new(50.0, 60.0));
        assert!(g.center_point().approx_eq(Point::new(50.0, 60.0), 1e-9));
    }

    #[test]
    fn test_apply_matrix_preserves_transform() {
        let mut source = Geometry {
            left: 12.0,
            top: -3.0,
            width: 20.0,
            height: 10.0,
            angle: 30.0,
            scale_x: 2.0,
            scale_y: 0.5,
            skew_x: 15.0,
            flip_y: true,
            ..Geometry::default()
        };
        let m = source.local_matrix();
        let mut target = Geometry {
            width: 20.0,
            height: 10.0,
            ..Geometry::default()
        };
        target.apply_matrix(&m);
        assert!(target.local_matrix().approx_eq(&m, 1e-9));
        source.apply_matrix(&m);
        assert!(source.local_matrix().approx_eq(&m, 1e-9));
    }

    #[test]
    fn test_straighten_rounds_half_up() {
        assert!((straighten_angle(45.0, 90.0) - 90.0).abs() < 1e-12);
        assert!(straighten_angle(44.9, 90.0).abs() < 1e-12);
        assert!((straighten_angle(135.0, 90.0) - 180.0).abs() < 1e-12);
        assert!(straighten_angle(350.0, 90.0).abs() < 1e-12);
        assert!((straighten_angle(22.5, 15.0) - 30.0).abs() < 1e-12);
        assert!((straighten_angle(17.0, 0.0) - 17.0).abs() < 1e-12);
    }

    #[test]
    fn test_entity_straighten_marks_dirty() {
        let mut entity = Entity::rect(10.0, 10.0);
        let before = entity.revision();
        entity.set(Property::Angle(44.9)).expect("angle");
        entity.straighten(90.0);
        assert_eq!(entity.geometry().angle, 0.0);
        assert!(entity.revision() > before);
        assert_eq!(entity.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn test_regeneration_interrupted_by_mutation_stays_dirty() {
        let mut entity = Entity::rect(10.0, 10.0);
        let revision = entity.begin_regeneration();
        assert_eq!(entity.dirty_state(), DirtyState::Regenerating);
        entity.set(Property::Fill(Paint::color("blue"))).expect("fill");
        let clean = entity.finish_regeneration(RenderCache {
            buffer: RasterBuffer::new(1, 1),
            zoom_x: 1.0,
            zoom_y: 1.0,
            revision,
        });
        assert!(!clean);
        assert_eq!(entity.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn test_circle_radius_drives_size() {
        let mut circle = Entity::circle(15.0);
        assert_eq!(circle.geometry().width, 30.0);
        circle.set(Property::Radius(5.0)).expect("radius");
        assert_eq!(circle.geometry().height, 10.0);
        assert!(circle.set(Property::Width(3.0)).is_err());
    }

    #[test]
    fn test_shape_property_on_wrong_kind() {
        let mut rect = Entity::rect(1.0, 1.0);
        let err = rect.set(Property::Radius(3.0)).unwrap_err();
        assert!(matches!(err, SceneError::InvalidValue { .. }));
    }

    #[test]
    fn test_origin_serialization() {
        assert_eq!(
            serde_json::to_string(&OriginX::Center).expect("ser"),
            "\"center\""
        );
        let fraction: OriginY = serde_json::from_str("0.25").expect("de");
        assert_eq!(fraction, OriginY::Fraction(0.25));
        assert!(serde_json::from_str::<OriginX>("\"top\"").is_err());
    }
}
