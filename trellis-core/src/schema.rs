//! Canonical serialized representation of scenes.
//!
//! Documents use camelCase keys and a `type` discriminator per entity.
//! Numbers are rounded to the scene's `num_fraction_digits`. Group geometry
//! is stored as-is and restored without re-layout, so serializing a
//! reconstructed scene reproduces the original document.

use futures::future::{try_join_all, AbortRegistration, Abortable};
use serde::{Deserialize, Serialize};

use crate::config::SceneConfig;
use crate::element::{Cacheable, ElementId, Entity, EntityKind, OriginX, OriginY, Transformable};
use crate::geometry::Point;
use crate::group::{Container, Group, LayoutStrategy};
use crate::property::Property;
use crate::resource::{display_src, ResourceLoader};
use crate::scene::Scene;
use crate::shapes::{Circle, Ellipse, Image, Line, Path, PathCommand, PointList, Polygon, Polyline, Rect};
use crate::style::{FillRule, LineCap, LineJoin, Paint, Style};
use crate::{SceneError, SceneResult};

/// Shape-specific fields, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeDocument {
    /// Rectangle.
    Rect {
        /// Horizontal corner radius.
        #[serde(default)]
        rx: f64,
        /// Vertical corner radius.
        #[serde(default)]
        ry: f64,
    },
    /// Circle or arc.
    Circle {
        /// Radius.
        radius: f64,
        /// Arc start, degrees.
        #[serde(default, rename = "startAngle")]
        start_angle: f64,
        /// Arc end, degrees.
        #[serde(default = "full_turn", rename = "endAngle")]
        end_angle: f64,
    },
    /// Ellipse.
    Ellipse {
        /// Horizontal radius.
        rx: f64,
        /// Vertical radius.
        ry: f64,
    },
    /// Line segment.
    Line {
        /// Start x.
        x1: f64,
        /// Start y.
        y1: f64,
        /// End x.
        x2: f64,
        /// End y.
        y2: f64,
    },
    /// Closed polygon.
    Polygon {
        /// Vertices.
        points: Vec<Point>,
        /// Center of the vertices' bounds.
        #[serde(rename = "pathOffset")]
        path_offset: Option<Point>,
    },
    /// Open polyline.
    Polyline {
        /// Vertices.
        points: Vec<Point>,
        /// Center of the vertices' bounds.
        #[serde(rename = "pathOffset")]
        path_offset: Option<Point>,
    },
    /// Free-form path.
    Path {
        /// Absolute commands.
        path: Vec<PathCommand>,
        /// Center of the commands' bounds.
        #[serde(rename = "pathOffset")]
        path_offset: Option<Point>,
    },
    /// Raster image.
    Image {
        /// Source URI.
        src: String,
    },
    /// Group of entities.
    Group {
        /// Layout strategy.
        #[serde(default)]
        layout: LayoutStrategy,
        /// Children in paint order.
        #[serde(default)]
        objects: Vec<EntityDocument>,
    },
}

const fn full_turn() -> f64 {
    360.0
}

/// Position, size and transform fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeometryDocument {
    /// Horizontal anchor.
    pub origin_x: OriginX,
    /// Vertical anchor.
    pub origin_y: OriginY,
    /// Anchor x.
    pub left: f64,
    /// Anchor y.
    pub top: f64,
    /// Intrinsic width; shapes with an implied size supply it when absent.
    pub width: Option<f64>,
    /// Intrinsic height; shapes with an implied size supply it when absent.
    pub height: Option<f64>,
    /// Horizontal scale.
    pub scale_x: f64,
    /// Vertical scale.
    pub scale_y: f64,
    /// Rotation in degrees.
    pub angle: f64,
    /// Horizontal skew in degrees.
    pub skew_x: f64,
    /// Vertical skew in degrees.
    pub skew_y: f64,
    /// Horizontal mirror.
    pub flip_x: bool,
    /// Vertical mirror.
    pub flip_y: bool,
}

impl Default for GeometryDocument {
    fn default() -> Self {
        Self {
            origin_x: OriginX::Left,
            origin_y: OriginY::Top,
            left: 0.0,
            top: 0.0,
            width: None,
            height: None,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            flip_x: false,
            flip_y: false,
        }
    }
}

/// Paint fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StyleDocument {
    /// Fill paint.
    pub fill: Paint,
    /// Stroke paint.
    pub stroke: Paint,
    /// Stroke width.
    pub stroke_width: f64,
    /// Stroke end caps.
    pub stroke_line_cap: LineCap,
    /// Stroke joins.
    pub stroke_line_join: LineJoin,
    /// Miter limit.
    pub stroke_miter_limit: f64,
    /// Fill rule.
    pub fill_rule: FillRule,
    /// Opacity.
    pub opacity: f64,
    /// Visibility.
    pub visible: bool,
}

impl Default for StyleDocument {
    fn default() -> Self {
        Self::from(&Style::default())
    }
}

impl From<&Style> for StyleDocument {
    fn from(style: &Style) -> Self {
        Self {
            fill: style.fill.clone(),
            stroke: style.stroke.clone(),
            stroke_width: style.stroke_width,
            stroke_line_cap: style.stroke_line_cap,
            stroke_line_join: style.stroke_line_join,
            stroke_miter_limit: style.stroke_miter_limit,
            fill_rule: style.fill_rule,
            opacity: style.opacity,
            visible: style.visible,
        }
    }
}

impl From<StyleDocument> for Style {
    fn from(doc: StyleDocument) -> Self {
        Self {
            fill: doc.fill,
            stroke: doc.stroke,
            stroke_width: doc.stroke_width,
            stroke_line_cap: doc.stroke_line_cap,
            stroke_line_join: doc.stroke_line_join,
            stroke_miter_limit: doc.stroke_miter_limit,
            fill_rule: doc.fill_rule,
            opacity: doc.opacity,
            visible: doc.visible,
        }
    }
}

/// Document-friendly entity description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDocument {
    /// Shape fields and the `type` discriminator.
    #[serde(flatten)]
    pub shape: ShapeDocument,
    /// Entity identifier; a fresh one is assigned when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Geometry.
    #[serde(flatten)]
    pub geometry: GeometryDocument,
    /// Paint.
    #[serde(flatten)]
    pub style: StyleDocument,
    /// Whether render caching is allowed.
    #[serde(default = "EntityDocument::default_object_caching")]
    pub object_caching: bool,
    /// Clip path geometry is in canvas space.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub absolute_positioned: bool,
    /// Clip path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_path: Option<Box<EntityDocument>>,
    /// Opaque custom properties.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl EntityDocument {
    const fn default_object_caching() -> bool {
        true
    }

    /// Describe a detached entity (no children are resolved).
    #[must_use]
    pub fn from_entity(entity: &Entity, config: &SceneConfig) -> Self {
        Self::describe(entity, Vec::new(), config)
    }

    fn describe(entity: &Entity, objects: Vec<EntityDocument>, config: &SceneConfig) -> Self {
        let r = |v: f64| config.round(v);
        let rp = |p: Point| Point::new(r(p.x), r(p.y));
        let shape = match &entity.kind {
            EntityKind::Rect(s) => ShapeDocument::Rect {
                rx: r(s.rx),
                ry: r(s.ry),
            },
            EntityKind::Circle(s) => ShapeDocument::Circle {
                radius: r(s.radius),
                start_angle: r(s.start_angle),
                end_angle: r(s.end_angle),
            },
            EntityKind::Ellipse(s) => ShapeDocument::Ellipse {
                rx: r(s.rx),
                ry: r(s.ry),
            },
            EntityKind::Line(s) => ShapeDocument::Line {
                x1: r(s.x1),
                y1: r(s.y1),
                x2: r(s.x2),
                y2: r(s.y2),
            },
            EntityKind::Polygon(s) => ShapeDocument::Polygon {
                points: s.points.points.iter().copied().map(rp).collect(),
                path_offset: Some(rp(s.points.path_offset)),
            },
            EntityKind::Polyline(s) => ShapeDocument::Polyline {
                points: s.points.points.iter().copied().map(rp).collect(),
                path_offset: Some(rp(s.points.path_offset)),
            },
            EntityKind::Path(s) => ShapeDocument::Path {
                path: s.commands.iter().map(|c| round_command(*c, &rp)).collect(),
                path_offset: Some(rp(s.path_offset)),
            },
            EntityKind::Image(s) => ShapeDocument::Image { src: s.src.clone() },
            EntityKind::Group(g) => ShapeDocument::Group {
                layout: g.layout,
                objects,
            },
        };
        let g = entity.geometry();
        let mut style = StyleDocument::from(&entity.style);
        style.stroke_width = r(style.stroke_width);
        style.stroke_miter_limit = r(style.stroke_miter_limit);
        style.opacity = r(style.opacity);
        Self {
            shape,
            id: Some(entity.id.to_string()),
            geometry: GeometryDocument {
                origin_x: match g.origin_x {
                    OriginX::Fraction(v) => OriginX::Fraction(r(v)),
                    other => other,
                },
                origin_y: match g.origin_y {
                    OriginY::Fraction(v) => OriginY::Fraction(r(v)),
                    other => other,
                },
                left: r(g.left),
                top: r(g.top),
                width: Some(r(g.width)),
                height: Some(r(g.height)),
                scale_x: r(g.scale_x),
                scale_y: r(g.scale_y),
                angle: r(g.angle),
                skew_x: r(g.skew_x),
                skew_y: r(g.skew_y),
                flip_x: g.flip_x,
                flip_y: g.flip_y,
            },
            style,
            object_caching: entity.object_caching(),
            absolute_positioned: entity.absolute_positioned,
            clip_path: entity
                .clip_path()
                .map(|clip| Box::new(Self::from_entity(clip, config))),
            data: entity.custom.clone(),
        }
    }

    /// Build the entity this document describes. Group children are
    /// returned separately, in paint order.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidValue`] for a malformed id or an
    /// out-of-range value.
    pub fn into_entity(self) -> SceneResult<(Entity, Vec<EntityDocument>)> {
        let mut children = Vec::new();
        let kind = match self.shape {
            ShapeDocument::Rect { rx, ry } => EntityKind::Rect(Rect { rx, ry }),
            ShapeDocument::Circle {
                radius,
                start_angle,
                end_angle,
            } => EntityKind::Circle(Circle {
                radius,
                start_angle,
                end_angle,
            }),
            ShapeDocument::Ellipse { rx, ry } => EntityKind::Ellipse(Ellipse { rx, ry }),
            ShapeDocument::Line { x1, y1, x2, y2 } => EntityKind::Line(Line { x1, y1, x2, y2 }),
            ShapeDocument::Polygon {
                points,
                path_offset,
            } => EntityKind::Polygon(Polygon {
                points: point_list(points, path_offset),
            }),
            ShapeDocument::Polyline {
                points,
                path_offset,
            } => EntityKind::Polyline(Polyline {
                points: point_list(points, path_offset),
            }),
            ShapeDocument::Path { path, path_offset } => {
                let mut shape = Path::new(path);
                if let Some(offset) = path_offset {
                    shape.path_offset = offset;
                }
                EntityKind::Path(shape)
            }
            ShapeDocument::Image { src } => EntityKind::Image(Image::new(src)),
            ShapeDocument::Group { layout, objects } => {
                children = objects;
                EntityKind::Group(Group::new(layout))
            }
        };

        let mut entity = Entity::new(kind);
        if let Some(id) = &self.id {
            entity.id = ElementId::parse(id)
                .map_err(|e| SceneError::invalid_value("id", e.to_string()))?;
        }
        let doc = self.geometry;
        for property in [
            Property::Left(doc.left),
            Property::Top(doc.top),
            Property::ScaleX(doc.scale_x),
            Property::ScaleY(doc.scale_y),
            Property::Angle(doc.angle),
            Property::SkewX(doc.skew_x),
            Property::SkewY(doc.skew_y),
            Property::Opacity(self.style.opacity),
            Property::StrokeWidth(self.style.stroke_width),
        ] {
            property.validate()?;
        }
        let width = doc.width.unwrap_or(entity.geometry().width);
        let height = doc.height.unwrap_or(entity.geometry().height);
        Property::Width(width).validate()?;
        Property::Height(height).validate()?;
        {
            let g = entity.geometry_mut_unmarked();
            g.origin_x = doc.origin_x;
            g.origin_y = doc.origin_y;
            g.left = doc.left;
            g.top = doc.top;
            g.width = width;
            g.height = height;
            g.scale_x = doc.scale_x;
            g.scale_y = doc.scale_y;
            g.angle = doc.angle;
            g.skew_x = doc.skew_x;
            g.skew_y = doc.skew_y;
            g.flip_x = doc.flip_x;
            g.flip_y = doc.flip_y;
        }
        entity.style = self.style.into();
        if !self.object_caching {
            entity.set(Property::ObjectCaching(false))?;
        }
        entity.absolute_positioned = self.absolute_positioned;
        entity.custom = self.data;
        if let Some(clip) = self.clip_path {
            let (clip, _) = clip.into_entity()?;
            Entity::check_clip_path(&clip)?;
            entity = entity.with_clip_path(clip);
        }
        Ok((entity, children))
    }
}

fn point_list(points: Vec<Point>, path_offset: Option<Point>) -> PointList {
    let mut list = PointList::new(points);
    if let Some(offset) = path_offset {
        list.path_offset = offset;
    }
    list
}

fn round_command(command: PathCommand, rp: &impl Fn(Point) -> Point) -> PathCommand {
    match command {
        PathCommand::MoveTo(p) => PathCommand::MoveTo(rp(p)),
        PathCommand::LineTo(p) => PathCommand::LineTo(rp(p)),
        PathCommand::QuadTo(c, p) => PathCommand::QuadTo(rp(c), rp(p)),
        PathCommand::CubicTo(c1, c2, p) => PathCommand::CubicTo(rp(c1), rp(c2), rp(p)),
        PathCommand::Close => PathCommand::Close,
    }
}

/// Canonical scene document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    /// Library version that wrote the document.
    #[serde(default = "SceneDocument::default_version")]
    pub version: String,
    /// Root entities in paint order.
    #[serde(default)]
    pub objects: Vec<EntityDocument>,
}

impl SceneDocument {
    fn default_version() -> String {
        crate::VERSION.to_string()
    }

    /// Build a document from a runtime scene. Detached entities are not
    /// included.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`] if a child link is dangling.
    pub fn from_scene(scene: &Scene) -> SceneResult<Self> {
        let objects = scene
            .roots()
            .iter()
            .map(|id| describe_tree(scene, *id))
            .collect::<SceneResult<Vec<_>>>()?;
        Ok(Self {
            version: Self::default_version(),
            objects,
        })
    }

    /// Materialize the document into a new scene. Image pixels are left
    /// unresolved.
    ///
    /// # Errors
    ///
    /// Returns the first entity construction error.
    pub fn into_scene(self, config: SceneConfig) -> SceneResult<Scene> {
        let mut scene = Scene::with_config(config);
        for object in self.objects {
            let id = insert_tree(&mut scene, object, None)?;
            scene.roots.push(id);
        }
        Ok(scene)
    }

    /// Materialize the document and resolve every image source through
    /// `loader`, concurrently.
    ///
    /// Either every image resolves and the complete scene is returned, or
    /// the partially built scene is discarded and the first error returned.
    /// Passing an `abort` registration lets the caller cancel the loads.
    ///
    /// # Errors
    ///
    /// Returns the first loader error, [`SceneError::Aborted`] if the
    /// handle was triggered, or an entity construction error.
    pub async fn into_scene_async<L>(
        self,
        config: SceneConfig,
        loader: &L,
        abort: Option<AbortRegistration>,
    ) -> SceneResult<Scene>
    where
        L: ResourceLoader + ?Sized,
    {
        let mut scene = self.into_scene(config)?;
        let images: Vec<(ElementId, String)> = scene
            .entities()
            .filter_map(|e| match &e.kind {
                EntityKind::Image(image) => Some((e.id, image.src.clone())),
                _ => None,
            })
            .collect();
        tracing::debug!("Resolving {} image sources", images.len());

        let loads = try_join_all(images.iter().map(|(_, src)| loader.load(src)));
        let pixels = match abort {
            Some(registration) => Abortable::new(loads, registration)
                .await
                .map_err(|_| SceneError::Aborted)??,
            None => loads.await?,
        };

        for ((id, src), element) in images.into_iter().zip(pixels) {
            tracing::trace!("Resolved {}", display_src(&src));
            scene.set_image_element(id, element)?;
        }
        Ok(scene)
    }
}

fn describe_tree(scene: &Scene, id: ElementId) -> SceneResult<EntityDocument> {
    let entity = scene.entity(id)?;
    let objects = match entity.as_group() {
        Some(group) => group
            .children()
            .iter()
            .map(|child| describe_tree(scene, *child))
            .collect::<SceneResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(EntityDocument::describe(entity, objects, scene.config()))
}

fn insert_tree(
    scene: &mut Scene,
    doc: EntityDocument,
    parent: Option<ElementId>,
) -> SceneResult<ElementId> {
    let (mut entity, children) = doc.into_entity()?;
    let id = entity.id;
    if scene.get(id).is_some() {
        return Err(SceneError::invalid_value("id", format!("duplicate id {id}")));
    }
    entity.parent = parent;
    scene.entities.insert(id, entity);
    for child in children {
        let child_id = insert_tree(scene, child, Some(id))?;
        if let Some(group) = scene.entity_mut(id)?.kind.as_group_mut() {
            group.children.push(child_id);
        }
    }
    Ok(id)
}

impl Scene {
    /// Serialize the scene document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_document(&self) -> SceneResult<SceneDocument> {
        SceneDocument::from_scene(self)
    }

    /// Serialize the scene to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> SceneResult<String> {
        Ok(serde_json::to_string(&self.to_document()?)?)
    }

    /// Deserialize a scene from JSON. Image pixels are left unresolved.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str, config: SceneConfig) -> SceneResult<Self> {
        let document: SceneDocument = serde_json::from_str(json)?;
        document.into_scene(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RasterBuffer;
    use serde_json::json;

    #[test]
    fn test_entity_document_keys() {
        let entity = Entity::rect(10.0, 5.0)
            .with_position(1.234_567, 2.0)
            .with_fill(Paint::color("red"));
        let doc = EntityDocument::from_entity(&entity, &SceneConfig::default());
        let value = serde_json::to_value(&doc).expect("ser");
        assert_eq!(value["type"], json!("rect"));
        assert_eq!(value["left"], json!(1.2346));
        assert_eq!(value["originX"], json!("left"));
        assert_eq!(value["fill"], json!("red"));
        assert_eq!(value["stroke"], json!(null));
        assert_eq!(value["scaleX"], json!(1.0));
        assert!(value.get("clipPath").is_none());
    }

    #[test]
    fn test_minimal_document_uses_defaults() {
        let json = r#"{"objects":[{"type":"circle","radius":5}]}"#;
        let scene = Scene::from_json(json, SceneConfig::default()).expect("parse");
        let root = scene.root_entities().next().expect("root");
        assert_eq!(root.geometry().width, 10.0);
        assert_eq!(root.geometry().scale_x, 1.0);
        assert!(matches!(root.kind, EntityKind::Circle(c) if c.radius == 5.0 && c.end_angle == 360.0));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"objects":[{"type":"text","text":"hi"}]}"#;
        let err = Scene::from_json(json, SceneConfig::default()).unwrap_err();
        assert!(matches!(err, SceneError::Serialization(_)));
    }

    #[test]
    fn test_bad_id_is_invalid_value() {
        let json = r#"{"objects":[{"type":"rect","id":"nope"}]}"#;
        let err = Scene::from_json(json, SceneConfig::default()).unwrap_err();
        assert!(matches!(err, SceneError::InvalidValue { property, .. } if property == "id"));
    }

    #[test]
    fn test_group_clip_path_is_rejected() {
        let json = r#"{"objects":[{"type":"rect","width":10,"height":10,
            "clipPath":{"type":"group","objects":[{"type":"circle","radius":3}]}}]}"#;
        let err = Scene::from_json(json, SceneConfig::default()).unwrap_err();
        assert!(matches!(err, SceneError::InvalidValue { property, .. } if property == "clipPath"));
    }

    #[test]
    fn test_shape_clip_path_round_trips() {
        let json = r#"{"objects":[{"type":"rect","width":10,"height":10,
            "clipPath":{"type":"circle","radius":3}}]}"#;
        let scene = Scene::from_json(json, SceneConfig::default()).expect("parse");
        let clip = scene
            .root_entities()
            .next()
            .and_then(Entity::clip_path)
            .expect("clip");
        assert!(matches!(clip.kind, EntityKind::Circle(c) if c.radius == 3.0));
        let again = Scene::from_json(&scene.to_json().expect("ser"), SceneConfig::default())
            .expect("reparse");
        assert_eq!(
            again.to_json().expect("ser"),
            scene.to_json().expect("ser")
        );
    }

    #[test]
    fn test_custom_data_round_trips() {
        let mut scene = Scene::new();
        let id = scene.add(Entity::rect(1.0, 1.0));
        scene
            .set_property(id, "layerName", json!("background"))
            .expect("custom");
        let json = scene.to_json().expect("ser");
        let back = Scene::from_json(&json, SceneConfig::default()).expect("de");
        assert_eq!(
            back.entity(id).expect("entity").custom.get("layerName"),
            Some(&json!("background"))
        );
    }

    #[tokio::test]
    async fn test_async_resolution_attaches_pixels() {
        let json = r#"{"objects":[{"type":"image","src":"a.png"}]}"#;
        let doc: SceneDocument = serde_json::from_str(json).expect("parse");
        let loader = crate::resource::MemoryLoader::new().with("a.png", RasterBuffer::new(4, 2));
        let scene = doc
            .into_scene_async(SceneConfig::default(), &loader, None)
            .await
            .expect("resolve");
        let image = scene.root_entities().next().expect("root");
        assert_eq!(image.geometry().width, 4.0);
        assert!(matches!(&image.kind, EntityKind::Image(i) if i.is_loaded()));
    }
}
