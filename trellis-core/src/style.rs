//! Fill and stroke styles.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::{SceneError, SceneResult};

/// An RGBA color with straight (non-premultiplied) components in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    /// Red.
    pub r: f64,
    /// Green.
    pub g: f64,
    /// Blue.
    pub b: f64,
    /// Alpha.
    pub a: f64,
}

impl Rgba {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Create a color from float components.
    #[must_use]
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color from 8-bit channels.
    #[must_use]
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(
            f64::from(r) / 255.0,
            f64::from(g) / 255.0,
            f64::from(b) / 255.0,
            1.0,
        )
    }

    /// Whether this color paints nothing.
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        self.a <= 0.0
    }

    /// Parse a CSS-like color string.
    ///
    /// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)`,
    /// `rgba(r, g, b, a)` and a handful of named colors.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidColor`] if the string is not recognized.
    pub fn parse(input: &str) -> SceneResult<Self> {
        let s = input.trim().to_ascii_lowercase();
        let invalid = || SceneError::InvalidColor(input.to_string());

        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(invalid);
        }
        if let Some(body) = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return parse_rgb_function(body).ok_or_else(invalid);
        }
        named_color(&s).ok_or_else(invalid)
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let digit = |i: usize| u8::from_str_radix(hex.get(i..=i)?, 16).ok();
    let pair = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => Some(Rgba::from_rgb8(
            digit(0)? * 17,
            digit(1)? * 17,
            digit(2)? * 17,
        )),
        6 => Some(Rgba::from_rgb8(pair(0)?, pair(2)?, pair(4)?)),
        8 => {
            let mut color = Rgba::from_rgb8(pair(0)?, pair(2)?, pair(4)?);
            color.a = f64::from(pair(6)?) / 255.0;
            Some(color)
        }
        _ => None,
    }
}

fn parse_rgb_function(body: &str) -> Option<Rgba> {
    let parts: Vec<f64> = body
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    let channel = |v: f64| (v / 255.0).clamp(0.0, 1.0);
    match parts.as_slice() {
        [r, g, b] => Some(Rgba::new(channel(*r), channel(*g), channel(*b), 1.0)),
        [r, g, b, a] => Some(Rgba::new(
            channel(*r),
            channel(*g),
            channel(*b),
            a.clamp(0.0, 1.0),
        )),
        _ => None,
    }
}

fn named_color(name: &str) -> Option<Rgba> {
    let rgb = match name {
        "transparent" => return Some(Rgba::TRANSPARENT),
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "cyan" | "aqua" => (0, 255, 255),
        "magenta" | "fuchsia" => (255, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        _ => return None,
    };
    Some(Rgba::from_rgb8(rgb.0, rgb.1, rgb.2))
}

/// A color stop in a gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    /// Position along the gradient, `0..=1`.
    pub offset: f64,
    /// CSS color string.
    pub color: String,
}

/// A linear gradient between two points in the entity's local (centered) box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearGradient {
    /// Gradient start.
    pub start: Point,
    /// Gradient end.
    pub end: Point,
    /// Ordered color stops.
    pub stops: Vec<ColorStop>,
}

/// A fill or stroke paint as configured on an entity.
///
/// Serializes as `null`, a color string, or a gradient object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Paint {
    /// Paint nothing.
    #[default]
    None,
    /// A CSS color string, kept verbatim for serialization.
    Color(String),
    /// A linear gradient.
    LinearGradient(LinearGradient),
}

impl Paint {
    /// Convenience constructor for a color paint.
    #[must_use]
    pub fn color(value: impl Into<String>) -> Self {
        Self::Color(value.into())
    }

    /// Resolve into a paint the drawing surface can use.
    ///
    /// Returns `Ok(None)` when the paint draws nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidColor`] if a color does not parse.
    pub fn resolve(&self) -> SceneResult<Option<ResolvedPaint>> {
        match self {
            Self::None => Ok(None),
            Self::Color(value) => {
                let color = Rgba::parse(value)?;
                Ok((!color.is_transparent()).then_some(ResolvedPaint::Solid(color)))
            }
            Self::LinearGradient(gradient) => {
                let stops = gradient
                    .stops
                    .iter()
                    .map(|stop| Ok((stop.offset.clamp(0.0, 1.0), Rgba::parse(&stop.color)?)))
                    .collect::<SceneResult<Vec<_>>>()?;
                if stops.iter().all(|(_, c)| c.is_transparent()) {
                    return Ok(None);
                }
                Ok(Some(ResolvedPaint::LinearGradient {
                    start: gradient.start,
                    end: gradient.end,
                    stops,
                }))
            }
        }
    }

    /// Whether this paint could put any pixels on the surface.
    ///
    /// Unparseable colors count as visible so the draw error surfaces.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.resolve().map_or(true, |paint| paint.is_some())
    }
}

/// A paint resolved to concrete colors.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedPaint {
    /// Solid color.
    Solid(Rgba),
    /// Linear gradient with parsed stops.
    LinearGradient {
        /// Gradient start in the current user space.
        start: Point,
        /// Gradient end in the current user space.
        end: Point,
        /// `(offset, color)` pairs.
        stops: Vec<(f64, Rgba)>,
    },
}

/// Fill rule for path interiors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillRule {
    /// Non-zero winding.
    #[default]
    Nonzero,
    /// Even-odd.
    Evenodd,
}

/// Line cap for strokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    /// Flat end at the endpoint.
    #[default]
    Butt,
    /// Rounded end.
    Round,
    /// Square end extending past the endpoint.
    Square,
}

/// Line join for strokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    /// Sharp corner.
    #[default]
    Miter,
    /// Rounded corner.
    Round,
    /// Beveled corner.
    Bevel,
}

/// Stroke parameters handed to the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    /// Line width in user units.
    pub width: f64,
    /// Cap style.
    pub cap: LineCap,
    /// Join style.
    pub join: LineJoin,
    /// Miter limit.
    pub miter_limit: f64,
}

/// Paint-related attributes of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    /// Interior paint.
    pub fill: Paint,
    /// Outline paint.
    pub stroke: Paint,
    /// Outline width.
    pub stroke_width: f64,
    /// Outline cap.
    pub stroke_line_cap: LineCap,
    /// Outline join.
    pub stroke_line_join: LineJoin,
    /// Outline miter limit.
    pub stroke_miter_limit: f64,
    /// Interior rule.
    pub fill_rule: FillRule,
    /// Opacity multiplier, `0..=1`.
    pub opacity: f64,
    /// Whether the entity is painted at all.
    pub visible: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: Paint::color("rgb(0,0,0)"),
            stroke: Paint::None,
            stroke_width: 1.0,
            stroke_line_cap: LineCap::Butt,
            stroke_line_join: LineJoin::Miter,
            stroke_miter_limit: 4.0,
            fill_rule: FillRule::Nonzero,
            opacity: 1.0,
            visible: true,
        }
    }
}

impl Style {
    /// Stroke parameters for the surface.
    #[must_use]
    pub fn stroke_style(&self) -> StrokeStyle {
        StrokeStyle {
            width: self.stroke_width,
            cap: self.stroke_line_cap,
            join: self.stroke_line_join,
            miter_limit: self.stroke_miter_limit,
        }
    }

    /// Whether the stroke paints anything.
    #[must_use]
    pub fn has_stroke(&self) -> bool {
        self.stroke_width > 0.0 && self.stroke.is_visible()
    }

    /// Whether the fill paints anything.
    #[must_use]
    pub fn has_fill(&self) -> bool {
        self.fill.is_visible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Rgba::parse("#f00").expect("short"), Rgba::from_rgb8(255, 0, 0));
        assert_eq!(
            Rgba::parse("#00ff80").expect("long"),
            Rgba::from_rgb8(0, 255, 128)
        );
        let translucent = Rgba::parse("#0000ff80").expect("alpha");
        assert!((translucent.a - 128.0 / 255.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_functions_and_names() {
        assert_eq!(Rgba::parse("red").expect("named"), Rgba::from_rgb8(255, 0, 0));
        assert_eq!(
            Rgba::parse("rgb(0, 0, 0)").expect("rgb"),
            Rgba::from_rgb8(0, 0, 0)
        );
        let c = Rgba::parse("rgba(255,255,255,0.5)").expect("rgba");
        assert!((c.a - 0.5).abs() < 1e-12);
        assert!(Rgba::parse("chartreuse-ish").is_err());
        assert!(Rgba::parse("#12345").is_err());
    }

    #[test]
    fn test_transparent_paint_resolves_to_nothing() {
        assert_eq!(Paint::None.resolve().expect("none"), None);
        assert_eq!(Paint::color("transparent").resolve().expect("ok"), None);
        assert_eq!(Paint::color("rgba(1,2,3,0)").resolve().expect("ok"), None);
        assert!(!Paint::color("transparent").is_visible());
        assert!(Paint::color("red").is_visible());
    }

    #[test]
    fn test_paint_serializes_untagged() {
        assert_eq!(serde_json::to_string(&Paint::None).expect("ser"), "null");
        assert_eq!(
            serde_json::to_string(&Paint::color("red")).expect("ser"),
            "\"red\""
        );
        let back: Paint = serde_json::from_str("\"#fff\"").expect("de");
        assert_eq!(back, Paint::color("#fff"));
        let none: Paint = serde_json::from_str("null").expect("de");
        assert_eq!(none, Paint::None);
    }

    #[test]
    fn test_stroke_visibility_requires_width() {
        let style = Style {
            stroke: Paint::color("blue"),
            stroke_width: 0.0,
            ..Style::default()
        };
        assert!(!style.has_stroke());
        assert!(style.has_fill());
    }
}
