//! Typed entity properties and the string-keyed property API.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::element::{OriginX, OriginY};
use crate::group::LayoutStrategy;
use crate::style::{FillRule, Paint};
use crate::{SceneError, SceneResult};

/// A single settable attribute with its new value.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// `left`.
    Left(f64),
    /// `top`.
    Top(f64),
    /// `width`.
    Width(f64),
    /// `height`.
    Height(f64),
    /// `scaleX`.
    ScaleX(f64),
    /// `scaleY`.
    ScaleY(f64),
    /// `skewX`, degrees.
    SkewX(f64),
    /// `skewY`, degrees.
    SkewY(f64),
    /// `angle`, degrees.
    Angle(f64),
    /// `flipX`.
    FlipX(bool),
    /// `flipY`.
    FlipY(bool),
    /// `originX`.
    OriginX(OriginX),
    /// `originY`.
    OriginY(OriginY),
    /// `opacity`, in `[0, 1]`.
    Opacity(f64),
    /// `visible`.
    Visible(bool),
    /// `fill`.
    Fill(Paint),
    /// `stroke`.
    Stroke(Paint),
    /// `strokeWidth`.
    StrokeWidth(f64),
    /// `fillRule`.
    FillRule(FillRule),
    /// `objectCaching`.
    ObjectCaching(bool),
    /// `absolutePositioned`, meaningful on clip paths.
    AbsolutePositioned(bool),
    /// `radius`, circles only.
    Radius(f64),
    /// `startAngle`, circles only, degrees.
    StartAngle(f64),
    /// `endAngle`, circles only, degrees.
    EndAngle(f64),
    /// `rx`: corner radius on rects, horizontal radius on ellipses.
    Rx(f64),
    /// `ry`: corner radius on rects, vertical radius on ellipses.
    Ry(f64),
    /// `src`, images only. Clears any loaded pixels.
    Src(String),
    /// `layout`, groups only.
    Layout(LayoutStrategy),
    /// Any unrecognized name, stored opaquely.
    Custom(String, Value),
}

impl Property {
    /// The camelCase property name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Left(_) => "left",
            Self::Top(_) => "top",
            Self::Width(_) => "width",
            Self::Height(_) => "height",
            Self::ScaleX(_) => "scaleX",
            Self::ScaleY(_) => "scaleY",
            Self::SkewX(_) => "skewX",
            Self::SkewY(_) => "skewY",
            Self::Angle(_) => "angle",
            Self::FlipX(_) => "flipX",
            Self::FlipY(_) => "flipY",
            Self::OriginX(_) => "originX",
            Self::OriginY(_) => "originY",
            Self::Opacity(_) => "opacity",
            Self::Visible(_) => "visible",
            Self::Fill(_) => "fill",
            Self::Stroke(_) => "stroke",
            Self::StrokeWidth(_) => "strokeWidth",
            Self::FillRule(_) => "fillRule",
            Self::ObjectCaching(_) => "objectCaching",
            Self::AbsolutePositioned(_) => "absolutePositioned",
            Self::Radius(_) => "radius",
            Self::StartAngle(_) => "startAngle",
            Self::EndAngle(_) => "endAngle",
            Self::Rx(_) => "rx",
            Self::Ry(_) => "ry",
            Self::Src(_) => "src",
            Self::Layout(_) => "layout",
            Self::Custom(name, _) => name,
        }
    }

    /// Whether changing this property moves or resizes the entity's box,
    /// which invalidates an auto-sized parent's layout.
    #[must_use]
    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            Self::Left(_)
                | Self::Top(_)
                | Self::Width(_)
                | Self::Height(_)
                | Self::ScaleX(_)
                | Self::ScaleY(_)
                | Self::SkewX(_)
                | Self::SkewY(_)
                | Self::Angle(_)
                | Self::FlipX(_)
                | Self::FlipY(_)
                | Self::OriginX(_)
                | Self::OriginY(_)
                | Self::Radius(_)
                | Self::Rx(_)
                | Self::Ry(_)
        )
    }

    /// Reject non-finite numbers and out-of-range sizes.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidValue`] naming the property.
    pub fn validate(&self) -> SceneResult<()> {
        let name = self.name();
        match self {
            Self::Width(v)
            | Self::Height(v)
            | Self::StrokeWidth(v)
            | Self::Radius(v)
            | Self::Rx(v)
            | Self::Ry(v) => {
                finite(name, *v)?;
                if *v < 0.0 {
                    return Err(SceneError::invalid_value(name, "must not be negative"));
                }
            }
            Self::Opacity(v) => {
                finite(name, *v)?;
                if !(0.0..=1.0).contains(v) {
                    return Err(SceneError::invalid_value(name, "must be within [0, 1]"));
                }
            }
            Self::Left(v)
            | Self::Top(v)
            | Self::ScaleX(v)
            | Self::ScaleY(v)
            | Self::SkewX(v)
            | Self::SkewY(v)
            | Self::Angle(v)
            | Self::StartAngle(v)
            | Self::EndAngle(v) => finite(name, *v)?,
            Self::OriginX(OriginX::Fraction(v)) | Self::OriginY(OriginY::Fraction(v)) => {
                finite(name, *v)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Build a property from a camelCase name and a JSON value.
    ///
    /// Unrecognized names become [`Property::Custom`] unless `strict`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownProperty`] for an unrecognized name in
    /// strict mode, or [`SceneError::InvalidValue`] when the value has the
    /// wrong shape.
    pub fn from_json(name: &str, value: Value, strict: bool) -> SceneResult<Self> {
        let property = match name {
            "left" => Self::Left(decode(name, value)?),
            "top" => Self::Top(decode(name, value)?),
            "width" => Self::Width(decode(name, value)?),
            "height" => Self::Height(decode(name, value)?),
            "scaleX" => Self::ScaleX(decode(name, value)?),
            "scaleY" => Self::ScaleY(decode(name, value)?),
            "skewX" => Self::SkewX(decode(name, value)?),
            "skewY" => Self::SkewY(decode(name, value)?),
            "angle" => Self::Angle(decode(name, value)?),
            "flipX" => Self::FlipX(decode(name, value)?),
            "flipY" => Self::FlipY(decode(name, value)?),
            "originX" => Self::OriginX(decode(name, value)?),
            "originY" => Self::OriginY(decode(name, value)?),
            "opacity" => Self::Opacity(decode(name, value)?),
            "visible" => Self::Visible(decode(name, value)?),
            "fill" => Self::Fill(decode(name, value)?),
            "stroke" => Self::Stroke(decode(name, value)?),
            "strokeWidth" => Self::StrokeWidth(decode(name, value)?),
            "fillRule" => Self::FillRule(decode(name, value)?),
            "objectCaching" => Self::ObjectCaching(decode(name, value)?),
            "absolutePositioned" => Self::AbsolutePositioned(decode(name, value)?),
            "radius" => Self::Radius(decode(name, value)?),
            "startAngle" => Self::StartAngle(decode(name, value)?),
            "endAngle" => Self::EndAngle(decode(name, value)?),
            "rx" => Self::Rx(decode(name, value)?),
            "ry" => Self::Ry(decode(name, value)?),
            "src" => Self::Src(decode(name, value)?),
            "layout" => Self::Layout(decode(name, value)?),
            _ if strict => return Err(SceneError::UnknownProperty(name.to_string())),
            _ => Self::Custom(name.to_string(), value),
        };
        property.validate()?;
        Ok(property)
    }
}

fn decode<T: DeserializeOwned>(name: &str, value: Value) -> SceneResult<T> {
    serde_json::from_value(value).map_err(|e| SceneError::invalid_value(name, e.to_string()))
}

fn finite(name: &str, v: f64) -> SceneResult<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(SceneError::invalid_value(name, "must be finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_known_names() {
        assert_eq!(
            Property::from_json("scaleX", json!(2.0), true).expect("scaleX"),
            Property::ScaleX(2.0)
        );
        assert_eq!(
            Property::from_json("originX", json!("center"), true).expect("originX"),
            Property::OriginX(OriginX::Center)
        );
        assert_eq!(
            Property::from_json("fill", json!("#f00"), true).expect("fill"),
            Property::Fill(Paint::color("#f00"))
        );
        assert_eq!(
            Property::from_json("layout", json!("fit-content"), true).expect("layout"),
            Property::Layout(LayoutStrategy::FitContent)
        );
    }

    #[test]
    fn test_unknown_name_lenient_and_strict() {
        let custom = Property::from_json("customTag", json!({"a": 1}), false).expect("lenient");
        assert_eq!(custom, Property::Custom("customTag".into(), json!({"a": 1})));
        let err = Property::from_json("customTag", json!(1), true).unwrap_err();
        assert!(matches!(err, SceneError::UnknownProperty(name) if name == "customTag"));
    }

    #[test]
    fn test_wrong_shape_is_invalid_value() {
        let err = Property::from_json("angle", json!("ninety"), false).unwrap_err();
        assert!(matches!(err, SceneError::InvalidValue { property, .. } if property == "angle"));
    }

    #[test]
    fn test_range_validation() {
        assert!(Property::Width(-1.0).validate().is_err());
        assert!(Property::Opacity(1.5).validate().is_err());
        assert!(Property::Left(f64::NAN).validate().is_err());
        assert!(Property::Left(-5.0).validate().is_ok());
    }

    #[test]
    fn test_geometry_classification() {
        assert!(Property::Angle(1.0).is_geometry());
        assert!(Property::Radius(1.0).is_geometry());
        assert!(!Property::Fill(Paint::None).is_geometry());
        assert!(!Property::Opacity(0.5).is_geometry());
    }
}
