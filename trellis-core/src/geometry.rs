//! Points, bounding boxes and rotation helpers.

use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::{SceneError, SceneResult};

/// A 2D point or vector.
///
/// Arithmetic returns new points; the `*_equals` methods are the in-place
/// variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
}

impl Point {
    /// Origin.
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Add in place.
    pub fn add_equals(&mut self, other: Self) -> &mut Self {
        self.x += other.x;
        self.y += other.y;
        self
    }

    /// Subtract in place.
    pub fn subtract_equals(&mut self, other: Self) -> &mut Self {
        self.x -= other.x;
        self.y -= other.y;
        self
    }

    /// Multiply by a scalar in place.
    pub fn scalar_multiply_equals(&mut self, scalar: f64) -> &mut Self {
        self.x *= scalar;
        self.y *= scalar;
        self
    }

    /// Component-wise multiplication.
    #[must_use]
    pub fn multiply(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y)
    }

    /// Linear interpolation towards `other`; `t = 0.5` is the midpoint.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance_from(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Midpoint between this point and `other`.
    #[must_use]
    pub fn midpoint_from(self, other: Self) -> Self {
        self.lerp(other, 0.5)
    }

    /// Component-wise minimum.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    /// Component-wise maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }

    /// Rotate around the origin by `radians`.
    #[must_use]
    pub fn rotate(self, radians: f64) -> Self {
        rotate_vector(self, radians)
    }

    /// Approximate equality within `epsilon` per component.
    #[must_use]
    pub fn approx_eq(self, other: Self, epsilon: f64) -> bool {
        (self.x - other.x).abs() <= epsilon && (self.y - other.y).abs() <= epsilon
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Point {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum x.
    pub left: f64,
    /// Minimum y.
    pub top: f64,
    /// Extent along x.
    pub width: f64,
    /// Extent along y.
    pub height: f64,
}

impl BoundingBox {
    /// Create a new box.
    #[must_use]
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Top-left corner.
    #[must_use]
    pub fn min(&self) -> Point {
        Point::new(self.left, self.top)
    }

    /// Bottom-right corner.
    #[must_use]
    pub fn max(&self) -> Point {
        Point::new(self.left + self.width, self.top + self.height)
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    /// Size as a vector.
    #[must_use]
    pub fn size(&self) -> Point {
        Point::new(self.width, self.height)
    }
}

/// Axis-aligned bounds of a set of points.
///
/// # Errors
///
/// Returns [`SceneError::InvalidGeometry`] if `points` is empty.
pub fn bounding_box_from_points(points: &[Point]) -> SceneResult<BoundingBox> {
    let (first, rest) = points.split_first().ok_or_else(|| {
        SceneError::InvalidGeometry("bounding box of an empty point set".to_string())
    })?;
    let (min, max) = rest
        .iter()
        .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
    Ok(BoundingBox::new(min.x, min.y, max.x - min.x, max.y - min.y))
}

/// Rotate `point` around `origin` by `radians`.
#[must_use]
pub fn rotate_point(point: Point, origin: Point, radians: f64) -> Point {
    rotate_vector(point - origin, radians) + origin
}

/// Rotate a vector around the origin by `radians`.
#[must_use]
pub fn rotate_vector(vector: Point, radians: f64) -> Point {
    let (sin, cos) = radians.sin_cos();
    Point::new(
        vector.x * cos - vector.y * sin,
        vector.x * sin + vector.y * cos,
    )
}

/// Ray-casting point-in-polygon test. Points on an edge may fall either way.
#[must_use]
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
