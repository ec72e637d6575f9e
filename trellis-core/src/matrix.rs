//! 2D affine matrices.
//!
//! A [`Matrix`] holds the six values `[a, b, c, d, e, f]` of
//!
//! ```text
//! | a  c  e |
//! | b  d  f |
//! | 0  0  1 |
//! ```
//!
//! Every transform in the scene goes through [`compose`], which builds a
//! matrix in this fixed order, applied right to left to a point:
//!
//! ```text
//! M = Translate · Rotate · Scale(flip) · SkewX · SkewY
//! ```
//!
//! [`decompose`] inverts it in canonical form (`skew_y == 0`).

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::{SceneError, SceneResult};

/// A 2D affine transform matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct Matrix {
    /// Horizontal scaling / rotation.
    pub a: f64,
    /// Vertical skewing / rotation.
    pub b: f64,
    /// Horizontal skewing / rotation.
    pub c: f64,
    /// Vertical scaling / rotation.
    pub d: f64,
    /// Horizontal translation.
    pub e: f64,
    /// Vertical translation.
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<[f64; 6]> for Matrix {
    fn from([a, b, c, d, e, f]: [f64; 6]) -> Self {
        Self { a, b, c, d, e, f }
    }
}

impl From<Matrix> for [f64; 6] {
    fn from(m: Matrix) -> Self {
        m.to_array()
    }
}

impl Matrix {
    /// The identity matrix.
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    /// Create a matrix from its six values.
    #[must_use]
    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Translation by `(x, y)`.
    #[must_use]
    pub const fn translate(x: f64, y: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, x, y)
    }

    /// Scale by `(x, y)`.
    #[must_use]
    pub const fn scale(x: f64, y: f64) -> Self {
        Self::new(x, 0.0, 0.0, y, 0.0, 0.0)
    }

    /// Rotation by `degrees` (clockwise in a y-down space).
    #[must_use]
    pub fn rotate(degrees: f64) -> Self {
        let (sin, cos) = sin_cos_degrees(degrees);
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// Horizontal skew by `degrees`.
    #[must_use]
    pub fn skew_x(degrees: f64) -> Self {
        Self::new(1.0, 0.0, degrees.to_radians().tan(), 1.0, 0.0, 0.0)
    }

    /// Vertical skew by `degrees`.
    #[must_use]
    pub fn skew_y(degrees: f64) -> Self {
        Self::new(1.0, degrees.to_radians().tan(), 0.0, 1.0, 0.0, 0.0)
    }

    /// The six values as an array.
    #[must_use]
    pub const fn to_array(self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// `self ∘ other`: `other` is applied first.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        multiply(self, other)
    }

    /// See [`invert`].
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NonInvertible`] for a zero determinant.
    pub fn invert(&self) -> SceneResult<Self> {
        invert(self)
    }

    /// Apply to a point, including translation.
    #[must_use]
    pub fn apply(&self, point: Point) -> Point {
        apply_to_point(self, point)
    }

    /// Apply to a vector, ignoring translation.
    #[must_use]
    pub fn apply_vector(&self, vector: Point) -> Point {
        Point::new(
            self.a * vector.x + self.c * vector.y,
            self.b * vector.x + self.d * vector.y,
        )
    }

    /// `a*d - b*c`.
    #[must_use]
    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// The matrix without its translation.
    #[must_use]
    pub const fn linear(&self) -> Self {
        Self::new(self.a, self.b, self.c, self.d, 0.0, 0.0)
    }

    /// The translation part.
    #[must_use]
    pub const fn translation(&self) -> Point {
        Point::new(self.e, self.f)
    }

    /// Whether the matrix is the identity within `epsilon`.
    #[must_use]
    pub fn is_identity(&self, epsilon: f64) -> bool {
        self.approx_eq(&Self::IDENTITY, epsilon)
    }

    /// Component-wise approximate equality.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(x, y)| (x - y).abs() <= epsilon)
    }
}

/// Decomposed transform components, in degrees where angular.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformComponents {
    /// Horizontal translation.
    pub translate_x: f64,
    /// Vertical translation.
    pub translate_y: f64,
    /// Rotation in degrees.
    pub angle: f64,
    /// Horizontal scale.
    pub scale_x: f64,
    /// Vertical scale.
    pub scale_y: f64,
    /// Horizontal skew in degrees.
    pub skew_x: f64,
    /// Vertical skew in degrees.
    pub skew_y: f64,
    /// Mirror horizontally.
    pub flip_x: bool,
    /// Mirror vertically.
    pub flip_y: bool,
}

impl Default for TransformComponents {
    fn default() -> Self {
        Self {
            translate_x: 0.0,
            translate_y: 0.0,
            angle: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            skew_x: 0.0,
            skew_y: 0.0,
            flip_x: false,
            flip_y: false,
        }
    }
}

/// Build a matrix from components: translate, rotate, scale (with flip),
/// skew-x, skew-y.
#[must_use]
pub fn compose(components: &TransformComponents) -> Matrix {
    let mut matrix = Matrix::translate(components.translate_x, components.translate_y);
    if components.angle != 0.0 {
        matrix = multiply(&matrix, &Matrix::rotate(components.angle));
    }
    matrix = multiply(&matrix, &dimensions_matrix(components));
    matrix
}

/// Scale, flip and skew without translation or rotation.
#[must_use]
pub fn dimensions_matrix(components: &TransformComponents) -> Matrix {
    let sx = if components.flip_x {
        -components.scale_x
    } else {
        components.scale_x
    };
    let sy = if components.flip_y {
        -components.scale_y
    } else {
        components.scale_y
    };
    let mut matrix = Matrix::scale(sx, sy);
    if components.skew_x != 0.0 {
        matrix = multiply(&matrix, &Matrix::skew_x(components.skew_x));
    }
    if components.skew_y != 0.0 {
        matrix = multiply(&matrix, &Matrix::skew_y(components.skew_y));
    }
    matrix
}

/// `m1 ∘ m2`: the result applies `m2` first, then `m1`.
#[must_use]
pub fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    Matrix::new(
        m1.a * m2.a + m1.c * m2.b,
        m1.b * m2.a + m1.d * m2.b,
        m1.a * m2.c + m1.c * m2.d,
        m1.b * m2.c + m1.d * m2.d,
        m1.a * m2.e + m1.c * m2.f + m1.e,
        m1.b * m2.e + m1.d * m2.f + m1.f,
    )
}

/// Inverse of `m`.
///
/// # Errors
///
/// Returns [`SceneError::NonInvertible`] when the determinant is zero or not
/// finite, e.g. for an entity scaled to zero.
pub fn invert(m: &Matrix) -> SceneResult<Matrix> {
    let determinant = m.determinant();
    if determinant == 0.0 || !determinant.is_finite() {
        return Err(SceneError::NonInvertible { determinant });
    }
    let r = 1.0 / determinant;
    Ok(Matrix::new(
        m.d * r,
        -m.b * r,
        -m.c * r,
        m.a * r,
        (m.c * m.f - m.d * m.e) * r,
        (m.b * m.e - m.a * m.f) * r,
    ))
}

/// Decompose a matrix into translation, rotation, scale and horizontal skew.
///
/// The result is canonical: `skew_y` is always zero, `flip_x`/`flip_y` are
/// false, `scale_x >= 0`, and a reflection shows up as a negative `scale_y`.
/// The angle is normalized into `[0, 360)`.
#[must_use]
pub fn decompose(m: &Matrix) -> TransformComponents {
    let denom = m.a * m.a + m.b * m.b;
    let mut components = TransformComponents {
        translate_x: m.e,
        translate_y: m.f,
        ..TransformComponents::default()
    };
    if denom == 0.0 {
        components.scale_x = 0.0;
        components.scale_y = m.c.hypot(m.d);
        return components;
    }
    let scale_x = denom.sqrt();
    components.angle = normalize_degrees(m.b.atan2(m.a).to_degrees());
    components.scale_x = scale_x;
    components.scale_y = m.determinant() / scale_x;
    components.skew_x = (m.a * m.c + m.b * m.d).atan2(denom).to_degrees();
    components
}

/// Apply `m` to `point`.
#[must_use]
pub fn apply_to_point(m: &Matrix, point: Point) -> Point {
    Point::new(
        m.a * point.x + m.c * point.y + m.e,
        m.b * point.x + m.d * point.y + m.f,
    )
}

/// Wrap an angle into `[0, 360)`.
#[must_use]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Sine and cosine of an angle in degrees, exact on quarter turns.
#[must_use]
pub fn sin_cos_degrees(degrees: f64) -> (f64, f64) {
    let normalized = normalize_degrees(degrees);
    if normalized == 0.0 {
        (0.0, 1.0)
    } else if normalized == 90.0 {
        (1.0, 0.0)
    } else if normalized == 180.0 {
        (0.0, -1.0)
    } else if normalized == 270.0 {
        (-1.0, 0.0)
    } else {
        normalized.to_radians().sin_cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_components_eq(actual: &TransformComponents, expected: &TransformComponents) {
        let pairs = [
            ("translate_x", actual.translate_x, expected.translate_x),
            ("translate_y", actual.translate_y, expected.translate_y),
            ("angle", actual.angle, expected.angle),
            ("scale_x", actual.scale_x, expected.scale_x),
            ("scale_y", actual.scale_y, expected.scale_y),
            ("skew_x", actual.skew_x, expected.skew_x),
            ("skew_y", actual.skew_y, expected.skew_y),
        ];
        for (name, a, e) in pairs {
            assert!((a - e).abs() < EPS, "{name}: {a} != {e}");
        }
    }

    #[test]
    fn test_compose_identity() {
        let m = compose(&TransformComponents::default());
        assert!(m.is_identity(0.0));
    }

    #[test]
    fn test_compose_order_translate_rotate_scale() {
        let m = compose(&TransformComponents {
            translate_x: 10.0,
            translate_y: 20.0,
            angle: 90.0,
            scale_x: 2.0,
            scale_y: 3.0,
            ..TransformComponents::default()
        });
        // (1, 0) scaled to (2, 0), rotated to (0, 2), translated to (10, 22)
        let p = m.apply(Point::new(1.0, 0.0));
        assert!(p.approx_eq(Point::new(10.0, 22.0), 1e-12));
        // (0, 1) scaled to (0, 3), rotated to (-3, 0)
        let q = m.apply(Point::new(0.0, 1.0));
        assert!(q.approx_eq(Point::new(7.0, 20.0), 1e-12));
    }

    #[test]
    fn test_multiply_applies_right_operand_first() {
        let t = Matrix::translate(5.0, 0.0);
        let s = Matrix::scale(2.0, 2.0);
        let p = Point::new(1.0, 1.0);
        assert_eq!(multiply(&t, &s).apply(p), Point::new(7.0, 2.0));
        assert_eq!(multiply(&s, &t).apply(p), Point::new(12.0, 2.0));
    }

    #[test]
    fn test_invert_round_trip() {
        let m = compose(&TransformComponents {
            translate_x: -4.0,
            translate_y: 9.0,
            angle: 33.0,
            scale_x: 1.5,
            scale_y: 0.25,
            skew_x: 12.0,
            ..TransformComponents::default()
        });
        let inv = invert(&m).expect("invertible");
        assert!(multiply(&m, &inv).is_identity(1e-12));
        assert!(multiply(&inv, &m).is_identity(1e-12));
    }

    #[test]
    fn test_invert_zero_scale_fails() {
        let m = Matrix::scale(0.0, 1.0);
        let err = invert(&m).unwrap_err();
        assert!(matches!(err, SceneError::NonInvertible { .. }));
    }

    #[test]
    fn test_decompose_compose_round_trip() {
        let translates = [(0.0, 0.0), (-120.5, 44.25), (1e4, -3.0)];
        let angles = [0.0, 15.0, 89.0, 90.0, 135.5, 180.0, 271.0, 359.0];
        let scales = [(1.0, 1.0), (0.5, 2.0), (3.0, 0.1)];
        let skews = [0.0, -60.0, 25.0, 89.0];
        for &(tx, ty) in &translates {
            for &angle in &angles {
                for &(sx, sy) in &scales {
                    for &skew_x in &skews {
                        let input = TransformComponents {
                            translate_x: tx,
                            translate_y: ty,
                            angle,
                            scale_x: sx,
                            scale_y: sy,
                            skew_x,
                            ..TransformComponents::default()
                        };
                        let out = decompose(&compose(&input));
                        assert_components_eq(&out, &input);
                    }
                }
            }
        }
    }

    #[test]
    fn test_compose_decompose_reproduces_matrix_with_skew_y() {
        // Skew-y is folded into the canonical form, so only the matrix survives.
        let input = TransformComponents {
            translate_x: 3.0,
            translate_y: 4.0,
            angle: 40.0,
            scale_x: 1.2,
            scale_y: 0.7,
            skew_x: 10.0,
            skew_y: 20.0,
            ..TransformComponents::default()
        };
        let m = compose(&input);
        let again = compose(&decompose(&m));
        assert!(again.approx_eq(&m, 1e-9));
    }

    #[test]
    fn test_flip_shows_up_as_reflection() {
        let m = compose(&TransformComponents {
            flip_y: true,
            ..TransformComponents::default()
        });
        let d = decompose(&m);
        assert!((d.scale_y + 1.0).abs() < EPS);
        assert!(compose(&d).approx_eq(&m, 1e-12));
    }

    #[test]
    fn test_quarter_turns_are_exact() {
        let m = Matrix::rotate(90.0);
        assert_eq!(m.to_array(), [0.0, 1.0, -1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_matrix_serializes_as_array() {
        let json = serde_json::to_string(&Matrix::translate(1.0, 2.0)).expect("serialize");
        assert_eq!(json, "[1.0,0.0,0.0,1.0,1.0,2.0]");
        let back: Matrix = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Matrix::translate(1.0, 2.0));
    }
}
