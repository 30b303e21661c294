// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::ops::Mul;

use crate::{FuzzyEq, Vec2, Vec3};

/// A row-major 3×3 matrix, used as a 2D affine transform.
///
/// Points transform as `(x, y, 1)`, directions as `(x, y, 0)`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Mat33 {
    rows: [[f64; 3]; 3],
}

/// Matrix construction/inversion errors.
#[derive(Clone, PartialEq, Debug)]
pub enum MatrixError {
    /// The matrix (or a requested inverse) is not invertible.
    Singular,
    /// A CSS/SVG transform string could not be parsed.
    InvalidMatrix(String),
}

impl std::fmt::Display for MatrixError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            MatrixError::Singular => write!(f, "matrix is singular"),
            MatrixError::InvalidMatrix(ref s) => {
                write!(f, "invalid matrix string '{}'", s)
            }
        }
    }
}

impl std::error::Error for MatrixError {}

impl Mat33 {
    /// The identity transform.
    pub const IDENTITY: Mat33 = Mat33 {
        rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// Creates a matrix from its nine entries, row by row.
    #[inline]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        a1: f64, a2: f64, a3: f64,
        b1: f64, b2: f64, b3: f64,
        c1: f64, c2: f64, c3: f64,
    ) -> Self {
        Mat33 {
            rows: [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]],
        }
    }

    /// A translation by `amount`.
    #[inline]
    pub fn translation(amount: Vec2) -> Self {
        Mat33::new(
            1.0, 0.0, amount.x,
            0.0, 1.0, amount.y,
            0.0, 0.0, 1.0,
        )
    }

    /// A uniform scaling about `center`.
    pub fn scaling_2d(scale: f64, center: Vec2) -> Self {
        Mat33::scaling_2d_xy(scale, scale, center)
    }

    /// A non-uniform scaling about `center`.
    pub fn scaling_2d_xy(sx: f64, sy: f64, center: Vec2) -> Self {
        Mat33::translation(center)
            .right_mul(&Mat33::new(
                sx, 0.0, 0.0,
                0.0, sy, 0.0,
                0.0, 0.0, 1.0,
            ))
            .right_mul(&Mat33::translation(-center))
    }

    /// A rotation by `angle` radians about `center`.
    pub fn z_rotation(angle: f64, center: Vec2) -> Self {
        let (sin, cos) = angle.sin_cos();
        let rot = Mat33::new(
            cos, -sin, 0.0,
            sin, cos, 0.0,
            0.0, 0.0, 1.0,
        );
        Mat33::translation(center)
            .right_mul(&rot)
            .right_mul(&Mat33::translation(-center))
    }

    /// Returns the entry at `(row, col)`.
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.rows[row][col]
    }

    /// Returns `self · other`.
    ///
    /// The resulting transform applies `other` first, then `self`.
    pub fn right_mul(&self, other: &Mat33) -> Mat33 {
        let mut rows = [[0.0; 3]; 3];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.rows[i][0] * other.rows[0][j]
                    + self.rows[i][1] * other.rows[1][j]
                    + self.rows[i][2] * other.rows[2][j];
            }
        }
        Mat33 { rows }
    }

    /// Returns the determinant.
    pub fn determinant(&self) -> f64 {
        let m = &self.rows;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Computes the inverse transform.
    ///
    /// Fails with [`MatrixError::Singular`] when the determinant is near
    /// zero relative to the matrix magnitude.
    pub fn inverse(&self) -> Result<Mat33, MatrixError> {
        let m = &self.rows;
        let det = self.determinant();

        let mut scale = 0.0f64;
        for row in m.iter() {
            for v in row.iter() {
                scale = scale.max(v.abs());
            }
        }
        let threshold = 1e-12 * scale.max(1.0).powi(3);
        if det.abs() <= threshold {
            return Err(MatrixError::Singular);
        }

        let inv_det = 1.0 / det;
        let cofactor = |r0: usize, r1: usize, c0: usize, c1: usize| {
            m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
        };

        Ok(Mat33::new(
            cofactor(1, 2, 1, 2) * inv_det,
            -cofactor(0, 2, 1, 2) * inv_det,
            cofactor(0, 1, 1, 2) * inv_det,
            -cofactor(1, 2, 0, 2) * inv_det,
            cofactor(0, 2, 0, 2) * inv_det,
            -cofactor(0, 1, 0, 2) * inv_det,
            cofactor(1, 2, 0, 1) * inv_det,
            -cofactor(0, 2, 0, 1) * inv_det,
            cofactor(0, 1, 0, 1) * inv_det,
        ))
    }

    /// Transforms a point, treating it as `(x, y, 1)`.
    #[inline]
    pub fn transform_point(&self, p: Vec2) -> Vec2 {
        let m = &self.rows;
        let x = m[0][0] * p.x + m[0][1] * p.y + m[0][2];
        let y = m[1][0] * p.x + m[1][1] * p.y + m[1][2];
        let w = m[2][0] * p.x + m[2][1] * p.y + m[2][2];
        if w.fuzzy_eq(&1.0) || w == 0.0 {
            Vec2::new(x, y)
        } else {
            Vec2::new(x / w, y / w)
        }
    }

    /// Transforms a vector, taking the homogeneous coordinate from `v.z`.
    ///
    /// With `z = 0` this transforms a direction (translation is ignored).
    #[inline]
    pub fn transform_vec3(&self, v: Vec3) -> Vec3 {
        let m = &self.rows;
        Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    /// Returns `true` if this is (exactly) the identity transform.
    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Mat33::IDENTITY
    }

    /// Returns the average absolute scale factor of the affine part.
    pub fn scale_factor(&self) -> f64 {
        let m = &self.rows;
        (m[0][0] * m[1][1] - m[0][1] * m[1][0]).abs().sqrt()
    }

    /// Parses a CSS/SVG transform: `matrix(a,b,c,d,e,f)` and the
    /// `translate`/`scale`/`rotate`/`skewX`/`skewY` shorthands, possibly
    /// chained.
    ///
    /// `none` and the empty string parse to the identity.
    pub fn from_css_matrix(text: &str) -> Result<Mat33, MatrixError> {
        let text = text.trim();
        if text.is_empty() || text == "none" {
            return Ok(Mat33::IDENTITY);
        }

        let invalid = || MatrixError::InvalidMatrix(text.to_string());

        let mut result = Mat33::IDENTITY;
        let mut any = false;
        for token in svgtypes::TransformListParser::from(text) {
            let token = token.map_err(|_| invalid())?;
            let m = match token {
                svgtypes::TransformListToken::Matrix { a, b, c, d, e, f } => {
                    // CSS matrix(a,b,c,d,e,f) is column-major.
                    Mat33::new(
                        a, c, e,
                        b, d, f,
                        0.0, 0.0, 1.0,
                    )
                }
                svgtypes::TransformListToken::Translate { tx, ty } => {
                    Mat33::translation(Vec2::new(tx, ty))
                }
                svgtypes::TransformListToken::Scale { sx, sy } => {
                    Mat33::scaling_2d_xy(sx, sy, Vec2::ZERO)
                }
                svgtypes::TransformListToken::Rotate { angle } => {
                    Mat33::z_rotation(angle.to_radians(), Vec2::ZERO)
                }
                svgtypes::TransformListToken::SkewX { angle } => Mat33::new(
                    1.0, angle.to_radians().tan(), 0.0,
                    0.0, 1.0, 0.0,
                    0.0, 0.0, 1.0,
                ),
                svgtypes::TransformListToken::SkewY { angle } => Mat33::new(
                    1.0, 0.0, 0.0,
                    angle.to_radians().tan(), 1.0, 0.0,
                    0.0, 0.0, 1.0,
                ),
            };
            result = result.right_mul(&m);
            any = true;
        }

        if any {
            Ok(result)
        } else {
            Err(invalid())
        }
    }

    /// Serializes as a CSS `matrix(a,b,c,d,e,f)` string.
    pub fn to_css_matrix(&self) -> String {
        let m = &self.rows;
        format!(
            "matrix({},{},{},{},{},{})",
            m[0][0], m[1][0], m[0][1], m[1][1], m[0][2], m[1][2]
        )
    }

    /// Returns the nine entries, row by row.
    pub fn to_array(&self) -> [f64; 9] {
        let m = &self.rows;
        [
            m[0][0], m[0][1], m[0][2],
            m[1][0], m[1][1], m[1][2],
            m[2][0], m[2][1], m[2][2],
        ]
    }

    /// Builds a matrix from nine entries, row by row.
    pub fn from_array(v: &[f64; 9]) -> Mat33 {
        Mat33::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8])
    }
}

impl Default for Mat33 {
    #[inline]
    fn default() -> Self {
        Mat33::IDENTITY
    }
}

impl Mul for Mat33 {
    type Output = Mat33;

    #[inline]
    fn mul(self, rhs: Mat33) -> Mat33 {
        self.right_mul(&rhs)
    }
}

impl FuzzyEq for Mat33 {
    fn fuzzy_eq(&self, other: &Self) -> bool {
        for i in 0..3 {
            for j in 0..3 {
                if self.rows[i][j].fuzzy_ne(&other.rows[i][j]) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_roundtrip() {
        let m = Mat33::translation(Vec2::new(10.0, -4.0))
            .right_mul(&Mat33::scaling_2d(3.0, Vec2::new(1.0, 2.0)))
            .right_mul(&Mat33::z_rotation(0.3, Vec2::ZERO));
        let inv = m.inverse().unwrap();
        let p = Vec2::new(12.5, -7.25);
        let back = inv.transform_point(m.transform_point(p));
        assert!((back - p).length() < 1e-9);
    }

    #[test]
    fn singular_matrix_rejected() {
        let m = Mat33::new(
            1.0, 2.0, 3.0,
            2.0, 4.0, 6.0,
            0.0, 0.0, 1.0,
        );
        assert_eq!(m.inverse(), Err(MatrixError::Singular));
    }

    #[test]
    fn transform_vec3_ignores_translation_at_z0() {
        let m = Mat33::translation(Vec2::new(100.0, 50.0));
        let v = m.transform_vec3(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(v, Vec3::new(1.0, 0.0, 0.0));
        let p = m.transform_vec3(Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(p, Vec3::new(101.0, 50.0, 1.0));
    }

    #[test]
    fn parse_css_matrix() {
        let m = Mat33::from_css_matrix("matrix(1, 0, 0, 1, 10, 20)").unwrap();
        assert_eq!(m.transform_point(Vec2::ZERO), Vec2::new(10.0, 20.0));

        let m = Mat33::from_css_matrix("translate(5,6) scale(2)").unwrap();
        assert_eq!(m.transform_point(Vec2::new(1.0, 1.0)), Vec2::new(7.0, 8.0));

        assert!(Mat33::from_css_matrix("matrix(1,2,nope)").is_err());
        assert_eq!(Mat33::from_css_matrix(""), Ok(Mat33::IDENTITY));
    }

    #[test]
    fn css_matrix_roundtrip() {
        let m = Mat33::new(
            2.0, 0.5, 10.0,
            -0.5, 2.0, -3.0,
            0.0, 0.0, 1.0,
        );
        let back = Mat33::from_css_matrix(&m.to_css_matrix()).unwrap();
        assert!(m.fuzzy_eq(&back));
    }
}
