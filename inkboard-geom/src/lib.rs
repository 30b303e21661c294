// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
`inkboard-geom` is the geometry layer of the inkboard whiteboard engine.

It provides immutable 2D vectors, row-major 3×3 affine matrices,
axis-aligned rectangles, line segments, quadratic/cubic Bézier curves,
and a [`Path`] type with SVG path-data parsing, canonical serialization,
and exact intersection/distance queries.

All scalars are `f64`. Raster back-ends convert to `f32` at the last
moment.
*/

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use float_cmp::ApproxEqUlps;

mod bezier;
mod color;
mod mat33;
mod path;
mod rect;
mod segment;
mod vec2;

pub use bezier::{CubicBezier, QuadraticBezier};
pub use color::{Color, ColorParseError};
pub use mat33::{Mat33, MatrixError};
pub use path::{
    format_coordinate, IntersectionResult, Path, PathCommand, PathGeometry, PathParseError,
};
pub use rect::Rect2;
pub use segment::LineSegment2;
pub use vec2::{Vec2, Vec3};

/// A trait for fuzzy/approximate equality comparisons of float numbers.
pub trait FuzzyEq<Rhs: ?Sized = Self> {
    /// Returns `true` if values are approximately equal.
    fn fuzzy_eq(&self, other: &Rhs) -> bool;

    /// Returns `true` if values are not approximately equal.
    #[inline]
    fn fuzzy_ne(&self, other: &Rhs) -> bool {
        !self.fuzzy_eq(other)
    }
}

/// A trait for fuzzy/approximate comparisons of float numbers.
pub trait FuzzyZero: FuzzyEq {
    /// Returns `true` if the number is approximately zero.
    fn is_fuzzy_zero(&self) -> bool;
}

impl FuzzyEq for f64 {
    #[inline]
    fn fuzzy_eq(&self, other: &f64) -> bool {
        self.approx_eq_ulps(other, 4)
    }
}

impl FuzzyZero for f64 {
    #[inline]
    fn is_fuzzy_zero(&self) -> bool {
        self.fuzzy_eq(&0.0)
    }
}
