// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::{FuzzyEq, Mat33, Vec2};

/// An axis-aligned rectangle with non-negative size.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Rect2 {
    /// The leftmost coordinate.
    pub x: f64,
    /// The topmost coordinate.
    pub y: f64,
    /// The width. Always ≥ 0.
    pub w: f64,
    /// The height. Always ≥ 0.
    pub h: f64,
}

impl Rect2 {
    /// The empty rectangle at the origin.
    pub const EMPTY: Rect2 = Rect2 {
        x: 0.0,
        y: 0.0,
        w: 0.0,
        h: 0.0,
    };

    /// Creates a rectangle, normalizing negative sizes.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        let (x, w) = if w < 0.0 { (x + w, -w) } else { (x, w) };
        let (y, h) = if h < 0.0 { (y + h, -h) } else { (y, h) };
        Rect2 { x, y, w, h }
    }

    /// Creates the smallest rectangle containing both corners.
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        let tl = a.min(b);
        let br = a.max(b);
        Rect2::new(tl.x, tl.y, br.x - tl.x, br.y - tl.y)
    }

    /// Creates the bounding box of a point set.
    ///
    /// Returns the empty rectangle for an empty set.
    pub fn bounding_box_of(points: &[Vec2]) -> Self {
        let mut iter = points.iter();
        let first = match iter.next() {
            Some(p) => *p,
            None => return Rect2::EMPTY,
        };

        let mut tl = first;
        let mut br = first;
        for p in iter {
            tl = tl.min(*p);
            br = br.max(*p);
        }
        Rect2::from_corners(tl, br)
    }

    /// The top-left corner.
    #[inline]
    pub fn top_left(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// The bottom-right corner.
    #[inline]
    pub fn bottom_right(&self) -> Vec2 {
        Vec2::new(self.x + self.w, self.y + self.h)
    }

    /// The center point.
    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// The size as a vector.
    #[inline]
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.w, self.h)
    }

    /// The area.
    #[inline]
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// The larger of width and height.
    #[inline]
    pub fn max_dimension(&self) -> f64 {
        self.w.max(self.h)
    }

    /// The smaller of width and height.
    #[inline]
    pub fn min_dimension(&self) -> f64 {
        self.w.min(self.h)
    }

    /// All four corners: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Vec2; 4] {
        [
            Vec2::new(self.x, self.y),
            Vec2::new(self.x + self.w, self.y),
            Vec2::new(self.x + self.w, self.y + self.h),
            Vec2::new(self.x, self.y + self.h),
        ]
    }

    /// Returns `true` if `p` lies inside or on the boundary.
    #[inline]
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.x
            && p.y >= self.y
            && p.x <= self.x + self.w
            && p.y <= self.y + self.h
    }

    /// Returns `true` if `other` lies entirely inside `self`.
    pub fn contains_rect(&self, other: &Rect2) -> bool {
        self.contains_point(other.top_left()) && self.contains_point(other.bottom_right())
    }

    /// Returns `true` if the rectangles overlap (boundaries count).
    pub fn intersects(&self, other: &Rect2) -> bool {
        self.x <= other.x + other.w
            && other.x <= self.x + self.w
            && self.y <= other.y + other.h
            && other.y <= self.y + self.h
    }

    /// Returns the overlapping region, if any.
    pub fn intersection(&self, other: &Rect2) -> Option<Rect2> {
        if !self.intersects(other) {
            return None;
        }

        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = (self.x + self.w).min(other.x + other.w);
        let bottom = (self.y + self.h).min(other.y + other.h);
        Some(Rect2::new(x, y, right - x, bottom - y))
    }

    /// Returns the smallest rectangle containing both.
    pub fn union(&self, other: &Rect2) -> Rect2 {
        Rect2::from_corners(
            self.top_left().min(other.top_left()),
            self.bottom_right().max(other.bottom_right()),
        )
    }

    /// Returns the rectangle grown by `margin` on every side.
    ///
    /// Negative margins shrink; the result is clamped to a point at the
    /// center when over-shrunk.
    pub fn grown_by(&self, margin: f64) -> Rect2 {
        if margin == 0.0 {
            return *self;
        }

        let margin = margin.max(-self.w / 2.0).max(-self.h / 2.0);
        Rect2::new(
            self.x - margin,
            self.y - margin,
            self.w + margin * 2.0,
            self.h + margin * 2.0,
        )
    }

    /// Returns the rectangle translated by `amount`.
    pub fn translated_by(&self, amount: Vec2) -> Rect2 {
        Rect2::new(self.x + amount.x, self.y + amount.y, self.w, self.h)
    }

    /// Returns the bounding box of the affine-transformed corners.
    pub fn transformed_bounding_box(&self, transform: &Mat33) -> Rect2 {
        let corners = self.corners();
        let mut tl = transform.transform_point(corners[0]);
        let mut br = tl;
        for corner in corners.iter().skip(1) {
            let p = transform.transform_point(*corner);
            tl = tl.min(p);
            br = br.max(p);
        }
        Rect2::from_corners(tl, br)
    }

    /// Divides the rectangle into a `cols` × `rows` grid of equal cells,
    /// listed row by row.
    pub fn divide_into_grid(&self, cols: usize, rows: usize) -> Vec<Rect2> {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let cell_w = self.w / cols as f64;
        let cell_h = self.h / rows as f64;

        let mut result = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                result.push(Rect2::new(
                    self.x + cell_w * col as f64,
                    self.y + cell_h * row as f64,
                    cell_w,
                    cell_h,
                ));
            }
        }
        result
    }

    /// Returns `true` if the rectangle has zero area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w == 0.0 || self.h == 0.0
    }
}

impl FuzzyEq for Rect2 {
    fn fuzzy_eq(&self, other: &Self) -> bool {
        self.x.fuzzy_eq(&other.x)
            && self.y.fuzzy_eq(&other.y)
            && self.w.fuzzy_eq(&other.w)
            && self.h.fuzzy_eq(&other.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_sizes_normalize() {
        let r = Rect2::new(10.0, 10.0, -4.0, -6.0);
        assert_eq!(r, Rect2::new(6.0, 4.0, 4.0, 6.0));
    }

    #[test]
    fn intersection_and_union() {
        let a = Rect2::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect2::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersection(&b), Some(Rect2::new(5.0, 5.0, 5.0, 5.0)));
        assert_eq!(a.union(&b), Rect2::new(0.0, 0.0, 15.0, 15.0));

        let far = Rect2::new(100.0, 100.0, 1.0, 1.0);
        assert_eq!(a.intersection(&far), None);
    }

    #[test]
    fn transformed_bbox_recomputes_aabb() {
        let r = Rect2::new(0.0, 0.0, 2.0, 2.0);
        let rotated =
            r.transformed_bounding_box(&Mat33::z_rotation(std::f64::consts::FRAC_PI_4, r.center()));
        let expected_size = 2.0 * std::f64::consts::SQRT_2;
        assert!((rotated.w - expected_size).abs() < 1e-9);
        assert!((rotated.h - expected_size).abs() < 1e-9);
        assert!((rotated.center() - r.center()).length() < 1e-9);
    }

    #[test]
    fn grid_division_covers_rect() {
        let r = Rect2::new(0.0, 0.0, 30.0, 20.0);
        let cells = r.divide_into_grid(3, 2);
        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0], Rect2::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(cells[5], Rect2::new(20.0, 10.0, 10.0, 10.0));

        let union = cells.iter().fold(cells[0], |acc, c| acc.union(c));
        assert!(union.fuzzy_eq(&r));
    }
}
