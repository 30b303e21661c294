// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::{Rect2, Vec2};

/// A 2D line segment from `start` to `end`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct LineSegment2 {
    #[allow(missing_docs)]
    pub start: Vec2,
    #[allow(missing_docs)]
    pub end: Vec2,
}

impl LineSegment2 {
    /// Creates a new segment.
    #[inline]
    pub fn new(start: Vec2, end: Vec2) -> Self {
        LineSegment2 { start, end }
    }

    /// The segment length.
    #[inline]
    pub fn length(&self) -> f64 {
        (self.end - self.start).length()
    }

    /// The (non-normalized) direction from start to end.
    #[inline]
    pub fn direction(&self) -> Vec2 {
        self.end - self.start
    }

    /// The point at parameter `t ∈ [0, 1]`.
    #[inline]
    pub fn at(&self, t: f64) -> Vec2 {
        self.start.lerp(self.end, t)
    }

    /// The segment's bounding box.
    pub fn bbox(&self) -> Rect2 {
        Rect2::from_corners(self.start, self.end)
    }

    /// Computes the intersection with `other`.
    ///
    /// Returns the intersection point and the parameter on `self` at which
    /// it occurs. Collinear overlaps report the first touching endpoint.
    pub fn intersection_with(&self, other: &LineSegment2) -> Option<(Vec2, f64)> {
        let r = self.direction();
        let s = other.direction();
        let q_minus_p = other.start - self.start;
        let denom = r.cross(s);

        if denom == 0.0 {
            // Parallel. Only collinear segments can still touch.
            if q_minus_p.cross(r) != 0.0 {
                return None;
            }

            let r_len2 = r.length_squared();
            if r_len2 == 0.0 {
                if (other.start - self.start).length_squared() == 0.0 {
                    return Some((self.start, 0.0));
                }
                return None;
            }

            let t0 = q_minus_p.dot(r) / r_len2;
            let t1 = t0 + s.dot(r) / r_len2;
            let (lo, hi) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
            if hi < 0.0 || lo > 1.0 {
                return None;
            }

            let t = lo.max(0.0);
            return Some((self.at(t), t));
        }

        let t = q_minus_p.cross(s) / denom;
        let u = q_minus_p.cross(r) / denom;
        let eps = 1e-12;
        if t < -eps || t > 1.0 + eps || u < -eps || u > 1.0 + eps {
            return None;
        }

        let t = t.max(0.0).min(1.0);
        Some((self.at(t), t))
    }

    /// Returns the point on the segment closest to `p`.
    pub fn closest_point_to(&self, p: Vec2) -> Vec2 {
        let dir = self.direction();
        let len2 = dir.length_squared();
        if len2 == 0.0 {
            return self.start;
        }

        let t = ((p - self.start).dot(dir) / len2).max(0.0).min(1.0);
        self.at(t)
    }

    /// Returns the distance from `p` to the segment.
    #[inline]
    pub fn distance_to_point(&self, p: Vec2) -> f64 {
        (self.closest_point_to(p) - p).length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_segments_intersect() {
        let a = LineSegment2::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        let b = LineSegment2::new(Vec2::new(0.0, 10.0), Vec2::new(10.0, 0.0));
        let (p, t) = a.intersection_with(&b).unwrap();
        assert!((p - Vec2::new(5.0, 5.0)).length() < 1e-12);
        assert!((t - 0.5).abs() < 1e-12);
    }

    #[test]
    fn disjoint_parallel_segments_do_not_intersect() {
        let a = LineSegment2::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let b = LineSegment2::new(Vec2::new(0.0, 1.0), Vec2::new(10.0, 1.0));
        assert_eq!(a.intersection_with(&b), None);
    }

    #[test]
    fn collinear_overlap_reports_first_touch() {
        let a = LineSegment2::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let b = LineSegment2::new(Vec2::new(5.0, 0.0), Vec2::new(15.0, 0.0));
        let (p, t) = a.intersection_with(&b).unwrap();
        assert_eq!(p, Vec2::new(5.0, 0.0));
        assert!((t - 0.5).abs() < 1e-12);
    }

    #[test]
    fn closest_point_clamps_to_endpoints() {
        let seg = LineSegment2::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        assert_eq!(seg.closest_point_to(Vec2::new(-5.0, 3.0)), Vec2::new(0.0, 0.0));
        assert_eq!(seg.closest_point_to(Vec2::new(4.0, 3.0)), Vec2::new(4.0, 0.0));
        assert_eq!(seg.distance_to_point(Vec2::new(4.0, 3.0)), 3.0);
    }
}
