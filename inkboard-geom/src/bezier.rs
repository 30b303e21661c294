// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use kurbo::{ParamCurve, ParamCurveArclen, ParamCurveExtrema};

use crate::{LineSegment2, Rect2, Vec2};

/// A quadratic Bézier curve with control points `p0`, `p1`, `p2`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct QuadraticBezier {
    #[allow(missing_docs)]
    pub p0: Vec2,
    #[allow(missing_docs)]
    pub p1: Vec2,
    #[allow(missing_docs)]
    pub p2: Vec2,
}

impl QuadraticBezier {
    /// Creates a new curve.
    #[inline]
    pub fn new(p0: Vec2, p1: Vec2, p2: Vec2) -> Self {
        QuadraticBezier { p0, p1, p2 }
    }

    /// The point at parameter `t ∈ [0, 1]`.
    #[inline]
    pub fn at(&self, t: f64) -> Vec2 {
        let mt = 1.0 - t;
        self.p0 * (mt * mt) + self.p1 * (2.0 * mt * t) + self.p2 * (t * t)
    }

    /// The first derivative at `t`.
    #[inline]
    pub fn derivative_at(&self, t: f64) -> Vec2 {
        (self.p1 - self.p0) * (2.0 * (1.0 - t)) + (self.p2 - self.p1) * (2.0 * t)
    }

    /// The unit normal at `t` (left of the travel direction).
    pub fn normal_at(&self, t: f64) -> Vec2 {
        let tangent = self.derivative_at(t);
        let tangent = if tangent.length_squared() == 0.0 {
            // Degenerate curve. Fall back to the chord direction.
            self.p2 - self.p0
        } else {
            tangent
        };
        tangent.orthog().normalized()
    }

    /// The tight bounding box, accounting for extrema.
    pub fn bbox(&self) -> Rect2 {
        let mut tl = self.p0.min(self.p2);
        let mut br = self.p0.max(self.p2);

        // Component-wise extremum at t = (p0 - p1) / (p0 - 2·p1 + p2).
        let denom_x = self.p0.x - 2.0 * self.p1.x + self.p2.x;
        let denom_y = self.p0.y - 2.0 * self.p1.y + self.p2.y;
        for (num, denom) in [
            (self.p0.x - self.p1.x, denom_x),
            (self.p0.y - self.p1.y, denom_y),
        ]
        .iter()
        {
            if *denom != 0.0 {
                let t = num / denom;
                if t > 0.0 && t < 1.0 {
                    let p = self.at(t);
                    tl = tl.min(p);
                    br = br.max(p);
                }
            }
        }

        Rect2::from_corners(tl, br)
    }

    /// A cheap over-estimate of the curve length.
    ///
    /// The true length lies between the chord and the control polygon;
    /// their average is within a few percent for non-degenerate curves.
    pub fn approximate_length(&self) -> f64 {
        let chord = (self.p2 - self.p0).length();
        let polygon = (self.p1 - self.p0).length() + (self.p2 - self.p1).length();
        (chord + polygon) / 2.0
    }

    /// Splits the curve at `t` into two quadratics.
    pub fn split_at(&self, t: f64) -> (QuadraticBezier, QuadraticBezier) {
        let a = self.p0.lerp(self.p1, t);
        let b = self.p1.lerp(self.p2, t);
        let mid = a.lerp(b, t);
        (
            QuadraticBezier::new(self.p0, a, mid),
            QuadraticBezier::new(mid, b, self.p2),
        )
    }

    /// Finds the parameter of the approximately closest point to `p`.
    ///
    /// The derivative of the squared distance is a cubic in `t`; it is
    /// truncated to its quadratic Maclaurin expansion and solved in closed
    /// form. The samples `{0.25, 0.75, 0, 1}` are always considered as
    /// fallbacks.
    pub fn nearest_t_to(&self, p: Vec2) -> f64 {
        let a = self.p0 - self.p1 * 2.0 + self.p2;
        let b = (self.p1 - self.p0) * 2.0;
        let c = self.p0 - p;

        // d/dt |B(t) - p|² / 2 = 2(a·a)t³ + 3(a·b)t² + (b·b + 2a·c)t + b·c
        let k2 = 3.0 * a.dot(b);
        let k1 = b.dot(b) + 2.0 * a.dot(c);
        let k0 = b.dot(c);

        let mut candidates = vec![0.0, 0.25, 0.75, 1.0];
        if k2 != 0.0 {
            let discriminant = k1 * k1 - 4.0 * k2 * k0;
            if discriminant >= 0.0 {
                let sqrt_d = discriminant.sqrt();
                candidates.push((-k1 + sqrt_d) / (2.0 * k2));
                candidates.push((-k1 - sqrt_d) / (2.0 * k2));
            }
        } else if k1 != 0.0 {
            candidates.push(-k0 / k1);
        }

        let mut best_t = 0.0;
        let mut best_dist = f64::INFINITY;
        for t in candidates {
            if !(0.0..=1.0).contains(&t) {
                continue;
            }
            let dist = (self.at(t) - p).length_squared();
            if dist < best_dist {
                best_dist = dist;
                best_t = t;
            }
        }
        best_t
    }

    /// Returns the approximate distance from `p` to the curve.
    #[inline]
    pub fn approximate_distance(&self, p: Vec2) -> f64 {
        (self.at(self.nearest_t_to(p)) - p).length()
    }

    /// Computes intersections with the infinite line through `segment`,
    /// keeping only parameters whose points lie on the segment itself.
    ///
    /// Returns curve parameters in `[0, 1]`.
    pub fn intersections_with_segment(&self, segment: &LineSegment2) -> Vec<f64> {
        let dir = segment.direction();
        if dir.length_squared() == 0.0 {
            return Vec::new();
        }

        // Line as n·p = d; substituting B(t) yields a quadratic in t.
        let n = dir.orthog();
        let d = n.dot(segment.start);

        let a = self.p0 - self.p1 * 2.0 + self.p2;
        let b = (self.p1 - self.p0) * 2.0;
        let qa = n.dot(a);
        let qb = n.dot(b);
        let qc = n.dot(self.p0) - d;

        let mut roots = Vec::new();
        let eps = 1e-9;
        if qa.abs() < eps {
            if qb.abs() >= eps {
                roots.push(-qc / qb);
            }
        } else {
            let discriminant = qb * qb - 4.0 * qa * qc;
            if discriminant >= 0.0 {
                let sqrt_d = discriminant.sqrt();
                roots.push((-qb + sqrt_d) / (2.0 * qa));
                roots.push((-qb - sqrt_d) / (2.0 * qa));
            }
        }

        let seg_len2 = dir.length_squared();
        roots.retain(|t| {
            if *t < -eps || *t > 1.0 + eps {
                return false;
            }
            // Verify the point actually lies on the queried segment.
            let p = self.at(t.max(0.0).min(1.0));
            let u = (p - segment.start).dot(dir) / seg_len2;
            if !(-eps..=1.0 + eps).contains(&u) {
                return false;
            }
            segment.distance_to_point(p) < 1e-6 * (1.0 + seg_len2.sqrt())
        });
        roots.iter_mut().for_each(|t| *t = t.max(0.0).min(1.0));
        roots
    }
}

/// A cubic Bézier curve.
///
/// Inkboard synthesizes quadratics; cubics only appear in loaded SVG
/// content, so the heavy lifting is delegated to `kurbo` here.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct CubicBezier {
    #[allow(missing_docs)]
    pub p0: Vec2,
    #[allow(missing_docs)]
    pub p1: Vec2,
    #[allow(missing_docs)]
    pub p2: Vec2,
    #[allow(missing_docs)]
    pub p3: Vec2,
}

impl CubicBezier {
    /// Creates a new curve.
    #[inline]
    pub fn new(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2) -> Self {
        CubicBezier { p0, p1, p2, p3 }
    }

    fn to_kurbo(self) -> kurbo::CubicBez {
        kurbo::CubicBez {
            p0: kurbo::Point::new(self.p0.x, self.p0.y),
            p1: kurbo::Point::new(self.p1.x, self.p1.y),
            p2: kurbo::Point::new(self.p2.x, self.p2.y),
            p3: kurbo::Point::new(self.p3.x, self.p3.y),
        }
    }

    /// The point at parameter `t ∈ [0, 1]`.
    pub fn at(&self, t: f64) -> Vec2 {
        let p = self.to_kurbo().eval(t);
        Vec2::new(p.x, p.y)
    }

    /// The tight bounding box.
    pub fn bbox(&self) -> Rect2 {
        let r = self.to_kurbo().bounding_box();
        Rect2::new(r.x0, r.y0, r.x1 - r.x0, r.y1 - r.y0)
    }

    /// The curve length, to moderate accuracy.
    pub fn length(&self) -> f64 {
        self.to_kurbo().arclen(0.5)
    }

    /// Approximates the curve as a polyline with `2^depth` pieces.
    pub fn flattened(&self, depth: u32) -> Vec<LineSegment2> {
        let steps = 1usize << depth;
        let mut result = Vec::with_capacity(steps);
        let mut prev = self.p0;
        for i in 1..=steps {
            let next = self.at(i as f64 / steps as f64);
            result.push(LineSegment2::new(prev, next));
            prev = next;
        }
        result
    }

    /// Returns the approximate distance from `p` to the curve.
    ///
    /// Coarse sampling with one local refinement pass. Good enough for
    /// hit-testing; not for exact geometry.
    pub fn approximate_distance(&self, p: Vec2) -> f64 {
        let curve = self.to_kurbo();
        let target = kurbo::Point::new(p.x, p.y);

        let mut best_t = 0.0;
        let mut best = f64::INFINITY;
        for i in 0..=16 {
            let t = i as f64 / 16.0;
            let d = curve.eval(t).distance(target);
            if d < best {
                best = d;
                best_t = t;
            }
        }

        let mut lo = (best_t - 1.0 / 16.0).max(0.0);
        let mut hi = (best_t + 1.0 / 16.0).min(1.0);
        for _ in 0..24 {
            let m1 = lo + (hi - lo) / 3.0;
            let m2 = hi - (hi - lo) / 3.0;
            if curve.eval(m1).distance(target) < curve.eval(m2).distance(target) {
                hi = m2;
            } else {
                lo = m1;
            }
        }
        let t = (lo + hi) / 2.0;
        best.min(curve.eval(t).distance(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_endpoints_and_midpoint() {
        let c = QuadraticBezier::new(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(2.0, 0.0),
        );
        assert_eq!(c.at(0.0), c.p0);
        assert_eq!(c.at(1.0), c.p2);
        assert_eq!(c.at(0.5), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn quadratic_bbox_includes_extremum() {
        let c = QuadraticBezier::new(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(2.0, 0.0),
        );
        let bbox = c.bbox();
        assert!((bbox.h - 1.0).abs() < 1e-12, "apex at y=1: {:?}", bbox);
        assert_eq!(bbox.w, 2.0);
    }

    #[test]
    fn nearest_point_on_symmetric_curve() {
        let c = QuadraticBezier::new(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(2.0, 0.0),
        );
        let t = c.nearest_t_to(Vec2::new(1.0, 5.0));
        assert!((t - 0.5).abs() < 0.1, "t = {}", t);

        // Endpoint fallbacks are considered.
        let t = c.nearest_t_to(Vec2::new(-10.0, 0.0));
        assert!(t < 0.05, "t = {}", t);
    }

    #[test]
    fn quadratic_segment_intersections() {
        let c = QuadraticBezier::new(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(2.0, 0.0),
        );
        // A vertical segment through the apex.
        let seg = LineSegment2::new(Vec2::new(1.0, -1.0), Vec2::new(1.0, 3.0));
        let ts = c.intersections_with_segment(&seg);
        assert_eq!(ts.len(), 1);
        assert!((ts[0] - 0.5).abs() < 1e-9);

        // A horizontal segment crossing both arms.
        let seg = LineSegment2::new(Vec2::new(-1.0, 0.5), Vec2::new(3.0, 0.5));
        let mut ts = c.intersections_with_segment(&seg);
        ts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(ts.len(), 2);
        assert!(ts[0] < 0.5 && ts[1] > 0.5);

        // A segment that misses.
        let seg = LineSegment2::new(Vec2::new(-1.0, 3.0), Vec2::new(3.0, 3.0));
        assert!(c.intersections_with_segment(&seg).is_empty());
    }

    #[test]
    fn cubic_bbox_and_distance() {
        let c = CubicBezier::new(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 4.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(4.0, 0.0),
        );
        let bbox = c.bbox();
        assert!(bbox.h > 2.5 && bbox.h <= 3.0 + 1e-9);

        let d = c.approximate_distance(Vec2::new(2.0, 10.0));
        assert!((d - 7.0).abs() < 0.1, "d = {}", d);
    }
}
