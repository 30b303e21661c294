// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Online stroke synthesis: timed pointer samples in, piecewise-quadratic
//! ribbons out.
//!
//! The builder is a pure state machine. Each accepted sample refits one
//! provisional quadratic; when the fit tolerance is exceeded the
//! provisional curve is frozen and a new segment starts with C¹
//! continuity through the recorded exit tangent.

use inkboard_geom::{Color, LineSegment2, Path, PathCommand, QuadraticBezier, Rect2, Vec2};

use crate::component::{Stroke, StrokePart};
use crate::render::RenderablePathSpec;
use crate::style::RenderingStyle;

/// Momentum smoothing factor: how strongly the latest instantaneous
/// velocity pulls the running estimate.
const MOMENTUM_LERP: f64 = 0.9;

/// Runs split when adjacent segment tangents disagree more than this.
const RUN_CONTINUITY_THRESHOLD: f64 = 0.3;

/// A timed, pressure-sized pointer sample in canvas coordinates.
#[derive(Clone, Copy, Debug)]
pub struct StrokeSample {
    #[allow(missing_docs)]
    pub pos: Vec2,
    /// Stroke width at this sample, in canvas units.
    pub width: f64,
    #[allow(missing_docs)]
    pub color: Color,
    /// Timestamp in milliseconds.
    pub time: f64,
}

/// A frozen quadratic segment with interpolated widths.
#[derive(Clone, Copy, Debug)]
struct FinalizedSegment {
    curve: QuadraticBezier,
    start_width: f64,
    end_width: f64,
}

/// Converts pointer samples into a [`Stroke`] component.
pub struct StrokeBuilder {
    start: StrokeSample,
    min_fit: f64,
    max_fit: f64,

    segments: Vec<FinalizedSegment>,

    segment_start_pos: Vec2,
    buffer: Vec<Vec2>,
    last_sample: StrokeSample,
    momentum: Vec2,
    current_curve: Option<QuadraticBezier>,
    previous_curve: Option<QuadraticBezier>,
    last_exit_direction: Option<Vec2>,
    curve_start_width: f64,
    curve_end_width: f64,
    bbox: Rect2,
}

impl StrokeBuilder {
    /// Starts a stroke at `first_sample`.
    ///
    /// `min_fit`/`max_fit` bound the allowed deviation between buffered
    /// samples and the fitted curve, in canvas units. `min_fit` is
    /// additionally lowered to half the stroke width so thin strokes
    /// stay precise.
    pub fn new(first_sample: StrokeSample, min_fit: f64, max_fit: f64) -> Self {
        let radius = first_sample.width / 2.0;
        StrokeBuilder {
            start: first_sample,
            min_fit: min_fit.min(first_sample.width / 2.0),
            max_fit,
            segments: Vec::new(),
            segment_start_pos: first_sample.pos,
            buffer: vec![first_sample.pos],
            last_sample: first_sample,
            momentum: Vec2::ZERO,
            current_curve: None,
            previous_curve: None,
            last_exit_direction: None,
            curve_start_width: first_sample.width,
            curve_end_width: first_sample.width,
            bbox: Rect2::new(
                first_sample.pos.x - radius,
                first_sample.pos.y - radius,
                radius * 2.0,
                radius * 2.0,
            ),
        }
    }

    /// The region the stroke occupies so far, including widths.
    #[inline]
    pub fn bbox(&self) -> Rect2 {
        self.bbox
    }

    /// Feeds one sample.
    pub fn add_point(&mut self, sample: StrokeSample) {
        if sample.pos.has_nan() || sample.width.is_nan() || sample.time.is_nan() {
            log::warn!("ignoring a NaN stroke sample");
            return;
        }
        // Zero-Δt and duplicate samples carry no direction information.
        if sample.time <= self.last_sample.time {
            return;
        }
        if sample.pos == self.last_sample.pos {
            return;
        }

        // A pointer hovering at the start point builds a round dot
        // rather than a jittery first segment.
        let snap_radius = self.last_sample.width.min(sample.width) / 3.0;
        if self.segments.is_empty()
            && self.current_curve.is_none()
            && (sample.pos - self.start.pos).length() < snap_radius
        {
            self.curve_end_width = self.curve_end_width.max(sample.width);
            self.last_sample = StrokeSample {
                pos: self.start.pos,
                ..sample
            };
            return;
        }

        let delta_time = sample.time - self.last_sample.time;
        let velocity = (sample.pos - self.last_sample.pos) / delta_time;
        self.momentum = self.momentum.lerp(velocity, MOMENTUM_LERP);

        let radius = sample.width / 2.0;
        self.bbox = self.bbox.union(&Rect2::new(
            sample.pos.x - radius,
            sample.pos.y - radius,
            radius * 2.0,
            radius * 2.0,
        ));

        self.buffer.push(sample.pos);
        let previous_end_width = self.curve_end_width;
        self.curve_end_width = sample.width;

        self.previous_curve = self.current_curve;
        self.refit_curve(sample.pos);

        if self.buffer.len() > 3 {
            if let Some(curve) = self.current_curve {
                if curve.approximate_length() > self.curve_start_width
                    && !self.curve_fits(&curve)
                {
                    // The new sample broke the fit: roll it back, freeze
                    // the previous curve, then restart from its endpoint
                    // with the last two points.
                    self.current_curve = self.previous_curve;
                    self.curve_end_width = previous_end_width;
                    self.buffer.pop();
                    self.finalize_current_curve();
                    self.add_point(sample);
                    return;
                }
            }
        }

        self.last_sample = sample;
    }

    /// Whether every buffered point lies close enough to `curve`.
    fn curve_fits(&self, curve: &QuadraticBezier) -> bool {
        let min_width = self.curve_start_width.min(self.curve_end_width);
        let threshold = (min_width / 3.0).max(self.min_fit).min(self.max_fit);

        self.buffer
            .iter()
            .all(|point| curve.approximate_distance(*point) <= threshold)
    }

    /// Rebuilds the provisional curve through the current segment.
    ///
    /// The control point sits at the intersection of the entering and
    /// exiting tangent rays; parallel or degenerate rays fall back to a
    /// third-of-chord control.
    fn refit_curve(&mut self, end: Vec2) {
        let start = self.segment_start_pos;
        let chord_vec = end - start;
        let chord = chord_vec.length();
        if chord == 0.0 {
            return;
        }

        let entering = match self.last_exit_direction {
            Some(direction) => direction,
            None => {
                let probe = self.buffer[2.min(self.buffer.len() - 1)];
                let estimate = probe - self.buffer[0];
                if estimate.length_squared() > 0.0 {
                    estimate.normalized()
                } else {
                    chord_vec.normalized()
                }
            }
        };

        let exiting = if self.momentum.length_squared() > 0.0 {
            self.momentum.normalized()
        } else {
            chord_vec.normalized()
        };

        let ray_length = 2.0 * chord;
        let from_start = LineSegment2::new(start, start + entering * ray_length);
        let from_end = LineSegment2::new(end, end - exiting * ray_length);

        let fallback = start + entering * (chord / 3.0);
        let control = match from_start.intersection_with(&from_end) {
            Some((point, _)) => {
                let coincides = (point - start).length() < chord * 1e-9
                    || (point - end).length() < chord * 1e-9;
                if coincides {
                    fallback
                } else {
                    point
                }
            }
            None => fallback,
        };

        self.current_curve = Some(QuadraticBezier::new(start, control, end));
    }

    /// Freezes the provisional curve as a finished segment.
    fn finalize_current_curve(&mut self) {
        let curve = match self.current_curve.take() {
            Some(curve) => curve,
            None => return,
        };

        self.last_exit_direction = Some(curve.derivative_at(1.0).normalized());
        self.segments.push(FinalizedSegment {
            curve,
            start_width: self.curve_start_width,
            end_width: self.curve_end_width,
        });

        self.segment_start_pos = curve.p2;
        self.buffer = vec![curve.p2];
        self.curve_start_width = self.curve_end_width;
        self.previous_curve = None;
    }

    /// The work-in-progress renderables, for the wet-ink preview.
    pub fn preview(&self) -> Vec<RenderablePathSpec> {
        let mut segments = self.segments.clone();
        if let Some(curve) = self.current_curve {
            segments.push(FinalizedSegment {
                curve,
                start_width: self.curve_start_width,
                end_width: self.curve_end_width,
            });
        }

        let style = RenderingStyle::fill_only(self.start.color);
        if segments.is_empty() {
            return vec![RenderablePathSpec {
                path: dot_path(
                    self.start.pos,
                    dot_radius(self.effective_dot_width()),
                    self.min_fit,
                ),
                style,
            }];
        }

        build_ribbon_parts(&segments, self.start.color)
            .into_iter()
            .map(|part| RenderablePathSpec {
                path: part.path,
                style: part.style,
            })
            .collect()
    }

    fn effective_dot_width(&self) -> f64 {
        self.start.width.max(self.curve_end_width)
    }

    /// Finalizes the stroke.
    pub fn build(mut self) -> Stroke {
        self.finalize_current_curve();

        let parts = if self.segments.is_empty() {
            // The pointer never left the start: emit a round dot.
            vec![StrokePart {
                path: dot_path(
                    self.start.pos,
                    dot_radius(self.effective_dot_width()),
                    self.min_fit,
                ),
                style: RenderingStyle::fill_only(self.start.color),
            }]
        } else {
            build_ribbon_parts(&self.segments, self.start.color)
        };

        Stroke::new(parts)
    }
}

fn dot_radius(width: f64) -> f64 {
    width / 3.5
}

/// Rounds `value` onto the fit-tolerance grid so stationary dots
/// serialize compactly.
fn snap_to_grid(value: f64, grid: f64) -> f64 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}

/// A 4-quadrant quadratic approximation of a circle.
fn dot_path(center: Vec2, radius: f64, grid: f64) -> Path {
    let radius = snap_to_grid(radius, grid).max(grid.max(1e-3));
    let center = Vec2::new(snap_to_grid(center.x, grid), snap_to_grid(center.y, grid));

    let east = center + Vec2::new(radius, 0.0);
    let south = center + Vec2::new(0.0, radius);
    let west = center - Vec2::new(radius, 0.0);
    let north = center - Vec2::new(0.0, radius);

    Path::from_commands(
        east,
        vec![
            PathCommand::QuadraticCurveTo(center + Vec2::new(radius, radius), south),
            PathCommand::QuadraticCurveTo(center + Vec2::new(-radius, radius), west),
            PathCommand::QuadraticCurveTo(center + Vec2::new(-radius, -radius), north),
            PathCommand::QuadraticCurveTo(center + Vec2::new(radius, -radius), east),
        ],
    )
}

/// One segment's offset curves plus its tangents, ready for stitching.
struct RibbonSegment {
    outer: QuadraticBezier,
    inner: QuadraticBezier,
    enter_direction: Vec2,
    exit_direction: Vec2,
}

fn offset_segment(segment: &FinalizedSegment) -> RibbonSegment {
    let curve = segment.curve;
    let normal_start = curve.normal_at(0.0);
    let normal_mid = curve.normal_at(0.5);
    let normal_end = curve.normal_at(1.0);

    let half_start = segment.start_width / 2.0;
    let half_end = segment.end_width / 2.0;
    // The control point is off-curve; offsetting it by the mid-curve
    // half-normal keeps the ribbon width close to the target.
    let half_mid = (half_start + half_end) / 2.0;

    RibbonSegment {
        outer: QuadraticBezier::new(
            curve.p0 + normal_start * half_start,
            curve.p1 + normal_mid * half_mid,
            curve.p2 + normal_end * half_end,
        ),
        inner: QuadraticBezier::new(
            curve.p0 - normal_start * half_start,
            curve.p1 - normal_mid * half_mid,
            curve.p2 - normal_end * half_end,
        ),
        enter_direction: curve.derivative_at(0.0).normalized(),
        exit_direction: curve.derivative_at(1.0).normalized(),
    }
}

/// Whether a segment's offset curves cross each other: the stroke is
/// wider than the curvature allows, so stitching it into a longer run
/// would self-intersect.
fn offsets_cross(segment: &RibbonSegment) -> bool {
    let outer_chord = LineSegment2::new(segment.outer.p0, segment.outer.p2);
    let inner_chord = LineSegment2::new(segment.inner.p0, segment.inner.p2);
    outer_chord.intersection_with(&inner_chord).is_some()
}

/// Stitches consecutive offset segments into closed ribbons, splitting
/// runs at direction breaks and self-crossing offsets.
fn build_ribbon_parts(segments: &[FinalizedSegment], color: Color) -> Vec<StrokePart> {
    let offsets: Vec<RibbonSegment> = segments.iter().map(offset_segment).collect();
    let style = RenderingStyle::fill_only(color);

    let mut parts = Vec::new();
    let mut run_start = 0;
    for i in 1..=offsets.len() {
        let break_run = if i == offsets.len() {
            true
        } else {
            let continuity = offsets[i - 1]
                .exit_direction
                .dot(offsets[i].enter_direction);
            continuity < RUN_CONTINUITY_THRESHOLD
                || offsets_cross(&offsets[i])
                || offsets_cross(&offsets[i - 1])
        };

        if break_run {
            parts.push(StrokePart {
                path: ribbon_path(&offsets[run_start..i]),
                style,
            });
            run_start = i;
        }
    }

    parts
}

/// The closed outline of one run: outer curves forward, a cap, inner
/// curves backward, a closing cap.
fn ribbon_path(run: &[RibbonSegment]) -> Path {
    debug_assert!(!run.is_empty());

    let mut commands = Vec::new();
    let start = run[0].outer.p0;

    for (i, segment) in run.iter().enumerate() {
        if i > 0 && run[i - 1].outer.p2 != segment.outer.p0 {
            commands.push(PathCommand::LineTo(segment.outer.p0));
        }
        commands.push(PathCommand::QuadraticCurveTo(
            segment.outer.p1,
            segment.outer.p2,
        ));
    }

    let last = run.len() - 1;
    commands.push(PathCommand::LineTo(run[last].inner.p2));

    for (i, segment) in run.iter().enumerate().rev() {
        commands.push(PathCommand::QuadraticCurveTo(
            segment.inner.p1,
            segment.inner.p0,
        ));
        if i > 0 && run[i - 1].inner.p2 != segment.inner.p0 {
            commands.push(PathCommand::LineTo(run[i - 1].inner.p2));
        }
    }

    commands.push(PathCommand::LineTo(start));
    Path::from_commands(start, commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_geom::FuzzyEq;

    fn sample(x: f64, y: f64, width: f64, time: f64) -> StrokeSample {
        StrokeSample {
            pos: Vec2::new(x, y),
            width,
            color: Color::BLACK,
            time,
        }
    }

    #[test]
    fn straight_stroke_produces_expected_ribbon() {
        let mut builder = StrokeBuilder::new(sample(0.0, 0.0, 2.0, 0.0), 0.5, 2.0);
        builder.add_point(sample(10.0, 0.0, 2.0, 50.0));
        builder.add_point(sample(20.0, 0.0, 2.0, 100.0));

        let stroke = builder.build();
        assert_eq!(stroke.parts().len(), 1);

        let bbox = stroke.bbox();
        assert!(bbox.fuzzy_eq(&Rect2::new(0.0, -1.0, 20.0, 2.0)), "bbox {:?}", bbox);

        let serialized = stroke.parts()[0].path.to_string();
        assert!(
            serialized.starts_with("M0,1") || serialized.starts_with("M0,-1"),
            "serialized: {}",
            serialized
        );
        assert!(serialized.contains('Q'), "serialized: {}", serialized);
    }

    #[test]
    fn samples_stay_within_max_fit_of_center_line() {
        let max_fit = 2.0;
        let mut builder = StrokeBuilder::new(sample(0.0, 0.0, 2.0, 0.0), 0.5, max_fit);

        // A wavy polyline with plenty of direction changes.
        let mut fed = vec![Vec2::new(0.0, 0.0)];
        for i in 1..40 {
            let x = i as f64 * 3.0;
            let y = (i as f64 * 0.7).sin() * 10.0;
            builder.add_point(sample(x, y, 2.0, i as f64 * 15.0));
            fed.push(Vec2::new(x, y));
        }

        let stroke = builder.build();
        assert!(!stroke.parts().is_empty());

        // Center-line distance: approximate using the ribbon outline.
        // A sample within `max_fit` of the center line is within
        // `max_fit + width/2` of the outline's nearest edge.
        for point in fed.iter() {
            let distance = stroke
                .parts()
                .iter()
                .map(|part| part.path.distance_to_point(*point))
                .fold(f64::INFINITY, f64::min);
            assert!(
                distance <= max_fit + 1.5,
                "sample {:?} is {} away from the ribbon",
                point,
                distance
            );
        }
    }

    #[test]
    fn stationary_pointer_builds_a_dot() {
        let mut builder = StrokeBuilder::new(sample(5.0, 5.0, 3.5, 0.0), 0.5, 2.0);
        builder.add_point(sample(5.1, 5.0, 3.5, 10.0));
        builder.add_point(sample(5.0, 5.1, 3.5, 20.0));

        let stroke = builder.build();
        assert_eq!(stroke.parts().len(), 1);

        let path = &stroke.parts()[0].path;
        // Four quadratic quadrants.
        let quads = path
            .commands()
            .iter()
            .filter(|c| matches!(c, PathCommand::QuadraticCurveTo(_, _)))
            .count();
        assert_eq!(quads, 4);

        // Radius ≈ width / 3.5 = 1, snapped to the 0.5 grid.
        let bbox = path.bbox();
        assert!((bbox.w - 2.0).abs() < 0.51, "bbox {:?}", bbox);
    }

    #[test]
    fn rejects_nan_and_stale_samples() {
        let mut builder = StrokeBuilder::new(sample(0.0, 0.0, 2.0, 0.0), 0.5, 2.0);
        builder.add_point(sample(f64::NAN, 0.0, 2.0, 10.0));
        builder.add_point(sample(10.0, 0.0, 2.0, 0.0)); // zero Δt
        builder.add_point(sample(0.0, 0.0, 2.0, 20.0)); // duplicate of last pos

        // Nothing was accepted, so the stroke is a dot.
        let stroke = builder.build();
        let bbox = stroke.bbox();
        assert!(bbox.w < 3.0, "bbox {:?}", bbox);
    }

    #[test]
    fn discontinuous_tangents_split_runs() {
        // Two finalized segments meeting at a hard reversal.
        let forward = FinalizedSegment {
            curve: QuadraticBezier::new(
                Vec2::new(0.0, 0.0),
                Vec2::new(10.0, 0.0),
                Vec2::new(20.0, 0.0),
            ),
            start_width: 2.0,
            end_width: 2.0,
        };
        let backward = FinalizedSegment {
            curve: QuadraticBezier::new(
                Vec2::new(20.0, 0.0),
                Vec2::new(10.0, 0.5),
                Vec2::new(0.0, 1.0),
            ),
            start_width: 2.0,
            end_width: 2.0,
        };

        let parts = build_ribbon_parts(&[forward, backward], Color::BLACK);
        assert_eq!(parts.len(), 2);

        // Collinear continuation keeps a single run.
        let continued = FinalizedSegment {
            curve: QuadraticBezier::new(
                Vec2::new(20.0, 0.0),
                Vec2::new(30.0, 0.0),
                Vec2::new(40.0, 0.0),
            ),
            start_width: 2.0,
            end_width: 2.0,
        };
        let parts = build_ribbon_parts(&[forward, continued], Color::BLACK);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn preview_matches_final_shape_for_simple_strokes() {
        let mut builder = StrokeBuilder::new(sample(0.0, 0.0, 2.0, 0.0), 0.5, 2.0);
        builder.add_point(sample(10.0, 0.0, 2.0, 50.0));
        builder.add_point(sample(20.0, 0.0, 2.0, 100.0));

        let preview = builder.preview();
        assert_eq!(preview.len(), 1);

        let built = builder.build();
        assert_eq!(preview[0].path.to_string(), built.parts()[0].path.to_string());
    }
}
