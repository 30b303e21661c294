// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::{CubicBezier, LineSegment2, Mat33, QuadraticBezier, Rect2, Vec2};

/// A path command in absolute coordinates.
///
/// Unlike the SVG spec, only `M`, `L`, `Q` and `C` exist here; everything
/// else is converted at parse time.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum PathCommand {
    MoveTo(Vec2),
    LineTo(Vec2),
    QuadraticCurveTo(Vec2, Vec2),
    CubicCurveTo(Vec2, Vec2, Vec2),
}

impl PathCommand {
    /// The command's endpoint.
    pub fn end_point(&self) -> Vec2 {
        match *self {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) => p,
            PathCommand::QuadraticCurveTo(_, p) => p,
            PathCommand::CubicCurveTo(_, _, p) => p,
        }
    }
}

/// A materialized path command: the geometry a command traces from its
/// start point.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug)]
pub enum PathGeometry {
    Line(LineSegment2),
    Quadratic(QuadraticBezier),
    Cubic(CubicBezier),
}

impl PathGeometry {
    /// The geometry's bounding box.
    pub fn bbox(&self) -> Rect2 {
        match self {
            PathGeometry::Line(seg) => seg.bbox(),
            PathGeometry::Quadratic(c) => c.bbox(),
            PathGeometry::Cubic(c) => c.bbox(),
        }
    }

    /// Approximate distance from `p` to the geometry.
    pub fn distance_to_point(&self, p: Vec2) -> f64 {
        match self {
            PathGeometry::Line(seg) => seg.distance_to_point(p),
            PathGeometry::Quadratic(c) => c.approximate_distance(p),
            PathGeometry::Cubic(c) => c.approximate_distance(p),
        }
    }

    /// Approximate length of the geometry.
    pub fn length(&self) -> f64 {
        match self {
            PathGeometry::Line(seg) => seg.length(),
            PathGeometry::Quadratic(c) => c.approximate_length(),
            PathGeometry::Cubic(c) => c.length(),
        }
    }
}

/// A path parsing error.
#[derive(Clone, PartialEq, Debug)]
pub enum PathParseError {
    /// The path uses a segment kind outside the M/L/H/V/C/Q/Z subset.
    UnsupportedSegment(char),
    /// Malformed path data.
    SyntaxError(String),
}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PathParseError::UnsupportedSegment(c) => {
                write!(f, "unsupported path segment '{}'", c)
            }
            PathParseError::SyntaxError(ref s) => {
                write!(f, "malformed path data '{}'", s)
            }
        }
    }
}

impl std::error::Error for PathParseError {}

/// An intersection between a path and a query segment.
#[derive(Clone, Copy, Debug)]
pub struct IntersectionResult {
    /// Index of the intersected command's geometry.
    pub curve_index: usize,
    /// Parameter on the intersected geometry, in `[0, 1]`.
    ///
    /// NaN for stroked-surface (raymarched) intersections.
    pub parameter_value: f64,
    /// The intersection point.
    pub point: Vec2,
}

#[derive(Clone, Default)]
struct PathCaches {
    geometry: Option<Rc<Vec<PathGeometry>>>,
    bbox: Option<Rect2>,
    string: Option<Rc<String>>,
}

/// A start point plus an ordered command sequence.
///
/// The geometry list, the bounding box, and the canonical string form are
/// computed lazily and cached; mutation resets the caches.
#[derive(Clone)]
pub struct Path {
    start: Vec2,
    commands: Vec<PathCommand>,
    caches: RefCell<PathCaches>,
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.commands == other.commands
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}

impl Path {
    /// Creates an empty path at `start`.
    pub fn new(start: Vec2) -> Self {
        Path {
            start,
            commands: Vec::new(),
            caches: RefCell::new(PathCaches::default()),
        }
    }

    /// Creates a path from a start point and commands.
    pub fn from_commands(start: Vec2, commands: Vec<PathCommand>) -> Self {
        Path {
            start,
            commands,
            caches: RefCell::new(PathCaches::default()),
        }
    }

    /// Creates a closed rectangle outline.
    pub fn from_rect(rect: Rect2) -> Self {
        let corners = rect.corners();
        Path::from_commands(
            corners[0],
            vec![
                PathCommand::LineTo(corners[1]),
                PathCommand::LineTo(corners[2]),
                PathCommand::LineTo(corners[3]),
                PathCommand::LineTo(corners[0]),
            ],
        )
    }

    /// The path's start point.
    #[inline]
    pub fn start(&self) -> Vec2 {
        self.start
    }

    /// The command list, excluding the implicit start.
    #[inline]
    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    /// Returns `true` if the path has no commands.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The endpoint of the last command (the start point when empty).
    pub fn end_point(&self) -> Vec2 {
        self.commands
            .last()
            .map(|c| c.end_point())
            .unwrap_or(self.start)
    }

    fn invalidate_caches(&mut self) {
        *self.caches.borrow_mut() = PathCaches::default();
    }

    /// Appends a MoveTo.
    pub fn push_move_to(&mut self, p: Vec2) {
        self.commands.push(PathCommand::MoveTo(p));
        self.invalidate_caches();
    }

    /// Appends a LineTo.
    pub fn push_line_to(&mut self, p: Vec2) {
        self.commands.push(PathCommand::LineTo(p));
        self.invalidate_caches();
    }

    /// Appends a quadratic curve.
    pub fn push_quad_to(&mut self, control: Vec2, end: Vec2) {
        self.commands.push(PathCommand::QuadraticCurveTo(control, end));
        self.invalidate_caches();
    }

    /// Appends a cubic curve.
    pub fn push_cubic_to(&mut self, c1: Vec2, c2: Vec2, end: Vec2) {
        self.commands.push(PathCommand::CubicCurveTo(c1, c2, end));
        self.invalidate_caches();
    }

    /// The lazily computed geometry list, one entry per command.
    ///
    /// MoveTo materializes as a degenerate line so indices stay aligned
    /// with [`Path::commands`].
    pub fn geometry(&self) -> Rc<Vec<PathGeometry>> {
        if let Some(ref cached) = self.caches.borrow().geometry {
            return Rc::clone(cached);
        }

        let mut list = Vec::with_capacity(self.commands.len());
        let mut cursor = self.start;
        for command in &self.commands {
            let geom = match *command {
                PathCommand::MoveTo(p) => PathGeometry::Line(LineSegment2::new(p, p)),
                PathCommand::LineTo(p) => {
                    PathGeometry::Line(LineSegment2::new(cursor, p))
                }
                PathCommand::QuadraticCurveTo(control, end) => {
                    PathGeometry::Quadratic(QuadraticBezier::new(cursor, control, end))
                }
                PathCommand::CubicCurveTo(c1, c2, end) => {
                    PathGeometry::Cubic(CubicBezier::new(cursor, c1, c2, end))
                }
            };
            list.push(geom);
            cursor = command.end_point();
        }

        let rc = Rc::new(list);
        self.caches.borrow_mut().geometry = Some(Rc::clone(&rc));
        rc
    }

    /// The union of every segment's bounding box.
    pub fn bbox(&self) -> Rect2 {
        if let Some(bbox) = self.caches.borrow().bbox {
            return bbox;
        }

        let mut bbox = Rect2::new(self.start.x, self.start.y, 0.0, 0.0);
        for geom in self.geometry().iter() {
            bbox = bbox.union(&geom.bbox());
        }
        self.caches.borrow_mut().bbox = Some(bbox);
        bbox
    }

    /// Sum of the approximate lengths of all segments.
    pub fn approximate_length(&self) -> f64 {
        self.geometry().iter().map(|g| g.length()).sum()
    }

    /// Approximate distance from `p` to the path's center line.
    pub fn distance_to_point(&self, p: Vec2) -> f64 {
        let mut best = (self.start - p).length();
        for geom in self.geometry().iter() {
            best = best.min(geom.distance_to_point(p));
        }
        best
    }

    /// Returns the path transformed by `transform`.
    pub fn transformed_by(&self, transform: &Mat33) -> Path {
        let map = |p: Vec2| transform.transform_point(p);
        let commands = self
            .commands
            .iter()
            .map(|command| match *command {
                PathCommand::MoveTo(p) => PathCommand::MoveTo(map(p)),
                PathCommand::LineTo(p) => PathCommand::LineTo(map(p)),
                PathCommand::QuadraticCurveTo(c, p) => {
                    PathCommand::QuadraticCurveTo(map(c), map(p))
                }
                PathCommand::CubicCurveTo(c1, c2, p) => {
                    PathCommand::CubicCurveTo(map(c1), map(c2), map(p))
                }
            })
            .collect();
        Path::from_commands(map(self.start), commands)
    }

    /// Computes the intersections of the path with `segment`.
    ///
    /// With `stroke_radius > 0`, raymarching finds intersections with the
    /// surface `stroke_radius` away from the center line instead; in that
    /// mode the reported parameter values are NaN and only the points are
    /// meaningful.
    pub fn intersection(
        &self,
        segment: &LineSegment2,
        stroke_radius: Option<f64>,
    ) -> Vec<IntersectionResult> {
        let radius = stroke_radius.unwrap_or(0.0);
        if !self
            .bbox()
            .grown_by(radius)
            .intersects(&segment.bbox().grown_by(radius))
        {
            return Vec::new();
        }

        let mut center_hits = Vec::new();
        for (index, geom) in self.geometry().iter().enumerate() {
            if !geom.bbox().grown_by(radius).intersects(&segment.bbox()) {
                continue;
            }

            match geom {
                PathGeometry::Line(path_seg) => {
                    if path_seg.length() == 0.0 {
                        continue;
                    }
                    if let Some((point, t)) = path_seg.intersection_with(segment) {
                        center_hits.push(IntersectionResult {
                            curve_index: index,
                            parameter_value: t,
                            point,
                        });
                    }
                }
                PathGeometry::Quadratic(curve) => {
                    for t in curve.intersections_with_segment(segment) {
                        center_hits.push(IntersectionResult {
                            curve_index: index,
                            parameter_value: t,
                            point: curve.at(t),
                        });
                    }
                }
                PathGeometry::Cubic(curve) => {
                    let pieces = curve.flattened(4);
                    let count = pieces.len() as f64;
                    for (i, piece) in pieces.iter().enumerate() {
                        if let Some((point, local_t)) = piece.intersection_with(segment) {
                            center_hits.push(IntersectionResult {
                                curve_index: index,
                                parameter_value: (i as f64 + local_t) / count,
                                point,
                            });
                        }
                    }
                }
            }
        }

        if radius <= 0.0 {
            return center_hits;
        }

        self.raymarch_intersection(segment, radius, &center_hits)
    }

    /// Finds points on `segment` at distance `radius` from the path by
    /// sphere tracing the center-line distance field.
    fn raymarch_intersection(
        &self,
        segment: &LineSegment2,
        radius: f64,
        center_hits: &[IntersectionResult],
    ) -> Vec<IntersectionResult> {
        const MAX_ITERATIONS: u32 = 6;

        let seg_len = segment.length();
        if seg_len == 0.0 {
            return Vec::new();
        }

        let tolerance = radius / 10.0;
        let param_of_point = |p: Vec2| {
            (p - segment.start).dot(segment.direction()) / (seg_len * seg_len)
        };

        // March from both segment endpoints inwards and from every
        // center-line hit in both directions.
        let mut starts: Vec<(f64, f64)> = vec![(0.0, 1.0), (1.0, -1.0)];
        for hit in center_hits {
            let t = param_of_point(hit.point);
            starts.push((t, 1.0));
            starts.push((t, -1.0));
        }

        let mut results: Vec<IntersectionResult> = Vec::new();
        for (start_t, direction) in starts {
            let mut t = start_t.max(0.0).min(1.0);
            for _ in 0..MAX_ITERATIONS {
                let p = segment.at(t);
                let sdf = self.distance_to_point(p) - radius;
                if sdf.abs() < tolerance {
                    let duplicate = results
                        .iter()
                        .any(|r| (r.point - p).length() <= tolerance * 2.0);
                    if !duplicate {
                        results.push(IntersectionResult {
                            curve_index: self.nearest_geometry_index(p),
                            parameter_value: f64::NAN,
                            point: p,
                        });
                    }
                    break;
                }

                t += direction * sdf / seg_len;
                if !(0.0..=1.0).contains(&t) {
                    break;
                }
            }
        }

        results
    }

    fn nearest_geometry_index(&self, p: Vec2) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, geom) in self.geometry().iter().enumerate() {
            let d = geom.distance_to_point(p);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    /// Returns a path that renders identically to `self` within
    /// `visible_rect`.
    ///
    /// Segments that cannot influence the visible region (their bounding
    /// box, grown by the stroke width, misses the visible rect grown to
    /// four times its size) are collapsed: stroke-only paths replace them
    /// with a MoveTo, filled paths with a LineTo so winding is preserved.
    /// Endpoints are kept either way.
    pub fn visual_equivalent(
        &self,
        visible_rect: Rect2,
        stroke_width: f64,
        has_fill: bool,
    ) -> Path {
        let expanded = visible_rect.grown_by(1.5 * visible_rect.max_dimension());

        let geometry = self.geometry();
        let mut commands = Vec::with_capacity(self.commands.len());
        for (command, geom) in self.commands.iter().zip(geometry.iter()) {
            let relevant = geom
                .bbox()
                .grown_by(stroke_width)
                .intersects(&expanded);
            if relevant {
                commands.push(*command);
            } else {
                let end = command.end_point();
                commands.push(if has_fill {
                    PathCommand::LineTo(end)
                } else {
                    PathCommand::MoveTo(end)
                });
            }
        }

        Path::from_commands(self.start, commands)
    }

    /// Parses the M/L/H/V/C/Q/Z subset of SVG path data.
    ///
    /// Lowercase commands are relative to the last emitted endpoint; `H`
    /// and `V` expand to `L`; `Z` emits a LineTo back to the subpath start.
    /// Arcs and the `T`/`S` shorthands are rejected.
    pub fn from_string(text: &str) -> Result<Path, PathParseError> {
        use svgtypes::PathSegment as Seg;

        let mut start: Option<Vec2> = None;
        let mut commands = Vec::new();

        // Previous MoveTo (for Z) and previous endpoint (for relative
        // coordinates).
        let mut subpath_start = Vec2::ZERO;
        let mut cursor = Vec2::ZERO;

        for segment in svgtypes::PathParser::from(text) {
            let segment = segment
                .map_err(|e| PathParseError::SyntaxError(e.to_string()))?;

            match segment {
                Seg::MoveTo { abs, mut x, mut y } => {
                    if !abs {
                        x += cursor.x;
                        y += cursor.y;
                    }
                    let p = Vec2::new(x, y);
                    if start.is_none() {
                        start = Some(p);
                    } else {
                        commands.push(PathCommand::MoveTo(p));
                    }
                    subpath_start = p;
                    cursor = p;
                }
                Seg::LineTo { abs, mut x, mut y } => {
                    if !abs {
                        x += cursor.x;
                        y += cursor.y;
                    }
                    let p = Vec2::new(x, y);
                    commands.push(PathCommand::LineTo(p));
                    cursor = p;
                }
                Seg::HorizontalLineTo { abs, mut x } => {
                    if !abs {
                        x += cursor.x;
                    }
                    let p = Vec2::new(x, cursor.y);
                    commands.push(PathCommand::LineTo(p));
                    cursor = p;
                }
                Seg::VerticalLineTo { abs, mut y } => {
                    if !abs {
                        y += cursor.y;
                    }
                    let p = Vec2::new(cursor.x, y);
                    commands.push(PathCommand::LineTo(p));
                    cursor = p;
                }
                Seg::Quadratic {
                    abs,
                    mut x1,
                    mut y1,
                    mut x,
                    mut y,
                } => {
                    if !abs {
                        x1 += cursor.x;
                        y1 += cursor.y;
                        x += cursor.x;
                        y += cursor.y;
                    }
                    let p = Vec2::new(x, y);
                    commands.push(PathCommand::QuadraticCurveTo(Vec2::new(x1, y1), p));
                    cursor = p;
                }
                Seg::CurveTo {
                    abs,
                    mut x1,
                    mut y1,
                    mut x2,
                    mut y2,
                    mut x,
                    mut y,
                } => {
                    if !abs {
                        x1 += cursor.x;
                        y1 += cursor.y;
                        x2 += cursor.x;
                        y2 += cursor.y;
                        x += cursor.x;
                        y += cursor.y;
                    }
                    let p = Vec2::new(x, y);
                    commands.push(PathCommand::CubicCurveTo(
                        Vec2::new(x1, y1),
                        Vec2::new(x2, y2),
                        p,
                    ));
                    cursor = p;
                }
                Seg::ClosePath { .. } => {
                    commands.push(PathCommand::LineTo(subpath_start));
                    cursor = subpath_start;
                }
                Seg::SmoothQuadratic { .. } => {
                    return Err(PathParseError::UnsupportedSegment('T'));
                }
                Seg::SmoothCurveTo { .. } => {
                    return Err(PathParseError::UnsupportedSegment('S'));
                }
                Seg::EllipticalArc { .. } => {
                    return Err(PathParseError::UnsupportedSegment('A'));
                }
            }
        }

        // A path that opens with coordinates but no M is still anchored
        // somewhere; fall back to the origin.
        Ok(Path::from_commands(start.unwrap_or(Vec2::ZERO), commands))
    }

    fn serialize(&self) -> String {
        let bbox = self.bbox();
        let use_relative = bbox.x.abs() > 10.0 && bbox.y.abs() > 10.0;

        let mut out = String::new();
        out.push('M');
        write_point_absolute(&mut out, self.start);

        let mut cursor = self.start;
        for command in &self.commands {
            match *command {
                PathCommand::MoveTo(p) => {
                    if use_relative {
                        out.push('m');
                        write_points_relative(&mut out, &[p - cursor]);
                    } else {
                        out.push('M');
                        write_point_absolute(&mut out, p);
                    }
                }
                PathCommand::LineTo(p) => {
                    if use_relative {
                        out.push('l');
                        write_points_relative(&mut out, &[p - cursor]);
                    } else {
                        out.push('L');
                        write_point_absolute(&mut out, p);
                    }
                }
                PathCommand::QuadraticCurveTo(c, p) => {
                    if use_relative {
                        out.push('q');
                        write_points_relative(&mut out, &[c - cursor, p - cursor]);
                    } else {
                        out.push('Q');
                        write_point_absolute(&mut out, c);
                        out.push(' ');
                        write_point_absolute(&mut out, p);
                    }
                }
                PathCommand::CubicCurveTo(c1, c2, p) => {
                    if use_relative {
                        out.push('c');
                        write_points_relative(
                            &mut out,
                            &[c1 - cursor, c2 - cursor, p - cursor],
                        );
                    } else {
                        out.push('C');
                        write_point_absolute(&mut out, c1);
                        out.push(' ');
                        write_point_absolute(&mut out, c2);
                        out.push(' ');
                        write_point_absolute(&mut out, p);
                    }
                }
            }
            cursor = command.end_point();
        }

        out
    }
}

impl fmt::Display for Path {
    /// Writes the canonical SVG path-data form.
    ///
    /// The string is cached on first use.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref cached) = self.caches.borrow().string {
            return f.write_str(cached.as_str());
        }

        let text = self.serialize();
        let result = f.write_str(&text);
        self.caches.borrow_mut().string = Some(Rc::new(text));
        result
    }
}

fn write_point_absolute(out: &mut String, p: Vec2) {
    out.push_str(&format_coordinate(p.x));
    out.push(',');
    out.push_str(&format_coordinate(p.y));
}

/// Writes relative coordinate pairs, omitting a separator whenever the
/// next number starts with `-` (the sign already separates).
fn write_points_relative(out: &mut String, points: &[Vec2]) {
    let mut first_of_command = true;
    for p in points {
        for (i, value) in [p.x, p.y].iter().enumerate() {
            let text = format_coordinate(*value);
            let needs_separator = !(first_of_command && i == 0) && !text.starts_with('-');
            if needs_separator {
                out.push(if i == 0 { ' ' } else { ',' });
            }
            out.push_str(&text);
        }
        first_of_command = false;
    }
}

/// Formats a coordinate, undoing float-print artifacts.
///
/// Two repair passes: a run of ≥4 nines in the fractional part rounds up
/// (carrying into the integer part); a run of ≥4 zeroes truncates the
/// artifact digits that follow it.
pub fn format_coordinate(value: f64) -> String {
    let text = format!("{}", value);
    if !text.contains('.') {
        return text;
    }

    let (sign, unsigned) = if let Some(stripped) = text.strip_prefix('-') {
        ("-", stripped)
    } else {
        ("", text.as_str())
    };

    let mut parts = unsigned.splitn(2, '.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next().unwrap_or("");

    let repaired = if let Some(run_start) = find_artifact_run(frac_part, '9') {
        round_up_at(int_part, &frac_part[..run_start])
    } else if let Some(run_start) = find_artifact_run(frac_part, '0') {
        (int_part.to_string(), frac_part[..run_start].to_string())
    } else {
        (int_part.to_string(), frac_part.to_string())
    };

    let (int_result, mut frac_result) = repaired;
    while frac_result.ends_with('0') {
        frac_result.pop();
    }

    let mut result = String::new();
    // The sign of a repaired -0.00000001 would be misleading.
    if !(int_result == "0" && frac_result.is_empty() && sign == "-") {
        result.push_str(sign);
    }
    result.push_str(&int_result);
    if !frac_result.is_empty() {
        result.push('.');
        result.push_str(&frac_result);
    }
    result
}

/// Finds the start of the last run of ≥4 repeated `digit`s such that only
/// arbitrary digits (the artifact) follow the run. Returns the run's start
/// index in `frac`.
fn find_artifact_run(frac: &str, digit: char) -> Option<usize> {
    let bytes = frac.as_bytes();
    let target = digit as u8;

    let mut run_end = bytes.len();
    while run_end > 0 {
        // Find the next run of `digit` ending before `run_end`.
        let mut end = run_end;
        while end > 0 && bytes[end - 1] != target {
            end -= 1;
        }
        if end == 0 {
            return None;
        }
        let mut begin = end;
        while begin > 0 && bytes[begin - 1] == target {
            begin -= 1;
        }
        if end - begin >= 4 {
            return Some(begin);
        }
        run_end = begin;
    }
    None
}

/// Increments the decimal number `int_part.frac_kept` in its last kept
/// digit, carrying as needed.
fn round_up_at(int_part: &str, frac_kept: &str) -> (String, String) {
    let mut frac: Vec<u8> = frac_kept.bytes().collect();
    let mut carry = true;
    for digit in frac.iter_mut().rev() {
        if !carry {
            break;
        }
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            carry = false;
        }
    }

    let mut int_digits: Vec<u8> = int_part.bytes().collect();
    if carry {
        for digit in int_digits.iter_mut().rev() {
            if !carry {
                break;
            }
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
            }
        }
        if carry {
            int_digits.insert(0, b'1');
        }
    }

    (
        String::from_utf8(int_digits).unwrap_or_default(),
        String::from_utf8(frac).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(text: &str) -> Path {
        Path::from_string(text).unwrap()
    }

    #[test]
    fn parse_basic_commands() {
        let p = path("M0,0 L100,100 L0,100");
        assert_eq!(p.start(), Vec2::new(0.0, 0.0));
        assert_eq!(p.commands().len(), 2);
        assert_eq!(p.end_point(), Vec2::new(0.0, 100.0));
    }

    #[test]
    fn parse_relative_and_shorthand() {
        let p = path("m10,10 l5,0 h5 v-10 q5,0 5,5 z");
        assert_eq!(p.start(), Vec2::new(10.0, 10.0));
        assert_eq!(
            p.commands(),
            &[
                PathCommand::LineTo(Vec2::new(15.0, 10.0)),
                PathCommand::LineTo(Vec2::new(20.0, 10.0)),
                PathCommand::LineTo(Vec2::new(20.0, 0.0)),
                PathCommand::QuadraticCurveTo(Vec2::new(25.0, 0.0), Vec2::new(25.0, 5.0)),
                // Z emits a LineTo back to the subpath start.
                PathCommand::LineTo(Vec2::new(10.0, 10.0)),
            ]
        );
    }

    #[test]
    fn parse_svg_separator_rules() {
        // '-' starts a new number; 'e' keeps it part of the exponent.
        let p = path("M10-20l30.1.5.1-20");
        assert_eq!(p.start(), Vec2::new(10.0, -20.0));
        assert_eq!(
            p.commands(),
            &[
                PathCommand::LineTo(Vec2::new(40.1, -19.5)),
                PathCommand::LineTo(Vec2::new(40.2, -39.5)),
            ]
        );

        let p = path("M1e1,2e-1L2,3");
        assert_eq!(p.start(), Vec2::new(10.0, 0.2));
    }

    #[test]
    fn parse_rejects_unsupported_segments() {
        assert_eq!(
            Path::from_string("M0,0 A5,5 0 0 1 10,10"),
            Err(PathParseError::UnsupportedSegment('A'))
        );
        assert_eq!(
            Path::from_string("M0,0 T10,10"),
            Err(PathParseError::UnsupportedSegment('T'))
        );
        assert_eq!(
            Path::from_string("M0,0 S1,1 2,2"),
            Err(PathParseError::UnsupportedSegment('S'))
        );
        assert!(Path::from_string("M0,nope").is_err());
    }

    #[test]
    fn bbox_unions_segment_bboxes() {
        let p = path("M0,0 Q1,2 2,0 L5,1");
        let bbox = p.bbox();
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.y, 0.0);
        assert_eq!(bbox.w, 5.0);
        assert!((bbox.h - 1.0).abs() < 1e-12);
    }

    #[test]
    fn intersection_two_hits() {
        let p = path("M0,0 L100,100 L0,100");
        let seg = LineSegment2::new(Vec2::new(50.0, -200.0), Vec2::new(50.0, 200.0));
        let hits = p.intersection(&seg, None);
        assert_eq!(hits.len(), 2);
        let mut ys: Vec<f64> = hits.iter().map(|h| h.point.y).collect();
        ys.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((ys[0] - 50.0).abs() < 1e-9);
        assert!((ys[1] - 100.0).abs() < 1e-9);
        for hit in &hits {
            assert!((hit.point.x - 50.0).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&hit.parameter_value));
        }
    }

    #[test]
    fn intersection_after_translation() {
        // The same triangle shifted left of the origin.
        let p = path("M0,0 L100,100 L0,100")
            .transformed_by(&Mat33::translation(Vec2::new(-100.0, 0.0)));
        let seg = LineSegment2::new(Vec2::new(-50.0, 200.0), Vec2::new(-50.0, -200.0));
        let hits = p.intersection(&seg, None);
        assert_eq!(hits.len(), 2);

        let mut ys: Vec<f64> = hits.iter().map(|h| h.point.y).collect();
        ys.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((ys[0] - 50.0).abs() < 1e-9);
        assert!((ys[1] - 100.0).abs() < 1e-9);
        assert!(hits.iter().all(|h| (h.point.x + 50.0).abs() < 1e-9));
    }

    #[test]
    fn intersection_outside_bbox_is_empty() {
        let p = path("M0,0 L100,100");
        let seg = LineSegment2::new(Vec2::new(500.0, 0.0), Vec2::new(500.0, 100.0));
        assert!(p.intersection(&seg, None).is_empty());
    }

    #[test]
    fn raymarched_intersection_returns_surface_points() {
        let p = path("M0,0 L100,0");
        let seg = LineSegment2::new(Vec2::new(50.0, -50.0), Vec2::new(50.0, 50.0));
        let hits = p.intersection(&seg, Some(10.0));
        assert!(!hits.is_empty());
        for hit in &hits {
            assert!(hit.parameter_value.is_nan());
            let sdf = (p.distance_to_point(hit.point) - 10.0).abs();
            assert!(sdf < 1.0, "point {:?} too far from surface", hit.point);
        }
    }

    #[test]
    fn tostring_rounding_repair() {
        let p = path("M0.100000001,0.199999999 Q9999,-10.999999995 0.000300001,1.400000002");
        assert_eq!(p.to_string(), "M0.1,0.2Q9999,-11 0.0003,1.4");
    }

    #[test]
    fn tostring_uses_relative_far_from_origin() {
        let p = path("M100,100 L110,100 L110,90");
        let text = p.to_string();
        assert_eq!(text, "M100,100l10,0l0-10");
        // Round-trips to the same path.
        assert_eq!(path(&text), p);
    }

    #[test]
    fn tostring_is_cached_and_canonical() {
        let p = path("M0,0 L10,0");
        let a = p.to_string();
        let b = p.to_string();
        assert_eq!(a, b);
        assert_eq!(a, "M0,0L10,0");
    }

    #[test]
    fn roundtrip_preserves_coordinates_to_4_decimals() {
        let texts = [
            "M0,0L10,0Q5,5 1.25,3.5",
            "M-100,-250l10.5,0.25q8,8 1.125,3.0625c1,2 3,4 5,6",
            "M0.5,0.5C1,1 2,2 3,3",
        ];
        for text in texts.iter() {
            let p = path(text);
            let reparsed = path(&p.to_string());
            assert_eq!(p.commands().len(), reparsed.commands().len());
            assert!((p.start() - reparsed.start()).length() < 1e-4);
            for (a, b) in p.commands().iter().zip(reparsed.commands().iter()) {
                assert!((a.end_point() - b.end_point()).length() < 1e-4);
            }
        }
    }

    #[test]
    fn format_coordinate_repairs() {
        assert_eq!(format_coordinate(0.100000001), "0.1");
        assert_eq!(format_coordinate(0.199999999), "0.2");
        assert_eq!(format_coordinate(-10.999999995), "-11");
        assert_eq!(format_coordinate(0.000300001), "0.0003");
        assert_eq!(format_coordinate(1.400000002), "1.4");
        assert_eq!(format_coordinate(9999.0), "9999");
        assert_eq!(format_coordinate(12.999995), "13");
        assert_eq!(format_coordinate(0.1234), "0.1234");
        assert_eq!(format_coordinate(-0.5), "-0.5");
    }

    #[test]
    fn visual_equivalent_replaces_offscreen_segments() {
        let p = path("M0,0 L10,0 L1000,0 L1000,10");
        let visible = Rect2::new(0.0, 0.0, 20.0, 20.0);

        let stroked = p.visual_equivalent(visible, 1.0, false);
        assert_eq!(
            stroked.commands()[2],
            PathCommand::MoveTo(Vec2::new(1000.0, 10.0))
        );

        let filled = p.visual_equivalent(visible, 1.0, true);
        assert_eq!(
            filled.commands()[2],
            PathCommand::LineTo(Vec2::new(1000.0, 10.0))
        );

        // Endpoints preserved either way.
        assert_eq!(stroked.end_point(), p.end_point());
        assert_eq!(filled.end_point(), p.end_point());
    }
}
