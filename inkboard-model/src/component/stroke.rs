// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The stroke component: one or more closed-ribbon outlines.

use serde_json::{json, Value};

use inkboard_geom::{LineSegment2, Mat33, Path, Rect2};

use crate::command::CommandError;
use crate::component::{Component, ComponentData};
use crate::render::{RenderablePathSpec, Renderer};
use crate::style::RenderingStyle;

/// One ribbon of a stroke: a path and the style it is painted with.
#[derive(Clone, PartialEq, Debug)]
pub struct StrokePart {
    #[allow(missing_docs)]
    pub path: Path,
    #[allow(missing_docs)]
    pub style: RenderingStyle,
}

impl StrokePart {
    fn stroke_radius(&self) -> f64 {
        self.style.stroke.map_or(0.0, |s| s.width / 2.0)
    }

    fn bbox(&self) -> Rect2 {
        self.path.bbox().grown_by(self.stroke_radius())
    }
}

/// A pen stroke: a sequence of filled (and possibly outlined) ribbons
/// rendered as one object.
#[derive(Clone, Debug)]
pub struct Stroke {
    pub(crate) data: ComponentData,
    parts: Vec<StrokePart>,
    bbox: Rect2,
}

impl Stroke {
    /// Creates a stroke from its parts.
    pub fn new(parts: Vec<StrokePart>) -> Self {
        let bbox = Self::bbox_of_parts(&parts);
        Stroke {
            data: ComponentData::new(),
            parts,
            bbox,
        }
    }

    fn bbox_of_parts(parts: &[StrokePart]) -> Rect2 {
        let mut iter = parts.iter();
        let first = match iter.next() {
            Some(part) => part.bbox(),
            None => return Rect2::EMPTY,
        };
        iter.fold(first, |acc, part| acc.union(&part.bbox()))
    }

    /// The stroke's ribbons.
    #[inline]
    pub fn parts(&self) -> &[StrokePart] {
        &self.parts
    }

    /// The stroke's bounding box, including stroke widths.
    #[inline]
    pub fn bbox(&self) -> Rect2 {
        self.bbox
    }

    /// Renders the stroke, simplifying ribbons that extend far outside
    /// `visible_rect`.
    pub fn render(&self, renderer: &mut dyn Renderer, visible_rect: Option<&Rect2>) {
        renderer.start_object(&self.bbox, false);
        for part in &self.parts {
            let spec = match visible_rect {
                // Only pay for the visual-equivalence scan when most of
                // the stroke is off screen.
                Some(visible) if !visible.contains_rect(&part.bbox()) => RenderablePathSpec {
                    path: part.path.visual_equivalent(
                        *visible,
                        part.stroke_radius() * 2.0,
                        !part.style.fill.is_transparent(),
                    ),
                    style: part.style,
                },
                _ => RenderablePathSpec {
                    path: part.path.clone(),
                    style: part.style,
                },
            };
            renderer.draw_path(&spec);
        }
        renderer.end_object(Some(&self.data.load_save_data));
    }

    /// Returns `true` if `segment` touches any ribbon. Stroked parts
    /// test against the stroked surface, filled parts against the
    /// center line.
    pub fn intersects(&self, segment: &LineSegment2) -> bool {
        for part in &self.parts {
            let radius = part.stroke_radius();
            let stroke_radius = if radius > 0.0 { Some(radius) } else { None };
            if !part.path.intersection(segment, stroke_radius).is_empty() {
                return true;
            }
        }
        false
    }

    /// Transforms every ribbon, scaling stroke widths accordingly.
    pub fn transform_by(&mut self, transform: &Mat33) {
        let width_scale = transform.scale_factor();
        for part in &mut self.parts {
            part.path = part.path.transformed_by(transform);
            if let Some(ref mut stroke) = part.style.stroke {
                stroke.width *= width_scale;
            }
        }
        self.bbox = Self::bbox_of_parts(&self.parts);
    }

    /// Applies `style` to every ribbon.
    pub fn force_style(&mut self, style: &RenderingStyle) {
        for part in &mut self.parts {
            part.style = *style;
        }
    }

    pub(crate) fn serialize_data(&self) -> Value {
        let parts: Vec<Value> = self
            .parts
            .iter()
            .map(|part| {
                json!({
                    "path": part.path.to_string(),
                    "style": part.style.to_json(),
                })
            })
            .collect();
        json!({ "parts": parts })
    }
}

pub(crate) fn deserialize(value: &Value) -> Result<Component, CommandError> {
    let parts_value = value
        .get("parts")
        .and_then(Value::as_array)
        .ok_or_else(|| CommandError::InvalidData("stroke: missing parts".into()))?;

    let mut parts = Vec::with_capacity(parts_value.len());
    for part in parts_value {
        let path_text = part
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| CommandError::InvalidData("stroke: missing path".into()))?;
        let path = Path::from_string(path_text)
            .map_err(|e| CommandError::InvalidData(format!("stroke: {}", e)))?;
        let style = RenderingStyle::from_json(
            part.get("style")
                .ok_or_else(|| CommandError::InvalidData("stroke: missing style".into()))?,
        )?;
        parts.push(StrokePart { path, style });
    }

    Ok(Component::Stroke(Stroke::new(parts)))
}
