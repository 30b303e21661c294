// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Text components. Shaping is out of scope; extents come from a
//! host-provided metrics source.

use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use inkboard_geom::{LineSegment2, Mat33, Rect2, Vec2};

use crate::command::CommandError;
use crate::component::{Component, ComponentData};
use crate::render::Renderer;
use crate::style::TextRenderingStyle;

/// Supplies glyph extents for text layout.
///
/// Implementations must be cheap; the scene queries them whenever a text
/// component's bounding box is recomputed.
pub trait TextMetricsProvider: Send + Sync {
    /// The untransformed bounding box of `text` rendered with `style`.
    fn size_of_text(&self, text: &str, style: &TextRenderingStyle) -> Rect2;
}

/// The fallback estimator: character boxes proportional to font size.
struct CharBoxMetrics;

impl TextMetricsProvider for CharBoxMetrics {
    fn size_of_text(&self, text: &str, style: &TextRenderingStyle) -> Rect2 {
        let advance = style.size * 0.6;
        let width = advance * text.chars().count() as f64;
        // Text anchors at the baseline; ascent above, descent below.
        Rect2::new(0.0, -style.size * 0.8, width, style.size)
    }
}

static TEXT_METRICS: Lazy<RwLock<Box<dyn TextMetricsProvider>>> =
    Lazy::new(|| RwLock::new(Box::new(CharBoxMetrics)));

/// Replaces the process-wide text metrics source.
pub fn set_text_metrics_provider(provider: Box<dyn TextMetricsProvider>) {
    *TEXT_METRICS.write().unwrap() = provider;
}

/// Measures `text` using the current metrics source.
pub fn text_size_of(text: &str, style: &TextRenderingStyle) -> Rect2 {
    TEXT_METRICS.read().unwrap().size_of_text(text, style)
}

/// A child of a text component: a run of characters or a nested
/// component (an SVG `<tspan>`).
#[derive(Clone, Debug)]
pub enum TextChild {
    #[allow(missing_docs)]
    Text(String),
    #[allow(missing_docs)]
    Component(TextComponent),
}

/// A positioned block of text.
#[derive(Clone, Debug)]
pub struct TextComponent {
    pub(crate) data: ComponentData,
    children: Vec<TextChild>,
    transform: Mat33,
    style: TextRenderingStyle,
    bbox: Rect2,
}

impl TextComponent {
    /// Creates a text component from its children.
    pub fn new(children: Vec<TextChild>, transform: Mat33, style: TextRenderingStyle) -> Self {
        let bbox = Self::compute_bbox(&children, &transform, &style);
        TextComponent {
            data: ComponentData::new(),
            children,
            transform,
            style,
            bbox,
        }
    }

    /// Creates a single-run text component.
    pub fn from_text(text: &str, transform: Mat33, style: TextRenderingStyle) -> Self {
        TextComponent::new(vec![TextChild::Text(text.to_string())], transform, style)
    }

    fn compute_bbox(
        children: &[TextChild],
        transform: &Mat33,
        style: &TextRenderingStyle,
    ) -> Rect2 {
        let mut result: Option<Rect2> = None;
        for child in children {
            let child_bbox = match child {
                TextChild::Text(text) => {
                    text_size_of(text, style).transformed_bounding_box(transform)
                }
                TextChild::Component(nested) => {
                    nested.bbox().transformed_bounding_box(transform)
                }
            };
            result = Some(match result {
                Some(acc) => acc.union(&child_bbox),
                None => child_bbox,
            });
        }
        result.unwrap_or(Rect2::EMPTY)
    }

    /// The component's bounding box.
    #[inline]
    pub fn bbox(&self) -> Rect2 {
        self.bbox
    }

    /// The text styling.
    #[inline]
    pub fn style(&self) -> &TextRenderingStyle {
        &self.style
    }

    /// The positioning transform.
    #[inline]
    pub fn transform(&self) -> &Mat33 {
        &self.transform
    }

    /// The child runs/spans.
    #[inline]
    pub fn children(&self) -> &[TextChild] {
        &self.children
    }

    /// Total number of character runs, including nested ones.
    pub fn leaf_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                TextChild::Text(_) => 1,
                TextChild::Component(nested) => nested.leaf_count(),
            })
            .sum()
    }

    /// The first few characters, for descriptions.
    pub fn text_preview(&self) -> String {
        let mut preview = String::new();
        self.collect_text(&mut preview);
        if preview.chars().count() > 20 {
            let truncated: String = preview.chars().take(20).collect();
            format!("{}…", truncated)
        } else {
            preview
        }
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                TextChild::Text(text) => out.push_str(text),
                TextChild::Component(nested) => nested.collect_text(out),
            }
        }
    }

    /// Renders the text as one object, leaf runs first to last.
    pub fn render(&self, renderer: &mut dyn Renderer) {
        renderer.start_object(&self.bbox, false);
        self.render_runs(renderer, &self.transform);
        renderer.end_object(Some(&self.data.load_save_data));
    }

    fn render_runs(&self, renderer: &mut dyn Renderer, transform: &Mat33) {
        for child in &self.children {
            match child {
                TextChild::Text(text) => renderer.draw_text(text, transform, &self.style),
                TextChild::Component(nested) => {
                    let composed = transform.right_mul(&nested.transform);
                    nested.render_runs(renderer, &composed);
                }
            }
        }
    }

    /// Bounding-box intersection test: the box outline or interior.
    pub fn intersects(&self, segment: &LineSegment2) -> bool {
        bbox_intersects_segment(&self.bbox, segment)
    }

    /// Composes `transform` onto the component's position.
    pub fn transform_by(&mut self, transform: &Mat33) {
        self.transform = transform.right_mul(&self.transform);
        self.bbox = Self::compute_bbox(&self.children, &self.transform, &self.style);
    }

    pub(crate) fn serialize_data(&self) -> Value {
        let children: Vec<Value> = self
            .children
            .iter()
            .map(|child| match child {
                TextChild::Text(text) => json!({ "text": text }),
                TextChild::Component(nested) => json!({ "child": nested.serialize_data() }),
            })
            .collect();

        json!({
            "children": children,
            "transform": self.transform.to_array().to_vec(),
            "style": self.style.to_json(),
        })
    }
}

/// Shared bbox-edge test used by text and image components.
pub(crate) fn bbox_intersects_segment(bbox: &Rect2, segment: &LineSegment2) -> bool {
    if !bbox.intersects(&segment.bbox()) {
        return false;
    }
    if bbox.contains_point(segment.start) || bbox.contains_point(segment.end) {
        return true;
    }

    let corners = bbox.corners();
    for i in 0..4 {
        let edge = LineSegment2::new(corners[i], corners[(i + 1) % 4]);
        if edge.intersection_with(segment).is_some() {
            return true;
        }
    }
    false
}

pub(crate) fn transform_from_value(value: Option<&Value>) -> Result<Mat33, CommandError> {
    let entries = value
        .and_then(Value::as_array)
        .ok_or_else(|| CommandError::InvalidData("missing transform".into()))?;
    if entries.len() != 9 {
        return Err(CommandError::InvalidData(
            "transform must have 9 entries".into(),
        ));
    }

    let mut array = [0.0f64; 9];
    for (slot, entry) in array.iter_mut().zip(entries.iter()) {
        *slot = entry
            .as_f64()
            .ok_or_else(|| CommandError::InvalidData("non-numeric transform entry".into()))?;
    }
    Ok(Mat33::from_array(&array))
}

fn child_from_value(value: &Value) -> Result<TextChild, CommandError> {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return Ok(TextChild::Text(text.to_string()));
    }
    if let Some(nested) = value.get("child") {
        if let Component::Text(text) = deserialize(nested)? {
            return Ok(TextChild::Component(text));
        }
    }
    Err(CommandError::InvalidData("text: malformed child".into()))
}

pub(crate) fn deserialize(value: &Value) -> Result<Component, CommandError> {
    let children_value = value
        .get("children")
        .and_then(Value::as_array)
        .ok_or_else(|| CommandError::InvalidData("text: missing children".into()))?;

    let mut children = Vec::with_capacity(children_value.len());
    for child in children_value {
        children.push(child_from_value(child)?);
    }

    let transform = transform_from_value(value.get("transform"))?;
    let style = TextRenderingStyle::from_json(
        value
            .get("style")
            .ok_or_else(|| CommandError::InvalidData("text: missing style".into()))?,
    )?;

    Ok(Component::Text(TextComponent::new(
        children, transform, style,
    )))
}
