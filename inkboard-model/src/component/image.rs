// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Embedded raster images. The engine never decodes the payload; the
//! href stays opaque.

use serde_json::{json, Value};

use inkboard_geom::{LineSegment2, Mat33, Rect2, Vec2};

use crate::command::CommandError;
use crate::component::text::{bbox_intersects_segment, transform_from_value};
use crate::component::{Component, ComponentData};
use crate::render::{RenderableImage, Renderer};

/// An image positioned on the canvas.
#[derive(Clone, Debug)]
pub struct ImageComponent {
    pub(crate) data: ComponentData,
    href: String,
    label: Option<String>,
    size: Vec2,
    transform: Mat33,
    bbox: Rect2,
}

impl ImageComponent {
    /// Creates an image component.
    ///
    /// `size` is the image's natural size; `transform` positions the
    /// `(0, 0)..size` rectangle on the canvas.
    pub fn new(href: String, label: Option<String>, size: Vec2, transform: Mat33) -> Self {
        let bbox = Self::compute_bbox(size, &transform);
        ImageComponent {
            data: ComponentData::new(),
            href,
            label,
            size,
            transform,
            bbox,
        }
    }

    fn compute_bbox(size: Vec2, transform: &Mat33) -> Rect2 {
        Rect2::new(0.0, 0.0, size.x.max(0.0), size.y.max(0.0)).transformed_bounding_box(transform)
    }

    /// The image source (usually a data URL).
    #[inline]
    pub fn href(&self) -> &str {
        &self.href
    }

    /// The accessible label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The natural size.
    #[inline]
    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// The positioning transform.
    #[inline]
    pub fn transform(&self) -> &Mat33 {
        &self.transform
    }

    /// The transformed bounding box.
    #[inline]
    pub fn bbox(&self) -> Rect2 {
        self.bbox
    }

    /// Renders the image as one object.
    pub fn render(&self, renderer: &mut dyn Renderer) {
        renderer.start_object(&self.bbox, false);
        renderer.draw_image(&RenderableImage {
            href: self.href.clone(),
            transform: self.transform,
            size: self.size,
            label: self.label.clone(),
        });
        renderer.end_object(Some(&self.data.load_save_data));
    }

    /// Bounding-box intersection test.
    pub fn intersects(&self, segment: &LineSegment2) -> bool {
        bbox_intersects_segment(&self.bbox, segment)
    }

    /// Composes `transform` onto the image's position.
    pub fn transform_by(&mut self, transform: &Mat33) {
        self.transform = transform.right_mul(&self.transform);
        self.bbox = Self::compute_bbox(self.size, &self.transform);
    }

    pub(crate) fn serialize_data(&self) -> Value {
        json!({
            "src": self.href,
            "label": self.label,
            "size": [self.size.x, self.size.y],
            "transform": self.transform.to_array().to_vec(),
        })
    }
}

pub(crate) fn deserialize(value: &Value) -> Result<Component, CommandError> {
    let href = value
        .get("src")
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::InvalidData("image: missing src".into()))?;
    let label = value
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string);

    let size = value
        .get("size")
        .and_then(Value::as_array)
        .filter(|entries| entries.len() == 2)
        .ok_or_else(|| CommandError::InvalidData("image: missing size".into()))?;
    let width = size[0]
        .as_f64()
        .ok_or_else(|| CommandError::InvalidData("image: bad width".into()))?;
    let height = size[1]
        .as_f64()
        .ok_or_else(|| CommandError::InvalidData("image: bad height".into()))?;

    let transform = transform_from_value(value.get("transform"))?;

    Ok(Component::Image(ImageComponent::new(
        href.to_string(),
        label,
        Vec2::new(width, height),
        transform,
    )))
}
