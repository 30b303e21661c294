// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fill, stroke, and text styling shared by components and renderers.

use inkboard_geom::{Color, FuzzyEq};
use serde_json::{json, Value};

use crate::command::CommandError;

/// An outline pen: color plus width.
#[derive(Clone, Copy, Debug)]
pub struct StrokeStyle {
    #[allow(missing_docs)]
    pub color: Color,
    /// The stroke width in canvas units.
    pub width: f64,
}

impl PartialEq for StrokeStyle {
    fn eq(&self, other: &Self) -> bool {
        self.color.fuzzy_eq(&other.color) && self.width.fuzzy_eq(&other.width)
    }
}

/// How a path is painted: a fill color and an optional outline.
///
/// Two styles are equal when the fills match and the strokes match;
/// a present stroke never equals an absent one.
#[derive(Clone, Copy, Debug)]
pub struct RenderingStyle {
    #[allow(missing_docs)]
    pub fill: Color,
    #[allow(missing_docs)]
    pub stroke: Option<StrokeStyle>,
}

impl PartialEq for RenderingStyle {
    fn eq(&self, other: &Self) -> bool {
        if !self.fill.fuzzy_eq(&other.fill) {
            return false;
        }
        match (&self.stroke, &other.stroke) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl RenderingStyle {
    /// A style that only fills with `color`.
    pub fn fill_only(color: Color) -> Self {
        RenderingStyle {
            fill: color,
            stroke: None,
        }
    }

    /// Serializes to the JSON shape used on the command wire.
    pub fn to_json(&self) -> Value {
        let mut value = json!({ "fill": self.fill.to_hex_string() });
        if let Some(ref stroke) = self.stroke {
            value["stroke"] = json!({
                "color": stroke.color.to_hex_string(),
                "width": stroke.width,
            });
        }
        value
    }

    /// Parses the JSON shape produced by [`RenderingStyle::to_json`].
    pub fn from_json(value: &Value) -> Result<Self, CommandError> {
        let invalid = |what: &str| CommandError::InvalidData(format!("style: {}", what));

        let fill_text = value
            .get("fill")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing fill"))?;
        let fill =
            Color::from_string(fill_text).map_err(|e| invalid(&e.to_string()))?;

        let stroke = match value.get("stroke") {
            None | Some(Value::Null) => None,
            Some(stroke_value) => {
                let color_text = stroke_value
                    .get("color")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("missing stroke color"))?;
                let width = stroke_value
                    .get("width")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| invalid("missing stroke width"))?;
                Some(StrokeStyle {
                    color: Color::from_string(color_text)
                        .map_err(|e| invalid(&e.to_string()))?,
                    width,
                })
            }
        };

        Ok(RenderingStyle { fill, stroke })
    }
}

/// Text styling. Glyph metrics come from the host; this only carries
/// the properties the SVG codec round-trips.
#[derive(Clone, PartialEq, Debug)]
pub struct TextRenderingStyle {
    /// Font size in canvas units.
    pub size: f64,
    /// Font family name.
    pub font_family: String,
    #[allow(missing_docs)]
    pub font_weight: Option<String>,
    #[allow(missing_docs)]
    pub font_variant: Option<String>,
    /// Fill/stroke used to paint the glyphs.
    pub rendering_style: RenderingStyle,
}

impl TextRenderingStyle {
    /// A plain style with the given size and family.
    pub fn plain(size: f64, font_family: &str, color: Color) -> Self {
        TextRenderingStyle {
            size,
            font_family: font_family.to_string(),
            font_weight: None,
            font_variant: None,
            rendering_style: RenderingStyle::fill_only(color),
        }
    }

    /// Serializes to JSON for component round-trips.
    pub fn to_json(&self) -> Value {
        json!({
            "size": self.size,
            "fontFamily": self.font_family,
            "fontWeight": self.font_weight,
            "fontVariant": self.font_variant,
            "renderingStyle": self.rendering_style.to_json(),
        })
    }

    /// Parses the JSON shape produced by [`TextRenderingStyle::to_json`].
    pub fn from_json(value: &Value) -> Result<Self, CommandError> {
        let invalid = |what: &str| CommandError::InvalidData(format!("text style: {}", what));
        Ok(TextRenderingStyle {
            size: value
                .get("size")
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid("missing size"))?,
            font_family: value
                .get("fontFamily")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("missing fontFamily"))?
                .to_string(),
            font_weight: value
                .get("fontWeight")
                .and_then(Value::as_str)
                .map(str::to_string),
            font_variant: value
                .get("fontVariant")
                .and_then(Value::as_str)
                .map(str::to_string),
            rendering_style: RenderingStyle::from_json(
                value
                    .get("renderingStyle")
                    .ok_or_else(|| invalid("missing renderingStyle"))?,
            )?,
        })
    }
}
