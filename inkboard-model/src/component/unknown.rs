// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Opaque SVG content: elements the loader does not understand, kept so
//! round-trips do not lose fidelity.

use serde_json::{json, Value};

use crate::command::CommandError;
use crate::component::{AttributeMap, Component, ComponentData};
use crate::render::Renderer;

/// An unrecognized SVG element, preserved verbatim.
///
/// Renders nothing on raster targets; the vector back-end copies it
/// through unless sanitizing.
#[derive(Clone, Debug)]
pub struct UnknownSvgObject {
    pub(crate) data: ComponentData,
    tag: String,
    attributes: AttributeMap,
    text_content: String,
}

impl UnknownSvgObject {
    /// Creates an opaque element.
    pub fn new(tag: String, attributes: AttributeMap, text_content: String) -> Self {
        UnknownSvgObject {
            data: ComponentData::new(),
            tag,
            attributes,
            text_content,
        }
    }

    /// The element's tag name.
    #[inline]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The element's attributes.
    #[inline]
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// The element's flattened text content.
    #[inline]
    pub fn text_content(&self) -> &str {
        &self.text_content
    }

    /// Raster targets render nothing; the vector back-end hook copies
    /// the element through.
    pub fn render(&self, renderer: &mut dyn Renderer) {
        renderer.draw_svg_elem(&self.tag, &self.attributes, &self.text_content);
    }

    pub(crate) fn serialize_data(&self) -> Value {
        json!({
            "tag": self.tag,
            "attributes": attribute_map_to_json(&self.attributes),
            "textContent": self.text_content,
        })
    }
}

/// Attributes of the root `<svg>` element worth round-tripping
/// (extra namespaces and the like). Renders nothing.
#[derive(Clone, Debug)]
pub struct SvgGlobalAttributes {
    pub(crate) data: ComponentData,
    attributes: AttributeMap,
}

impl SvgGlobalAttributes {
    /// Creates the global-attributes carrier.
    pub fn new(attributes: AttributeMap) -> Self {
        SvgGlobalAttributes {
            data: ComponentData::new_at_bottom(),
            attributes,
        }
    }

    /// The preserved root attributes.
    #[inline]
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub(crate) fn serialize_data(&self) -> Value {
        json!({ "attributes": attribute_map_to_json(&self.attributes) })
    }
}

fn attribute_map_to_json(map: &AttributeMap) -> Value {
    let object: serde_json::Map<String, Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(object)
}

fn attribute_map_from_json(value: Option<&Value>) -> AttributeMap {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        _ => AttributeMap::new(),
    }
}

pub(crate) fn deserialize(value: &Value) -> Result<Component, CommandError> {
    let tag = value
        .get("tag")
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::InvalidData("unknown object: missing tag".into()))?;
    let attributes = attribute_map_from_json(value.get("attributes"));
    let text_content = value
        .get("textContent")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    Ok(Component::Unknown(UnknownSvgObject::new(
        tag.to_string(),
        attributes,
        text_content,
    )))
}

pub(crate) fn deserialize_globals(value: &Value) -> Result<Component, CommandError> {
    Ok(Component::SvgGlobalAttributes(SvgGlobalAttributes::new(
        attribute_map_from_json(value.get("attributes")),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_roundtrip() {
        let mut attributes = AttributeMap::new();
        attributes.insert("media".to_string(), "screen".to_string());
        let style = UnknownSvgObject::new(
            "style".to_string(),
            attributes,
            "path { stroke-linecap: round; }".to_string(),
        );

        let restored = deserialize(&style.serialize_data()).unwrap();
        match restored {
            Component::Unknown(restored) => {
                assert_eq!(restored.tag(), "style");
                assert_eq!(restored.attributes().get("media").unwrap(), "screen");
                assert_eq!(restored.text_content(), style.text_content());
            }
            other => panic!("expected unknown object, got {}", other.kind()),
        }
    }
}
