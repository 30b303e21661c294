// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scene components: strokes, text, images, backgrounds, and opaque
//! SVG content.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use inkboard_geom::{LineSegment2, Mat33, Rect2};

use crate::command::CommandError;
use crate::render::Renderer;
use crate::style::RenderingStyle;

pub mod background;
pub mod image;
pub mod stroke;
pub mod text;
pub mod unknown;

pub use background::{BackgroundComponent, BackgroundKind};
pub use image::ImageComponent;
pub use stroke::{Stroke, StrokePart};
pub use text::{
    set_text_metrics_provider, text_size_of, TextChild, TextComponent, TextMetricsProvider,
};
pub use unknown::{SvgGlobalAttributes, UnknownSvgObject};

/// Attributes preserved for SVG round-trips, keyed by attribute name.
pub type AttributeMap = BTreeMap<String, String>;

/// A component shared between the scene tree and the by-id map.
pub type ComponentRef = Rc<RefCell<Component>>;

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_Z_INDEX: AtomicU64 = AtomicU64::new(1);

/// An opaque component identifier, unique within a process run.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Allocates a fresh id.
    pub fn next() -> ComponentId {
        ComponentId(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Parses the string form produced by [`ComponentId::to_string`].
    ///
    /// Unparseable ids allocate a fresh one; the caller is responsible
    /// for resolving references through the id map anyway.
    pub fn parse(text: &str) -> ComponentId {
        match text.parse::<u64>() {
            Ok(raw) => {
                // Keep the counter ahead of every id we have ever seen so
                // deserialized components cannot collide with new ones.
                let mut current = NEXT_COMPONENT_ID.load(Ordering::Relaxed);
                while current <= raw {
                    match NEXT_COMPONENT_ID.compare_exchange(
                        current,
                        raw + 1,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(actual) => current = actual,
                    }
                }
                ComponentId(raw)
            }
            Err(_) => ComponentId::next(),
        }
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocates the next z-index; components created later stack on top.
pub fn next_z_index() -> u64 {
    NEXT_Z_INDEX.fetch_add(1, Ordering::Relaxed)
}

/// Data shared by every component variant.
#[derive(Clone, Debug)]
pub struct ComponentData {
    /// The component's id.
    pub id: ComponentId,
    /// Stacking order; larger renders on top.
    pub z_index: u64,
    /// Unrecognized SVG attributes kept for round-tripping. Strippable.
    pub load_save_data: AttributeMap,
}

impl ComponentData {
    /// Creates component data with a fresh id and the next z-index.
    pub fn new() -> Self {
        ComponentData {
            id: ComponentId::next(),
            z_index: next_z_index(),
            load_save_data: AttributeMap::new(),
        }
    }

    /// Creates component data at the bottom of the z-order (backgrounds).
    pub fn new_at_bottom() -> Self {
        ComponentData {
            id: ComponentId::next(),
            z_index: 0,
            load_save_data: AttributeMap::new(),
        }
    }
}

impl Default for ComponentData {
    fn default() -> Self {
        ComponentData::new()
    }
}

/// A scene component.
///
/// Modeled as a tagged variant rather than trait objects so that the
/// codec and renderers can pattern-match on the kind.
#[derive(Clone, Debug)]
pub enum Component {
    #[allow(missing_docs)]
    Stroke(Stroke),
    #[allow(missing_docs)]
    Text(TextComponent),
    #[allow(missing_docs)]
    Image(ImageComponent),
    #[allow(missing_docs)]
    Background(BackgroundComponent),
    #[allow(missing_docs)]
    Unknown(UnknownSvgObject),
    #[allow(missing_docs)]
    SvgGlobalAttributes(SvgGlobalAttributes),
}

impl Component {
    /// The shared component data.
    pub fn data(&self) -> &ComponentData {
        match self {
            Component::Stroke(c) => &c.data,
            Component::Text(c) => &c.data,
            Component::Image(c) => &c.data,
            Component::Background(c) => &c.data,
            Component::Unknown(c) => &c.data,
            Component::SvgGlobalAttributes(c) => &c.data,
        }
    }

    fn data_mut(&mut self) -> &mut ComponentData {
        match self {
            Component::Stroke(c) => &mut c.data,
            Component::Text(c) => &mut c.data,
            Component::Image(c) => &mut c.data,
            Component::Background(c) => &mut c.data,
            Component::Unknown(c) => &mut c.data,
            Component::SvgGlobalAttributes(c) => &mut c.data,
        }
    }

    /// The component's id.
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.data().id
    }

    /// The component's stacking order.
    #[inline]
    pub fn z_index(&self) -> u64 {
        self.data().z_index
    }

    /// Sets the stacking order directly.
    pub fn set_z_index(&mut self, z_index: u64) {
        self.data_mut().z_index = z_index;
    }

    /// Moves the component above everything created so far.
    pub fn bump_z_index(&mut self) {
        self.data_mut().z_index = next_z_index();
    }

    /// The registry kind id under which the component serializes.
    pub fn kind(&self) -> &'static str {
        match self {
            Component::Stroke(_) => "stroke",
            Component::Text(_) => "text",
            Component::Image(_) => "image-component",
            Component::Background(_) => "image-background",
            Component::Unknown(_) => "unknown-svg-object",
            Component::SvgGlobalAttributes(_) => "svg-global-attributes",
        }
    }

    /// The component's bounding box in canvas space.
    pub fn content_bbox(&self) -> Rect2 {
        match self {
            Component::Stroke(c) => c.bbox(),
            Component::Text(c) => c.bbox(),
            Component::Image(c) => c.bbox(),
            Component::Background(c) => c.bbox(),
            Component::Unknown(_) | Component::SvgGlobalAttributes(_) => Rect2::EMPTY,
        }
    }

    /// Renders the component. Never fails; unknown content renders
    /// nothing on raster targets.
    pub fn render(&self, renderer: &mut dyn Renderer, visible_rect: Option<&Rect2>) {
        match self {
            Component::Stroke(c) => c.render(renderer, visible_rect),
            Component::Text(c) => c.render(renderer),
            Component::Image(c) => c.render(renderer),
            Component::Background(c) => c.render(renderer, visible_rect),
            Component::Unknown(c) => c.render(renderer),
            Component::SvgGlobalAttributes(_) => {}
        }
    }

    /// Returns `true` if the component's geometry touches `segment`.
    pub fn intersects(&self, segment: &LineSegment2) -> bool {
        match self {
            Component::Stroke(c) => c.intersects(segment),
            Component::Text(c) => c.intersects(segment),
            Component::Image(c) => c.intersects(segment),
            Component::Background(_) => false,
            Component::Unknown(_) | Component::SvgGlobalAttributes(_) => false,
        }
    }

    /// Applies an affine transform to the component's geometry.
    ///
    /// This is the non-historic mutator; the transform command wraps it.
    pub fn transform_by(&mut self, transform: &Mat33) {
        match self {
            Component::Stroke(c) => c.transform_by(transform),
            Component::Text(c) => c.transform_by(transform),
            Component::Image(c) => c.transform_by(transform),
            Component::Background(_) => {}
            Component::Unknown(_) | Component::SvgGlobalAttributes(_) => {}
        }
    }

    /// Clones the component under a fresh id.
    pub fn clone_component(&self) -> Component {
        let mut copy = self.clone();
        copy.data_mut().id = ComponentId::next();
        copy.data_mut().z_index = next_z_index();
        copy
    }

    /// Whether [`Component::force_style`] changes anything.
    pub fn is_restylable(&self) -> bool {
        matches!(self, Component::Stroke(_) | Component::Background(_))
    }

    /// The current style of a restylable component.
    pub fn style(&self) -> Option<RenderingStyle> {
        match self {
            Component::Stroke(c) => c.parts().first().map(|p| p.style),
            Component::Background(c) => Some(RenderingStyle::fill_only(c.color())),
            _ => None,
        }
    }

    /// Applies `style` without creating a command. The restyle command
    /// is the historic wrapper around this.
    pub fn force_style(&mut self, style: &RenderingStyle) {
        match self {
            Component::Stroke(c) => c.force_style(style),
            Component::Background(c) => c.set_color(style.fill),
            _ => {}
        }
    }

    /// Builds the undoable command that restyles this component.
    ///
    /// Returns `None` for components that are not restylable.
    pub fn update_style(
        &self,
        new_style: RenderingStyle,
    ) -> Option<crate::command::RestyleElementCommand> {
        let original_style = self.style()?;
        Some(crate::command::RestyleElementCommand::new(
            self.id(),
            original_style,
            new_style,
        ))
    }

    /// Whether this component lives on the background layer.
    pub fn is_background(&self) -> bool {
        matches!(self, Component::Background(_))
    }

    /// A unitless cost estimate used by the rendering cache to decide
    /// whether caching this component's region pays off.
    pub fn proportional_rendering_time(&self) -> f64 {
        match self {
            Component::Stroke(c) => c
                .parts()
                .iter()
                .map(|p| 1.0 + p.path.commands().len() as f64 / 8.0)
                .sum(),
            Component::Text(c) => 1.0 + c.leaf_count() as f64,
            Component::Image(_) => 2.0,
            Component::Background(_) => 1.0,
            Component::Unknown(_) | Component::SvgGlobalAttributes(_) => 0.0,
        }
    }

    /// A short human-readable description.
    pub fn description(&self) -> String {
        match self {
            Component::Stroke(_) => "Stroke".to_string(),
            Component::Text(c) => format!("Text: {}", c.text_preview()),
            Component::Image(c) => match c.label() {
                Some(label) => format!("Image: {}", label),
                None => "Image".to_string(),
            },
            Component::Background(_) => "Background".to_string(),
            Component::Unknown(c) => format!("Unrecognized element <{}>", c.tag()),
            Component::SvgGlobalAttributes(_) => "Document attributes".to_string(),
        }
    }

    /// Unrecognized SVG attributes preserved by the loader.
    pub fn load_save_data(&self) -> &AttributeMap {
        &self.data().load_save_data
    }

    /// Attaches preserved attributes (used by the SVG loader).
    pub fn set_load_save_data(&mut self, data: AttributeMap) {
        self.data_mut().load_save_data = data;
    }

    /// Strips preserved attributes (the `sanitize` path).
    pub fn strip_load_save_data(&mut self) {
        self.data_mut().load_save_data.clear();
    }

    /// Serializes to the JSON wire form used by `add-element` commands.
    pub fn serialize(&self) -> Value {
        let body = match self {
            Component::Stroke(c) => c.serialize_data(),
            Component::Text(c) => c.serialize_data(),
            Component::Image(c) => c.serialize_data(),
            Component::Background(c) => c.serialize_data(),
            Component::Unknown(c) => c.serialize_data(),
            Component::SvgGlobalAttributes(c) => c.serialize_data(),
        };

        let load_save_data: serde_json::Map<String, Value> = self
            .load_save_data()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        json!({
            "id": self.id().to_string(),
            "kind": self.kind(),
            "zIndex": self.z_index(),
            "data": body,
            "loadSaveData": load_save_data,
        })
    }

    /// Deserializes a component through the kind registry.
    pub fn deserialize(value: &Value) -> Result<Component, CommandError> {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| CommandError::InvalidData("component: missing kind".into()))?;

        let factory = {
            let registry = component_registry().read().unwrap();
            registry.get(kind).copied()
        };
        let factory = factory
            .ok_or_else(|| CommandError::DeserializationRejected(kind.to_string()))?;

        let body = value
            .get("data")
            .ok_or_else(|| CommandError::InvalidData("component: missing data".into()))?;
        let mut component = factory(body)?;

        if let Some(id_text) = value.get("id").and_then(Value::as_str) {
            component.data_mut().id = ComponentId::parse(id_text);
        }
        if let Some(z) = value.get("zIndex").and_then(Value::as_u64) {
            component.data_mut().z_index = z;
        }
        if let Some(Value::Object(map)) = value.get("loadSaveData") {
            component.data_mut().load_save_data = map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect();
        }

        Ok(component)
    }
}

type ComponentFactory = fn(&Value) -> Result<Component, CommandError>;

fn component_registry() -> &'static RwLock<HashMap<String, ComponentFactory>> {
    static REGISTRY: Lazy<RwLock<HashMap<String, ComponentFactory>>> = Lazy::new(|| {
        let mut map: HashMap<String, ComponentFactory> = HashMap::new();
        map.insert("stroke".into(), stroke::deserialize);
        map.insert("text".into(), text::deserialize);
        map.insert("image-component".into(), image::deserialize);
        map.insert("image-background".into(), background::deserialize);
        map.insert("unknown-svg-object".into(), unknown::deserialize);
        map.insert("svg-global-attributes".into(), unknown::deserialize_globals);
        RwLock::new(map)
    });
    &REGISTRY
}

/// Registers (or replaces) a component kind factory.
///
/// The built-in kinds are registered eagerly; hosts only call this for
/// custom components. Must not be called while a deserialize is in
/// progress.
pub fn register_component_kind(kind: &str, factory: ComponentFactory) {
    component_registry()
        .write()
        .unwrap()
        .insert(kind.to_string(), factory);
}

/// Wraps a component for insertion into the scene.
pub fn into_ref(component: Component) -> ComponentRef {
    Rc::new(RefCell::new(component))
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_geom::{Color, FuzzyEq, Path};
    use serde_json::json;

    #[test]
    fn ids_are_unique_and_z_monotone() {
        let a = ComponentData::new();
        let b = ComponentData::new();
        assert_ne!(a.id, b.id);
        assert!(b.z_index > a.z_index);
    }

    #[test]
    fn component_roundtrip_preserves_identity() {
        let stroke = Stroke::new(vec![StrokePart {
            path: Path::from_string("M0,0L10,10").unwrap(),
            style: RenderingStyle::fill_only(Color::BLACK),
        }]);
        let component = Component::Stroke(stroke);

        let restored = Component::deserialize(&component.serialize()).unwrap();
        assert_eq!(restored.id(), component.id());
        assert_eq!(restored.z_index(), component.z_index());
        assert_eq!(restored.kind(), "stroke");
        assert!(restored
            .content_bbox()
            .fuzzy_eq(&component.content_bbox()));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let bad = json!({ "kind": "does-not-exist", "data": {} });
        match Component::deserialize(&bad) {
            Err(CommandError::DeserializationRejected(kind)) => {
                assert_eq!(kind, "does-not-exist")
            }
            other => panic!("expected rejection, got {:?}", other.map(|c| c.kind())),
        }
    }

    #[test]
    fn clone_component_gets_a_fresh_id() {
        let stroke = Stroke::new(vec![StrokePart {
            path: Path::from_string("M0,0L1,0").unwrap(),
            style: RenderingStyle::fill_only(Color::BLACK),
        }]);
        let component = Component::Stroke(stroke);
        let copy = component.clone_component();
        assert_ne!(copy.id(), component.id());
        assert!(copy.z_index() > component.z_index());
        assert_eq!(copy.content_bbox(), component.content_bbox());
    }

    #[test]
    fn restylable_components_report_styles() {
        let stroke = Component::Stroke(Stroke::new(vec![StrokePart {
            path: Path::from_string("M0,0L1,0").unwrap(),
            style: RenderingStyle::fill_only(Color::BLACK),
        }]));
        assert!(stroke.is_restylable());
        assert_eq!(stroke.style().unwrap().fill, Color::BLACK);

        let mut restyled = stroke.clone_component();
        restyled.force_style(&RenderingStyle::fill_only(Color::WHITE));
        assert_eq!(restyled.style().unwrap().fill, Color::WHITE);
    }
}
