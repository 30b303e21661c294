// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The sandboxed SVG loader.
//!
//! The sandbox is `roxmltree`: a non-executing DOM with entity and
//! nesting limits. A parse failure aborts the whole load; no partial
//! document is ever produced. Individual malformed elements degrade to
//! [`UnknownSvgObject`]s (or are dropped) with a warning, so round-trips
//! keep fidelity.

use std::str::FromStr;

use inkboard_geom::{Color, Mat33, Path, PathCommand, Rect2, Vec2};

use crate::component::background::{
    BackgroundComponent, BackgroundKind, BACKGROUND_CLASS, BACKGROUND_GRID_CLASS,
    BACKGROUND_GRID_SIZE_CLASS_PREFIX,
};
use crate::component::{
    into_ref, AttributeMap, Component, ImageComponent, Stroke, StrokePart, SvgGlobalAttributes,
    TextChild, TextComponent, UnknownSvgObject,
};
use crate::editor::EditorImage;
use crate::style::{RenderingStyle, StrokeStyle, TextRenderingStyle};

/// Loader configuration.
#[derive(Clone, Copy, Debug)]
pub struct LoadOptions {
    /// Keep unrecognized elements as opaque components so they survive a
    /// round-trip. When false they are dropped with a warning.
    pub store_unknown: bool,
    /// Upper bound on the number of processed elements.
    pub max_elements: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            store_unknown: true,
            max_elements: 1_000_000,
        }
    }
}

/// Loading failures. Any of these aborts the load with no partial
/// document.
#[derive(Debug)]
pub enum LoadError {
    /// The XML itself could not be parsed.
    ParsingFailed(roxmltree::Error),
    /// The root element is not `<svg>`.
    NotAnSvgDocument,
    /// The element limit was reached. Prevents resource exhaustion from
    /// hostile documents.
    ElementsLimitReached,
}

impl From<roxmltree::Error> for LoadError {
    fn from(e: roxmltree::Error) -> Self {
        LoadError::ParsingFailed(e)
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            LoadError::ParsingFailed(ref e) => write!(f, "SVG parsing failed cause {}", e),
            LoadError::NotAnSvgDocument => write!(f, "the root element is not <svg>"),
            LoadError::ElementsLimitReached => {
                write!(f, "the maximum number of SVG elements has been reached")
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// The stylesheet the SVG writer emits into every document. The loader
/// drops it on sight so round-trips do not accumulate copies.
pub const CODEC_STYLESHEET: &str = "path { stroke-linecap: round; stroke-linejoin: round; }";

/// Attributes the loader itself consumes, per element kind. Everything
/// else lands in `load_save_data`.
const SVG_ATTRS: &[&str] = &["viewBox", "width", "height", "xmlns", "xmlns:xlink", "version"];
const PATH_ATTRS: &[&str] = &["d", "fill", "stroke", "stroke-width", "transform", "class"];
const TEXT_ATTRS: &[&str] = &[
    "x",
    "y",
    "transform",
    "style",
    "font-family",
    "font-size",
    "font-weight",
    "font-variant",
    "fill",
    "class",
];
const IMAGE_ATTRS: &[&str] = &[
    "href",
    "xlink:href",
    "x",
    "y",
    "width",
    "height",
    "transform",
    "style",
    "aria-label",
    "class",
];

/// Loads an [`EditorImage`] from UTF-8 SVG text.
pub fn load_from_svg(text: &str, options: &LoadOptions) -> Result<EditorImage, LoadError> {
    let document = roxmltree::Document::parse(text)?;
    let root = document.root_element();
    if root.tag_name().name() != "svg" {
        return Err(LoadError::NotAnSvgDocument);
    }

    let export_rect = read_export_rect(&root);
    let mut image = EditorImage::new(export_rect);

    if options.store_unknown {
        let globals = unknown_attributes(&root, SVG_ATTRS);
        if !globals.is_empty() {
            image.insert_component(into_ref(Component::SvgGlobalAttributes(
                SvgGlobalAttributes::new(globals),
            )));
        }
    }

    let mut budget = options.max_elements;
    for child in root.children().filter(roxmltree::Node::is_element) {
        visit_element(&child, Mat33::IDENTITY, &mut image, options, &mut budget)?;
    }

    Ok(image)
}

fn read_export_rect(root: &roxmltree::Node) -> Rect2 {
    if let Some(view_box) = root.attribute("viewBox") {
        match svgtypes::ViewBox::from_str(view_box) {
            Ok(vb) => return Rect2::new(vb.x, vb.y, vb.w, vb.h),
            Err(_) => log::warn!("ignoring a malformed viewBox: '{}'", view_box),
        }
    }

    let length = |name: &str, fallback: f64| {
        root.attribute(name)
            .and_then(|v| v.trim_end_matches("px").parse::<f64>().ok())
            .unwrap_or(fallback)
    };
    Rect2::new(0.0, 0.0, length("width", 500.0), length("height", 500.0))
}

fn visit_element(
    node: &roxmltree::Node,
    inherited: Mat33,
    image: &mut EditorImage,
    options: &LoadOptions,
    budget: &mut usize,
) -> Result<(), LoadError> {
    if *budget == 0 {
        return Err(LoadError::ElementsLimitReached);
    }
    *budget -= 1;

    let transform = compose_transform(node, inherited);
    let classes = node.attribute("class").unwrap_or("");
    let is_background = classes
        .split_whitespace()
        .any(|class| class == BACKGROUND_CLASS);

    match node.tag_name().name() {
        "g" if is_background => load_background_group(node, image),
        "g" => {
            // Plain groups are flattened; their transform is inherited.
            for child in node.children().filter(roxmltree::Node::is_element) {
                visit_element(&child, transform, image, options, budget)?;
            }
            Ok(())
        }
        "path" if is_background => {
            load_solid_background(node, image);
            Ok(())
        }
        "path" => {
            load_stroke(node, transform, image, options);
            Ok(())
        }
        "text" => {
            load_text(node, transform, image);
            Ok(())
        }
        "image" => {
            load_image(node, transform, image);
            Ok(())
        }
        "style" if element_text(node).trim() == CODEC_STYLESHEET => {
            // The writer's own boilerplate; regenerated on save.
            Ok(())
        }
        other => {
            if options.store_unknown {
                store_unknown_element(node, image);
            } else {
                log::warn!("dropping an unrecognized element <{}>", other);
            }
            Ok(())
        }
    }
}

fn compose_transform(node: &roxmltree::Node, inherited: Mat33) -> Mat33 {
    match node.attribute("transform") {
        Some(text) => match Mat33::from_css_matrix(text) {
            Ok(own) => inherited.right_mul(&own),
            Err(e) => {
                log::warn!("ignoring a malformed transform: {}", e);
                inherited
            }
        },
        None => inherited,
    }
}

/// Extracts a `transform: …` declaration from an inline `style`
/// attribute (the writer emits text/image transforms this way for CSS
/// compatibility).
fn style_attr_transform(node: &roxmltree::Node) -> Mat33 {
    let style = match node.attribute("style") {
        Some(style) => style,
        None => return Mat33::IDENTITY,
    };

    for declaration in style.split(';') {
        let mut parts = declaration.splitn(2, ':');
        let name = parts.next().unwrap_or("").trim();
        if name != "transform" {
            continue;
        }
        let value = parts.next().unwrap_or("").trim();
        match Mat33::from_css_matrix(value) {
            Ok(transform) => return transform,
            Err(e) => {
                log::warn!("ignoring a malformed style transform: {}", e);
                return Mat33::IDENTITY;
            }
        }
    }
    Mat33::IDENTITY
}

fn unknown_attributes(node: &roxmltree::Node, recognized: &[&str]) -> AttributeMap {
    let mut result = AttributeMap::new();
    for attribute in node.attributes() {
        let name = qualified_name(attribute);
        if !recognized.contains(&name.as_str()) {
            result.insert(name, attribute.value().to_string());
        }
    }
    result
}

fn qualified_name(attribute: &roxmltree::Attribute) -> String {
    match attribute.namespace() {
        Some("http://www.w3.org/1999/xlink") => format!("xlink:{}", attribute.name()),
        _ => attribute.name().to_string(),
    }
}

fn color_attribute(node: &roxmltree::Node, name: &str, fallback: Color) -> Color {
    match node.attribute(name) {
        Some(text) => match Color::from_string(text) {
            Ok(color) => color,
            Err(e) => {
                log::warn!("{}; using the default", e);
                fallback
            }
        },
        None => fallback,
    }
}

fn load_stroke(
    node: &roxmltree::Node,
    transform: Mat33,
    image: &mut EditorImage,
    options: &LoadOptions,
) {
    let d = match node.attribute("d") {
        Some(d) => d,
        None => {
            log::warn!("<path> without path data");
            return;
        }
    };

    let path = match Path::from_string(d) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("unparseable path data ({})", e);
            if options.store_unknown {
                store_unknown_element(node, image);
            }
            return;
        }
    };

    // The codec default is transparent, not SVG's black: strokes are
    // written as explicit fills.
    let fill = color_attribute(node, "fill", Color::TRANSPARENT);
    let stroke = match node.attribute("stroke") {
        Some(text) if text != "none" => {
            let color = color_attribute(node, "stroke", Color::TRANSPARENT);
            let width = node
                .attribute("stroke-width")
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(1.0);
            Some(StrokeStyle { color, width })
        }
        _ => None,
    };
    let style = RenderingStyle { fill, stroke };

    let path = if transform.is_identity() {
        path
    } else {
        path.transformed_by(&transform)
    };

    // Each `M` opens a separate ribbon of the same stroke.
    let parts = split_at_subpaths(path)
        .into_iter()
        .map(|path| StrokePart { path, style })
        .collect();

    let mut component = Component::Stroke(Stroke::new(parts));
    component.set_load_save_data(unknown_attributes(node, PATH_ATTRS));
    image.insert_component(into_ref(component));
}

/// Splits a parsed path at its MoveTo commands.
fn split_at_subpaths(path: Path) -> Vec<Path> {
    let has_subpaths = path
        .commands()
        .iter()
        .any(|c| matches!(c, PathCommand::MoveTo(_)));
    if !has_subpaths {
        return vec![path];
    }

    let mut result = Vec::new();
    let mut start = path.start();
    let mut commands: Vec<PathCommand> = Vec::new();
    for command in path.commands() {
        match *command {
            PathCommand::MoveTo(p) => {
                if !commands.is_empty() {
                    result.push(Path::from_commands(start, std::mem::replace(
                        &mut commands,
                        Vec::new(),
                    )));
                }
                start = p;
            }
            other => commands.push(other),
        }
    }
    if !commands.is_empty() {
        result.push(Path::from_commands(start, commands));
    }

    if result.is_empty() {
        result.push(Path::new(start));
    }
    result
}

fn load_solid_background(node: &roxmltree::Node, image: &mut EditorImage) {
    let color = color_attribute(node, "fill", Color::TRANSPARENT);
    let mut component = Component::Background(BackgroundComponent::new(
        color,
        BackgroundKind::SolidColor,
        Rect2::EMPTY,
    ));
    component.set_load_save_data(unknown_attributes(node, PATH_ATTRS));
    image.insert_component(into_ref(component));
}

fn load_background_group(node: &roxmltree::Node, image: &mut EditorImage) -> Result<(), LoadError> {
    let classes = node.attribute("class").unwrap_or("");
    let is_grid = classes
        .split_whitespace()
        .any(|class| class == BACKGROUND_GRID_CLASS);

    let grid_size = classes
        .split_whitespace()
        .find_map(|class| class.strip_prefix(BACKGROUND_GRID_SIZE_CLASS_PREFIX))
        .and_then(|suffix| suffix.parse::<f64>().ok())
        .unwrap_or(25.0);

    // First filled child provides the main color, first stroked child
    // the rule color.
    let mut main_color = Color::TRANSPARENT;
    let mut secondary_color = None;
    for child in node.children().filter(roxmltree::Node::is_element) {
        if child.attribute("stroke").is_some() && secondary_color.is_none() {
            secondary_color = Some(color_attribute(&child, "stroke", Color::TRANSPARENT));
        } else if child.attribute("fill").is_some() && main_color.is_transparent() {
            main_color = color_attribute(&child, "fill", Color::TRANSPARENT);
        }
    }

    let kind = if is_grid {
        BackgroundKind::Grid {
            grid_size,
            secondary_color: secondary_color.unwrap_or_else(|| main_color.contrasting_shade()),
        }
    } else {
        BackgroundKind::SolidColor
    };

    let mut component =
        Component::Background(BackgroundComponent::new(main_color, kind, Rect2::EMPTY));
    component.set_load_save_data(unknown_attributes(node, &["class", "transform"]));
    image.insert_component(into_ref(component));
    Ok(())
}

fn text_style_of(node: &roxmltree::Node, parent: Option<&TextRenderingStyle>) -> TextRenderingStyle {
    let parent_size = parent.map_or(12.0, |style| style.size);
    let size = node
        .attribute("font-size")
        .and_then(|v| v.trim_end_matches("px").parse::<f64>().ok())
        .unwrap_or(parent_size);

    let font_family = node
        .attribute("font-family")
        .map(str::to_string)
        .or_else(|| parent.map(|style| style.font_family.clone()))
        .unwrap_or_else(|| "sans-serif".to_string());

    let fill = match node.attribute("fill") {
        Some(_) => color_attribute(node, "fill", Color::BLACK),
        None => parent.map_or(Color::BLACK, |style| style.rendering_style.fill),
    };

    TextRenderingStyle {
        size,
        font_family,
        font_weight: node
            .attribute("font-weight")
            .map(str::to_string)
            .or_else(|| parent.and_then(|style| style.font_weight.clone())),
        font_variant: node
            .attribute("font-variant")
            .map(str::to_string)
            .or_else(|| parent.and_then(|style| style.font_variant.clone())),
        rendering_style: RenderingStyle::fill_only(fill),
    }
}

fn position_of(node: &roxmltree::Node) -> Vec2 {
    let coordinate = |name: &str| {
        node.attribute(name)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    Vec2::new(coordinate("x"), coordinate("y"))
}

fn load_text(node: &roxmltree::Node, transform: Mat33, image: &mut EditorImage) {
    let style = text_style_of(node, None);
    let transform = transform
        .right_mul(&style_attr_transform(node))
        .right_mul(&Mat33::translation(position_of(node)));
    let children = text_children_of(node, &style);
    if children.is_empty() {
        return;
    }

    let mut component = Component::Text(TextComponent::new(children, transform, style));
    component.set_load_save_data(unknown_attributes(node, TEXT_ATTRS));
    image.insert_component(into_ref(component));
}

fn text_children_of(node: &roxmltree::Node, style: &TextRenderingStyle) -> Vec<TextChild> {
    let mut children = Vec::new();
    for child in node.children() {
        if child.is_text() {
            if let Some(text) = child.text() {
                if !text.trim().is_empty() {
                    children.push(TextChild::Text(text.to_string()));
                }
            }
        } else if child.is_element() && child.tag_name().name() == "tspan" {
            let nested_style = text_style_of(&child, Some(style));
            let nested_transform = Mat33::translation(position_of(&child));
            let nested_children = text_children_of(&child, &nested_style);
            if !nested_children.is_empty() {
                children.push(TextChild::Component(TextComponent::new(
                    nested_children,
                    nested_transform,
                    nested_style,
                )));
            }
        }
    }
    children
}

fn load_image(node: &roxmltree::Node, transform: Mat33, image: &mut EditorImage) {
    let href = node
        .attribute("href")
        .or_else(|| node.attribute(("http://www.w3.org/1999/xlink", "href")))
        .unwrap_or("");
    if href.is_empty() {
        log::warn!("<image> without an href");
        return;
    }

    let length = |name: &str| {
        node.attribute(name)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let size = Vec2::new(length("width"), length("height"));
    let transform = transform
        .right_mul(&style_attr_transform(node))
        .right_mul(&Mat33::translation(position_of(node)));

    let mut component = Component::Image(ImageComponent::new(
        href.to_string(),
        node.attribute("aria-label").map(str::to_string),
        size,
        transform,
    ));
    component.set_load_save_data(unknown_attributes(node, IMAGE_ATTRS));
    image.insert_component(into_ref(component));
}

fn store_unknown_element(node: &roxmltree::Node, image: &mut EditorImage) {
    let mut attributes = AttributeMap::new();
    for attribute in node.attributes() {
        attributes.insert(qualified_name(attribute), attribute.value().to_string());
    }

    let mut text_content = String::new();
    collect_text(node, &mut text_content);

    image.insert_component(into_ref(Component::Unknown(UnknownSvgObject::new(
        node.tag_name().name().to_string(),
        attributes,
        text_content,
    ))));
}

fn element_text(node: &roxmltree::Node) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &roxmltree::Node, out: &mut String) {
    for child in node.children() {
        if child.is_text() {
            if let Some(text) = child.text() {
                out.push_str(text);
            }
        } else {
            collect_text(&child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_geom::FuzzyEq;

    fn load(svg: &str) -> EditorImage {
        load_from_svg(svg, &LoadOptions::default()).unwrap()
    }

    #[test]
    fn reads_view_box_into_export_rect() {
        let image = load(r#"<svg viewBox="5 10 200 100" xmlns="http://www.w3.org/2000/svg"></svg>"#);
        assert_eq!(image.import_export_rect(), Rect2::new(5.0, 10.0, 200.0, 100.0));
    }

    #[test]
    fn rejects_non_svg_and_malformed_documents() {
        assert!(matches!(
            load_from_svg("<html></html>", &LoadOptions::default()),
            Err(LoadError::NotAnSvgDocument)
        ));
        assert!(matches!(
            load_from_svg("<svg><unclosed></svg>", &LoadOptions::default()),
            Err(LoadError::ParsingFailed(_))
        ));
    }

    #[test]
    fn element_limit_is_enforced() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
            <path d="M0,0 L1,1"/>
            <path d="M0,0 L2,2"/>
            <path d="M0,0 L3,3"/>
        </svg>"#;
        let options = LoadOptions {
            max_elements: 2,
            ..LoadOptions::default()
        };
        assert!(matches!(
            load_from_svg(svg, &options),
            Err(LoadError::ElementsLimitReached)
        ));
    }

    #[test]
    fn loads_strokes_with_subpaths_and_styles() {
        let image = load(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
                <path d="M0,0 L10,0 M20,0 L30,0" fill="#ff0000" data-extra="kept"/>
            </svg>"##,
        );

        let elements = image.all_elements();
        assert_eq!(elements.len(), 1);
        let element = elements[0].borrow();
        match &*element {
            Component::Stroke(stroke) => {
                assert_eq!(stroke.parts().len(), 2);
                assert!(stroke.parts()[0]
                    .style
                    .fill
                    .fuzzy_eq(&Color::from_string("#ff0000").unwrap()));
                assert!(stroke.parts()[0].style.stroke.is_none());
            }
            other => panic!("expected a stroke, got {}", other.kind()),
        }
        assert_eq!(element.load_save_data().get("data-extra").unwrap(), "kept");
    }

    #[test]
    fn fill_defaults_to_transparent() {
        let image = load(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><path d="M0,0 L10,0"/></svg>"#,
        );
        let elements = image.all_elements();
        let element = elements[0].borrow();
        assert!(element.style().unwrap().fill.is_transparent());
    }

    #[test]
    fn path_transform_is_applied() {
        let image = load(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
                <g transform="translate(100,0)">
                    <path d="M0,0 L10,0" transform="translate(0,50)" fill="#000"/>
                </g>
            </svg>"##,
        );
        let elements = image.all_elements();
        let bbox = elements[0].borrow().content_bbox();
        assert!((bbox.x - 100.0).abs() < 1e-9);
        assert!((bbox.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn loads_text_with_tspans() {
        let image = load(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
                <text x="10" y="20" font-size="16" fill="#123456">hello<tspan x="0" y="18">world</tspan></text>
            </svg>"##,
        );
        let elements = image.all_elements();
        assert_eq!(elements.len(), 1);
        match &*elements[0].borrow() {
            Component::Text(text) => {
                assert_eq!(text.leaf_count(), 2);
                assert_eq!(text.style().size, 16.0);
                assert_eq!(text.text_preview(), "helloworld");
            }
            other => panic!("expected text, got {}", other.kind()),
        };
    }

    #[test]
    fn loads_images_with_xlink_href() {
        let image = load(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">
                <image xlink:href="data:image/png;base64,AA==" width="32" height="16" x="5" y="6"/>
            </svg>"#,
        );
        let elements = image.all_elements();
        match &*elements[0].borrow() {
            Component::Image(loaded) => {
                assert_eq!(loaded.size(), Vec2::new(32.0, 16.0));
                assert!(loaded.href().starts_with("data:image/png"));
                assert_eq!(loaded.bbox().top_left(), Vec2::new(5.0, 6.0));
            }
            other => panic!("expected image, got {}", other.kind()),
        };
    }

    #[test]
    fn style_elements_become_unknown_objects() {
        let image = load(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
                <style>path { stroke-linecap: round; }</style>
            </svg>"#,
        );
        let elements = image.all_elements();
        assert_eq!(elements.len(), 1);
        match &*elements[0].borrow() {
            Component::Unknown(unknown) => {
                assert_eq!(unknown.tag(), "style");
                assert!(unknown.text_content().contains("stroke-linecap"));
            }
            other => panic!("expected unknown, got {}", other.kind()),
        };
    }

    #[test]
    fn unknown_elements_are_dropped_without_store_unknown() {
        let options = LoadOptions {
            store_unknown: false,
            ..LoadOptions::default()
        };
        let image = load_from_svg(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><marquee>hi</marquee></svg>"#,
            &options,
        )
        .unwrap();
        assert!(image.all_elements().is_empty());
    }

    #[test]
    fn grid_background_group_roundtrips() {
        let svg = format!(
            r##"<svg viewBox="0 0 100 100" xmlns="http://www.w3.org/2000/svg">
                <g class="{} {} {}10">
                    <path d="M0,0 L100,0 L100,100 L0,100 L0,0" fill="#336699"/>
                    <path d="M10,0 L10,100" fill="none" stroke="#aabbcc" stroke-width="0.7"/>
                </g>
            </svg>"##,
            BACKGROUND_CLASS, BACKGROUND_GRID_CLASS, BACKGROUND_GRID_SIZE_CLASS_PREFIX
        );

        let image = load(&svg);
        let elements = image.all_elements();
        assert_eq!(elements.len(), 1);
        match &*elements[0].borrow() {
            Component::Background(background) => {
                assert!(background
                    .color()
                    .fuzzy_eq(&Color::from_string("#336699").unwrap()));
                match background.kind() {
                    BackgroundKind::Grid {
                        grid_size,
                        secondary_color,
                    } => {
                        assert_eq!(grid_size, 10.0);
                        assert!(
                            secondary_color.fuzzy_eq(&Color::from_string("#aabbcc").unwrap())
                        );
                    }
                    other => panic!("expected a grid, got {:?}", other),
                }
                // Backgrounds stretch to the export rect.
                assert_eq!(background.bbox(), Rect2::new(0.0, 0.0, 100.0, 100.0));
            }
            other => panic!("expected background, got {}", other.kind()),
        };
    }
}
