// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The vector back-end: a streaming SVG writer.
//!
//! Paths batched by the renderer contract land in single `<path>`
//! elements; text runs become `<text>`/`<tspan>`; attributes preserved
//! by the loader are re-applied at object end unless sanitizing.

use std::any::Any;

use xmlwriter::XmlWriter;

use inkboard_geom::{format_coordinate, Mat33, Path, Rect2, Vec2};
use inkboard_model::component::{AttributeMap, Component};
use inkboard_model::editor::EditorImage;
use inkboard_model::loader::CODEC_STYLESHEET;
use inkboard_model::render::{RenderableImage, Renderer, RendererState};
use inkboard_model::style::{RenderingStyle, TextRenderingStyle};
use inkboard_model::viewport::Viewport;

/// SVG output options.
#[derive(Clone, Copy, Debug, Default)]
pub struct SvgExportOptions {
    /// Suppress preserved unknown attributes and unparsed-element
    /// copy-through.
    pub sanitize: bool,
}

struct TextRun {
    text: String,
    transform: Mat33,
    style: TextRenderingStyle,
}

enum PendingElement {
    Path {
        d: String,
        style: RenderingStyle,
    },
    Text {
        runs: Vec<TextRun>,
    },
    Image {
        image: RenderableImage,
    },
    Raw {
        tag: String,
        attributes: AttributeMap,
        text: String,
    },
}

/// A renderer that streams SVG elements.
pub struct SvgRenderer {
    xml: Option<XmlWriter>,
    viewport: Viewport,
    state: RendererState,
    sanitize: bool,

    path_start: Vec2,
    path_commands: Vec<inkboard_geom::PathCommand>,
    pending: Vec<PendingElement>,
}

impl SvgRenderer {
    /// Creates a renderer targeting `export_rect` in canvas units.
    pub fn new(export_rect: Rect2, sanitize: bool) -> Self {
        SvgRenderer {
            xml: Some(XmlWriter::new(xmlwriter::Options::default())),
            viewport: Viewport::new(export_rect),
            state: RendererState::new(),
            sanitize,
            path_start: Vec2::ZERO,
            path_commands: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn with_xml<F: FnOnce(&mut XmlWriter)>(&mut self, f: F) {
        if let Some(ref mut xml) = self.xml {
            f(xml);
        }
    }

    fn to_out(&self, p: Vec2) -> Vec2 {
        self.state.transform().transform_point(p)
    }

    /// Finishes the document and returns the SVG text.
    pub fn end_document(mut self) -> String {
        self.flush_path_batch();
        match self.xml.take() {
            Some(xml) => xml.end_document(),
            None => String::new(),
        }
    }

    fn emit_pending(&mut self, load_save_data: Option<&AttributeMap>) {
        let pending = std::mem::replace(&mut self.pending, Vec::new());
        let extra = if self.sanitize { None } else { load_save_data };

        for (i, element) in pending.iter().enumerate() {
            // Preserved attributes go on the object's first element;
            // objects nearly always produce exactly one.
            let extra = if i == 0 { extra } else { None };
            self.emit_element(element, extra);
        }
    }

    fn emit_element(&mut self, element: &PendingElement, extra: Option<&AttributeMap>) {
        match element {
            PendingElement::Path { d, style } => {
                let style = *style;
                let d = d.clone();
                self.with_xml(|xml| {
                    xml.start_element("path");
                    xml.write_attribute("d", &d);
                    write_style_attributes(xml, &style);
                    write_extra_attributes(xml, extra);
                    xml.end_element();
                });
            }
            PendingElement::Text { runs } => {
                self.emit_text(runs, extra);
            }
            PendingElement::Image { image } => {
                let image = image.clone();
                self.with_xml(|xml| {
                    xml.start_element("image");
                    xml.write_attribute("href", &image.href);
                    xml.write_attribute("width", &format_coordinate(image.size.x));
                    xml.write_attribute("height", &format_coordinate(image.size.y));
                    if let Some(ref label) = image.label {
                        xml.write_attribute("aria-label", label);
                    }
                    write_placement_attributes(xml, &image.transform);
                    write_extra_attributes(xml, extra);
                    xml.end_element();
                });
            }
            PendingElement::Raw {
                tag,
                attributes,
                text,
            } => {
                let tag = tag.clone();
                let attributes = attributes.clone();
                let text = text.clone();
                self.with_xml(|xml| {
                    xml.start_element(&tag);
                    for (name, value) in &attributes {
                        xml.write_attribute(name, value);
                    }
                    if !text.is_empty() {
                        xml.write_text(&text);
                    }
                    xml.end_element();
                });
            }
        }
    }

    fn emit_text(&mut self, runs: &[TextRun], extra: Option<&AttributeMap>) {
        let first = match runs.first() {
            Some(first) => first,
            None => return,
        };

        let anchor = placement_of(&first.transform);
        let first_style = first.style.clone();
        let run_data: Vec<(String, Vec2, TextRenderingStyle)> = runs
            .iter()
            .map(|run| {
                let run_anchor = placement_of(&run.transform);
                (
                    run.text.clone(),
                    run_anchor.position - anchor.position,
                    run.style.clone(),
                )
            })
            .collect();
        let css = anchor.css_transform.clone();

        self.with_xml(|xml| {
            xml.start_element("text");
            xml.write_attribute("x", &format_coordinate(anchor.position.x));
            xml.write_attribute("y", &format_coordinate(anchor.position.y));
            if let Some(ref css) = css {
                xml.write_attribute_fmt("style", format_args!("transform: {};", css));
            }
            write_text_style_attributes(xml, &first_style, None);
            write_extra_attributes(xml, extra);

            for (i, (text, offset, style)) in run_data.iter().enumerate() {
                if i == 0 {
                    xml.write_text(text);
                } else {
                    xml.start_element("tspan");
                    xml.write_attribute("x", &format_coordinate(offset.x));
                    xml.write_attribute("y", &format_coordinate(offset.y));
                    write_text_style_attributes(xml, style, Some(&first_style));
                    xml.write_text(text);
                    xml.end_element();
                }
            }

            xml.end_element();
        });
    }
}

struct Placement {
    position: Vec2,
    css_transform: Option<String>,
}

/// Splits a transform `M = L ∘ T(p)` into explicit `x`/`y` attributes
/// (`p`) and a CSS matrix for the linear part, so renderers without CSS
/// transform support still position content approximately.
fn placement_of(transform: &Mat33) -> Placement {
    let linear = Mat33::new(
        transform.at(0, 0),
        transform.at(0, 1),
        0.0,
        transform.at(1, 0),
        transform.at(1, 1),
        0.0,
        0.0,
        0.0,
        1.0,
    );
    let translation = Vec2::new(transform.at(0, 2), transform.at(1, 2));

    if linear.is_identity() {
        return Placement {
            position: translation,
            css_transform: None,
        };
    }

    match linear.inverse() {
        Ok(inverse) => Placement {
            position: inverse.transform_point(translation),
            css_transform: Some(linear.to_css_matrix()),
        },
        Err(_) => Placement {
            position: Vec2::ZERO,
            css_transform: Some(transform.to_css_matrix()),
        },
    }
}

fn write_placement_attributes(xml: &mut XmlWriter, transform: &Mat33) {
    let placement = placement_of(transform);
    xml.write_attribute("x", &format_coordinate(placement.position.x));
    xml.write_attribute("y", &format_coordinate(placement.position.y));
    if let Some(css) = placement.css_transform {
        xml.write_attribute_fmt("style", format_args!("transform: {};", css));
    }
}

fn write_style_attributes(xml: &mut XmlWriter, style: &RenderingStyle) {
    if style.fill.is_transparent() {
        xml.write_attribute("fill", "none");
    } else {
        xml.write_attribute("fill", &style.fill.to_hex_string());
    }

    if let Some(ref stroke) = style.stroke {
        xml.write_attribute("stroke", &stroke.color.to_hex_string());
        xml.write_attribute("stroke-width", &format_coordinate(stroke.width));
    }
}

fn write_text_style_attributes(
    xml: &mut XmlWriter,
    style: &TextRenderingStyle,
    inherited: Option<&TextRenderingStyle>,
) {
    let changed = |get: &dyn Fn(&TextRenderingStyle) -> String| match inherited {
        Some(parent) => get(parent) != get(style),
        None => true,
    };

    if changed(&|s| s.font_family.clone()) {
        xml.write_attribute("font-family", &style.font_family);
    }
    if changed(&|s| format_coordinate(s.size)) {
        xml.write_attribute("font-size", &format_coordinate(style.size));
    }
    if let Some(ref weight) = style.font_weight {
        xml.write_attribute("font-weight", weight);
    }
    if let Some(ref variant) = style.font_variant {
        xml.write_attribute("font-variant", variant);
    }
    if changed(&|s| s.rendering_style.fill.to_hex_string()) {
        xml.write_attribute("fill", &style.rendering_style.fill.to_hex_string());
    }
}

impl Renderer for SvgRenderer {
    fn display_size(&self) -> Vec2 {
        self.viewport.screen_rect().size()
    }

    fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    fn clear(&mut self) {
        // Streaming output cannot be cleared retroactively.
        log::warn!("clear() is a no-op on the SVG back-end");
    }

    fn state(&self) -> &RendererState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RendererState {
        &mut self.state
    }

    fn begin_path(&mut self, start: Vec2) {
        self.path_start = self.to_out(start);
        self.path_commands.clear();
    }

    fn end_path(&mut self, style: &RenderingStyle) {
        let path = Path::from_commands(
            self.path_start,
            std::mem::replace(&mut self.path_commands, Vec::new()),
        );
        let element = PendingElement::Path {
            d: path.to_string(),
            style: *style,
        };

        if self.state.in_object() {
            self.pending.push(element);
        } else {
            self.emit_element(&element, None);
        }
    }

    fn move_to(&mut self, p: Vec2) {
        let out = self.to_out(p);
        self.path_commands
            .push(inkboard_geom::PathCommand::MoveTo(out));
    }

    fn line_to(&mut self, p: Vec2) {
        let out = self.to_out(p);
        self.path_commands
            .push(inkboard_geom::PathCommand::LineTo(out));
    }

    fn trace_quadratic_to(&mut self, control: Vec2, end: Vec2) {
        let control = self.to_out(control);
        let out = self.to_out(end);
        self.path_commands
            .push(inkboard_geom::PathCommand::QuadraticCurveTo(control, out));
    }

    fn trace_cubic_to(&mut self, control1: Vec2, control2: Vec2, end: Vec2) {
        let c1 = self.to_out(control1);
        let c2 = self.to_out(control2);
        let out = self.to_out(end);
        self.path_commands
            .push(inkboard_geom::PathCommand::CubicCurveTo(c1, c2, out));
    }

    fn on_end_object(&mut self, load_save_data: Option<&AttributeMap>) {
        self.emit_pending(load_save_data);
    }

    fn draw_text(&mut self, text: &str, transform: &Mat33, style: &TextRenderingStyle) {
        let run = TextRun {
            text: text.to_string(),
            transform: self.state.transform().right_mul(transform),
            style: style.clone(),
        };

        // Consecutive runs of one object share a single <text> element.
        if self.state.in_object() {
            if let Some(PendingElement::Text { ref mut runs }) = self.pending.last_mut() {
                runs.push(run);
                return;
            }
            self.pending.push(PendingElement::Text { runs: vec![run] });
        } else {
            let element = PendingElement::Text { runs: vec![run] };
            self.emit_element(&element, None);
        }
    }

    fn draw_image(&mut self, image: &RenderableImage) {
        let element = PendingElement::Image {
            image: image.clone(),
        };
        if self.state.in_object() {
            self.pending.push(element);
        } else {
            self.emit_element(&element, None);
        }
    }

    fn draw_svg_elem(&mut self, tag: &str, attributes: &AttributeMap, text_content: &str) {
        if self.sanitize {
            return;
        }
        let element = PendingElement::Raw {
            tag: tag.to_string(),
            attributes: attributes.clone(),
            text: text_content.to_string(),
        };
        if self.state.in_object() {
            self.pending.push(element);
        } else {
            self.emit_element(&element, None);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Serializes `image` to SVG text: viewBox and size from the
/// import/export rectangle, the codec stylesheet, the background, then
/// content in stacking order.
pub fn render_to_svg_string(image: &EditorImage, options: &SvgExportOptions) -> String {
    let rect = image.import_export_rect();
    let mut renderer = SvgRenderer::new(rect, options.sanitize);

    renderer.with_xml(|xml| {
        xml.start_element("svg");
        xml.write_attribute_fmt(
            "viewBox",
            format_args!(
                "{} {} {} {}",
                format_coordinate(rect.x),
                format_coordinate(rect.y),
                format_coordinate(rect.w),
                format_coordinate(rect.h)
            ),
        );
        xml.write_attribute("width", &format_coordinate(rect.w));
        xml.write_attribute("height", &format_coordinate(rect.h));
        xml.write_attribute("xmlns", "http://www.w3.org/2000/svg");
    });

    // Root attributes preserved from the original document.
    if !options.sanitize {
        for component in image.all_elements() {
            if let Component::SvgGlobalAttributes(ref globals) = *component.borrow() {
                let attributes = globals.attributes().clone();
                renderer.with_xml(|xml| {
                    for (name, value) in &attributes {
                        if name != "xmlns" {
                            xml.write_attribute(name, value);
                        }
                    }
                });
            }
        }
    }

    renderer.with_xml(|xml| {
        xml.start_element("style");
        xml.write_text(CODEC_STYLESHEET);
        xml.end_element();
    });

    for component in image.all_elements() {
        let borrowed = component.borrow();
        match &*borrowed {
            Component::SvgGlobalAttributes(_) => {}
            Component::Background(background) => {
                write_background(&mut renderer, background, rect);
            }
            other => other.render(&mut renderer, None),
        }
    }

    renderer.end_document()
}

fn write_background(
    renderer: &mut SvgRenderer,
    background: &inkboard_model::component::BackgroundComponent,
    rect: Rect2,
) {
    use inkboard_model::component::background::GRID_STROKE_WIDTH;

    if background.color().is_transparent() && background.grid_rule_path(rect).is_none() {
        return;
    }

    let classes = background.css_classes().join(" ");
    let fill = background.color().to_hex_string();
    let fill_d = Path::from_rect(rect).to_string();
    let rule = background.grid_rule_path(rect);
    let rule_color = match background.kind() {
        inkboard_model::component::BackgroundKind::Grid {
            secondary_color, ..
        } => secondary_color.to_hex_string(),
        _ => String::new(),
    };

    renderer.with_xml(|xml| match rule {
        Some(rule_path) => {
            xml.start_element("g");
            xml.write_attribute("class", &classes);

            xml.start_element("path");
            xml.write_attribute("d", &fill_d);
            xml.write_attribute("fill", &fill);
            xml.end_element();

            xml.start_element("path");
            xml.write_attribute("d", &rule_path.to_string());
            xml.write_attribute("fill", "none");
            xml.write_attribute("stroke", &rule_color);
            xml.write_attribute("stroke-width", &format_coordinate(GRID_STROKE_WIDTH));
            xml.end_element();

            xml.end_element();
        }
        None => {
            xml.start_element("path");
            xml.write_attribute("class", &classes);
            xml.write_attribute("d", &fill_d);
            xml.write_attribute("fill", &fill);
            xml.end_element();
        }
    });
}

fn write_extra_attributes(xml: &mut XmlWriter, extra: Option<&AttributeMap>) {
    if let Some(extra) = extra {
        for (name, value) in extra {
            xml.write_attribute(name, value);
        }
    }
}
