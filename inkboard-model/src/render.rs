// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The renderer contract implemented by raster and vector back-ends.

use std::any::Any;

use inkboard_geom::{Mat33, Path, PathCommand, Rect2, Vec2};

use crate::component::AttributeMap;
use crate::style::{RenderingStyle, TextRenderingStyle};
use crate::viewport::Viewport;

/// A path ready to draw: geometry plus style.
#[derive(Clone, PartialEq, Debug)]
pub struct RenderablePathSpec {
    #[allow(missing_docs)]
    pub path: Path,
    #[allow(missing_docs)]
    pub style: RenderingStyle,
}

/// An image ready to draw. The href stays opaque; decoding it is the
/// host's concern.
#[derive(Clone, PartialEq, Debug)]
pub struct RenderableImage {
    /// Image source, usually a data URL.
    pub href: String,
    /// Canvas transform positioning the image.
    pub transform: Mat33,
    /// The image's natural size.
    pub size: Vec2,
    /// Accessible description, if any.
    pub label: Option<String>,
}

/// Shared per-renderer bookkeeping for object grouping, path batching,
/// and the transform stack. Every back-end embeds one.
#[derive(Default)]
pub struct RendererState {
    in_object: bool,
    current_style: Option<RenderingStyle>,
    batched: Vec<Path>,
    transform: Option<Mat33>,
    transform_stack: Vec<Option<Mat33>>,
}

impl RendererState {
    /// Creates an empty state.
    pub fn new() -> Self {
        RendererState {
            in_object: false,
            current_style: None,
            batched: Vec::new(),
            transform: None,
            transform_stack: Vec::new(),
        }
    }

    /// Whether the renderer is currently inside an object.
    #[inline]
    pub fn in_object(&self) -> bool {
        self.in_object
    }

    /// The extra canvas transform currently in effect.
    #[inline]
    pub fn transform(&self) -> Mat33 {
        self.transform.unwrap_or(Mat33::IDENTITY)
    }
}

/// The abstract renderer the scene renders through.
///
/// Back-ends implement the low-level hooks (`begin_path` … `end_path`,
/// `on_start_object`/`on_end_object`) and get object grouping and
/// equal-style path coalescing from the provided methods: inside an
/// object, consecutive [`RenderablePathSpec`]s with the same style merge
/// into one outline so adjacent stroke segments do not show seams.
pub trait Renderer {
    /// The render target size in screen pixels.
    fn display_size(&self) -> Vec2;

    /// The viewport mapping canvas to screen coordinates.
    fn viewport(&self) -> &Viewport;

    /// Clears the target.
    fn clear(&mut self);

    /// Access to the shared renderer state.
    fn state(&self) -> &RendererState;

    /// Mutable access to the shared renderer state.
    fn state_mut(&mut self) -> &mut RendererState;

    /// Starts tracing an outline at `start`.
    fn begin_path(&mut self, start: Vec2);

    /// Finishes the current outline, filling/stroking it with `style`.
    fn end_path(&mut self, style: &RenderingStyle);

    /// Starts a new subpath of the current outline.
    fn move_to(&mut self, p: Vec2);

    #[allow(missing_docs)]
    fn line_to(&mut self, p: Vec2);

    #[allow(missing_docs)]
    fn trace_quadratic_to(&mut self, control: Vec2, end: Vec2);

    #[allow(missing_docs)]
    fn trace_cubic_to(&mut self, control1: Vec2, control2: Vec2, end: Vec2);

    /// Back-end hook: a component's object began.
    fn on_start_object(&mut self, _bbox: &Rect2, _clipped: bool) {}

    /// Back-end hook: the current object ended. `load_save_data` carries
    /// attributes preserved by the SVG codec.
    fn on_end_object(&mut self, _load_save_data: Option<&AttributeMap>) {}

    /// Back-end hook: the transform stack changed.
    fn on_transform_changed(&mut self) {}

    /// Draws text at `transform`.
    fn draw_text(&mut self, text: &str, transform: &Mat33, style: &TextRenderingStyle);

    /// Draws an image.
    fn draw_image(&mut self, image: &RenderableImage);

    /// Copies an unparsed SVG element through to the target.
    ///
    /// Only the vector back-end implements this; raster targets (and the
    /// sanitizing writer) ignore it.
    fn draw_svg_elem(&mut self, _tag: &str, _attributes: &AttributeMap, _text_content: &str) {}

    /// Marks the start of a component's rendering.
    fn start_object(&mut self, bbox: &Rect2, clipped: bool) {
        self.state_mut().in_object = true;
        self.on_start_object(bbox, clipped);
    }

    /// Marks the end of a component's rendering, flushing batched paths
    /// in the order they were received.
    fn end_object(&mut self, load_save_data: Option<&AttributeMap>) {
        self.flush_path_batch();
        self.state_mut().in_object = false;
        self.on_end_object(load_save_data);
    }

    /// Draws (or batches) a path.
    fn draw_path(&mut self, spec: &RenderablePathSpec) {
        if self.state().in_object {
            let style_changed = match self.state().current_style {
                Some(ref current) => *current != spec.style,
                None => false,
            };
            if style_changed {
                self.flush_path_batch();
            }

            let state = self.state_mut();
            state.current_style = Some(spec.style);
            state.batched.push(spec.path.clone());
        } else {
            self.trace_path(&spec.path, true);
            self.end_path(&spec.style);
        }
    }

    /// Emits any batched paths as a single outline.
    fn flush_path_batch(&mut self) {
        let (style, paths) = {
            let state = self.state_mut();
            (
                state.current_style.take(),
                std::mem::replace(&mut state.batched, Vec::new()),
            )
        };

        let style = match style {
            Some(style) if !paths.is_empty() => style,
            _ => return,
        };

        for (i, path) in paths.iter().enumerate() {
            self.trace_path(path, i == 0);
        }
        self.end_path(&style);
    }

    /// Traces `path` through the low-level hooks. With `begin` false the
    /// path joins the outline already being traced.
    fn trace_path(&mut self, path: &Path, begin: bool) {
        if begin {
            self.begin_path(path.start());
        } else {
            self.move_to(path.start());
        }

        for command in path.commands() {
            match *command {
                PathCommand::MoveTo(p) => self.move_to(p),
                PathCommand::LineTo(p) => self.line_to(p),
                PathCommand::QuadraticCurveTo(c, p) => self.trace_quadratic_to(c, p),
                PathCommand::CubicCurveTo(c1, c2, p) => self.trace_cubic_to(c1, c2, p),
            }
        }
    }

    /// Draws point markers; used for debugging overlays.
    fn draw_points(&mut self, points: &[Vec2]) {
        use inkboard_geom::Color;

        for p in points {
            let radius = 3.0 / self.viewport().scale_factor().max(1e-6);
            let spec = RenderablePathSpec {
                path: Path::from_rect(Rect2::new(
                    p.x - radius,
                    p.y - radius,
                    radius * 2.0,
                    radius * 2.0,
                )),
                style: RenderingStyle::fill_only(Color::rgba(1.0, 0.0, 0.0, 0.7)),
            };
            self.draw_path(&spec);
        }
    }

    /// Replaces the extra canvas transform (`None` resets it).
    fn set_transform(&mut self, transform: Option<Mat33>) {
        self.state_mut().transform = transform;
        self.on_transform_changed();
    }

    /// Pushes the current extra transform and composes `transform` on
    /// top of it.
    fn push_transform(&mut self, transform: Mat33) {
        let state = self.state_mut();
        let current = state.transform();
        state.transform_stack.push(state.transform);
        state.transform = Some(current.right_mul(&transform));
        self.on_transform_changed();
    }

    /// Restores the transform saved by the matching
    /// [`Renderer::push_transform`].
    fn pop_transform(&mut self) {
        let state = self.state_mut();
        match state.transform_stack.pop() {
            Some(prev) => state.transform = prev,
            None => log::warn!("pop_transform without a matching push"),
        }
        self.on_transform_changed();
    }

    /// Returns `true` when `rect` (canvas coordinates) is too small for
    /// this renderer to produce visible output.
    fn is_too_small_to_render(&self, _rect: &Rect2) -> bool {
        false
    }

    /// Whether this renderer can copy content out of `other` without
    /// quality loss (same back-end, compatible resolution).
    fn can_render_from_without_data_loss(&self, _other: &dyn Renderer) -> bool {
        false
    }

    /// Copies `other`'s target into this renderer under `transform`.
    ///
    /// Only meaningful when
    /// [`Renderer::can_render_from_without_data_loss`] returned `true`.
    fn render_from_other_of_same_type(&mut self, _transform: Mat33, _other: &mut dyn Renderer) {}

    /// Downcasting support for back-end-specific fast paths.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcasting support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A renderer that records draw calls and renders nothing. Used by tests
/// and by rendering-time estimation.
pub struct DummyRenderer {
    viewport: Viewport,
    /// Number of `end_path` calls so far.
    pub path_count: usize,
    /// Number of objects started so far.
    pub object_count: usize,
    state: RendererState,
}

impl DummyRenderer {
    /// Creates a recording renderer with the given viewport.
    pub fn new(viewport: Viewport) -> Self {
        DummyRenderer {
            viewport,
            path_count: 0,
            object_count: 0,
            state: RendererState::new(),
        }
    }
}

impl Renderer for DummyRenderer {
    fn display_size(&self) -> Vec2 {
        self.viewport.screen_rect().size()
    }

    fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    fn clear(&mut self) {
        self.path_count = 0;
        self.object_count = 0;
    }

    fn state(&self) -> &RendererState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RendererState {
        &mut self.state
    }

    fn begin_path(&mut self, _start: Vec2) {}

    fn end_path(&mut self, _style: &RenderingStyle) {
        self.path_count += 1;
    }

    fn move_to(&mut self, _p: Vec2) {}

    fn line_to(&mut self, _p: Vec2) {}

    fn trace_quadratic_to(&mut self, _control: Vec2, _end: Vec2) {}

    fn trace_cubic_to(&mut self, _control1: Vec2, _control2: Vec2, _end: Vec2) {}

    fn on_start_object(&mut self, _bbox: &Rect2, _clipped: bool) {
        self.object_count += 1;
    }

    fn draw_text(&mut self, _text: &str, _transform: &Mat33, _style: &TextRenderingStyle) {}

    fn draw_image(&mut self, _image: &RenderableImage) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
