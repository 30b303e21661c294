// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The raster back-end: renders onto a `tiny_skia::Pixmap`.

use std::any::Any;

use inkboard_geom::{Color, Mat33, Rect2, Vec2};
use inkboard_model::render::{RenderableImage, Renderer, RendererState};
use inkboard_model::style::{RenderingStyle, TextRenderingStyle};
use inkboard_model::viewport::Viewport;

/// Curve-to-line approximation threshold on squared control-point
/// deltas, in screen pixels.
const CURVE_APPROX_SQ_DIST: f64 = 0.5;
const CURVE_APPROX_SQ_DIST_DRAFT: f64 = 9.0;

/// Objects smaller than this on screen are skipped outright.
const MIN_OBJECT_DIM: f64 = 1e-6;
const MAX_OBJECT_DIM_TO_SKIP: f64 = 0.2;
const MIN_OBJECT_DIM_DRAFT: f64 = 0.5;
const MAX_OBJECT_DIM_TO_SKIP_DRAFT: f64 = 2.0;

pub(crate) fn mat33_to_native(m: &Mat33) -> tiny_skia::Transform {
    tiny_skia::Transform::from_row(
        m.at(0, 0) as f32,
        m.at(1, 0) as f32,
        m.at(0, 1) as f32,
        m.at(1, 1) as f32,
        m.at(0, 2) as f32,
        m.at(1, 2) as f32,
    )
}

fn to_native_color(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        color.r.max(0.0).min(1.0) as f32,
        color.g.max(0.0).min(1.0) as f32,
        color.b.max(0.0).min(1.0) as f32,
        color.a.max(0.0).min(1.0) as f32,
    )
    .unwrap_or(tiny_skia::Color::TRANSPARENT)
}

/// A renderer drawing anti-aliased geometry onto an owned pixmap.
pub struct SurfaceRenderer {
    pixmap: tiny_skia::Pixmap,
    viewport: Viewport,
    state: RendererState,

    path_builder: tiny_skia::PathBuilder,
    cursor: Vec2,
    draft_mode: bool,

    objects_deep: usize,
    skip_below_depth: Option<usize>,
    clip: Option<tiny_skia::ClipMask>,
    clip_depth: usize,

    /// Number of path fills/strokes so far. Used by the cache tests.
    pub path_draw_count: usize,
    /// Number of pixmap blits so far. Used by the cache tests.
    pub blit_count: usize,
}

impl SurfaceRenderer {
    /// Creates a renderer over a fresh transparent pixmap.
    ///
    /// Returns `None` when the size is zero or the allocation fails.
    pub fn new(width: u32, height: u32, viewport: Viewport) -> Option<Self> {
        let pixmap = tiny_skia::Pixmap::new(width, height)?;
        Some(SurfaceRenderer {
            pixmap,
            viewport,
            state: RendererState::new(),
            path_builder: tiny_skia::PathBuilder::new(),
            cursor: Vec2::ZERO,
            draft_mode: false,
            objects_deep: 0,
            skip_below_depth: None,
            clip: None,
            clip_depth: 0,
            path_draw_count: 0,
            blit_count: 0,
        })
    }

    /// Creates a renderer whose viewport maps `region` (canvas space)
    /// onto the full pixmap. This is how cache tiles are rendered.
    pub fn for_region(width: u32, height: u32, region: Rect2) -> Option<Self> {
        let mut viewport = Viewport::new(Rect2::new(0.0, 0.0, f64::from(width), f64::from(height)));
        let scale = f64::from(width) / region.w.max(1e-12);
        viewport.reset_transform(
            Mat33::scaling_2d(scale, Vec2::ZERO)
                .right_mul(&Mat33::translation(-region.top_left())),
        );
        SurfaceRenderer::new(width, height, viewport)
    }

    /// Enables cheaper, lower-fidelity drawing (used during pans).
    pub fn set_draft_mode(&mut self, draft: bool) {
        self.draft_mode = draft;
    }

    /// Clears the surface and remaps it onto `region`, reusing the
    /// pixel allocation. Used when a cache record is reassigned.
    pub fn reset_for_region(&mut self, region: Rect2) {
        let width = f64::from(self.pixmap.width());
        let mut viewport = Viewport::new(Rect2::new(
            0.0,
            0.0,
            width,
            f64::from(self.pixmap.height()),
        ));
        let scale = width / region.w.max(1e-12);
        viewport.reset_transform(
            Mat33::scaling_2d(scale, Vec2::ZERO)
                .right_mul(&Mat33::translation(-region.top_left())),
        );
        self.viewport = viewport;
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    /// The rendered pixmap.
    pub fn pixmap(&self) -> &tiny_skia::Pixmap {
        &self.pixmap
    }

    /// Consumes the renderer, returning the pixmap.
    pub fn into_pixmap(self) -> tiny_skia::Pixmap {
        self.pixmap
    }

    /// Fills the whole surface with `color`.
    pub fn fill_all(&mut self, color: Color) {
        self.pixmap.fill(to_native_color(color));
    }

    fn skipping(&self) -> bool {
        self.skip_below_depth.is_some()
    }

    fn to_screen(&self, p: Vec2) -> Vec2 {
        let p = self.state.transform().transform_point(p);
        self.viewport.canvas_to_screen(p)
    }

    fn screen_scale(&self) -> f64 {
        self.viewport.scale_factor() * self.state.transform().scale_factor()
    }

    fn curve_threshold(&self) -> f64 {
        if self.draft_mode {
            CURVE_APPROX_SQ_DIST_DRAFT
        } else {
            CURVE_APPROX_SQ_DIST
        }
    }

    fn object_skip_thresholds(&self) -> (f64, f64) {
        if self.draft_mode {
            (MIN_OBJECT_DIM_DRAFT, MAX_OBJECT_DIM_TO_SKIP_DRAFT)
        } else {
            (MIN_OBJECT_DIM, MAX_OBJECT_DIM_TO_SKIP)
        }
    }

    fn screen_bbox(&self, rect: &Rect2) -> Rect2 {
        let with_extra = rect.transformed_bounding_box(&self.state.transform());
        with_extra.transformed_bounding_box(self.viewport.canvas_to_screen_transform())
    }
}

impl Renderer for SurfaceRenderer {
    fn display_size(&self) -> Vec2 {
        Vec2::new(f64::from(self.pixmap.width()), f64::from(self.pixmap.height()))
    }

    fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
        self.path_draw_count = 0;
        self.blit_count = 0;
    }

    fn state(&self) -> &RendererState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RendererState {
        &mut self.state
    }

    fn begin_path(&mut self, start: Vec2) {
        if self.skipping() {
            return;
        }
        self.path_builder = tiny_skia::PathBuilder::new();
        let p = self.to_screen(start);
        self.path_builder.move_to(p.x as f32, p.y as f32);
        self.cursor = start;
    }

    fn end_path(&mut self, style: &RenderingStyle) {
        if self.skipping() {
            return;
        }

        let builder = std::mem::replace(&mut self.path_builder, tiny_skia::PathBuilder::new());
        let path = match builder.finish() {
            Some(path) => path,
            None => return,
        };

        let mut paint = tiny_skia::Paint::default();
        paint.anti_alias = !self.draft_mode;

        if !style.fill.is_transparent() {
            paint.set_color(to_native_color(style.fill));
            self.pixmap.fill_path(
                &path,
                &paint,
                tiny_skia::FillRule::Winding,
                tiny_skia::Transform::identity(),
                self.clip.as_ref(),
            );
            self.path_draw_count += 1;
        }

        if let Some(ref stroke_style) = style.stroke {
            let width = (stroke_style.width * self.screen_scale()).max(0.1);
            let stroke = tiny_skia::Stroke {
                width: width as f32,
                line_cap: tiny_skia::LineCap::Round,
                line_join: tiny_skia::LineJoin::Round,
                ..tiny_skia::Stroke::default()
            };
            paint.set_color(to_native_color(stroke_style.color));
            self.pixmap.stroke_path(
                &path,
                &paint,
                &stroke,
                tiny_skia::Transform::identity(),
                self.clip.as_ref(),
            );
            self.path_draw_count += 1;
        }
    }

    fn move_to(&mut self, p: Vec2) {
        if self.skipping() {
            return;
        }
        let screen = self.to_screen(p);
        self.path_builder.move_to(screen.x as f32, screen.y as f32);
        self.cursor = p;
    }

    fn line_to(&mut self, p: Vec2) {
        if self.skipping() {
            return;
        }
        let screen = self.to_screen(p);
        self.path_builder.line_to(screen.x as f32, screen.y as f32);
        self.cursor = p;
    }

    fn trace_quadratic_to(&mut self, control: Vec2, end: Vec2) {
        if self.skipping() {
            return;
        }

        let start = self.to_screen(self.cursor);
        let control_screen = self.to_screen(control);
        let end_screen = self.to_screen(end);

        // Nearly-flat curves draw as lines; the threshold loosens in
        // draft mode.
        let threshold = self.curve_threshold();
        if (control_screen - start).length_squared() < threshold
            && (end_screen - control_screen).length_squared() < threshold
        {
            self.path_builder.line_to(end_screen.x as f32, end_screen.y as f32);
        } else {
            self.path_builder.quad_to(
                control_screen.x as f32,
                control_screen.y as f32,
                end_screen.x as f32,
                end_screen.y as f32,
            );
        }
        self.cursor = end;
    }

    fn trace_cubic_to(&mut self, control1: Vec2, control2: Vec2, end: Vec2) {
        if self.skipping() {
            return;
        }

        let start = self.to_screen(self.cursor);
        let c1 = self.to_screen(control1);
        let c2 = self.to_screen(control2);
        let end_screen = self.to_screen(end);

        let threshold = self.curve_threshold();
        if (c1 - start).length_squared() < threshold
            && (end_screen - c2).length_squared() < threshold
        {
            self.path_builder.line_to(end_screen.x as f32, end_screen.y as f32);
        } else {
            self.path_builder.cubic_to(
                c1.x as f32,
                c1.y as f32,
                c2.x as f32,
                c2.y as f32,
                end_screen.x as f32,
                end_screen.y as f32,
            );
        }
        self.cursor = end;
    }

    fn on_start_object(&mut self, bbox: &Rect2, clipped: bool) {
        self.objects_deep += 1;
        if self.skipping() {
            return;
        }

        let screen_bbox = self.screen_bbox(bbox);
        let (min_dim, max_dim) = self.object_skip_thresholds();
        if screen_bbox.min_dimension() < min_dim || screen_bbox.max_dimension() < max_dim {
            // Too small to produce output; skip the object and its
            // children.
            self.skip_below_depth = Some(self.objects_deep);
            return;
        }

        if clipped {
            let mut mask = tiny_skia::ClipMask::new();
            let rect = tiny_skia::Rect::from_xywh(
                screen_bbox.x as f32,
                screen_bbox.y as f32,
                screen_bbox.w.max(1e-3) as f32,
                screen_bbox.h.max(1e-3) as f32,
            );
            if let Some(rect) = rect {
                let path = tiny_skia::PathBuilder::from_rect(rect);
                if mask
                    .set_path(
                        self.pixmap.width(),
                        self.pixmap.height(),
                        &path,
                        tiny_skia::FillRule::Winding,
                        false,
                    )
                    .is_some()
                {
                    self.clip = Some(mask);
                    self.clip_depth = self.objects_deep;
                }
            }
        }
    }

    fn on_end_object(&mut self, _load_save_data: Option<&inkboard_model::component::AttributeMap>) {
        if self.skip_below_depth == Some(self.objects_deep) {
            self.skip_below_depth = None;
        }
        if self.clip_depth == self.objects_deep {
            self.clip = None;
            self.clip_depth = 0;
        }
        self.objects_deep = self.objects_deep.saturating_sub(1);
    }

    fn draw_text(&mut self, text: &str, transform: &Mat33, style: &TextRenderingStyle) {
        if self.skipping() {
            return;
        }

        // Glyph rasterization needs a host font engine; the raster
        // back-end stands in with the measured text box so layout stays
        // visible.
        let bbox = inkboard_model::component::text_size_of(text, style);
        let outline = inkboard_geom::Path::from_rect(bbox)
            .transformed_by(&self.state.transform().right_mul(transform));

        let fill = style.rendering_style.fill;
        let placeholder = RenderingStyle::fill_only(Color::rgba(fill.r, fill.g, fill.b, fill.a * 0.2));

        self.trace_path(&outline, true);
        self.end_path(&placeholder);
    }

    fn draw_image(&mut self, image: &RenderableImage) {
        if self.skipping() {
            return;
        }

        // Decoding is the host's concern; mark the image's footprint.
        let rect = Rect2::new(0.0, 0.0, image.size.x, image.size.y);
        let outline =
            inkboard_geom::Path::from_rect(rect).transformed_by(&image.transform);
        let placeholder = RenderingStyle {
            fill: Color::rgba(0.5, 0.5, 0.5, 0.2),
            stroke: Some(inkboard_model::style::StrokeStyle {
                color: Color::rgba(0.3, 0.3, 0.3, 0.6),
                width: 1.0 / self.screen_scale().max(1e-6),
            }),
        };
        self.trace_path(&outline, true);
        self.end_path(&placeholder);
    }

    fn is_too_small_to_render(&self, rect: &Rect2) -> bool {
        let screen_bbox = self.screen_bbox(rect);
        let (min_dim, max_dim) = self.object_skip_thresholds();
        screen_bbox.min_dimension() < min_dim || screen_bbox.max_dimension() < max_dim
    }

    fn can_render_from_without_data_loss(&self, other: &dyn Renderer) -> bool {
        other.as_any().is::<SurfaceRenderer>()
    }

    fn render_from_other_of_same_type(&mut self, transform: Mat33, other: &mut dyn Renderer) {
        let other = match other.as_any_mut().downcast_mut::<SurfaceRenderer>() {
            Some(other) => other,
            None => {
                log::warn!("render_from_other_of_same_type: back-end mismatch");
                return;
            }
        };

        let paint = tiny_skia::PixmapPaint {
            quality: tiny_skia::FilterQuality::Bilinear,
            ..tiny_skia::PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(
            0,
            0,
            other.pixmap.as_ref(),
            &paint,
            mat33_to_native(&transform),
            self.clip.as_ref(),
        );
        self.blit_count += 1;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_geom::Path;
    use inkboard_model::render::RenderablePathSpec;

    fn renderer(size: u32) -> SurfaceRenderer {
        SurfaceRenderer::new(
            size,
            size,
            Viewport::new(Rect2::new(0.0, 0.0, f64::from(size), f64::from(size))),
        )
        .unwrap()
    }

    fn pixel(renderer: &SurfaceRenderer, x: u32, y: u32) -> tiny_skia::PremultipliedColorU8 {
        renderer.pixmap().pixel(x, y).unwrap()
    }

    #[test]
    fn fills_are_visible() {
        let mut renderer = renderer(50);
        renderer.draw_path(&RenderablePathSpec {
            path: Path::from_rect(Rect2::new(10.0, 10.0, 20.0, 20.0)),
            style: RenderingStyle::fill_only(Color::BLACK),
        });

        assert_eq!(renderer.path_draw_count, 1);
        assert!(pixel(&renderer, 20, 20).alpha() > 0);
        assert_eq!(pixel(&renderer, 45, 45).alpha(), 0);
    }

    #[test]
    fn tiny_objects_are_skipped() {
        let mut renderer = renderer(50);
        let tiny = Rect2::new(10.0, 10.0, 0.05, 0.05);
        renderer.start_object(&tiny, false);
        renderer.draw_path(&RenderablePathSpec {
            path: Path::from_rect(tiny),
            style: RenderingStyle::fill_only(Color::BLACK),
        });
        renderer.end_object(None);
        assert_eq!(renderer.path_draw_count, 0);
    }

    #[test]
    fn clipping_limits_output() {
        let mut renderer = renderer(50);
        let clip_region = Rect2::new(0.0, 0.0, 10.0, 10.0);
        renderer.start_object(&clip_region, true);
        renderer.draw_path(&RenderablePathSpec {
            path: Path::from_rect(Rect2::new(0.0, 0.0, 40.0, 40.0)),
            style: RenderingStyle::fill_only(Color::BLACK),
        });
        renderer.end_object(None);

        assert!(pixel(&renderer, 5, 5).alpha() > 0);
        assert_eq!(pixel(&renderer, 30, 30).alpha(), 0);
    }

    #[test]
    fn blits_between_surfaces() {
        let mut source = renderer(20);
        source.fill_all(Color::BLACK);

        let mut dest = renderer(20);
        dest.render_from_other_of_same_type(Mat33::IDENTITY, &mut source);
        assert_eq!(dest.blit_count, 1);
        assert!(pixel(&dest, 10, 10).alpha() > 0);
    }

    #[test]
    fn region_renderer_maps_canvas_to_tile() {
        // A 100-unit region rendered at 50px: scale 0.5.
        let mut tile = SurfaceRenderer::for_region(50, 50, Rect2::new(100.0, 100.0, 100.0, 100.0))
            .unwrap();
        tile.draw_path(&RenderablePathSpec {
            path: Path::from_rect(Rect2::new(100.0, 100.0, 40.0, 40.0)),
            style: RenderingStyle::fill_only(Color::BLACK),
        });

        assert!(pixel(&tile, 10, 10).alpha() > 0);
        assert_eq!(pixel(&tile, 40, 40).alpha(), 0);
    }
}
