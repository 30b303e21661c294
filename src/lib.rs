// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
[inkboard](https://github.com/inkboard/inkboard) is a vector whiteboard
engine.

Pointer samples become piecewise-quadratic stroke ribbons
(`inkboard_model::StrokeBuilder`), strokes live in an editable,
spatially indexed scene (`inkboard_model::EditorImage`) mutated through
reversible commands, and the visible portion renders through a
hierarchical tile cache onto raster ([`SurfaceRenderer`], `tiny-skia`)
or vector ([`SvgRenderer`]) surfaces.
*/

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::uninlined_format_args)]

pub use inkboard_geom as geom;
pub use inkboard_model as model;
pub use tiny_skia;

mod cache;
mod raster;
mod svg_writer;

pub use cache::{
    CacheProps, CacheRecord, CacheRecordManager, CacheRecordRef, CacheStats, RenderingCache,
};
pub use raster::SurfaceRenderer;
pub use svg_writer::{render_to_svg_string, SvgExportOptions, SvgRenderer};

use inkboard_geom::{Color, Mat33, Rect2, Vec2};
use inkboard_model::editor::EditorImage;
use inkboard_model::viewport::Viewport;
use inkboard_model::Renderer;

/// Builds a viewport that maps `source` (canvas space) onto a
/// `width`×`height` pixel target, preserving aspect ratio.
pub fn fitting_viewport(source: Rect2, width: u32, height: u32) -> Viewport {
    let mut viewport = Viewport::new(Rect2::new(0.0, 0.0, f64::from(width), f64::from(height)));
    if source.w <= 0.0 || source.h <= 0.0 {
        return viewport;
    }

    let scale = (f64::from(width) / source.w).min(f64::from(height) / source.h);
    viewport.reset_transform(
        Mat33::scaling_2d(scale, Vec2::ZERO).right_mul(&Mat33::translation(-source.top_left())),
    );
    viewport
}

/// Renders `image`'s export rectangle onto a fresh pixmap.
///
/// `background` pre-fills the surface (exported documents are
/// transparent by default). Returns `None` when the pixmap cannot be
/// allocated.
pub fn render_to_pixmap(
    image: &EditorImage,
    width: u32,
    height: u32,
    background: Option<Color>,
) -> Option<tiny_skia::Pixmap> {
    let viewport = fitting_viewport(image.import_export_rect(), width, height);
    let mut renderer = SurfaceRenderer::new(width, height, viewport)?;
    if let Some(color) = background {
        renderer.fill_all(color);
    }

    let visible = renderer.viewport().visible_rect();
    image.render_all(&mut renderer, &visible);
    Some(renderer.into_pixmap())
}
