// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cache behavior over a real scene: repeated renders serve from the
//! backing surfaces, small top-of-stack edits update incrementally.

use inkboard::{RenderingCache, SurfaceRenderer};
use inkboard_geom::{Color, Path, Rect2};
use inkboard_model::component::{into_ref, Component, Stroke, StrokePart};
use inkboard_model::editor::EditorImage;
use inkboard_model::render::Renderer;
use inkboard_model::style::RenderingStyle;
use inkboard_model::viewport::Viewport;

fn boxy_stroke(x: f64, y: f64) -> Component {
    Component::Stroke(Stroke::new(vec![StrokePart {
        path: Path::from_rect(Rect2::new(x, y, 12.0, 12.0)),
        style: RenderingStyle::fill_only(Color::BLACK),
    }]))
}

fn scene_with_components(count: usize) -> EditorImage {
    let mut image = EditorImage::new(Rect2::new(0.0, 0.0, 600.0, 600.0));
    for i in 0..count {
        let x = (i % 10) as f64 * 55.0 + 5.0;
        let y = (i / 10) as f64 * 55.0 + 5.0;
        image.insert_component(into_ref(boxy_stroke(x, y)));
    }
    image
}

fn screen() -> SurfaceRenderer {
    SurfaceRenderer::new(600, 600, Viewport::new(Rect2::new(0.0, 0.0, 600.0, 600.0))).unwrap()
}

#[test]
fn identical_rerenders_come_from_the_cache() {
    let image = scene_with_components(50);
    let viewport = Viewport::new(Rect2::new(0.0, 0.0, 600.0, 600.0));
    let mut cache = RenderingCache::default();
    let mut renderer = screen();

    cache.render(&mut renderer, &image, &viewport);
    assert_eq!(cache.stats.tile_component_renders, 50);
    assert!(cache.stats.blits >= 1);

    // Second render with an identical scene and viewport: everything
    // comes from the backing surfaces.
    renderer.clear();
    cache.render(&mut renderer, &image, &viewport);
    assert_eq!(cache.stats.tile_component_renders, 0);
    assert_eq!(cache.stats.direct_component_renders, 0);
    assert!(cache.stats.blits >= 1);
}

#[test]
fn cached_renders_are_reproducible() {
    let image = scene_with_components(50);
    let viewport = Viewport::new(Rect2::new(0.0, 0.0, 600.0, 600.0));
    let mut cache = RenderingCache::default();

    let mut first = screen();
    cache.render(&mut first, &image, &viewport);
    let first_pixels = first.pixmap().data().to_vec();

    let mut second = screen();
    cache.render(&mut second, &image, &viewport);
    assert_eq!(first_pixels, second.pixmap().data());
}

#[test]
fn new_topmost_content_updates_incrementally() {
    let mut image = scene_with_components(50);
    let viewport = Viewport::new(Rect2::new(0.0, 0.0, 600.0, 600.0));
    let mut cache = RenderingCache::default();
    let mut renderer = screen();

    cache.render(&mut renderer, &image, &viewport);

    // One new component above everything else: only it is drawn onto
    // the backing surface, without a full clear.
    image.insert_component(into_ref(boxy_stroke(300.0, 300.0)));
    renderer.clear();
    cache.render(&mut renderer, &image, &viewport);
    assert_eq!(cache.stats.tile_component_renders, 1);
    assert!(cache.stats.blits >= 1);
}

#[test]
fn editing_a_component_invalidates_its_region() {
    let mut image = scene_with_components(10);
    let viewport = Viewport::new(Rect2::new(0.0, 0.0, 600.0, 600.0));
    let mut cache = RenderingCache::default();
    let mut renderer = screen();

    cache.render(&mut renderer, &image, &viewport);
    let rendered_first = cache.stats.tile_component_renders;
    assert!(rendered_first > 0);

    // Restyle-style edit: the freshness token changes, so the tile
    // rerenders (the edit is not above everything, so no append path).
    let id = image.all_elements()[0].borrow().id();
    image.queue_rerender_of(id);

    renderer.clear();
    cache.render(&mut renderer, &image, &viewport);
    assert!(
        cache.stats.tile_component_renders > 0,
        "edited content must be rerendered"
    );
}

#[test]
fn vector_targets_fall_back_to_direct_rendering() {
    let image = scene_with_components(5);
    let viewport = Viewport::new(Rect2::new(0.0, 0.0, 600.0, 600.0));
    let mut cache = RenderingCache::default();

    let mut svg = inkboard::SvgRenderer::new(Rect2::new(0.0, 0.0, 600.0, 600.0), false);
    cache.render(&mut svg, &image, &viewport);
    let text = svg.end_document();
    assert!(text.contains("<path"), "direct rendering still draws: {}", text);
    assert_eq!(cache.stats.blits, 0);
}
