// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The hierarchical tile cache.
//!
//! Canvas space is covered by a tree of square tiles, each interior node
//! holding a 3×3 grid of children. A tile remembers the sorted leaf-node
//! ids it rendered (its freshness token list); matching tokens mean the
//! backing surface can be blitted as-is. Backing surfaces come from a
//! bounded LRU pool.

mod records;

pub use records::{CacheRecord, CacheRecordManager, CacheRecordRef};

use std::sync::atomic::{AtomicU64, Ordering};

use inkboard_geom::{Mat33, Rect2, Vec2};
use inkboard_model::editor::EditorImage;
use inkboard_model::render::Renderer;
use inkboard_model::scene::SceneLeaf;
use inkboard_model::viewport::Viewport;

use crate::raster::SurfaceRenderer;

static NEXT_TILE_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_tile_id() -> u64 {
    NEXT_TILE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Cache tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct CacheProps {
    /// Tile surface resolution (BR×BR pixels).
    pub block_resolution: u32,
    /// Total byte budget for backing surfaces.
    pub cache_size_bytes: usize,
    /// Maximum screen pixels one cached canvas pixel may stretch to
    /// before the cache recurses into smaller tiles.
    pub max_scale: f64,
    /// Minimum summed proportional rendering time of a tile's content
    /// before caching it pays off.
    pub min_proportional_render_time_to_cache: f64,
}

impl Default for CacheProps {
    fn default() -> Self {
        CacheProps {
            block_resolution: 500,
            cache_size_bytes: 4 * 500 * 500 * 80,
            max_scale: 2.0,
            min_proportional_render_time_to_cache: 5.0,
        }
    }
}

/// Per-render counters, mostly for tests and diagnostics.
#[derive(Clone, Copy, Default, Debug)]
pub struct CacheStats {
    /// Components rendered onto backing surfaces this cycle.
    pub tile_component_renders: usize,
    /// Backing-surface blits to the screen this cycle.
    pub blits: usize,
    /// Components rendered directly to the screen this cycle.
    pub direct_component_renders: usize,
}

struct RenderContext<'a> {
    screen: &'a mut dyn Renderer,
    image: &'a EditorImage,
    viewport: &'a Viewport,
    records: &'a mut CacheRecordManager,
    cycle: u64,
    props: &'a CacheProps,
    stats: &'a mut CacheStats,
}

/// One square tile of canvas space.
struct CacheNode {
    id: u64,
    region: Rect2,
    children: Vec<Option<Box<CacheNode>>>,
    record: Option<CacheRecordRef>,
    rendered_ids: Vec<u64>,
    rendered_max_z: u64,
}

impl CacheNode {
    fn new(region: Rect2) -> Self {
        CacheNode {
            id: fresh_tile_id(),
            region,
            children: (0..9).map(|_| None).collect(),
            record: None,
            rendered_ids: Vec::new(),
            rendered_max_z: 0,
        }
    }

    /// Whether this tile still owns its backing surface (the LRU pool
    /// may have reassigned it).
    fn record_valid(&self) -> bool {
        match self.record {
            Some(ref record) => record.borrow().owner_tile == Some(self.id),
            None => false,
        }
    }

    /// Descends to the smallest node whose region contains `rect`,
    /// creating nodes along the way.
    fn smallest_containing(&mut self, rect: &Rect2) -> &mut CacheNode {
        let sub_regions = self.region.divide_into_grid(3, 3);
        let index = sub_regions.iter().position(|r| r.contains_rect(rect));
        match index {
            Some(i) => {
                let region = sub_regions[i];
                let child = self.children[i]
                    .get_or_insert_with(|| Box::new(CacheNode::new(region)));
                child.smallest_containing(rect)
            }
            None => self,
        }
    }

    /// Leaves intersecting this tile, in stacking order, pruned by the
    /// screen renderer's visibility threshold.
    fn collect_leaves(&self, ctx: &RenderContext) -> Vec<SceneLeaf> {
        let screen: &dyn Renderer = &*ctx.screen;
        let too_small = |bbox: &Rect2| screen.is_too_small_to_render(bbox);
        ctx.image
            .elements_intersecting(&self.region, Some(&too_small))
    }

    fn sorted_ids(leaves: &[SceneLeaf]) -> Vec<u64> {
        let mut ids: Vec<u64> = leaves.iter().map(|leaf| leaf.node_id).collect();
        ids.sort_unstable();
        ids
    }

    fn max_z(leaves: &[SceneLeaf]) -> u64 {
        leaves
            .iter()
            .map(|leaf| leaf.component.borrow().z_index())
            .max()
            .unwrap_or(0)
    }

    /// The per-tile rendering decision procedure.
    fn render_region(&mut self, ctx: &mut RenderContext, visible: &Rect2) {
        // Too blurry at this level: one cached canvas pixel would cover
        // more than `max_scale` screen pixels. Recurse for sharpness.
        let tile_scale = ctx.viewport.scale_factor() * self.region.w
            / f64::from(ctx.props.block_resolution);
        if tile_scale > ctx.props.max_scale {
            self.render_via_children(ctx, visible);
            return;
        }

        let leaves = self.collect_leaves(ctx);
        let ids = Self::sorted_ids(&leaves);

        if self.record_valid() && self.rendered_ids == ids {
            self.blit(ctx);
            return;
        }

        // Children covering the same area and individually fresh are
        // cheaper than rerendering this level.
        if self.all_children_fresh(ctx, visible) {
            self.render_via_children(ctx, visible);
            return;
        }

        let total_time: f64 = leaves
            .iter()
            .map(|leaf| leaf.component.borrow().proportional_rendering_time())
            .sum();

        if total_time >= ctx.props.min_proportional_render_time_to_cache {
            if self.render_to_tile(ctx, &leaves, ids) {
                self.blit(ctx);
                return;
            }
        }

        // Cheap (or unallocatable) content: draw straight to the screen,
        // clipped to the region grown by one screen pixel so adjacent
        // tiles do not show seams.
        let one_px = 1.0 / ctx.viewport.scale_factor().max(1e-12);
        let clip = match self.region.grown_by(one_px).intersection(visible) {
            Some(overlap) => overlap.grown_by(one_px),
            None => return,
        };
        ctx.screen.start_object(&clip, true);
        for leaf in &leaves {
            leaf.component.borrow().render(ctx.screen, Some(&clip));
            ctx.stats.direct_component_renders += 1;
        }
        ctx.screen.end_object(None);
    }

    fn render_via_children(&mut self, ctx: &mut RenderContext, visible: &Rect2) {
        let sub_regions = self.region.divide_into_grid(3, 3);
        for (i, sub_region) in sub_regions.iter().enumerate() {
            if !sub_region.intersects(visible) {
                continue;
            }
            let child = self.children[i]
                .get_or_insert_with(|| Box::new(CacheNode::new(*sub_region)));
            child.render_region(ctx, visible);
        }
    }

    /// True when children exist for every visible subregion and each is
    /// bit-for-bit up to date.
    fn all_children_fresh(&self, ctx: &RenderContext, visible: &Rect2) -> bool {
        if self.children.iter().all(Option::is_none) {
            return false;
        }

        let sub_regions = self.region.divide_into_grid(3, 3);
        for (i, sub_region) in sub_regions.iter().enumerate() {
            if !sub_region.intersects(visible) {
                continue;
            }
            let child = match self.children[i] {
                Some(ref child) => child,
                None => return false,
            };
            if !child.record_valid() {
                return false;
            }

            let child_leaves = child.collect_leaves(ctx);
            if child.rendered_ids != Self::sorted_ids(&child_leaves) {
                return false;
            }
        }
        true
    }

    /// Renders `leaves` onto the backing surface. Returns `false` when
    /// no surface could be obtained.
    fn render_to_tile(
        &mut self,
        ctx: &mut RenderContext,
        leaves: &[SceneLeaf],
        ids: Vec<u64>,
    ) -> bool {
        // Append-only update: when the only change is new content above
        // everything already cached, skip the clear and draw the new
        // leaves on top.
        if self.record_valid() && is_sorted_subset(&self.rendered_ids, &ids) {
            let added: Vec<&SceneLeaf> = leaves
                .iter()
                .filter(|leaf| self.rendered_ids.binary_search(&leaf.node_id).is_err())
                .collect();
            let appendable = added
                .iter()
                .all(|leaf| leaf.component.borrow().z_index() > self.rendered_max_z);

            if appendable {
                if let Some(ref record) = self.record {
                    let mut borrowed = record.borrow_mut();
                    borrowed.last_used_cycle = ctx.cycle;
                    for leaf in &added {
                        leaf.component
                            .borrow()
                            .render(&mut borrowed.surface, Some(&self.region));
                        ctx.stats.tile_component_renders += 1;
                    }
                }
                self.rendered_max_z = self.rendered_max_z.max(Self::max_z(leaves));
                self.rendered_ids = ids;
                return true;
            }
        }

        let record = if self.record_valid() {
            match self.record {
                Some(ref record) => {
                    record.borrow_mut().surface.reset_for_region(self.region);
                    Some(CacheRecordRef::clone(record))
                }
                None => None,
            }
        } else {
            ctx.records.alloc(self.id, self.region, ctx.cycle)
        };

        let record = match record {
            Some(record) => record,
            None => return false,
        };

        {
            let mut borrowed = record.borrow_mut();
            borrowed.last_used_cycle = ctx.cycle;
            for leaf in leaves {
                leaf.component
                    .borrow()
                    .render(&mut borrowed.surface, Some(&self.region));
                ctx.stats.tile_component_renders += 1;
            }
        }

        self.record = Some(record);
        self.rendered_max_z = Self::max_z(leaves);
        self.rendered_ids = ids;
        true
    }

    /// Draws the backing surface to the screen through the inverse of
    /// the tile's canvas-to-tile transform.
    fn blit(&mut self, ctx: &mut RenderContext) {
        let record = match self.record {
            Some(ref record) => record,
            None => return,
        };

        let tile_to_canvas = Mat33::translation(self.region.top_left()).right_mul(
            &Mat33::scaling_2d(
                self.region.w / f64::from(ctx.props.block_resolution),
                Vec2::ZERO,
            ),
        );
        let to_screen = ctx
            .screen
            .viewport()
            .canvas_to_screen_transform()
            .right_mul(&tile_to_canvas);

        let mut borrowed = record.borrow_mut();
        borrowed.last_used_cycle = ctx.cycle;
        ctx.screen
            .render_from_other_of_same_type(to_screen, &mut borrowed.surface);
        ctx.stats.blits += 1;
    }
}

/// Both slices sorted ascending: is every element of `smaller` in
/// `larger`?
fn is_sorted_subset(smaller: &[u64], larger: &[u64]) -> bool {
    let mut it = larger.iter();
    'outer: for needle in smaller {
        for candidate in it.by_ref() {
            if candidate == needle {
                continue 'outer;
            }
            if candidate > needle {
                return false;
            }
        }
        return false;
    }
    true
}

/// The rendering cache: reuses off-screen rasterizations across
/// viewport changes and small edits.
pub struct RenderingCache {
    root: Option<CacheNode>,
    records: CacheRecordManager,
    props: CacheProps,
    cycle: u64,
    /// Counters for the most recent render call.
    pub stats: CacheStats,
}

impl RenderingCache {
    /// Creates a cache with the given tuning.
    pub fn new(props: CacheProps) -> Self {
        RenderingCache {
            root: None,
            records: CacheRecordManager::new(props.cache_size_bytes, props.block_resolution),
            props,
            cycle: 0,
            stats: CacheStats::default(),
        }
    }

    /// The current rendering cycle number.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Renders `image` through the cache onto `screen`.
    ///
    /// Falls back to direct rendering when `screen` is not a raster
    /// surface (vector targets cannot host cached pixels).
    pub fn render(&mut self, screen: &mut dyn Renderer, image: &EditorImage, viewport: &Viewport) {
        self.cycle += 1;
        self.stats = CacheStats::default();

        let visible = viewport.visible_rect();
        if screen.as_any().downcast_ref::<SurfaceRenderer>().is_none() {
            image.render_all(screen, &visible);
            return;
        }

        self.ensure_root_contains(&visible);
        let root = match self.root {
            Some(ref mut root) => root,
            None => return,
        };

        let mut ctx = RenderContext {
            screen,
            image,
            viewport,
            records: &mut self.records,
            cycle: self.cycle,
            props: &self.props,
            stats: &mut self.stats,
        };

        let target = root.smallest_containing(&visible);
        target.render_region(&mut ctx, &visible);
    }

    /// Grows (or creates) the root so it contains `visible`. Growth
    /// reparents the current root as the center child, tripling the
    /// covered span each step.
    fn ensure_root_contains(&mut self, visible: &Rect2) {
        if self.root.is_none() {
            let side = visible.max_dimension().max(1.0);
            self.root = Some(CacheNode::new(Rect2::new(
                visible.x, visible.y, side, side,
            )));
        }

        loop {
            let region = match self.root {
                Some(ref root) => root.region,
                None => return,
            };
            if region.contains_rect(visible) {
                return;
            }

            let old_root = match self.root.take() {
                Some(root) => root,
                None => return,
            };
            let mut new_root = CacheNode::new(Rect2::new(
                region.x - region.w,
                region.y - region.h,
                region.w * 3.0,
                region.h * 3.0,
            ));
            new_root.children[4] = Some(Box::new(old_root));
            self.root = Some(new_root);
        }
    }
}

impl Default for RenderingCache {
    fn default() -> Self {
        RenderingCache::new(CacheProps::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_subset_checks() {
        assert!(is_sorted_subset(&[], &[1, 2, 3]));
        assert!(is_sorted_subset(&[2], &[1, 2, 3]));
        assert!(is_sorted_subset(&[1, 3], &[1, 2, 3]));
        assert!(!is_sorted_subset(&[4], &[1, 2, 3]));
        assert!(!is_sorted_subset(&[1, 2, 3], &[1, 3]));
    }

    #[test]
    fn root_growth_keeps_old_root_centered() {
        let mut cache = RenderingCache::default();
        cache.ensure_root_contains(&Rect2::new(0.0, 0.0, 100.0, 100.0));
        let first_region = cache.root.as_ref().unwrap().region;
        assert!(first_region.contains_rect(&Rect2::new(0.0, 0.0, 100.0, 100.0)));

        // Far outside the first root: the root must grow, keeping the
        // old root as the center child of each growth step.
        cache.ensure_root_contains(&Rect2::new(-500.0, -500.0, 100.0, 100.0));
        let root = cache.root.as_ref().unwrap();
        assert!(root.region.contains_rect(&Rect2::new(-500.0, -500.0, 100.0, 100.0)));
        assert!(root.region.w > first_region.w);
        assert!(root.children[4].is_some());
    }
}
