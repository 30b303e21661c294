// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The bounding-box tree indexing scene components.

use std::sync::atomic::{AtomicU64, Ordering};

use inkboard_geom::Rect2;

use crate::component::{ComponentId, ComponentRef};

/// Maximum children per interior node before a split.
const MAX_CHILDREN: usize = 30;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_node_id() -> u64 {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A leaf visible to a spatial query: the freshness token plus the
/// component stored there.
#[derive(Clone)]
pub struct SceneLeaf {
    /// The leaf node's id. Changes whenever the content changes, so the
    /// rendering cache uses it as a freshness token.
    pub node_id: u64,
    /// The component at this leaf.
    pub component: ComponentRef,
}

/// A node of the scene's bounding-box tree.
///
/// A node holds either one content component or up to [`MAX_CHILDREN`]
/// children, never both. An interior node's bbox is the union of its
/// children's bboxes.
pub struct SceneNode {
    node_id: u64,
    bbox: Rect2,
    content: Option<ComponentRef>,
    children: Vec<SceneNode>,
}

impl SceneNode {
    /// Creates an empty root.
    pub fn new() -> Self {
        SceneNode {
            node_id: fresh_node_id(),
            bbox: Rect2::EMPTY,
            content: None,
            children: Vec::new(),
        }
    }

    fn leaf_with_id(component: ComponentRef, bbox: Rect2, node_id: u64) -> Self {
        SceneNode {
            node_id,
            bbox,
            content: Some(component),
            children: Vec::new(),
        }
    }

    /// The node's freshness token.
    #[inline]
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// The node's bounding box.
    #[inline]
    pub fn bbox(&self) -> Rect2 {
        self.bbox
    }

    /// Returns `true` if the node stores nothing at all.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.children.is_empty()
    }

    /// Inserts a component, keeping the tree balanced.
    pub fn add_leaf(&mut self, component: ComponentRef) {
        let new_bbox = component.borrow().content_bbox();
        self.add_leaf_inner(component, new_bbox);
        self.collapse_single_chains();
    }

    fn add_leaf_inner(&mut self, component: ComponentRef, new_bbox: Rect2) {
        if self.content.is_none() && self.children.is_empty() {
            self.content = Some(component);
            self.bbox = new_bbox;
            self.node_id = fresh_node_id();
            return;
        }

        // Demote a content node to an interior node. The demoted child
        // keeps the old freshness token: its content did not change.
        if let Some(existing) = self.content.take() {
            let demoted = SceneNode::leaf_with_id(existing, self.bbox, self.node_id);
            self.children.push(demoted);
        }

        // The interior node along the path is structurally changed.
        self.node_id = fresh_node_id();

        let old_bbox = self.bbox;
        self.bbox = self.bbox.union(&new_bbox);

        // A leaf larger than this whole subtree becomes a direct child;
        // descending would force every interior bbox to grow anyway.
        if new_bbox.contains_rect(&old_bbox) {
            self.children
                .push(SceneNode::leaf_with_id(component, new_bbox, fresh_node_id()));
            self.split_if_needed();
            return;
        }

        // Descend into the smallest child that fully contains the new
        // leaf.
        let mut best: Option<(usize, f64)> = None;
        for (i, child) in self.children.iter().enumerate() {
            if child.bbox.contains_rect(&new_bbox) {
                let area = child.bbox.area();
                let better = match best {
                    Some((_, best_area)) => area < best_area,
                    None => true,
                };
                if better {
                    best = Some((i, area));
                }
            }
        }

        match best {
            Some((index, _)) => {
                self.children[index].add_leaf_inner(component, new_bbox);
            }
            None => {
                self.children
                    .push(SceneNode::leaf_with_id(component, new_bbox, fresh_node_id()));
                self.split_if_needed();
            }
        }
    }

    /// Groups the pre-existing children under one interior node once
    /// there are too many of them. The just-added child stays a direct
    /// sibling of the group.
    fn split_if_needed(&mut self) {
        if self.children.len() <= MAX_CHILDREN {
            return;
        }

        let newest = self.children.pop().unwrap();
        let grouped_children = std::mem::replace(&mut self.children, Vec::new());
        let mut grouped_bbox = Rect2::EMPTY;
        for (i, child) in grouped_children.iter().enumerate() {
            grouped_bbox = if i == 0 {
                child.bbox
            } else {
                grouped_bbox.union(&child.bbox)
            };
        }

        self.children.push(SceneNode {
            node_id: fresh_node_id(),
            bbox: grouped_bbox,
            content: None,
            children: grouped_children,
        });
        self.children.push(newest);
    }

    /// Collapses interior nodes left with a single child.
    fn collapse_single_chains(&mut self) {
        for child in &mut self.children {
            child.collapse_single_chains();
        }

        if self.content.is_none() && self.children.len() == 1 {
            let child = self.children.pop().unwrap();
            self.node_id = child.node_id;
            self.bbox = child.bbox;
            self.content = child.content;
            self.children = child.children;
        }
    }

    /// Removes the component with `id`. `bbox_hint` prunes the search.
    ///
    /// Returns the removed component. Afterwards, single-child interior
    /// nodes along the path are collapsed and bboxes recomputed.
    pub fn remove_component(
        &mut self,
        id: ComponentId,
        bbox_hint: Option<&Rect2>,
    ) -> Option<ComponentRef> {
        if let Some(hint) = bbox_hint {
            if !self.bbox.intersects(hint) {
                return None;
            }
        }

        if let Some(ref content) = self.content {
            if content.borrow().id() == id {
                let removed = self.content.take();
                self.bbox = Rect2::EMPTY;
                self.node_id = fresh_node_id();
                return removed;
            }
            return None;
        }

        let mut removed = None;
        for child in &mut self.children {
            if let Some(component) = child.remove_component(id, bbox_hint) {
                removed = Some(component);
                break;
            }
        }

        if removed.is_some() {
            self.node_id = fresh_node_id();
            self.children.retain(|child| !child.is_empty());
            self.collapse_single_chains();
            self.recompute_bbox();
        }
        removed
    }

    fn recompute_bbox(&mut self) {
        if let Some(ref content) = self.content {
            self.bbox = content.borrow().content_bbox();
            return;
        }

        let mut bbox: Option<Rect2> = None;
        for child in &self.children {
            bbox = Some(match bbox {
                Some(acc) => acc.union(&child.bbox),
                None => child.bbox,
            });
        }
        self.bbox = bbox.unwrap_or(Rect2::EMPTY);
    }

    /// Depth-first search for leaves whose bbox intersects `region`.
    ///
    /// `too_small` lets the renderer prune subtrees whose projected size
    /// cannot produce visible output.
    pub fn leaves_intersecting(
        &self,
        region: &Rect2,
        too_small: Option<&dyn Fn(&Rect2) -> bool>,
    ) -> Vec<SceneLeaf> {
        let mut result = Vec::new();
        self.collect_leaves(region, too_small, &mut result);
        result
    }

    fn collect_leaves(
        &self,
        region: &Rect2,
        too_small: Option<&dyn Fn(&Rect2) -> bool>,
        out: &mut Vec<SceneLeaf>,
    ) {
        if self.is_empty() || !self.bbox.intersects(region) {
            return;
        }
        if let Some(filter) = too_small {
            if filter(&self.bbox) {
                return;
            }
        }

        if let Some(ref content) = self.content {
            out.push(SceneLeaf {
                node_id: self.node_id,
                component: ComponentRef::clone(content),
            });
            return;
        }

        for child in &self.children {
            child.collect_leaves(region, too_small, out);
        }
    }

    /// Every leaf in the subtree.
    pub fn all_leaves(&self) -> Vec<SceneLeaf> {
        let mut result = Vec::new();
        self.collect_all(&mut result);
        result
    }

    fn collect_all(&self, out: &mut Vec<SceneLeaf>) {
        if let Some(ref content) = self.content {
            out.push(SceneLeaf {
                node_id: self.node_id,
                component: ComponentRef::clone(content),
            });
        }
        for child in &self.children {
            child.collect_all(out);
        }
    }

    /// Re-traverses by bbox looking for the leaf holding `id`. Returns
    /// the leaf's node id.
    pub fn find_leaf_node(&self, id: ComponentId) -> Option<u64> {
        if let Some(ref content) = self.content {
            if content.borrow().id() == id {
                return Some(self.node_id);
            }
            return None;
        }
        for child in &self.children {
            if let Some(found) = child.find_leaf_node(id) {
                return Some(found);
            }
        }
        None
    }

    /// Number of leaves in the subtree.
    pub fn leaf_count(&self) -> usize {
        if self.content.is_some() {
            return 1;
        }
        self.children.iter().map(SceneNode::leaf_count).sum()
    }

    #[cfg(test)]
    fn max_child_count(&self) -> usize {
        let own = self.children.len();
        self.children
            .iter()
            .map(SceneNode::max_child_count)
            .max()
            .unwrap_or(0)
            .max(own)
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        assert!(
            self.content.is_none() || self.children.is_empty(),
            "a node must not have both content and children"
        );
        for child in &self.children {
            assert!(
                self.bbox.grown_by(1e-9).contains_rect(&child.bbox),
                "parent bbox must contain child bboxes"
            );
            child.check_invariants();
        }
    }
}

impl Default for SceneNode {
    fn default() -> Self {
        SceneNode::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{into_ref, Component, Stroke, StrokePart};
    use crate::style::RenderingStyle;
    use inkboard_geom::{Color, Path, Vec2};

    fn stroke_at(x: f64, y: f64, size: f64) -> ComponentRef {
        let d = format!("M{},{} L{},{}", x, y, x + size, y + size);
        into_ref(Component::Stroke(Stroke::new(vec![StrokePart {
            path: Path::from_string(&d).unwrap(),
            style: RenderingStyle::fill_only(Color::BLACK),
        }])))
    }

    #[test]
    fn add_then_query() {
        let mut root = SceneNode::new();
        for i in 0..10 {
            root.add_leaf(stroke_at(i as f64 * 20.0, 0.0, 10.0));
        }
        root.check_invariants();
        assert_eq!(root.leaf_count(), 10);

        let hits = root.leaves_intersecting(&Rect2::new(0.0, 0.0, 35.0, 20.0), None);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn child_count_stays_bounded() {
        let mut root = SceneNode::new();
        for i in 0..200 {
            let x = (i % 20) as f64 * 15.0;
            let y = (i / 20) as f64 * 15.0;
            root.add_leaf(stroke_at(x, y, 10.0));
        }
        root.check_invariants();
        assert_eq!(root.leaf_count(), 200);
        assert!(root.max_child_count() <= MAX_CHILDREN);
    }

    #[test]
    fn remove_collapses_and_shrinks() {
        let mut root = SceneNode::new();
        let a = stroke_at(0.0, 0.0, 10.0);
        let b = stroke_at(100.0, 0.0, 10.0);
        let a_id = a.borrow().id();
        root.add_leaf(ComponentRef::clone(&a));
        root.add_leaf(ComponentRef::clone(&b));

        let removed = root.remove_component(a_id, None).expect("a was present");
        assert_eq!(removed.borrow().id(), a_id);
        root.check_invariants();
        assert_eq!(root.leaf_count(), 1);
        assert!(root.find_leaf_node(a_id).is_none());

        // Only b remains, so the root collapsed back to b's bbox.
        assert!(root.bbox().x >= 90.0);
    }

    #[test]
    fn node_ids_change_on_content_change() {
        let mut root = SceneNode::new();
        let a = stroke_at(0.0, 0.0, 10.0);
        let b = stroke_at(100.0, 0.0, 10.0);
        root.add_leaf(ComponentRef::clone(&a));
        root.add_leaf(ComponentRef::clone(&b));

        let b_id = b.borrow().id();
        let token_before = root.find_leaf_node(b_id).unwrap();

        // Removing and re-adding b refreshes its token.
        let removed = root.remove_component(b_id, None).unwrap();
        root.add_leaf(removed);
        let token_after = root.find_leaf_node(b_id).unwrap();
        assert_ne!(token_before, token_after);

        // a's token is untouched by b's churn.
        let a_id = a.borrow().id();
        let a_token_1 = root.find_leaf_node(a_id).unwrap();
        let removed = root.remove_component(b_id, None).unwrap();
        root.add_leaf(removed);
        let a_token_2 = root.find_leaf_node(a_id).unwrap();
        assert_eq!(a_token_1, a_token_2);
    }

    #[test]
    fn too_small_filter_prunes() {
        let mut root = SceneNode::new();
        root.add_leaf(stroke_at(0.0, 0.0, 1.0));
        root.add_leaf(stroke_at(100.0, 100.0, 50.0));

        let filter = |bbox: &Rect2| bbox.max_dimension() < 10.0;
        let hits = root.leaves_intersecting(
            &Rect2::new(-10.0, -10.0, 500.0, 500.0),
            Some(&filter),
        );
        assert_eq!(hits.len(), 1);
    }
}
