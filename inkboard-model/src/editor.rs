// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The editable image: two scene roots, the id map, and the
//! import/export rectangle.

use std::collections::HashMap;

use inkboard_geom::Rect2;

use crate::command::AddElementCommand;
use crate::component::{Component, ComponentId, ComponentRef};
use crate::event::EventDispatcher;
use crate::render::Renderer;
use crate::scene::{SceneLeaf, SceneNode};
use crate::viewport::Viewport;

/// Image event kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ImageEventKind {
    /// The import/export rectangle changed.
    ExportRectChanged,
}

/// Payload of [`ImageEventKind::ExportRectChanged`].
#[derive(Clone, Copy, Debug)]
pub struct ExportRectChange {
    #[allow(missing_docs)]
    pub old_rect: Rect2,
    #[allow(missing_docs)]
    pub new_rect: Rect2,
}

/// The drawing being edited.
///
/// Content components live under the foreground root; backgrounds under
/// their own root so they always render first. Components are shared
/// with the by-id map via `Rc`; the map is mutated only through
/// apply/unapply.
pub struct EditorImage {
    root: SceneNode,
    background: SceneNode,
    by_id: HashMap<ComponentId, ComponentRef>,
    import_export_rect: Rect2,
    events: EventDispatcher<ImageEventKind, ExportRectChange>,
}

impl EditorImage {
    /// Creates an empty image with the given export rectangle.
    pub fn new(import_export_rect: Rect2) -> Self {
        EditorImage {
            root: SceneNode::new(),
            background: SceneNode::new(),
            by_id: HashMap::new(),
            import_export_rect,
            events: EventDispatcher::new(),
        }
    }

    /// The event bus for export-rect changes.
    pub fn events(&self) -> &EventDispatcher<ImageEventKind, ExportRectChange> {
        &self.events
    }

    /// The rectangle used when exporting, independent of the user view.
    #[inline]
    pub fn import_export_rect(&self) -> Rect2 {
        self.import_export_rect
    }

    /// Builds the command that adds `component` to this image.
    ///
    /// The returned command has not been applied yet; push it through an
    /// [`crate::command::UndoRedoHistory`].
    pub fn add_element(&self, component: Component) -> AddElementCommand {
        AddElementCommand::new(component)
    }

    /// Inserts a component, registering it in the id map.
    ///
    /// Backgrounds are placed under the background root and stretched to
    /// the import/export rectangle.
    pub fn insert_component(&mut self, component: ComponentRef) {
        let (id, is_background) = {
            let mut borrowed = component.borrow_mut();
            if let Component::Background(ref mut background) = *borrowed {
                background.set_region(self.import_export_rect);
            }
            (borrowed.id(), borrowed.is_background())
        };

        let target = if is_background {
            &mut self.background
        } else {
            &mut self.root
        };
        target.add_leaf(ComponentRef::clone(&component));
        self.by_id.insert(id, component);
    }

    /// Removes a component, unregistering it from the id map.
    pub fn remove_component(&mut self, id: ComponentId) -> Option<ComponentRef> {
        let component = self.by_id.remove(&id)?;
        let bbox = component.borrow().content_bbox();

        let removed = self
            .root
            .remove_component(id, Some(&bbox))
            .or_else(|| self.background.remove_component(id, Some(&bbox)))
            // The tree prunes by bbox; a stale bbox falls back to a full
            // scan.
            .or_else(|| self.root.remove_component(id, None))
            .or_else(|| self.background.remove_component(id, None));

        match removed {
            Some(removed) => Some(removed),
            None => {
                log::warn!("component {} was mapped but not in the tree", id);
                Some(component)
            }
        }
    }

    /// Looks up a component by id.
    pub fn find_element(&self, id: ComponentId) -> Option<ComponentRef> {
        self.by_id.get(&id).map(ComponentRef::clone)
    }

    /// Returns `true` if the image currently holds `id`.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Re-traverses the scene tree for the leaf node holding `id`.
    pub fn find_parent(&self, id: ComponentId) -> Option<u64> {
        self.root
            .find_leaf_node(id)
            .or_else(|| self.background.find_leaf_node(id))
    }

    /// Marks a component's region dirty by removing and re-inserting its
    /// leaf, which refreshes the node id the rendering cache keys on.
    pub fn queue_rerender_of(&mut self, id: ComponentId) {
        let in_tree = self
            .root
            .remove_component(id, None)
            .or_else(|| self.background.remove_component(id, None));
        if let Some(component) = in_tree {
            let is_background = component.borrow().is_background();
            if is_background {
                self.background.add_leaf(component);
            } else {
                self.root.add_leaf(component);
            }
        }
    }

    /// Removes `id` from the tree, lets `mutate` change it (geometry
    /// included), and re-inserts it at its new bounds.
    ///
    /// Returns `false` when the id is unknown.
    pub fn with_component_reinserted<F: FnOnce(&mut Component)>(
        &mut self,
        id: ComponentId,
        mutate: F,
    ) -> bool {
        let component = match self.remove_component(id) {
            Some(component) => component,
            None => return false,
        };
        mutate(&mut component.borrow_mut());
        self.insert_component(component);
        true
    }

    /// Every component, backgrounds first, then by stacking order.
    pub fn all_elements(&self) -> Vec<ComponentRef> {
        let mut leaves = self.background.all_leaves();
        leaves.extend(self.root.all_leaves());
        sort_by_z(&mut leaves);
        leaves.into_iter().map(|leaf| leaf.component).collect()
    }

    /// The number of components in the image.
    pub fn element_count(&self) -> usize {
        self.by_id.len()
    }

    /// Leaves intersecting `region`, in stacking order. `too_small`
    /// lets the renderer prune invisible subtrees.
    pub fn elements_intersecting(
        &self,
        region: &Rect2,
        too_small: Option<&dyn Fn(&Rect2) -> bool>,
    ) -> Vec<SceneLeaf> {
        let mut leaves = self.background.leaves_intersecting(region, too_small);
        leaves.extend(self.root.leaves_intersecting(region, too_small));
        sort_by_z(&mut leaves);
        leaves
    }

    /// The foreground scene root.
    pub fn root(&self) -> &SceneNode {
        &self.root
    }

    /// Replaces the import/export rectangle, resizing backgrounds and
    /// notifying listeners.
    pub fn set_import_export_rect_direct(&mut self, rect: Rect2) {
        let old_rect = self.import_export_rect;
        self.import_export_rect = rect;

        let background_ids: Vec<ComponentId> = self
            .background
            .all_leaves()
            .iter()
            .map(|leaf| leaf.component.borrow().id())
            .collect();
        for id in background_ids {
            if let Some(component) = self.by_id.get(&id) {
                if let Component::Background(ref mut background) =
                    *component.borrow_mut()
                {
                    background.set_region(rect);
                }
            }
            self.queue_rerender_of(id);
        }

        self.events.dispatch(
            ImageEventKind::ExportRectChanged,
            &ExportRectChange {
                old_rect,
                new_rect: rect,
            },
        );
    }

    /// Renders every component intersecting `visible_rect` through
    /// `renderer`, in stacking order.
    pub fn render_all(&self, renderer: &mut dyn Renderer, visible_rect: &Rect2) {
        let leaves = {
            let too_small = |bbox: &Rect2| renderer.is_too_small_to_render(bbox);
            let mut leaves = self
                .background
                .leaves_intersecting(visible_rect, Some(&too_small));
            leaves.extend(self.root.leaves_intersecting(visible_rect, Some(&too_small)));
            sort_by_z(&mut leaves);
            leaves
        };

        for leaf in leaves {
            leaf.component.borrow().render(renderer, Some(visible_rect));
        }
    }
}

impl Default for EditorImage {
    fn default() -> Self {
        EditorImage::new(Rect2::new(0.0, 0.0, 500.0, 500.0))
    }
}

fn sort_by_z(leaves: &mut Vec<SceneLeaf>) {
    leaves.sort_by_key(|leaf| leaf.component.borrow().z_index());
}

/// The mutable context commands run against: the image plus the user's
/// viewport.
pub struct Editor {
    /// The document being edited.
    pub image: EditorImage,
    /// The user's view of the canvas.
    pub viewport: Viewport,
    pending_flatten: Vec<ComponentId>,
}

impl Editor {
    /// Creates an editor over an empty image.
    pub fn new() -> Self {
        Editor {
            image: EditorImage::default(),
            viewport: Viewport::default(),
            pending_flatten: Vec::new(),
        }
    }

    /// Creates an editor over an existing image.
    pub fn with_image(image: EditorImage) -> Self {
        Editor {
            image,
            viewport: Viewport::default(),
            pending_flatten: Vec::new(),
        }
    }

    /// Records that `id` can be flattened from the wet-ink surface
    /// instead of rerendered.
    pub fn note_flatten(&mut self, id: ComponentId) {
        self.pending_flatten.push(id);
    }

    /// Takes the pending wet-ink flatten requests. The render loop calls
    /// this once per frame.
    pub fn take_flatten_requests(&mut self) -> Vec<ComponentId> {
        std::mem::replace(&mut self.pending_flatten, Vec::new())
    }
}

impl Default for Editor {
    fn default() -> Self {
        Editor::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, UndoRedoHistory};
    use crate::component::{Stroke, StrokePart};
    use crate::style::RenderingStyle;
    use inkboard_geom::{Color, Path};

    fn stroke_component(d: &str) -> Component {
        Component::Stroke(Stroke::new(vec![StrokePart {
            path: Path::from_string(d).unwrap(),
            style: RenderingStyle::fill_only(Color::BLACK),
        }]))
    }

    #[test]
    fn add_then_undo_leaves_image_empty() {
        let mut editor = Editor::new();
        let mut history = UndoRedoHistory::new();

        let component = stroke_component("M0,1Q10,1 20,1L20,-1Q10,-1 0,-1L0,1");
        let id = component.id();
        let command = editor.image.add_element(component);
        history.push(&mut editor, Box::new(command), true).unwrap();

        assert_eq!(editor.image.all_elements().len(), 1);
        assert!(editor.image.contains(id));
        assert!(editor.image.find_parent(id).is_some());

        history.undo(&mut editor).unwrap();
        assert!(editor.image.all_elements().is_empty());
        assert!(editor.image.find_parent(id).is_none());
    }

    #[test]
    fn first_apply_requests_flatten_redo_rerenders() {
        let mut editor = Editor::new();
        let component = stroke_component("M0,0L10,0");
        let id = component.id();

        let mut command = editor.image.add_element(component);
        command.apply(&mut editor).unwrap();
        assert_eq!(editor.take_flatten_requests(), vec![id]);

        command.unapply(&mut editor).unwrap();
        command.apply(&mut editor).unwrap();
        // Second apply goes through the normal rerender path.
        assert!(editor.take_flatten_requests().is_empty());
    }

    #[test]
    fn elements_sort_by_z_with_background_first() {
        let mut editor = Editor::new();

        let stroke = stroke_component("M0,0L10,0");
        let background = Component::Background(
            crate::component::BackgroundComponent::new(
                Color::WHITE,
                crate::component::BackgroundKind::SolidColor,
                Rect2::EMPTY,
            ),
        );

        editor.image.insert_component(crate::component::into_ref(stroke));
        editor
            .image
            .insert_component(crate::component::into_ref(background));

        let all = editor.image.all_elements();
        assert_eq!(all.len(), 2);
        assert!(all[0].borrow().is_background());

        // The background stretched to the export rect.
        let bbox = all[0].borrow().content_bbox();
        assert_eq!(bbox, editor.image.import_export_rect());
    }

    #[test]
    fn export_rect_change_fires_event_and_resizes_background() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut editor = Editor::new();
        editor.image.insert_component(crate::component::into_ref(
            Component::Background(crate::component::BackgroundComponent::new(
                Color::WHITE,
                crate::component::BackgroundKind::SolidColor,
                Rect2::EMPTY,
            )),
        ));

        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = Rc::clone(&seen);
            editor
                .image
                .events()
                .subscribe(ImageEventKind::ExportRectChanged, move |change| {
                    seen.borrow_mut().push(*change);
                });
        }

        let new_rect = Rect2::new(0.0, 0.0, 800.0, 600.0);
        editor.image.set_import_export_rect_direct(new_rect);

        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].new_rect, new_rect);

        let background = editor.image.all_elements();
        assert_eq!(background[0].borrow().content_bbox(), new_rect);
    }

    #[test]
    fn transform_command_roundtrip_restores_state() {
        use crate::command::TransformElementCommand;
        use inkboard_geom::{Mat33, Vec2};

        let mut editor = Editor::new();
        let component = stroke_component("M0,0L10,0");
        let id = component.id();
        let original_bbox = component.content_bbox();
        let original_z = component.z_index();
        editor
            .image
            .insert_component(crate::component::into_ref(component));

        let mut command =
            TransformElementCommand::new(id, Mat33::translation(Vec2::new(100.0, 0.0)));
        command.apply(&mut editor).unwrap();

        let moved = editor.image.find_element(id).unwrap();
        assert!((moved.borrow().content_bbox().x - (original_bbox.x + 100.0)).abs() < 1e-9);
        assert!(moved.borrow().z_index() > original_z);

        command.unapply(&mut editor).unwrap();
        let restored = editor.image.find_element(id).unwrap();
        assert!((restored.borrow().content_bbox().x - original_bbox.x).abs() < 1e-9);
        assert_eq!(restored.borrow().z_index(), original_z);
    }

    #[test]
    fn restyle_command_roundtrip() {
        let mut editor = Editor::new();
        let component = stroke_component("M0,0L10,0");
        let id = component.id();
        let command = component.update_style(RenderingStyle::fill_only(Color::WHITE));
        editor
            .image
            .insert_component(crate::component::into_ref(component));

        let mut command = command.expect("strokes are restylable");
        command.apply(&mut editor).unwrap();
        let restyled = editor.image.find_element(id).unwrap();
        assert_eq!(restyled.borrow().style().unwrap().fill, Color::WHITE);

        command.unapply(&mut editor).unwrap();
        let restored = editor.image.find_element(id).unwrap();
        assert_eq!(restored.borrow().style().unwrap().fill, Color::BLACK);
    }

    #[test]
    fn transform_command_missing_id_fails() {
        use crate::command::TransformElementCommand;
        use inkboard_geom::Mat33;

        let mut editor = Editor::new();
        let mut command = TransformElementCommand::new(
            crate::component::ComponentId::next(),
            Mat33::IDENTITY,
        );
        assert!(matches!(
            command.apply(&mut editor),
            Err(crate::command::CommandError::UnresolvedReference(_))
        ));
    }
}
