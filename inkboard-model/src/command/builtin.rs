// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The built-in command set.

use serde_json::{json, Value};

use inkboard_geom::{Mat33, Rect2};

use crate::command::{localize, Command, CommandError, Locale, SerializableCommand};
use crate::component::{into_ref, Component, ComponentId, ComponentRef};
use crate::editor::Editor;
use crate::style::RenderingStyle;

fn mat33_to_json(m: &Mat33) -> Value {
    Value::Array(m.to_array().iter().map(|v| json!(v)).collect())
}

fn mat33_from_json(value: Option<&Value>) -> Result<Mat33, CommandError> {
    let entries = value
        .and_then(Value::as_array)
        .ok_or_else(|| CommandError::InvalidData("missing transform".into()))?;
    if entries.len() != 9 {
        return Err(CommandError::InvalidData(
            "transform must have 9 entries".into(),
        ));
    }
    let mut array = [0.0f64; 9];
    for (slot, entry) in array.iter_mut().zip(entries.iter()) {
        *slot = entry
            .as_f64()
            .ok_or_else(|| CommandError::InvalidData("bad transform entry".into()))?;
    }
    Ok(Mat33::from_array(&array))
}

fn id_from_json(value: &Value) -> Result<ComponentId, CommandError> {
    let text = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::InvalidData("missing id".into()))?;
    Ok(ComponentId::parse(text))
}

// ---------------------------------------------------------------------------
// add-element

/// Adds a component to the image.
///
/// The first apply requests a wet-ink flatten instead of a rerender: the
/// preview surface already shows the stroke, so promoting it in place is
/// enough. Re-applies (redo) rerender normally.
pub struct AddElementCommand {
    component: ComponentRef,
    applied_before: bool,
}

impl AddElementCommand {
    /// Creates the command. It does nothing until applied.
    pub fn new(component: Component) -> Self {
        AddElementCommand {
            component: into_ref(component),
            applied_before: false,
        }
    }

    pub(crate) fn from_ref(component: ComponentRef) -> Self {
        AddElementCommand {
            component,
            applied_before: false,
        }
    }

    /// The component this command inserts.
    pub fn component(&self) -> &ComponentRef {
        &self.component
    }
}

impl Command for AddElementCommand {
    fn apply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        let id = self.component.borrow().id();
        editor
            .image
            .insert_component(ComponentRef::clone(&self.component));

        if self.applied_before {
            editor.image.queue_rerender_of(id);
        } else {
            editor.note_flatten(id);
            self.applied_before = true;
        }
        Ok(())
    }

    fn unapply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        let id = self.component.borrow().id();
        editor
            .image
            .remove_component(id)
            .ok_or(CommandError::UnresolvedReference(id))?;
        Ok(())
    }

    fn description(&self, locale: &Locale) -> String {
        localize(locale.add_element, &self.component.borrow().description())
    }
}

impl SerializableCommand for AddElementCommand {
    fn command_type_id(&self) -> &'static str {
        "add-element"
    }

    fn serialize_data(&self) -> Value {
        json!({ "elemData": self.component.borrow().serialize() })
    }
}

pub(crate) fn deserialize_add_element(data: &Value) -> Result<Box<dyn Command>, CommandError> {
    let elem_data = data
        .get("elemData")
        .ok_or_else(|| CommandError::InvalidData("add-element: missing elemData".into()))?;
    let component = Component::deserialize(elem_data)?;
    Ok(Box::new(AddElementCommand::new(component)))
}

// ---------------------------------------------------------------------------
// erase-elements

/// Removes components from the image.
pub struct EraseElementsCommand {
    ids: Vec<ComponentId>,
    removed: Vec<ComponentRef>,
}

impl EraseElementsCommand {
    /// Creates a command erasing the given components.
    pub fn new(components: &[ComponentRef]) -> Self {
        EraseElementsCommand {
            ids: components.iter().map(|c| c.borrow().id()).collect(),
            removed: Vec::new(),
        }
    }

    /// Creates a command erasing components by id.
    pub fn from_ids(ids: Vec<ComponentId>) -> Self {
        EraseElementsCommand {
            ids,
            removed: Vec::new(),
        }
    }
}

impl Command for EraseElementsCommand {
    fn apply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        let mut removed = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            match editor.image.remove_component(*id) {
                Some(component) => removed.push(component),
                None => {
                    // Roll back so a failed apply changes nothing.
                    for component in removed {
                        editor.image.insert_component(component);
                    }
                    return Err(CommandError::UnresolvedReference(*id));
                }
            }
        }
        self.removed = removed;
        Ok(())
    }

    fn unapply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        for component in &self.removed {
            editor
                .image
                .insert_component(ComponentRef::clone(component));
        }
        Ok(())
    }

    fn description(&self, locale: &Locale) -> String {
        localize(locale.erase_elements, &self.ids.len().to_string())
    }
}

impl SerializableCommand for EraseElementsCommand {
    fn command_type_id(&self) -> &'static str {
        "erase-elements"
    }

    fn serialize_data(&self) -> Value {
        json!({
            "elemIds": self.ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        })
    }
}

pub(crate) fn deserialize_erase_elements(data: &Value) -> Result<Box<dyn Command>, CommandError> {
    let ids = data
        .get("elemIds")
        .and_then(Value::as_array)
        .ok_or_else(|| CommandError::InvalidData("erase-elements: missing elemIds".into()))?
        .iter()
        .filter_map(Value::as_str)
        .map(ComponentId::parse)
        .collect();
    Ok(Box::new(EraseElementsCommand::from_ids(ids)))
}

// ---------------------------------------------------------------------------
// transform-element

/// Applies an affine transform to one component and raises it to the
/// top of the z-order.
pub struct TransformElementCommand {
    id: ComponentId,
    transform: Mat33,
    target_z_index: u64,
    original_z_index: Option<u64>,
}

impl TransformElementCommand {
    /// Creates the command.
    pub fn new(id: ComponentId, transform: Mat33) -> Self {
        TransformElementCommand {
            id,
            transform,
            target_z_index: crate::component::next_z_index(),
            original_z_index: None,
        }
    }
}

impl Command for TransformElementCommand {
    fn apply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        let transform = self.transform;
        let target_z = self.target_z_index;
        let mut original_z = 0;

        let found = editor.image.with_component_reinserted(self.id, |component| {
            original_z = component.z_index();
            component.transform_by(&transform);
            component.set_z_index(target_z);
        });
        if !found {
            return Err(CommandError::UnresolvedReference(self.id));
        }

        self.original_z_index = Some(original_z);
        Ok(())
    }

    fn unapply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        let inverse = self.transform.inverse().map_err(|_| {
            CommandError::InvalidData("transform is not invertible".into())
        })?;
        let original_z = self.original_z_index;

        let found = editor.image.with_component_reinserted(self.id, |component| {
            component.transform_by(&inverse);
            if let Some(z) = original_z {
                component.set_z_index(z);
            }
        });
        if !found {
            return Err(CommandError::UnresolvedReference(self.id));
        }
        Ok(())
    }

    fn description(&self, locale: &Locale) -> String {
        localize(locale.transform_element, &format!("element {}", self.id))
    }
}

impl SerializableCommand for TransformElementCommand {
    fn command_type_id(&self) -> &'static str {
        "transform-element"
    }

    fn serialize_data(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "transfm": mat33_to_json(&self.transform),
            "targetZIndex": self.target_z_index,
        })
    }
}

pub(crate) fn deserialize_transform_element(
    data: &Value,
) -> Result<Box<dyn Command>, CommandError> {
    let id = id_from_json(data)?;
    let transform = mat33_from_json(data.get("transfm"))?;
    let target_z_index = data
        .get("targetZIndex")
        .and_then(Value::as_u64)
        .ok_or_else(|| CommandError::InvalidData("transform-element: missing targetZIndex".into()))?;

    Ok(Box::new(TransformElementCommand {
        id,
        transform,
        target_z_index,
        original_z_index: None,
    }))
}

// ---------------------------------------------------------------------------
// restyle-element

/// Swaps a restylable component's style.
pub struct RestyleElementCommand {
    id: ComponentId,
    original_style: RenderingStyle,
    new_style: RenderingStyle,
}

impl RestyleElementCommand {
    /// Creates the command. `original_style` must be the component's
    /// style at creation time so unapply can restore it.
    pub fn new(id: ComponentId, original_style: RenderingStyle, new_style: RenderingStyle) -> Self {
        RestyleElementCommand {
            id,
            original_style,
            new_style,
        }
    }

    fn set_style(
        &self,
        editor: &mut Editor,
        style: RenderingStyle,
    ) -> Result<(), CommandError> {
        let component = editor
            .image
            .find_element(self.id)
            .ok_or(CommandError::UnresolvedReference(self.id))?;
        component.borrow_mut().force_style(&style);
        editor.image.queue_rerender_of(self.id);
        Ok(())
    }
}

impl Command for RestyleElementCommand {
    fn apply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        self.set_style(editor, self.new_style)
    }

    fn unapply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        self.set_style(editor, self.original_style)
    }

    fn description(&self, locale: &Locale) -> String {
        localize(locale.restyle_element, &format!("element {}", self.id))
    }
}

impl SerializableCommand for RestyleElementCommand {
    fn command_type_id(&self) -> &'static str {
        "restyle-element"
    }

    fn serialize_data(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "originalStyle": self.original_style.to_json(),
            "newStyle": self.new_style.to_json(),
        })
    }
}

pub(crate) fn deserialize_restyle_element(data: &Value) -> Result<Box<dyn Command>, CommandError> {
    let id = id_from_json(data)?;
    let original_style = RenderingStyle::from_json(
        data.get("originalStyle")
            .ok_or_else(|| CommandError::InvalidData("restyle: missing originalStyle".into()))?,
    )?;
    let new_style = RenderingStyle::from_json(
        data.get("newStyle")
            .ok_or_else(|| CommandError::InvalidData("restyle: missing newStyle".into()))?,
    )?;
    Ok(Box::new(RestyleElementCommand::new(
        id,
        original_style,
        new_style,
    )))
}

// ---------------------------------------------------------------------------
// unite-commands

/// A composite applying sub-commands left-to-right and unapplying them
/// right-to-left.
pub struct UniteCommands {
    commands: Vec<Box<dyn SerializableCommand>>,
}

impl UniteCommands {
    /// Creates a composite from serializable sub-commands.
    pub fn new(commands: Vec<Box<dyn SerializableCommand>>) -> Self {
        UniteCommands { commands }
    }
}

impl Command for UniteCommands {
    fn apply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        for index in 0..self.commands.len() {
            if let Err(error) = self.commands[index].apply(editor) {
                // Roll the applied prefix back, right-to-left.
                for command in self.commands[..index].iter_mut().rev() {
                    let _ = command.unapply(editor);
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn unapply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        for index in (0..self.commands.len()).rev() {
            if let Err(error) = self.commands[index].unapply(editor) {
                for command in self.commands[index + 1..].iter_mut() {
                    let _ = command.apply(editor);
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn on_drop(&mut self, editor: &mut Editor) {
        for command in &mut self.commands {
            command.on_drop(editor);
        }
    }

    fn description(&self, locale: &Locale) -> String {
        match self.commands.first() {
            Some(first) if self.commands.len() == 1 => first.description(locale),
            _ => localize(locale.united_commands, &self.commands.len().to_string()),
        }
    }
}

impl SerializableCommand for UniteCommands {
    fn command_type_id(&self) -> &'static str {
        "unite-commands"
    }

    fn serialize_data(&self) -> Value {
        json!({
            "commands": self
                .commands
                .iter()
                .map(|c| c.serialize())
                .collect::<Vec<_>>(),
        })
    }
}

pub(crate) fn deserialize_unite_commands(data: &Value) -> Result<Box<dyn Command>, CommandError> {
    let entries = data
        .get("commands")
        .and_then(Value::as_array)
        .ok_or_else(|| CommandError::InvalidData("unite-commands: missing commands".into()))?;

    // Children deserialize to `dyn Command`; wrap them in a plain
    // composite. Round-tripping a composite twice therefore goes through
    // `SequencedCommands`, which behaves identically.
    let mut commands = Vec::with_capacity(entries.len());
    for entry in entries {
        commands.push(crate::command::deserialize_command(entry)?);
    }
    Ok(Box::new(SequencedCommands { commands }))
}

/// The deserialized form of [`UniteCommands`]: same ordering semantics,
/// children type-erased to `dyn Command`.
struct SequencedCommands {
    commands: Vec<Box<dyn Command>>,
}

impl Command for SequencedCommands {
    fn apply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        for index in 0..self.commands.len() {
            if let Err(error) = self.commands[index].apply(editor) {
                for command in self.commands[..index].iter_mut().rev() {
                    let _ = command.unapply(editor);
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn unapply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        for index in (0..self.commands.len()).rev() {
            if let Err(error) = self.commands[index].unapply(editor) {
                for command in self.commands[index + 1..].iter_mut() {
                    let _ = command.apply(editor);
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn on_drop(&mut self, editor: &mut Editor) {
        for command in &mut self.commands {
            command.on_drop(editor);
        }
    }

    fn description(&self, locale: &Locale) -> String {
        localize(locale.united_commands, &self.commands.len().to_string())
    }
}

// ---------------------------------------------------------------------------
// set-import-export-rect

/// Changes the image's import/export rectangle.
pub struct SetImportExportRectCommand {
    old_rect: Rect2,
    new_rect: Rect2,
}

impl SetImportExportRectCommand {
    /// Creates the command. `old_rect` must be the current rect.
    pub fn new(old_rect: Rect2, new_rect: Rect2) -> Self {
        SetImportExportRectCommand { old_rect, new_rect }
    }
}

impl Command for SetImportExportRectCommand {
    fn apply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        editor.image.set_import_export_rect_direct(self.new_rect);
        Ok(())
    }

    fn unapply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        editor.image.set_import_export_rect_direct(self.old_rect);
        Ok(())
    }

    fn description(&self, locale: &Locale) -> String {
        locale.set_export_rect.to_string()
    }
}

impl SerializableCommand for SetImportExportRectCommand {
    fn command_type_id(&self) -> &'static str {
        "set-import-export-rect"
    }

    fn serialize_data(&self) -> Value {
        let rect_json = |r: &Rect2| json!([r.x, r.y, r.w, r.h]);
        json!({
            "oldRect": rect_json(&self.old_rect),
            "newRect": rect_json(&self.new_rect),
        })
    }
}

fn rect_from_json(value: Option<&Value>) -> Result<Rect2, CommandError> {
    let entries = value
        .and_then(Value::as_array)
        .filter(|entries| entries.len() == 4)
        .ok_or_else(|| CommandError::InvalidData("missing rect".into()))?;
    let mut parts = [0.0f64; 4];
    for (slot, entry) in parts.iter_mut().zip(entries.iter()) {
        *slot = entry
            .as_f64()
            .ok_or_else(|| CommandError::InvalidData("bad rect entry".into()))?;
    }
    Ok(Rect2::new(parts[0], parts[1], parts[2], parts[3]))
}

pub(crate) fn deserialize_set_import_export_rect(
    data: &Value,
) -> Result<Box<dyn Command>, CommandError> {
    Ok(Box::new(SetImportExportRectCommand {
        old_rect: rect_from_json(data.get("oldRect"))?,
        new_rect: rect_from_json(data.get("newRect"))?,
    }))
}

// ---------------------------------------------------------------------------
// viewport transform (not serializable)

/// Applies a canvas-space transform to the viewport. Produced by
/// [`crate::viewport::Viewport::zoom_to`]-style navigation; not part of
/// the document, so not serializable.
pub struct ViewportTransformCommand {
    transform: Mat33,
    inverse: Mat33,
}

impl ViewportTransformCommand {
    /// Creates the command. Singular transforms degrade to the identity
    /// with a warning.
    pub fn new(transform: Mat33) -> Self {
        match transform.inverse() {
            Ok(inverse) => ViewportTransformCommand { transform, inverse },
            Err(_) => {
                log::warn!("viewport transform is singular; using the identity");
                ViewportTransformCommand {
                    transform: Mat33::IDENTITY,
                    inverse: Mat33::IDENTITY,
                }
            }
        }
    }
}

impl Command for ViewportTransformCommand {
    fn apply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        editor.viewport.apply_canvas_transform(self.transform);
        Ok(())
    }

    fn unapply(&mut self, editor: &mut Editor) -> Result<(), CommandError> {
        editor.viewport.apply_canvas_transform(self.inverse);
        Ok(())
    }

    fn description(&self, locale: &Locale) -> String {
        locale.viewport_transform.to_string()
    }
}
