// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reversible commands, their JSON wire format, and undo/redo.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::component::ComponentId;
use crate::editor::Editor;

mod builtin;
mod history;

pub use builtin::{
    AddElementCommand, EraseElementsCommand, RestyleElementCommand, SetImportExportRectCommand,
    TransformElementCommand, UniteCommands, ViewportTransformCommand,
};
pub use history::{UndoRedoEventKind, UndoRedoHistory, DEFAULT_HISTORY_CAP};

/// Command failures.
#[derive(Clone, PartialEq, Debug)]
pub enum CommandError {
    /// A command references a component id absent from the image.
    UnresolvedReference(ComponentId),
    /// No registry entry exists for a command-type or component kind.
    DeserializationRejected(String),
    /// Malformed serialized data.
    InvalidData(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            CommandError::UnresolvedReference(id) => {
                write!(f, "no component with id {} in the image", id)
            }
            CommandError::DeserializationRejected(ref kind) => {
                write!(f, "no deserializer registered for '{}'", kind)
            }
            CommandError::InvalidData(ref what) => {
                write!(f, "malformed command data: {}", what)
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Localized description templates. `{}` is replaced by the subject.
#[derive(Clone, Copy, Debug)]
pub struct Locale {
    #[allow(missing_docs)]
    pub add_element: &'static str,
    #[allow(missing_docs)]
    pub erase_elements: &'static str,
    #[allow(missing_docs)]
    pub transform_element: &'static str,
    #[allow(missing_docs)]
    pub restyle_element: &'static str,
    #[allow(missing_docs)]
    pub united_commands: &'static str,
    #[allow(missing_docs)]
    pub set_export_rect: &'static str,
    #[allow(missing_docs)]
    pub viewport_transform: &'static str,
}

/// The built-in English locale.
pub const EN_LOCALE: Locale = Locale {
    add_element: "Added {}",
    erase_elements: "Erased {} element(s)",
    transform_element: "Transformed {}",
    restyle_element: "Restyled {}",
    united_commands: "{} actions",
    set_export_rect: "Changed the image size",
    viewport_transform: "Moved the view",
};

pub(crate) fn localize(template: &str, subject: &str) -> String {
    template.replacen("{}", subject, 1)
}

/// A reversible mutation of the editor.
///
/// `apply` and `unapply` must be mutually inverse: applying then
/// unapplying leaves the editor observably unchanged. A failed apply
/// must leave the editor unchanged too.
pub trait Command {
    /// Applies the command.
    fn apply(&mut self, editor: &mut Editor) -> Result<(), CommandError>;

    /// Reverts the command.
    fn unapply(&mut self, editor: &mut Editor) -> Result<(), CommandError>;

    /// Called when the command is dropped from the history without being
    /// re-applied, so it can release resources it holds.
    fn on_drop(&mut self, _editor: &mut Editor) {}

    /// A human-readable description.
    fn description(&self, locale: &Locale) -> String;
}

/// A command that round-trips through JSON.
pub trait SerializableCommand: Command {
    /// The registry key identifying this command type.
    fn command_type_id(&self) -> &'static str;

    /// The command-specific payload.
    fn serialize_data(&self) -> Value;

    /// The full wire form: `{ "commandType": …, "data": … }`.
    fn serialize(&self) -> Value {
        json!({
            "commandType": self.command_type_id(),
            "data": self.serialize_data(),
        })
    }
}

type CommandFactory = fn(&Value) -> Result<Box<dyn Command>, CommandError>;

fn command_registry() -> &'static RwLock<HashMap<String, CommandFactory>> {
    static REGISTRY: Lazy<RwLock<HashMap<String, CommandFactory>>> = Lazy::new(|| {
        let mut map: HashMap<String, CommandFactory> = HashMap::new();
        map.insert("add-element".into(), builtin::deserialize_add_element);
        map.insert("erase-elements".into(), builtin::deserialize_erase_elements);
        map.insert(
            "transform-element".into(),
            builtin::deserialize_transform_element,
        );
        map.insert(
            "restyle-element".into(),
            builtin::deserialize_restyle_element,
        );
        map.insert("unite-commands".into(), builtin::deserialize_unite_commands);
        map.insert(
            "set-import-export-rect".into(),
            builtin::deserialize_set_import_export_rect,
        );
        RwLock::new(map)
    });
    &REGISTRY
}

/// Registers (or replaces) a command-type factory.
///
/// Built-in types are registered eagerly. Replacing a factory while a
/// deserialize is in progress is prevented by the registry lock.
pub fn register_command_kind(command_type: &str, factory: CommandFactory) {
    command_registry()
        .write()
        .unwrap()
        .insert(command_type.to_string(), factory);
}

/// Deserializes a command from its wire form.
///
/// Fails with [`CommandError::DeserializationRejected`] when the
/// command-type id is unknown.
pub fn deserialize_command(value: &Value) -> Result<Box<dyn Command>, CommandError> {
    let command_type = value
        .get("commandType")
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::InvalidData("missing commandType".into()))?;

    let factory = {
        let registry = command_registry().read().unwrap();
        registry.get(command_type).copied()
    };
    let factory = factory
        .ok_or_else(|| CommandError::DeserializationRejected(command_type.to_string()))?;

    let data = value
        .get("data")
        .ok_or_else(|| CommandError::InvalidData("missing data".into()))?;
    factory(data)
}
