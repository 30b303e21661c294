// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
`inkboard-model` is the document layer of the inkboard whiteboard engine.

It owns the component model (strokes, text, images, backgrounds), the
spatially indexed scene tree, reversible commands with undo/redo, the
online stroke synthesizer, the renderer contract, and the sandboxed SVG
loader.

The crate is single-threaded by design: components are shared between the
scene tree and the id map with `Rc`, and mutation happens only through
command application.
*/

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod command;
pub mod component;
pub mod editor;
pub mod event;
pub mod loader;
pub mod pointer;
pub mod render;
pub mod scene;
pub mod style;
pub mod viewport;

pub use builder::{StrokeBuilder, StrokeSample};
pub use command::{
    deserialize_command, Command, CommandError, SerializableCommand, UndoRedoHistory,
};
pub use component::{Component, ComponentId, ComponentRef};
pub use editor::{Editor, EditorImage};
pub use event::{EventDispatcher, ListenerHandle};
pub use loader::{load_from_svg, LoadError, LoadOptions};
pub use pointer::{InputPointerRecord, Pointer, PointerDevice, RawPointerType};
pub use render::{RenderableImage, RenderablePathSpec, Renderer};
pub use scene::SceneNode;
pub use style::{RenderingStyle, StrokeStyle, TextRenderingStyle};
pub use viewport::Viewport;
