// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bounded undo/redo stacks.

use crate::command::{Command, CommandError};
use crate::editor::Editor;
use crate::event::EventDispatcher;

/// Default maximum number of undoable commands.
pub const DEFAULT_HISTORY_CAP: usize = 700;

/// How many commands are dropped at once when the cap is exceeded, so
/// overflow handling amortizes.
const DROP_CHUNK: usize = 10;

/// History event kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UndoRedoEventKind {
    /// The undo/redo stacks changed.
    StackUpdated,
    /// A command was applied (push or redo).
    CommandDone,
    /// A command was reverted.
    CommandUndone,
}

/// Two bounded stacks of reversible commands.
pub struct UndoRedoHistory {
    undo_stack: Vec<Box<dyn Command>>,
    redo_stack: Vec<Box<dyn Command>>,
    cap: usize,
    events: EventDispatcher<UndoRedoEventKind, ()>,
}

impl UndoRedoHistory {
    /// Creates a history with the default cap.
    pub fn new() -> Self {
        UndoRedoHistory::with_cap(DEFAULT_HISTORY_CAP)
    }

    /// Creates a history with a custom cap.
    pub fn with_cap(cap: usize) -> Self {
        UndoRedoHistory {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            cap: cap.max(1),
            events: EventDispatcher::new(),
        }
    }

    /// The event bus for stack updates.
    pub fn events(&self) -> &EventDispatcher<UndoRedoEventKind, ()> {
        &self.events
    }

    #[allow(missing_docs)]
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    #[allow(missing_docs)]
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Pushes `command`, optionally applying it first.
    ///
    /// A failed apply leaves both the editor and the stacks unchanged.
    /// On success the redo stack is dropped (with `on_drop`) and the
    /// oldest commands are trimmed in chunks when the cap is exceeded.
    pub fn push(
        &mut self,
        editor: &mut Editor,
        mut command: Box<dyn Command>,
        apply: bool,
    ) -> Result<(), CommandError> {
        if apply {
            command.apply(editor)?;
        }
        self.undo_stack.push(command);

        for mut dropped in self.redo_stack.drain(..) {
            dropped.on_drop(editor);
        }

        if self.undo_stack.len() > self.cap {
            let count = DROP_CHUNK.min(self.undo_stack.len());
            for mut dropped in self.undo_stack.drain(0..count) {
                dropped.on_drop(editor);
            }
        }

        self.events.dispatch(UndoRedoEventKind::StackUpdated, &());
        self.events.dispatch(UndoRedoEventKind::CommandDone, &());
        Ok(())
    }

    /// Reverts the most recent command, moving it to the redo stack.
    ///
    /// Returns `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self, editor: &mut Editor) -> Result<bool, CommandError> {
        let mut command = match self.undo_stack.pop() {
            Some(command) => command,
            None => return Ok(false),
        };

        if let Err(error) = command.unapply(editor) {
            self.undo_stack.push(command);
            return Err(error);
        }

        self.redo_stack.push(command);
        self.events.dispatch(UndoRedoEventKind::CommandUndone, &());
        self.events.dispatch(UndoRedoEventKind::StackUpdated, &());
        Ok(true)
    }

    /// Re-applies the most recently undone command.
    ///
    /// Returns `Ok(false)` when there is nothing to redo.
    pub fn redo(&mut self, editor: &mut Editor) -> Result<bool, CommandError> {
        let mut command = match self.redo_stack.pop() {
            Some(command) => command,
            None => return Ok(false),
        };

        if let Err(error) = command.apply(editor) {
            self.redo_stack.push(command);
            return Err(error);
        }

        self.undo_stack.push(command);
        self.events.dispatch(UndoRedoEventKind::CommandDone, &());
        self.events.dispatch(UndoRedoEventKind::StackUpdated, &());
        Ok(true)
    }
}

impl Default for UndoRedoHistory {
    fn default() -> Self {
        UndoRedoHistory::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Locale;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A command that increments/decrements a shared counter and logs
    /// drops.
    struct CountingCommand {
        counter: Rc<RefCell<i32>>,
        drops: Rc<RefCell<u32>>,
    }

    impl Command for CountingCommand {
        fn apply(&mut self, _editor: &mut Editor) -> Result<(), CommandError> {
            *self.counter.borrow_mut() += 1;
            Ok(())
        }

        fn unapply(&mut self, _editor: &mut Editor) -> Result<(), CommandError> {
            *self.counter.borrow_mut() -= 1;
            Ok(())
        }

        fn on_drop(&mut self, _editor: &mut Editor) {
            *self.drops.borrow_mut() += 1;
        }

        fn description(&self, _locale: &Locale) -> String {
            "count".to_string()
        }
    }

    fn fixture() -> (Editor, Rc<RefCell<i32>>, Rc<RefCell<u32>>) {
        (
            Editor::new(),
            Rc::new(RefCell::new(0)),
            Rc::new(RefCell::new(0)),
        )
    }

    fn command(counter: &Rc<RefCell<i32>>, drops: &Rc<RefCell<u32>>) -> Box<dyn Command> {
        Box::new(CountingCommand {
            counter: Rc::clone(counter),
            drops: Rc::clone(drops),
        })
    }

    #[test]
    fn undo_redo_roundtrip() {
        let (mut editor, counter, drops) = fixture();
        let mut history = UndoRedoHistory::new();

        history
            .push(&mut editor, command(&counter, &drops), true)
            .unwrap();
        assert_eq!(*counter.borrow(), 1);

        assert!(history.undo(&mut editor).unwrap());
        assert_eq!(*counter.borrow(), 0);
        assert_eq!(history.redo_count(), 1);

        assert!(history.redo(&mut editor).unwrap());
        assert_eq!(*counter.borrow(), 1);

        // Nothing left to redo.
        assert!(!history.redo(&mut editor).unwrap());
    }

    #[test]
    fn push_clears_redo_with_on_drop() {
        let (mut editor, counter, drops) = fixture();
        let mut history = UndoRedoHistory::new();

        history
            .push(&mut editor, command(&counter, &drops), true)
            .unwrap();
        history.undo(&mut editor).unwrap();
        assert_eq!(history.redo_count(), 1);

        history
            .push(&mut editor, command(&counter, &drops), true)
            .unwrap();
        assert_eq!(history.redo_count(), 0);
        assert_eq!(*drops.borrow(), 1);
    }

    #[test]
    fn overflow_drops_a_chunk_from_the_oldest_end() {
        let (mut editor, counter, drops) = fixture();
        let mut history = UndoRedoHistory::with_cap(20);

        for _ in 0..21 {
            history
                .push(&mut editor, command(&counter, &drops), true)
                .unwrap();
        }

        // 21 pushes exceeded the cap once: ten dropped.
        assert_eq!(history.undo_count(), 11);
        assert_eq!(*drops.borrow(), 10);
    }

    #[test]
    fn long_undo_redo_sequences_are_lossless() {
        let (mut editor, counter, drops) = fixture();
        let mut history = UndoRedoHistory::new();

        for _ in 0..50 {
            history
                .push(&mut editor, command(&counter, &drops), true)
                .unwrap();
        }
        assert_eq!(*counter.borrow(), 50);

        for _ in 0..50 {
            assert!(history.undo(&mut editor).unwrap());
        }
        assert_eq!(*counter.borrow(), 0);

        for _ in 0..50 {
            assert!(history.redo(&mut editor).unwrap());
        }
        assert_eq!(*counter.borrow(), 50);
        assert_eq!(*drops.borrow(), 0);
    }
}
