// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command/undo behavior over a real image: applying then unapplying any
//! command leaves the image observably unchanged, and serialized
//! commands behave identically after a round-trip.

use inkboard_geom::{Color, FuzzyEq, Mat33, Path, Rect2, Vec2};
use inkboard_model::command::{
    deserialize_command, Command, SerializableCommand, TransformElementCommand, UndoRedoHistory,
};
use inkboard_model::component::{Component, ComponentId, Stroke, StrokePart};
use inkboard_model::editor::Editor;
use inkboard_model::style::RenderingStyle;

fn stroke_component(d: &str) -> Component {
    Component::Stroke(Stroke::new(vec![StrokePart {
        path: Path::from_string(d).unwrap(),
        style: RenderingStyle::fill_only(Color::BLACK),
    }]))
}

/// The observable state §8 cares about: ids, z-order, and bboxes.
fn observable_state(editor: &Editor) -> Vec<(ComponentId, u64, Rect2)> {
    editor
        .image
        .all_elements()
        .iter()
        .map(|c| {
            let c = c.borrow();
            (c.id(), c.z_index(), c.content_bbox())
        })
        .collect()
}

fn states_equal(a: &[(ComponentId, u64, Rect2)], b: &[(ComponentId, u64, Rect2)]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((id_a, z_a, bb_a), (id_b, z_b, bb_b))| {
                id_a == id_b && z_a == z_b && bb_a.fuzzy_eq(bb_b)
            })
}

#[test]
fn apply_unapply_restores_observable_state() {
    let mut editor = Editor::new();
    let mut history = UndoRedoHistory::new();

    // Seed content outside the history so there is state to preserve.
    for i in 0..5 {
        let d = format!("M{},0 L{},10", i * 20, i * 20 + 10);
        editor
            .image
            .insert_component(inkboard_model::component::into_ref(stroke_component(&d)));
    }
    let baseline = observable_state(&editor);
    let target_id = editor.image.all_elements()[2].borrow().id();

    let commands: Vec<Box<dyn Command>> = vec![
        Box::new(editor.image.add_element(stroke_component("M300,300 L310,310"))),
        Box::new(TransformElementCommand::new(
            target_id,
            Mat33::translation(Vec2::new(50.0, -25.0)),
        )),
    ];

    for command in commands {
        history.push(&mut editor, command, true).unwrap();
        assert!(
            !states_equal(&baseline, &observable_state(&editor)),
            "the command should change the image"
        );
        history.undo(&mut editor).unwrap();
        assert!(
            states_equal(&baseline, &observable_state(&editor)),
            "undo should restore ids, z-orders and bboxes"
        );
    }
}

#[test]
fn capped_undo_sequences_are_lossless() {
    let mut editor = Editor::new();
    let mut history = UndoRedoHistory::new();
    let baseline = observable_state(&editor);

    let count = 40;
    for i in 0..count {
        let d = format!("M{},{} L{},{}", i, i, i + 10, i + 10);
        let command = editor.image.add_element(stroke_component(&d));
        history.push(&mut editor, Box::new(command), true).unwrap();
    }
    let full = observable_state(&editor);
    assert_eq!(full.len(), count as usize);

    for _ in 0..count {
        assert!(history.undo(&mut editor).unwrap());
    }
    assert!(states_equal(&baseline, &observable_state(&editor)));

    for _ in 0..count {
        assert!(history.redo(&mut editor).unwrap());
    }
    assert!(states_equal(&full, &observable_state(&editor)));
}

#[test]
fn serialized_commands_round_trip_behaviorally() {
    let mut editor = Editor::new();

    let component = stroke_component("M0,0 L10,0 Q15,5 20,0");
    let id = component.id();
    let add = editor.image.add_element(component);

    // Wire form matches §6.
    let wire = add.serialize();
    assert_eq!(wire["commandType"], "add-element");
    assert!(wire["data"]["elemData"].is_object());

    let mut restored = deserialize_command(&wire).unwrap();
    restored.apply(&mut editor).unwrap();
    assert!(editor.image.contains(id), "ids survive the round-trip");
    let bbox_after_apply = editor.image.find_element(id).unwrap().borrow().content_bbox();

    restored.unapply(&mut editor).unwrap();
    assert!(!editor.image.contains(id));

    // Transform commands round-trip too.
    restored.apply(&mut editor).unwrap();
    let transform = TransformElementCommand::new(id, Mat33::translation(Vec2::new(5.0, 5.0)));
    let wire = transform.serialize();
    assert_eq!(wire["commandType"], "transform-element");
    assert_eq!(wire["data"]["transfm"].as_array().unwrap().len(), 9);

    let mut restored_transform = deserialize_command(&wire).unwrap();
    restored_transform.apply(&mut editor).unwrap();
    let moved_bbox = editor.image.find_element(id).unwrap().borrow().content_bbox();
    assert!((moved_bbox.x - (bbox_after_apply.x + 5.0)).abs() < 1e-9);

    restored_transform.unapply(&mut editor).unwrap();
    let back_bbox = editor.image.find_element(id).unwrap().borrow().content_bbox();
    assert!(back_bbox.fuzzy_eq(&bbox_after_apply));
}

#[test]
fn deserializing_unknown_command_type_is_rejected() {
    let wire = serde_json::json!({ "commandType": "no-such-command", "data": {} });
    match deserialize_command(&wire) {
        Err(inkboard_model::command::CommandError::DeserializationRejected(kind)) => {
            assert_eq!(kind, "no-such-command")
        }
        other => panic!("expected rejection, got ok={}", other.is_ok()),
    }
}

#[test]
fn erase_command_round_trips_through_the_image() {
    use inkboard_model::command::EraseElementsCommand;

    let mut editor = Editor::new();
    let component = stroke_component("M0,0 L10,10");
    let id = component.id();
    editor
        .image
        .insert_component(inkboard_model::component::into_ref(component));

    let target = editor.image.find_element(id).unwrap();
    let mut erase = EraseElementsCommand::new(&[target]);
    erase.apply(&mut editor).unwrap();
    assert!(!editor.image.contains(id));

    erase.unapply(&mut editor).unwrap();
    assert!(editor.image.contains(id));
    assert_eq!(editor.image.all_elements().len(), 1);
}

#[test]
fn unite_commands_apply_in_order_and_unapply_reversed() {
    use inkboard_model::command::UniteCommands;

    let mut editor = Editor::new();
    let first = stroke_component("M0,0 L10,0");
    let second = stroke_component("M20,0 L30,0");
    let first_id = first.id();
    let second_id = second.id();

    let mut united: UniteCommands = UniteCommands::new(vec![
        Box::new(editor.image.add_element(first)),
        Box::new(editor.image.add_element(second)),
    ]);

    united.apply(&mut editor).unwrap();
    assert!(editor.image.contains(first_id) && editor.image.contains(second_id));

    united.unapply(&mut editor).unwrap();
    assert!(editor.image.all_elements().is_empty());

    // Serialized composites keep the same ordering semantics.
    united.apply(&mut editor).unwrap();
    let wire = united.serialize();
    united.unapply(&mut editor).unwrap();

    let mut restored = deserialize_command(&wire).unwrap();
    restored.apply(&mut editor).unwrap();
    assert_eq!(editor.image.all_elements().len(), 2);
    restored.unapply(&mut editor).unwrap();
    assert!(editor.image.all_elements().is_empty());
}
