//! Workspace-edit application against a real engine.

use edit_engine::DocumentEditEngine;
use edit_engine_lsp::{apply_text_edits, parse_workspace_edit, TextEdit, WorkspaceEdit};
use serde_json::json;

fn edit(start: (usize, usize), end: (usize, usize), text: &str) -> TextEdit {
    TextEdit {
        start,
        end,
        new_text: text.to_string(),
    }
}

#[test]
fn test_application_is_order_independent() {
    // "0123456789" repeated four times; edits at char offsets 10 and 30.
    let text = "0123456789012345678901234567890123456789";
    let edits = vec![
        edit((0, 10), (0, 12), "AA"),
        edit((0, 30), (0, 33), "B"),
    ];
    let reversed: Vec<TextEdit> = edits.iter().rev().cloned().collect();

    let mut forward = DocumentEditEngine::from_text(text);
    apply_text_edits(&mut forward, &edits);
    let mut backward = DocumentEditEngine::from_text(text);
    apply_text_edits(&mut backward, &reversed);

    assert_eq!(forward.text(), backward.text());
    assert_eq!(forward.text(), "0123456789AA234567890123456789B3456789");
}

#[test]
fn test_multiline_edits_resolve_through_line_lookup() {
    let mut engine = DocumentEditEngine::from_text("alpha\nbeta\ngamma\n");
    apply_text_edits(
        &mut engine,
        &[
            edit((0, 0), (0, 5), "first"),
            edit((2, 0), (2, 5), "third"),
            edit((1, 0), (1, 4), "second"),
        ],
    );
    assert_eq!(engine.text(), "first\nsecond\nthird\n");
}

#[test]
fn test_parsed_rename_payload_applies_cleanly() {
    let uri = "file:///lib.rs";
    let payload = json!({
        "changes": {
            uri: [
                {
                    "range": {"start": {"line": 0, "character": 3},
                              "end": {"line": 0, "character": 6}},
                    "newText": "renamed",
                },
                {
                    "range": {"start": {"line": 1, "character": 4},
                              "end": {"line": 1, "character": 7}},
                    "newText": "renamed",
                },
            ],
        },
    });
    let parsed = parse_workspace_edit(&payload, uri).unwrap();
    let WorkspaceEdit::Changes(changes) = parsed else {
        panic!("expected changes");
    };

    let mut engine = DocumentEditEngine::from_text("fn old() {\n    old()\n}\n");
    apply_text_edits(&mut engine, &changes[uri]);
    assert_eq!(engine.text(), "fn renamed() {\n    renamed()\n}\n");
}

#[test]
fn test_cursor_survives_edits_before_it() {
    let mut engine = DocumentEditEngine::from_text("aaa bbb ccc");
    engine.set_selection(edit_engine::Selection::collapsed(11));
    apply_text_edits(&mut engine, &[edit((0, 0), (0, 3), "a")]);
    // Two characters vanished before the cursor; it shifts with the text.
    assert_eq!(engine.selection().start(), 9);
}
