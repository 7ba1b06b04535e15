//! Workspace-edit application.
//!
//! Servers return workspace edits in several shapes: a `changes` map keyed by
//! URI, a `documentChanges` list of per-document edit groups, a flat array of
//! text edits, or a command to be executed remotely instead of applied
//! locally. Parsing flattens all of them into per-document edit lists;
//! application resolves positions to char offsets through the engine and
//! applies edits in descending start order so earlier offsets stay valid.

use edit_engine::DocumentEditEngine;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;

/// One text replacement in line/character coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Start position, `(line, character)`.
    pub start: (usize, usize),
    /// End position, `(line, character)`, exclusive.
    pub end: (usize, usize),
    /// Replacement text.
    pub new_text: String,
}

/// A parsed workspace-edit payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEdit {
    /// Edits grouped by document URI.
    Changes(HashMap<String, Vec<TextEdit>>),
    /// A command the server should execute instead; nothing to apply locally.
    Command {
        /// Command identifier to send back via `workspace/executeCommand`.
        command: String,
        /// Arguments to pass along.
        arguments: Value,
    },
}

/// Parse a workspace-edit value in any of its shapes.
///
/// A flat edit array has no URI of its own; `default_uri` names the document
/// it applies to. Returns `None` when the value matches no known shape.
pub fn parse_workspace_edit(value: &Value, default_uri: &str) -> Option<WorkspaceEdit> {
    if let Some(command) = value.get("command").and_then(Value::as_str) {
        return Some(WorkspaceEdit::Command {
            command: command.to_string(),
            arguments: value.get("arguments").cloned().unwrap_or(Value::Null),
        });
    }

    let mut changes: HashMap<String, Vec<TextEdit>> = HashMap::new();

    if let Some(map) = value.get("changes").and_then(Value::as_object) {
        for (uri, edits) in map {
            changes
                .entry(uri.clone())
                .or_default()
                .extend(parse_edit_array(edits));
        }
    } else if let Some(groups) = value.get("documentChanges").and_then(Value::as_array) {
        for group in groups {
            let Some(uri) = group
                .get("textDocument")
                .and_then(|doc| doc.get("uri"))
                .and_then(Value::as_str)
            else {
                // Create/rename/delete file operations are out of scope.
                continue;
            };
            if let Some(edits) = group.get("edits") {
                changes
                    .entry(uri.to_string())
                    .or_default()
                    .extend(parse_edit_array(edits));
            }
        }
    } else if value.is_array() {
        changes.insert(default_uri.to_string(), parse_edit_array(value));
    } else {
        return None;
    }

    Some(WorkspaceEdit::Changes(changes))
}

fn parse_edit_array(value: &Value) -> Vec<TextEdit> {
    value
        .as_array()
        .map(|edits| edits.iter().filter_map(parse_text_edit).collect())
        .unwrap_or_default()
}

fn parse_text_edit(value: &Value) -> Option<TextEdit> {
    let range = value.get("range")?;
    let position = |p: &Value| {
        Some((
            p.get("line").and_then(Value::as_u64)? as usize,
            p.get("character").and_then(Value::as_u64)? as usize,
        ))
    };
    Some(TextEdit {
        start: position(range.get("start")?)?,
        end: position(range.get("end")?)?,
        new_text: value
            .get("newText")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    })
}

/// Apply one document's edits to `engine`.
///
/// Positions are resolved to char offsets up front, then edits are applied in
/// descending start order with the cursor preserved, so each application
/// leaves every lower offset untouched.
pub fn apply_text_edits(engine: &mut DocumentEditEngine, edits: &[TextEdit]) {
    let mut resolved: Vec<(usize, usize, &str)> = edits
        .iter()
        .map(|edit| {
            let start = engine.position_to_offset(edit.start.0, edit.start.1);
            let end = engine.position_to_offset(edit.end.0, edit.end.1);
            (start, end, edit.new_text.as_str())
        })
        .collect();
    resolved.sort_by_key(|&(start, _, _)| Reverse(start));
    for (start, end, text) in resolved {
        engine.replace_range(start, end, text, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edit(start: (usize, usize), end: (usize, usize), text: &str) -> Value {
        json!({
            "range": {
                "start": {"line": start.0, "character": start.1},
                "end": {"line": end.0, "character": end.1},
            },
            "newText": text,
        })
    }

    #[test]
    fn test_changes_map_shape() {
        let parsed = parse_workspace_edit(
            &json!({"changes": {"file:///a.rs": [edit((0, 0), (0, 3), "new")]}}),
            "file:///fallback.rs",
        )
        .unwrap();
        let WorkspaceEdit::Changes(changes) = parsed else {
            panic!("expected changes");
        };
        assert_eq!(changes["file:///a.rs"][0].new_text, "new");
    }

    #[test]
    fn test_document_changes_shape_skips_file_operations() {
        let parsed = parse_workspace_edit(
            &json!({"documentChanges": [
                {"kind": "create", "uri": "file:///new.rs"},
                {
                    "textDocument": {"uri": "file:///b.rs", "version": 4},
                    "edits": [edit((1, 0), (1, 0), "x")],
                },
            ]}),
            "file:///fallback.rs",
        )
        .unwrap();
        let WorkspaceEdit::Changes(changes) = parsed else {
            panic!("expected changes");
        };
        assert_eq!(changes.len(), 1);
        assert_eq!(changes["file:///b.rs"].len(), 1);
    }

    #[test]
    fn test_flat_array_uses_default_uri() {
        let parsed = parse_workspace_edit(
            &json!([edit((0, 0), (0, 1), "y")]),
            "file:///doc.rs",
        )
        .unwrap();
        let WorkspaceEdit::Changes(changes) = parsed else {
            panic!("expected changes");
        };
        assert_eq!(changes["file:///doc.rs"][0].new_text, "y");
    }

    #[test]
    fn test_command_shape() {
        let parsed = parse_workspace_edit(
            &json!({"command": "rust-analyzer.applySourceChange", "arguments": [1]}),
            "file:///doc.rs",
        )
        .unwrap();
        assert_eq!(
            parsed,
            WorkspaceEdit::Command {
                command: "rust-analyzer.applySourceChange".to_string(),
                arguments: json!([1]),
            }
        );
    }

    #[test]
    fn test_apply_descending_keeps_earlier_offsets_valid() {
        let mut engine = DocumentEditEngine::from_text("fn old_name() { old_body }");
        let edits = vec![
            TextEdit {
                start: (0, 3),
                end: (0, 11),
                new_text: "renamed".to_string(),
            },
            TextEdit {
                start: (0, 16),
                end: (0, 24),
                new_text: "new_body".to_string(),
            },
        ];
        apply_text_edits(&mut engine, &edits);
        assert_eq!(engine.text(), "fn renamed() { new_body }");
    }
}
