//! Completion item normalization.
//!
//! Servers spell completion payloads several ways: a bare item array or a
//! `{isIncomplete, items}` list; labels as plain strings or `{label}`
//! objects; insert text as `insertText`, `textEdit.newText`, or the label
//! itself. Everything is resolved here at the protocol boundary so the rest
//! of the crate works with one flat value type.

use serde_json::Value;

/// One normalized completion item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionItem {
    /// Display label.
    pub label: String,
    /// Text to insert when accepted.
    pub insert_text: String,
    /// Optional one-line detail (type signature, module path).
    pub detail: Option<String>,
    /// Raw protocol kind number, if provided.
    pub kind: Option<u64>,
    /// Replacement range as `(start, end)` line/character pairs, when the
    /// server supplied a `textEdit` instead of plain insert text.
    pub replace_range: Option<((usize, usize), (usize, usize))>,
}

/// Normalize a `textDocument/completion` result in any of its shapes.
pub fn parse_completion_items(result: &Value) -> Vec<CompletionItem> {
    let items = match result {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => result
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };
    items.iter().filter_map(parse_item).collect()
}

fn parse_item(item: &Value) -> Option<CompletionItem> {
    let label = match item.get("label") {
        Some(Value::String(label)) => label.clone(),
        // Some servers nest the label with extra detail parts.
        Some(Value::Object(_)) => item
            .get("label")
            .and_then(|l| l.get("label"))
            .and_then(Value::as_str)?
            .to_string(),
        _ => return None,
    };

    let text_edit = item.get("textEdit");
    let insert_text = text_edit
        .and_then(|edit| edit.get("newText"))
        .or_else(|| item.get("insertText"))
        .and_then(Value::as_str)
        .unwrap_or(&label)
        .to_string();
    let replace_range = text_edit
        .and_then(|edit| edit.get("range").or_else(|| edit.get("replace")))
        .and_then(parse_range);

    Some(CompletionItem {
        label,
        insert_text,
        detail: item
            .get("detail")
            .and_then(Value::as_str)
            .map(str::to_string),
        kind: item.get("kind").and_then(Value::as_u64),
        replace_range,
    })
}

fn parse_range(range: &Value) -> Option<((usize, usize), (usize, usize))> {
    let pos = |p: &Value| {
        Some((
            p.get("line").and_then(Value::as_u64)? as usize,
            p.get("character").and_then(Value::as_u64)? as usize,
        ))
    };
    Some((pos(range.get("start")?)?, pos(range.get("end")?)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_array_with_string_labels() {
        let items = parse_completion_items(&json!([
            {"label": "push", "kind": 2, "detail": "fn push(&mut self, value: T)"},
            {"label": "pop"},
        ]));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "push");
        assert_eq!(items[0].insert_text, "push");
        assert_eq!(items[0].kind, Some(2));
        assert_eq!(items[1].detail, None);
    }

    #[test]
    fn test_list_shape_with_text_edit() {
        let items = parse_completion_items(&json!({
            "isIncomplete": false,
            "items": [{
                "label": "println!",
                "textEdit": {
                    "newText": "println!(\"$0\")",
                    "range": {
                        "start": {"line": 3, "character": 4},
                        "end": {"line": 3, "character": 7},
                    },
                },
            }],
        }));
        assert_eq!(items[0].insert_text, "println!(\"$0\")");
        assert_eq!(items[0].replace_range, Some(((3, 4), (3, 7))));
    }

    #[test]
    fn test_object_label_and_insert_text_fallbacks() {
        let items = parse_completion_items(&json!([
            {"label": {"label": "map", "description": "Iterator"}, "insertText": "map($0)"},
        ]));
        assert_eq!(items[0].label, "map");
        assert_eq!(items[0].insert_text, "map($0)");
    }

    #[test]
    fn test_unlabeled_items_dropped() {
        let items = parse_completion_items(&json!([{"kind": 1}, {"label": "ok"}]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "ok");
    }
}
