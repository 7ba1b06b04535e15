//! Semantic highlight decoding.
//!
//! The stream-based source delivers tokens as relatively encoded 5-tuples
//! `(delta_line, delta_start, length, token_type, modifiers)` resolved
//! against the legend negotiated at initialize time. The alternate push-based
//! source delivers whole symbols, either with direct line/column ranges or
//! with byte offsets that must be translated through a line-start table.

use serde_json::Value;

/// Token type and modifier names from the `initialize` response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SemanticTokensLegend {
    /// Token type names, indexed by the wire's `token_type`.
    pub token_types: Vec<String>,
    /// Modifier names, indexed by bit position in the wire's bitmask.
    pub token_modifiers: Vec<String>,
}

impl SemanticTokensLegend {
    /// Parse the legend out of a `semanticTokensProvider` capability value.
    pub fn from_capability(provider: &Value) -> Option<Self> {
        let legend = provider.get("legend")?;
        let token_types = string_array(legend.get("tokenTypes")?)?;
        let token_modifiers = legend
            .get("tokenModifiers")
            .and_then(string_array)
            .unwrap_or_default();
        Some(Self {
            token_types,
            token_modifiers,
        })
    }

    /// Resolve a token type index to its name.
    pub fn type_name(&self, index: u32) -> Option<&str> {
        self.token_types.get(index as usize).map(String::as_str)
    }

    /// Names of the modifiers set in `bitmask`.
    pub fn modifier_names(&self, bitmask: u32) -> Vec<&str> {
        self.token_modifiers
            .iter()
            .enumerate()
            .filter(|(bit, _)| bitmask & (1 << bit) != 0)
            .map(|(_, name)| name.as_str())
            .collect()
    }
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

/// One decoded highlight span in absolute document coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    /// Zero-based line.
    pub line: usize,
    /// Start column (character offset within the line).
    pub start: usize,
    /// Span length in characters.
    pub length: usize,
    /// Token type index into the legend.
    pub token_type: u32,
    /// Modifier bitmask, resolved via the legend.
    pub modifiers: u32,
}

/// Decode a relative 5-tuple stream into absolute tokens.
///
/// `line` accumulates `delta_line`; `start` accumulates `delta_start` only
/// while the line does not change. A trailing partial tuple is ignored.
pub fn decode_semantic_tokens(data: &[u32]) -> Vec<DecodedToken> {
    let mut tokens = Vec::with_capacity(data.len() / 5);
    let mut line = 0usize;
    let mut start = 0usize;
    for tuple in data.chunks_exact(5) {
        let [delta_line, delta_start, length, token_type, modifiers] = *tuple else {
            continue;
        };
        line += delta_line as usize;
        start = if delta_line == 0 {
            start + delta_start as usize
        } else {
            delta_start as usize
        };
        tokens.push(DecodedToken {
            line,
            start,
            length: length as usize,
            token_type,
            modifiers,
        });
    }
    tokens
}

/// Byte offsets of every line start, for translating byte-offset symbol
/// ranges into line/column pairs with a binary search.
#[derive(Debug, Clone)]
pub struct LineStartTable {
    starts: Vec<usize>,
}

impl LineStartTable {
    /// Build the table for `text`.
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    /// The line containing byte `offset` and the offset of that line's start.
    pub fn line_at(&self, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line, self.starts[line])
    }
}

/// Decode one pushed symbol-highlight entry into a token.
///
/// Symbols carry either a direct `{line, startChar, endChar}` range or a
/// `{startOffset, endOffset}` byte range translated through `table`.
pub fn decode_symbol_highlight(symbol: &Value, table: &LineStartTable) -> Option<DecodedToken> {
    let token_type = symbol.get("kind").and_then(Value::as_u64).unwrap_or(0) as u32;
    if let (Some(line), Some(start), Some(end)) = (
        symbol.get("line").and_then(Value::as_u64),
        symbol.get("startChar").and_then(Value::as_u64),
        symbol.get("endChar").and_then(Value::as_u64),
    ) {
        return Some(DecodedToken {
            line: line as usize,
            start: start as usize,
            length: (end.saturating_sub(start)) as usize,
            token_type,
            modifiers: 0,
        });
    }
    let start_offset = symbol.get("startOffset").and_then(Value::as_u64)? as usize;
    let end_offset = symbol.get("endOffset").and_then(Value::as_u64)? as usize;
    let (line, line_start) = table.line_at(start_offset);
    Some(DecodedToken {
        line,
        start: start_offset - line_start,
        length: end_offset.saturating_sub(start_offset),
        token_type,
        modifiers: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relative_decode_accumulates_within_a_line() {
        let tokens = decode_semantic_tokens(&[0, 4, 3, 12, 0, 0, 10, 5, 9, 0]);
        assert_eq!(
            tokens,
            vec![
                DecodedToken {
                    line: 0,
                    start: 4,
                    length: 3,
                    token_type: 12,
                    modifiers: 0
                },
                DecodedToken {
                    line: 0,
                    start: 14,
                    length: 5,
                    token_type: 9,
                    modifiers: 0
                },
            ]
        );
    }

    #[test]
    fn test_line_change_resets_start() {
        let tokens = decode_semantic_tokens(&[2, 6, 1, 0, 0, 1, 2, 4, 1, 0]);
        assert_eq!((tokens[0].line, tokens[0].start), (2, 6));
        assert_eq!((tokens[1].line, tokens[1].start), (3, 2));
    }

    #[test]
    fn test_partial_tuple_ignored() {
        assert_eq!(decode_semantic_tokens(&[0, 1, 2]).len(), 0);
        assert_eq!(decode_semantic_tokens(&[0, 1, 2, 3, 4, 9, 9]).len(), 1);
    }

    #[test]
    fn test_legend_resolution() {
        let legend = SemanticTokensLegend::from_capability(&json!({
            "legend": {
                "tokenTypes": ["function", "variable"],
                "tokenModifiers": ["readonly", "static"],
            }
        }))
        .unwrap();
        assert_eq!(legend.type_name(1), Some("variable"));
        assert_eq!(legend.type_name(5), None);
        assert_eq!(legend.modifier_names(0b11), vec!["readonly", "static"]);
    }

    #[test]
    fn test_symbol_highlight_byte_offsets_translate_through_table() {
        let table = LineStartTable::new("fn main() {\n    let x = 1;\n}\n");
        let symbol = json!({"startOffset": 20, "endOffset": 21, "kind": 3});
        let token = decode_symbol_highlight(&symbol, &table).unwrap();
        assert_eq!((token.line, token.start, token.length), (1, 8, 1));
        assert_eq!(token.token_type, 3);
    }

    #[test]
    fn test_symbol_highlight_direct_range() {
        let table = LineStartTable::new("x");
        let symbol = json!({"line": 4, "startChar": 2, "endChar": 9});
        let token = decode_symbol_highlight(&symbol, &table).unwrap();
        assert_eq!((token.line, token.start, token.length), (4, 2, 7));
    }
}
