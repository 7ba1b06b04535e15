//! Bulk text storage.
//!
//! [`RopeBuffer`] wraps a [`ropey::Rope`] and exposes the character-offset
//! contract the rest of the engine is written against: O(log n) insert/delete,
//! substring extraction, and line lookups. All offsets are character offsets
//! (Unicode scalar values), and every entry point clamps rather than panics,
//! since offsets routinely arrive from stale UI or protocol events.

use ropey::Rope;

/// Rope-backed text storage with clamped, character-offset addressing.
pub struct RopeBuffer {
    rope: Rope,
}

impl RopeBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self { rope: Rope::new() }
    }

    /// Create a buffer from initial text.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Total character count.
    pub fn len(&self) -> usize {
        self.rope.len_chars()
    }

    /// Returns `true` if the buffer contains no text.
    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Total line count. An empty buffer has one (empty) line; a trailing
    /// newline implies a final empty line, matching editor semantics.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Insert `text` at character `offset` (clamped to the buffer length).
    pub fn insert(&mut self, offset: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let offset = offset.min(self.rope.len_chars());
        self.rope.insert(offset, text);
    }

    /// Delete the character range `[start, end)` (both ends clamped).
    pub fn delete(&mut self, start: usize, end: usize) {
        let len = self.rope.len_chars();
        let start = start.min(len);
        let end = end.min(len);
        if start >= end {
            return;
        }
        self.rope.remove(start..end);
    }

    /// Extract the text in `[start, end)` (both ends clamped).
    pub fn substring(&self, start: usize, end: usize) -> String {
        let len = self.rope.len_chars();
        let start = start.min(len);
        let end = end.min(len);
        if start >= end {
            return String::new();
        }
        self.rope.slice(start..end).to_string()
    }

    /// The character at `offset`, or `None` past the end.
    pub fn char_at(&self, offset: usize) -> Option<char> {
        if offset < self.rope.len_chars() {
            Some(self.rope.char(offset))
        } else {
            None
        }
    }

    /// The whole document as a `String`.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Text of line `index` without its trailing newline. Out-of-range lines
    /// yield an empty string.
    pub fn line_text(&self, index: usize) -> String {
        if index >= self.rope.len_lines() {
            return String::new();
        }
        let line = self.rope.line(index);
        let mut text = line.to_string();
        if text.ends_with('\n') {
            text.pop();
            if text.ends_with('\r') {
                text.pop();
            }
        }
        text
    }

    /// Character length of line `index`, excluding its newline.
    pub fn line_len(&self, index: usize) -> usize {
        if index >= self.rope.len_lines() {
            return 0;
        }
        let start = self.rope.line_to_char(index);
        let end = if index + 1 < self.rope.len_lines() {
            self.rope.line_to_char(index + 1).saturating_sub(1)
        } else {
            self.rope.len_chars()
        };
        end.saturating_sub(start)
    }

    /// Character offset of the first character of line `index` (clamped to the
    /// last line).
    pub fn line_start_offset(&self, index: usize) -> usize {
        let index = index.min(self.rope.len_lines().saturating_sub(1));
        self.rope.line_to_char(index)
    }

    /// Line index containing character `offset` (clamped).
    pub fn line_at_offset(&self, offset: usize) -> usize {
        let offset = offset.min(self.rope.len_chars());
        self.rope.char_to_line(offset)
    }

    /// Convert `offset` into a `(line, column)` pair, both clamped.
    pub fn offset_to_position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.rope.len_chars());
        let line = self.rope.char_to_line(offset);
        (line, offset - self.rope.line_to_char(line))
    }

    /// Convert a `(line, column)` pair into a character offset, clamping the
    /// column to the line length.
    pub fn position_to_offset(&self, line: usize, column: usize) -> usize {
        let line = line.min(self.rope.len_lines().saturating_sub(1));
        self.line_start_offset(line) + column.min(self.line_len(line))
    }
}

impl Default for RopeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_delete_substring() {
        let mut buf = RopeBuffer::from_text("Hello World");
        buf.insert(5, ",");
        assert_eq!(buf.text(), "Hello, World");
        buf.delete(0, 7);
        assert_eq!(buf.text(), "World");
        assert_eq!(buf.substring(1, 4), "orl");
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let mut buf = RopeBuffer::from_text("abc");
        buf.insert(100, "!");
        assert_eq!(buf.text(), "abc!");
        buf.delete(2, 100);
        assert_eq!(buf.text(), "ab");
        assert_eq!(buf.substring(1, 100), "b");
        assert_eq!(buf.char_at(100), None);
    }

    #[test]
    fn test_line_lookups() {
        let buf = RopeBuffer::from_text("one\ntwo\nthree");
        assert_eq!(buf.line_count(), 3);
        assert_eq!(buf.line_text(1), "two");
        assert_eq!(buf.line_start_offset(1), 4);
        assert_eq!(buf.line_at_offset(5), 1);
        assert_eq!(buf.line_len(2), 5);
        assert_eq!(buf.offset_to_position(9), (2, 1));
        assert_eq!(buf.position_to_offset(2, 100), 13);
    }

    #[test]
    fn test_trailing_newline_adds_empty_line() {
        let buf = RopeBuffer::from_text("a\n");
        assert_eq!(buf.line_count(), 2);
        assert_eq!(buf.line_text(1), "");
        assert_eq!(buf.line_len(1), 0);
    }

    #[test]
    fn test_multibyte_offsets_are_char_based() {
        let mut buf = RopeBuffer::from_text("你好");
        buf.insert(1, "们");
        assert_eq!(buf.text(), "你们好");
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.char_at(2), Some('好'));
    }
}
