//! Selection state and fold-aware navigation.
//!
//! A [`Selection`] is a `(base, extent)` pair of character offsets. The base
//! is the anchor; the extent is the caret that moves. Extension keeps the base
//! fixed, plain movement collapses first.
//!
//! [`SelectionEngine`] owns the current selection and the desired column used
//! to keep the caret in place across vertical movement through short lines.
//! Vertical moves skip over collapsed fold ranges instead of landing on
//! hidden lines.

use crate::folds::FoldRangeTracker;
use crate::rope_buffer::RopeBuffer;
use unicode_segmentation::UnicodeSegmentation;

/// An anchor/caret pair of character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// The anchor; stays put while extending.
    pub base: usize,
    /// The caret; moves during navigation.
    pub extent: usize,
}

impl Selection {
    /// A collapsed selection at `offset`.
    pub fn collapsed(offset: usize) -> Self {
        Self {
            base: offset,
            extent: offset,
        }
    }

    /// A selection spanning from `base` to `extent`.
    pub fn new(base: usize, extent: usize) -> Self {
        Self { base, extent }
    }

    /// The smaller of the two offsets.
    pub fn start(&self) -> usize {
        self.base.min(self.extent)
    }

    /// The larger of the two offsets.
    pub fn end(&self) -> usize {
        self.base.max(self.extent)
    }

    /// Whether base and extent coincide.
    pub fn is_collapsed(&self) -> bool {
        self.base == self.extent
    }

    /// Both offsets clamped to `[0, len]`.
    pub fn clamped(&self, len: usize) -> Self {
        Self {
            base: self.base.min(len),
            extent: self.extent.min(len),
        }
    }
}

/// Owns the current selection and performs fold-aware navigation.
#[derive(Debug)]
pub struct SelectionEngine {
    selection: Selection,
    desired_column: Option<usize>,
}

impl SelectionEngine {
    /// A collapsed selection at offset 0.
    pub fn new() -> Self {
        Self {
            selection: Selection::collapsed(0),
            desired_column: None,
        }
    }

    /// The current selection.
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Replace the selection, clamping to `len`. Resets the desired column.
    pub fn set_selection(&mut self, selection: Selection, len: usize) {
        self.selection = selection.clamped(len);
        self.desired_column = None;
    }

    /// Collapse to `offset`, clamping to `len`. Resets the desired column.
    pub fn collapse_to(&mut self, offset: usize, len: usize) {
        self.set_selection(Selection::collapsed(offset), len);
    }

    /// Clamp the current selection after a document length change.
    pub fn clamp(&mut self, len: usize) {
        self.selection = self.selection.clamped(len);
    }

    /// Move or extend one character left. A non-collapsed selection collapses
    /// to its start when not extending.
    pub fn move_left(&mut self, rope: &RopeBuffer, extend: bool) {
        if !extend && !self.selection.is_collapsed() {
            self.collapse_to(self.selection.start(), rope.len());
            return;
        }
        let target = self.selection.extent.saturating_sub(1);
        self.place_extent(target, rope.len(), extend);
    }

    /// Move or extend one character right. A non-collapsed selection collapses
    /// to its end when not extending.
    pub fn move_right(&mut self, rope: &RopeBuffer, extend: bool) {
        if !extend && !self.selection.is_collapsed() {
            self.collapse_to(self.selection.end(), rope.len());
            return;
        }
        let target = self.selection.extent + 1;
        self.place_extent(target, rope.len(), extend);
    }

    /// Move or extend one visible line up, skipping collapsed folds.
    pub fn move_up(&mut self, rope: &RopeBuffer, folds: &FoldRangeTracker, extend: bool) {
        self.move_vertical(rope, folds, extend, -1);
    }

    /// Move or extend one visible line down, skipping collapsed folds.
    pub fn move_down(&mut self, rope: &RopeBuffer, folds: &FoldRangeTracker, extend: bool) {
        self.move_vertical(rope, folds, extend, 1);
    }

    fn move_vertical(
        &mut self,
        rope: &RopeBuffer,
        folds: &FoldRangeTracker,
        extend: bool,
        direction: isize,
    ) {
        let (line, column) = rope.offset_to_position(self.selection.extent);
        let column = self.desired_column.unwrap_or(column);
        let last_line = rope.line_count().saturating_sub(1);

        let mut target = line as isize + direction;
        if target < 0 {
            target = 0;
        }
        let mut target = (target as usize).min(last_line);

        // Hidden target lines resolve to the fold boundary: the fold's start
        // when moving up, one past its end when moving down.
        while let Some(range) = folds.folded_range_hiding(target) {
            if direction < 0 {
                target = range.start_line;
            } else {
                let next = range.end_line + 1;
                if next > last_line {
                    target = range.start_line;
                    break;
                }
                target = next;
            }
        }

        let offset = rope.position_to_offset(target, column);
        if extend {
            self.selection.extent = offset.min(rope.len());
        } else {
            self.selection = Selection::collapsed(offset.min(rope.len()));
        }
        self.desired_column = Some(column);
    }

    /// Move or extend to the start of the current line.
    pub fn move_line_home(&mut self, rope: &RopeBuffer, extend: bool) {
        let line = rope.line_at_offset(self.selection.extent);
        self.place_extent(rope.line_start_offset(line), rope.len(), extend);
    }

    /// Move or extend to the end of the current line.
    pub fn move_line_end(&mut self, rope: &RopeBuffer, extend: bool) {
        let line = rope.line_at_offset(self.selection.extent);
        let target = rope.line_start_offset(line) + rope.line_len(line);
        self.place_extent(target, rope.len(), extend);
    }

    /// Move or extend to the start of the document.
    pub fn move_document_home(&mut self, rope: &RopeBuffer, extend: bool) {
        self.place_extent(0, rope.len(), extend);
    }

    /// Move or extend to the end of the document.
    pub fn move_document_end(&mut self, rope: &RopeBuffer, extend: bool) {
        self.place_extent(rope.len(), rope.len(), extend);
    }

    /// Move or extend to the start of the previous word.
    pub fn move_word_left(&mut self, rope: &RopeBuffer, extend: bool) {
        let offset = self.selection.extent;
        let (line, column) = rope.offset_to_position(offset);
        let target = if column == 0 {
            if line == 0 {
                0
            } else {
                rope.line_start_offset(line - 1) + rope.line_len(line - 1)
            }
        } else {
            let text = rope.line_text(line);
            let start = word_starts(&text)
                .into_iter()
                .rev()
                .find(|&s| s < column)
                .unwrap_or(0);
            rope.line_start_offset(line) + start
        };
        self.place_extent(target, rope.len(), extend);
    }

    /// Move or extend to the start of the next word (or the line end when no
    /// word follows on the line).
    pub fn move_word_right(&mut self, rope: &RopeBuffer, extend: bool) {
        let offset = self.selection.extent;
        let (line, column) = rope.offset_to_position(offset);
        let line_len = rope.line_len(line);
        let target = if column >= line_len {
            if line + 1 < rope.line_count() {
                rope.line_start_offset(line + 1)
            } else {
                rope.len()
            }
        } else {
            let text = rope.line_text(line);
            let start = word_starts(&text)
                .into_iter()
                .find(|&s| s > column)
                .unwrap_or(line_len);
            rope.line_start_offset(line) + start
        };
        self.place_extent(target, rope.len(), extend);
    }

    fn place_extent(&mut self, target: usize, len: usize, extend: bool) {
        let target = target.min(len);
        if extend {
            self.selection.extent = target;
        } else {
            self.selection = Selection::collapsed(target);
        }
        self.desired_column = None;
    }
}

impl Default for SelectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Character columns at which non-whitespace words start within `text`.
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut column = 0;
    for word in text.split_word_bounds() {
        if !word.chars().all(char::is_whitespace) {
            starts.push(column);
        }
        column += word.chars().count();
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folded(spans: &[(usize, usize)]) -> FoldRangeTracker {
        let mut t = FoldRangeTracker::new();
        t.set_analysis_ranges(spans);
        for &(start, _) in spans {
            t.fold(start);
        }
        t
    }

    #[test]
    fn test_horizontal_collapses_selection_to_edge() {
        let rope = RopeBuffer::from_text("abcdef");
        let mut sel = SelectionEngine::new();
        sel.set_selection(Selection::new(2, 5), rope.len());

        sel.move_left(&rope, false);
        assert_eq!(sel.selection(), Selection::collapsed(2));

        sel.set_selection(Selection::new(2, 5), rope.len());
        sel.move_right(&rope, false);
        assert_eq!(sel.selection(), Selection::collapsed(5));
    }

    #[test]
    fn test_extend_keeps_base() {
        let rope = RopeBuffer::from_text("abcdef");
        let mut sel = SelectionEngine::new();
        sel.collapse_to(3, rope.len());
        sel.move_right(&rope, true);
        sel.move_right(&rope, true);
        assert_eq!(sel.selection(), Selection::new(3, 5));
    }

    #[test]
    fn test_vertical_skips_folded_range() {
        let rope = RopeBuffer::from_text("l0\nl1\nl2\nl3\nl4\nl5");
        let folds = folded(&[(1, 3)]);
        let mut sel = SelectionEngine::new();

        sel.collapse_to(rope.line_start_offset(1), rope.len());
        sel.move_down(&rope, &folds, false);
        assert_eq!(rope.line_at_offset(sel.selection().extent), 4);

        sel.move_up(&rope, &folds, false);
        assert_eq!(rope.line_at_offset(sel.selection().extent), 1);
    }

    #[test]
    fn test_desired_column_survives_short_line() {
        let rope = RopeBuffer::from_text("abcdef\nx\nabcdef");
        let folds = FoldRangeTracker::new();
        let mut sel = SelectionEngine::new();
        sel.collapse_to(4, rope.len());

        sel.move_down(&rope, &folds, false);
        assert_eq!(rope.offset_to_position(sel.selection().extent), (1, 1));
        sel.move_down(&rope, &folds, false);
        assert_eq!(rope.offset_to_position(sel.selection().extent), (2, 4));
    }

    #[test]
    fn test_home_end_and_document_bounds() {
        let rope = RopeBuffer::from_text("one\ntwo three");
        let mut sel = SelectionEngine::new();
        sel.collapse_to(8, rope.len());

        sel.move_line_home(&rope, false);
        assert_eq!(sel.selection().extent, 4);
        sel.move_line_end(&rope, false);
        assert_eq!(sel.selection().extent, 13);
        sel.move_document_home(&rope, true);
        assert_eq!(sel.selection(), Selection::new(13, 0));
        sel.move_document_end(&rope, false);
        assert_eq!(sel.selection(), Selection::collapsed(13));
    }

    #[test]
    fn test_word_motion() {
        let rope = RopeBuffer::from_text("foo bar_baz  qux");
        let mut sel = SelectionEngine::new();

        sel.move_word_right(&rope, false);
        assert_eq!(sel.selection().extent, 4);
        sel.move_word_right(&rope, false);
        assert_eq!(sel.selection().extent, 13);
        sel.move_word_left(&rope, false);
        assert_eq!(sel.selection().extent, 4);
        sel.move_word_left(&rope, false);
        assert_eq!(sel.selection().extent, 0);
    }

    #[test]
    fn test_word_motion_crosses_lines() {
        let rope = RopeBuffer::from_text("ab\ncd");
        let mut sel = SelectionEngine::new();
        sel.collapse_to(2, rope.len());
        sel.move_word_right(&rope, false);
        assert_eq!(sel.selection().extent, 3);
        sel.move_word_left(&rope, false);
        assert_eq!(sel.selection().extent, 2);
    }
}
