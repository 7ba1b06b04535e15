//! The document edit engine.
//!
//! [`DocumentEditEngine`] is the single entry point for text mutation. It owns
//! the rope, the single-line overlay, the selection, the fold tracker, and the
//! edit history, and keeps them mutually consistent: every mutation flushes or
//! routes through the overlay as appropriate, updates the selection, records
//! an invertible history operation, adjusts fold ranges when the line count
//! changes, and notifies subscribers.
//!
//! All offsets at this layer are character offsets into the effective
//! document (rope with the overlay's line substituted). Out-of-range offsets
//! are clamped.

use crate::error::EngineError;
use crate::events::{ChangeEvent, ChangeKind, EventRegistry, SubscriptionId};
use crate::folds::FoldRangeTracker;
use crate::history::{EditHistory, EditKind, EditOperation};
use crate::overlay::OverlayState;
use crate::rope_buffer::RopeBuffer;
use crate::selection::{Selection, SelectionEngine};
use crate::worker::BulkProcessor;
use std::ops::RangeInclusive;
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Indent unit for auto-indent and indent/unindent, default four spaces.
    pub indent_unit: String,
    /// Insert matching closers and skip over already-present ones.
    pub auto_closing_pairs: bool,
    /// Carry leading whitespace (plus one unit after an opener) into new lines.
    pub auto_indent: bool,
    /// Remove a folded block's fold range when its first line is deleted
    /// whole.
    pub remove_folds_on_line_delete: bool,
    /// Extra character ranges accepted as identifier characters, beyond
    /// ASCII alphanumerics and underscore.
    pub extended_script_ranges: Vec<RangeInclusive<char>>,
    /// Debounce delay before an idle overlay is written back to the rope.
    pub overlay_flush_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            indent_unit: "    ".to_string(),
            auto_closing_pairs: true,
            auto_indent: true,
            remove_folds_on_line_delete: true,
            extended_script_ranges: Vec::new(),
            overlay_flush_delay: Duration::from_millis(500),
        }
    }
}

/// An edit event delivered by the platform text-input boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Text inserted at an offset.
    Insertion {
        /// Insertion offset.
        offset: usize,
        /// Inserted text.
        text: String,
        /// Selection reported by the boundary after the insertion.
        selection_after: Selection,
    },
    /// A range deleted.
    Deletion {
        /// Start of the deleted range.
        start: usize,
        /// End of the deleted range, exclusive.
        end: usize,
        /// Selection reported by the boundary after the deletion.
        selection_after: Selection,
    },
    /// A range replaced with new text.
    Replacement {
        /// Start of the replaced range.
        start: usize,
        /// End of the replaced range, exclusive.
        end: usize,
        /// Replacement text.
        text: String,
        /// Selection reported by the boundary after the replacement.
        selection_after: Selection,
    },
    /// A selection change with no text change.
    NonTextUpdate {
        /// The new selection.
        selection: Selection,
    },
}

/// Callback receiving authoritative `(text, selection)` snapshots for the
/// platform input boundary.
pub type InputSnapshotSink = Box<dyn FnMut(&str, Selection)>;

enum SelectionOutcome {
    /// Collapse to the end of the inserted text.
    Collapse,
    /// Remap the previous selection's offsets through the edit.
    Remap,
    /// Set this exact selection.
    Explicit(Selection),
}

/// Orchestrates rope, overlay, selection, folds, and history.
pub struct DocumentEditEngine {
    rope: RopeBuffer,
    overlay: OverlayState,
    selection: SelectionEngine,
    folds: FoldRangeTracker,
    history: EditHistory,
    events: EventRegistry,
    config: EngineConfig,
    input_sink: Option<InputSnapshotSink>,
    fold_ranges_loaded: bool,
    batching: bool,
    batch_dirty: Option<(usize, usize)>,
    revision: u64,
}

impl DocumentEditEngine {
    /// An empty document with default configuration.
    pub fn new() -> Self {
        Self::with_config("", EngineConfig::default())
    }

    /// A document initialized from `text` with default configuration.
    pub fn from_text(text: &str) -> Self {
        Self::with_config(text, EngineConfig::default())
    }

    /// A document initialized from `text` with explicit configuration.
    pub fn with_config(text: &str, config: EngineConfig) -> Self {
        Self {
            rope: RopeBuffer::from_text(text),
            overlay: OverlayState::Inactive,
            selection: SelectionEngine::new(),
            folds: FoldRangeTracker::new(),
            history: EditHistory::new(),
            events: EventRegistry::new(),
            config,
            input_sink: None,
            fold_ranges_loaded: false,
            batching: false,
            batch_dirty: None,
            revision: 0,
        }
    }

    // ------------------------------------------------------------------
    // Reads (overlay-aware)

    /// Effective document length in characters.
    pub fn len(&self) -> usize {
        (self.rope.len() as isize + self.overlay.pending_delta()) as usize
    }

    /// Returns `true` when the document is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The effective document text, with the overlay's line substituted.
    pub fn text(&self) -> String {
        match self.overlay.active() {
            Some(buffer) if buffer.is_dirty() => {
                let mut text = self.rope.substring(0, buffer.rope_start_offset);
                text.push_str(&buffer.line_text);
                text.push_str(&self.rope.substring(
                    buffer.rope_start_offset + buffer.original_len,
                    self.rope.len(),
                ));
                text
            }
            _ => self.rope.text(),
        }
    }

    /// Effective line count. The overlay never holds newlines, so this always
    /// matches the rope.
    pub fn line_count(&self) -> usize {
        self.rope.line_count()
    }

    /// Effective text of line `index`, without its newline.
    pub fn line_text(&self, index: usize) -> String {
        match self.overlay.active() {
            Some(buffer) if buffer.is_dirty() && buffer.line_index == index => {
                buffer.line_text.clone()
            }
            _ => self.rope.line_text(index),
        }
    }

    /// The effective character at `offset`, or `None` past the end.
    pub fn char_at(&self, offset: usize) -> Option<char> {
        if let Some(buffer) = self.overlay.active() {
            if buffer.is_dirty() {
                let start = buffer.rope_start_offset;
                if offset >= start {
                    if offset < start + buffer.len() {
                        return buffer.line_text.chars().nth(offset - start);
                    }
                    let rope_offset = offset as isize - buffer.pending_delta();
                    return self.rope.char_at(rope_offset as usize);
                }
            }
        }
        self.rope.char_at(offset)
    }

    /// Convert an effective offset into `(line, column)`.
    pub fn offset_to_position(&self, offset: usize) -> (usize, usize) {
        if let Some(buffer) = self.overlay.active() {
            if buffer.is_dirty() {
                let start = buffer.rope_start_offset;
                if offset >= start {
                    if offset <= start + buffer.len() {
                        return (buffer.line_index, offset - start);
                    }
                    let rope_offset = offset as isize - buffer.pending_delta();
                    return self.rope.offset_to_position(rope_offset as usize);
                }
            }
        }
        self.rope.offset_to_position(offset.min(self.len()))
    }

    /// Convert a `(line, column)` pair into an effective offset.
    pub fn position_to_offset(&self, line: usize, column: usize) -> usize {
        if let Some(buffer) = self.overlay.active() {
            if buffer.is_dirty() {
                if line == buffer.line_index {
                    return buffer.rope_start_offset + column.min(buffer.len());
                }
                if line > buffer.line_index {
                    let rope_offset = self.rope.position_to_offset(line, column);
                    return (rope_offset as isize + buffer.pending_delta()) as usize;
                }
            }
        }
        self.rope.position_to_offset(line, column)
    }

    /// The current selection.
    pub fn selection(&self) -> Selection {
        self.selection.selection()
    }

    /// The fold tracker, for inspection.
    pub fn folds(&self) -> &FoldRangeTracker {
        &self.folds
    }

    /// Monotonic edit counter, bumped on every committed mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether an undo entry is available.
    pub fn can_undo(&self) -> bool {
        self.history.undo_depth() > 0
    }

    /// Whether a redo entry is available.
    pub fn can_redo(&self) -> bool {
        self.history.redo_depth() > 0
    }

    // ------------------------------------------------------------------
    // Subscriptions and the input boundary

    /// Subscribe to change events of `kind`.
    pub fn subscribe<F>(&mut self, kind: ChangeKind, callback: F) -> SubscriptionId
    where
        F: FnMut(&ChangeEvent) + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Register the sink that receives authoritative `(text, selection)`
    /// snapshots after programmatic mutations.
    pub fn set_input_sink(&mut self, sink: InputSnapshotSink) {
        self.input_sink = Some(sink);
    }

    // ------------------------------------------------------------------
    // Core mutation

    /// Replace `[start, end)` with `replacement`.
    ///
    /// Offsets are clamped. The selection collapses to the end of the
    /// replacement, or with `preserve_cursor` the previous selection is
    /// remapped through the edit. Records history, adjusts folds on line
    /// count changes, and notifies subscribers.
    pub fn replace_range(
        &mut self,
        start: usize,
        end: usize,
        replacement: &str,
        preserve_cursor: bool,
    ) {
        let outcome = if preserve_cursor {
            SelectionOutcome::Remap
        } else {
            SelectionOutcome::Collapse
        };
        self.replace_range_impl(start, end, replacement, outcome);
    }

    fn replace_range_impl(
        &mut self,
        start: usize,
        end: usize,
        replacement: &str,
        outcome: SelectionOutcome,
    ) {
        self.flush_overlay();
        let len = self.rope.len();
        let (start, end) = {
            let a = start.min(len);
            let b = end.min(len);
            (a.min(b), a.max(b))
        };
        let deleted = self.rope.substring(start, end);
        if deleted.is_empty() && replacement.is_empty() {
            return;
        }

        let selection_before = self.selection.selection();
        let lines_before = self.rope.line_count();
        let first_line = self.rope.line_at_offset(start);

        if self.config.remove_folds_on_line_delete && replacement.is_empty() {
            self.maybe_remove_fold_for_whole_line(start, end, first_line);
        }

        self.rope.delete(start, end);
        self.rope.insert(start, replacement);

        let inserted_len = replacement.chars().count();
        let new_len = self.rope.len();
        let new_selection = match outcome {
            SelectionOutcome::Collapse => Selection::collapsed(start + inserted_len),
            SelectionOutcome::Remap => {
                remap_selection(selection_before, start, end, inserted_len)
            }
            SelectionOutcome::Explicit(sel) => sel,
        };
        self.selection.set_selection(new_selection, new_len);
        let selection_after = self.selection.selection();

        let kind = if deleted.is_empty() {
            EditKind::Insert {
                offset: start,
                text: replacement.to_string(),
            }
        } else if replacement.is_empty() {
            EditKind::Delete {
                offset: start,
                text: deleted,
            }
        } else {
            EditKind::Replace {
                offset: start,
                deleted,
                inserted: replacement.to_string(),
            }
        };
        self.history
            .record(EditOperation::new(kind, selection_before, selection_after));

        let line_delta = self.rope.line_count() as isize - lines_before as isize;
        if line_delta != 0 {
            self.folds.adjust_for_line_change(first_line, line_delta);
            self.events.emit(&ChangeEvent::Folds);
        }
        let last_line = if line_delta != 0 {
            self.rope.line_count().saturating_sub(1)
        } else {
            self.rope.line_at_offset(start + inserted_len)
        };
        self.revision += 1;
        self.note_text_change(first_line, last_line);
    }

    fn maybe_remove_fold_for_whole_line(&mut self, start: usize, end: usize, line: usize) {
        if line + 1 >= self.rope.line_count() {
            return;
        }
        let line_start = self.rope.line_start_offset(line);
        let next_start = self.rope.line_start_offset(line + 1);
        if start != line_start || end != next_start {
            return;
        }
        if let Some(key) = self.folds.folded_block_starting_at(line) {
            self.folds.remove(key);
            self.events.emit(&ChangeEvent::Folds);
        }
    }

    /// Insert `text` at the cursor, replacing the selection when one is
    /// active, or the typed identifier prefix when `replace_typed_word` is
    /// set (the completion-acceptance path).
    ///
    /// Refused when the cursor line is hidden inside a folded range; the
    /// cursor is repositioned to the document end instead.
    pub fn insert_at_cursor(&mut self, text: &str, replace_typed_word: bool) {
        let sel = self.selection.selection();
        let caret = sel.extent;
        let (line, _) = self.offset_to_position(caret);
        if self.folds.is_line_hidden(line) {
            self.flush_overlay();
            let len = self.rope.len();
            self.selection.collapse_to(len, len);
            self.emit_selection();
            return;
        }
        let (start, end) = if replace_typed_word {
            let prefix = self.current_word_prefix();
            (caret - prefix.chars().count(), caret)
        } else if !sel.is_collapsed() {
            (sel.start(), sel.end())
        } else {
            (caret, caret)
        };
        self.replace_range(start, end, text, false);
    }

    /// Type a single character at the cursor: the interactive insertion path
    /// with auto-closing pairs, newline auto-indent, and overlay routing.
    pub fn type_char(&mut self, ch: char) {
        let sel = self.selection.selection();
        if !sel.is_collapsed() {
            let mut buf = [0u8; 4];
            self.replace_range(sel.start(), sel.end(), ch.encode_utf8(&mut buf), false);
            return;
        }
        let caret = sel.extent;
        if ch == '\n' {
            self.insert_newline(caret);
            return;
        }
        if self.config.auto_closing_pairs {
            if is_closing_char(ch) && self.char_at(caret) == Some(ch) {
                // Skip over the existing closer instead of duplicating it.
                self.selection.collapse_to(caret + 1, self.len());
                self.emit_selection();
                return;
            }
            if let Some(closer) = closing_pair(ch) {
                let pair = format!("{ch}{closer}");
                self.replace_range_impl(
                    caret,
                    caret,
                    &pair,
                    SelectionOutcome::Explicit(Selection::collapsed(caret + 1)),
                );
                return;
            }
        }
        self.type_char_via_overlay(caret, ch);
    }

    fn type_char_via_overlay(&mut self, caret: usize, ch: char) {
        let selection_before = self.selection.selection();
        let (line, column) = self.offset_to_position(caret);
        if self.overlay.active().is_some_and(|b| b.line_index != line) {
            self.flush_overlay();
        }
        let delay = self.config.overlay_flush_delay;
        let mut buf = [0u8; 4];
        let text = ch.encode_utf8(&mut buf);
        match self.overlay.activate(&self.rope, line, delay) {
            Some(buffer) => buffer.insert(column, text, delay),
            None => {
                self.replace_range_impl(caret, caret, text, SelectionOutcome::Collapse);
                return;
            }
        }
        let len = self.len();
        self.selection.set_selection(Selection::collapsed(caret + 1), len);
        let selection_after = self.selection.selection();
        self.history.record(EditOperation::new(
            EditKind::Insert {
                offset: caret,
                text: text.to_string(),
            },
            selection_before,
            selection_after,
        ));
        self.revision += 1;
        self.note_text_change(line, line);
    }

    fn insert_newline(&mut self, caret: usize) {
        self.flush_overlay();
        let caret = caret.min(self.rope.len());
        if !self.config.auto_indent {
            self.replace_range_impl(caret, caret, "\n", SelectionOutcome::Collapse);
            return;
        }
        let (line, column) = self.rope.offset_to_position(caret);
        let line_text = self.rope.line_text(line);
        let before: String = line_text.chars().take(column).collect();
        let after: String = line_text.chars().skip(column).collect();
        let indent: String = before
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect();
        let trimmed = before.trim_end();

        // An opener split across the caret from its closer becomes a blank
        // indented line with the caret on it.
        if let Some(closer) = trimmed.chars().last().and_then(bracket_closer) {
            if after.trim_start().starts_with(closer) {
                let unit = self.config.indent_unit.clone();
                let insertion = format!("\n{indent}{unit}\n{indent}");
                let caret_after =
                    caret + 1 + indent.chars().count() + unit.chars().count();
                self.replace_range_impl(
                    caret,
                    caret,
                    &insertion,
                    SelectionOutcome::Explicit(Selection::collapsed(caret_after)),
                );
                return;
            }
        }

        let mut insertion = String::from("\n");
        insertion.push_str(&indent);
        if trimmed.ends_with([':', '{', '[', '(']) {
            insertion.push_str(&self.config.indent_unit);
        }
        self.replace_range_impl(caret, caret, &insertion, SelectionOutcome::Collapse);
    }

    /// Delete backward: the selection when active, otherwise one character.
    /// Deleting a line-joining newline flushes and adjusts folds.
    pub fn backspace(&mut self) {
        let sel = self.selection.selection();
        if !sel.is_collapsed() {
            self.replace_range(sel.start(), sel.end(), "", false);
            return;
        }
        let caret = sel.extent;
        if caret == 0 {
            return;
        }
        let (line, column) = self.offset_to_position(caret);
        if column == 0 {
            // Newline merge; always hits the rope.
            self.replace_range(caret - 1, caret, "", false);
            return;
        }
        let selection_before = sel;
        if self.overlay.active().is_some_and(|b| b.line_index != line) {
            self.flush_overlay();
        }
        let delay = self.config.overlay_flush_delay;
        let removed = match self.overlay.activate(&self.rope, line, delay) {
            Some(buffer) => buffer.delete(column - 1, column, delay),
            None => {
                self.replace_range_impl(caret - 1, caret, "", SelectionOutcome::Collapse);
                return;
            }
        };
        let len = self.len();
        self.selection.set_selection(Selection::collapsed(caret - 1), len);
        let selection_after = self.selection.selection();
        self.history.record(EditOperation::new(
            EditKind::Delete {
                offset: caret - 1,
                text: removed,
            },
            selection_before,
            selection_after,
        ));
        self.revision += 1;
        self.note_text_change(line, line);
    }

    /// Delete forward: the selection when active, otherwise one character.
    pub fn delete_forward(&mut self) {
        let sel = self.selection.selection();
        if !sel.is_collapsed() {
            self.replace_range(sel.start(), sel.end(), "", false);
            return;
        }
        let caret = sel.extent;
        if caret >= self.len() {
            return;
        }
        let (line, column) = self.offset_to_position(caret);
        if column >= self.line_text(line).chars().count() {
            // Deleting the line's newline merges it with the next line.
            self.replace_range(caret, caret + 1, "", false);
            return;
        }
        let selection_before = sel;
        if self.overlay.active().is_some_and(|b| b.line_index != line) {
            self.flush_overlay();
        }
        let delay = self.config.overlay_flush_delay;
        let removed = match self.overlay.activate(&self.rope, line, delay) {
            Some(buffer) => buffer.delete(column, column + 1, delay),
            None => {
                self.replace_range_impl(caret, caret + 1, "", SelectionOutcome::Collapse);
                return;
            }
        };
        let len = self.len();
        self.selection.set_selection(Selection::collapsed(caret), len);
        let selection_after = self.selection.selection();
        self.history.record(EditOperation::new(
            EditKind::Delete {
                offset: caret,
                text: removed,
            },
            selection_before,
            selection_after,
        ));
        self.revision += 1;
        self.note_text_change(line, line);
    }

    // ------------------------------------------------------------------
    // Line operations

    /// Swap the cursor line with the line above it.
    pub fn move_line_up(&mut self) {
        self.flush_overlay();
        let sel = self.selection.selection();
        let line = self.rope.line_at_offset(sel.extent);
        if line == 0 {
            return;
        }
        let prev = line - 1;
        let prev_text = self.rope.line_text(prev);
        let cur_text = self.rope.line_text(line);
        let start = self.rope.line_start_offset(prev);
        let end = start + prev_text.chars().count() + 1 + cur_text.chars().count();
        let replacement = format!("{cur_text}\n{prev_text}");
        let shift = prev_text.chars().count() + 1;
        let new_selection = Selection::new(
            sel.base.saturating_sub(shift),
            sel.extent.saturating_sub(shift),
        );
        self.replace_range_impl(
            start,
            end,
            &replacement,
            SelectionOutcome::Explicit(new_selection),
        );
    }

    /// Swap the cursor line with the line below it.
    pub fn move_line_down(&mut self) {
        self.flush_overlay();
        let sel = self.selection.selection();
        let line = self.rope.line_at_offset(sel.extent);
        if line + 1 >= self.rope.line_count() {
            return;
        }
        let next = line + 1;
        let cur_text = self.rope.line_text(line);
        let next_text = self.rope.line_text(next);
        let start = self.rope.line_start_offset(line);
        let end = start + cur_text.chars().count() + 1 + next_text.chars().count();
        let replacement = format!("{next_text}\n{cur_text}");
        let shift = next_text.chars().count() + 1;
        let new_selection = Selection::new(sel.base + shift, sel.extent + shift);
        self.replace_range_impl(
            start,
            end,
            &replacement,
            SelectionOutcome::Explicit(new_selection),
        );
    }

    /// Duplicate the selection (or the cursor line) immediately after it and
    /// leave the cursor after the copy.
    pub fn duplicate_line(&mut self) {
        self.flush_overlay();
        let sel = self.selection.selection();
        if !sel.is_collapsed() {
            let copy = self.rope.substring(sel.start(), sel.end());
            let at = sel.end();
            let caret = at + copy.chars().count();
            self.replace_range_impl(
                at,
                at,
                &copy,
                SelectionOutcome::Explicit(Selection::collapsed(caret)),
            );
        } else {
            let line = self.rope.line_at_offset(sel.extent);
            let text = self.rope.line_text(line);
            let at = self.rope.line_start_offset(line) + text.chars().count();
            let insertion = format!("\n{text}");
            let caret = at + insertion.chars().count();
            self.replace_range_impl(
                at,
                at,
                &insertion,
                SelectionOutcome::Explicit(Selection::collapsed(caret)),
            );
        }
    }

    /// Add one indent unit to every line the selection touches.
    pub fn indent(&mut self) {
        self.flush_overlay();
        let sel = self.selection.selection();
        let first = self.rope.line_at_offset(sel.start());
        let last = self.rope.line_at_offset(sel.end());
        let unit = self.config.indent_unit.clone();
        let unit_len = unit.chars().count();

        let token = self.history.begin_compound();
        for line in first..=last {
            let at = self.rope.line_start_offset(line);
            self.replace_range_impl(
                at,
                at,
                &unit,
                SelectionOutcome::Explicit(Selection::collapsed(at + unit_len)),
            );
        }
        self.history.end_compound(token);

        let total = unit_len * (last - first + 1);
        let (new_start, new_end) = (sel.start() + unit_len, sel.end() + total);
        self.restore_directed_selection(sel, new_start, new_end);
    }

    /// Remove up to one indent unit from every line the selection touches.
    pub fn unindent(&mut self) {
        self.flush_overlay();
        let sel = self.selection.selection();
        let first = self.rope.line_at_offset(sel.start());
        let last = self.rope.line_at_offset(sel.end());
        let first_start = self.rope.line_start_offset(first);
        let unit = self.config.indent_unit.clone();

        let mut removed_first = 0;
        let mut total = 0;
        let token = self.history.begin_compound();
        for line in first..=last {
            let text = self.rope.line_text(line);
            let count = leading_indent_len(&text, &unit);
            if count == 0 {
                continue;
            }
            let at = self.rope.line_start_offset(line);
            self.replace_range_impl(
                at,
                at + count,
                "",
                SelectionOutcome::Explicit(Selection::collapsed(at)),
            );
            if line == first {
                removed_first = count;
            }
            total += count;
        }
        self.history.end_compound(token);
        if total == 0 {
            return;
        }

        let new_start = sel.start().saturating_sub(removed_first).max(first_start);
        let new_end = sel.end().saturating_sub(total).max(new_start);
        self.restore_directed_selection(sel, new_start, new_end);
    }

    fn restore_directed_selection(&mut self, old: Selection, start: usize, end: usize) {
        let new_selection = if old.base <= old.extent {
            Selection::new(start, end)
        } else {
            Selection::new(end, start)
        };
        self.selection.set_selection(new_selection, self.rope.len());
        self.history.amend_selection_after(self.selection.selection());
        self.emit_selection();
    }

    // ------------------------------------------------------------------
    // Identifier prefix

    /// The identifier ending at the cursor, or an empty string when the span
    /// is empty or does not start with a valid identifier-start character.
    pub fn current_word_prefix(&self) -> String {
        let caret = self.selection.selection().extent;
        let (line, column) = self.offset_to_position(caret);
        let chars: Vec<char> = self.line_text(line).chars().collect();
        let column = column.min(chars.len());
        let mut start = column;
        while start > 0 && self.is_identifier_char(chars[start - 1]) {
            start -= 1;
        }
        if start == column || !self.is_identifier_start(chars[start]) {
            return String::new();
        }
        chars[start..column].iter().collect()
    }

    fn is_identifier_char(&self, c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || self.in_extended_script(c)
    }

    fn is_identifier_start(&self, c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_' || self.in_extended_script(c)
    }

    fn in_extended_script(&self, c: char) -> bool {
        self.config
            .extended_script_ranges
            .iter()
            .any(|range| range.contains(&c))
    }

    // ------------------------------------------------------------------
    // Navigation (flushes the overlay; a selection-only change ends a burst)

    /// Move or extend the cursor one character left.
    pub fn move_left(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_left(&self.rope, extend);
        self.emit_selection();
    }

    /// Move or extend the cursor one character right.
    pub fn move_right(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_right(&self.rope, extend);
        self.emit_selection();
    }

    /// Move or extend the cursor one visible line up, skipping folds.
    pub fn move_up(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_up(&self.rope, &self.folds, extend);
        self.emit_selection();
    }

    /// Move or extend the cursor one visible line down, skipping folds.
    pub fn move_down(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_down(&self.rope, &self.folds, extend);
        self.emit_selection();
    }

    /// Move or extend to the start of the current line.
    pub fn move_line_home(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_line_home(&self.rope, extend);
        self.emit_selection();
    }

    /// Move or extend to the end of the current line.
    pub fn move_line_end(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_line_end(&self.rope, extend);
        self.emit_selection();
    }

    /// Move or extend to the start of the document.
    pub fn move_document_home(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_document_home(&self.rope, extend);
        self.emit_selection();
    }

    /// Move or extend to the end of the document.
    pub fn move_document_end(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_document_end(&self.rope, extend);
        self.emit_selection();
    }

    /// Move or extend to the previous word boundary.
    pub fn move_word_left(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_word_left(&self.rope, extend);
        self.emit_selection();
    }

    /// Move or extend to the next word boundary.
    pub fn move_word_right(&mut self, extend: bool) {
        self.flush_overlay();
        self.selection.move_word_right(&self.rope, extend);
        self.emit_selection();
    }

    /// Set the selection directly (a selection-only change; flushes).
    pub fn set_selection(&mut self, selection: Selection) {
        self.flush_overlay();
        let len = self.rope.len();
        self.selection.set_selection(selection, len);
        self.emit_selection();
    }

    // ------------------------------------------------------------------
    // Folds

    /// Install fold ranges from the analysis source.
    pub fn set_fold_ranges(&mut self, spans: &[(usize, usize)]) {
        self.folds.set_analysis_ranges(spans);
        self.fold_ranges_loaded = true;
        self.events.emit(&ChangeEvent::Folds);
    }

    /// Toggle the fold starting at `line`.
    ///
    /// Returns `Ok(false)` when no range starts there, and a precondition
    /// error when fold ranges were never loaded.
    pub fn toggle_fold(&mut self, line: usize) -> Result<bool, EngineError> {
        if !self.fold_ranges_loaded {
            return Err(EngineError::Precondition("fold ranges not loaded"));
        }
        let toggled = self.folds.toggle(line);
        if toggled {
            self.events.emit(&ChangeEvent::Folds);
        }
        Ok(toggled)
    }

    // ------------------------------------------------------------------
    // History

    /// Undo the most recent edit, restoring text and selection. Returns
    /// `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.flush_overlay();
        let Some(op) = self.history.start_undo() else {
            return false;
        };
        let inverse = op.inverse();
        self.apply_replay(&inverse.kind);
        let len = self.rope.len();
        self.selection.set_selection(op.selection_before.clamped(len), len);
        self.emit_selection();
        self.history.finish_undo(op);
        self.push_snapshot();
        true
    }

    /// Re-apply the most recently undone edit. Returns `false` when there is
    /// nothing to redo.
    pub fn redo(&mut self) -> bool {
        self.flush_overlay();
        let Some(op) = self.history.start_redo() else {
            return false;
        };
        self.apply_replay(&op.kind);
        let len = self.rope.len();
        self.selection.set_selection(op.selection_after.clamped(len), len);
        self.emit_selection();
        self.history.finish_redo(op);
        self.push_snapshot();
        true
    }

    /// Low-level replay application: rope mutation without heuristics or
    /// history recording (the history is in its replaying state).
    fn apply_replay(&mut self, kind: &EditKind) {
        match kind {
            EditKind::Insert { offset, text } => {
                self.replace_range_impl(*offset, *offset, text, SelectionOutcome::Collapse);
            }
            EditKind::Delete { offset, text } => {
                let end = offset + text.chars().count();
                self.replace_range_impl(*offset, end, "", SelectionOutcome::Collapse);
            }
            EditKind::Replace {
                offset,
                deleted,
                inserted,
            } => {
                let end = offset + deleted.chars().count();
                self.replace_range_impl(*offset, end, inserted, SelectionOutcome::Collapse);
            }
            EditKind::Compound(ops) => {
                for op in ops {
                    self.apply_replay(&op.kind);
                }
            }
        }
    }

    /// Open a compound undo group; see [`EditHistory::begin_compound`].
    pub fn begin_compound(&mut self) -> crate::history::CompoundToken {
        self.history.begin_compound()
    }

    /// Close a compound undo group.
    pub fn end_compound(&mut self, token: crate::history::CompoundToken) {
        self.history.end_compound(token);
    }

    // ------------------------------------------------------------------
    // Input boundary and maintenance

    /// Apply a batch of platform input events in order, with one consolidated
    /// text notification for the whole batch.
    pub fn apply_input_events(&mut self, events: &[InputEvent]) {
        self.batching = true;
        self.batch_dirty = None;
        for event in events {
            match event {
                InputEvent::Insertion {
                    offset,
                    text,
                    selection_after,
                } => {
                    self.replace_range_impl(
                        *offset,
                        *offset,
                        text,
                        SelectionOutcome::Explicit(*selection_after),
                    );
                }
                InputEvent::Deletion {
                    start,
                    end,
                    selection_after,
                } => {
                    self.replace_range_impl(
                        *start,
                        *end,
                        "",
                        SelectionOutcome::Explicit(*selection_after),
                    );
                }
                InputEvent::Replacement {
                    start,
                    end,
                    text,
                    selection_after,
                } => {
                    self.replace_range_impl(
                        *start,
                        *end,
                        text,
                        SelectionOutcome::Explicit(*selection_after),
                    );
                }
                InputEvent::NonTextUpdate { selection } => {
                    self.flush_overlay();
                    let len = self.rope.len();
                    self.selection.set_selection(*selection, len);
                    self.emit_selection();
                }
            }
        }
        self.batching = false;
        if let Some((first, last)) = self.batch_dirty.take() {
            self.events.emit(&ChangeEvent::Text {
                first_line: first,
                last_line: last,
            });
        }
    }

    /// Periodic maintenance: flush the overlay once its debounce deadline has
    /// elapsed.
    pub fn tick(&mut self) {
        let due = self
            .overlay
            .active()
            .is_some_and(|b| b.is_dirty() && b.flush_elapsed(Instant::now()));
        if due {
            self.flush_overlay();
        }
    }

    /// Run `job` over the effective text of `first_line..=last_line`,
    /// dispatched inline or to a worker by batch size. Results arrive as
    /// `(line_index, output)` pairs.
    pub fn process_line_range<T, F>(
        &self,
        first_line: usize,
        last_line: usize,
        processor: &BulkProcessor,
        job: F,
    ) -> mpsc::Receiver<(usize, T)>
    where
        T: Send + 'static,
        F: Fn(usize, &str) -> T + Send + 'static,
    {
        let last_line = last_line.min(self.line_count().saturating_sub(1));
        let lines: Vec<String> = (first_line..=last_line)
            .map(|i| self.line_text(i))
            .collect();
        processor.process(first_line, lines, job)
    }

    // ------------------------------------------------------------------

    fn flush_overlay(&mut self) {
        if let Some(flushed) = self.overlay.take_for_flush() {
            self.rope.delete(
                flushed.rope_start_offset,
                flushed.rope_start_offset + flushed.original_len,
            );
            self.rope.insert(flushed.rope_start_offset, &flushed.line_text);
        }
    }

    fn note_text_change(&mut self, first_line: usize, last_line: usize) {
        if self.batching {
            self.batch_dirty = Some(match self.batch_dirty {
                Some((f, l)) => (f.min(first_line), l.max(last_line)),
                None => (first_line, last_line),
            });
            return;
        }
        self.events.emit(&ChangeEvent::Text {
            first_line,
            last_line,
        });
        self.push_snapshot();
    }

    fn emit_selection(&mut self) {
        self.events.emit(&ChangeEvent::Selection {
            selection: self.selection.selection(),
        });
    }

    fn push_snapshot(&mut self) {
        if self.batching || self.input_sink.is_none() {
            return;
        }
        let text = self.text();
        let selection = self.selection.selection();
        if let Some(sink) = self.input_sink.as_mut() {
            sink(&text, selection);
        }
    }
}

impl Default for DocumentEditEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn remap_selection(sel: Selection, start: usize, end: usize, inserted_len: usize) -> Selection {
    let remap = |offset: usize| -> usize {
        if offset <= start {
            offset
        } else if offset >= end {
            offset - (end - start) + inserted_len
        } else {
            offset.min(start + inserted_len)
        }
    };
    Selection::new(remap(sel.base), remap(sel.extent))
}

fn closing_pair(ch: char) -> Option<char> {
    match ch {
        '(' => Some(')'),
        '{' => Some('}'),
        '[' => Some(']'),
        '"' => Some('"'),
        '\'' => Some('\''),
        _ => None,
    }
}

fn bracket_closer(ch: char) -> Option<char> {
    match ch {
        '(' => Some(')'),
        '{' => Some('}'),
        '[' => Some(']'),
        _ => None,
    }
}

fn is_closing_char(ch: char) -> bool {
    matches!(ch, ')' | '}' | ']' | '"' | '\'')
}

fn leading_indent_len(text: &str, unit: &str) -> usize {
    if text.starts_with(unit) {
        return unit.chars().count();
    }
    if text.starts_with('\t') {
        return 1;
    }
    let unit_len = unit.chars().count();
    text.chars().take_while(|c| *c == ' ').count().min(unit_len)
}
