//! Undo/redo history.
//!
//! Every committed mutation is recorded as an [`EditOperation`]: a tagged
//! union whose inversion and merge logic live with the variants, replayed by
//! the engine through its low-level apply path. The history itself is a pair
//! of bounded stacks with adjacency-based coalescing, so a typing burst
//! undoes as one unit.
//!
//! The history never mutates the document. The engine pops an operation,
//! marks the history as replaying so the replayed edit is not re-recorded,
//! applies the inverse itself, and pushes the operation onto the other stack.

use crate::selection::Selection;
use std::time::{Duration, Instant};

/// Default maximum number of undo entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Default window within which adjacent same-kind edits coalesce.
pub const DEFAULT_MERGE_WINDOW: Duration = Duration::from_millis(1000);

/// The shape of a recorded edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    /// `text` was inserted at `offset`.
    Insert {
        /// Insertion offset.
        offset: usize,
        /// Inserted text.
        text: String,
    },
    /// `text` was deleted starting at `offset`.
    Delete {
        /// Deletion offset.
        offset: usize,
        /// Deleted text.
        text: String,
    },
    /// `deleted` was replaced by `inserted` at `offset`.
    Replace {
        /// Replacement offset.
        offset: usize,
        /// Text removed.
        deleted: String,
        /// Text inserted in its place.
        inserted: String,
    },
    /// Several operations applied as one undo unit, in application order.
    Compound(Vec<EditOperation>),
}

/// One undoable edit with the selections on either side of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOperation {
    /// What changed.
    pub kind: EditKind,
    /// Selection before the edit was applied.
    pub selection_before: Selection,
    /// Selection after the edit was applied.
    pub selection_after: Selection,
    /// When the edit was recorded; drives merge windows.
    pub timestamp: Instant,
}

impl EditOperation {
    /// Record an edit happening now.
    pub fn new(kind: EditKind, selection_before: Selection, selection_after: Selection) -> Self {
        Self {
            kind,
            selection_before,
            selection_after,
            timestamp: Instant::now(),
        }
    }

    /// The operation that exactly reverses this one. Selections swap so that
    /// applying the inverse also restores the pre-edit selection.
    pub fn inverse(&self) -> EditOperation {
        let kind = match &self.kind {
            EditKind::Insert { offset, text } => EditKind::Delete {
                offset: *offset,
                text: text.clone(),
            },
            EditKind::Delete { offset, text } => EditKind::Insert {
                offset: *offset,
                text: text.clone(),
            },
            EditKind::Replace {
                offset,
                deleted,
                inserted,
            } => EditKind::Replace {
                offset: *offset,
                deleted: inserted.clone(),
                inserted: deleted.clone(),
            },
            EditKind::Compound(ops) => {
                EditKind::Compound(ops.iter().rev().map(|op| op.inverse()).collect())
            }
        };
        EditOperation {
            kind,
            selection_before: self.selection_after,
            selection_after: self.selection_before,
            timestamp: self.timestamp,
        }
    }

    /// Whether `next` can be folded into this operation as one undo unit.
    fn can_merge_with(&self, next: &EditOperation, window: Duration) -> bool {
        if next.timestamp.duration_since(self.timestamp) > window {
            return false;
        }
        match (&self.kind, &next.kind) {
            (
                EditKind::Insert { offset, text },
                EditKind::Insert {
                    offset: next_offset,
                    text: next_text,
                },
            ) => {
                if text.contains('\n') || next_text.contains('\n') {
                    return false;
                }
                if *next_offset != offset + text.chars().count() {
                    return false;
                }
                // A token should not silently swallow a following space run
                // (or vice versa); such joins stay separate undo units.
                let ends_ws = text.chars().last().is_some_and(char::is_whitespace);
                let starts_ws = next_text.chars().next().is_some_and(char::is_whitespace);
                text.is_empty() || next_text.is_empty() || ends_ws == starts_ws
            }
            (
                EditKind::Delete { offset, text },
                EditKind::Delete {
                    offset: next_offset,
                    text: next_text,
                },
            ) => {
                if text.contains('\n') || next_text.contains('\n') {
                    return false;
                }
                let backspace_chain = next_offset + next_text.chars().count() == *offset;
                let forward_chain = next_offset == offset;
                backspace_chain || forward_chain
            }
            _ => false,
        }
    }

    /// Fold `next` into this operation. Caller must have checked
    /// `can_merge_with`.
    fn merge_with(&mut self, next: EditOperation) {
        match (&mut self.kind, next.kind) {
            (
                EditKind::Insert { text, .. },
                EditKind::Insert {
                    text: next_text, ..
                },
            ) => {
                text.push_str(&next_text);
            }
            (
                EditKind::Delete { offset, text },
                EditKind::Delete {
                    offset: next_offset,
                    text: next_text,
                },
            ) => {
                if next_offset == *offset {
                    // Forward-delete chain: removed text accumulates rightward.
                    text.push_str(&next_text);
                } else {
                    // Backspace chain: removed text accumulates leftward.
                    *offset = next_offset;
                    let mut merged = next_text;
                    merged.push_str(text);
                    *text = merged;
                }
            }
            _ => unreachable!("merge_with called on unmergeable kinds"),
        }
        self.selection_after = next.selection_after;
        self.timestamp = next.timestamp;
    }
}

/// Opaque handle for an open compound group. Records the undo-stack depth at
/// open time.
#[derive(Debug, Clone, Copy)]
pub struct CompoundToken {
    depth: usize,
}

/// Bounded undo/redo stacks with coalescing and a replay guard.
#[derive(Debug)]
pub struct EditHistory {
    undo: Vec<EditOperation>,
    redo: Vec<EditOperation>,
    max_entries: usize,
    merge_window: Duration,
    merging_enabled: bool,
    replaying: bool,
}

impl EditHistory {
    /// Create a history with the default cap and merge window.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_MERGE_WINDOW)
    }

    /// Create a history with an explicit entry cap and merge window.
    pub fn with_limits(max_entries: usize, merge_window: Duration) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_entries,
            merge_window,
            merging_enabled: true,
            replaying: false,
        }
    }

    /// Enable or disable coalescing of adjacent edits.
    pub fn set_merging_enabled(&mut self, enabled: bool) {
        self.merging_enabled = enabled;
    }

    /// Whether a replay is in progress (edits are not recorded).
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// Number of undoable entries.
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Number of redoable entries.
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Record a committed edit. Ignored while replaying. New edits invalidate
    /// the redo stack. The oldest entry is dropped past the cap.
    pub fn record(&mut self, op: EditOperation) {
        if self.replaying {
            return;
        }
        self.redo.clear();
        if self.merging_enabled {
            if let Some(top) = self.undo.last_mut() {
                if top.can_merge_with(&op, self.merge_window) {
                    top.merge_with(op);
                    return;
                }
            }
        }
        self.undo.push(op);
        if self.undo.len() > self.max_entries {
            self.undo.remove(0);
        }
    }

    /// Open a compound group; everything recorded until the matching
    /// [`end_compound`](Self::end_compound) becomes one undo unit.
    pub fn begin_compound(&self) -> CompoundToken {
        CompoundToken {
            depth: self.undo.len(),
        }
    }

    /// Close a compound group. A group with no recorded operations is a
    /// no-op; a group of one keeps the operation as-is.
    pub fn end_compound(&mut self, token: CompoundToken) {
        if token.depth >= self.undo.len() {
            return;
        }
        let ops = self.undo.split_off(token.depth);
        if ops.len() == 1 {
            self.undo.extend(ops);
            return;
        }
        let selection_before = ops[0].selection_before;
        let last = &ops[ops.len() - 1];
        let selection_after = last.selection_after;
        let timestamp = last.timestamp;
        self.undo.push(EditOperation {
            kind: EditKind::Compound(ops),
            selection_before,
            selection_after,
            timestamp,
        });
    }

    /// Update the most recent entry's post-edit selection. Used when the
    /// engine re-derives the selection after a grouped edit so that redo
    /// restores what the user actually saw.
    pub fn amend_selection_after(&mut self, selection: Selection) {
        if self.replaying {
            return;
        }
        if let Some(top) = self.undo.last_mut() {
            top.selection_after = selection;
        }
    }

    /// Pop the most recent undoable edit and enter the replaying state. The
    /// caller applies the inverse and then calls
    /// [`finish_undo`](Self::finish_undo).
    pub fn start_undo(&mut self) -> Option<EditOperation> {
        let op = self.undo.pop()?;
        self.replaying = true;
        Some(op)
    }

    /// Move an undone operation to the redo stack and leave the replaying
    /// state.
    pub fn finish_undo(&mut self, op: EditOperation) {
        self.redo.push(op);
        self.replaying = false;
    }

    /// Pop the most recent redoable edit and enter the replaying state. The
    /// caller re-applies it and then calls [`finish_redo`](Self::finish_redo).
    pub fn start_redo(&mut self) -> Option<EditOperation> {
        let op = self.redo.pop()?;
        self.replaying = true;
        Some(op)
    }

    /// Move a redone operation back to the undo stack and leave the replaying
    /// state.
    pub fn finish_redo(&mut self, op: EditOperation) {
        self.undo.push(op);
        self.replaying = false;
    }

    /// Abandon an in-progress replay without moving the operation.
    pub fn abort_replay(&mut self) {
        self.replaying = false;
    }

    /// Drop all recorded history.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(offset: usize, text: &str) -> EditOperation {
        EditOperation::new(
            EditKind::Insert {
                offset,
                text: text.to_string(),
            },
            Selection::collapsed(offset),
            Selection::collapsed(offset + text.chars().count()),
        )
    }

    fn delete(offset: usize, text: &str) -> EditOperation {
        EditOperation::new(
            EditKind::Delete {
                offset,
                text: text.to_string(),
            },
            Selection::collapsed(offset + text.chars().count()),
            Selection::collapsed(offset),
        )
    }

    #[test]
    fn test_adjacent_inserts_coalesce() {
        let mut history = EditHistory::new();
        history.record(insert(0, "h"));
        history.record(insert(1, "e"));
        history.record(insert(2, "y"));
        assert_eq!(history.undo_depth(), 1);
        let op = history.start_undo().unwrap();
        assert_eq!(
            op.kind,
            EditKind::Insert {
                offset: 0,
                text: "hey".to_string()
            }
        );
    }

    #[test]
    fn test_newline_breaks_insert_merge() {
        let mut history = EditHistory::new();
        history.record(insert(0, "a"));
        history.record(insert(1, "\n"));
        history.record(insert(2, "b"));
        assert_eq!(history.undo_depth(), 3);
    }

    #[test]
    fn test_non_adjacent_inserts_do_not_merge() {
        let mut history = EditHistory::new();
        history.record(insert(0, "a"));
        history.record(insert(5, "b"));
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn test_whitespace_join_refused() {
        let mut history = EditHistory::new();
        history.record(insert(0, "word"));
        history.record(insert(4, " "));
        assert_eq!(history.undo_depth(), 2);
        history.record(insert(5, " "));
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn test_stale_inserts_do_not_merge() {
        let mut history = EditHistory::new();
        let mut old = insert(0, "a");
        old.timestamp = Instant::now() - Duration::from_secs(30);
        history.record(old);
        history.record(insert(1, "b"));
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn test_backspace_chain_merges_leftward() {
        let mut history = EditHistory::new();
        history.record(delete(4, "d"));
        history.record(delete(3, "c"));
        history.record(delete(2, "b"));
        assert_eq!(history.undo_depth(), 1);
        let op = history.start_undo().unwrap();
        assert_eq!(
            op.kind,
            EditKind::Delete {
                offset: 2,
                text: "bcd".to_string()
            }
        );
    }

    #[test]
    fn test_forward_delete_chain_merges_rightward() {
        let mut history = EditHistory::new();
        history.record(delete(2, "a"));
        history.record(delete(2, "b"));
        assert_eq!(history.undo_depth(), 1);
        let op = history.start_undo().unwrap();
        assert_eq!(
            op.kind,
            EditKind::Delete {
                offset: 2,
                text: "ab".to_string()
            }
        );
    }

    #[test]
    fn test_cap_drops_oldest() {
        let mut history = EditHistory::with_limits(2, Duration::ZERO);
        history.set_merging_enabled(false);
        history.record(insert(0, "a"));
        history.record(insert(1, "b"));
        history.record(insert(2, "c"));
        assert_eq!(history.undo_depth(), 2);
        let top = history.start_undo().unwrap();
        assert!(matches!(top.kind, EditKind::Insert { offset: 2, .. }));
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut history = EditHistory::new();
        history.record(insert(0, "a"));
        let op = history.start_undo().unwrap();
        history.finish_undo(op);
        assert_eq!(history.redo_depth(), 1);
        history.record(insert(0, "b"));
        assert_eq!(history.redo_depth(), 0);
    }

    #[test]
    fn test_recording_is_suppressed_while_replaying() {
        let mut history = EditHistory::new();
        history.record(insert(0, "a"));
        let op = history.start_undo().unwrap();
        history.record(insert(0, "ghost"));
        history.finish_undo(op);
        assert_eq!(history.undo_depth(), 0);
        assert_eq!(history.redo_depth(), 1);
    }

    #[test]
    fn test_compound_grouping() {
        let mut history = EditHistory::new();
        history.set_merging_enabled(false);
        let token = history.begin_compound();
        history.record(insert(0, "a"));
        history.record(insert(1, "b"));
        history.end_compound(token);
        assert_eq!(history.undo_depth(), 1);
        let op = history.start_undo().unwrap();
        match &op.kind {
            EditKind::Compound(ops) => assert_eq!(ops.len(), 2),
            other => panic!("expected compound, got {other:?}"),
        }
        assert_eq!(op.selection_before, Selection::collapsed(0));
        assert_eq!(op.selection_after, Selection::collapsed(2));
    }

    #[test]
    fn test_empty_compound_is_noop() {
        let mut history = EditHistory::new();
        history.record(insert(0, "a"));
        let token = history.begin_compound();
        history.end_compound(token);
        assert_eq!(history.undo_depth(), 1);
        assert!(!matches!(
            history.start_undo().unwrap().kind,
            EditKind::Compound(_)
        ));
    }

    #[test]
    fn test_inverse_round_trip() {
        let op = EditOperation::new(
            EditKind::Replace {
                offset: 3,
                deleted: "old".to_string(),
                inserted: "new".to_string(),
            },
            Selection::collapsed(6),
            Selection::collapsed(6),
        );
        // Selections swap twice and the timestamp carries through, so the
        // whole operation compares equal, not just the kind.
        assert_eq!(op.inverse().inverse(), op);
    }

    #[test]
    fn test_compound_inverse_reverses_members() {
        let compound = EditOperation::new(
            EditKind::Compound(vec![insert(0, "a"), insert(1, "b")]),
            Selection::collapsed(0),
            Selection::collapsed(2),
        );
        match compound.inverse().kind {
            EditKind::Compound(ops) => {
                assert_eq!(
                    ops[0].kind,
                    EditKind::Delete {
                        offset: 1,
                        text: "b".to_string()
                    }
                );
                assert_eq!(
                    ops[1].kind,
                    EditKind::Delete {
                        offset: 0,
                        text: "a".to_string()
                    }
                );
            }
            other => panic!("expected compound, got {other:?}"),
        }
    }
}
