//! Single-line edit buffering.
//!
//! Rapid single-character edits on one line are absorbed by a
//! [`LineEditBuffer`] in front of the rope, so the expensive bulk structure is
//! only touched once per burst. The overlay is written back as a single
//! delete+insert when it is flushed.
//!
//! This is a cache-coherency problem: at most one line may be overlaid at a
//! time, and every read path must account for the overlay's pending length
//! delta. The state is kept as an explicit machine
//! ([`OverlayState::Inactive`] / [`OverlayState::Active`]) checked centrally
//! by the engine, rather than as scattered conditionals.

use crate::rope_buffer::RopeBuffer;
use std::time::{Duration, Instant};

/// A single rope line held outside the rope for cheap repeated edits.
#[derive(Debug, Clone)]
pub struct LineEditBuffer {
    /// Which rope line is overlaid.
    pub line_index: usize,
    /// Current overlay content (no trailing newline).
    pub line_text: String,
    /// Offset of the line's start in the rope, as of overlay creation.
    pub rope_start_offset: usize,
    /// Character length of the line in the rope, as of overlay creation.
    pub original_len: usize,
    /// Whether the overlay diverges from the rope.
    dirty: bool,
    /// Deadline for the debounce flush.
    flush_due: Instant,
}

/// The result of flushing an overlay: the rope range to replace and the text
/// to replace it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedLine {
    /// Overlaid line index.
    pub line_index: usize,
    /// Start offset of the replaced range in the rope.
    pub rope_start_offset: usize,
    /// Character length of the replaced range.
    pub original_len: usize,
    /// Replacement line text.
    pub line_text: String,
}

impl LineEditBuffer {
    fn new(rope: &RopeBuffer, line_index: usize, flush_delay: Duration) -> Self {
        let line_text = rope.line_text(line_index);
        Self {
            line_index,
            rope_start_offset: rope.line_start_offset(line_index),
            original_len: line_text.chars().count(),
            line_text,
            dirty: false,
            flush_due: Instant::now() + flush_delay,
        }
    }

    /// Character length of the overlay content.
    pub fn len(&self) -> usize {
        self.line_text.chars().count()
    }

    /// Pending length delta relative to the rope's copy of the line.
    pub fn pending_delta(&self) -> isize {
        self.len() as isize - self.original_len as isize
    }

    /// Whether the overlay has unflushed edits.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Insert `text` (no newlines) at character `column`, clamped to the line.
    pub fn insert(&mut self, column: usize, text: &str, flush_delay: Duration) {
        debug_assert!(!text.contains('\n'));
        let byte = char_to_byte(&self.line_text, column.min(self.len()));
        self.line_text.insert_str(byte, text);
        self.dirty = true;
        self.flush_due = Instant::now() + flush_delay;
    }

    /// Delete characters `[start, end)` within the line, clamped.
    pub fn delete(&mut self, start: usize, end: usize, flush_delay: Duration) -> String {
        let len = self.len();
        let start = start.min(len);
        let end = end.min(len);
        if start >= end {
            return String::new();
        }
        let byte_start = char_to_byte(&self.line_text, start);
        let byte_end = char_to_byte(&self.line_text, end);
        let removed = self.line_text[byte_start..byte_end].to_string();
        self.line_text.replace_range(byte_start..byte_end, "");
        self.dirty = true;
        self.flush_due = Instant::now() + flush_delay;
        removed
    }

    /// Returns `true` once the debounce deadline has elapsed.
    pub fn flush_elapsed(&self, now: Instant) -> bool {
        now >= self.flush_due
    }
}

/// Overlay state for the document's dual representation.
#[derive(Debug, Clone, Default)]
pub enum OverlayState {
    /// No line is overlaid; the rope is ground truth everywhere.
    #[default]
    Inactive,
    /// One line is overlaid; reads must substitute it and shift offsets past it.
    Active(LineEditBuffer),
}

impl OverlayState {
    /// Get or create the overlay for `line_index`.
    ///
    /// Returns `None` when a different line is already overlaid; the caller
    /// must flush first.
    pub fn activate(
        &mut self,
        rope: &RopeBuffer,
        line_index: usize,
        flush_delay: Duration,
    ) -> Option<&mut LineEditBuffer> {
        match self {
            OverlayState::Active(buffer) if buffer.line_index != line_index => None,
            OverlayState::Inactive => {
                *self = OverlayState::Active(LineEditBuffer::new(rope, line_index, flush_delay));
                match self {
                    OverlayState::Active(buffer) => Some(buffer),
                    OverlayState::Inactive => unreachable!(),
                }
            }
            OverlayState::Active(buffer) => Some(buffer),
        }
    }

    /// The active overlay, if any.
    pub fn active(&self) -> Option<&LineEditBuffer> {
        match self {
            OverlayState::Inactive => None,
            OverlayState::Active(buffer) => Some(buffer),
        }
    }

    /// The active overlay, mutably.
    pub fn active_mut(&mut self) -> Option<&mut LineEditBuffer> {
        match self {
            OverlayState::Inactive => None,
            OverlayState::Active(buffer) => Some(buffer),
        }
    }

    /// Pending length delta of the active overlay (zero when inactive/clean).
    pub fn pending_delta(&self) -> isize {
        match self {
            OverlayState::Active(buffer) if buffer.dirty => buffer.pending_delta(),
            _ => 0,
        }
    }

    /// Deactivate, returning the write-back data when the overlay was dirty.
    ///
    /// A clean overlay is simply discarded.
    pub fn take_for_flush(&mut self) -> Option<FlushedLine> {
        match std::mem::take(self) {
            OverlayState::Inactive => None,
            OverlayState::Active(buffer) => {
                if buffer.dirty {
                    Some(FlushedLine {
                        line_index: buffer.line_index,
                        rope_start_offset: buffer.rope_start_offset,
                        original_len: buffer.original_len,
                        line_text: buffer.line_text,
                    })
                } else {
                    None
                }
            }
        }
    }
}

fn char_to_byte(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(500);

    #[test]
    fn test_overlay_absorbs_edits_without_touching_rope() {
        let rope = RopeBuffer::from_text("alpha\nbeta\ngamma");
        let mut state = OverlayState::Inactive;

        let buffer = state.activate(&rope, 1, DELAY).unwrap();
        buffer.insert(4, "!", DELAY);
        buffer.insert(5, "!", DELAY);

        assert_eq!(rope.line_text(1), "beta");
        assert_eq!(state.active().unwrap().line_text, "beta!!");
        assert_eq!(state.pending_delta(), 2);
    }

    #[test]
    fn test_activate_refuses_second_line() {
        let rope = RopeBuffer::from_text("a\nb");
        let mut state = OverlayState::Inactive;
        state.activate(&rope, 0, DELAY).unwrap().insert(1, "x", DELAY);
        assert!(state.activate(&rope, 1, DELAY).is_none());
    }

    #[test]
    fn test_flush_returns_write_back_range() {
        let rope = RopeBuffer::from_text("ab\ncd");
        let mut state = OverlayState::Inactive;
        state.activate(&rope, 1, DELAY).unwrap().delete(0, 1, DELAY);

        let flushed = state.take_for_flush().unwrap();
        assert_eq!(flushed.line_index, 1);
        assert_eq!(flushed.rope_start_offset, 3);
        assert_eq!(flushed.original_len, 2);
        assert_eq!(flushed.line_text, "d");
        assert!(state.active().is_none());
    }

    #[test]
    fn test_clean_overlay_flushes_to_nothing() {
        let rope = RopeBuffer::from_text("ab");
        let mut state = OverlayState::Inactive;
        state.activate(&rope, 0, DELAY).unwrap();
        assert!(state.take_for_flush().is_none());
        assert_eq!(state.pending_delta(), 0);
    }

    #[test]
    fn test_delete_returns_removed_text() {
        let rope = RopeBuffer::from_text("hello");
        let mut state = OverlayState::Inactive;
        let buffer = state.activate(&rope, 0, DELAY).unwrap();
        assert_eq!(buffer.delete(1, 3, DELAY), "el");
        assert_eq!(buffer.line_text, "hlo");
        assert_eq!(buffer.pending_delta(), -2);
    }
}
