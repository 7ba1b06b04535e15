//! Fold range bookkeeping.
//!
//! A fold range is a collapsible span of lines identified by its start line.
//! [`FoldRangeTracker`] holds at most one range per start line, remembers
//! nested fold state across recursive collapse/expand, and shifts ranges when
//! the line count changes underneath them.
//!
//! The shift is an approximation. Ranges arrive from an external analysis
//! source; after an edit the tracker moves them to keep folding usable until
//! the source re-confirms, and marks itself [`FoldProvenance::Adjusted`] so
//! callers can tell an adjusted set from a freshly fetched one.

use std::collections::BTreeMap;

/// A collapsible span of lines, `end_line > start_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldRange {
    /// First line of the range; the line that stays visible when folded.
    pub start_line: usize,
    /// Last line of the range, inclusive.
    pub end_line: usize,
    /// Whether the range is currently collapsed.
    pub is_folded: bool,
    /// Start lines of nested ranges that were folded when this range was
    /// folded, so expanding restores exactly that state.
    pub originally_folded_children: Vec<usize>,
}

impl FoldRange {
    /// Create an unfolded range.
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
            is_folded: false,
            originally_folded_children: Vec::new(),
        }
    }

    /// Whether `line` is hidden by this range when it is folded, i.e. strictly
    /// inside the span.
    pub fn hides(&self, line: usize) -> bool {
        line > self.start_line && line <= self.end_line
    }

    /// Whether `other` nests entirely inside this range.
    pub fn contains_range(&self, other: &FoldRange) -> bool {
        self.start_line < other.start_line && other.end_line <= self.end_line
    }
}

/// Whether the tracker's ranges come straight from the analysis source or
/// have been shifted locally since.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldProvenance {
    /// Ranges are exactly as last delivered by the analysis source.
    Fetched,
    /// At least one line-delta adjustment has run since the last fetch.
    Adjusted,
}

/// The set of known fold ranges for one document.
#[derive(Debug)]
pub struct FoldRangeTracker {
    ranges: BTreeMap<usize, FoldRange>,
    provenance: FoldProvenance,
}

impl FoldRangeTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            ranges: BTreeMap::new(),
            provenance: FoldProvenance::Fetched,
        }
    }

    /// All ranges in start-line order.
    pub fn ranges(&self) -> impl Iterator<Item = &FoldRange> {
        self.ranges.values()
    }

    /// The range starting at `start_line`, if any.
    pub fn get(&self, start_line: usize) -> Option<&FoldRange> {
        self.ranges.get(&start_line)
    }

    /// Number of known ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` when no ranges are known.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Current provenance marker.
    pub fn provenance(&self) -> FoldProvenance {
        self.provenance
    }

    /// Replace the range set with a fresh fetch from the analysis source.
    ///
    /// Folded state and child bookkeeping survive for ranges whose
    /// `(start_line, end_line)` span is present in the new set. Spans with
    /// `end_line <= start_line` are discarded.
    pub fn set_analysis_ranges(&mut self, spans: &[(usize, usize)]) {
        let old = std::mem::take(&mut self.ranges);
        for &(start, end) in spans {
            if end <= start {
                continue;
            }
            let mut range = FoldRange::new(start, end);
            if let Some(prev) = old.get(&start) {
                if prev.end_line == end {
                    range.is_folded = prev.is_folded;
                    range.originally_folded_children =
                        prev.originally_folded_children.clone();
                }
            }
            self.ranges.insert(start, range);
        }
        self.provenance = FoldProvenance::Fetched;
    }

    /// Collapse the range starting at `start_line`, recursively collapsing
    /// nested ranges and remembering which of them were already folded.
    ///
    /// Returns `false` when no range starts there.
    pub fn fold(&mut self, start_line: usize) -> bool {
        let Some(range) = self.ranges.get(&start_line).cloned() else {
            return false;
        };
        let nested: Vec<usize> = self
            .ranges
            .values()
            .filter(|r| range.contains_range(r))
            .map(|r| r.start_line)
            .collect();
        let already_folded: Vec<usize> = nested
            .iter()
            .copied()
            .filter(|key| self.ranges[key].is_folded)
            .collect();
        for key in &nested {
            if let Some(child) = self.ranges.get_mut(key) {
                child.is_folded = true;
            }
        }
        if let Some(range) = self.ranges.get_mut(&start_line) {
            range.is_folded = true;
            range.originally_folded_children = already_folded;
        }
        true
    }

    /// Expand the range starting at `start_line`, restoring nested ranges to
    /// the fold state they had when the range was collapsed.
    ///
    /// Returns `false` when no range starts there.
    pub fn unfold(&mut self, start_line: usize) -> bool {
        let Some(range) = self.ranges.get(&start_line).cloned() else {
            return false;
        };
        let nested: Vec<usize> = self
            .ranges
            .values()
            .filter(|r| range.contains_range(r))
            .map(|r| r.start_line)
            .collect();
        for key in nested {
            if let Some(child) = self.ranges.get_mut(&key) {
                child.is_folded = range.originally_folded_children.contains(&key);
            }
        }
        if let Some(range) = self.ranges.get_mut(&start_line) {
            range.is_folded = false;
            range.originally_folded_children.clear();
        }
        true
    }

    /// Toggle the fold starting at `start_line`. Returns `false` when no
    /// range starts there.
    pub fn toggle(&mut self, start_line: usize) -> bool {
        match self.ranges.get(&start_line) {
            Some(range) if range.is_folded => self.unfold(start_line),
            Some(_) => self.fold(start_line),
            None => false,
        }
    }

    /// Whether `line` is hidden by any folded range.
    pub fn is_line_hidden(&self, line: usize) -> bool {
        self.ranges
            .values()
            .any(|range| range.is_folded && range.hides(line))
    }

    /// The outermost folded range hiding `line`, if any.
    pub fn folded_range_hiding(&self, line: usize) -> Option<&FoldRange> {
        self.ranges
            .values()
            .filter(|range| range.is_folded && range.hides(line))
            .min_by_key(|range| range.start_line)
    }

    /// Remove the range starting at `start_line` and scrub any references to
    /// it from other ranges' child bookkeeping.
    pub fn remove(&mut self, start_line: usize) -> Option<FoldRange> {
        let removed = self.ranges.remove(&start_line)?;
        for range in self.ranges.values_mut() {
            range
                .originally_folded_children
                .retain(|&key| key != start_line);
        }
        Some(removed)
    }

    /// The start line of a previously-folded block whose first line is `line`:
    /// the range starting there if it is folded, otherwise a folded child of
    /// an enclosing range recorded as starting at `line`.
    pub fn folded_block_starting_at(&self, line: usize) -> Option<usize> {
        if self.ranges.get(&line).is_some_and(|r| r.is_folded) {
            return Some(line);
        }
        let is_recorded_child = self.ranges.values().any(|ancestor| {
            ancestor.hides(line) && ancestor.originally_folded_children.contains(&line)
        });
        if is_recorded_child && self.ranges.contains_key(&line) {
            Some(line)
        } else {
            None
        }
    }

    /// Shift ranges after a line-count change at `edit_line`.
    ///
    /// Ranges entirely before the edit are untouched. Ranges containing the
    /// edit keep their start and shift their end. Ranges entirely after shift
    /// both bounds. Ranges whose span becomes invalid are dropped. Folded
    /// state and child bookkeeping carry over for survivors.
    pub fn adjust_for_line_change(&mut self, edit_line: usize, line_delta: isize) {
        if line_delta == 0 {
            return;
        }
        let old = std::mem::take(&mut self.ranges);
        for (_, mut range) in old {
            if range.end_line < edit_line {
                // Entirely before the edit.
            } else if range.start_line < edit_line {
                // Contains the edit: start stays, end shifts.
                let end = range.end_line as isize + line_delta;
                if end <= range.start_line as isize {
                    continue;
                }
                range.end_line = end as usize;
            } else {
                // Entirely at/after the edit: both bounds shift.
                let start = range.start_line as isize + line_delta;
                let end = range.end_line as isize + line_delta;
                if start < 0 || end <= start {
                    continue;
                }
                range.start_line = start as usize;
                range.end_line = end as usize;
            }
            self.ranges.insert(range.start_line, range);
        }
        // Child keys shifted with their ranges only when the whole subtree
        // moved uniformly; stale keys are harmless and dropped on unfold.
        let surviving: Vec<usize> = self.ranges.keys().copied().collect();
        for range in self.ranges.values_mut() {
            if range.start_line >= edit_line {
                for key in range.originally_folded_children.iter_mut() {
                    let shifted = *key as isize + line_delta;
                    if shifted >= 0 {
                        *key = shifted as usize;
                    }
                }
            }
            range
                .originally_folded_children
                .retain(|key| surviving.contains(key));
        }
        self.provenance = FoldProvenance::Adjusted;
    }
}

impl Default for FoldRangeTracker {
    fn default() -> Self {
        Self::new()
    }
}
