//! Line-number tables and source-line range selection
//!
//! A host line table is an ordered list of `(start offset, source line)`
//! entries; entry `i` covers offsets `[start_i, start_{i+1})` and the last
//! entry runs to the end of the method. One source line can own several
//! such ranges (loops, inlined finally blocks), and an experiment covers all
//! of them.

use crate::constants::MAX_OFFSET;
use crate::experiment::LocationRange;

/// One `(start offset, line)` pair from a host line table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub start: i32,
    pub line: i32,
}

impl LineEntry {
    pub const fn new(start: i32, line: i32) -> Self {
        LineEntry { start, line }
    }
}

/// A source line and every offset range compiled from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSelection {
    pub line: i32,
    pub ranges: Vec<LocationRange>,
}

/// A method's line-number table, in host order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    entries: Vec<LineEntry>,
}

impl LineTable {
    pub fn new(entries: Vec<LineEntry>) -> Self {
        Self { entries }
    }

    /// Convenience constructor from `(start, line)` tuples.
    pub fn from_pairs(pairs: &[(i32, i32)]) -> Self {
        Self::new(pairs.iter().map(|&(s, l)| LineEntry::new(s, l)).collect())
    }

    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source line owning `offset`: the last entry whose start is not past
    /// it, or the final entry when the offset lies beyond every start.
    pub fn line_at(&self, offset: i32) -> Option<i32> {
        let n = self.entries.len();
        (1..=n)
            .find(|&i| i == n || self.entries[i].start > offset)
            .map(|i| self.entries[i - 1].line)
    }

    /// Every `[start, next_start)` range belonging to `line`; the final
    /// entry's range ends one past the largest legal offset.
    pub fn ranges_for_line(&self, line: i32) -> Vec<LocationRange> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.line == line)
            .map(|(i, e)| {
                let end = self
                    .entries
                    .get(i + 1)
                    .map_or(MAX_OFFSET + 1, |next| next.start);
                LocationRange::new(e.start, end)
            })
            .collect()
    }

    /// Offset of the first entry for `line`, in table order.
    pub fn first_offset_of_line(&self, line: i32) -> Option<i32> {
        self.entries.iter().find(|e| e.line == line).map(|e| e.start)
    }

    /// Line owning `offset` together with all of that line's ranges.
    pub fn locate(&self, offset: i32) -> Option<LineSelection> {
        let line = self.line_at(offset)?;
        Some(LineSelection {
            line,
            ranges: self.ranges_for_line(line),
        })
    }
}
