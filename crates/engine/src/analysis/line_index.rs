// EDB - Ethereum Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};

/// A 0-indexed line and column; both are `None` when the offset did not resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineColumn {
    /// 0-indexed line
    pub line: Option<usize>,
    /// 0-indexed byte column
    pub column: Option<usize>,
}

impl LineColumn {
    /// A resolved position
    pub fn new(line: usize, column: usize) -> Self {
        Self { line: Some(line), column: Some(column) }
    }

    /// The position used when an offset cannot be resolved
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Line 0, column 0
    pub fn origin() -> Self {
        Self::new(0, 0)
    }
}

/// Start and end position of a source range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineColumnSpan {
    /// Position of the first byte
    pub start: LineColumn,
    /// Position just past the last byte
    pub end: LineColumn,
}

impl LineColumnSpan {
    /// A span where neither end resolved
    pub fn unknown() -> Self {
        Self { start: LineColumn::unknown(), end: LineColumn::unknown() }
    }

    /// Whether start and end lie on different lines
    pub fn is_multiline(&self) -> bool {
        self.start.line != self.end.line
    }
}

/// Offset to line/column lookup for one source file.
///
/// Built once by recording the offset of every line start; a lookup is a binary
/// search over those offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    /// Scan `text` for line breaks
    pub fn new(text: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(offset, _)| offset + 1))
            .collect();
        Self { line_starts, len: text.len() }
    }

    /// Number of lines, counting a trailing empty line after a final newline
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Resolve a byte offset. Offsets in `0..=len` resolve, larger ones do not.
    pub fn position(&self, offset: usize) -> Option<LineColumn> {
        if offset > self.len {
            return None;
        }
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        Some(LineColumn::new(line, offset - self.line_starts[line]))
    }

    /// Resolve a byte offset, falling back to an unknown position
    pub fn position_or_unknown(&self, offset: usize) -> LineColumn {
        self.position(offset).unwrap_or_default()
    }

    /// Resolve the span `[start, start + length]`
    pub fn span(&self, start: usize, length: usize) -> LineColumnSpan {
        LineColumnSpan {
            start: self.position_or_unknown(start),
            end: start
                .checked_add(length)
                .map_or_else(LineColumn::unknown, |end| self.position_or_unknown(end)),
        }
    }
}
