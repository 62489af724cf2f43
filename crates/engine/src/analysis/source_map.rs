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

//! Compact source map decompression.
//!
//! The compiler emits one entry per *instruction index* (not per byte offset),
//! separated by `;`. Each entry is `start:length:file:jump[:modifierDepth]`,
//! and every field that is left out or left empty inherits its value from the
//! previous entry. An entirely empty entry therefore repeats its predecessor.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a control-transfer instruction relates to function scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JumpKind {
    /// Jump into a function (`i`)
    Into,
    /// Return out of a function (`o`)
    Out,
    /// Ordinary jump within a function (`-`)
    Regular,
    /// No jump annotation was ever given
    #[default]
    None,
}

impl JumpKind {
    fn parse(field: &str) -> Option<Self> {
        match field {
            "i" => Some(Self::Into),
            "o" => Some(Self::Out),
            "-" => Some(Self::Regular),
            _ => None,
        }
    }

    /// The source map spelling of this kind; empty for [`JumpKind::None`]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Into => "i",
            Self::Out => "o",
            Self::Regular => "-",
            Self::None => "",
        }
    }

    /// The direction shown to users, where an unannotated jump reads as `-`
    pub fn direction(&self) -> &'static str {
        match self {
            Self::None => "-",
            other => other.as_str(),
        }
    }
}

/// The source range an instruction was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRange {
    /// Byte offset of the range in its file
    pub start: usize,
    /// Length of the range in bytes
    pub length: usize,
    /// Source file index; `-1` for compiler-generated code
    pub file: i32,
    /// Jump annotation
    pub jump: JumpKind,
    /// Modifier depth, only emitted by newer compilers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier_depth: Option<u32>,
}

impl Default for SourceRange {
    fn default() -> Self {
        Self { start: 0, length: 0, file: -1, jump: JumpKind::None, modifier_depth: None }
    }
}

impl SourceRange {
    /// Create a range without modifier depth
    pub fn new(start: usize, length: usize, file: i32, jump: JumpKind) -> Self {
        Self { start, length, file, jump, modifier_depth: None }
    }

    /// Whether the range is associated with a real source file
    pub fn has_file(&self) -> bool {
        self.file >= 0
    }

    /// Whether the range carries usable mapping information
    pub fn is_mapped(&self) -> bool {
        self.has_file() && self.length > 0
    }

    /// Whether two ranges cover the same span of the same file
    pub fn same_span(&self, other: &Self) -> bool {
        self.start == other.start && self.length == other.length && self.file == other.file
    }

    /// Exclusive end offset
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.length, self.file)?;
        if self.jump != JumpKind::None {
            write!(f, ":{}", self.jump.as_str())?;
        }
        Ok(())
    }
}

/// A source map entry that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} `{value}` in source map entry {entry}")]
pub struct SourceMapError {
    /// Index of the entry (instruction index)
    pub entry: usize,
    /// Name of the offending field
    pub field: &'static str,
    /// The raw text of the field
    pub value: String,
}

const FIELDS: [&str; 5] = ["start", "length", "file", "jump", "modifier depth"];

/// Decompress a compact source map into one [`SourceRange`] per instruction index.
pub fn decompress(source_map: &str) -> Result<Vec<SourceRange>, SourceMapError> {
    if source_map.is_empty() {
        return Ok(Vec::new());
    }

    let mut ranges = Vec::with_capacity(source_map.len() / 4);
    let mut current = SourceRange::default();

    for (entry, text) in source_map.split(';').enumerate() {
        for (position, field) in text.split(':').enumerate() {
            if field.is_empty() {
                continue;
            }

            let invalid = || SourceMapError {
                entry,
                field: FIELDS.get(position).copied().unwrap_or("extra field"),
                value: field.to_string(),
            };

            match position {
                0 => current.start = field.parse().map_err(|_| invalid())?,
                1 => current.length = field.parse().map_err(|_| invalid())?,
                2 => current.file = field.parse().map_err(|_| invalid())?,
                3 => current.jump = JumpKind::parse(field).ok_or_else(invalid)?,
                4 => current.modifier_depth = Some(field.parse().map_err(|_| invalid())?),
                _ => return Err(invalid()),
            }
        }
        ranges.push(current);
    }

    Ok(ranges)
}

/// Compress ranges back into the compact form.
///
/// The first entry spells out every known field and later entries only the
/// fields that differ from their predecessor, so `compress(decompress(s)) == s`
/// for maps written the way the compiler writes them.
///
/// The compact form has no spelling for an absent jump or modifier depth, so
/// an entry that drops back to [`JumpKind::None`] or to no modifier depth after
/// its predecessor carried one decompresses with the predecessor's value.
pub fn compress(ranges: &[SourceRange]) -> String {
    let mut previous: Option<&SourceRange> = None;

    ranges
        .iter()
        .map(|range| {
            let mut fields: [Option<String>; 5] = Default::default();

            match previous {
                None => {
                    fields[0] = Some(range.start.to_string());
                    fields[1] = Some(range.length.to_string());
                    fields[2] = Some(range.file.to_string());
                    if range.jump != JumpKind::None {
                        fields[3] = Some(range.jump.as_str().to_string());
                    }
                    fields[4] = range.modifier_depth.map(|depth| depth.to_string());
                }
                Some(prev) => {
                    if range.start != prev.start {
                        fields[0] = Some(range.start.to_string());
                    }
                    if range.length != prev.length {
                        fields[1] = Some(range.length.to_string());
                    }
                    if range.file != prev.file {
                        fields[2] = Some(range.file.to_string());
                    }
                    if range.jump != prev.jump && range.jump != JumpKind::None {
                        fields[3] = Some(range.jump.as_str().to_string());
                    }
                    if range.modifier_depth != prev.modifier_depth {
                        fields[4] = range.modifier_depth.map(|depth| depth.to_string());
                    }
                }
            }
            previous = Some(range);

            let used = fields.iter().rposition(Option::is_some).map_or(0, |last| last + 1);
            fields[..used].iter().map(|field| field.as_deref().unwrap_or("")).join(":")
        })
        .join(";")
}

/// Synthesise a map for code without debug information.
///
/// Each instruction gets its own one-byte range outside any file, marked as
/// jumping out, so that every stepping command advances exactly one instruction.
pub fn synthesize(instruction_count: usize) -> Vec<SourceRange> {
    (0..instruction_count).map(|index| SourceRange::new(index, 1, -1, JumpKind::Out)).collect()
}
