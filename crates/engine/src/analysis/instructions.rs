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

//! Instruction table construction.
//!
//! Decoded instructions and decompressed source ranges are merged by
//! instruction *index*. The source map is never indexed by program counter.

use std::sync::Arc;

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    analysis::{decompress, synthesize, JumpKind, LineColumnSpan, SourceRange},
    utils::{disasm::disassemble, CompilationUnit, EngineError, EngineResult},
};

/// A decoded instruction enriched with its source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    /// Program counter of the opcode byte
    pub pc: usize,
    /// Raw opcode byte
    pub opcode: u8,
    /// Mnemonic; undefined bytes are named `UNKNOWN_0x..`
    pub name: String,
    /// Position of this instruction in the decoded sequence
    pub index: usize,
    /// Immediate bytes of a push, empty otherwise
    #[serde(default, skip_serializing_if = "<[u8]>::is_empty")]
    pub push_data: Bytes,
    /// Source range from the source map
    pub range: SourceRange,
    /// Line/column span of `range`
    pub lines: LineColumnSpan,
}

impl Instruction {
    /// Whether this instruction jumps into a function
    pub fn jumps_into(&self) -> bool {
        self.range.jump == JumpKind::Into
    }

    /// Whether this instruction returns out of a function
    pub fn jumps_out(&self) -> bool {
        self.range.jump == JumpKind::Out
    }
}

/// All instructions of one context, in bytecode order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionTable {
    context: String,
    instructions: Vec<Arc<Instruction>>,
    ranges: Vec<SourceRange>,
}

impl InstructionTable {
    /// Decode the unit's bytecode and attach source locations.
    ///
    /// Without a usable source map every instruction gets a synthesized one
    /// byte range. Indices past the end of a short source map fall back to an
    /// empty range in the unit's primary file.
    pub fn build(unit: &CompilationUnit) -> EngineResult<Self> {
        let decoded = disassemble(&unit.bytecode)
            .map_err(|source| EngineError::Decode { context: unit.name.clone(), source })?;
        let ranges = source_ranges(unit, decoded.len());

        let primary_file = ranges.first().map_or(-1, |range| range.file);
        if ranges.len() < decoded.len() {
            debug!(
                context = %unit.name,
                instructions = decoded.len(),
                entries = ranges.len(),
                "source map shorter than bytecode"
            );
        }

        let instructions = decoded
            .into_iter()
            .enumerate()
            .map(|(index, decoded)| {
                let range = ranges.get(index).copied().unwrap_or(SourceRange {
                    file: primary_file,
                    ..SourceRange::default()
                });
                let lines = unit.source(range.file).map_or_else(LineColumnSpan::unknown, |file| {
                    file.line_index().span(range.start, range.length)
                });

                Arc::new(Instruction {
                    pc: decoded.pc,
                    opcode: decoded.opcode,
                    name: decoded
                        .mnemonic()
                        .map_or_else(|| format!("UNKNOWN_0x{:02x}", decoded.opcode), str::to_string),
                    index,
                    push_data: decoded.push_data.into(),
                    range,
                    lines,
                })
            })
            .collect::<Vec<_>>();

        debug!(context = %unit.name, instructions = instructions.len(), "built instruction table");
        Ok(Self { context: unit.name.clone(), instructions, ranges })
    }

    /// Assemble a table from already enriched instructions
    pub fn from_instructions(context: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        let ranges = instructions.iter().map(|instruction| instruction.range).collect();
        Self {
            context: context.into(),
            instructions: instructions.into_iter().map(Arc::new).collect(),
            ranges,
        }
    }

    /// Name of the context the table was built for
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Decompressed (or synthesized) source map the table was built from
    pub fn source_map(&self) -> &[SourceRange] {
        &self.ranges
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the bytecode was empty
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction at `index`
    pub fn get(&self, index: usize) -> Option<&Arc<Instruction>> {
        self.instructions.get(index)
    }

    /// Iterate over all instructions
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Instruction>> {
        self.instructions.iter()
    }
}

fn source_ranges(unit: &CompilationUnit, instruction_count: usize) -> Vec<SourceRange> {
    let Some(source_map) = unit.source_map.as_deref().filter(|map| !map.is_empty()) else {
        debug!(context = %unit.name, "no source map, synthesizing one");
        return synthesize(instruction_count);
    };

    match decompress(source_map) {
        Ok(ranges) => ranges,
        Err(err) => {
            warn!(context = %unit.name, error = %err, "unparseable source map, synthesizing one");
            synthesize(instruction_count)
        }
    }
}
