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

use std::sync::Arc;

use tracing::debug;

use crate::{
    analysis::{Instruction, InstructionTable},
    utils::{EngineError, EngineResult},
};

/// Total map from program counter to instruction over `[0, max_pc]`.
///
/// Every counter between two instruction starts (push immediates, or counters
/// reported by a VM running code without debug information) resolves to the
/// closest instruction at a lower counter.
#[derive(Debug, Clone)]
pub struct ProgramCounterMap {
    slots: Vec<usize>,
    table: Arc<InstructionTable>,
}

impl ProgramCounterMap {
    /// Build the forward-filled map for a table.
    ///
    /// Fails if the table is non-empty and its first instruction is not at pc 0.
    pub fn build(table: Arc<InstructionTable>) -> EngineResult<Self> {
        let Some(first) = table.get(0) else {
            return Ok(Self { slots: Vec::new(), table });
        };
        if first.pc != 0 {
            return Err(EngineError::MalformedInstructionTable {
                context: table.context().to_string(),
                first_pc: first.pc,
            });
        }

        let mut slots = Vec::new();
        for (index, instruction) in table.iter().enumerate() {
            let until = table.get(index + 1).map_or(instruction.pc + 1, |next| next.pc);
            slots.resize(slots.len().max(until), index);
        }

        debug!(context = table.context(), slots = slots.len(), "built program counter map");
        Ok(Self { slots, table })
    }

    /// Largest program counter covered, `None` for empty bytecode
    pub fn max_pc(&self) -> Option<usize> {
        self.slots.len().checked_sub(1)
    }

    /// Number of covered program counters
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no program counter is covered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the instruction covering `pc`
    pub fn index_of(&self, pc: usize) -> Option<usize> {
        self.slots.get(pc).copied()
    }

    /// Instruction index for every covered program counter
    pub fn indices(&self) -> &[usize] {
        &self.slots
    }

    /// Instruction covering `pc`, `None` past `max_pc`
    pub fn lookup(&self, pc: usize) -> Option<&Arc<Instruction>> {
        self.index_of(pc).and_then(|index| self.table.get(index))
    }

    /// The table this map indexes into
    pub fn table(&self) -> &Arc<InstructionTable> {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CompilationUnit;

    fn map_for(bytecode: Vec<u8>) -> ProgramCounterMap {
        let table = InstructionTable::build(&CompilationUnit::new("T", bytecode)).unwrap();
        ProgramCounterMap::build(Arc::new(table)).unwrap()
    }

    #[test]
    fn test_gaps_resolve_to_lower_instruction() {
        // PUSH2 0x0102, PUSH1 0x03, ADD
        let map = map_for(vec![0x61, 0x01, 0x02, 0x60, 0x03, 0x01]);

        assert_eq!(map.max_pc(), Some(5));
        let indices: Vec<_> = (0..=5).map(|pc| map.index_of(pc).unwrap()).collect();
        assert_eq!(indices, vec![0, 0, 0, 1, 1, 2]);
        assert_eq!(map.lookup(4).unwrap().pc, 3);
        assert!(map.lookup(6).is_none());
    }

    #[test]
    fn test_every_counter_is_covered() {
        let bytecode = vec![0x7f; 33].into_iter().chain([0x00, 0x5b, 0x56]).collect::<Vec<_>>();
        let map = map_for(bytecode);

        let max_pc = map.max_pc().unwrap();
        for pc in 0..=max_pc {
            let instruction = map.lookup(pc).unwrap();
            assert!(instruction.pc <= pc);
            let next_start = map.table().get(instruction.index + 1).map_or(usize::MAX, |n| n.pc);
            assert!(pc < next_start);
        }
    }

    #[test]
    fn test_empty_table() {
        let map = map_for(Vec::new());
        assert!(map.is_empty());
        assert_eq!(map.max_pc(), None);
        assert!(map.lookup(0).is_none());
    }

    #[test]
    fn test_unmapped_pc_zero_is_rejected() {
        let unit = CompilationUnit::new("T", vec![0x00, 0x00]);
        let built = InstructionTable::build(&unit).unwrap();
        let shifted = built
            .iter()
            .map(|instruction| Instruction { pc: instruction.pc + 4, ..(**instruction).clone() })
            .collect();

        let err = ProgramCounterMap::build(Arc::new(InstructionTable::from_instructions("T", shifted)))
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedInstructionTable { first_pc: 4, .. }));
    }
}
