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

//! EVM bytecode disassembly utilities
//!
//! Walks the bytecode one instruction at a time. `PUSH1` through `PUSH32`
//! consume their immediate bytes; every other byte, defined opcode or not, is a
//! one-byte instruction. The instruction *index* produced here is the index the
//! compiler's source map is keyed by.

use revm::bytecode::opcode::OpCode;
use tracing::debug;

use crate::utils::DecodeError;

const PUSH1: u8 = 0x60;
const PUSH32: u8 = 0x7f;

/// A single disassembled instruction with its associated data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassemblyInstruction {
    /// Program counter offset where this instruction starts
    pub pc: usize,
    /// The raw opcode byte
    pub opcode: u8,
    /// For PUSHX instructions, this contains the immediate value bytes
    /// For other instructions, this is empty
    pub push_data: Vec<u8>,
}

impl DisassemblyInstruction {
    /// Create a new instruction without push data
    pub fn new(pc: usize, opcode: u8) -> Self {
        Self { pc, opcode, push_data: Vec::new() }
    }

    /// Create a new instruction with push data
    pub fn with_push_data(pc: usize, opcode: u8, push_data: Vec<u8>) -> Self {
        Self { pc, opcode, push_data }
    }

    /// Check if this instruction is a PUSH instruction
    pub fn is_push(&self) -> bool {
        (PUSH1..=PUSH32).contains(&self.opcode)
    }

    /// The mnemonic of the opcode, or `None` for an undefined byte
    pub fn mnemonic(&self) -> Option<&'static str> {
        OpCode::new(self.opcode).map(|op| op.as_str())
    }

    /// Get the total instruction size (opcode + immediate data)
    pub fn instruction_size(&self) -> usize {
        1 + immediate_size(self.opcode)
    }
}

/// Number of immediate bytes an opcode declares
pub fn immediate_size(opcode: u8) -> usize {
    if (PUSH1..=PUSH32).contains(&opcode) {
        (opcode - PUSH1 + 1) as usize
    } else {
        0
    }
}

/// Disassemble EVM bytecode.
///
/// Fails with [`DecodeError::TruncatedOperand`] if a push immediate would read
/// past the end of the bytecode; the result is never silently truncated.
pub fn disassemble(bytecode: &[u8]) -> Result<Vec<DisassemblyInstruction>, DecodeError> {
    let mut instructions = Vec::new();
    let mut pc = 0;

    while pc < bytecode.len() {
        let opcode = bytecode[pc];
        let push_size = immediate_size(opcode);

        if push_size == 0 {
            instructions.push(DisassemblyInstruction::new(pc, opcode));
            pc += 1;
            continue;
        }

        let data_start = pc + 1;
        let data_end = data_start + push_size;
        let Some(push_data) = bytecode.get(data_start..data_end) else {
            return Err(DecodeError::TruncatedOperand {
                pc,
                opcode,
                needed: push_size,
                available: bytecode.len() - data_start,
            });
        };

        instructions.push(DisassemblyInstruction::with_push_data(pc, opcode, push_data.to_vec()));
        pc = data_end;
    }

    debug!(bytes = bytecode.len(), instructions = instructions.len(), "disassembled bytecode");
    Ok(instructions)
}
