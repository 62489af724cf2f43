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

use std::collections::HashMap;

use alloy_primitives::U256;
use auto_impl::auto_impl;
use lazy_static::lazy_static;
use revm::bytecode::OpCode;
use serde::{Deserialize, Serialize};

use crate::types::TraceStep;

lazy_static! {
    static ref OPCODES_BY_NAME: HashMap<&'static str, OpCode> =
        (0..=u8::MAX).filter_map(OpCode::new).map(|op| (op.as_str(), op)).collect();
}

/// Look up an opcode by its mnemonic (`"PUSH1"`, `"CALL"`, ...)
pub fn opcode_from_name(name: &str) -> Option<OpCode> {
    OPCODES_BY_NAME.get(name).copied()
}

/// Extended trait for EVM opcode analysis
///
/// Groups opcodes by the control-flow effect a source-level debugger cares
/// about. Each group is disjoint from the others.
pub trait OpcodeTr {
    /// `JUMP` or `JUMPI`
    fn is_jump(&self) -> bool;

    /// Message call into another context: `CALL`, `CALLCODE`, `DELEGATECALL`,
    /// `STATICCALL`
    ///
    /// # Example
    /// ```rust
    /// use revm::bytecode::OpCode;
    /// use soldb_common::OpcodeTr;
    ///
    /// assert!(OpCode::DELEGATECALL.is_call());
    /// assert!(!OpCode::CREATE.is_call());
    /// ```
    fn is_call(&self) -> bool;

    /// Contract creation: `CREATE` or `CREATE2`
    fn is_create(&self) -> bool;

    /// Ends the executing context: `STOP`, `RETURN`, `REVERT`, `INVALID`,
    /// `SELFDESTRUCT`
    fn is_halting(&self) -> bool;
}

impl OpcodeTr for OpCode {
    fn is_jump(&self) -> bool {
        matches!(*self, Self::JUMP | Self::JUMPI)
    }

    fn is_call(&self) -> bool {
        matches!(*self, Self::CALL | Self::CALLCODE | Self::DELEGATECALL | Self::STATICCALL)
    }

    fn is_create(&self) -> bool {
        matches!(*self, Self::CREATE | Self::CREATE2)
    }

    fn is_halting(&self) -> bool {
        matches!(
            *self,
            Self::STOP | Self::RETURN | Self::REVERT | Self::INVALID | Self::SELFDESTRUCT
        )
    }
}

/// Semantic facts about a single trace step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepFlags {
    /// The step is a jump
    pub is_jump: bool,
    /// The step is a message call
    pub is_call: bool,
    /// The step creates a contract
    pub is_create: bool,
    /// The step halts the executing context
    pub is_halting: bool,
    /// The step is a message call whose target is a precompile
    pub calls_precompile: bool,
}

/// Classifies raw trace steps into [`StepFlags`].
///
/// The engine only relies on this trait, so callers with richer VM data can
/// plug in their own classification.
#[auto_impl(&, Box, Arc)]
pub trait StepClassifier {
    /// Classify one step
    fn classify(&self, step: &TraceStep) -> StepFlags;
}

/// Default classifier working from the opcode mnemonic and the operand stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeClassifier {
    /// Largest address treated as a precompile. Address zero never is.
    pub max_precompile_address: u64,
}

impl Default for OpcodeClassifier {
    fn default() -> Self {
        Self { max_precompile_address: 0x11 }
    }
}

impl OpcodeClassifier {
    /// Create a classifier recognising precompiles in `1..=max_precompile_address`
    pub fn new(max_precompile_address: u64) -> Self {
        Self { max_precompile_address }
    }

    fn is_precompile(&self, address: U256) -> bool {
        address != U256::ZERO && address <= U256::from(self.max_precompile_address)
    }
}

impl StepClassifier for OpcodeClassifier {
    fn classify(&self, step: &TraceStep) -> StepFlags {
        let Some(op) = opcode_from_name(&step.op) else {
            return StepFlags::default();
        };

        let is_call = op.is_call();
        // for every call variant the target address sits right below the gas operand
        let calls_precompile =
            is_call && step.stack_peek(1).is_some_and(|address| self.is_precompile(address));

        StepFlags {
            is_jump: op.is_jump(),
            is_call,
            is_create: op.is_create(),
            is_halting: op.is_halting(),
            calls_precompile,
        }
    }
}
