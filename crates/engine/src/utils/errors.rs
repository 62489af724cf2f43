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

//! Error types of the derivation engine.
//!
//! Only malformed compiler output and contract violations by the caller are
//! errors. Missing debug information never is: every such case has an explicit
//! fallback so that stepping remains possible.

use thiserror::Error;

use crate::context::ContextId;

/// Malformed bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A push instruction whose immediate runs past the end of the bytecode
    #[error(
        "truncated operand for opcode 0x{opcode:02x} at pc {pc}: \
         needs {needed} bytes, only {available} available"
    )]
    TruncatedOperand {
        /// Program counter of the push instruction
        pc: usize,
        /// The push opcode byte
        opcode: u8,
        /// Number of immediate bytes the opcode declares
        needed: usize,
        /// Number of bytes left after the opcode
        available: usize,
    },
}

/// Errors surfaced by the engine to its caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The bytecode of a context could not be disassembled
    #[error("failed to decode bytecode of context `{context}`")]
    Decode {
        /// Name of the context whose bytecode is malformed
        context: String,
        /// Underlying decode failure
        #[source]
        source: DecodeError,
    },

    /// The first instruction of a non-empty table does not start at pc 0
    #[error(
        "malformed instruction table for context `{context}`: \
         program counter 0 is unmapped (first instruction at pc {first_pc})"
    )]
    MalformedInstructionTable {
        /// Name of the offending context
        context: String,
        /// Program counter of the first instruction in the table
        first_pc: usize,
    },

    /// Lookahead facts were read while the current step changes context
    #[error("cannot read lookahead facts at cursor {cursor}: the step changes context")]
    StaleContextRead {
        /// Cursor position of the offending read
        cursor: usize,
    },

    /// The cursor was moved outside the trace
    #[error("cursor {cursor} is out of range for a trace of {len} steps")]
    CursorOutOfRange {
        /// Requested cursor position
        cursor: usize,
        /// Trace length
        len: usize,
    },

    /// A context id that the registry does not know
    #[error("unknown context {0}")]
    UnknownContext(ContextId),

    /// A fact path that does not name any fact
    #[error("invalid fact path `{0}`")]
    InvalidFactPath(String),

    /// A fact could not be converted to JSON
    #[error("failed to serialize fact: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;
