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

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A single low-level execution step as reported by the virtual machine.
///
/// Only `pc`, `op` and `depth` are required. The remaining fields are raw VM
/// state which the engine never interprets directly; the step classifier and
/// the context tracker read the operand stack and memory when they are present.
///
/// The JSON shape follows geth's `structLogs`: the stack is ordered bottom to
/// top, so the top of the stack is the *last* element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    /// Program counter (byte offset into the executing bytecode)
    pub pc: usize,
    /// Opcode mnemonic, e.g. `"JUMP"` or `"DELEGATECALL"`
    pub op: String,
    /// Raw call depth of the virtual machine
    pub depth: usize,
    /// Remaining gas before this step executes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    /// Operand stack, bottom first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<U256>,
    /// Memory contents before this step executes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Bytes>,
}

impl TraceStep {
    /// Create a step with an empty stack and no memory
    pub fn new(pc: usize, op: impl Into<String>, depth: usize) -> Self {
        Self { pc, op: op.into(), depth, gas: None, stack: Vec::new(), memory: None }
    }

    /// Attach an operand stack (bottom first)
    pub fn with_stack(mut self, stack: Vec<U256>) -> Self {
        self.stack = stack;
        self
    }

    /// Attach a memory image
    pub fn with_memory(mut self, memory: Bytes) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Peek the stack, where `0` is the top of the stack
    pub fn stack_peek(&self, n: usize) -> Option<U256> {
        let len = self.stack.len();
        if n >= len {
            return None;
        }
        self.stack.get(len - 1 - n).copied()
    }

    /// Interpret the stack item `n` positions below the top as an address
    pub fn stack_address(&self, n: usize) -> Option<Address> {
        self.stack_peek(n).map(|word| Address::from_word(word.into()))
    }

    /// Read `size` bytes of memory starting at `offset`.
    ///
    /// Returns `None` if no memory was recorded or the slice is out of bounds.
    pub fn memory_slice(&self, offset: usize, size: usize) -> Option<&[u8]> {
        let memory = self.memory.as_ref()?;
        let end = offset.checked_add(size)?;
        memory.get(offset..end)
    }
}

/// An ordered, immutable sequence of trace steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    inner: Vec<TraceStep>,
}

impl Deref for Trace {
    type Target = Vec<TraceStep>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<Vec<TraceStep>> for Trace {
    fn from(inner: Vec<TraceStep>) -> Self {
        Self { inner }
    }
}

impl FromIterator<TraceStep> for Trace {
    fn from_iter<I: IntoIterator<Item = TraceStep>>(iter: I) -> Self {
        Self { inner: iter.into_iter().collect() }
    }
}

impl Trace {
    /// Create a new empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a trace from a JSON array of steps
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get the step at `index`
    pub fn step(&self, index: usize) -> Option<&TraceStep> {
        self.inner.get(index)
    }
}

// IntoIterator for owned Trace (moves out its contents)
impl IntoIterator for Trace {
    type Item = TraceStep;
    type IntoIter = std::vec::IntoIter<TraceStep>;
    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

// IntoIterator for &Trace (shared iteration)
impl<'a> IntoIterator for &'a Trace {
    type Item = &'a TraceStep;
    type IntoIter = std::slice::Iter<'a, TraceStep>;
    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
