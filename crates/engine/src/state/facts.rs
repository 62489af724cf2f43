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

use serde::Serialize;
use serde_json::Value;
use soldb_common::StepFlags;

use crate::{
    analysis::{AstPointer, Instruction},
    context::ContextId,
    state::{SourceRangeFact, StepSelector, StepView},
};

/// Facts of one step-selected subtree, detached from the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFacts {
    /// Index of the step in the trace
    pub step: usize,
    /// Instruction at the step's pc
    pub instruction: Option<Instruction>,
    /// Index of the source file
    pub file: Option<i32>,
    /// Source range, defaulted when unmapped
    pub source_range: SourceRangeFact,
    /// Pointer to the located AST node
    pub pointer: AstPointer,
    /// The located AST node
    pub node: Option<Value>,
}

impl StepFacts {
    pub(crate) fn collect<S: StepSelector>(view: &StepView<'_, S>) -> Self {
        Self {
            step: view.step_index(),
            instruction: view.instruction().map(|instruction| (*instruction).clone()),
            file: view.source().map(|source| source.id),
            source_range: view.source_range(),
            pointer: view.pointer(),
            node: view.node().and_then(|node| node.value().cloned()),
        }
    }
}

/// Everything derived at one cursor position.
///
/// A snapshot is a plain value: moving the cursor afterwards does not change it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedFacts {
    /// Cursor the snapshot was taken at
    pub cursor: usize,
    /// Context executing the current step
    pub context: Option<ContextId>,
    /// Facts of the current step
    pub current: StepFacts,
    /// Facts of the next step, absent when the current step changes context
    pub next: Option<StepFacts>,
    /// Source-level function depth
    pub function_depth: usize,
    /// Classification of the current step
    pub flags: StepFlags,
    /// Whether advancing leaves the current source range
    pub is_source_range_final: bool,
    /// Whether the current source range spans several lines
    pub is_multiline: bool,
    /// Jump annotation of the current instruction
    pub jump_direction: String,
    /// Whether the current node is a direct contract or library call
    pub is_contract_call: bool,
    /// Whether the function-depth workaround applies to the call context
    pub needs_function_depth_workaround: bool,
    /// Next mapped step, absent at trace end or across a context change
    pub next_mapped: Option<usize>,
}
