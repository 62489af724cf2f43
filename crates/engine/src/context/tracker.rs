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

use soldb_common::{opcode_from_name, OpcodeTr, Trace, TraceStep};
use tracing::{debug, trace};

use crate::context::{ContextId, ContextRegistry};

/// Assigns the executing context to every step of a trace.
///
/// The tracker keeps a stack of contexts that mirrors the VM call stack. A
/// step whose successor is deeper pushes the callee, a step whose successor is
/// shallower pops. Callees without a registered context (precompiles, code
/// without artifacts) are tracked as `None`.
#[derive(Debug, Clone, Copy)]
pub struct ContextTracker<'a> {
    registry: &'a ContextRegistry,
}

impl<'a> ContextTracker<'a> {
    /// Create a tracker resolving callees in `registry`
    pub fn new(registry: &'a ContextRegistry) -> Self {
        Self { registry }
    }

    /// The context of each step, starting from `root`
    pub fn track(&self, trace: &Trace, root: Option<ContextId>) -> Vec<Option<ContextId>> {
        let mut frames = vec![root];
        let mut contexts = Vec::with_capacity(trace.len());

        for (index, step) in trace.iter().enumerate() {
            let current = frames.last().copied().flatten();
            contexts.push(current);

            let Some(next) = trace.step(index + 1) else {
                break;
            };

            if next.depth > step.depth {
                let callee = self.resolve_callee(step);
                trace!(step = index, op = %step.op, ?callee, "entering context");
                frames.push(callee);
            } else if next.depth < step.depth {
                for _ in next.depth..step.depth {
                    frames.pop();
                }
                if frames.is_empty() {
                    // the trace left its root frame; keep reporting the root
                    frames.push(root);
                }
            }
        }

        debug!(steps = contexts.len(), "tracked contexts");
        contexts
    }

    /// Resolve the context entered by a call or create step
    pub fn resolve_callee(&self, step: &TraceStep) -> Option<ContextId> {
        let op = opcode_from_name(&step.op)?;
        if op.is_call() {
            // the executed code always belongs to the target, even for DELEGATECALL
            return self.registry.by_address(step.stack_address(1)?);
        }
        if op.is_create() {
            let offset = usize::try_from(step.stack_peek(1)?).ok()?;
            let size = usize::try_from(step.stack_peek(2)?).ok()?;
            return self.registry.by_code(step.memory_slice(offset, size)?);
        }
        None
    }
}
