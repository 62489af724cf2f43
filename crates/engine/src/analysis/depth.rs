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

//! Source-level function depth.
//!
//! Function depth counts nested source-level calls. Internal calls are only
//! visible through the jump annotations of the source map; external calls are
//! visible through the VM call depth. Both are folded over the trace once.

use soldb_common::StepFlags;
use tracing::trace;

use crate::analysis::JumpKind;

/// What the depth fold needs to know about one trace step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthEvent {
    /// Raw VM call depth
    pub vm_depth: usize,
    /// Classification of the step
    pub flags: StepFlags,
    /// Jump annotation of the instruction at the step's pc
    pub jump: JumpKind,
    /// Depth added back when the call made by this step returns
    pub correction: usize,
}

/// Folds [`DepthEvent`]s into one function depth per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDepthTracker {
    initial: usize,
}

impl Default for FunctionDepthTracker {
    fn default() -> Self {
        Self { initial: 1 }
    }
}

impl FunctionDepthTracker {
    /// Create a tracker starting at `initial`
    pub fn new(initial: usize) -> Self {
        Self { initial }
    }

    /// Compute the depth each step executes at.
    ///
    /// A call or create that enters a new frame remembers the caller's depth
    /// (plus the step's correction) and the callee continues one level deeper.
    /// When the VM depth drops, whether by a halting opcode or an exceptional
    /// exit, the remembered depth of every left frame is restored.
    pub fn track(&self, events: &[DepthEvent]) -> Vec<usize> {
        let mut depths = Vec::with_capacity(events.len());
        let mut saved: Vec<usize> = Vec::new();
        let mut depth = self.initial;

        for (index, event) in events.iter().enumerate() {
            depths.push(depth);

            let next_vm_depth = events.get(index + 1).map(|next| next.vm_depth);
            let enters_frame = next_vm_depth.is_some_and(|next| next > event.vm_depth);
            let leaves_frames =
                next_vm_depth.map_or(0, |next| event.vm_depth.saturating_sub(next));

            if event.flags.is_jump {
                depth = match event.jump {
                    JumpKind::Into => depth + 1,
                    JumpKind::Out => depth.saturating_sub(1),
                    JumpKind::Regular | JumpKind::None => depth,
                };
            } else if (event.flags.is_call || event.flags.is_create)
                && !event.flags.calls_precompile
                && enters_frame
            {
                saved.push(depth + event.correction);
                depth += 1;
            } else if leaves_frames > 0 {
                for _ in 0..leaves_frames {
                    if let Some(restored) = saved.pop() {
                        depth = restored;
                    }
                }
            }

            trace!(step = index, depth, frames = saved.len(), "function depth");
        }

        depths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(vm_depth: usize) -> DepthEvent {
        DepthEvent { vm_depth, ..Default::default() }
    }

    fn jump(vm_depth: usize, kind: JumpKind) -> DepthEvent {
        DepthEvent {
            vm_depth,
            flags: StepFlags { is_jump: true, ..Default::default() },
            jump: kind,
            correction: 0,
        }
    }

    fn call(vm_depth: usize, correction: usize) -> DepthEvent {
        DepthEvent {
            vm_depth,
            flags: StepFlags { is_call: true, ..Default::default() },
            jump: JumpKind::None,
            correction,
        }
    }

    fn halt(vm_depth: usize) -> DepthEvent {
        let flags = StepFlags { is_halting: true, ..Default::default() };
        DepthEvent { vm_depth, flags, ..Default::default() }
    }

    #[test]
    fn test_internal_jumps() {
        let events = [
            jump(1, JumpKind::Into),
            jump(1, JumpKind::Regular),
            jump(1, JumpKind::Into),
            jump(1, JumpKind::Out),
            jump(1, JumpKind::Out),
            jump(1, JumpKind::Out),
            step(1),
        ];
        let depths = FunctionDepthTracker::default().track(&events);
        assert_eq!(depths, vec![1, 2, 2, 3, 2, 1, 0]);
    }

    #[test]
    fn test_external_call_restores_caller_depth() {
        let events = [
            jump(1, JumpKind::Into),
            call(1, 0),
            jump(2, JumpKind::Into),
            halt(2),
            step(1),
        ];
        let depths = FunctionDepthTracker::default().track(&events);
        assert_eq!(depths, vec![1, 2, 3, 4, 2]);
    }

    #[test]
    fn test_correction_is_added_on_return() {
        let events = [call(1, 1), halt(2), jump(1, JumpKind::Out), step(1)];
        let depths = FunctionDepthTracker::default().track(&events);
        // the spurious `o` after the call lands back on the caller depth
        assert_eq!(depths, vec![1, 2, 2, 1]);
    }

    #[test]
    fn test_precompile_and_empty_calls_keep_depth() {
        let precompile = DepthEvent {
            vm_depth: 1,
            flags: StepFlags { is_call: true, calls_precompile: true, ..Default::default() },
            ..Default::default()
        };
        let events = [precompile, call(1, 0), step(1)];
        let depths = FunctionDepthTracker::new(3).track(&events);
        assert_eq!(depths, vec![3, 3, 3]);
    }

    #[test]
    fn test_exceptional_exit_unwinds_frames() {
        let events = [call(1, 0), call(2, 0), step(3), step(1)];
        let depths = FunctionDepthTracker::default().track(&events);
        assert_eq!(depths, vec![1, 2, 3, 1]);
    }
}
