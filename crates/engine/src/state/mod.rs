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

//! The derived state tree.
//!
//! A [`StateTree`] turns a cursor into source-level facts. It is a graph of
//! memoized leaves over the static [`Session`]: every leaf is computed on first
//! read and recomputed only when the identity of something it depends on
//! changes. The tree has three subtrees:
//!
//! - `info`: the static inputs
//! - `current`: facts at the cursor
//! - `next`: the same multistep facts at the step after the cursor
//!
//! `next` is only defined while the active context continues: reading it
//! while the current step enters or leaves a frame fails with
//! [`EngineError::StaleContextRead`].
//!
//! The tree is single threaded by construction (its leaves use interior
//! mutability), and the cursor is the only state that changes.

mod facts;
pub use facts::*;

mod leaf;
pub use leaf::*;

mod multistep;
pub use multistep::*;

mod path;
pub use path::*;

use std::{collections::BTreeMap, sync::Arc};

use soldb_common::StepFlags;
use tracing::{debug, trace};

use crate::{
    analysis::{is_contract_call, Instruction, InstructionTable, ProgramCounterMap, SourceRange},
    context::ContextId,
    session::Session,
    utils::{EngineError, EngineResult, SourceFile},
};

type FinalityKey = (Option<ArcKey<Instruction>>, Option<ArcKey<Instruction>>, bool);

/// Memoized, cursor-driven view of a [`Session`].
#[derive(Debug)]
pub struct StateTree {
    session: Arc<Session>,
    cursor: usize,
    current: MultistepFacts<Current>,
    next: MultistepFacts<Next>,
    is_source_range_final: Leaf<FinalityKey, bool>,
    is_contract_call: Leaf<Option<NodeRef>, bool>,
    next_mapped: Leaf<usize, Option<usize>>,
}

impl StateTree {
    /// Create a tree with the cursor on the first step
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            cursor: 0,
            current: MultistepFacts::default(),
            next: MultistepFacts::default(),
            is_source_range_final: Leaf::new("isSourceRangeFinal"),
            is_contract_call: Leaf::new("isContractCall"),
            next_mapped: Leaf::new("nextMapped"),
        }
    }

    /// The static inputs
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Current cursor position
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor to `cursor`
    pub fn seek(&mut self, cursor: usize) -> EngineResult<()> {
        if cursor >= self.session.len() {
            return Err(EngineError::CursorOutOfRange { cursor, len: self.session.len() });
        }
        trace!(from = self.cursor, to = cursor, "moving cursor");
        self.cursor = cursor;
        Ok(())
    }

    /// Move the cursor one step forward
    pub fn advance(&mut self) -> EngineResult<()> {
        self.seek(self.cursor + 1)
    }

    // ----- info -----

    /// Source files of every context, keyed by context
    pub fn sources(&self) -> BTreeMap<ContextId, BTreeMap<i32, &SourceFile>> {
        self.session
            .registry()
            .iter()
            .map(|context| {
                let files = context.unit.sources.iter().map(|(id, file)| (*id, file.as_ref()));
                (context.id, files.collect())
            })
            .collect()
    }

    /// Raw source maps of every context, keyed by context
    pub fn source_maps(&self) -> BTreeMap<ContextId, Option<&str>> {
        self.session
            .registry()
            .iter()
            .map(|context| (context.id, context.unit.source_map.as_deref()))
            .collect()
    }

    // ----- current -----

    /// Multistep facts at the cursor
    pub fn current(&self) -> StepView<'_, Current> {
        StepView::new(&self.session, self.cursor, &self.current)
    }

    /// Multistep facts at the step after the cursor.
    ///
    /// Fails if the current step changes context, since the lookahead is
    /// resolved in the current context.
    pub fn next(&self) -> EngineResult<StepView<'_, Next>> {
        let session = &self.session;
        if let (Some(step), Some(next)) = (session.step(self.cursor), session.step(self.cursor + 1))
        {
            if step.depth != next.depth
                || session.context_id_at(self.cursor) != session.context_id_at(self.cursor + 1)
            {
                debug!(cursor = self.cursor, "lookahead read across a context change");
                return Err(EngineError::StaleContextRead { cursor: self.cursor });
            }
        }
        Ok(self.lookahead())
    }

    fn lookahead(&self) -> StepView<'_, Next> {
        StepView::new(&self.session, self.cursor, &self.next)
    }

    /// Context executing the current step
    pub fn context(&self) -> Option<ContextId> {
        self.session.context_id_at(self.cursor)
    }

    /// Decompressed source map of the current context
    pub fn source_map(&self) -> &[SourceRange] {
        self.session.tables_at(self.cursor).instructions.source_map()
    }

    /// Instruction table of the current context
    pub fn instructions(&self) -> &Arc<InstructionTable> {
        &self.session.tables_at(self.cursor).instructions
    }

    /// Program counter map of the current context
    pub fn instruction_at_program_counter(&self) -> &Arc<ProgramCounterMap> {
        &self.session.tables_at(self.cursor).pc_map
    }

    /// Whether advancing one step leaves the current source range.
    ///
    /// True at the end of the trace, when the next step runs in another
    /// context, when the next pc has no instruction, or when the next
    /// instruction covers a different span.
    pub fn is_source_range_final(&self) -> bool {
        let current = self.current().instruction();
        let next = self.lookahead().instruction();
        let context_changes = self.next().is_err();
        let key = (ArcKey::of(current.as_ref()), ArcKey::of(next.as_ref()), context_changes);

        self.is_source_range_final.get(key, || {
            if context_changes {
                return true;
            }
            match (current, next) {
                (Some(current), Some(next)) => !current.range.same_span(&next.range),
                _ => true,
            }
        })
    }

    /// Whether the current source range spans several lines
    pub fn is_multiline(&self) -> bool {
        self.current().source_range().is_multiline()
    }

    /// Classification of the current step
    pub fn flags(&self) -> StepFlags {
        self.session.flags_at(self.cursor)
    }

    /// Whether the current step jumps
    pub fn will_jump(&self) -> bool {
        self.flags().is_jump
    }

    /// `i`, `o` or `-` for the current instruction
    pub fn jump_direction(&self) -> &'static str {
        self.current().instruction().map_or("-", |instruction| instruction.range.jump.direction())
    }

    /// Whether the current step calls
    pub fn will_call(&self) -> bool {
        self.flags().is_call
    }

    /// Whether the current step creates a contract
    pub fn will_create(&self) -> bool {
        self.flags().is_create
    }

    /// Whether the current step calls a precompile
    pub fn calls_precompile(&self) -> bool {
        self.flags().calls_precompile
    }

    /// Whether the current step halts its context
    pub fn will_return(&self) -> bool {
        self.flags().is_halting
    }

    /// Whether the current node is a direct contract or library call
    pub fn is_contract_call(&self) -> bool {
        let node = self.current().node();
        self.is_contract_call.get(node.clone(), || {
            node.as_ref().and_then(NodeRef::value).is_some_and(is_contract_call)
        })
    }

    /// Whether the function-depth workaround applies to the context entered by
    /// the current call or create. False for any other step.
    pub fn needs_function_depth_workaround(&self) -> bool {
        self.session.needs_function_depth_workaround_at(self.cursor)
    }

    /// Index of the next step after the cursor whose instruction maps to a
    /// source file.
    ///
    /// `Ok(None)` if the trace ends first. Fails if the scan reaches a step
    /// in another context before finding one.
    pub fn next_mapped(&self) -> EngineResult<Option<usize>> {
        self.next_mapped.try_get(self.cursor, || {
            let session = &self.session;
            let context = session.context_id_at(self.cursor);
            let map = &session.tables_at(self.cursor).pc_map;

            for index in self.cursor + 1..session.len() {
                if session.context_id_at(index) != context {
                    return Err(EngineError::StaleContextRead { cursor: self.cursor });
                }
                let mapped = session
                    .step(index)
                    .and_then(|step| map.lookup(step.pc))
                    .is_some_and(|instruction| instruction.range.has_file());
                if mapped {
                    return Ok(Some(index));
                }
            }
            Ok(None)
        })
    }

    /// Source-level function depth of the current step
    pub fn function_depth(&self) -> usize {
        self.session.function_depth_at(self.cursor)
    }

    // ----- reading -----

    /// Read a fact by path. Relative paths resolve against `current`.
    pub fn read(&self, path: &str) -> EngineResult<FactValue> {
        self.read_path(FactPath::resolve(path, Subtree::Current)?)
    }

    /// Read a fact by parsed path
    pub fn read_path(&self, path: FactPath) -> EngineResult<FactValue> {
        match path.subtree {
            Subtree::Info => match path.fact {
                Fact::Sources => FactValue::from_serialize(self.sources()),
                _ => FactValue::from_serialize(self.source_maps()),
            },
            Subtree::Current => self.read_current(path.fact),
            Subtree::Next => read_multistep(&self.next()?, path.fact),
        }
    }

    fn read_current(&self, fact: Fact) -> EngineResult<FactValue> {
        match fact {
            Fact::SourceMap => FactValue::from_serialize(self.source_map()),
            Fact::Instructions => {
                let instructions: Vec<&Instruction> =
                    self.instructions().iter().map(Arc::as_ref).collect();
                FactValue::from_serialize(instructions)
            }
            Fact::InstructionAtProgramCounter => {
                FactValue::from_serialize(self.instruction_at_program_counter().indices())
            }
            Fact::IsSourceRangeFinal => FactValue::from_serialize(self.is_source_range_final()),
            Fact::IsMultiline => FactValue::from_serialize(self.is_multiline()),
            Fact::WillJump => FactValue::from_serialize(self.will_jump()),
            Fact::JumpDirection => FactValue::from_serialize(self.jump_direction()),
            Fact::WillCall => FactValue::from_serialize(self.will_call()),
            Fact::WillCreate => FactValue::from_serialize(self.will_create()),
            Fact::CallsPrecompile => FactValue::from_serialize(self.calls_precompile()),
            Fact::WillReturn => FactValue::from_serialize(self.will_return()),
            Fact::IsContractCall => FactValue::from_serialize(self.is_contract_call()),
            Fact::NeedsFunctionDepthWorkaround => {
                FactValue::from_serialize(self.needs_function_depth_workaround())
            }
            Fact::NextMapped => FactValue::from_serialize(self.next_mapped()?),
            Fact::FunctionDepth => FactValue::from_serialize(self.function_depth()),
            multistep => read_multistep(&self.current(), multistep),
        }
    }

    /// Take a snapshot of every fact at the cursor.
    ///
    /// Lookahead facts that are undefined at this step are left empty.
    pub fn snapshot(&self) -> DerivedFacts {
        let current = self.current();
        DerivedFacts {
            cursor: self.cursor,
            context: self.context(),
            current: StepFacts::collect(&current),
            next: self.next().ok().map(|next| StepFacts::collect(&next)),
            function_depth: self.function_depth(),
            flags: self.flags(),
            is_source_range_final: self.is_source_range_final(),
            is_multiline: self.is_multiline(),
            jump_direction: self.jump_direction().to_string(),
            is_contract_call: self.is_contract_call(),
            needs_function_depth_workaround: self.needs_function_depth_workaround(),
            next_mapped: self.next_mapped().ok().flatten(),
        }
    }
}

fn read_multistep<S: StepSelector>(view: &StepView<'_, S>, fact: Fact) -> EngineResult<FactValue> {
    match fact {
        Fact::Instruction => FactValue::from_serialize(view.instruction().as_deref()),
        Fact::Source => FactValue::from_serialize(view.source().as_deref()),
        Fact::SourceRange => FactValue::from_serialize(view.source_range()),
        Fact::Pointer => FactValue::from_serialize(view.pointer()),
        Fact::Node => FactValue::from_serialize(view.node().as_ref().and_then(NodeRef::value)),
        other => Err(EngineError::InvalidFactPath(format!("/{}/{}", S::NAME, other.as_str()))),
    }
}
