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

//! The static side of a debugging session.
//!
//! A [`Session`] owns everything that does not depend on the cursor: the
//! trace, the registered contexts and their instruction tables, the context
//! and classification of every step, and the function depth of every step.
//! All of it is computed once at construction; a failure to build the tables
//! of any context aborts the session.

use std::sync::Arc;

use soldb_common::{OpcodeClassifier, StepClassifier, StepFlags, Trace, TraceStep};
use tracing::{debug, info};

use crate::{
    analysis::{
        is_contract_call, locate, DepthEvent, FunctionDepthTracker, Instruction, InstructionTable,
        JumpKind, ProgramCounterMap, FUNCTION_DEPTH_WORKAROUND,
    },
    context::{Context, ContextId, ContextRegistry, ContextTracker},
    core::EngineConfig,
    utils::{CompilationUnit, EngineResult},
};

/// Instruction table and program counter map of one context.
#[derive(Debug, Clone)]
pub struct ContextTables {
    /// Enriched instructions
    pub instructions: Arc<InstructionTable>,
    /// Forward-filled program counter map over `instructions`
    pub pc_map: Arc<ProgramCounterMap>,
}

impl ContextTables {
    /// Build both tables for a unit
    pub fn build(unit: &CompilationUnit) -> EngineResult<Self> {
        let instructions = Arc::new(InstructionTable::build(unit)?);
        let pc_map = Arc::new(ProgramCounterMap::build(Arc::clone(&instructions))?);
        Ok(Self { instructions, pc_map })
    }

    fn empty() -> EngineResult<Self> {
        let instructions = Arc::new(InstructionTable::default());
        let pc_map = Arc::new(ProgramCounterMap::build(Arc::clone(&instructions))?);
        Ok(Self { instructions, pc_map })
    }
}

/// Static inputs of one debugging session.
#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    registry: ContextRegistry,
    trace: Trace,
    tables: Vec<ContextTables>,
    no_tables: ContextTables,
    contexts: Vec<Option<ContextId>>,
    flags: Vec<StepFlags>,
    function_depths: Vec<usize>,
}

impl Session {
    /// Build a session classifying steps with the default [`OpcodeClassifier`]
    pub fn new(
        config: EngineConfig,
        registry: ContextRegistry,
        trace: Trace,
        root: Option<ContextId>,
    ) -> EngineResult<Self> {
        let classifier = OpcodeClassifier::new(config.max_precompile_address);
        Self::with_classifier(config, registry, trace, root, classifier)
    }

    /// Build a session with a caller supplied step classifier.
    ///
    /// `root` is the context of the first step, `None` if it has no artifacts.
    pub fn with_classifier(
        config: EngineConfig,
        registry: ContextRegistry,
        trace: Trace,
        root: Option<ContextId>,
        classifier: impl StepClassifier,
    ) -> EngineResult<Self> {
        if let Some(root) = root {
            registry.context(root)?;
        }

        let tables = registry
            .iter()
            .map(|context| ContextTables::build(&context.unit))
            .collect::<EngineResult<Vec<_>>>()?;
        let contexts = ContextTracker::new(&registry).track(&trace, root);
        let flags = trace.iter().map(|step| classifier.classify(step)).collect();

        let mut session = Self {
            config,
            registry,
            trace,
            tables,
            no_tables: ContextTables::empty()?,
            contexts,
            flags,
            function_depths: Vec::new(),
        };
        session.function_depths = session.compute_function_depths();

        info!(
            contexts = session.registry.len(),
            steps = session.trace.len(),
            "debugging session ready"
        );
        Ok(session)
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// All contexts of the session
    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// The trace being debugged
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.trace.len()
    }

    /// Whether the trace is empty
    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    /// Step at `index`
    pub fn step(&self, index: usize) -> Option<&TraceStep> {
        self.trace.step(index)
    }

    /// Context executing step `index`
    pub fn context_id_at(&self, index: usize) -> Option<ContextId> {
        self.contexts.get(index).copied().flatten()
    }

    /// Context executing step `index`
    pub fn context_at(&self, index: usize) -> Option<&Arc<Context>> {
        self.context_id_at(index).and_then(|id| self.registry.get(id))
    }

    /// Tables of a context; empty tables for `None`
    pub fn tables(&self, context: Option<ContextId>) -> &ContextTables {
        context.and_then(|id| self.tables.get(id.index())).unwrap_or(&self.no_tables)
    }

    /// Tables of the context executing step `index`
    pub fn tables_at(&self, index: usize) -> &ContextTables {
        self.tables(self.context_id_at(index))
    }

    /// Classification of step `index`
    pub fn flags_at(&self, index: usize) -> StepFlags {
        self.flags.get(index).copied().unwrap_or_default()
    }

    /// Function depth step `index` executes at
    pub fn function_depth_at(&self, index: usize) -> usize {
        self.function_depths.get(index).copied().unwrap_or(self.config.initial_function_depth)
    }

    /// Whether step `index` enters a new frame
    pub fn enters_frame_at(&self, index: usize) -> bool {
        match (self.step(index), self.step(index + 1)) {
            (Some(step), Some(next)) => next.depth > step.depth,
            _ => false,
        }
    }

    /// The context entered by the call or create at step `index`
    pub fn call_context_at(&self, index: usize) -> Option<&Arc<Context>> {
        let flags = self.flags_at(index);
        if !(flags.is_call || flags.is_create) || !self.enters_frame_at(index) {
            return None;
        }
        self.context_at(index + 1)
    }

    /// Whether the function-depth workaround applies to the call at step `index`
    pub fn needs_function_depth_workaround_at(&self, index: usize) -> bool {
        self.config.enable_compiler_workarounds
            && self.call_context_at(index).is_some_and(|context| {
                FUNCTION_DEPTH_WORKAROUND.applies_to(context.unit.compiler.as_ref())
            })
    }

    /// Instruction executed by step `index`, resolved in that step's context
    pub fn instruction_at(&self, index: usize) -> Option<&Arc<Instruction>> {
        let step = self.step(index)?;
        self.tables_at(index).pc_map.lookup(step.pc)
    }

    fn is_contract_call_at(&self, index: usize) -> bool {
        let Some(instruction) = self.instruction_at(index) else {
            return false;
        };
        let Some(ast) = self
            .context_at(index)
            .and_then(|context| context.unit.source(instruction.range.file))
            .and_then(|source| source.ast.as_ref())
        else {
            return false;
        };
        locate(ast, instruction.range.start, instruction.range.length)
            .resolve(ast)
            .is_some_and(is_contract_call)
    }

    fn compute_function_depths(&self) -> Vec<usize> {
        let events = (0..self.trace.len())
            .map(|index| {
                let flags = self.flags_at(index);
                let jump = self
                    .instruction_at(index)
                    .map_or(JumpKind::None, |instruction| instruction.range.jump);
                let correction = if self.needs_function_depth_workaround_at(index)
                    && self.is_contract_call_at(index)
                {
                    debug!(
                        step = index,
                        rule = FUNCTION_DEPTH_WORKAROUND.name,
                        "applying workaround"
                    );
                    FUNCTION_DEPTH_WORKAROUND.correction
                } else {
                    0
                };

                DepthEvent { vm_depth: self.trace[index].depth, flags, jump, correction }
            })
            .collect::<Vec<_>>();

        FunctionDepthTracker::new(self.config.initial_function_depth).track(&events)
    }
}
