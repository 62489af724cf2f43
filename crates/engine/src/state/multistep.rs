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

//! Facts that exist both for the current step and for the next one.

use std::{fmt, marker::PhantomData, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use soldb_common::TraceStep;

use crate::{
    analysis::{locate, AstPointer, Instruction, LineColumn, LineColumnSpan, ProgramCounterMap},
    context::ContextId,
    session::Session,
    state::{ArcKey, Leaf},
    utils::SourceFile,
};

/// Selects which trace step a [`MultistepFacts`] subtree reads from.
pub trait StepSelector {
    /// Subtree name used in fact paths
    const NAME: &'static str;
    /// Distance of the selected step from the cursor
    const OFFSET: usize;
}

/// The step at the cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Current;

impl StepSelector for Current {
    const NAME: &'static str = "current";
    const OFFSET: usize = 0;
}

/// The step after the cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Next;

impl StepSelector for Next {
    const NAME: &'static str = "next";
    const OFFSET: usize = 1;
}

/// Source range of a step, with the defaults used when nothing is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRangeFact {
    /// Byte offset, `0` when unmapped
    pub start: usize,
    /// Length in bytes, `0` when unmapped
    pub length: usize,
    /// Line/column span, origin to origin when unmapped
    pub lines: LineColumnSpan,
}

impl Default for SourceRangeFact {
    fn default() -> Self {
        Self {
            start: 0,
            length: 0,
            lines: LineColumnSpan { start: LineColumn::origin(), end: LineColumn::origin() },
        }
    }
}

impl SourceRangeFact {
    /// Whether start and end lie on different lines
    pub fn is_multiline(&self) -> bool {
        self.lines.is_multiline()
    }
}

/// A located AST node: the file that owns the tree and the pointer into it.
#[derive(Clone)]
pub struct NodeRef {
    source: Arc<SourceFile>,
    pointer: AstPointer,
}

impl NodeRef {
    /// The node's JSON, `None` if the pointer does not resolve
    pub fn value(&self) -> Option<&Value> {
        self.source.ast.as_ref().and_then(|ast| self.pointer.resolve(ast))
    }

    /// Pointer from the root of the file's AST
    pub fn pointer(&self) -> &AstPointer {
        &self.pointer
    }

    /// The file owning the node
    pub fn source(&self) -> &Arc<SourceFile> {
        &self.source
    }

    /// The node's `nodeType` attribute
    pub fn node_type(&self) -> Option<&str> {
        self.value()?.get("nodeType")?.as_str()
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.source, &other.source) && self.pointer == other.pointer
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("file", &self.source.id)
            .field("pointer", &self.pointer)
            .field("node_type", &self.node_type())
            .finish()
    }
}

type SourceKey = Option<ArcKey<SourceFile>>;

/// The memo leaves of one step-selected subtree.
///
/// `current` and `next` are two instances of this type that differ only in
/// their [`StepSelector`].
pub struct MultistepFacts<S> {
    instruction: Leaf<(ArcKey<ProgramCounterMap>, Option<usize>), Option<Arc<Instruction>>>,
    source: Leaf<(Option<ContextId>, Option<i32>), Option<Arc<SourceFile>>>,
    source_range: Leaf<Option<ArcKey<Instruction>>, SourceRangeFact>,
    pointer: Leaf<(SourceKey, usize, usize), AstPointer>,
    node: Leaf<(SourceKey, AstPointer), Option<NodeRef>>,
    _selector: PhantomData<S>,
}

impl<S: StepSelector> Default for MultistepFacts<S> {
    fn default() -> Self {
        Self {
            instruction: Leaf::new("instruction"),
            source: Leaf::new("source"),
            source_range: Leaf::new("sourceRange"),
            pointer: Leaf::new("pointer"),
            node: Leaf::new("node"),
            _selector: PhantomData,
        }
    }
}

impl<S: StepSelector> fmt::Debug for MultistepFacts<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultistepFacts")
            .field("selector", &S::NAME)
            .field("instruction", &self.instruction)
            .field("node", &self.node)
            .finish()
    }
}

/// Read access to one step-selected subtree at a cursor.
pub struct StepView<'a, S> {
    session: &'a Session,
    cursor: usize,
    facts: &'a MultistepFacts<S>,
}

impl<'a, S: StepSelector> StepView<'a, S> {
    pub(crate) fn new(session: &'a Session, cursor: usize, facts: &'a MultistepFacts<S>) -> Self {
        Self { session, cursor, facts }
    }

    /// Index of the selected step
    pub fn step_index(&self) -> usize {
        self.cursor + S::OFFSET
    }

    /// The selected step, `None` past the end of the trace
    pub fn step(&self) -> Option<&'a TraceStep> {
        self.session.step(self.step_index())
    }

    /// Instruction at the selected step's pc.
    ///
    /// Always resolved through the program counter map of the context at the
    /// cursor, which is only meaningful for `next` while the context stays.
    pub fn instruction(&self) -> Option<Arc<Instruction>> {
        let map = &self.session.tables_at(self.cursor).pc_map;
        let pc = self.step().map(|step| step.pc);
        self.facts
            .instruction
            .get((ArcKey(Arc::clone(map)), pc), || pc.and_then(|pc| map.lookup(pc).cloned()))
    }

    /// Source file the instruction maps to
    pub fn source(&self) -> Option<Arc<SourceFile>> {
        let context = self.session.context_id_at(self.cursor);
        let file = self.instruction().map(|instruction| instruction.range.file);
        self.facts.source.get((context, file), || {
            let unit = &self.session.context_at(self.cursor)?.unit;
            unit.source(file?).cloned()
        })
    }

    /// Source range of the instruction, defaulted when unmapped
    pub fn source_range(&self) -> SourceRangeFact {
        let instruction = self.instruction();
        self.facts.source_range.get(ArcKey::of(instruction.as_ref()), || {
            instruction.as_ref().map_or_else(SourceRangeFact::default, |instruction| {
                SourceRangeFact {
                    start: instruction.range.start,
                    length: instruction.range.length,
                    lines: instruction.lines,
                }
            })
        })
    }

    /// Pointer to the deepest AST node containing the source range
    pub fn pointer(&self) -> AstPointer {
        let source = self.source();
        let range = self.source_range();
        self.facts.pointer.get((ArcKey::of(source.as_ref()), range.start, range.length), || {
            source
                .as_ref()
                .and_then(|source| source.ast.as_ref())
                .map_or_else(AstPointer::root, |ast| locate(ast, range.start, range.length))
        })
    }

    /// The AST node at [`StepView::pointer`], `None` without an AST
    pub fn node(&self) -> Option<NodeRef> {
        let source = self.source();
        let pointer = self.pointer();
        self.facts.node.get((ArcKey::of(source.as_ref()), pointer.clone()), || {
            let node = NodeRef { source: source?, pointer };
            node.value().is_some().then_some(node)
        })
    }
}
