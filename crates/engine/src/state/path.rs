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

//! Path addressing of facts.
//!
//! Absolute paths name a subtree and a fact, e.g. `/current/sourceRange`.
//! Relative paths such as `./node` are resolved against a base subtree.

use std::{fmt, str::FromStr};

use serde::Serialize;
use serde_json::Value;

use crate::utils::{EngineError, EngineResult};

/// Top level subtrees of the state tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subtree {
    /// Static inputs
    Info,
    /// Facts at the cursor
    Current,
    /// Facts at the step after the cursor
    Next,
}

impl Subtree {
    /// Name of the subtree in paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Current => "current",
            Self::Next => "next",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "info" => Some(Self::Info),
            "current" => Some(Self::Current),
            "next" => Some(Self::Next),
            _ => None,
        }
    }
}

macro_rules! facts {
    ($($(#[$attr:meta])* $variant:ident => $name:literal in [$($subtree:ident),+],)+) => {
        /// Every fact the state tree can derive
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Fact {
            $($(#[$attr])* $variant,)+
        }

        impl Fact {
            /// Every fact in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Name of the fact in paths
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            fn parse(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Whether the fact exists in `subtree`
            pub fn belongs_to(&self, subtree: Subtree) -> bool {
                match self {
                    $(Self::$variant => matches!(subtree, $(Subtree::$subtree)|+),)+
                }
            }
        }
    };
}

facts! {
    /// Source files of every context
    Sources => "sources" in [Info],
    /// Raw source maps of every context
    SourceMaps => "sourceMaps" in [Info],
    /// Decompressed source map of the current context
    SourceMap => "sourceMap" in [Current],
    /// Instruction table of the current context
    Instructions => "instructions" in [Current],
    /// Program counter map of the current context, as instruction indices
    InstructionAtProgramCounter => "instructionAtProgramCounter" in [Current],
    /// Instruction at the selected step
    Instruction => "instruction" in [Current, Next],
    /// Source file of the instruction
    Source => "source" in [Current, Next],
    /// Source range of the instruction
    SourceRange => "sourceRange" in [Current, Next],
    /// Pointer to the located AST node
    Pointer => "pointer" in [Current, Next],
    /// The located AST node
    Node => "node" in [Current, Next],
    /// Whether a source-level step may stop here
    IsSourceRangeFinal => "isSourceRangeFinal" in [Current],
    /// Whether the source range spans several lines
    IsMultiline => "isMultiline" in [Current],
    /// Whether the step jumps
    WillJump => "willJump" in [Current],
    /// Jump annotation of the instruction
    JumpDirection => "jumpDirection" in [Current],
    /// Whether the step calls
    WillCall => "willCall" in [Current],
    /// Whether the step creates a contract
    WillCreate => "willCreate" in [Current],
    /// Whether the step calls a precompile
    CallsPrecompile => "callsPrecompile" in [Current],
    /// Whether the step halts its context
    WillReturn => "willReturn" in [Current],
    /// Whether the node is a direct contract or library call
    IsContractCall => "isContractCall" in [Current],
    /// Whether the function-depth workaround applies to the call context
    NeedsFunctionDepthWorkaround => "needsFunctionDepthWorkaround" in [Current],
    /// The next step with a source mapping
    NextMapped => "nextMapped" in [Current],
    /// Source-level function depth
    FunctionDepth => "functionDepth" in [Current],
}

/// A parsed, validated fact address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactPath {
    /// Subtree the fact is read from
    pub subtree: Subtree,
    /// The fact
    pub fact: Fact,
}

impl FactPath {
    /// Create a path, checking that the fact exists in the subtree
    pub fn new(subtree: Subtree, fact: Fact) -> EngineResult<Self> {
        if !fact.belongs_to(subtree) {
            return Err(EngineError::InvalidFactPath(format!(
                "/{}/{}",
                subtree.as_str(),
                fact.as_str()
            )));
        }
        Ok(Self { subtree, fact })
    }

    /// Parse an absolute path, or a relative one against `base`
    pub fn resolve(path: &str, base: Subtree) -> EngineResult<Self> {
        let invalid = || EngineError::InvalidFactPath(path.to_string());
        if let Some(relative) = path.strip_prefix("./") {
            let fact = Fact::parse(relative).ok_or_else(invalid)?;
            return Self::new(base, fact).map_err(|_| invalid());
        }

        let mut segments = path.strip_prefix('/').ok_or_else(invalid)?.split('/');
        let subtree = segments.next().and_then(Subtree::parse).ok_or_else(invalid)?;
        let fact = segments.next().and_then(Fact::parse).ok_or_else(invalid)?;
        if segments.next().is_some() {
            return Err(invalid());
        }
        Self::new(subtree, fact)
    }
}

impl FromStr for FactPath {
    type Err = EngineError;

    fn from_str(path: &str) -> EngineResult<Self> {
        if !path.starts_with('/') {
            return Err(EngineError::InvalidFactPath(path.to_string()));
        }
        Self::resolve(path, Subtree::Current)
    }
}

impl fmt::Display for FactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.subtree.as_str(), self.fact.as_str())
    }
}

/// The value of a fact read by path, in JSON form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FactValue(pub Value);

impl FactValue {
    /// Serialize a fact into its JSON form
    pub fn from_serialize(value: impl Serialize) -> EngineResult<Self> {
        Ok(Self(serde_json::to_value(value)?))
    }

    /// The JSON value
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// The value as a boolean, for flag facts
    pub fn as_bool(&self) -> Option<bool> {
        self.0.as_bool()
    }
}
