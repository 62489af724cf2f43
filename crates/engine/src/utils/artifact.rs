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

//! Compilation artifacts: the static inputs of a debugging session.

use std::{collections::BTreeMap, fs, path::Path, sync::Arc};

use alloy_primitives::{Address, Bytes};
use eyre::{Result, WrapErr};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::LineIndex;

/// Name and version of the compiler that produced a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerIdentity {
    /// Compiler name, e.g. `solc`
    pub name: String,
    /// Version string as reported by the compiler, e.g. `0.4.25+commit.59dbf8f1`
    pub version: String,
}

impl CompilerIdentity {
    /// Create a compiler identity
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into() }
    }
}

/// One source file together with its syntax tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// File index used by source maps
    pub id: i32,
    /// Path of the file, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Full source text
    #[serde(rename = "content")]
    pub text: String,
    /// Compiler AST in JSON form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast: Option<serde_json::Value>,
    #[serde(skip)]
    line_index: OnceCell<LineIndex>,
}

impl SourceFile {
    /// Create a source file
    pub fn new(id: i32, text: impl Into<String>, ast: Option<serde_json::Value>) -> Self {
        Self { id, path: None, text: text.into(), ast, line_index: OnceCell::new() }
    }

    /// Set the path of the file
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The offset to line/column table, built on first use
    pub fn line_index(&self) -> &LineIndex {
        self.line_index.get_or_init(|| {
            debug!(file = self.id, bytes = self.text.len(), "building line index");
            LineIndex::new(&self.text)
        })
    }

    /// Text covered by `[start, start + length)`, if it lies inside the file
    pub fn slice(&self, start: usize, length: usize) -> Option<&str> {
        self.text.get(start..start.checked_add(length)?)
    }
}

/// Sources of a unit, keyed by file index
pub type Sources = BTreeMap<i32, Arc<SourceFile>>;

/// Everything the compiler produced for one executing context.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    /// Contract or library name
    pub name: String,
    /// Bytecode as executed (runtime code, or init code for creation contexts)
    pub bytecode: Bytes,
    /// Compact source map, absent for code without debug information
    pub source_map: Option<String>,
    /// Files referenced by the source map
    pub sources: Sources,
    /// Identity of the compiler, absent when unknown
    pub compiler: Option<CompilerIdentity>,
}

impl CompilationUnit {
    /// Create a unit without sources or source map
    pub fn new(name: impl Into<String>, bytecode: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytecode: bytecode.into(),
            source_map: None,
            sources: Sources::new(),
            compiler: None,
        }
    }

    /// Set the compact source map
    pub fn with_source_map(mut self, source_map: impl Into<String>) -> Self {
        self.source_map = Some(source_map.into());
        self
    }

    /// Add a source file, keyed by its id
    pub fn with_source(mut self, source: Arc<SourceFile>) -> Self {
        self.sources.insert(source.id, source);
        self
    }

    /// Set the compiler identity
    pub fn with_compiler(mut self, compiler: CompilerIdentity) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Look up a source file by index
    pub fn source(&self, file: i32) -> Option<&Arc<SourceFile>> {
        self.sources.get(&file)
    }
}

/// Whether a unit holds runtime code or init code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextKind {
    /// Deployed code, entered through message calls
    #[default]
    Runtime,
    /// Init code, entered through contract creation
    Creation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SourceInput {
    #[serde(default)]
    path: Option<String>,
    content: String,
    #[serde(default)]
    ast: Option<serde_json::Value>,
}

/// The JSON form of one artifact as handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInput {
    /// Contract or library name
    pub name: String,
    /// Hex-encoded bytecode
    pub bytecode: Bytes,
    /// Compact source map
    #[serde(default)]
    pub source_map: Option<String>,
    #[serde(default)]
    sources: BTreeMap<i32, SourceInput>,
    /// Compiler identity
    #[serde(default)]
    pub compiler: Option<CompilerIdentity>,
    /// Addresses the code is deployed at
    #[serde(default)]
    pub addresses: Vec<Address>,
    /// Runtime or creation code
    #[serde(default)]
    pub kind: ContextKind,
}

impl ArtifactInput {
    /// Parse one artifact from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).wrap_err("failed to parse artifact JSON")
    }

    /// Build the compilation unit described by this artifact
    pub fn to_unit(&self) -> CompilationUnit {
        let sources = self
            .sources
            .iter()
            .map(|(&id, input)| {
                let mut file = SourceFile::new(id, input.content.clone(), input.ast.clone());
                file.path = input.path.clone();
                (id, Arc::new(file))
            })
            .collect();

        CompilationUnit {
            name: self.name.clone(),
            bytecode: self.bytecode.clone(),
            source_map: self.source_map.clone(),
            sources,
            compiler: self.compiler.clone(),
        }
    }
}

/// Load a JSON array of artifacts from disk
pub fn load_artifacts(path: impl AsRef<Path>) -> Result<Vec<ArtifactInput>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read artifacts from {}", path.display()))?;
    let artifacts: Vec<ArtifactInput> = serde_json::from_str(&content)
        .wrap_err_with(|| format!("failed to parse artifacts in {}", path.display()))?;
    debug!(path = %path.display(), count = artifacts.len(), "loaded artifacts");
    Ok(artifacts)
}
