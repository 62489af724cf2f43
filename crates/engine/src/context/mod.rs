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

//! Executing contexts.
//!
//! A context is one compilation unit as it appears in the trace: runtime code
//! deployed at one or more addresses, or init code run by a creation. The
//! [`ContextRegistry`] knows every context of a session; the
//! [`ContextTracker`] assigns a context to each trace step.

mod tracker;
pub use tracker::*;

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{keccak256, Address, B256};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::{ArtifactInput, CompilationUnit, EngineError, EngineResult};

pub use crate::utils::ContextKind;

/// Identifier of a context within one registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[display("#{_0}")]
pub struct ContextId(usize);

impl ContextId {
    /// Position of the context in its registry
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A compilation unit together with how it is recognised in a trace.
#[derive(Debug, Clone)]
pub struct Context {
    /// Registry id
    pub id: ContextId,
    /// Contract or library name
    pub name: String,
    /// Addresses the code is deployed at
    pub addresses: Vec<Address>,
    /// keccak256 of the bytecode
    pub code_hash: B256,
    /// Runtime or creation code
    pub kind: ContextKind,
    /// The static inputs of this context
    pub unit: Arc<CompilationUnit>,
}

/// All contexts known to a session.
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    contexts: Vec<Arc<Context>>,
    by_address: HashMap<Address, ContextId>,
    by_code_hash: HashMap<B256, ContextId>,
}

impl ContextRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit. Later registrations never shadow earlier ones.
    pub fn register(
        &mut self,
        unit: CompilationUnit,
        addresses: Vec<Address>,
        kind: ContextKind,
    ) -> ContextId {
        let id = ContextId(self.contexts.len());
        let code_hash = keccak256(&unit.bytecode);

        for address in &addresses {
            self.by_address.entry(*address).or_insert(id);
        }
        self.by_code_hash.entry(code_hash).or_insert(id);

        debug!(%id, name = %unit.name, ?kind, addresses = addresses.len(), "registered context");
        self.contexts.push(Arc::new(Context {
            id,
            name: unit.name.clone(),
            addresses,
            code_hash,
            kind,
            unit: Arc::new(unit),
        }));
        id
    }

    /// Register the unit described by an artifact
    pub fn register_artifact(&mut self, artifact: &ArtifactInput) -> ContextId {
        self.register(artifact.to_unit(), artifact.addresses.clone(), artifact.kind)
    }

    /// Build a registry from artifacts, in order
    pub fn from_artifacts<'a>(artifacts: impl IntoIterator<Item = &'a ArtifactInput>) -> Self {
        let mut registry = Self::new();
        for artifact in artifacts {
            registry.register_artifact(artifact);
        }
        registry
    }

    /// Number of registered contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no context is registered
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Look up a context by id
    pub fn get(&self, id: ContextId) -> Option<&Arc<Context>> {
        self.contexts.get(id.0)
    }

    /// Look up a context by id, failing for ids of another registry
    pub fn context(&self, id: ContextId) -> EngineResult<&Arc<Context>> {
        self.get(id).ok_or(EngineError::UnknownContext(id))
    }

    /// Iterate over all contexts in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Context>> {
        self.contexts.iter()
    }

    /// The context deployed at `address`
    pub fn by_address(&self, address: Address) -> Option<ContextId> {
        self.by_address.get(&address).copied()
    }

    /// The context running `code`.
    ///
    /// Init code is matched by prefix as well, since constructor arguments are
    /// appended to it.
    pub fn by_code(&self, code: &[u8]) -> Option<ContextId> {
        if let Some(id) = self.by_code_hash.get(&keccak256(code)) {
            return Some(*id);
        }
        self.contexts
            .iter()
            .filter(|context| context.kind == ContextKind::Creation)
            .filter(|context| !context.unit.bytecode.is_empty())
            .find(|context| code.starts_with(&context.unit.bytecode))
            .map(|context| context.id)
    }
}
