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

//! Engine configuration.
//!
//! [`EngineConfig`] holds the few knobs of the derivation engine. It can be
//! built in code with the `with_*` methods or loaded from a TOML file, where
//! every key is optional:
//!
//! ```toml
//! max_precompile_address = 17
//! initial_function_depth = 1
//! enable_compiler_workarounds = true
//! ```

use std::{fs, path::Path};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for the derivation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest address treated as a precompile by the default step classifier
    pub max_precompile_address: u64,
    /// Function depth of the first trace step
    pub initial_function_depth: usize,
    /// Whether compiler-version workarounds may apply at all
    pub enable_compiler_workarounds: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_precompile_address: 0x11,
            initial_function_depth: 1,
            enable_compiler_workarounds: true,
        }
    }
}

impl EngineConfig {
    /// Set the largest precompile address
    pub fn with_max_precompile_address(mut self, address: u64) -> Self {
        self.max_precompile_address = address;
        self
    }

    /// Set the function depth of the first trace step
    pub fn with_initial_function_depth(mut self, depth: usize) -> Self {
        self.initial_function_depth = depth;
        self
    }

    /// Enable or disable compiler-version workarounds
    pub fn with_compiler_workarounds(mut self, enabled: bool) -> Self {
        self.enable_compiler_workarounds = enabled;
        self
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).wrap_err("Failed to parse engine config as TOML")
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {path:?}"))?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded engine configuration from {:?}", path);
        Ok(config)
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            toml::to_string_pretty(self).wrap_err("Failed to serialize engine config to TOML")?;
        fs::write(path, content)
            .wrap_err_with(|| format!("Failed to write config file: {path:?}"))?;
        debug!("Saved engine configuration to {:?}", path);
        Ok(())
    }
}
