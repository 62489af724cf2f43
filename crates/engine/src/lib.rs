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

//! Source-level derivation engine for EVM execution traces.
//!
//! Given the compilation units of the contracts a transaction touched and the
//! recorded instruction trace, the engine maps every step back to a source
//! range, an AST node and a source-level function depth.

pub mod analysis;
pub use analysis::*;

pub mod context;
pub use context::*;

pub mod core;
pub use core::*;

pub mod session;
pub use session::*;

pub mod state;
pub use state::*;

pub mod utils;
pub use utils::*;
