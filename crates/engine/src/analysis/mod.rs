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

//! Static analysis of compilation units: source maps, bytecode, line indices
//! and the AST.

mod ast;
pub use ast::*;

mod depth;
pub use depth::*;

mod instructions;
pub use instructions::*;

mod line_index;
pub use line_index::*;

mod pc_map;
pub use pc_map::*;

mod source_map;
pub use source_map::*;

mod workaround;
pub use workaround::*;
