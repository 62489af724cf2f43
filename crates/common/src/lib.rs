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

//! soldb common - shared functionality for soldb components
//!
//! This crate provides the execution trace model, opcode classification and
//! logging setup used by the engine crate and by the consumers built on it.

/// Common types used throughout soldb, most notably the execution trace
pub mod types;

/// Logging setup and utilities for consistent logging across soldb components
pub mod logging;
/// Extended opcode analysis utilities and the trace step classifier
pub mod opcode;

pub use logging::*;
pub use opcode::*;
pub use types::*;
