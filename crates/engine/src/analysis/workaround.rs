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

//! Compiler-version workarounds.
//!
//! Each workaround is a [`WorkaroundRule`] value matched against a
//! [`CompilerIdentity`]. Resolution never fails: an absent identity, another
//! compiler, or an unparseable version all mean the rule does not apply.

use lazy_static::lazy_static;
use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use tracing::trace;

use crate::utils::CompilerIdentity;

/// A compiler defect and the correction that compensates for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkaroundRule {
    /// Short identifier used in logs
    pub name: &'static str,
    /// Affected compiler name
    pub compiler: &'static str,
    /// Affected versions
    pub affected: VersionReq,
    /// Correction applied while the rule is active
    pub correction: usize,
}

lazy_static! {
    /// solc before 0.5.1 marks the jump that follows an external contract or
    /// library call as a function return (`o`), so the caller loses one level
    /// of function depth once the call has returned.
    pub static ref FUNCTION_DEPTH_WORKAROUND: WorkaroundRule = WorkaroundRule {
        name: "function-depth",
        compiler: "solc",
        affected: below(0, 5, 1),
        correction: 1,
    };
}

/// Versions strictly below `major.minor.patch`
fn below(major: u64, minor: u64, patch: u64) -> VersionReq {
    VersionReq {
        comparators: vec![Comparator {
            op: Op::Less,
            major,
            minor: Some(minor),
            patch: Some(patch),
            pre: Prerelease::EMPTY,
        }],
    }
}

impl WorkaroundRule {
    /// Whether the rule applies to code built by `compiler`
    pub fn applies_to(&self, compiler: Option<&CompilerIdentity>) -> bool {
        let Some(compiler) = compiler else {
            return false;
        };
        if compiler.name != self.compiler {
            return false;
        }
        let applies = parse_version(&compiler.version)
            .is_some_and(|version| self.affected.matches(&version));
        trace!(rule = self.name, version = %compiler.version, applies, "resolved workaround");
        applies
    }
}

/// Parse a compiler version string.
///
/// Accepts a leading `v` and build metadata such as `0.4.25+commit.59dbf8f1`,
/// and falls back to the leading `major.minor.patch` for anything else.
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(raw) {
        // a pre-release tag would exclude the version from plain ranges
        return Some(Version::new(version.major, version.minor, version.patch));
    }

    let core: String = raw.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    let mut parts = core.split('.').map(|part| part.parse::<u64>().ok());
    let major = parts.next()??;
    let minor = parts.next()??;
    let patch = parts.next().flatten().unwrap_or(0);
    Some(Version::new(major, minor, patch))
}
