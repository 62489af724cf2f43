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

//! Locating AST nodes by source range.
//!
//! The AST is kept in the compiler's JSON form. Every object carrying a `src`
//! attribute of the form `start:length:file` is a node; a located node is
//! addressed by an RFC 6901 JSON pointer from the root of the file's AST.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// JSON pointer to a node of a file's AST. The empty pointer is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AstPointer(String);

impl AstPointer {
    /// Pointer to the root node
    pub fn root() -> Self {
        Self::default()
    }

    /// Whether this is the root pointer
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The pointer text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extend the pointer by one reference token
    pub fn child(&self, token: &str) -> Self {
        let escaped = token.replace('~', "~0").replace('/', "~1");
        Self(format!("{}/{escaped}", self.0))
    }

    /// Resolve the pointer against an AST
    pub fn resolve<'a>(&self, ast: &'a Value) -> Option<&'a Value> {
        ast.pointer(&self.0)
    }
}

/// The `src` attribute of an AST node as `(start, length, file)`
pub fn node_span(node: &Value) -> Option<(usize, usize, i32)> {
    let mut fields = node.get("src")?.as_str()?.split(':');
    let start = fields.next()?.parse().ok()?;
    let length = fields.next()?.parse().ok()?;
    let file = fields.next()?.parse().ok()?;
    Some((start, length, file))
}

/// Find the deepest node whose span contains `[start, start + length]`.
///
/// Among nodes of the same depth the first in document order wins. When no
/// node contains the range the root pointer is returned.
pub fn locate(ast: &Value, start: usize, length: usize) -> AstPointer {
    let end = start.saturating_add(length);
    let mut best: Option<(usize, AstPointer)> = None;
    visit(ast, AstPointer::root(), 0, &mut |node, pointer, depth| {
        let Some((node_start, node_length, _)) = node_span(node) else {
            return;
        };
        let contains = node_start <= start && end <= node_start.saturating_add(node_length);
        if contains && best.as_ref().is_none_or(|(best_depth, _)| depth > *best_depth) {
            best = Some((depth, pointer.clone()));
        }
    });

    let pointer = best.map(|(_, pointer)| pointer).unwrap_or_default();
    trace!(start, length, pointer = %pointer, "located AST node");
    pointer
}

// Pre-order walk; `depth` counts node ancestors, not JSON nesting.
fn visit(
    value: &Value,
    pointer: AstPointer,
    depth: usize,
    f: &mut impl FnMut(&Value, &AstPointer, usize),
) {
    match value {
        Value::Object(map) => {
            let is_node = map.contains_key("src");
            if is_node {
                f(value, &pointer, depth);
            }
            let child_depth = if is_node { depth + 1 } else { depth };
            for (key, child) in map {
                if child.is_object() || child.is_array() {
                    visit(child, pointer.child(key), child_depth, f);
                }
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                visit(child, pointer.child(&index.to_string()), depth, f);
            }
        }
        _ => {}
    }
}

/// Whether a node is a direct call of a contract or library member.
///
/// Only `c.f(...)` and `Library.f(...)` shapes are recognised. A member first
/// stored in a function-typed variable and then called is not.
pub fn is_contract_call(node: &Value) -> bool {
    if node.get("nodeType").and_then(Value::as_str) != Some("FunctionCall") {
        return false;
    }
    let Some(callee) = node.get("expression") else {
        return false;
    };
    if callee.get("nodeType").and_then(Value::as_str) != Some("MemberAccess") {
        return false;
    }
    callee.get("expression").is_some_and(|base| is_contract(base) || is_contract_type(base))
}

fn type_identifier(node: &Value) -> Option<&str> {
    node.get("typeDescriptions")?.get("typeIdentifier")?.as_str()
}

/// An expression of contract type, e.g. a variable `Token t`
fn is_contract(node: &Value) -> bool {
    type_identifier(node).is_some_and(|id| id.starts_with("t_contract"))
}

/// An expression naming a contract or library type, e.g. `SafeMath`
fn is_contract_type(node: &Value) -> bool {
    type_identifier(node).is_some_and(|id| id.starts_with("t_type$_t_contract"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ast() -> Value {
        json!({
            "nodeType": "SourceUnit",
            "src": "0:100:0",
            "nodes": [
                {
                    "nodeType": "ContractDefinition",
                    "src": "10:80:0",
                    "nodes": [
                        { "nodeType": "VariableDeclaration", "src": "20:10:0" },
                        {
                            "nodeType": "FunctionDefinition",
                            "src": "40:40:0",
                            "body": { "nodeType": "Block", "src": "50:30:0", "statements": [] }
                        },
                        { "nodeType": "EventDefinition", "src": "40:40:0" }
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_locate_deepest() {
        let ast = ast();
        let pointer = locate(&ast, 55, 5);
        assert_eq!(pointer.as_str(), "/nodes/0/nodes/1/body");
        assert_eq!(pointer.resolve(&ast).unwrap()["nodeType"], "Block");

        assert_eq!(locate(&ast, 22, 3).as_str(), "/nodes/0/nodes/0");
    }

    #[test]
    fn test_locate_tie_prefers_document_order() {
        let ast = ast();
        // function and event share a span; the function comes first
        let pointer = locate(&ast, 40, 40);
        assert_eq!(pointer.as_str(), "/nodes/0/nodes/1");
    }

    #[test]
    fn test_locate_falls_back_to_root() {
        let ast = ast();
        assert!(locate(&ast, 95, 20).is_root());
        assert!(locate(&Value::Null, 0, 0).is_root());
        // the root itself is a match when only it contains the range
        assert!(locate(&ast, 2, 3).is_root());
    }

    #[test]
    fn test_pointer_escaping() {
        let pointer = AstPointer::root().child("a/b").child("c~d");
        assert_eq!(pointer.as_str(), "/a~1b/c~0d");
        let value = json!({ "a/b": { "c~d": 1 } });
        assert_eq!(pointer.resolve(&value), Some(&json!(1)));
    }

    #[test]
    fn test_contract_call_classification() {
        let library_call = json!({
            "nodeType": "FunctionCall",
            "expression": {
                "nodeType": "MemberAccess",
                "memberName": "set",
                "expression": {
                    "nodeType": "Identifier",
                    "typeDescriptions": { "typeIdentifier": "t_type$_t_contract$_Lib_$12_$", "typeString": "type(library Lib)" }
                }
            }
        });
        assert!(is_contract_call(&library_call));

        let method_call = json!({
            "nodeType": "FunctionCall",
            "expression": {
                "nodeType": "MemberAccess",
                "expression": { "typeDescriptions": { "typeIdentifier": "t_contract$_Token_$40" } }
            }
        });
        assert!(is_contract_call(&method_call));

        let array_push = json!({
            "nodeType": "FunctionCall",
            "expression": {
                "nodeType": "MemberAccess",
                "expression": { "typeDescriptions": { "typeIdentifier": "t_array$_t_uint256_$dyn_storage" } }
            }
        });
        assert!(!is_contract_call(&array_push));

        // calling through a function-typed variable is not recognised
        let indirect = json!({
            "nodeType": "FunctionCall",
            "expression": {
                "nodeType": "Identifier",
                "typeDescriptions": { "typeIdentifier": "t_function_external_nonpayable$__$returns$__$" }
            }
        });
        assert!(!is_contract_call(&indirect));
        assert!(!is_contract_call(&json!({ "nodeType": "Block" })));
    }

    #[test]
    fn test_node_span() {
        assert_eq!(node_span(&json!({ "src": "1:2:-1" })), Some((1, 2, -1)));
        assert_eq!(node_span(&json!({ "src": "1:2" })), None);
        assert_eq!(node_span(&json!({})), None);
    }
}
