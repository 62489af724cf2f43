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

//! Sessions built from artifact and trace files, with a contract creation.

use std::sync::Arc;

use alloy_primitives::address;
use serde_json::json;
use soldb_common::Trace;
use soldb_engine::{load_artifacts, ContextKind, ContextRegistry, EngineConfig, Session, StateTree};
use tracing::info;

const ARTIFACTS: &str = r#"[
    {
        "name": "Factory",
        "bytecode": "0x60056000f000",
        "sourceMap": "0:56:0:-;;41:11:0;",
        "sources": {
            "0": {
                "path": "Factory.sol",
                "content": "contract Factory {\n    function make() { new Child(); }\n}\n",
                "ast": { "nodeType": "SourceUnit", "src": "0:58:0", "nodes": [
                    { "nodeType": "NewExpression", "src": "41:11:0" }
                ] }
            }
        },
        "compiler": { "name": "solc", "version": "0.8.19+commit.7dd6d404" },
        "addresses": ["0x000000000000000000000000000000000000f00d"]
    },
    {
        "name": "Child",
        "bytecode": "0x60006000f3",
        "sourceMap": "0:17:0:-;;",
        "sources": {
            "0": { "path": "Child.sol", "content": "contract Child {}\n" }
        },
        "kind": "creation"
    }
]"#;

const TRACE: &str = r#"[
    { "pc": 0, "op": "PUSH1", "depth": 1 },
    { "pc": 2, "op": "PUSH1", "depth": 1 },
    { "pc": 4, "op": "CREATE", "depth": 1, "stack": ["0x7", "0x0", "0x0"],
      "memory": "0x60006000f3002a" },
    { "pc": 0, "op": "PUSH1", "depth": 2 },
    { "pc": 2, "op": "PUSH1", "depth": 2 },
    { "pc": 4, "op": "RETURN", "depth": 2 },
    { "pc": 5, "op": "STOP", "depth": 1 }
]"#;

fn tree() -> StateTree {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artifacts.json");
    std::fs::write(&path, ARTIFACTS).unwrap();

    let artifacts = load_artifacts(&path).unwrap();
    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[1].kind, ContextKind::Creation);

    let registry = ContextRegistry::from_artifacts(&artifacts);
    let root = registry.by_address(address!("0x000000000000000000000000000000000000f00d"));
    let trace = Trace::from_json(TRACE).unwrap();
    let session = Session::new(EngineConfig::default(), registry, trace, root).unwrap();
    StateTree::new(Arc::new(session))
}

#[test]
fn test_creation_resolves_init_code_with_arguments() {
    soldb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let tree = tree();
    let session = tree.session();

    let names: Vec<_> = (0..session.len())
        .map(|index| session.context_at(index).map(|context| context.name.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![
            Some("Factory"),
            Some("Factory"),
            Some("Factory"),
            Some("Child"),
            Some("Child"),
            Some("Child"),
            Some("Factory"),
        ]
    );
    let depths: Vec<_> = (0..session.len()).map(|index| session.function_depth_at(index)).collect();
    assert_eq!(depths, vec![1, 1, 1, 2, 2, 2, 1]);
}

#[test]
fn test_facts_from_files() {
    soldb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let mut tree = tree();

    tree.seek(2).unwrap();
    assert!(tree.will_create());
    assert!(!tree.will_call());
    assert_eq!(tree.current().node().unwrap().node_type(), Some("NewExpression"));
    assert!(!tree.is_contract_call());

    tree.advance().unwrap();
    let source = tree.read("/current/source").unwrap();
    assert_eq!(source.as_json()["path"], json!("Child.sol"));
    // the child's source has no AST
    assert_eq!(tree.read("/current/node").unwrap().as_json(), &json!(null));
    assert_eq!(tree.read("/current/pointer").unwrap().as_json(), &json!(""));

    let snapshot = serde_json::to_value(tree.snapshot()).unwrap();
    assert_eq!(snapshot["cursor"], json!(3));
    assert_eq!(snapshot["functionDepth"], json!(2));
    assert_eq!(snapshot["flags"]["is_create"], json!(false));
    assert_eq!(snapshot["next"]["sourceRange"]["length"], json!(17));
}
