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

//! End-to-end derivation over a contract that passes a storage mapping to a
//! library.
//!
//! `MappingPointerTest.run` jumps into the internal function `f`, which
//! delegates to `TouchLib.touch(surface)` and jumps back out.

use std::sync::Arc;

use alloy_primitives::{address, Address, U256};
use serde_json::{json, Value};
use soldb_common::{Trace, TraceStep};
use soldb_engine::{
    CompilationUnit, CompilerIdentity, ContextId, ContextKind, ContextRegistry, EngineConfig,
    EngineError, Session, SourceFile, StateTree,
};
use tracing::info;

const CALLER: Address = address!("0x00000000000000000000000000000000ca11e400");
const LIB: Address = address!("0x000000000000000000000000000000000000b0b0");

const CALLER_SOL: &str = "contract MappingPointerTest {
    mapping(string => uint) surface;
    function f() internal { TouchLib.touch(surface); }
    function run() public { f(); }
}
";

const LIB_SOL: &str = r#"library TouchLib {
    function touch(mapping(string => uint) storage surface) external { surface["ping"] = 1; }
}
"#;

const TOUCH: &str =
    r#"function touch(mapping(string => uint) storage surface) external { surface["ping"] = 1; }"#;

const MAPPING_TYPE: &str = "t_mapping$_t_string_memory_ptr_$_t_uint256_$";

/// `start:length:file` of the first occurrence of `needle`
fn src(text: &str, needle: &str, file: i32) -> String {
    let start = text.find(needle).unwrap();
    format!("{start}:{}:{file}", needle.len())
}

/// `start:length:file` of `needle` inside the first occurrence of `outer`
fn src_within(text: &str, outer: &str, needle: &str, file: i32) -> String {
    let start = text.find(outer).unwrap() + outer.find(needle).unwrap();
    format!("{start}:{}:{file}", needle.len())
}

fn caller_ast() -> Value {
    let t = CALLER_SOL;
    json!({
        "nodeType": "SourceUnit",
        "src": src(t, t, 0),
        "nodes": [{
            "nodeType": "ContractDefinition",
            "name": "MappingPointerTest",
            "src": src(t, t.trim_end(), 0),
            "nodes": [
                {
                    "nodeType": "VariableDeclaration",
                    "name": "surface",
                    "stateVariable": true,
                    "src": src(t, "mapping(string => uint) surface", 0),
                    "typeDescriptions": {
                        "typeIdentifier": MAPPING_TYPE,
                        "typeString": "mapping(string => uint256)"
                    }
                },
                {
                    "nodeType": "FunctionDefinition",
                    "name": "f",
                    "src": src(t, "function f() internal { TouchLib.touch(surface); }", 0),
                    "body": {
                        "nodeType": "Block",
                        "src": src(t, "{ TouchLib.touch(surface); }", 0),
                        "statements": [{
                            "nodeType": "ExpressionStatement",
                            "src": src(t, "TouchLib.touch(surface);", 0),
                            "expression": {
                                "nodeType": "FunctionCall",
                                "src": src(t, "TouchLib.touch(surface)", 0),
                                "arguments": [{
                                    "nodeType": "Identifier",
                                    "name": "surface",
                                    "src": src_within(t, "touch(surface)", "surface", 0),
                                    "typeDescriptions": {
                                        "typeIdentifier": format!("{MAPPING_TYPE}_storage_ptr"),
                                        "typeString": "mapping(string => uint256)"
                                    }
                                }],
                                "expression": {
                                    "nodeType": "MemberAccess",
                                    "memberName": "touch",
                                    "src": src(t, "TouchLib.touch", 0),
                                    "expression": {
                                        "nodeType": "Identifier",
                                        "name": "TouchLib",
                                        "src": src(t, "TouchLib", 0),
                                        "typeDescriptions": {
                                            "typeIdentifier":
                                                "t_type$_t_contract$_TouchLib_$28_$",
                                            "typeString": "type(library TouchLib)"
                                        }
                                    }
                                }
                            }
                        }]
                    }
                },
                {
                    "nodeType": "FunctionDefinition",
                    "name": "run",
                    "src": src(t, "function run() public { f(); }", 0),
                    "body": {
                        "nodeType": "Block",
                        "src": src(t, "{ f(); }", 0),
                        "statements": [{
                            "nodeType": "ExpressionStatement",
                            "src": src(t, "f();", 0),
                            "expression": {
                                "nodeType": "FunctionCall",
                                "src": src_within(t, "f();", "f()", 0),
                                "arguments": [],
                                "expression": {
                                    "nodeType": "Identifier",
                                    "name": "f",
                                    "src": src_within(t, "f();", "f", 0)
                                }
                            }
                        }]
                    }
                }
            ]
        }]
    })
}

fn lib_ast() -> Value {
    let t = LIB_SOL;
    let assignment = r#"surface["ping"] = 1"#;
    json!({
        "nodeType": "SourceUnit",
        "src": src(t, t, 1),
        "nodes": [{
            "nodeType": "ContractDefinition",
            "name": "TouchLib",
            "contractKind": "library",
            "src": src(t, t.trim_end(), 1),
            "nodes": [{
                "nodeType": "FunctionDefinition",
                "name": "touch",
                "src": src(t, TOUCH, 1),
                "parameters": {
                    "nodeType": "ParameterList",
                    "src": src(t, "(mapping(string => uint) storage surface)", 1),
                    "parameters": [{
                        "nodeType": "VariableDeclaration",
                        "name": "surface",
                        "storageLocation": "storage",
                        "src": src(t, "mapping(string => uint) storage surface", 1),
                        "typeDescriptions": {
                            "typeIdentifier": format!("{MAPPING_TYPE}_storage_ptr"),
                            "typeString": "mapping(string => uint256)"
                        }
                    }]
                },
                "body": {
                    "nodeType": "Block",
                    "src": src(t, r#"{ surface["ping"] = 1; }"#, 1),
                    "statements": [{
                        "nodeType": "ExpressionStatement",
                        "src": src(t, r#"surface["ping"] = 1;"#, 1),
                        "expression": {
                            "nodeType": "Assignment",
                            "operator": "=",
                            "src": src(t, assignment, 1),
                            "leftHandSide": {
                                "nodeType": "IndexAccess",
                                "src": src(t, r#"surface["ping"]"#, 1)
                            },
                            "rightHandSide": {
                                "nodeType": "Literal",
                                "value": "1",
                                "src": src_within(t, assignment, "1", 1)
                            }
                        }
                    }]
                }
            }]
        }]
    })
}

fn sources() -> [Arc<SourceFile>; 2] {
    [
        Arc::new(
            SourceFile::new(0, CALLER_SOL, Some(caller_ast())).with_path("MappingPointerTest.sol"),
        ),
        Arc::new(SourceFile::new(1, LIB_SOL, Some(lib_ast())).with_path("TouchLib.sol")),
    ]
}

fn caller_unit(compiler: &str) -> CompilationUnit {
    let t = CALLER_SOL;
    let call_f = src_within(t, "f();", "f()", 0);
    let run = src(t, "function run() public { f(); }", 0);
    let f = src(t, "function f() internal { TouchLib.touch(surface); }", 0);
    let call_touch = src(t, "TouchLib.touch(surface)", 0);
    let map = [
        format!("{call_f}:-"), // PUSH1 0x04
        ":::i".to_string(),    // JUMP
        format!("{run}:-"),    // STOP
        f.clone(),             // JUMPDEST
        call_touch,            // PUSH1 0x00
        String::new(),         // DELEGATECALL
        f,                     // PUSH1 0x03
        ":::o".to_string(),    // JUMP
    ]
    .join(";");

    let [caller, lib] = sources();
    CompilationUnit::new(
        "MappingPointerTest",
        vec![0x60, 0x04, 0x56, 0x00, 0x5b, 0x60, 0x00, 0xf4, 0x60, 0x03, 0x56],
    )
    .with_source_map(map)
    .with_source(caller)
    .with_source(lib)
    .with_compiler(CompilerIdentity::new("solc", compiler))
}

fn lib_unit(compiler: &str) -> CompilationUnit {
    let t = LIB_SOL;
    let map = [
        format!("{}:-", src(t, r#"{ surface["ping"] = 1; }"#, 1)), // PUSH1 0x00
        src(t, r#"surface["ping"] = 1"#, 1),                      // DUP1
        src(t, TOUCH, 1),                                          // RETURN
    ]
    .join(";");

    let [caller, lib] = sources();
    CompilationUnit::new("TouchLib", vec![0x60, 0x00, 0x80, 0xf3])
        .with_source_map(map)
        .with_source(caller)
        .with_source(lib)
        .with_compiler(CompilerIdentity::new("solc", compiler))
}

fn trace() -> Trace {
    let delegatecall_stack = vec![
        U256::ZERO,
        U256::ZERO,
        U256::ZERO,
        U256::ZERO,
        U256::from_be_slice(LIB.as_slice()),
        U256::from(50_000),
    ];
    Trace::from(vec![
        TraceStep::new(0, "PUSH1", 1),
        TraceStep::new(2, "JUMP", 1),
        TraceStep::new(4, "JUMPDEST", 1),
        TraceStep::new(5, "PUSH1", 1),
        TraceStep::new(7, "DELEGATECALL", 1).with_stack(delegatecall_stack),
        TraceStep::new(0, "PUSH1", 2),
        TraceStep::new(2, "DUP1", 2),
        TraceStep::new(3, "RETURN", 2),
        TraceStep::new(8, "PUSH1", 1),
        TraceStep::new(10, "JUMP", 1),
        TraceStep::new(3, "STOP", 1),
    ])
}

fn build_session(compiler: &str, config: EngineConfig) -> (Session, ContextId, ContextId) {
    let mut registry = ContextRegistry::new();
    let caller = registry.register(caller_unit(compiler), vec![CALLER], ContextKind::Runtime);
    let lib = registry.register(lib_unit(compiler), vec![LIB], ContextKind::Runtime);
    let session = Session::new(config, registry, trace(), Some(caller)).unwrap();
    (session, caller, lib)
}

fn depths(session: &Session) -> Vec<usize> {
    (0..session.len()).map(|index| session.function_depth_at(index)).collect()
}

#[test]
fn test_contexts_follow_the_library_call() {
    soldb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (session, caller, lib) = build_session("0.8.19", EngineConfig::default());

    let contexts: Vec<_> = (0..session.len()).map(|index| session.context_id_at(index)).collect();
    let expected = [vec![Some(caller); 5], vec![Some(lib); 3], vec![Some(caller); 3]].concat();
    assert_eq!(contexts, expected);
    assert_eq!(depths(&session), vec![1, 1, 2, 2, 2, 3, 3, 3, 2, 2, 1]);
}

#[test]
fn test_source_facts_across_files() {
    soldb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (session, _, _) = build_session("0.8.19", EngineConfig::default());
    let mut tree = StateTree::new(Arc::new(session));

    // the state variable is declared ahead of the functions
    let ast = tree.current().source().unwrap().ast.clone().unwrap();
    let state_variable = &ast["nodes"][0]["nodes"][0];
    assert_eq!(state_variable["nodeType"], json!("VariableDeclaration"));
    assert_eq!(state_variable["typeDescriptions"]["typeIdentifier"], json!(MAPPING_TYPE));

    // `f()` is a plain internal call
    assert_eq!(tree.current().node().unwrap().node_type(), Some("FunctionCall"));
    assert!(!tree.is_contract_call());
    assert_eq!(tree.next_mapped().unwrap(), Some(1));

    tree.seek(1).unwrap();
    assert!(tree.will_jump());
    assert_eq!(tree.jump_direction(), "i");
    assert!(tree.is_source_range_final());
    let next = tree.next().unwrap();
    assert_eq!(next.node().unwrap().node_type(), Some("FunctionDefinition"));
    assert!(!next.source_range().is_multiline());

    tree.seek(4).unwrap();
    assert!(tree.will_call());
    assert!(!tree.calls_precompile());
    assert!(tree.is_contract_call());
    assert!(!tree.needs_function_depth_workaround());
    assert!(tree.is_source_range_final());
    assert!(matches!(tree.next(), Err(EngineError::StaleContextRead { cursor: 4 })));

    // inside the library the facts come from the other file
    tree.advance().unwrap();
    let source = tree.current().source().unwrap();
    assert_eq!(source.id, 1);
    assert_eq!(source.path.as_deref(), Some("TouchLib.sol"));
    assert_eq!(tree.current().node().unwrap().node_type(), Some("Block"));
    assert_eq!(tree.read("./pointer").unwrap().as_json(), &json!("/nodes/0/nodes/0/body"));
    assert!(tree.is_source_range_final());
    assert_eq!(tree.current().source_range().lines.start.line, Some(1));
    assert_eq!(tree.function_depth(), 3);

    tree.seek(7).unwrap();
    assert!(tree.will_return());
    assert!(tree.is_source_range_final());
    assert!(tree.snapshot().next.is_none());

    // back in the caller after the call returns
    tree.advance().unwrap();
    assert_eq!(tree.current().node().unwrap().node_type(), Some("FunctionDefinition"));
    assert_eq!(tree.function_depth(), 2);
    tree.seek(10).unwrap();
    assert_eq!(tree.function_depth(), 1);
    assert_eq!(tree.read("/current/willReturn").unwrap().as_bool(), Some(true));
}

#[test]
fn test_source_level_stops() {
    soldb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (session, _, _) = build_session("0.8.19", EngineConfig::default());
    let mut tree = StateTree::new(Arc::new(session));

    let mut stops = Vec::new();
    loop {
        if tree.is_source_range_final() {
            stops.push(tree.cursor());
        }
        if tree.advance().is_err() {
            break;
        }
    }
    // steps 0 and 1 share `f()`, 3 and 4 share `TouchLib.touch(surface)`
    assert_eq!(stops, vec![1, 2, 4, 5, 6, 7, 9, 10]);
}

#[test]
fn test_function_depth_workaround_for_old_compilers() {
    soldb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (session, _, _) = build_session("0.4.24", EngineConfig::default());

    assert!(session.needs_function_depth_workaround_at(4));
    assert!(!session.needs_function_depth_workaround_at(3));
    assert_eq!(depths(&session), vec![1, 1, 2, 2, 2, 3, 3, 3, 3, 3, 2]);

    let tree = StateTree::new(Arc::new(session));
    let fact = tree.read("/current/needsFunctionDepthWorkaround").unwrap();
    assert_eq!(fact.as_bool(), Some(false));

    // the fixed compiler and the disabled workaround both keep plain depths
    let (fixed, _, _) = build_session("0.5.1", EngineConfig::default());
    assert!(!fixed.needs_function_depth_workaround_at(4));
    assert_eq!(depths(&fixed), vec![1, 1, 2, 2, 2, 3, 3, 3, 2, 2, 1]);

    let config = EngineConfig::default().with_compiler_workarounds(false);
    let (disabled, _, _) = build_session("0.4.24", config);
    assert!(!disabled.needs_function_depth_workaround_at(4));
    assert_eq!(depths(&disabled), vec![1, 1, 2, 2, 2, 3, 3, 3, 2, 2, 1]);
}

#[test]
fn test_unknown_root_context() {
    soldb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let mut full = ContextRegistry::new();
    full.register(caller_unit("0.8.19"), vec![CALLER], ContextKind::Runtime);
    let lib = full.register(lib_unit("0.8.19"), vec![LIB], ContextKind::Runtime);

    let mut registry = ContextRegistry::new();
    registry.register(caller_unit("0.8.19"), vec![CALLER], ContextKind::Runtime);
    let err = Session::new(EngineConfig::default(), registry, trace(), Some(lib)).unwrap_err();
    assert!(matches!(err, EngineError::UnknownContext(_)));
}
