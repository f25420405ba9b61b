//! Property-Based Tests for the MCP Server
//!
//! Whatever arrives on stdin, the request handler must answer with a
//! well-formed JSON-RPC reply (or stay silent for notifications) and never
//! panic.
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib mcp::proptests
//! ```

use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::mcp::server::{Action, McpServer};
use crate::tools::ToolDispatcher;

const STANDARD_CODES: &[i32] = &[-32700, -32600, -32601, -32602, -32603];

fn server() -> McpServer {
    let config = Config {
        temp_dir: std::env::temp_dir(),
        bwa_path: "/nonexistent/bwa".into(),
        ..Config::default()
    };
    McpServer::new(ToolDispatcher::new(Arc::new(config)), 1)
}

// Helper: Generate arbitrary JSON values
fn arb_json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_id() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<u32>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9-]{1,12}".prop_map(Value::String),
    ]
}

proptest! {
    /// Arbitrary input lines never panic and always yield a standard error code
    #[test]
    fn prop_any_line_gets_wellformed_answer(line in ".*") {
        match server().handle_line(&line) {
            Action::Reply(response) => {
                if let Some(error) = response.error {
                    prop_assert!(STANDARD_CODES.contains(&error.code));
                } else {
                    prop_assert!(response.result.is_some());
                }
            }
            Action::Call { .. } | Action::Ignore => {}
        }
    }

    /// Arbitrary JSON values are either requests or rejected as -32600
    #[test]
    fn prop_json_shapes(value in arb_json_value()) {
        let line = serde_json::to_string(&value).unwrap();
        if let Action::Reply(response) = server().handle_line(&line) {
            if let Some(error) = response.error {
                prop_assert_ne!(error.code, -32700);
            }
        }
    }

    /// Unknown methods with an id get -32601 echoing that id
    #[test]
    fn prop_unknown_method(id in arb_id(), method in "[a-z]{1,10}/[a-z]{1,10}") {
        prop_assume!(method != "tools/list" && method != "tools/call");
        let line = json!({"jsonrpc": "2.0", "id": id, "method": method}).to_string();
        match server().handle_line(&line) {
            Action::Reply(response) => {
                prop_assert_eq!(response.id, id);
                prop_assert_eq!(response.error.map(|e| e.code), Some(-32601));
            }
            other => prop_assert!(false, "unexpected action {:?}", other),
        }
    }

    /// Notifications never get a reply, whatever the method
    #[test]
    fn prop_notifications_are_silent(method in "[a-z/_]{1,24}", params in arb_json_value()) {
        let line = json!({"jsonrpc": "2.0", "method": method, "params": params}).to_string();
        prop_assert!(matches!(server().handle_line(&line), Action::Ignore));
    }

    /// tools/call keeps the id and passes arguments through untouched
    #[test]
    fn prop_tools_call_preserves_id_and_arguments(
        id in arb_id(),
        name in "[a-z_]{1,16}",
        arguments in arb_json_value(),
    ) {
        let line = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments},
        })
        .to_string();
        match server().handle_line(&line) {
            Action::Call { id: call_id, params } => {
                prop_assert_eq!(call_id, id);
                prop_assert_eq!(params.name, name);
                prop_assert_eq!(params.arguments, arguments);
            }
            other => prop_assert!(false, "unexpected action {:?}", other),
        }
    }
}
