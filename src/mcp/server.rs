//! MCP stdio server
//!
//! Exposes the five aligner operations as MCP tools. Requests are read one
//! line at a time; `tools/call` requests run on their own tasks behind a
//! semaphore, and every response goes through a single writer task so lines
//! never interleave. Responses to concurrent calls may arrive out of order;
//! clients match them by id.

use crate::mcp::protocol::{
    InitializeResult, McpError, McpMethod, McpRequest, McpResponse, ServerInfo, Tool,
    ToolCallParams, MCP_PROTOCOL_VERSION,
};
use crate::mcp::transport::{Frame, LineReader, LineWriter};
use crate::tools::{InvocationResult, ToolDispatcher};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const SERVER_NAME: &str = "bio-mcp-bwa";

/// What to do with one incoming line
#[derive(Debug)]
pub(crate) enum Action {
    Reply(McpResponse),
    Call { id: Value, params: ToolCallParams },
    Ignore,
}

#[derive(Debug, Clone)]
pub struct McpServer {
    dispatcher: ToolDispatcher,
    permits: Arc<Semaphore>,
}

impl McpServer {
    /// Create a server admitting at most `max_concurrent` tool calls at once
    pub fn new(dispatcher: ToolDispatcher, max_concurrent: usize) -> Self {
        Self {
            dispatcher,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Serve on the process's stdin and stdout
    pub async fn serve_stdio(self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve until `reader` reaches EOF, then wait for in-flight calls
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!(
            tools = self.dispatcher.operations().len(),
            max_concurrent = self.permits.available_permits(),
            "MCP server ready"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<McpResponse>();
        let writer_task = tokio::spawn(async move {
            let mut writer = LineWriter::new(writer);
            while let Some(response) = rx.recv().await {
                writer.send(&response).await?;
            }
            Ok::<_, anyhow::Error>(())
        });

        let mut lines = LineReader::new(reader);
        let mut calls = JoinSet::new();

        loop {
            tokio::select! {
                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    if let Err(e) = joined {
                        error!("Tool call task failed: {}", e);
                    }
                }
                message = lines.next_message() => {
                    let Some(frame) = message? else { break };
                    let action = match frame {
                        Frame::Text(line) => self.handle_line(&line),
                        Frame::Malformed(e) => {
                            warn!("Undecodable line from client: {}", e);
                            Action::Reply(McpResponse::err(None, McpError::parse_error(e)))
                        }
                    };
                    match action {
                        Action::Reply(response) => {
                            if tx.send(response).is_err() {
                                break;
                            }
                        }
                        Action::Call { id, params } => {
                            calls.spawn(self.clone().call_tool(id, params, tx.clone()));
                        }
                        Action::Ignore => {}
                    }
                }
            }
        }

        debug!(in_flight = calls.len(), "Input closed, waiting for running calls");
        while let Some(joined) = calls.join_next().await {
            if let Err(e) = joined {
                error!("Tool call task failed: {}", e);
            }
        }
        drop(tx);

        writer_task
            .await
            .context("MCP writer task panicked")?
            .context("MCP writer failed")?;
        info!("MCP server stopped");
        Ok(())
    }

    async fn call_tool(self, id: Value, params: ToolCallParams, tx: mpsc::UnboundedSender<McpResponse>) {
        let response = match self.permits.clone().acquire_owned().await {
            Ok(_permit) => {
                let result = self.dispatcher.dispatch(&params.name, &params.arguments).await;
                McpResponse::ok(id, tool_result(&result))
            }
            Err(_) => McpResponse::err(Some(id), McpError::internal_error("server is shutting down")),
        };
        if tx.send(response).is_err() {
            warn!(tool = %params.name, "Client gone before the response could be sent");
        }
    }

    pub(crate) fn handle_line(&self, line: &str) -> Action {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Malformed JSON from client: {}", e);
                return Action::Reply(McpResponse::err(None, McpError::parse_error(e.to_string())));
            }
        };

        let request = match McpRequest::from_value(value) {
            Ok(request) => request,
            Err((id, error)) => return Action::Reply(McpResponse::err(id, error)),
        };

        let method = McpMethod::from(request.method.as_str());
        let Some(id) = request.id else {
            debug!(method = %request.method, "Notification");
            return Action::Ignore;
        };

        match method {
            McpMethod::Initialize => Action::Reply(McpResponse::ok(id, initialize_result())),
            McpMethod::Ping => Action::Reply(McpResponse::ok(id, json!({}))),
            McpMethod::ToolsList => Action::Reply(McpResponse::ok(id, json!({ "tools": tool_list() }))),
            McpMethod::ToolsCall => {
                let params = request.params.unwrap_or_else(|| json!({}));
                match serde_json::from_value::<ToolCallParams>(params) {
                    Ok(params) => Action::Call { id, params },
                    Err(e) => Action::Reply(McpResponse::err(
                        Some(id),
                        McpError::invalid_params("Invalid params for tools/call")
                            .with_data(json!({ "details": e.to_string() })),
                    )),
                }
            }
            McpMethod::Initialized | McpMethod::Custom(_) => Action::Reply(McpResponse::err(
                Some(id),
                McpError::method_not_found(method.as_str()),
            )),
        }
    }
}

fn initialize_result() -> Value {
    let result = InitializeResult {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: json!({ "tools": { "listChanged": false } }),
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };
    serde_json::to_value(result).unwrap_or_else(|_| json!({}))
}

/// MCP tool definitions for every catalog operation
pub fn tool_list() -> Vec<Tool> {
    crate::tools::catalog::catalog()
        .iter()
        .map(|spec| Tool {
            name: spec.name().to_string(),
            description: spec.description.to_string(),
            input_schema: spec.input_schema(),
        })
        .collect()
}

/// MCP `tools/call` result: a text summary plus the structured outcome
pub fn tool_result(result: &InvocationResult) -> Value {
    let structured = serde_json::to_value(result).unwrap_or_else(|e| {
        error!("Failed to serialize invocation result: {}", e);
        Value::Null
    });
    json!({
        "content": [{ "type": "text", "text": result.summary() }],
        "structuredContent": structured,
        "isError": !result.is_success()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

    fn server() -> McpServer {
        let dir = std::env::temp_dir();
        let config = Config {
            temp_dir: dir,
            bwa_path: "/nonexistent/bwa".into(),
            ..Config::default()
        };
        McpServer::new(ToolDispatcher::new(Arc::new(config)), 2)
    }

    /// Feed `input` to a fresh server and collect every response line
    async fn run(input: &str) -> Vec<Value> {
        let (mut client_w, server_r) = tokio::io::duplex(64 * 1024);
        let (server_w, client_r) = tokio::io::duplex(64 * 1024);

        let task = tokio::spawn(server().serve(BufReader::new(server_r), server_w));
        client_w.write_all(input.as_bytes()).await.unwrap();
        drop(client_w);

        let mut responses = Vec::new();
        let mut lines = BufReader::new(client_r).lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            responses.push(serde_json::from_str(&line).unwrap());
        }
        task.await.unwrap().unwrap();
        responses
    }

    fn reply(value: &Value) -> McpResponse {
        serde_json::from_value(value.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_tools_list() {
        let responses = run(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(responses[0]["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert!(responses[0]["result"]["capabilities"]["tools"].is_object());

        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["bwa_index", "bwa_mem", "bwa_aln", "bwa_samse", "bwa_sampe"]);
        assert_eq!(tools[1]["inputSchema"]["type"], "object");
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let responses = run(concat!(
            "{not json\n",
            "[1,2,3]\n",
            r#"{"jsonrpc":"2.0","id":3}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"arguments":{}}}"#,
            "\n",
        ))
        .await;

        let codes: Vec<i32> = responses
            .iter()
            .map(|r| reply(r).error.unwrap().code)
            .collect();
        assert_eq!(codes, vec![-32700, -32600, -32600, -32601, -32602]);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[2]["id"], 3);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_stop_server() {
        let (mut client_w, server_r) = tokio::io::duplex(4096);
        let (server_w, client_r) = tokio::io::duplex(4096);

        let task = tokio::spawn(server().serve(BufReader::new(server_r), server_w));
        client_w.write_all(b"\xff\xfe\n").await.unwrap();
        client_w
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        drop(client_w);

        let mut responses = Vec::new();
        let mut lines = BufReader::new(client_r).lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            responses.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        task.await.unwrap().unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(reply(&responses[0]).error.unwrap().code, -32700);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[1]["id"], 7);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_ping_and_unknown_notifications() {
        let responses = run(concat!(
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#,
            "\n",
        ))
        .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], "p");
        assert_eq!(responses[0]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_tool_call_failure_is_tool_error_not_rpc_error() {
        let responses = run(concat!(
            r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"bwa_mem","arguments":{}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":10,"method":"tools/call","params":{"name":"bwa_bogus"}}"#,
            "\n",
        ))
        .await;
        assert_eq!(responses.len(), 2);

        for response in &responses {
            let result = &response["result"];
            assert_eq!(result["isError"], true);
            assert_eq!(result["structuredContent"]["status"], "failure");
            assert!(result["content"][0]["text"].as_str().unwrap().contains("failed"));
        }

        let by_id = |id: i64| responses.iter().find(|r| r["id"] == id).unwrap();
        assert_eq!(by_id(9)["result"]["structuredContent"]["kind"], "missing_parameter");
        assert_eq!(by_id(10)["result"]["structuredContent"]["kind"], "unknown_operation");
    }

    #[test]
    fn test_tool_result_shape() {
        let result = InvocationResult::failure("bwa_index", crate::tools::FailureKind::Timeout, "killed");
        let value = tool_result(&result);
        assert_eq!(value["isError"], true);
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["structuredContent"]["kind"], "timeout");
    }
}
