//! MCP (Model Context Protocol) JSON-RPC handler.
//!
//! Reads JSON-RPC 2.0 requests from stdin (one per line) and writes
//! responses to stdout. Logs go to stderr so they never mix with the
//! protocol stream.
//!
//! ## Supported methods
//!
//! | Method              | Description                      |
//! |---------------------|----------------------------------|
//! | `initialize`        | Handshake, returns capabilities  |
//! | `tools/list`        | List available tool definitions  |
//! | `tools/call`        | Execute a tool and return result |
//! | `ping`              | Liveness check                   |
//!
//! Notifications (`notifications/initialized`, `notifications/cancelled`) are
//! acknowledged silently.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::registry::ServerRegistry;
use crate::tools;

const SERVER_NAME: &str = "home-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Run the MCP server on stdio until EOF.
pub async fn run_stdio(registry: ServerRegistry) {
    let reader = BufReader::new(tokio::io::stdin());
    serve(&registry, reader, tokio::io::stdout()).await;
}

/// Process requests from `reader` one at a time, answering on `writer`.
pub async fn serve<R, W>(registry: &ServerRegistry, mut reader: R, mut writer: W)
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("stdin closed, shutting down");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "stdin read error");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(trimmed) {
            Ok(request) => handle_request(&request, registry).await,
            Err(e) => Some(json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {
                    "code": -32700,
                    "message": format!("Parse error: {e}")
                }
            })),
        };

        if let Some(response) = response {
            write_response(&mut writer, &response).await;
        }
    }
}

/// Answer one request. Notifications get no response.
pub async fn handle_request(request: &Value, registry: &ServerRegistry) -> Option<Value> {
    let id = request.get("id").cloned();
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");

    let Some(id) = id else {
        match method {
            "notifications/initialized" | "notifications/cancelled" => {}
            _ => debug!(method, "ignoring unknown notification"),
        }
        return None;
    };

    let response = match method {
        "initialize" => handle_initialize(request),
        "tools/list" => handle_tools_list(registry),
        "tools/call" => handle_tools_call(request, registry).await,
        "ping" => json!({ "jsonrpc": "2.0", "result": {} }),
        _ => {
            warn!(method, "method not found");
            json!({
                "jsonrpc": "2.0",
                "error": {
                    "code": -32601,
                    "message": format!("Method not found: {method}")
                }
            })
        }
    };
    Some(inject_id(response, id))
}

/// Handle `initialize`: protocol version, capabilities, server info.
fn handle_initialize(request: &Value) -> Value {
    if let Some(client) = request.pointer("/params/clientInfo/name").and_then(Value::as_str) {
        info!(client, "client connected");
    }
    json!({
        "jsonrpc": "2.0",
        "result": {
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        }
    })
}

fn handle_tools_list(registry: &ServerRegistry) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": {
            "tools": tools::tool_definitions(registry)
        }
    })
}

/// Handle `tools/call`: dispatch to the tool handler.
async fn handle_tools_call(request: &Value, registry: &ServerRegistry) -> Value {
    let params = request.get("params").cloned().unwrap_or(json!({}));
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    debug!(tool = name, "tools/call");
    let result = tools::handle_tool_call(name, &args, registry).await;

    let mut response_result = json!({
        "content": result.content
    });
    if result.is_error {
        response_result["isError"] = json!(true);
    }
    json!({
        "jsonrpc": "2.0",
        "result": response_result
    })
}

fn inject_id(mut response: Value, id: Value) -> Value {
    response["id"] = id;
    response
}

/// Write one response line and flush.
async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Value) {
    let mut output = serde_json::to_string(response).unwrap_or_default();
    output.push('\n');
    if let Err(e) = writer.write_all(output.as_bytes()).await {
        error!(error = %e, "stdout write error");
    }
    if let Err(e) = writer.flush().await {
        error!(error = %e, "stdout flush error");
    }
}
