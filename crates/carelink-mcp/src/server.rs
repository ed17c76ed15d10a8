//! MCP server over STDIO
//!
//! Newline-delimited JSON-RPC requests in, responses out. Notifications never
//! get a response.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::adapter::McpToolAdapter;
use crate::protocol::*;

pub struct McpServer {
    adapter: McpToolAdapter,
    info: ServerInfo,
}

impl McpServer {
    pub fn new(adapter: McpToolAdapter, name: impl Into<String>) -> Self {
        Self {
            adapter,
            info: ServerInfo {
                name: name.into(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub async fn serve_stdio(&self) -> Result<()> {
        info!("MCP server '{}' starting on STDIO", self.info.name);
        self.serve(io::stdin(), io::stdout()).await?;
        info!("MCP server STDIO closed");
        Ok(())
    }

    /// Serve requests from `input` until it reaches EOF
    pub async fn serve<R, W>(&self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!("Non UTF-8 input line: {}", e);
                    let resp = JsonRpcResponse::error(
                        Value::Null,
                        PARSE_ERROR,
                        format!("Parse error: invalid UTF-8: {}", e),
                    );
                    write_response(&mut output, &resp).await?;
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            debug!("MCP received: {}", line.chars().take(200).collect::<String>());

            let request: JsonRpcRequest = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Invalid JSON-RPC request: {}", e);
                    let resp =
                        JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
                    write_response(&mut output, &resp).await?;
                    continue;
                }
            };

            if let Some(resp) = self.handle_request(request).await {
                write_response(&mut output, &resp).await?;
            }
        }

        Ok(())
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION,
                    capabilities: ServerCapabilities {
                        tools: ToolsCapability {
                            list_changed: false,
                        },
                    },
                    server_info: self.info.clone(),
                };
                Some(respond(id, &result))
            }

            "notifications/initialized" => {
                info!("MCP client initialized");
                None
            }

            "tools/list" => {
                let tools = self.adapter.list_tools();
                info!("MCP tools/list: returning {} tools", tools.len());
                Some(JsonRpcResponse::success(id, serde_json::json!({ "tools": tools })))
            }

            "tools/call" => {
                let params: ToolCallParams = match serde_json::from_value(request.params) {
                    Ok(p) => p,
                    Err(e) => {
                        return Some(JsonRpcResponse::error(
                            id,
                            INVALID_PARAMS,
                            format!("Invalid tools/call params: {}", e),
                        ));
                    }
                };

                info!("MCP tools/call: {}", params.name);
                let arguments = match params.arguments {
                    Value::Null => serde_json::json!({}),
                    args => args,
                };
                let result = self.adapter.call_tool(&params.name, arguments).await;
                Some(respond(id, &result))
            }

            "ping" => Some(JsonRpcResponse::success(id, serde_json::json!({}))),

            method => {
                warn!("MCP unknown method: {}", method);
                if request.id.is_none() {
                    None
                } else {
                    Some(JsonRpcResponse::error(
                        id,
                        METHOD_NOT_FOUND,
                        format!("Unknown method: {}", method),
                    ))
                }
            }
        }
    }
}

fn respond<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Failed to encode result: {}", e)),
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<()> {
    let json = serde_json::to_string(response).context("Failed to serialize response")?;
    debug!("MCP sending: {}", json.chars().take(200).collect::<String>());
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink_core::tools::{ListDoctorsTool, ToolRegistry};
    use std::sync::Arc;

    fn make_server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(
            ListDoctorsTool::new("/nonexistent/doctors.json").unwrap(),
        ));
        McpServer::new(McpToolAdapter::new(Arc::new(registry)), "doctorserver")
    }

    async fn exchange(input: &str) -> Vec<Value> {
        let server = make_server();
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_handshake_and_list() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#, "\n",
        );
        let responses = exchange(input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "doctorserver");
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"]["tools"][0]["name"], "list_doctors");
        assert_eq!(
            responses[1]["result"]["tools"][0]["inputSchema"]["type"],
            "object"
        );
    }

    #[tokio::test]
    async fn test_tools_call() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"list_doctors"}}"#,
            "\n"
        );
        let responses = exchange(input).await;
        assert_eq!(responses[0]["id"], "a");
        let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Please provide at least a state or a city"));
        assert!(responses[0]["result"].get("isError").is_none());
    }

    #[tokio::test]
    async fn test_tools_call_missing_name() {
        let responses =
            exchange("{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\",\"params\":{}}\n")
                .await;
        assert_eq!(responses[0]["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let responses = exchange("{not json\n").await;
        assert_eq!(responses.len(), 1);
        assert!(responses[0]["id"].is_null());
        assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_serving() {
        let server = make_server();
        let mut input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n".to_vec();
        input.extend_from_slice(&[0xff, 0xfe, b'\n']);
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n");

        let mut output = Vec::new();
        server.serve(input.as_slice(), &mut output).await.unwrap();
        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], PARSE_ERROR);
        assert!(responses[1]["id"].is_null());
        assert_eq!(responses[2]["id"], 2);
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let responses = exchange("{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"ping\"}").await;
        assert_eq!(responses[0]["id"], 9);
    }

    #[tokio::test]
    async fn test_ping() {
        let responses = exchange("{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"ping\"}\n").await;
        assert_eq!(responses[0]["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"notifications/whatever"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#, "\n",
        );
        let responses = exchange(input).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 5);
        assert_eq!(responses[0]["error"]["code"], METHOD_NOT_FOUND);
    }
}
