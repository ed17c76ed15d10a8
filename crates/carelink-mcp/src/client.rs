//! MCP client: spawns an external MCP server and calls its tools

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use carelink_core::config::McpServerConfig;
use carelink_core::tools::ToolHandler;

use crate::protocol::{McpTool, PROTOCOL_VERSION, ToolCallResult};

const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Both pipe ends sit behind one lock so a response is always read by the
/// task that sent the matching request.
struct Pipe {
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
}

pub struct McpClient {
    name: String,
    child: Mutex<Option<Child>>,
    pipe: Mutex<Pipe>,
    next_id: AtomicU64,
}

impl McpClient {
    /// Spawn the server process and complete the initialize handshake
    pub async fn connect(config: &McpServerConfig) -> Result<Arc<Self>> {
        info!("Connecting to MCP server: {} ({})", config.name, config.command);

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn MCP server: {}", config.command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Failed to capture MCP server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to capture MCP server stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            let server_name = config.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        warn!("MCP server '{}' stderr: {}", server_name, line);
                    }
                }
            });
        }

        let client = Arc::new(Self {
            name: config.name.clone(),
            child: Mutex::new(Some(child)),
            pipe: Mutex::new(Pipe {
                stdin,
                reader: BufReader::new(stdout),
            }),
            next_id: AtomicU64::new(1),
        });

        tokio::time::timeout(INITIALIZE_TIMEOUT, client.initialize())
            .await
            .map_err(|_| {
                anyhow!(
                    "MCP server '{}' initialize timed out after {}s",
                    client.name,
                    INITIALIZE_TIMEOUT.as_secs()
                )
            })??;

        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        let result = self
            .request(
                "initialize",
                serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "carelink",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;
        debug!("MCP initialize response: {}", result);

        self.notify("notifications/initialized").await?;
        info!("MCP client connected to {}", self.name);
        Ok(())
    }

    /// Tools offered by the server, named `<server>:<tool>`
    pub async fn discover_tools(self: &Arc<Self>) -> Result<Vec<Arc<dyn ToolHandler>>> {
        let result = self.request("tools/list", serde_json::json!({})).await?;
        let tools: Vec<McpTool> = match result.get("tools") {
            Some(tools) => serde_json::from_value(tools.clone())
                .with_context(|| format!("Invalid tools/list result from {}", self.name))?,
            None => Vec::new(),
        };

        info!("Discovered {} tools from MCP server {}", tools.len(), self.name);

        Ok(tools
            .into_iter()
            .map(|tool| {
                Arc::new(RemoteMcpTool {
                    name: format!("{}:{}", self.name, tool.name),
                    remote_name: tool.name,
                    description: tool.description,
                    schema: tool.input_schema,
                    client: Arc::clone(self),
                }) as Arc<dyn ToolHandler>
            })
            .collect())
    }

    /// Call `name` and return its text content; `isError` results are errors
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let result = self
            .request(
                "tools/call",
                serde_json::json!({
                    "name": name,
                    "arguments": arguments,
                }),
            )
            .await?;

        let result: ToolCallResult = serde_json::from_value(result)
            .with_context(|| format!("Invalid tools/call result for {}", name))?;
        let text = result.joined_text();
        if result.is_error {
            bail!("MCP tool '{}' failed: {}", name, text);
        }
        Ok(text)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))? + "\n";

        let mut pipe = self.pipe.lock().await;
        pipe.stdin.write_all(line.as_bytes()).await?;
        pipe.stdin.flush().await?;

        let response = tokio::time::timeout(REQUEST_TIMEOUT, read_response(&mut pipe.reader, id))
            .await
            .map_err(|_| {
                anyhow!(
                    "MCP request {} timed out after {}s",
                    method,
                    REQUEST_TIMEOUT.as_secs()
                )
            })??;
        drop(pipe);

        if let Some(error) = response.get("error") {
            let msg = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            bail!("MCP error: {}", msg);
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let line = serde_json::to_string(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        }))? + "\n";

        let mut pipe = self.pipe.lock().await;
        pipe.stdin.write_all(line.as_bytes()).await?;
        pipe.stdin.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            let _ = child.kill().await;
            info!("MCP server '{}' stopped", self.name);
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.try_lock()
            && let Some(ref mut child) = *guard
        {
            let _ = child.start_kill();
        }
    }
}

/// Skips notifications and unrelated lines until the response for `expected_id`
async fn read_response(reader: &mut BufReader<ChildStdout>, expected_id: u64) -> Result<Value> {
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            bail!("MCP server closed connection");
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let msg: Value = serde_json::from_str(line).with_context(|| {
            format!(
                "Invalid JSON from MCP server: {}",
                line.chars().take(100).collect::<String>()
            )
        })?;

        if msg.get("id").and_then(|i| i.as_u64()) == Some(expected_id) {
            return Ok(msg);
        }
        debug!("MCP notification: {}", line.chars().take(200).collect::<String>());
    }
}

/// A tool living in an external MCP server
pub struct RemoteMcpTool {
    name: String,
    remote_name: String,
    description: String,
    schema: Value,
    client: Arc<McpClient>,
}

#[async_trait]
impl ToolHandler for RemoteMcpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, input: Value) -> Result<String> {
        debug!("Executing MCP tool {} (remote: {})", self.name, self.remote_name);
        self.client.call_tool(&self.remote_name, input).await
    }
}
