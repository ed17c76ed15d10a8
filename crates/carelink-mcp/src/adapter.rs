//! Exposes a ToolRegistry through MCP `tools/list` and `tools/call`

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use carelink_core::tools::{ToolExecutor, ToolRegistry};

use crate::protocol::{McpTool, ToolCallResult};

pub struct McpToolAdapter {
    registry: Arc<ToolRegistry>,
    hidden: Vec<String>,
}

impl McpToolAdapter {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_hidden(registry, Vec::new())
    }

    /// Leave `hidden` tools out of listings and refuse calls to them
    pub fn with_hidden(registry: Arc<ToolRegistry>, hidden: Vec<String>) -> Self {
        Self { registry, hidden }
    }

    fn is_hidden(&self, name: &str) -> bool {
        self.hidden.iter().any(|h| h == name)
    }

    pub fn list_tools(&self) -> Vec<McpTool> {
        self.registry
            .list_tools()
            .into_iter()
            .filter(|t| !self.is_hidden(&t.name))
            .map(|t| McpTool {
                name: t.name,
                description: t.description,
                input_schema: t.input_schema,
            })
            .collect()
    }

    /// Tool failures become `isError` results rather than JSON-RPC errors
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolCallResult {
        if self.is_hidden(name) {
            return ToolCallResult::failure(format!("Tool '{}' is not available via MCP", name));
        }

        debug!("MCP calling tool: {}", name);
        match self.registry.execute(name, arguments).await {
            Ok(output) => ToolCallResult::text(output),
            Err(e) => ToolCallResult::failure(format!("Error: {}", e)),
        }
    }
}
