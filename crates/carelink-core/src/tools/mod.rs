//! Tool registry shared by the MCP server and the agent delegation tool

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod providers;

pub use providers::ListDoctorsTool;

/// Name, description and JSON input schema of a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Anything that can run tools by name
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String>;
    fn list_tools(&self) -> Vec<ToolDefinition>;
}

/// A single tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<String>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Tools keyed by name; registering a name twice replaces the earlier tool
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<Arc<str>, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name: Arc<str> = Arc::from(handler.name());
        debug!("Registering tool: {}", name);
        if self.tools.insert(name.clone(), handler).is_some() {
            warn!("Tool '{}' registered twice, keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        let handler = self
            .tools
            .get(tool_name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", tool_name))?;

        debug!("Executing tool {} with input {}", tool_name, input);
        handler.execute(input).await.inspect_err(|e| {
            warn!("Tool {} failed: {}", tool_name, e);
        })
    }

    /// Definitions sorted by name so listings are stable
    fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|h| h.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

/// Build an object schema from a `properties` map and the required keys
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSymptomTool;

    #[async_trait]
    impl ToolHandler for EchoSymptomTool {
        fn name(&self) -> &str {
            "echo_symptom"
        }

        fn description(&self) -> &str {
            "Repeats the reported symptom"
        }

        fn input_schema(&self) -> Value {
            json_schema(
                serde_json::json!({
                    "symptom": {"type": "string"}
                }),
                vec!["symptom"],
            )
        }

        async fn execute(&self, input: Value) -> Result<String> {
            let symptom = input
                .get("symptom")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("Missing 'symptom' parameter"))?;
            Ok(format!("reported: {}", symptom))
        }
    }

    struct AlwaysFailsTool;

    #[async_trait]
    impl ToolHandler for AlwaysFailsTool {
        fn name(&self) -> &str {
            "always_fails"
        }

        fn description(&self) -> &str {
            "Fails on every call"
        }

        fn input_schema(&self) -> Value {
            json_schema(serde_json::json!({}), vec![])
        }

        async fn execute(&self, _input: Value) -> Result<String> {
            Err(anyhow!("directory offline"))
        }
    }

    #[tokio::test]
    async fn test_execute_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoSymptomTool));

        let out = registry
            .execute("echo_symptom", serde_json::json!({"symptom": "anxiety"}))
            .await
            .unwrap();
        assert_eq!(out, "reported: anxiety");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nonexistent", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_execute_failing_tool_propagates() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(AlwaysFailsTool));
        let err = registry
            .execute("always_fails", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("directory offline"));
    }

    #[test]
    fn test_list_tools_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoSymptomTool));
        registry.register(Arc::new(AlwaysFailsTool));

        let tools = registry.list_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["always_fails", "echo_symptom"]);
        assert_eq!(tools[1].description, "Repeats the reported symptom");
        assert!(tools[1].input_schema.get("properties").is_some());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoSymptomTool));
        registry.register(Arc::new(EchoSymptomTool));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo_symptom").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_json_schema_helper() {
        let schema = json_schema(
            serde_json::json!({
                "state": {"type": "string"},
                "city": {"type": "string"}
            }),
            vec![],
        );
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["city"].is_object());
        assert!(schema["required"].as_array().unwrap().is_empty());
    }
}
