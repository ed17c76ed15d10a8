//! Carelink core: configuration and the tool registry shared by the A2A and
//! MCP crates.

pub mod config;
pub mod tools;

pub use config::{AgentConfig, CarelinkConfig, ConfigError, HttpConfig, PollingConfig};
pub use tools::{ToolDefinition, ToolExecutor, ToolHandler, ToolRegistry};
