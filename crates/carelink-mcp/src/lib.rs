//! MCP (Model Context Protocol) bridge for Carelink
//!
//! The server exposes the tool registry (doctor search) to MCP clients over
//! STDIO; the client launches external MCP servers and wraps their tools as
//! local tool handlers.

pub mod adapter;
pub mod client;
pub mod protocol;
pub mod server;

pub use adapter::McpToolAdapter;
pub use client::McpClient;
pub use server::McpServer;
