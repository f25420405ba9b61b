//! MCP (Model Context Protocol) Server Implementation
//!
//! This module exposes the aligner operations to MCP clients over stdio,
//! built directly on Tokio and Serde (no external SDK).
//!
//! # Architecture
//!
//! The implementation is organized into three layers:
//!
//! 1. **Protocol Layer** (`protocol`): JSON-RPC 2.0 message types
//! 2. **Transport Layer** (`transport`): newline-delimited framing
//! 3. **Server Layer** (`server`): method handling and call scheduling

// Protocol layer: JSON-RPC 2.0 message types
pub mod protocol;

// Transport layer: line framing over async streams
pub mod transport;

// Server layer: request handling
pub mod server;

pub use protocol::{McpError, McpMethod, McpRequest, McpResponse, Tool, ToolCallParams};
pub use server::{tool_list, tool_result, McpServer};

// Property-based tests module
#[cfg(test)]
mod proptests;
