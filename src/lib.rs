//! bio-mcp-bwa Library
//!
//! This library provides the BWA tool-invocation engine and the MCP server
//! that exposes it, including configuration, process supervision and metrics.

pub mod config;
pub mod mcp;
pub mod metrics;
pub mod metrics_server;
pub mod tools;
