//! Tool protocol surface
//!
//! - [`registry`] - The six query tools and their dispatch
//! - [`server`] - MCP JSON-RPC over stdio

pub mod registry;
pub mod server;

pub use registry::{Operation, ParamDef, ToolDef, ToolOutput, ToolRegistry, TOOLS};
pub use server::{McpServer, ServerOptions};
