//! Read-only OpenStack gateway exposed as MCP tools.
//!
//! A single authenticated [`openstack::Session`] is built at startup and
//! shared by every tool invocation routed through [`tools::ToolRegistry`].

pub mod config;
pub mod error;
pub mod openstack;
pub mod resource;
pub mod tools;
