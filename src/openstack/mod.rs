//! OpenStack API interaction module
//!
//! This module provides the core functionality for talking to an OpenStack
//! control plane: Keystone authentication, the per-service HTTP clients, and
//! the process-wide session binding them together.
//!
//! # Module Structure
//!
//! - [`auth`] - Credentials from `OS_*` variables and the Keystone v3 token exchange
//! - [`client`] - Service clients bound to one catalog endpoint
//! - [`http`] - HTTP utilities for REST API calls
//! - [`session`] - The authenticated session holding compute, network and volume clients
//!
//! # Example
//!
//! ```ignore
//! use openstack_mcp::openstack::{Session, SessionSettings, ServiceType};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let session = Session::establish(&SessionSettings::from_env()).await?;
//!     let servers = session.client(ServiceType::Compute).get("servers/detail").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod session;

pub use auth::{AuthToken, Credentials};
pub use client::{ServiceClient, ServiceType};
pub use http::OpenStackHttpClient;
pub use session::{Session, SessionSettings, DEFAULT_REGION};
