//! Resource abstraction layer
//!
//! Listing and describing OpenStack resources, driven by the definitions in
//! `src/resources/openstack.json`.
//!
//! # Architecture
//!
//! - [`registry`] - Loads resource definitions and names the resource kinds
//! - [`pager`] - Lazy page stream over OpenStack `*_links` pagination
//! - [`fetcher`] - Enumerators and detail fetchers built on the session
//! - [`summary`] - Minimal per-kind projections returned by list operations
//!
//! # Example
//!
//! ```ignore
//! use openstack_mcp::resource::{list_vms, ListOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example(session: &openstack_mcp::openstack::Session) -> anyhow::Result<()> {
//!     let vms = list_vms(session, &ListOptions::default(), &CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

mod fetcher;
mod pager;
mod registry;
mod summary;

pub use fetcher::{
    describe_resource, fetch_resources, list_networks, list_vms, list_volumes, ListOptions,
};
pub use pager::pages;
pub use registry::{get_registry, get_resource, ResourceConfig, ResourceDef, ResourceKind};
pub use summary::{NetworkSummary, VmSummary, VolumeSummary};
