//! Resource Registry - Load resource definitions from JSON
//!
//! Paths, response keys and pagination keys for each resource kind live in
//! an embedded JSON file so the enumerators and fetchers stay generic.

use crate::openstack::ServiceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded resource JSON (compiled into the binary)
const RESOURCE_FILE: &str = include_str!("../resources/openstack.json");

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub plural_name: String,
    pub service: ServiceType,
    /// Path of the first list page, relative to the service endpoint
    pub list_path: String,
    /// Key of the record array in a list page
    pub response_path: String,
    /// Key of the `[{rel, href}]` pagination links in a list page
    pub links_path: String,
    /// Detail path, `{id}` is replaced by the percent-encoded identifier
    pub detail_path: String,
    /// Key of the record in a detail response
    pub detail_key: String,
}

impl ResourceDef {
    pub fn detail_path_for(&self, id: &str) -> String {
        self.detail_path
            .replace("{id}", &urlencoding::encode(id))
    }
}

/// Root structure of resources/openstack.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        serde_json::from_str(RESOURCE_FILE)
            .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e))
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// The resource kinds the gateway can query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Vm,
    Network,
    Volume,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Vm, ResourceKind::Network, ResourceKind::Volume];

    /// Registry key
    pub fn key(&self) -> &'static str {
        match self {
            Self::Vm => "vm",
            Self::Network => "network",
            Self::Volume => "volume",
        }
    }

    pub fn def(&self) -> &'static ResourceDef {
        // Every kind has an entry; checked by tests
        get_resource(self.key())
            .unwrap_or_else(|| panic!("No resource definition for {}", self.key()))
    }

    pub fn display_name(&self) -> &'static str {
        &self.def().display_name
    }

    pub fn plural(&self) -> &'static str {
        &self.def().plural_name
    }

    pub fn service(&self) -> ServiceType {
        self.def().service
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
