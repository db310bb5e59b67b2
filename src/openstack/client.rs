//! Service clients
//!
//! A `ServiceClient` is one catalog endpoint (compute, network or volume)
//! bound to the session's token.

use super::http::OpenStackHttpClient;
use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// The three backend services the gateway talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Compute,
    Network,
    Volume,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Network => "network",
            Self::Volume => "volume",
        }
    }

    /// Catalog `type` values accepted for this service, in preference order
    pub fn catalog_types(&self) -> &'static [&'static str] {
        match self {
            Self::Compute => &["compute"],
            Self::Network => &["network"],
            Self::Volume => &["block-storage", "volumev3", "volume"],
        }
    }
}

/// Client for one OpenStack service endpoint
#[derive(Clone)]
pub struct ServiceClient {
    service: ServiceType,
    endpoint: Url,
    token: Arc<str>,
    http: OpenStackHttpClient,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    /// Bind an endpoint URL to a token
    ///
    /// The endpoint gets a trailing slash so that relative paths are appended.
    pub fn new(
        service: ServiceType,
        endpoint: &str,
        token: Arc<str>,
        http: OpenStackHttpClient,
    ) -> Result<Self, url::ParseError> {
        let endpoint = if endpoint.ends_with('/') {
            Url::parse(endpoint)?
        } else {
            Url::parse(&format!("{}/", endpoint))?
        };

        Ok(Self {
            service,
            endpoint,
            token,
            http,
        })
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Build a URL for a path relative to the service endpoint
    pub fn url(&self, path: &str) -> Result<Url, BackendError> {
        self.endpoint
            .join(path.trim_start_matches('/'))
            .map_err(|e| BackendError::Decode(format!("invalid URL for {}: {}", path, e)))
    }

    /// GET an absolute URL (as returned in pagination links)
    pub async fn get_url(&self, url: &str) -> Result<Value, BackendError> {
        self.http.get(url, &self.token).await
    }

    /// GET a path relative to the service endpoint
    pub async fn get(&self, path: &str) -> Result<Value, BackendError> {
        let url = self.url(path)?;
        self.get_url(url.as_str()).await
    }
}
