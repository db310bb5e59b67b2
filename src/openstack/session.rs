//! Authenticated session
//!
//! One `Session` per process: a single Keystone round-trip, then three
//! service clients bound to the same token and region. The session is
//! read-only once built and is shared by reference counting.

use super::auth::{authenticate, AuthToken, Credentials};
use super::client::{ServiceClient, ServiceType};
use super::http::OpenStackHttpClient;
use crate::error::AuthError;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Region used when no source provides one
pub const DEFAULT_REGION: &str = "RegionOne";

/// Endpoint interface used when none is configured
pub const DEFAULT_INTERFACE: &str = "public";

/// Inputs for establishing a session besides the credentials themselves
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    /// Region from the command line, wins over everything else
    pub region_override: Option<String>,
    /// `OS_REGION_NAME`
    pub region_env: Option<String>,
    /// Region from the config file
    pub region_config: Option<String>,
    /// Endpoint interface (`public`, `internal`, `admin`)
    pub interface: Option<String>,
}

impl SessionSettings {
    /// Settings with the region and interface read from the environment
    pub fn from_env() -> Self {
        Self {
            region_env: std::env::var("OS_REGION_NAME").ok(),
            interface: std::env::var("OS_INTERFACE").ok(),
            ..Self::default()
        }
    }

    /// Resolve the region: CLI > `OS_REGION_NAME` > config > default
    pub fn resolve_region(&self) -> String {
        let chosen = [
            self.region_override.as_deref(),
            self.region_env.as_deref(),
            self.region_config.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|r| !r.is_empty());

        match chosen {
            Some(region) => region.to_string(),
            None => {
                tracing::warn!("OS_REGION_NAME not set, using default region {}", DEFAULT_REGION);
                DEFAULT_REGION.to_string()
            }
        }
    }

    pub fn resolve_interface(&self) -> String {
        self.interface
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(DEFAULT_INTERFACE)
            .to_string()
    }
}

/// The process-wide authenticated binding to the control plane
#[derive(Debug)]
pub struct Session {
    region: String,
    interface: String,
    expires_at: Option<DateTime<Utc>>,
    compute: ServiceClient,
    network: ServiceClient,
    volume: ServiceClient,
}

impl Session {
    /// Establish a session from the process environment
    pub async fn establish(settings: &SessionSettings) -> Result<Self, AuthError> {
        let credentials = Credentials::from_env()?;
        Self::establish_with(&credentials, settings).await
    }

    /// Establish a session from explicit credentials
    pub async fn establish_with(
        credentials: &Credentials,
        settings: &SessionSettings,
    ) -> Result<Self, AuthError> {
        let region = settings.resolve_region();
        let interface = settings.resolve_interface();

        let http = OpenStackHttpClient::new().map_err(|e| AuthError::Transport(e.to_string()))?;
        let token = authenticate(&http, credentials).await?;

        let session = Self::from_token(&token, &region, &interface, http)?;
        tracing::info!(
            "Authenticated with OpenStack [region: {}, interface: {}]",
            session.region,
            session.interface
        );
        Ok(session)
    }

    /// Bind the three service clients from a token's catalog
    pub fn from_token(
        token: &AuthToken,
        region: &str,
        interface: &str,
        http: OpenStackHttpClient,
    ) -> Result<Self, AuthError> {
        let shared_token: Arc<str> = Arc::from(token.value.as_str());

        let bind = |service: ServiceType| -> Result<ServiceClient, AuthError> {
            let url = token
                .endpoint_for(service.catalog_types(), region, interface)
                .ok_or_else(|| {
                    tracing::error!("{} service not found in catalog", service.as_str());
                    AuthError::ServiceNotFound {
                        service: service.as_str(),
                        region: region.to_string(),
                        interface: interface.to_string(),
                    }
                })?;
            tracing::debug!("{} endpoint: {}", service.as_str(), url);
            ServiceClient::new(service, url, shared_token.clone(), http.clone()).map_err(|_| {
                AuthError::InvalidEndpoint {
                    service: service.as_str(),
                    url: url.to_string(),
                }
            })
        };

        Ok(Self {
            compute: bind(ServiceType::Compute)?,
            network: bind(ServiceType::Network)?,
            volume: bind(ServiceType::Volume)?,
            region: region.to_string(),
            interface: interface.to_string(),
            expires_at: token.expires_at,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Token expiry reported by the identity service
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn client(&self, service: ServiceType) -> &ServiceClient {
        match service {
            ServiceType::Compute => &self.compute,
            ServiceType::Network => &self.network,
            ServiceType::Volume => &self.volume,
        }
    }
}
