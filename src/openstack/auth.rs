//! OpenStack Authentication
//!
//! Reads credentials from the `OS_*` environment variables understood by the
//! OpenStack CLI and exchanges them for a Keystone v3 token.

use super::http::{sanitize_for_log, OpenStackHttpClient, SUBJECT_TOKEN_HEADER};
use crate::error::AuthError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

/// Domain assumed when neither a user nor a project domain is provided
const DEFAULT_DOMAIN: &str = "Default";

/// A name-or-id reference, as Keystone accepts for users, projects and domains
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ident {
    Id(String),
    Name(String),
}

impl Ident {
    fn to_json(&self) -> Value {
        match self {
            Ident::Id(id) => json!({ "id": id }),
            Ident::Name(name) => json!({ "name": name }),
        }
    }
}

/// Identity method used to obtain the token
#[derive(Clone, PartialEq, Eq)]
pub enum Method {
    Password {
        user: Ident,
        user_domain: Ident,
        password: String,
    },
    ApplicationCredential {
        id: String,
        secret: String,
    },
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Password {
                user, user_domain, ..
            } => f
                .debug_struct("Password")
                .field("user", user)
                .field("user_domain", user_domain)
                .finish_non_exhaustive(),
            Method::ApplicationCredential { id, .. } => f
                .debug_struct("ApplicationCredential")
                .field("id", id)
                .finish_non_exhaustive(),
        }
    }
}

/// Project scope for password authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectScope {
    pub project: Ident,
    /// Only needed when the project is referenced by name
    pub domain: Option<Ident>,
}

/// Credential material resolved from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub auth_url: Url,
    pub method: Method,
    pub scope: Option<ProjectScope>,
}

impl Credentials {
    /// Read credentials from the process environment
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary variable lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|k| var(*k));

        let raw_url = var("OS_AUTH_URL").ok_or(AuthError::MissingCredential("OS_AUTH_URL"))?;
        let auth_url = normalize_auth_url(&raw_url)?;

        let domain_from = |id_keys: &[&str], name_keys: &[&str]| -> Option<Ident> {
            first(id_keys)
                .map(Ident::Id)
                .or_else(|| first(name_keys).map(Ident::Name))
        };

        let method = match (
            var("OS_APPLICATION_CREDENTIAL_ID"),
            var("OS_APPLICATION_CREDENTIAL_SECRET"),
        ) {
            (Some(id), Some(secret)) => Method::ApplicationCredential { id, secret },
            (Some(_), None) => {
                return Err(AuthError::MissingCredential(
                    "OS_APPLICATION_CREDENTIAL_SECRET",
                ))
            }
            (None, Some(_)) => {
                return Err(AuthError::MissingCredential("OS_APPLICATION_CREDENTIAL_ID"))
            }
            _ => {
                let user = var("OS_USER_ID")
                    .map(Ident::Id)
                    .or_else(|| var("OS_USERNAME").map(Ident::Name))
                    .ok_or(AuthError::MissingCredential("OS_USERNAME"))?;
                let password =
                    var("OS_PASSWORD").ok_or(AuthError::MissingCredential("OS_PASSWORD"))?;
                let user_domain = domain_from(
                    &["OS_USER_DOMAIN_ID", "OS_DOMAIN_ID"],
                    &["OS_USER_DOMAIN_NAME", "OS_DOMAIN_NAME"],
                )
                .unwrap_or_else(|| Ident::Name(DEFAULT_DOMAIN.to_string()));
                Method::Password {
                    user,
                    user_domain,
                    password,
                }
            }
        };

        // Application credentials carry their own scope
        let scope = match method {
            Method::ApplicationCredential { .. } => None,
            Method::Password { .. } => {
                if let Some(id) = first(&["OS_PROJECT_ID", "OS_TENANT_ID"]) {
                    Some(ProjectScope {
                        project: Ident::Id(id),
                        domain: None,
                    })
                } else {
                    first(&["OS_PROJECT_NAME", "OS_TENANT_NAME"]).map(|name| ProjectScope {
                        project: Ident::Name(name),
                        domain: Some(
                            domain_from(
                                &["OS_PROJECT_DOMAIN_ID", "OS_DOMAIN_ID"],
                                &["OS_PROJECT_DOMAIN_NAME", "OS_DOMAIN_NAME"],
                            )
                            .unwrap_or_else(|| Ident::Name(DEFAULT_DOMAIN.to_string())),
                        ),
                    })
                }
            }
        };

        Ok(Self {
            auth_url,
            method,
            scope,
        })
    }

    /// Keystone v3 token request body
    pub fn token_request(&self) -> Value {
        let identity = match &self.method {
            Method::Password {
                user,
                user_domain,
                password,
            } => {
                let mut user_json = user.to_json();
                user_json["password"] = json!(password);
                if matches!(user, Ident::Name(_)) {
                    user_json["domain"] = user_domain.to_json();
                }
                json!({
                    "methods": ["password"],
                    "password": { "user": user_json }
                })
            }
            Method::ApplicationCredential { id, secret } => json!({
                "methods": ["application_credential"],
                "application_credential": { "id": id, "secret": secret }
            }),
        };

        let mut auth = json!({ "identity": identity });
        if let Some(scope) = &self.scope {
            let mut project = scope.project.to_json();
            if let Some(domain) = &scope.domain {
                project["domain"] = domain.to_json();
            }
            auth["scope"] = json!({ "project": project });
        }

        json!({ "auth": auth })
    }

    /// `POST /v3/auth/tokens` endpoint
    pub fn tokens_url(&self) -> Result<Url, AuthError> {
        self.auth_url
            .join("auth/tokens")
            .map_err(|e| AuthError::InvalidAuthUrl {
                url: self.auth_url.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Ensure the auth URL points at the v3 API and ends with a slash so that
/// relative joins append instead of replacing the last segment
fn normalize_auth_url(raw: &str) -> Result<Url, AuthError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_version = if trimmed.ends_with("/v3") {
        format!("{}/", trimmed)
    } else {
        format!("{}/v3/", trimmed)
    };

    let url = Url::parse(&with_version).map_err(|e| AuthError::InvalidAuthUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AuthError::InvalidAuthUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {:?}", url.scheme()),
        });
    }

    Ok(url)
}

/// One endpoint of a catalog entry
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

/// One service of the token's catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: TokenInfo,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

/// An issued Keystone token and its service catalog
#[derive(Clone)]
pub struct AuthToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub catalog: Vec<CatalogEntry>,
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("expires_at", &self.expires_at)
            .field("catalog", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl AuthToken {
    /// Find the endpoint URL for a service in the given region and interface
    pub fn endpoint_for(
        &self,
        service_types: &[&str],
        region: &str,
        interface: &str,
    ) -> Option<&str> {
        service_types.iter().find_map(|wanted| {
            self.catalog
                .iter()
                .filter(|entry| entry.service_type == *wanted)
                .flat_map(|entry| entry.endpoints.iter())
                .find(|ep| {
                    ep.interface.eq_ignore_ascii_case(interface)
                        && (ep.region_id.as_deref() == Some(region)
                            || ep.region.as_deref() == Some(region))
                })
                .map(|ep| ep.url.as_str())
        })
    }
}

/// Exchange credentials for a token: the one identity round-trip per process
pub async fn authenticate(
    http: &OpenStackHttpClient,
    credentials: &Credentials,
) -> Result<AuthToken, AuthError> {
    let url = credentials.tokens_url()?;
    tracing::info!("Authenticating against {}", credentials.auth_url);

    let response = http
        .post_raw(url.as_str(), &credentials.token_request())
        .await
        .map_err(|e| AuthError::Transport(e.without_url().to_string()))?;

    if !(200..300).contains(&response.status) {
        tracing::error!(
            "Identity service rejected credentials: {} - {}",
            response.status,
            sanitize_for_log(&response.body)
        );
        let message = serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(sanitize_for_log)
            })
            .unwrap_or_default();
        return Err(AuthError::Rejected {
            status: response.status,
            message,
        });
    }

    let value = response
        .headers
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingToken)?
        .to_string();

    let body: TokenBody = serde_json::from_str(&response.body)
        .map_err(|e| AuthError::MalformedToken(e.to_string()))?;

    let expires_at = body
        .token
        .expires_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    tracing::debug!(
        "Token issued with {} catalog entries, expires at {:?}",
        body.token.catalog.len(),
        expires_at
    );

    Ok(AuthToken {
        value,
        expires_at,
        catalog: body.token.catalog,
    })
}
