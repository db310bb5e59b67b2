//! Error taxonomy
//!
//! `AuthError` is fatal and only surfaces while the session is being
//! established. `BackendError` describes a single failed control-plane call.
//! `ToolError` is what an invocation hands back to the protocol layer.

use crate::resource::ResourceKind;
use thiserror::Error;

/// Failure to establish the authenticated session
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid auth URL {url:?}: {reason}")]
    InvalidAuthUrl { url: String, reason: String },

    #[error("authentication request failed: {0}")]
    Transport(String),

    #[error("credentials rejected by identity service ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("identity service response carried no X-Subject-Token header")]
    MissingToken,

    #[error("malformed token response: {0}")]
    MalformedToken(String),

    #[error("service {service:?} not found in catalog for region {region:?} (interface {interface:?})")]
    ServiceNotFound {
        service: &'static str,
        region: String,
        interface: String,
    },

    #[error("invalid endpoint for service {service:?}: {url}")]
    InvalidEndpoint { service: &'static str, url: String },
}

/// Failure of a single call against compute, network or volume
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("API request failed: {status} {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Status { status: 404, .. })
    }
}

/// Structured failure of a tool invocation
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid parameter {name:?}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("error listing {}: {source}", .kind.plural())]
    Enumeration {
        kind: ResourceKind,
        #[source]
        source: BackendError,
    },

    #[error("{} {id:?} not found", .kind.display_name())]
    NotFound { kind: ResourceKind, id: String },

    #[error("error getting {} details for ID {id}: {source}", .kind.display_name())]
    Fetch {
        kind: ResourceKind,
        id: String,
        #[source]
        source: BackendError,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },
}

impl ToolError {
    /// Stable machine-readable code for the protocol envelope
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::UnknownOperation(_) => "unknown_operation",
            ToolError::InvalidParameter { .. } => "invalid_parameter",
            ToolError::Enumeration { .. } => "enumeration_failed",
            ToolError::NotFound { .. } => "not_found",
            ToolError::Fetch { .. } => "fetch_failed",
            ToolError::Cancelled { .. } => "cancelled",
        }
    }

    /// Kind of resource involved, when the failure came from a handler
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            ToolError::Enumeration { kind, .. }
            | ToolError::NotFound { kind, .. }
            | ToolError::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Identifier the failure refers to, for detail fetches
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            ToolError::NotFound { id, .. } | ToolError::Fetch { id, .. } => Some(id),
            _ => None,
        }
    }

    /// True for caller-contract violations caught before dispatch
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ToolError::UnknownOperation(_) | ToolError::InvalidParameter { .. }
        )
    }
}
