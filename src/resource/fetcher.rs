//! Resource Fetcher
//!
//! Enumerators drain the page stream of a list endpoint into summaries;
//! detail fetchers return one backend record untouched.

use super::pager::pages;
use super::registry::ResourceKind;
use super::summary::{NetworkSummary, VmSummary, VolumeSummary};
use crate::error::{BackendError, ToolError};
use crate::openstack::Session;
use futures::TryStreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Options applied to every list request
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// `limit` sent with the first page request
    pub page_size: Option<u32>,
}

/// Fetch all resources of a kind (auto-paginate)
///
/// All-or-nothing: the first failing page, or the first record that does
/// not project, aborts the enumeration and nothing collected so far is
/// returned.
pub async fn fetch_resources<S>(
    session: &Session,
    kind: ResourceKind,
    options: &ListOptions,
    cancel: &CancellationToken,
) -> Result<Vec<S>, ToolError>
where
    S: for<'v> TryFrom<&'v Value, Error = BackendError>,
{
    let def = kind.def();
    let client = session.client(def.service);
    let mut stream = std::pin::pin!(pages(client, def, options.page_size));

    let mut items = Vec::new();
    let mut page_count = 0usize;

    loop {
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Listing {} cancelled after {} pages", kind.plural(), page_count);
                return Err(ToolError::Cancelled {
                    operation: format!("listing {}", kind.plural()),
                });
            }
            page = stream.try_next() => page,
        };

        match page {
            Ok(Some(records)) => {
                page_count += 1;
                let projected = records
                    .iter()
                    .map(S::try_from)
                    .collect::<Result<Vec<S>, _>>();
                match projected {
                    Ok(projected) => items.extend(projected),
                    Err(source) => {
                        tracing::error!("malformed {} record: {}", kind.display_name(), source);
                        return Err(ToolError::Enumeration { kind, source });
                    }
                }
            }
            Ok(None) => break,
            Err(source) => {
                tracing::error!("error listing {}: {}", kind.plural(), source);
                return Err(ToolError::Enumeration { kind, source });
            }
        }
    }

    tracing::debug!(
        "Listed {} {} over {} pages",
        items.len(),
        kind.plural(),
        page_count
    );
    Ok(items)
}

/// Describe a single resource
///
/// Returns the object under the kind's detail key as the backend sent it.
pub async fn describe_resource(
    session: &Session,
    kind: ResourceKind,
    id: &str,
    cancel: &CancellationToken,
) -> Result<Value, ToolError> {
    let def = kind.def();
    let client = session.client(def.service);
    let path = def.detail_path_for(id);

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(ToolError::Cancelled {
                operation: format!("getting {} {}", kind.display_name(), id),
            });
        }
        response = client.get(&path) => response,
    };

    let mut body = response.map_err(|source| {
        if source.is_not_found() {
            ToolError::NotFound {
                kind,
                id: id.to_string(),
            }
        } else {
            tracing::error!("error getting {} {}: {}", kind.display_name(), id, source);
            ToolError::Fetch {
                kind,
                id: id.to_string(),
                source,
            }
        }
    })?;

    match body.get_mut(&def.detail_key).map(Value::take) {
        Some(record @ Value::Object(_)) => Ok(record),
        _ => Err(ToolError::Fetch {
            kind,
            id: id.to_string(),
            source: BackendError::Decode(format!(
                "missing '{}' object in response",
                def.detail_key
            )),
        }),
    }
}

pub async fn list_vms(
    session: &Session,
    options: &ListOptions,
    cancel: &CancellationToken,
) -> Result<Vec<VmSummary>, ToolError> {
    fetch_resources(session, ResourceKind::Vm, options, cancel).await
}

pub async fn list_networks(
    session: &Session,
    options: &ListOptions,
    cancel: &CancellationToken,
) -> Result<Vec<NetworkSummary>, ToolError> {
    fetch_resources(session, ResourceKind::Network, options, cancel).await
}

pub async fn list_volumes(
    session: &Session,
    options: &ListOptions,
    cancel: &CancellationToken,
) -> Result<Vec<VolumeSummary>, ToolError> {
    fetch_resources(session, ResourceKind::Volume, options, cancel).await
}
