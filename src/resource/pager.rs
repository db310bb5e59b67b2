//! Page iteration
//!
//! OpenStack list APIs return one page per request plus a
//! `<collection>_links` array whose `rel: "next"` entry points at the
//! following page. `pages` exposes that as a lazy stream: nothing is fetched
//! until the consumer polls, and page N+1 is only requested after page N has
//! been yielded.

use super::registry::ResourceDef;
use crate::error::BackendError;
use crate::openstack::ServiceClient;
use futures::stream::{self, Stream};
use serde_json::Value;
use url::Url;

enum Cursor {
    First,
    Next(String),
    Done,
}

/// Stream the record pages of a list endpoint
pub fn pages<'a>(
    client: &'a ServiceClient,
    def: &'a ResourceDef,
    page_size: Option<u32>,
) -> impl Stream<Item = Result<Vec<Value>, BackendError>> + 'a {
    stream::try_unfold(Cursor::First, move |cursor| async move {
        let url = match cursor {
            Cursor::First => first_page_url(client, def, page_size)?.to_string(),
            Cursor::Next(url) => url,
            Cursor::Done => return Ok(None),
        };

        let body = client.get_url(&url).await?;

        // A next link equal to the current page would never terminate
        let cursor = match next_link(&body, &def.links_path) {
            Some(next) if next != url => Cursor::Next(next),
            _ => Cursor::Done,
        };
        let records = extract_records(body, &def.response_path)?;

        tracing::trace!("Fetched page of {} {}", records.len(), def.plural_name);
        Ok::<_, BackendError>(Some((records, cursor)))
    })
}

fn first_page_url(
    client: &ServiceClient,
    def: &ResourceDef,
    page_size: Option<u32>,
) -> Result<Url, BackendError> {
    let mut url = client.url(&def.list_path)?;
    if let Some(limit) = page_size {
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
    }
    Ok(url)
}

/// `href` of the `rel == "next"` entry of the links array, if any
pub(crate) fn next_link(body: &Value, links_path: &str) -> Option<String> {
    body.get(links_path)?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(|r| r.as_str()) == Some("next"))
        .and_then(|link| link.get("href"))
        .and_then(|href| href.as_str())
        .filter(|href| !href.is_empty())
        .map(|href| href.to_string())
}

/// Take the record array out of a page body
pub(crate) fn extract_records(mut body: Value, response_path: &str) -> Result<Vec<Value>, BackendError> {
    match body.get_mut(response_path).map(Value::take) {
        Some(Value::Array(records)) => Ok(records),
        Some(_) => Err(BackendError::Decode(format!(
            "'{}' is not an array",
            response_path
        ))),
        None => Err(BackendError::Decode(format!(
            "missing '{}' in list response",
            response_path
        ))),
    }
}
