//! Resource summaries
//!
//! Minimal projections of backend records for list results. Only the named
//! fields survive; everything else in the backend record is dropped.
//! Missing or null fields project to `""` / `0`; a field of the wrong type,
//! or a record that is not an object, fails the projection.

use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn record(value: &Value) -> Result<&Map<String, Value>, BackendError> {
    value
        .as_object()
        .ok_or_else(|| BackendError::Decode("record is not an object".to_string()))
}

fn str_field(record: &Map<String, Value>, key: &str) -> Result<String, BackendError> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(BackendError::Decode(format!(
            "field '{}' is not a string: {}",
            key, other
        ))),
    }
}

fn u64_field(record: &Map<String, Value>, key: &str) -> Result<u64, BackendError> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| {
            BackendError::Decode(format!(
                "field '{}' is not a non-negative integer: {}",
                key, value
            ))
        }),
    }
}

/// Summary of a compute server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSummary {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl TryFrom<&Value> for VmSummary {
    type Error = BackendError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let record = record(value)?;
        Ok(Self {
            id: str_field(record, "id")?,
            name: str_field(record, "name")?,
            status: str_field(record, "status")?,
        })
    }
}

/// Summary of a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

impl TryFrom<&Value> for NetworkSummary {
    type Error = BackendError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let record = record(value)?;
        Ok(Self {
            id: str_field(record, "id")?,
            name: str_field(record, "name")?,
        })
    }
}

/// Summary of a block-storage volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    /// Size in whole gigabytes
    pub size_gb: u64,
}

impl TryFrom<&Value> for VolumeSummary {
    type Error = BackendError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let record = record(value)?;
        Ok(Self {
            id: str_field(record, "id")?,
            name: str_field(record, "name")?,
            status: str_field(record, "status")?,
            size_gb: u64_field(record, "size")?,
        })
    }
}
