//! Tool Registry
//!
//! The six invocable operations, their parameter schemas, and dispatch from
//! an invocation to the matching enumerator or detail fetcher.

use crate::error::ToolError;
use crate::openstack::Session;
use crate::resource::{
    describe_resource, list_networks, list_vms, list_volumes, ListOptions, NetworkSummary,
    ResourceKind, VmSummary, VolumeSummary,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a tool does once its parameters are validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List(ResourceKind),
    Get(ResourceKind),
}

/// Declared string parameter of a tool
#[derive(Debug, Clone, Copy)]
pub struct ParamDef {
    pub name: &'static str,
    pub description: &'static str,
}

/// Tool definition
#[derive(Debug, Clone, Copy)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub required: &'static [ParamDef],
    pub operation: Operation,
    pub result_key: &'static str,
}

impl ToolDef {
    /// JSON Schema of the tool's input, as advertised in `tools/list`
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .required
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    json!({ "type": "string", "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self.required.iter().map(|p| p.name).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }

    /// MCP tool descriptor
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema()
        })
    }
}

pub const TOOLS: &[ToolDef] = &[
    ToolDef {
        name: "ListVMs",
        description: "Lists all Virtual Machines.",
        required: &[],
        operation: Operation::List(ResourceKind::Vm),
        result_key: "vms",
    },
    ToolDef {
        name: "GetVMDetails",
        description: "Gets detailed information about a specific Virtual Machine.",
        required: &[ParamDef {
            name: "vm_id",
            description: "The ID of the Virtual Machine.",
        }],
        operation: Operation::Get(ResourceKind::Vm),
        result_key: "vm_details",
    },
    ToolDef {
        name: "ListNetworks",
        description: "Lists all Networks.",
        required: &[],
        operation: Operation::List(ResourceKind::Network),
        result_key: "networks",
    },
    ToolDef {
        name: "GetNetworkDetails",
        description: "Gets detailed information about a specific Network.",
        required: &[ParamDef {
            name: "network_id",
            description: "The ID of the Network.",
        }],
        operation: Operation::Get(ResourceKind::Network),
        result_key: "network_details",
    },
    ToolDef {
        name: "ListVolumes",
        description: "Lists all Volumes.",
        required: &[],
        operation: Operation::List(ResourceKind::Volume),
        result_key: "volumes",
    },
    ToolDef {
        name: "GetVolumeDetails",
        description: "Gets detailed information about a specific Volume.",
        required: &[ParamDef {
            name: "volume_id",
            description: "The ID of the Volume.",
        }],
        operation: Operation::Get(ResourceKind::Volume),
        result_key: "volume_details",
    },
];

/// Successful tool result, one variant per result key
///
/// Serializes as a single-key object, e.g. `{"vms": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ToolOutput {
    #[serde(rename = "vms")]
    Vms(Vec<VmSummary>),
    #[serde(rename = "vm_details")]
    VmDetails(Value),
    #[serde(rename = "networks")]
    Networks(Vec<NetworkSummary>),
    #[serde(rename = "network_details")]
    NetworkDetails(Value),
    #[serde(rename = "volumes")]
    Volumes(Vec<VolumeSummary>),
    #[serde(rename = "volume_details")]
    VolumeDetails(Value),
}

impl ToolOutput {
    pub fn result_key(&self) -> &'static str {
        match self {
            Self::Vms(_) => "vms",
            Self::VmDetails(_) => "vm_details",
            Self::Networks(_) => "networks",
            Self::NetworkDetails(_) => "network_details",
            Self::Volumes(_) => "volumes",
            Self::VolumeDetails(_) => "volume_details",
        }
    }

    fn detail(kind: ResourceKind, record: Value) -> Self {
        match kind {
            ResourceKind::Vm => Self::VmDetails(record),
            ResourceKind::Network => Self::NetworkDetails(record),
            ResourceKind::Volume => Self::VolumeDetails(record),
        }
    }
}

/// Routes invocations to handlers bound to the shared session
#[derive(Clone)]
pub struct ToolRegistry {
    session: Arc<Session>,
    options: ListOptions,
    tools: HashMap<&'static str, &'static ToolDef>,
}

impl ToolRegistry {
    pub fn new(session: Arc<Session>, options: ListOptions) -> Self {
        let tools = TOOLS.iter().map(|t| (t.name, t)).collect();
        Self {
            session,
            options,
            tools,
        }
    }

    /// Tool definitions in declaration order
    pub fn tools(&self) -> &'static [ToolDef] {
        TOOLS
    }

    pub fn get(&self, name: &str) -> Option<&'static ToolDef> {
        self.tools.get(name).copied()
    }

    /// Validate and run one invocation
    pub async fn invoke(
        &self,
        name: &str,
        params: &Value,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownOperation(name.to_string()))?;
        let args = validate_params(tool, params)?;

        let session = self.session.as_ref();
        let output = match tool.operation {
            Operation::List(ResourceKind::Vm) => {
                tracing::info!("Executing {} tool", tool.name);
                ToolOutput::Vms(list_vms(session, &self.options, cancel).await?)
            }
            Operation::List(ResourceKind::Network) => {
                tracing::info!("Executing {} tool", tool.name);
                ToolOutput::Networks(list_networks(session, &self.options, cancel).await?)
            }
            Operation::List(ResourceKind::Volume) => {
                tracing::info!("Executing {} tool", tool.name);
                ToolOutput::Volumes(list_volumes(session, &self.options, cancel).await?)
            }
            Operation::Get(kind) => {
                // Get tools declare exactly one parameter: the identifier
                let id = tool
                    .required
                    .first()
                    .and_then(|p| args.get(p.name))
                    .copied()
                    .unwrap_or_default();
                tracing::info!("Executing {} tool for {} ID: {}", tool.name, kind, id);
                ToolOutput::detail(kind, describe_resource(session, kind, id, cancel).await?)
            }
        };

        Ok(output)
    }
}

/// Check every declared parameter is a non-empty string
///
/// Runs before any backend call; extra parameters are ignored.
fn validate_params<'p>(
    tool: &ToolDef,
    params: &'p Value,
) -> Result<HashMap<&'static str, &'p str>, ToolError> {
    let map = match params {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            return Err(ToolError::InvalidParameter {
                name: "arguments".to_string(),
                reason: format!("expected an object, got {}", json_type(other)),
            })
        }
    };

    let mut args = HashMap::new();
    for param in tool.required {
        let value = match map.and_then(|m| m.get(param.name)) {
            None | Some(Value::Null) => {
                return Err(ToolError::InvalidParameter {
                    name: param.name.to_string(),
                    reason: "is required".to_string(),
                })
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(ToolError::InvalidParameter {
                    name: param.name.to_string(),
                    reason: "must not be empty".to_string(),
                })
            }
            // A dot segment would resolve to a different path
            Some(Value::String(s)) if s == "." || s == ".." => {
                return Err(ToolError::InvalidParameter {
                    name: param.name.to_string(),
                    reason: format!("{:?} is not a valid identifier", s),
                })
            }
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(ToolError::InvalidParameter {
                    name: param.name.to_string(),
                    reason: format!("expected a string, got {}", json_type(other)),
                })
            }
        };
        args.insert(param.name, value);
    }

    Ok(args)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
