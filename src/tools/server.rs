//! MCP Server
//!
//! Line-delimited JSON-RPC 2.0 over stdin/stdout. Requests other than
//! `tools/call` are answered inline; each `tools/call` runs on its own task
//! with a cancellation token registered under its request id.

use super::registry::{ToolOutput, ToolRegistry};
use crate::error::ToolError;
use anyhow::Result;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "OpenStack Resource Server";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const REQUEST_CANCELLED: i64 = -32800;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn new(id: Value, outcome: Result<Value, JsonRpcError>) -> Self {
        match outcome {
            Ok(result) => Self {
                jsonrpc: "2.0",
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                jsonrpc: "2.0",
                id,
                result: None,
                error: Some(error),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Structured description of a tool failure
pub fn error_body(err: &ToolError) -> Value {
    let mut body = json!({
        "code": err.code(),
        "message": err.to_string(),
    });
    if let Some(kind) = err.kind() {
        body["kind"] = json!(kind);
    }
    if let Some(id) = err.resource_id() {
        body["id"] = json!(id);
    }
    if let ToolError::InvalidParameter { name, .. } = err {
        body["parameter"] = json!(name);
    }
    body
}

/// Map an invocation outcome onto the `tools/call` envelope
///
/// Caller-contract violations and cancellation become JSON-RPC errors;
/// backend failures are tool results flagged with `isError`.
pub fn call_result(outcome: Result<ToolOutput, ToolError>) -> Result<Value, JsonRpcError> {
    match outcome {
        Ok(output) => {
            let structured = serde_json::to_value(&output)
                .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))?;
            let text = serde_json::to_string_pretty(&structured).unwrap_or_default();
            Ok(json!({
                "content": [{ "type": "text", "text": text }],
                "structuredContent": structured,
                "isError": false
            }))
        }
        Err(err) if err.is_caller_error() => Err(JsonRpcError {
            code: INVALID_PARAMS,
            message: err.to_string(),
            data: Some(error_body(&err)),
        }),
        Err(err @ ToolError::Cancelled { .. }) => Err(JsonRpcError {
            code: REQUEST_CANCELLED,
            message: err.to_string(),
            data: Some(error_body(&err)),
        }),
        Err(err) => Ok(json!({
            "content": [{ "type": "text", "text": err.to_string() }],
            "structuredContent": { "error": error_body(&err) },
            "isError": true
        })),
    }
}

/// Server options besides the registry
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOptions {
    /// Deadline applied to every tool call
    pub request_timeout: Option<Duration>,
}

type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// MCP server over a line-delimited JSON-RPC stream
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    options: ServerOptions,
    in_flight: InFlight,
}

impl McpServer {
    pub fn new(registry: ToolRegistry, options: ServerOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            options,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn serve_stdio(self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve requests read from `reader`, writing responses to `writer`
    ///
    /// Returns once the reader hits EOF and every in-flight call has answered.
    pub async fn serve<R, W>(self, mut reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        let mut calls = JoinSet::new();
        let mut buf = Vec::new();
        let mut read_error = None;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Failed to read input: {}", e);
                    read_error = Some(e);
                    break;
                }
            }

            let request = match std::str::from_utf8(&buf)
                .map_err(|e| e.to_string())
                .and_then(|line| {
                    let input = line.trim();
                    if input.is_empty() {
                        return Ok(None);
                    }
                    tracing::debug!("Received: {}", input);
                    serde_json::from_str::<JsonRpcRequest>(input)
                        .map(Some)
                        .map_err(|e| e.to_string())
                }) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("Failed to parse JSON-RPC: {}", e);
                    let response = JsonRpcResponse::new(
                        Value::Null,
                        Err(JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e))),
                    );
                    write_message(&writer, &response).await;
                    continue;
                }
            };

            if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
                tracing::warn!("Unexpected jsonrpc version {:?}", request.jsonrpc);
            }

            match request.method.as_str() {
                "tools/call" => match request.id {
                    Some(id) if self.is_in_flight(&id) => {
                        tracing::warn!("Rejecting tools/call reusing in-flight id {}", id);
                        let error = JsonRpcError::new(
                            INVALID_REQUEST,
                            format!("Request id {} is already in flight", id),
                        );
                        write_message(&writer, &JsonRpcResponse::new(id, Err(error))).await;
                    }
                    Some(id) => {
                        calls.spawn(self.call_task(id, request.params, writer.clone()));
                    }
                    None => tracing::warn!("Ignoring tools/call sent as a notification"),
                },
                "notifications/cancelled" => self.cancel(request.params.as_ref()),
                _ => {
                    let outcome = self.handle_request(&request);
                    if let Some(id) = request.id {
                        write_message(&writer, &JsonRpcResponse::new(id, outcome)).await;
                    } else if let Err(e) = outcome {
                        tracing::debug!("Ignoring notification {}: {}", request.method, e.message);
                    }
                }
            }

            while let Some(joined) = calls.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!("Tool call task failed: {}", e);
                }
            }
        }

        tracing::info!("Input closed, waiting for {} in-flight calls", calls.len());
        while let Some(joined) = calls.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Tool call task failed: {}", e);
            }
        }

        match read_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn is_in_flight(&self, id: &Value) -> bool {
        self.in_flight
            .lock()
            .map(|map| map.contains_key(&id.to_string()))
            .unwrap_or(false)
    }

    fn handle_request(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": {
                    "tools": {}
                }
            })),
            "notifications/initialized" => {
                tracing::info!("Client initialized");
                Ok(Value::Null)
            }
            "ping" => Ok(json!({})),
            "tools/list" => {
                let tools: Vec<Value> = self
                    .registry
                    .tools()
                    .iter()
                    .map(|t| t.descriptor())
                    .collect();
                Ok(json!({ "tools": tools }))
            }
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }

    /// Cancel the in-flight call named by `notifications/cancelled`
    fn cancel(&self, params: Option<&Value>) {
        let Some(request_id) = params.and_then(|p| p.get("requestId")) else {
            tracing::warn!("notifications/cancelled without requestId");
            return;
        };

        let key = request_id.to_string();
        let token = self
            .in_flight
            .lock()
            .ok()
            .and_then(|map| map.get(&key).cloned());

        match token {
            Some(token) => {
                tracing::info!("Cancelling request {}", key);
                token.cancel();
            }
            None => tracing::debug!("No in-flight request {} to cancel", key),
        }
    }

    fn call_task<W>(
        &self,
        id: Value,
        params: Option<Value>,
        writer: Arc<tokio::sync::Mutex<W>>,
    ) -> impl std::future::Future<Output = ()> + Send + 'static
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let registry = self.registry.clone();
        let in_flight = self.in_flight.clone();
        let timeout = self.options.request_timeout;
        let cancel = CancellationToken::new();
        let key = id.to_string();

        if let Ok(mut map) = in_flight.lock() {
            map.insert(key.clone(), cancel.clone());
        }

        async move {
            let outcome = AssertUnwindSafe(run_call(&registry, params, &cancel, timeout))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!("Tool call {} panicked", key);
                    Err(JsonRpcError::new(INTERNAL_ERROR, "Internal error"))
                });

            if let Ok(mut map) = in_flight.lock() {
                map.remove(&key);
            }

            write_message(&writer, &JsonRpcResponse::new(id, outcome)).await;
        }
    }
}

async fn run_call(
    registry: &ToolRegistry,
    params: Option<Value>,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<Value, JsonRpcError> {
    let params = params.unwrap_or(Value::Null);
    let name = params
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "Missing tool name"))?;
    let args = params.get("arguments").unwrap_or(&Value::Null);

    let span = tracing::info_span!("tool_call", tool = %name, invocation = %Uuid::new_v4());
    let invocation = registry.invoke(name, args, cancel).instrument(span);

    let outcome = match timeout {
        Some(deadline) => match tokio::time::timeout(deadline, invocation).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!("{} exceeded deadline of {:?}", name, deadline);
                cancel.cancel();
                Err(ToolError::Cancelled {
                    operation: name.to_string(),
                })
            }
        },
        None => invocation.await,
    };

    call_result(outcome)
}

async fn write_message<W, T>(writer: &tokio::sync::Mutex<W>, message: &T)
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = match serde_json::to_string(message) {
        Ok(line) => line,
        Err(e) => {
            tracing::error!("Failed to serialize response: {}", e);
            return;
        }
    };
    line.push('\n');

    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_all(line.as_bytes()).await {
        tracing::error!("Failed to write response: {}", e);
        return;
    }
    if let Err(e) = writer.flush().await {
        tracing::error!("Failed to flush response: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::resource::{ResourceKind, VmSummary};

    #[test]
    fn test_success_envelope() {
        let output = ToolOutput::Vms(vec![VmSummary {
            id: "v1".to_string(),
            name: "web-01".to_string(),
            status: "ACTIVE".to_string(),
        }]);
        let result = call_result(Ok(output)).unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["structuredContent"]["vms"][0]["id"], "v1");
        assert_eq!(result["content"][0]["type"], "text");
        let text: Value =
            serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(text, result["structuredContent"]);
    }

    #[test]
    fn test_caller_errors_are_protocol_errors() {
        let err = call_result(Err(ToolError::InvalidParameter {
            name: "vm_id".to_string(),
            reason: "is required".to_string(),
        }))
        .unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.data.unwrap()["parameter"], "vm_id");

        let err = call_result(Err(ToolError::UnknownOperation("UnknownOp".to_string()))).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn test_cancelled_is_protocol_error() {
        let err = call_result(Err(ToolError::Cancelled {
            operation: "ListVMs".to_string(),
        }))
        .unwrap_err();
        assert_eq!(err.code, REQUEST_CANCELLED);
    }

    #[test]
    fn test_backend_failures_are_flagged_results() {
        let result = call_result(Err(ToolError::Fetch {
            kind: ResourceKind::Network,
            id: "n1".to_string(),
            source: BackendError::Status {
                status: 500,
                message: "boom".to_string(),
            },
        }))
        .unwrap();
        assert_eq!(result["isError"], true);
        let error = &result["structuredContent"]["error"];
        assert_eq!(error["code"], "fetch_failed");
        assert_eq!(error["kind"], "network");
        assert_eq!(error["id"], "n1");
    }

    #[test]
    fn test_request_parsing_tolerates_missing_fields() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"method": "notifications/initialized"}"#).unwrap();
        assert!(request.id.is_none());
        assert!(request.params.is_none());
    }
}
