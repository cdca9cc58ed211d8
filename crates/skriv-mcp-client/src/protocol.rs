// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision this client speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ─── JSON-RPC 2.0 envelopes ──────────────────────────────────────────────────

/// Outgoing JSON-RPC message.  A request carries an `id`; a notification
/// omits it and expects no reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcMessage {
    pub fn request(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn to_line(&self) -> String {
        // Serialization of a struct of primitives and Values cannot fail.
        serde_json::to_string(self).expect("JSON-RPC message serializes")
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// One frame received from the server, demultiplexed by shape.
#[derive(Debug)]
pub enum Incoming {
    /// Response to a request this client sent
    Response {
        id: u64,
        result: Result<Value, RpcError>,
    },
    /// Server-initiated notification (no reply expected)
    Notification { method: String, params: Option<Value> },
    /// Server-initiated request.  This client supports none, so the caller
    /// answers with MethodNotFound.
    Request { id: u64, method: String },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<Value>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Value>,
    error: Option<RpcError>,
}

/// Parse one newline-delimited frame.  Responses whose `id` is not an
/// unsigned integer are rejected — this client only ever issues integer ids.
pub fn parse_frame(line: &str) -> anyhow::Result<Incoming> {
    let raw: RawFrame = serde_json::from_str(line)?;
    match (raw.id, raw.method) {
        (Some(id), None) => {
            let id = id
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("response with non-integer id: {id}"))?;
            let result = match (raw.result, raw.error) {
                (_, Some(err)) => Err(err),
                (Some(v), None) => Ok(v),
                (None, None) => Ok(Value::Null),
            };
            Ok(Incoming::Response { id, result })
        }
        (Some(id), Some(method)) => {
            let id = id
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("request with non-integer id: {id}"))?;
            Ok(Incoming::Request { id, method })
        }
        (None, Some(method)) => Ok(Incoming::Notification {
            method,
            params: raw.params,
        }),
        (None, None) => anyhow::bail!("frame is neither request, response nor notification"),
    }
}

// ─── MCP payload types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: &'static str,
    pub capabilities: Value,
    pub client_info: Value,
}

impl InitializeParams {
    /// The capabilities this client actually implements.  `sampling` is
    /// deliberately absent — advertising it without an implementation
    /// breaks servers that try to use it.
    pub fn new(client_name: &str, client_version: &str) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            capabilities: serde_json::json!({ "roots": { "listChanged": true } }),
            client_info: serde_json::json!({ "name": client_name, "version": client_version }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: Value,
}

/// A tool exposed by a server, as reported by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// `tools/call` result: a list of content items plus an error flag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Concatenate the text items of the content array.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| {
                if c["type"] == "text" {
                    c["text"].as_str()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResourcesResult {
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadResourceResult {
    #[serde(default)]
    pub contents: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListPromptsResult {
    #[serde(default)]
    pub prompts: Vec<PromptDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetPromptResult {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub messages: Vec<Value>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_serializes_with_id() {
        let msg = JsonRpcMessage::request(7, "tools/list", None);
        let line = msg.to_line();
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], 7);
        assert_eq!(v["method"], "tools/list");
        assert!(v.get("params").is_none());
    }

    #[test]
    fn notification_has_no_id() {
        let msg = JsonRpcMessage::notification("notifications/initialized", None);
        let v: Value = serde_json::from_str(&msg.to_line()).unwrap();
        assert!(v.get("id").is_none());
    }

    #[test]
    fn parse_success_response() {
        let frame = r#"{"jsonrpc":"2.0","id":3,"result":{"ok":true}}"#;
        match parse_frame(frame).unwrap() {
            Incoming::Response { id, result } => {
                assert_eq!(id, 3);
                assert_eq!(result.unwrap()["ok"], true);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parse_error_response() {
        let frame = r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"nope"}}"#;
        match parse_frame(frame).unwrap() {
            Incoming::Response { id, result } => {
                assert_eq!(id, 4);
                let err = result.unwrap_err();
                assert_eq!(err.code, -32601);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parse_notification() {
        let frame = r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"p":1}}"#;
        match parse_frame(frame).unwrap() {
            Incoming::Notification { method, params } => {
                assert_eq!(method, "notifications/progress");
                assert_eq!(params.unwrap()["p"], 1);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(parse_frame("not json").is_err());
        assert!(parse_frame("{}").is_err());
    }

    #[test]
    fn initialize_params_advertise_roots_only() {
        let p = InitializeParams::new("skriv", "0.6.2");
        assert_eq!(p.capabilities["roots"]["listChanged"], true);
        assert!(p.capabilities.get("sampling").is_none());
        assert_eq!(p.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn tool_descriptor_defaults_schema() {
        let d: ToolDescriptor = serde_json::from_value(json!({"name": "t"})).unwrap();
        assert_eq!(d.input_schema["type"], "object");
    }

    #[test]
    fn call_result_text_joins_text_items() {
        let r: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "a"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "b"}
            ]
        }))
        .unwrap();
        assert_eq!(r.text(), "a\nb");
    }
}
