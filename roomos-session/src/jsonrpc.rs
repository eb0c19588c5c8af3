//! xAPI JSON-RPC framing
//!
//! RoomOS speaks JSON-RPC 2.0 over its `/ws` WebSocket. Each text frame is one
//! JSON object.
//!
//! ## Message Structure
//!
//! Requests carry a numeric `id`, a `method` and `params`:
//! - `xGet` with `{"Path": ["Status", "SystemUnit", "Uptime"]}`
//! - `xSet` with `{"Path": [...], "Value": v}`
//! - `xCommand/<Segment>/<Segment>` with the command arguments
//!
//! Responses echo the `id` and carry either `result` or
//! `error: {code, message, data}`. Frames without an `id` are notifications
//! (feedback and events) pushed by the device.

use crate::xapi::XPath;
use crate::{Result, SessionError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON-RPC protocol version string
pub const JSONRPC_VERSION: &str = "2.0";

/// An outgoing request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RpcRequest {
    /// Always "2.0"
    pub jsonrpc: &'static str,
    /// Correlation id
    pub id: u64,
    /// Method name
    pub method: String,
    /// Method parameters
    pub params: Value,
}

impl RpcRequest {
    /// Generic request
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    /// `xGet` for a path
    ///
    /// ```rust
    /// use roomos_session::jsonrpc::RpcRequest;
    ///
    /// let path = "Status/SystemUnit/Uptime".parse().unwrap();
    /// let req = RpcRequest::get(7, &path);
    /// let text = req.to_text().unwrap();
    /// assert!(text.contains(r#""method":"xGet""#));
    /// assert!(text.contains(r#""Path":["Status","SystemUnit","Uptime"]"#));
    /// ```
    pub fn get(id: u64, path: &XPath) -> Self {
        Self::new(id, "xGet", json!({ "Path": path.to_wire() }))
    }

    /// `xSet` for a configuration leaf
    pub fn set(id: u64, path: &XPath, value: Value) -> Self {
        Self::new(id, "xSet", json!({ "Path": path.to_wire(), "Value": value }))
    }

    /// `xCommand/...` invocation
    pub fn command(id: u64, path: &XPath, args: Value) -> Self {
        let params = match args {
            Value::Null => json!({}),
            other => other,
        };
        Self::new(id, path.command_method(), params)
    }

    /// Serialize to a text frame
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Error object in a response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcErrorObject {
    /// Error code
    pub code: i64,
    /// Human readable message
    #[serde(default)]
    pub message: String,
    /// Optional detail
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<RpcErrorObject> for SessionError {
    fn from(err: RpcErrorObject) -> Self {
        let message = match err.data {
            Some(Value::Object(ref data)) => data
                .get("Reason")
                .or_else(|| data.get("reason"))
                .and_then(Value::as_str)
                .map(|reason| format!("{} ({})", err.message, reason))
                .unwrap_or_else(|| err.message.clone()),
            _ => err.message.clone(),
        };
        SessionError::Rpc {
            code: err.code,
            message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// A decoded incoming frame
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// Answer to one of our requests
    Response {
        /// Correlation id
        id: u64,
        /// `result` or `error`
        outcome: std::result::Result<Value, RpcErrorObject>,
    },
    /// Device-initiated notification
    Notification {
        /// Notification method (e.g. `xFeedback/Event`)
        method: String,
        /// Notification payload
        params: Value,
    },
}

impl RpcMessage {
    /// Decode a text frame
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawMessage = serde_json::from_str(text)?;

        match raw.id {
            Some(id) if !id.is_null() => {
                let id = parse_id(&id).ok_or_else(|| {
                    SessionError::Transport(format!("unexpected response id {}", id))
                })?;
                let outcome = match raw.error {
                    Some(error) => Err(error),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                };
                Ok(RpcMessage::Response { id, outcome })
            }
            _ => {
                let method = raw.method.ok_or_else(|| {
                    SessionError::Transport("frame has neither id nor method".to_string())
                })?;
                Ok(RpcMessage::Notification {
                    method,
                    params: raw.params.unwrap_or(Value::Null),
                })
            }
        }
    }
}

fn parse_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
