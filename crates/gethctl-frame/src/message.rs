//! JSON-RPC 2.0 wire messages exchanged with the node.
//!
//! Requests are outbound only, responses inbound only. Neither side puts a
//! delimiter between messages; see [`crate::dechunker`] for how inbound
//! boundaries are recovered.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version tag.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier. Allocated by the correlator, starting at 1.
pub type RequestId = u64;

/// Outbound JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    pub params: Vec<Value>,
}

impl Request {
    /// Create a request. `params` is always sent as an array.
    pub fn new(id: RequestId, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Inbound JSON-RPC response.
///
/// Both `result` and `error` are optional on the wire; the node is trusted
/// to send one of them. A JSON `null` result reads as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Response {
    /// Successful response, for peers and tests.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(Value::from(id)),
            result: Some(result),
            error: None,
        }
    }

    /// Error response, for peers and tests.
    pub fn failure(id: RequestId, error: RpcError) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(Value::from(id)),
            result: None,
            error: serde_json::to_value(error).ok(),
        }
    }

    /// Numeric request id, if the message carries one.
    ///
    /// Accepts numbers and numeric strings.
    pub fn request_id(&self) -> Option<RequestId> {
        match self.id.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Collapse into the caller-facing outcome.
    ///
    /// A present `result` takes precedence over `error`.
    pub fn into_outcome(self) -> Result<Value, RpcError> {
        if let Some(result) = self.result {
            return Ok(result);
        }
        match self.error {
            Some(error) => Err(RpcError::from_value(error)),
            None => Err(RpcError::missing_result()),
        }
    }
}

/// Split one decoded frame into responses.
///
/// A top-level array is a batch; each element is parsed independently so a
/// bad element does not hide the others.
pub fn responses_from_frame(frame: Value) -> Vec<Result<Response, serde_json::Error>> {
    match frame {
        Value::Array(items) => items.into_iter().map(serde_json::from_value).collect(),
        other => vec![serde_json::from_value(other)],
    }
}

/// Error object returned by the node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Code used when the node sends neither a result nor an error.
    pub const MISSING_RESULT: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Interpret an arbitrary `error` field.
    ///
    /// Well-formed error objects keep their code; anything else is carried
    /// verbatim in `data` so nothing the node said is lost.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<RpcError>(value.clone()) {
            Ok(err) => err,
            Err(_) => Self {
                code: Self::MISSING_RESULT,
                message: match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                data: Some(value),
            },
        }
    }

    fn missing_result() -> Self {
        Self::new(Self::MISSING_RESULT, "response carried neither result nor error")
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}
