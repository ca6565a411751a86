//! Wire types for the JSON-RPC 2.0 protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Incoming request. A null (or absent) `id` marks a notification, which
/// gets no response.
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<i64>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Outgoing response: exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Response {
    pub fn result(id: i64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<i64>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError::new(code, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_and_without_id() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"method":"status","params":{}}"#)
                .unwrap();
        assert_eq!(req.id, Some(7));
        assert!(!req.is_notification());

        let note: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"file/didChange","params":{"path":"a.src"}}"#)
                .unwrap();
        assert!(note.is_notification());

        let bare: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"status"}"#).unwrap();
        assert!(bare.is_notification());
        assert_eq!(bare.params, Value::Null);
    }

    #[test]
    fn response_serializes_one_arm() {
        let ok = Response::result(1, serde_json::json!({"success": true}));
        let raw = serde_json::to_string(&ok).unwrap();
        assert!(raw.contains("\"result\""));
        assert!(!raw.contains("\"error\""));

        let err = Response::error(Some(2), METHOD_NOT_FOUND, "method not found: nope");
        let raw = serde_json::to_string(&err).unwrap();
        assert!(raw.contains("-32601"));
        assert!(!raw.contains("\"result\""));

        let parse_err = Response::error(None, INVALID_REQUEST, "parse error");
        let raw = serde_json::to_string(&parse_err).unwrap();
        assert!(raw.contains("\"id\":null"));
    }
}
