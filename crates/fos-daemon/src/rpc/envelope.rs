//! JSON-RPC 2.0 wire types and error codes.
//!
//! Envelope parsing works on raw [`serde_json::Value`]s rather than
//! derived structs for one load-bearing reason: the protocol
//! distinguishes a *missing* `id` (a notification, which gets no
//! response) from `id: null` (a regular request answered with a null
//! id), and derive-based `Option` handling collapses the two.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

/// A validated request envelope.
///
/// `id` is `None` for notifications; `Some(Value::Null)` is a regular
/// request whose response echoes a null id.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The method name.
    pub method: String,
    /// Positional (array) or named (object) parameters, if supplied.
    pub params: Option<Value>,
    /// The request id; absent for notifications.
    pub id: Option<Value>,
}

impl Envelope {
    /// Validates one batch element into an envelope.
    ///
    /// # Errors
    ///
    /// A ready-to-send `-32600` response when the element is not an
    /// object, lacks `jsonrpc: "2.0"` or a string `method`, carries a
    /// non-scalar `id`, or carries `params` that are neither array nor
    /// object.
    pub fn parse(value: &Value) -> Result<Self, Response> {
        let Some(object) = value.as_object() else {
            return Err(Response::failure(
                Value::Null,
                RpcError::invalid_request("request must be an object"),
            ));
        };

        let id = object.get("id").cloned();
        if let Some(id_value) = &id {
            if !(id_value.is_null() || id_value.is_string() || id_value.is_number()) {
                return Err(Response::failure(
                    Value::Null,
                    RpcError::invalid_request("id must be a string, number, or null"),
                ));
            }
        }
        let respond_id = id.clone().unwrap_or(Value::Null);

        if object.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Err(Response::failure(
                respond_id,
                RpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        let Some(method) = object.get("method").and_then(Value::as_str) else {
            return Err(Response::failure(
                respond_id,
                RpcError::invalid_request("method must be a string"),
            ));
        };

        let params = object.get("params").cloned();
        if let Some(params_value) = &params {
            if !(params_value.is_array() || params_value.is_object()) {
                return Err(Response::failure(
                    respond_id,
                    RpcError::invalid_request("params must be an array or object"),
                ));
            }
        }

        Ok(Self {
            method: method.to_string(),
            params,
            id,
        })
    }

    /// Whether this request expects no response.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// The id to echo in the response (null for notifications, which
    /// never reach serialization anyway).
    #[must_use]
    pub fn respond_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Protocol error code.
    pub code: i64,
    /// Short human-readable message.
    pub message: String,
    /// Machine-readable payload: `{ "kind": ..., "detail": ... }`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// `-32700 Parse error`.
    #[must_use]
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self {
            code: PARSE_ERROR,
            message: "Parse error".to_string(),
            data: Some(serde_json::json!({ "detail": detail.to_string() })),
        }
    }

    /// `-32600 Invalid Request`.
    #[must_use]
    pub fn invalid_request(detail: impl std::fmt::Display) -> Self {
        Self {
            code: INVALID_REQUEST,
            message: "Invalid Request".to_string(),
            data: Some(serde_json::json!({ "detail": detail.to_string() })),
        }
    }

    /// `-32601 Method not found`.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: "Method not found".to_string(),
            data: Some(serde_json::json!({ "detail": format!("unknown method: {method}") })),
        }
    }

    /// `-32602 Invalid params`.
    #[must_use]
    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: Some(serde_json::json!({ "detail": detail.to_string() })),
        }
    }

    /// `-32603 Internal error` for a request that outlived its
    /// deadline. Filesystem side effects already performed are not
    /// rolled back.
    #[must_use]
    pub fn deadline_exceeded() -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: "Internal error".to_string(),
            data: Some(serde_json::json!({
                "kind": "DeadlineExceeded",
                "detail": "request deadline exceeded",
            })),
        }
    }
}

/// A JSON-RPC response object carrying exactly one of `result` or
/// `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: String,
    /// Successful result, mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure, mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Echoed request id.
    pub id: Value,
}

impl Response {
    /// A success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// An error response.
    #[must_use]
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}
