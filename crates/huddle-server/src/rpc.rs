use huddle_core::Rejection;
use serde::{Deserialize, Serialize};

/// Inbound request frame: `{ id?, method, params? }`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// Response frame sent only to the requesting client.
///
/// Shape: `{ id, success, result?, error?: { code: String, message } }`
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Error object. `code` is the string form of the numeric code.
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Outcome of a state-changing request. Rejections carry their reason.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Ack {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl Ack {
    pub fn applied() -> Self {
        Self {
            applied: true,
            reason: None,
        }
    }

    pub fn rejected(rejection: &Rejection) -> Self {
        Self {
            applied: false,
            reason: Some(rejection.reason()),
        }
    }
}

impl<E> From<&Result<E, Rejection>> for Ack {
    fn from(result: &Result<E, Rejection>) -> Self {
        match result {
            Ok(_) => Self::applied(),
            Err(rejection) => Self::rejected(rejection),
        }
    }
}

// Standard JSON-RPC error codes (used internally for routing)
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const SESSION_NOT_FOUND: i32 = -32001;

/// Map numeric error codes to the string codes clients match on.
pub fn error_code_to_string(code: i32) -> &'static str {
    match code {
        PARSE_ERROR => "PARSE_ERROR",
        INVALID_REQUEST => "INVALID_REQUEST",
        METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
        INVALID_PARAMS => "INVALID_PARAMS",
        INTERNAL_ERROR => "INTERNAL_ERROR",
        SESSION_NOT_FOUND => "SESSION_NOT_FOUND",
        _ => "UNKNOWN_ERROR",
    }
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Acknowledge a command. A rejected command is still a well-formed
    /// request, so it is reported as `success` with `applied: false`.
    pub fn ack(id: Option<serde_json::Value>, ack: Ack) -> Self {
        Self::success(id, serde_json::to_value(ack).unwrap_or_default())
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: error_code_to_string(code).to_string(),
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    pub fn session_not_found(id: Option<serde_json::Value>, session_id: &str) -> Self {
        Self::error(id, SESSION_NOT_FOUND, format!("Session not found: {session_id}"))
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error")
    }
}

/// Extract a required string param from the RPC params object.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

/// Extract a required integer param.
pub fn require_i64(params: &serde_json::Value, key: &str) -> Result<i64, String> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| format!("Missing or non-integer parameter: {key}"))
}

/// Extract an optional string param.
pub fn optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}
