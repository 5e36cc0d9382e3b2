//! JSON-RPC 2.0 Envelope Types
//!
//! This module implements the JSON-RPC 2.0 envelope used on the gateway's
//! inbound surface.
//!
//! # Wire Contract
//!
//! - Request format: `{"jsonrpc": "2.0", "method": "...", "params": {...}, "id": 1}`
//! - Response format: `{"jsonrpc": "2.0", "result": ..., "id": 1}` or
//!   `{"jsonrpc": "2.0", "error": {...}, "id": 1}`
//! - A response carries exactly one of `result` and `error`; the absent field
//!   is omitted from the serialized form.
//! - Error codes are strings drawn from the closed taxonomy in
//!   [`super::error`], not the numeric JSON-RPC codes; `details` is an
//!   optional operator-facing string attached to 5xx-class failures.
//!
//! # Example
//!
//! ```
//! use skygate_common::protocol::jsonrpc::{RpcRequest, RpcResponse, RpcError};
//! use serde_json::json;
//!
//! let request: RpcRequest = serde_json::from_str(
//!     r#"{"jsonrpc":"2.0","method":"feed-analysis","params":{"limit":10},"id":1}"#,
//! ).unwrap();
//! assert_eq!(request.method, "feed-analysis");
//!
//! let ok = RpcResponse::success(request.id, json!({"count": 0}));
//! let err = RpcResponse::error(request.id, RpcError::new("timeout", "Request timed out"));
//! assert!(ok.result.is_some() && err.error.is_some());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request envelope.
///
/// `params` defaults to JSON `null` when omitted so handlers can apply their
/// own defaulting; `id` defaults to `0`, matching the id echoed on errors
/// raised before the envelope could be fully read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,
    /// Name of the method to invoke
    pub method: String,
    /// Parameter object (may be omitted)
    #[serde(default)]
    pub params: Value,
    /// Request identifier, mirrored into the response
    #[serde(default)]
    pub id: i64,
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Protocol version (always "2.0")
    pub jsonrpc: String,
    /// Result value on success (omitted when `error` is present)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error object on failure (omitted when `result` is present)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Request identifier (mirrors the request id)
    pub id: i64,
}

/// JSON-RPC error object with a stable string code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcError {
    /// Taxonomy code, e.g. `invalid_request` or `rate_limited`
    pub code: String,
    /// Short human-readable description
    pub message: String,
    /// Optional operator-facing detail, attached to 5xx-class failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl RpcError {
    /// Creates an error object without details.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Creates an error object carrying an operator-facing detail string.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

impl RpcResponse {
    /// Creates a success response.
    ///
    /// # Arguments
    ///
    /// * `id` - Request identifier (must match the request id)
    /// * `result` - Result value
    pub fn success(id: i64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Creates an error response.
    ///
    /// # Arguments
    ///
    /// * `id` - Request identifier (must match the request id)
    /// * `error` - Error object
    pub fn error(id: i64, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }
}
