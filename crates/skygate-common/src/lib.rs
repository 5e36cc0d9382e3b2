//! Skygate Common Types
//!
//! This crate provides the shared protocol and policy infrastructure for the
//! skygate gateway:
//!
//! - **Protocol Layer**: JSON-RPC 2.0 envelope types and the stable error
//!   taxonomy every component maps into
//! - **Rate Limiting**: per-client sliding-window admission control
//! - **Configuration**: environment and file based settings for the upstream
//!   AT Protocol host and credentials
//!
//! # Architecture
//!
//! Inbound requests arrive as JSON-RPC 2.0 over HTTP:
//! - **Transport**: HTTP/1.1 (axum, in the gateway crate)
//! - **Protocol**: JSON-RPC 2.0 with string error codes
//! - **Serialization**: JSON
//! - **Content-Type**: application/json
//!
//! # Example
//!
//! ```
//! use skygate_common::protocol::{RpcResponse, RpcError};
//! use serde_json::json;
//!
//! let response = RpcResponse::success(1, json!({"count": 3}));
//! assert!(response.error.is_none());
//!
//! let error = RpcError::new("invalid_request", "Unsupported JSON-RPC version");
//! let response = RpcResponse::error(1, error);
//! assert!(response.result.is_none());
//! ```

pub mod config;
pub mod protocol;
pub mod rate_limit;

pub use config::{AppConfig, BackupCredentials};
pub use protocol::error::{GatewayError, Result};
pub use protocol::jsonrpc::{RpcError, RpcRequest, RpcResponse};
