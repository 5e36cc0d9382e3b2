//! Protocol types shared by every skygate component.

pub mod error;
pub mod jsonrpc;

pub use error::{GatewayError, Result};
pub use jsonrpc::{RpcError, RpcRequest, RpcResponse};
