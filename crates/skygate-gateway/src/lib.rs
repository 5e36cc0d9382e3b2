//! Skygate Gateway
//!
//! The inbound surface of the gateway: an axum server accepting JSON-RPC 2.0
//! requests at `POST /mcp/:method`, a dispatcher enforcing per-method
//! deadlines and the stable error taxonomy, the method handlers, and the
//! startup loader for static fallback payloads.
//!
//! # Request flow
//!
//! 1. Resolve the client IP and consult the rate limiter
//! 2. Validate the method against the closed whitelist
//! 3. Parse the JSON-RPC envelope (`jsonrpc` must equal "2.0")
//! 4. Dispatch to the handler under the method's deadline
//! 5. Wrap the outcome as a JSON-RPC result or taxonomy error

pub mod dispatch;
pub mod fallbacks;
pub mod handlers;
pub mod server;
pub mod state;

pub use state::AppState;
