//! Request dispatch.
//!
//! Validates the envelope, applies the rate limit, runs the handler under
//! the method's deadline, and maps every failure into the taxonomy. The
//! dispatcher completes on the first of result, error, or deadline; a handler
//! future that loses the race is dropped, so no caller observes a stale
//! result.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::Value;

use skygate_common::{GatewayError, Result, RpcError, RpcRequest, RpcResponse};

use crate::handlers;
use crate::state::AppState;

/// The closed set of dispatchable methods.
pub const VALID_METHODS: [&str; 4] = [
    "feed-analysis",
    "post-assist",
    "post-submit",
    "community-manage",
];

/// Returns the deadline budget for a method.
pub fn method_deadline(method: &str) -> Duration {
    match method {
        "feed-analysis" => Duration::from_secs(15),
        "post-assist" => Duration::from_secs(5),
        "post-submit" => Duration::from_secs(10),
        "community-manage" => Duration::from_secs(10),
        _ => Duration::from_secs(10),
    }
}

/// Handles `POST /mcp/:method`.
pub async fn handle_rpc(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(method): Path<String>,
    body: Bytes,
) -> Response {
    if !state.limiter.check(addr.ip()).await.is_allowed() {
        return error_response(0, &GatewayError::RateLimited);
    }

    if !VALID_METHODS.contains(&method.as_str()) {
        return error_response(
            0,
            &GatewayError::InvalidRequest(format!("invalid method: {method}")),
        );
    }

    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            return error_response(0, &GatewayError::InvalidRequest("invalid request format".into()));
        }
    };
    if request.jsonrpc != "2.0" {
        return error_response(
            request.id,
            &GatewayError::InvalidRequest("unsupported JSON-RPC version".into()),
        );
    }

    let deadline = method_deadline(&method);
    match tokio::time::timeout(deadline, run_method(&state, &method, request.params)).await {
        Ok(Ok(result)) => success_response(request.id, result),
        Ok(Err(err)) => {
            // Unclassified failures get one last pass through the substring
            // classifier before they surface as internal errors.
            let err = match err {
                GatewayError::Internal(message) => GatewayError::classify_message(&message),
                other => other,
            };
            error_response(request.id, &err)
        }
        Err(_) => error_response(
            request.id,
            &GatewayError::Timeout(deadline.as_millis() as u64),
        ),
    }
}

async fn run_method(state: &AppState, method: &str, params: Value) -> Result<Value> {
    match method {
        "feed-analysis" => handlers::feed::analyze(state, params).await,
        "post-assist" => handlers::post::assist(state, params).await,
        "post-submit" => handlers::post::submit(state, params).await,
        "community-manage" => handlers::community::manage(state, params).await,
        other => Err(GatewayError::InvalidRequest(format!("invalid method: {other}"))),
    }
}

fn success_response(id: i64, result: Value) -> Response {
    (StatusCode::OK, Json(RpcResponse::success(id, result))).into_response()
}

/// Serializes a taxonomy error into the JSON-RPC envelope with the matching
/// HTTP status. 5xx-class responses carry an operator-facing `details`
/// timestamp.
pub(crate) fn error_response(id: i64, err: &GatewayError) -> Response {
    // Rate-limit rejections are expected noise; keep them out of the log.
    if !matches!(err, GatewayError::RateLimited) {
        tracing::warn!(code = err.code(), error = %err, "request failed");
    }

    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let rpc_error = if status.is_server_error() {
        RpcError::with_details(
            err.code(),
            err.user_message(),
            format!(
                "Error occurred at {}, please try again later",
                Utc::now().to_rfc3339()
            ),
        )
    } else {
        RpcError::new(err.code(), err.user_message())
    };

    (status, Json(RpcResponse::error(id, rpc_error))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_whitelist() {
        for method in VALID_METHODS {
            assert!(VALID_METHODS.contains(&method));
        }
        assert!(!VALID_METHODS.contains(&"feed_analysis"));
        assert!(!VALID_METHODS.contains(&"_info"));
    }

    #[test]
    fn test_method_deadlines() {
        assert_eq!(method_deadline("feed-analysis"), Duration::from_secs(15));
        assert_eq!(method_deadline("post-assist"), Duration::from_secs(5));
        assert_eq!(method_deadline("post-submit"), Duration::from_secs(10));
        assert_eq!(method_deadline("community-manage"), Duration::from_secs(10));
        assert_eq!(method_deadline("anything-else"), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_error_response_envelope() {
        let response = error_response(3, &GatewayError::RateLimited);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let envelope: RpcResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.id, 3);
        let error = envelope.error.unwrap();
        assert_eq!(error.code, "rate_limited");
        assert!(error.details.is_none());
    }

    #[tokio::test]
    async fn test_server_errors_carry_details() {
        let response = error_response(1, &GatewayError::Timeout(10_000));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let envelope: RpcResponse = serde_json::from_slice(&body).unwrap();
        let error = envelope.error.unwrap();
        assert_eq!(error.code, "timeout");
        assert!(error.details.unwrap().contains("Error occurred at"));
    }
}
