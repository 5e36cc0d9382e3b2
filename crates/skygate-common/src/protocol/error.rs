//! Gateway Error Taxonomy
//!
//! One error type crosses every crate seam: [`GatewayError`]. Each variant
//! maps onto a stable string code and an HTTP status, and knows whether the
//! failure is transient enough to retry.
//!
//! Classification is structured first (transport error kind, upstream status
//! code). [`GatewayError::retryable_message`] is the last-resort substring
//! classifier for failures that only reach us as text, and
//! [`GatewayError::classify_message`] folds foreign error strings back into
//! the taxonomy at the gateway boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid parameter: {0}")]
    InvalidParams(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("missing credentials in configuration")]
    MissingCredentials,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Timeout or connect-level transport failure. Other transport kinds
    /// (redirect loops, builder faults) are `Internal` and permanent.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

// Stable error codes on the wire. The set is closed; new failure modes must
// fold into one of these.
pub const ERR_INVALID_REQUEST: &str = "invalid_request";
pub const ERR_INVALID_PARAMS: &str = "invalid_params";
pub const ERR_AUTHENTICATION: &str = "authentication_error";
pub const ERR_NOT_FOUND: &str = "not_found";
pub const ERR_RATE_LIMITED: &str = "rate_limited";
pub const ERR_TIMEOUT: &str = "timeout";
pub const ERR_API: &str = "api_error";
pub const ERR_SERVICE_UNAVAILABLE: &str = "service_unavailable";
pub const ERR_INTERNAL: &str = "internal_error";

impl GatewayError {
    /// Returns the stable taxonomy code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => ERR_INVALID_REQUEST,
            Self::InvalidParams(_) => ERR_INVALID_PARAMS,
            Self::Authentication(_) | Self::MissingCredentials => ERR_AUTHENTICATION,
            Self::NotFound(_) => ERR_NOT_FOUND,
            Self::RateLimited => ERR_RATE_LIMITED,
            Self::Timeout(_) => ERR_TIMEOUT,
            Self::Api { status, .. } => match status {
                404 => ERR_NOT_FOUND,
                401 | 403 => ERR_AUTHENTICATION,
                _ => ERR_API,
            },
            Self::CircuitOpen => ERR_SERVICE_UNAVAILABLE,
            Self::Transport(_) => ERR_API,
            Self::Json(_) | Self::Io(_) | Self::Internal(_) => ERR_INTERNAL,
        }
    }

    /// Returns the HTTP status matching the error class.
    pub fn http_status(&self) -> u16 {
        match self.code() {
            ERR_INVALID_REQUEST | ERR_INVALID_PARAMS => 400,
            ERR_AUTHENTICATION => 401,
            ERR_NOT_FOUND => 404,
            ERR_RATE_LIMITED => 429,
            ERR_API => 502,
            ERR_SERVICE_UNAVAILABLE => 503,
            ERR_TIMEOUT => 504,
            _ => 500,
        }
    }

    /// Returns the user-facing message for the error class.
    ///
    /// Upstream response bodies are never surfaced verbatim to clients; the
    /// full error is available to operators via logs and the `details` field.
    pub fn user_message(&self) -> &'static str {
        match self.code() {
            ERR_INVALID_REQUEST => "Invalid request",
            ERR_INVALID_PARAMS => "Invalid parameters",
            ERR_AUTHENTICATION => "Authentication failed",
            ERR_NOT_FOUND => "Resource not found",
            ERR_RATE_LIMITED => "Rate limit exceeded",
            ERR_API => "Upstream API error",
            ERR_SERVICE_UNAVAILABLE => "Service unavailable",
            ERR_TIMEOUT => "Request timed out",
            _ => "Internal server error",
        }
    }

    /// Returns whether this error is transient and worth retrying.
    ///
    /// Upstream 5xx responses and `Transport` failures retry. `Transport` is
    /// constructed only for timeouts and connect-level faults, so the blanket
    /// answer is safe; client errors, decode errors, and everything the
    /// caller can't fix by waiting are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            // Foreign failures wrapped as text fall back to marker matching.
            Self::Internal(message) => Self::retryable_message(message),
            _ => false,
        }
    }

    /// Last-resort substring classifier for retryability.
    ///
    /// Only consulted for failures that arrive as bare text (e.g. wrapped
    /// through a foreign error type); structured classification via
    /// [`GatewayError::is_retryable`] is authoritative.
    pub fn retryable_message(message: &str) -> bool {
        const MARKERS: &[&str] = &[
            "connection refused",
            "no such host",
            "i/o timeout",
            "EOF",
            "status 500",
            "status 502",
            "status 503",
            "status 504",
        ];
        MARKERS.iter().any(|m| message.contains(m))
    }

    /// Folds a foreign error string into the taxonomy.
    ///
    /// Substring matching mirrors the markers the upstream and transport
    /// layers are known to emit. Unrecognized text becomes `internal_error`.
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout(0)
        } else if lower.contains("authentication") || lower.contains("credentials") {
            Self::Authentication(message.to_string())
        } else if lower.contains("not found") || lower.contains("404") {
            Self::NotFound(message.to_string())
        } else if lower.contains("invalid") || lower.contains("parameter") || lower.contains("validation") {
            Self::InvalidParams(message.to_string())
        } else if lower.contains("circuit breaker") {
            Self::CircuitOpen
        } else if lower.contains("api error") || lower.contains("status 5") || lower.contains("failed to create post") {
            Self::Api {
                status: 502,
                message: message.to_string(),
            }
        } else {
            Self::Internal(message.to_string())
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Api {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        // Only timeouts and connect failures become `Transport` (and with it,
        // retryable). Every other kind is permanent.
        if err.is_timeout() {
            return Self::Transport(format!("i/o timeout: {err}"));
        }
        if err.is_connect() {
            return Self::Transport(format!("connection failed: {err}"));
        }
        if err.is_decode() {
            return Self::Internal(format!("response decode failed: {err}"));
        }
        // Redirect loops, builder faults, body errors.
        Self::Internal(err.to_string())
    }
}
